pub mod cache;
pub mod config;
pub mod convert;
pub mod cue;
pub mod dat;
pub mod error;
pub mod hashing;
pub mod report;
pub mod verify;

// Re-export commonly used types for convenience.
pub use config::AppConfig;
pub use dat::{load_manifest, Manifest, ManifestFile, ManifestGame};
pub use error::{VerifyError, VerifyResult};
pub use verify::{Pipeline, PipelineOptions, Verdict, VerdictStatus};
