//! Turning compressed images back into Redump-style dump files.
//!
//! The heavy lifting is done by external tools (chdman, binmerge,
//! DolphinTool). Converters only drive them and rename their output so the
//! reconstructed files carry the names Redump Datfiles use.

pub mod chd;
pub mod process;
pub mod rvz;

use crate::config::ToolSettings;
use crate::error::VerifyResult;
use crate::hashing::ChecksumKind;
use std::path::Path;

pub use chd::ChdConverter;
pub use process::{CancelToken, ToolOutput, ToolRunner};
pub use rvz::RvzConverter;

/// Everything a converter needs for one dump.
pub struct ConversionRequest<'a> {
    pub source: &'a Path,
    /// Receives the reconstructed dump files and nothing else.
    pub output_dir: &'a Path,
    /// Private scratch space for intermediate tool output.
    pub scratch_dir: &'a Path,
    /// Datfile system name, used to pick GD-ROM handling.
    pub system: Option<&'a str>,
    pub runner: &'a ToolRunner,
}

impl ConversionRequest<'_> {
    /// Name of the dump without its extension.
    pub fn dump_name(&self) -> String {
        self.source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// What a converter produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    /// Dump files were written into `output_dir`.
    Files,
    /// The tool only reported a digest of the single uncompressed image.
    Digest {
        file_name: String,
        algorithm: ChecksumKind,
        hex: String,
    },
}

/// Conversion collaborator for one compressed format.
pub trait DumpConverter: Send + Sync {
    /// Lowercase extensions (without the dot) this converter accepts.
    fn extensions(&self) -> &[&'static str];

    fn convert(&self, request: &ConversionRequest<'_>) -> VerifyResult<Reconstruction>;
}

/// The converters available to a run, chosen by file extension.
pub struct ConverterSet {
    converters: Vec<Box<dyn DumpConverter>>,
}

impl ConverterSet {
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    /// chdman/binmerge for `.chd` and DolphinTool for `.rvz`.
    pub fn standard(tools: &ToolSettings) -> Self {
        Self::empty()
            .with(ChdConverter::new(tools.chdman.clone(), tools.binmerge.clone()))
            .with(RvzConverter::new(tools.dolphin_tool.clone()))
    }

    pub fn with(mut self, converter: impl DumpConverter + 'static) -> Self {
        self.converters.push(Box::new(converter));
        self
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn DumpConverter> {
        let ext = extension_of(path)?;
        self.converters
            .iter()
            .find(|converter| converter.extensions().contains(&ext.as_str()))
            .map(|converter| converter.as_ref())
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
