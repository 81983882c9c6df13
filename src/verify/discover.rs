//! Expanding command-line paths into the dumps to verify.

use crate::convert::{extension_of, ConverterSet};
use crate::error::VerifyError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Dumps found under the requested paths.
#[derive(Debug, Default)]
pub struct Discovered {
    /// Files with a supported format, in the order they were found.
    pub dumps: Vec<PathBuf>,
    /// Explicitly named files that can't be verified, with the reason.
    pub rejected: Vec<(PathBuf, VerifyError)>,
}

/// Folders are walked recursively (following symlinks) and only supported
/// files are kept; a file named directly with an unsupported extension is
/// rejected instead of silently skipped.
pub fn collect_dumps(paths: &[PathBuf], converters: &ConverterSet) -> Discovered {
    let mut found = Discovered::default();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && converters.supports(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            files.sort();
            debug!("Found {} dump(s) in \"{}\"", files.len(), path.display());
            found.dumps.extend(files);
        } else if converters.supports(path) {
            found.dumps.push(path.clone());
        } else {
            found.rejected.push((path.clone(), unsupported(path)));
        }
    }
    found
}

fn unsupported(path: &Path) -> VerifyError {
    VerifyError::UnsupportedFormat {
        extension: extension_of(path)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default(),
    }
}
