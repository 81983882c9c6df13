//! Reading Datfiles and cue sheets that may arrive inside `.zip` containers.

use super::Manifest;
use crate::error::{VerifyError, VerifyResult};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

pub(crate) fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Returns the raw Datfile XML, unpacking the first `.dat`/`.xml` member when
/// `path` is a zip archive.
pub fn read_manifest_bytes(path: &Path) -> VerifyResult<Vec<u8>> {
    if !is_zip(path) {
        return fs::read(path).map_err(|err| VerifyError::io("reading Datfile", path, err));
    }
    let file = File::open(path).map_err(|err| VerifyError::io("opening Datfile zip", path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error(path, err))?;
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(|err| zip_error(path, err))?;
        let lower = member.name().to_ascii_lowercase();
        if member.is_file() && (lower.ends_with(".dat") || lower.ends_with(".xml")) {
            debug!("Reading Datfile \"{}\" from \"{}\"", member.name(), path.display());
            let mut data = Vec::with_capacity(member.size() as usize);
            member
                .read_to_end(&mut data)
                .map_err(|err| VerifyError::io("unpacking Datfile", path, err))?;
            return Ok(data);
        }
    }
    Err(VerifyError::ManifestParse(format!(
        "zip archive \"{}\" contains no .dat or .xml file",
        path.display()
    )))
}

/// Loads a Datfile from disk.
pub fn load_manifest(path: &Path) -> VerifyResult<Manifest> {
    debug!("Loading Datfile: {}", path.display());
    let raw = read_manifest_bytes(path)?;
    let manifest = Manifest::load(&raw)?;
    info!("Datfile loaded successfully with {} games", manifest.game_count());
    Ok(manifest)
}

/// Reads one named member of a zip archive; `Ok(None)` when it isn't there.
pub(crate) fn read_zip_member(path: &Path, member_name: &str) -> VerifyResult<Option<Vec<u8>>> {
    let file = File::open(path).map_err(|err| VerifyError::io("opening zip", path, err))?;
    let mut archive = ZipArchive::new(file).map_err(|err| zip_error(path, err))?;
    let mut member = match archive.by_name(member_name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(zip_error(path, err)),
    };
    let mut data = Vec::with_capacity(member.size() as usize);
    member
        .read_to_end(&mut data)
        .map_err(|err| VerifyError::io("unpacking zip member", path, err))?;
    Ok(Some(data))
}

fn zip_error(path: &Path, err: ZipError) -> VerifyError {
    VerifyError::ConfigurationError(format!(
        "\"{}\" is not a readable zip archive: {err}",
        path.display()
    ))
}
