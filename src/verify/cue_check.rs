//! Checking a reconstructed cue sheet against the Datfile.

use crate::cue::{compare, CueSheet, Difference};
use crate::dat::archive::{is_zip, read_zip_member};
use crate::dat::ManifestFile;
use crate::error::{VerifyError, VerifyResult};
use crate::hashing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// How the generated cue sheet relates to the Datfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CueOutcome {
    /// The generated cue hashes exactly like the Datfile entry.
    ExactMatch,
    /// Only excluded fields differ from the supplied cue.
    EssentialsMatch { ignored: Vec<Difference> },
    /// The cue doesn't match and nothing was supplied to compare it with.
    NoExtraCue,
    /// The disc layout differs from the supplied cue.
    Mismatch { differences: Vec<Difference> },
}

/// Cue result stored with cached verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueStatus {
    NotNeeded,
    ExactMatch,
    EssentialsMatch,
    NoExtraCue,
    Mismatch,
}

impl CueOutcome {
    pub fn status(&self) -> CueStatus {
        match self {
            CueOutcome::ExactMatch => CueStatus::ExactMatch,
            CueOutcome::EssentialsMatch { .. } => CueStatus::EssentialsMatch,
            CueOutcome::NoExtraCue => CueStatus::NoExtraCue,
            CueOutcome::Mismatch { .. } => CueStatus::Mismatch,
        }
    }
}

/// Checks the generated `descriptor` in `dump_dir`.
pub fn check_descriptor(
    dump_dir: &Path,
    descriptor: &ManifestFile,
    extra_cue_source: Option<&Path>,
) -> VerifyResult<CueOutcome> {
    let generated_path = dump_dir.join(&descriptor.name);
    if !generated_path.is_file() {
        return Err(VerifyError::MissingFile {
            name: descriptor.name.clone(),
        });
    }
    let generated = fs::read(&generated_path)
        .map_err(|err| VerifyError::io("Failed to read generated cue", &generated_path, err))?;
    if hashing::verify_bytes(&generated, descriptor).is_match() {
        debug!("Dump file \"{}\" found in Datfile and verified", descriptor.name);
        return Ok(CueOutcome::ExactMatch);
    }

    let Some(extra) = load_extra_cue(extra_cue_source, &descriptor.name)? else {
        return Ok(CueOutcome::NoExtraCue);
    };
    if !hashing::verify_bytes(&extra, descriptor).is_match() {
        return Err(VerifyError::ConfigurationError(format!(
            "Provided extra .cue file \"{}\" doesn't match Datfile",
            descriptor.name
        )));
    }

    let generated = String::from_utf8(generated).map_err(|_| {
        VerifyError::tool(
            format!("Failed to decode generated .cue file \"{}\" as UTF-8", descriptor.name),
            None,
        )
    })?;
    let extra = String::from_utf8(extra).map_err(|_| {
        VerifyError::ConfigurationError(format!(
            "Failed to decode provided .cue file \"{}\" as UTF-8",
            descriptor.name
        ))
    })?;

    let comparison = compare(&CueSheet::parse(&generated)?, &CueSheet::parse(&extra)?);
    if comparison.matches() {
        debug!(
            "Dump file \"{}\" matches essential parts of provided extra .cue file, and extra .cue file matches the Datfile",
            descriptor.name
        );
        Ok(CueOutcome::EssentialsMatch {
            ignored: comparison.ignored,
        })
    } else {
        debug!(
            "Dump file \"{}\" does not match essential parts of provided extra .cue file, but extra .cue file does match the Datfile",
            descriptor.name
        );
        Ok(CueOutcome::Mismatch {
            differences: comparison.mismatches,
        })
    }
}

/// Reads the supplied cue for `cue_name`.
///
/// A folder or zip that simply lacks this cue is not an error; a named file
/// that doesn't exist is.
pub fn load_extra_cue(source: Option<&Path>, cue_name: &str) -> VerifyResult<Option<Vec<u8>>> {
    let Some(source) = source else {
        return Ok(None);
    };
    let path = if source.is_dir() {
        let candidate = source.join(cue_name);
        if !candidate.exists() {
            debug!("\"{cue_name}\" doesn't match Datfile, and no matching file was found in the extra .cue folder to compare it with");
            return Ok(None);
        }
        candidate
    } else {
        source.to_path_buf()
    };
    if !path.exists() {
        return Err(VerifyError::ConfigurationError(format!(
            "Extra .cue file source \"{}\" doesn't exist",
            path.display()
        )));
    }
    if is_zip(&path) {
        let member = read_zip_member(&path, cue_name)?;
        if member.is_none() {
            debug!("\"{cue_name}\" doesn't match Datfile, and no matching file was found in the extra .cue zip to compare it with");
        }
        return Ok(member);
    }
    fs::read(&path)
        .map(Some)
        .map_err(|err| VerifyError::io("Failed to read extra cue", &path, err))
}
