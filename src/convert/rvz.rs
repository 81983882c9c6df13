//! `.rvz` images. DolphinTool reports the SHA-1 of the uncompressed `.iso`
//! without writing it to disk.

use super::{ConversionRequest, DumpConverter, Reconstruction};
use crate::config::ToolBinary;
use crate::error::{VerifyError, VerifyResult};
use crate::hashing::ChecksumKind;
use std::ffi::OsStr;
use std::fs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RvzConverter {
    dolphin_tool: ToolBinary,
}

impl RvzConverter {
    pub fn new(dolphin_tool: ToolBinary) -> Self {
        Self { dolphin_tool }
    }
}

impl DumpConverter for RvzConverter {
    fn extensions(&self) -> &[&'static str] {
        &["rvz"]
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> VerifyResult<Reconstruction> {
        // DolphinTool insists on a user folder; keep it out of the real one.
        let user_dir = request.scratch_dir.join("dolphin-user");
        fs::create_dir_all(&user_dir).map_err(|err| {
            VerifyError::io("Failed to create DolphinTool user folder", &user_dir, err)
        })?;

        debug!("Finding SHA-1 of \"{}\" using DolphinTool", request.source.display());
        let output = request.runner.run_checked(
            &self.dolphin_tool,
            [
                OsStr::new("verify"),
                OsStr::new("-u"),
                user_dir.as_os_str(),
                OsStr::new("-i"),
                request.source.as_os_str(),
                OsStr::new("--algorithm=sha1"),
            ],
            "Failed to find SHA-1 using DolphinTool",
        )?;

        let hex = parse_sha1(&output.stdout).ok_or_else(|| {
            VerifyError::tool(
                "DolphinTool did not report a SHA-1",
                Some(output.stdout.clone()),
            )
        })?;
        Ok(Reconstruction::Digest {
            file_name: format!("{}.iso", request.dump_name()),
            algorithm: ChecksumKind::Sha1,
            hex,
        })
    }
}

fn parse_sha1(stdout: &str) -> Option<String> {
    let hex = stdout.trim();
    let valid =
        hex.len() == ChecksumKind::Sha1.hex_len() && hex.bytes().all(|b| b.is_ascii_hexdigit());
    valid.then(|| hex.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_read_from_stdout() {
        assert_eq!(
            parse_sha1("AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D\n").as_deref(),
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
        );
        assert_eq!(parse_sha1("Error: unable to open file"), None);
        assert_eq!(parse_sha1(""), None);
    }
}
