//! Per-dump scratch space.

use crate::error::{VerifyError, VerifyResult};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Root under which every dump gets its own private directory.
#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
}

impl WorkArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh directory for `dump`. Two dumps with the same file
    /// name never share one: each gets a random suffix.
    pub fn acquire(&self, dump: &Path) -> VerifyResult<GameWorkDir> {
        fs::create_dir_all(&self.root)
            .map_err(|err| VerifyError::io("Failed to create work area", &self.root, err))?;
        let stem = dump
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dump".into());
        let dir = tempfile::Builder::new()
            .prefix(&format!("verifydump-{}-", sanitize(&stem)))
            .tempdir_in(&self.root)
            .map_err(|err| VerifyError::io("Failed to create work directory", &self.root, err))?;

        let dump_dir = dir.path().join("dump");
        let scratch_dir = dir.path().join("scratch");
        for sub in [&dump_dir, &scratch_dir] {
            fs::create_dir(sub)
                .map_err(|err| VerifyError::io("Failed to create work directory", sub, err))?;
        }
        Ok(GameWorkDir {
            dir,
            dump_dir,
            scratch_dir,
        })
    }
}

/// Exclusively owned scratch space, removed from disk on drop.
#[derive(Debug)]
pub struct GameWorkDir {
    dir: TempDir,
    dump_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl GameWorkDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Receives the reconstructed dump files.
    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Moves the finished dump files into `dest`, replacing files of the
    /// same name. Returns the names moved.
    pub fn move_dump_files(&self, dest: &Path) -> VerifyResult<Vec<String>> {
        fs::create_dir_all(dest)
            .map_err(|err| VerifyError::io("Failed to create output folder", dest, err))?;
        let entries = fs::read_dir(&self.dump_dir)
            .map_err(|err| VerifyError::io("Failed to list dump folder", &self.dump_dir, err))?;
        let mut moved = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| VerifyError::io("Failed to list dump folder", &self.dump_dir, err))?;
            let from = entry.path();
            let to = dest.join(entry.file_name());
            // The work area may sit on another filesystem than `dest`.
            if fs::rename(&from, &to).is_err() {
                fs::copy(&from, &to)
                    .map_err(|err| VerifyError::io("Failed to copy dump file", &to, err))?;
                fs::remove_file(&from)
                    .map_err(|err| VerifyError::io("Failed to remove dump file", &from, err))?;
            }
            moved.push(entry.file_name().to_string_lossy().into_owned());
        }
        moved.sort();
        Ok(moved)
    }
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(32)
        .collect()
}
