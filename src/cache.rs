//! Remembers dumps that already verified so unchanged files are not
//! converted again on the next run.

use crate::dat::{Manifest, ManifestGame};
use crate::verify::{CueStatus, Verdict, VerdictStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Identity of a dump file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFingerprint {
    pub file_name: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified_ns: u64,
}

impl DumpFingerprint {
    pub fn of(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified_ns = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            modified_ns,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub name: String,
    pub size: u64,
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub size: u64,
    pub modified_ns: u64,
    pub game: String,
    pub files: Vec<CachedFile>,
    pub status: VerdictStatus,
    pub cue: CueStatus,
    pub recorded_at: DateTime<Utc>,
}

impl CacheRecord {
    /// The Datfile still describes the game exactly as it did when cached.
    fn matches_game(&self, game: &ManifestGame) -> bool {
        self.files.len() == game.files.len()
            && self.files.iter().all(|cached| {
                game.file(&cached.name).is_some_and(|file| {
                    file.size == cached.size && file.sha1() == cached.sha1.as_deref()
                })
            })
    }
}

/// Verified dumps keyed by file name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationCache {
    #[serde(default)]
    entries: BTreeMap<String, CacheRecord>,
}

impl VerificationCache {
    /// Loads the cache, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read verification cache {:?}", path))?;
        let cache = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse verification cache {:?}", path))?;
        Ok(cache)
    }

    /// Like [`VerificationCache::load`], but a damaged cache is discarded.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cache) => cache,
            Err(err) => {
                warn!("Ignoring verification cache: {err:#}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory {:?}", parent))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write verification cache {:?}", path))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A still-valid record for the dump: same size, same modification time
    /// and a game the manifest declares unchanged.
    pub fn lookup<'m>(
        &self,
        fingerprint: &DumpFingerprint,
        manifest: &'m Manifest,
    ) -> Option<(&CacheRecord, &'m ManifestGame)> {
        debug!("Checking cache for {}", fingerprint.file_name);
        let record = self.entries.get(&fingerprint.file_name)?;
        if record.size != fingerprint.size || record.modified_ns != fingerprint.modified_ns {
            return None;
        }
        let game = manifest.lookup(&record.game)?;
        record.matches_game(game).then_some((record, game))
    }

    pub fn record(
        &mut self,
        fingerprint: DumpFingerprint,
        game: &ManifestGame,
        status: VerdictStatus,
        cue: CueStatus,
    ) {
        debug!("Caching {}", fingerprint.file_name);
        let files = game
            .files
            .iter()
            .map(|file| CachedFile {
                name: file.name.clone(),
                size: file.size,
                sha1: file.sha1().map(str::to_string),
            })
            .collect();
        self.entries.insert(
            fingerprint.file_name,
            CacheRecord {
                size: fingerprint.size,
                modified_ns: fingerprint.modified_ns,
                game: game.name.clone(),
                files,
                status,
                cue,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Records every freshly verified dump from a finished run, under the
    /// fingerprint each dump had when its verification started.
    pub fn remember(&mut self, verdicts: &[Verdict], manifest: &Manifest) -> usize {
        let mut added = 0;
        for verdict in verdicts {
            if verdict.from_cache || verdict.status == VerdictStatus::Failed {
                continue;
            }
            let (Some(game), Some(cue)) = (
                verdict.game_name.as_deref().and_then(|name| manifest.lookup(name)),
                verdict.cue,
            ) else {
                continue;
            };
            // The fingerprint from before conversion, not the file as it is now.
            match &verdict.fingerprint {
                Some(fingerprint) => {
                    self.record(fingerprint.clone(), game, verdict.status, cue);
                    added += 1;
                }
                None => debug!(
                    "Not caching \"{}\": file was not readable before verification",
                    verdict.dump_path.display()
                ),
            }
        }
        added
    }
}
