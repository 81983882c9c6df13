//! In-memory model of a Redump Datfile.
//!
//! The manifest is loaded once per run and then only read, so every index is
//! built up front and the whole structure can be shared between workers by
//! reference.

pub mod archive;
mod parser;

use crate::error::VerifyResult;
use crate::hashing::ChecksumKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub use archive::{load_manifest, read_manifest_bytes};

/// One file (`<rom>`) that a game's dump must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub name: String,
    pub size: u64,
    /// Lowercase hex digests; never empty for a loaded manifest.
    pub checksums: BTreeMap<ChecksumKind, String>,
}

impl ManifestFile {
    /// Whether this entry is the game's cue sheet rather than a payload.
    pub fn is_descriptor(&self) -> bool {
        has_cue_extension(&self.name)
    }

    pub fn sha1(&self) -> Option<&str> {
        self.checksums.get(&ChecksumKind::Sha1).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestGame {
    pub name: String,
    pub files: Vec<ManifestFile>,
}

impl ManifestGame {
    pub fn file(&self, name: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn descriptor(&self) -> Option<&ManifestFile> {
        self.files.iter().find(|file| file.is_descriptor())
    }

    pub fn payloads(&self) -> impl Iterator<Item = &ManifestFile> {
        self.files.iter().filter(|file| !file.is_descriptor())
    }
}

/// A loaded Datfile.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    system: Option<String>,
    games: Vec<ManifestGame>,
    by_name: HashMap<String, usize>,
    by_file_name: HashMap<String, Vec<usize>>,
    by_sha1: HashMap<String, Vec<(usize, usize)>>,
}

impl Manifest {
    /// Parses raw Datfile XML.
    pub fn load(raw: &[u8]) -> VerifyResult<Self> {
        let parsed = parser::parse_datfile(raw)?;
        Ok(Self::from_games(parsed.system, parsed.games))
    }

    pub(crate) fn from_games(system: Option<String>, games: Vec<ManifestGame>) -> Self {
        let mut manifest = Manifest {
            system,
            ..Default::default()
        };
        for (game_idx, game) in games.iter().enumerate() {
            manifest.by_name.insert(game.name.clone(), game_idx);
            for (file_idx, file) in game.files.iter().enumerate() {
                manifest
                    .by_file_name
                    .entry(file.name.clone())
                    .or_default()
                    .push(game_idx);
                if let Some(sha1) = file.sha1() {
                    manifest
                        .by_sha1
                        .entry(sha1.to_string())
                        .or_default()
                        .push((game_idx, file_idx));
                }
            }
        }
        manifest.games = games;
        manifest
    }

    /// System name from the Datfile header, e.g. "Sony - PlayStation".
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    pub fn games(&self) -> &[ManifestGame] {
        &self.games
    }

    pub fn lookup(&self, name: &str) -> Option<&ManifestGame> {
        self.by_name.get(name).map(|idx| &self.games[*idx])
    }

    /// Position of the game in Datfile order, used to sort reports.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Games that declare a file with exactly this name.
    pub fn games_declaring_file(&self, file_name: &str) -> Vec<&ManifestGame> {
        self.by_file_name
            .get(file_name)
            .map(|indices| indices.iter().map(|idx| &self.games[*idx]).collect())
            .unwrap_or_default()
    }

    /// Every `(game, file)` whose SHA-1 equals `sha1_hex`.
    pub fn files_with_sha1(&self, sha1_hex: &str) -> Vec<(&ManifestGame, &ManifestFile)> {
        self.by_sha1
            .get(&sha1_hex.to_ascii_lowercase())
            .map(|hits| {
                hits.iter()
                    .map(|(game_idx, file_idx)| {
                        let game = &self.games[*game_idx];
                        (game, &game.files[*file_idx])
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub(crate) fn has_cue_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("cue"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE_DAT: &str = r#"<?xml version="1.0"?>
<!DOCTYPE datafile PUBLIC "-//Logiqx//DTD ROM Management Datafile//EN" "http://www.logiqx.com/dtds/datafile.dtd">
<datafile>
  <header>
    <name>Sony - PlayStation</name>
    <description>Sony - PlayStation - Discs (10000) (2024-01-01)</description>
  </header>
  <game name="Alpha (USA)">
    <category>Games</category>
    <description>Alpha (USA)</description>
    <rom name="Alpha (USA).cue" size="82" crc="0A0B0C0D" md5="0123456789abcdef0123456789abcdef" sha1="1111111111111111111111111111111111111111"/>
    <rom name="Alpha (USA).bin" size="100" crc="ABCDEF01"/>
  </game>
  <game name="Beta &amp; Gamma (Europe)">
    <rom name="Beta &amp; Gamma (Europe).iso" size="2048" sha1="2222222222222222222222222222222222222222"/>
  </game>
</datafile>
"#;

    #[test]
    fn lookup_returns_parsed_attributes() {
        let manifest = Manifest::load(SAMPLE_DAT.as_bytes()).unwrap();
        assert_eq!(manifest.system(), Some("Sony - PlayStation"));
        assert_eq!(manifest.game_count(), 2);

        let alpha = manifest.lookup("Alpha (USA)").unwrap();
        assert_eq!(alpha.files.len(), 2);
        let cue = alpha.descriptor().unwrap();
        assert_eq!(cue.name, "Alpha (USA).cue");
        assert_eq!(cue.size, 82);
        assert_eq!(cue.checksums[&ChecksumKind::Crc32], "0a0b0c0d");
        let bin = alpha.file("Alpha (USA).bin").unwrap();
        assert_eq!(bin.checksums.len(), 1);
        assert_eq!(bin.checksums[&ChecksumKind::Crc32], "abcdef01");
        assert_eq!(alpha.payloads().count(), 1);

        for game in manifest.games() {
            assert_eq!(manifest.lookup(&game.name), Some(game));
        }
        assert!(manifest.lookup("Delta (Japan)").is_none());
    }

    #[test]
    fn entities_are_unescaped_and_indexed() {
        let manifest = Manifest::load(SAMPLE_DAT.as_bytes()).unwrap();
        let beta = manifest.lookup("Beta & Gamma (Europe)").unwrap();
        assert_eq!(beta.files[0].name, "Beta & Gamma (Europe).iso");
        assert_eq!(
            manifest.games_declaring_file("Beta & Gamma (Europe).iso").len(),
            1
        );
        let hits = manifest.files_with_sha1("2222222222222222222222222222222222222222");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.name, "Beta & Gamma (Europe)");
        assert_eq!(manifest.position("Beta & Gamma (Europe)"), Some(1));
    }
}
