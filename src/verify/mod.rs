//! The per-dump verification pipeline.
//!
//! Each dump moves through `Pending -> Converting -> Hashing -> CueCheck`
//! and ends with a [`Verdict`]. Errors for one dump never leave this module:
//! they become that dump's verdict and the run carries on.

pub mod cue_check;
pub mod discover;
pub mod workdir;

use crate::cache::{DumpFingerprint, VerificationCache};
use crate::convert::{ConversionRequest, ConverterSet, Reconstruction, ToolRunner};
use crate::dat::{Manifest, ManifestGame};
use crate::error::{VerifyError, VerifyResult};
use crate::hashing::{self, ChecksumKind};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use cue_check::{CueOutcome, CueStatus};
pub use discover::{collect_dumps, Discovered};
pub use workdir::{GameWorkDir, WorkArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Converting,
    Hashing,
    CueCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Verified,
    Caveat,
    Failed,
}

impl VerdictStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, VerdictStatus::Failed)
    }
}

/// Final result for one dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Datfile game the dump was identified as, when it got that far.
    pub game_name: Option<String>,
    pub dump_path: PathBuf,
    pub status: VerdictStatus,
    /// Stage the dump was in when the verdict was reached.
    pub stage: Stage,
    pub detail: Vec<String>,
    /// Cue result of a dump that passed hashing.
    pub cue: Option<CueStatus>,
    #[serde(default)]
    pub from_cache: bool,
    /// Dump file identity taken before conversion started.
    #[serde(skip)]
    pub fingerprint: Option<DumpFingerprint>,
}

impl Verdict {
    /// Verdict for a dump that never reached the pipeline.
    pub fn rejected(dump_path: PathBuf, err: &VerifyError) -> Self {
        Self {
            game_name: None,
            dump_path,
            status: VerdictStatus::Failed,
            stage: Stage::Pending,
            detail: vec![err.as_finding()],
            cue: None,
            from_cache: false,
            fingerprint: None,
        }
    }

    /// Short label for console output: the game name, or the dump file.
    pub fn label(&self) -> String {
        match &self.game_name {
            Some(name) => name.clone(),
            None => self.dump_path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Accept unconfirmed cue sheets as a caveat instead of failing.
    pub allow_cue_file_mismatches: bool,
    /// A cue file, a folder of cue files or a zip of cue files.
    pub extra_cue_source: Option<PathBuf>,
}

/// Verifies dumps against one manifest.
pub struct Pipeline<'a> {
    manifest: &'a Manifest,
    converters: &'a ConverterSet,
    work_area: &'a WorkArea,
    runner: &'a ToolRunner,
    options: PipelineOptions,
    cache: Option<&'a VerificationCache>,
}

/// Where a dump currently is, so a failure can be reported from any stage.
struct Progress<'p> {
    dump: &'p Path,
    stage: Stage,
    game_name: Option<String>,
    fingerprint: Option<DumpFingerprint>,
}

impl Progress<'_> {
    fn enter(&mut self, stage: Stage) {
        debug!("\"{}\": {:?} -> {:?}", self.dump.display(), self.stage, stage);
        self.stage = stage;
    }
}

impl<'a> Pipeline<'a> {
    pub fn new(
        manifest: &'a Manifest,
        converters: &'a ConverterSet,
        work_area: &'a WorkArea,
        runner: &'a ToolRunner,
        options: PipelineOptions,
    ) -> Self {
        Self {
            manifest,
            converters,
            work_area,
            runner,
            options,
            cache: None,
        }
    }

    /// Reuses verdicts from `cache` for dumps that haven't changed.
    pub fn with_cache(mut self, cache: &'a VerificationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Verifies `dumps` on `jobs` worker threads. Verdicts come back in
    /// Datfile order, with dumps that matched no game last.
    pub fn run(&self, dumps: &[PathBuf], jobs: usize) -> VerifyResult<Vec<Verdict>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .map_err(|err| {
                VerifyError::ConfigurationError(format!(
                    "Failed to configure verification thread pool: {err}"
                ))
            })?;
        let mut verdicts: Vec<Verdict> =
            pool.install(|| dumps.par_iter().map(|dump| self.verify_dump(dump)).collect());
        self.sort_verdicts(&mut verdicts);
        Ok(verdicts)
    }

    pub fn sort_verdicts(&self, verdicts: &mut [Verdict]) {
        verdicts.sort_by(|a, b| {
            let key = |verdict: &Verdict| {
                verdict
                    .game_name
                    .as_deref()
                    .and_then(|name| self.manifest.position(name))
                    .unwrap_or(usize::MAX)
            };
            key(a)
                .cmp(&key(b))
                .then_with(|| a.dump_path.cmp(&b.dump_path))
        });
    }

    /// Runs one dump through every stage.
    pub fn verify_dump(&self, dump: &Path) -> Verdict {
        debug!("Verifying dump file \"{}\"", dump.display());
        let mut progress = Progress {
            dump,
            stage: Stage::Pending,
            game_name: None,
            fingerprint: None,
        };
        match self.try_verify(dump, &mut progress) {
            Ok(mut verdict) => {
                verdict.fingerprint = progress.fingerprint;
                verdict
            }
            Err(err) => {
                error!("{}", err);
                Verdict {
                    game_name: progress.game_name,
                    dump_path: dump.to_path_buf(),
                    status: VerdictStatus::Failed,
                    stage: progress.stage,
                    detail: vec![err.as_finding()],
                    cue: None,
                    from_cache: false,
                    fingerprint: progress.fingerprint,
                }
            }
        }
    }

    fn try_verify(&self, dump: &Path, progress: &mut Progress<'_>) -> VerifyResult<Verdict> {
        if self.runner.cancel_token().is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        // Taken before conversion so a file replaced mid-run is never
        // cached under the verdict of the bytes it replaced.
        progress.fingerprint = DumpFingerprint::of(dump).ok();
        if let Some(verdict) = self.cached(dump, progress.fingerprint.as_ref()) {
            return Ok(verdict);
        }
        let converter = self.converters.for_path(dump).ok_or_else(|| {
            VerifyError::UnsupportedFormat {
                extension: crate::convert::extension_of(dump)
                    .map(|ext| format!(".{ext}"))
                    .unwrap_or_default(),
            }
        })?;

        progress.enter(Stage::Converting);
        // Dropped on every path out of this function, taking the
        // reconstructed files with it.
        let work = self.work_area.acquire(dump)?;
        let request = ConversionRequest {
            source: dump,
            output_dir: work.dump_dir(),
            scratch_dir: work.scratch_dir(),
            system: self.manifest.system(),
            runner: self.runner,
        };
        let reconstruction = converter.convert(&request)?;

        progress.enter(Stage::Hashing);
        match reconstruction {
            Reconstruction::Digest {
                file_name,
                algorithm,
                hex,
            } => {
                let game = self.match_digest(dump, &file_name, algorithm, &hex)?;
                progress.game_name = Some(game.name.clone());
                Ok(self.conclude(dump, game, Stage::Hashing, CueOutcomeOrNone::NotNeeded))
            }
            Reconstruction::Files => {
                let game = self.identify(work.dump_dir())?;
                progress.game_name = Some(game.name.clone());
                check_no_extra_files(work.dump_dir(), game)?;
                hash_payloads(work.dump_dir(), game)?;

                let Some(descriptor) = game.descriptor() else {
                    return Ok(self.conclude(
                        dump,
                        game,
                        Stage::Hashing,
                        CueOutcomeOrNone::NotNeeded,
                    ));
                };
                progress.enter(Stage::CueCheck);
                let outcome = cue_check::check_descriptor(
                    work.dump_dir(),
                    descriptor,
                    self.options.extra_cue_source.as_deref(),
                )?;
                Ok(self.conclude(
                    dump,
                    game,
                    Stage::CueCheck,
                    CueOutcomeOrNone::Checked(outcome),
                ))
            }
        }
    }

    fn cached(&self, dump: &Path, fingerprint: Option<&DumpFingerprint>) -> Option<Verdict> {
        let cache = self.cache?;
        let (record, game) = cache.lookup(fingerprint?, self.manifest)?;
        let status = self.status_for(record.cue);
        if !status.is_success() {
            return None;
        }
        info!("Dump verified correct and complete (cached): \"{}\"", game.name);
        Some(Verdict {
            game_name: Some(game.name.clone()),
            dump_path: dump.to_path_buf(),
            status,
            stage: match record.cue {
                CueStatus::NotNeeded => Stage::Hashing,
                _ => Stage::CueCheck,
            },
            detail: vec!["Result reused from the verification cache".into()],
            cue: Some(record.cue),
            from_cache: true,
            fingerprint: None,
        })
    }

    fn status_for(&self, cue: CueStatus) -> VerdictStatus {
        match cue {
            CueStatus::NotNeeded | CueStatus::ExactMatch => VerdictStatus::Verified,
            CueStatus::EssentialsMatch => VerdictStatus::Caveat,
            CueStatus::NoExtraCue | CueStatus::Mismatch
                if self.options.allow_cue_file_mismatches =>
            {
                VerdictStatus::Caveat
            }
            CueStatus::NoExtraCue | CueStatus::Mismatch => VerdictStatus::Failed,
        }
    }

    fn conclude(
        &self,
        dump: &Path,
        game: &ManifestGame,
        stage: Stage,
        cue: CueOutcomeOrNone,
    ) -> Verdict {
        let status_cue = match &cue {
            CueOutcomeOrNone::NotNeeded => CueStatus::NotNeeded,
            CueOutcomeOrNone::Checked(outcome) => outcome.status(),
        };
        let status = self.status_for(status_cue);
        let name = &game.name;
        let mut detail = Vec::new();
        match cue {
            CueOutcomeOrNone::NotNeeded | CueOutcomeOrNone::Checked(CueOutcome::ExactMatch) => {
                info!("Dump verified correct and complete: \"{name}\"");
                detail.push("Dump verified correct and complete".to_string());
            }
            CueOutcomeOrNone::Checked(CueOutcome::EssentialsMatch { ignored }) => {
                info!("Dump .bin files verified correct and complete, and .cue essential structure matches: \"{name}\"");
                detail.push(
                    "Dump .bin files verified correct and complete, and .cue essential structure matches"
                        .to_string(),
                );
                detail.extend(ignored.iter().map(|difference| {
                    format!(
                        "ignored {difference} ({})",
                        difference.field.exclusion_reason().unwrap_or("excluded field")
                    )
                }));
            }
            CueOutcomeOrNone::Checked(CueOutcome::NoExtraCue) => {
                let message = format!(
                    "\"{name}\" .bin files verified and complete, but .cue does not match Datfile"
                );
                if status.is_success() {
                    warn!("{message}");
                    detail.push(message);
                } else {
                    error!("{message}");
                    detail.push(message);
                    detail.push(
                        "You can either supply the original .cue file yourself using the '--extra-cue-source' option so that we can check that the generated .cue file's essential structure is correct, or ignore .cue file errors with the '--allow-cue-file-mismatches' option"
                            .to_string(),
                    );
                }
            }
            CueOutcomeOrNone::Checked(CueOutcome::Mismatch { differences }) => {
                let err = VerifyError::StructuralCueMismatch {
                    name: game
                        .descriptor()
                        .map(|file| file.name.clone())
                        .unwrap_or_else(|| name.clone()),
                    fields: differences.iter().map(ToString::to_string).collect(),
                };
                let message = format!(
                    "\"{name}\" .bin files verified and complete, but .cue does not match Datfile or essential structure from extra .cue source"
                );
                if status.is_success() {
                    warn!("{message}");
                    detail.push(message);
                    detail.push(err.as_finding());
                } else {
                    error!("{message}");
                    detail.push(err.as_finding());
                    detail.push(
                        "You can choose to ignore .cue file errors with the '--allow-cue-file-mismatches' option"
                            .to_string(),
                    );
                }
            }
        }
        Verdict {
            game_name: Some(name.clone()),
            dump_path: dump.to_path_buf(),
            status,
            stage,
            detail,
            cue: Some(status_cue),
            from_cache: false,
            fingerprint: None,
        }
    }

    /// Finds the game by the names of the reconstructed files, falling back to
    /// SHA-1 to explain a dump whose files carry the wrong names.
    fn identify(&self, dump_dir: &Path) -> VerifyResult<&'a ManifestGame> {
        let files = list_dump_files(dump_dir)?;
        if files.is_empty() {
            return Err(VerifyError::tool("No game files found in dump folder", None));
        }
        // Payloads name the game more reliably than the cue.
        let mut ordered: Vec<&String> = files.iter().filter(|f| !is_cue(f)).collect();
        ordered.extend(files.iter().filter(|f| is_cue(f)));

        for file in &ordered {
            let candidates = self.manifest.games_declaring_file(file);
            if let Some(game) = candidates
                .iter()
                .max_by_key(|game| {
                    // Most declared files first; ties go to the earliest game.
                    let declared = files.iter().filter(|f| game.file(f).is_some()).count();
                    (declared, std::cmp::Reverse(self.manifest.position(&game.name)))
                })
                .copied()
            {
                debug!("Dump file \"{file}\" identifies game \"{}\"", game.name);
                return Ok(game);
            }
        }

        let first = ordered[0];
        let path = dump_dir.join(first);
        let (_, digests) = hashing::digest_file(&path, [ChecksumKind::Sha1])
            .map_err(|err| VerifyError::io("Failed to hash dump file", &path, err))?;
        let sha1 = digests.get(&ChecksumKind::Sha1).cloned().unwrap_or_default();
        let named = self.manifest.files_with_sha1(&sha1);
        if named.is_empty() {
            return Err(VerifyError::UnknownDump {
                name: first.to_string(),
            });
        }
        Err(VerifyError::Misnamed {
            name: first.to_string(),
            expected: quoted_alternatives(named.iter().map(|(_, file)| file.name.clone())),
        })
    }

    /// Matches a digest-only reconstruction against the Datfile.
    fn match_digest(
        &self,
        dump: &Path,
        file_name: &str,
        algorithm: ChecksumKind,
        hex: &str,
    ) -> VerifyResult<&'a ManifestGame> {
        let declared = self.manifest.games_declaring_file(file_name);
        let mut expected_digest = None;
        for game in &declared {
            let Some(file) = game.file(file_name) else {
                continue;
            };
            let Some(expected) = file.checksums.get(&algorithm) else {
                return Err(VerifyError::ConfigurationError(format!(
                    "Datfile entry for \"{file_name}\" has no {algorithm} to compare against"
                )));
            };
            if expected.eq_ignore_ascii_case(hex) {
                debug!("Dump file \"{file_name}\" found in Datfile and verified");
                return Ok(*game);
            }
            expected_digest.get_or_insert_with(|| expected.clone());
        }

        let dump_name = dump
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dump_ext = crate::convert::extension_of(dump).unwrap_or_default();
        let same_content = self.manifest.files_with_sha1(hex);
        if algorithm == ChecksumKind::Sha1 && !same_content.is_empty() {
            let expected = quoted_alternatives(same_content.iter().map(|(_, file)| {
                Path::new(&file.name)
                    .with_extension(&dump_ext)
                    .to_string_lossy()
                    .into_owned()
            }));
            return Err(VerifyError::Misnamed {
                name: dump_name,
                expected,
            });
        }
        match expected_digest {
            Some(expected) => Err(VerifyError::ChecksumMismatch {
                name: file_name.to_string(),
                algorithm,
                expected,
                actual: hex.to_ascii_lowercase(),
            }),
            None => Err(VerifyError::UnknownDump { name: dump_name }),
        }
    }
}

/// Whether the cue check ran for a dump.
enum CueOutcomeOrNone {
    NotNeeded,
    Checked(CueOutcome),
}

/// Every reconstructed file must belong to the identified game.
fn check_no_extra_files(dump_dir: &Path, game: &ManifestGame) -> VerifyResult<()> {
    for name in list_dump_files(dump_dir)? {
        if game.file(&name).is_none() {
            return Err(VerifyError::UnexpectedFile {
                name,
                game: game.name.clone(),
            });
        }
    }
    Ok(())
}

/// Hashes every payload; stops at the first one that doesn't match.
fn hash_payloads(dump_dir: &Path, game: &ManifestGame) -> VerifyResult<()> {
    for expected in game.payloads() {
        let path = dump_dir.join(&expected.name);
        if !path.is_file() {
            return Err(VerifyError::MissingFile {
                name: expected.name.clone(),
            });
        }
        let result = hashing::verify(&path, expected)
            .map_err(|err| VerifyError::io("Failed to hash dump file", &path, err))?;
        if let Some(err) = result.into_error(&expected.name) {
            return Err(err);
        }
        debug!("Dump file \"{}\" found in Datfile and verified", expected.name);
    }
    Ok(())
}

fn list_dump_files(dir: &Path) -> VerifyResult<Vec<String>> {
    let entries =
        fs::read_dir(dir).map_err(|err| VerifyError::io("Failed to list dump folder", dir, err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| VerifyError::io("Failed to list dump folder", dir, err))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_file() {
            return Err(VerifyError::tool(
                format!("Unexpected non-file in dump folder: {name}"),
                None,
            ));
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn is_cue(name: &str) -> bool {
    crate::dat::has_cue_extension(name)
}

fn quoted_alternatives(names: impl Iterator<Item = String>) -> String {
    names
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(" or ")
}
