use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use verifydump::cache::VerificationCache;
use verifydump::convert::{CancelToken, ConverterSet, ToolRunner};
use verifydump::verify::{Pipeline, PipelineOptions, Verdict, WorkArea};
use verifydump::Manifest;

use support::FakeConverter;

pub struct IntegrationHarness {
    workspace: TempDir,
}

impl IntegrationHarness {
    pub fn new() -> Self {
        let workspace = TempDir::new().expect("failed to create temp workspace");
        fs::create_dir_all(workspace.path().join("dumps")).expect("failed to create dumps folder");
        Self { workspace }
    }

    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    /// Creates a placeholder compressed dump; the fake converter never reads it.
    pub fn dump(&self, file_name: &str) -> PathBuf {
        let path = self.workspace.path().join("dumps").join(file_name);
        fs::write(&path, file_name.as_bytes()).expect("failed to write dump");
        path
    }

    pub fn work_root(&self) -> PathBuf {
        self.workspace.path().join("work")
    }

    /// Work directories still on disk after a run.
    pub fn leftover_work_dirs(&self) -> usize {
        fs::read_dir(self.work_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn runner(&self) -> ToolRunner {
        ToolRunner::new(Duration::from_secs(30), CancelToken::new())
    }

    pub fn verify(
        &self,
        manifest: &Manifest,
        converter: FakeConverter,
        options: PipelineOptions,
        dumps: &[PathBuf],
    ) -> Vec<Verdict> {
        self.verify_with_cache(manifest, converter, options, dumps, None)
    }

    pub fn verify_with_cache(
        &self,
        manifest: &Manifest,
        converter: FakeConverter,
        options: PipelineOptions,
        dumps: &[PathBuf],
        cache: Option<&VerificationCache>,
    ) -> Vec<Verdict> {
        let converters = ConverterSet::empty().with(converter);
        let area = WorkArea::new(self.work_root());
        let runner = self.runner();
        let mut pipeline = Pipeline::new(manifest, &converters, &area, &runner, options);
        if let Some(cache) = cache {
            pipeline = pipeline.with_cache(cache);
        }
        pipeline.run(dumps, 4).expect("pipeline should run")
    }
}

mod cue_sources;
mod run_behaviour;
mod scenarios;
pub mod support;
