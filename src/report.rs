//! Summary of a verification run.

use crate::verify::{Verdict, VerdictStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// System named in the Datfile header.
    pub system: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub verdicts: Vec<Verdict>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub verified: usize,
    pub caveat: usize,
    pub failed: usize,
}

impl RunReport {
    /// Completes a run that started at `started_at`.
    pub fn new(system: Option<String>, started_at: DateTime<Utc>, verdicts: Vec<Verdict>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            system,
            started_at,
            completed_at: Utc::now(),
            verdicts,
        }
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for verdict in &self.verdicts {
            match verdict.status {
                VerdictStatus::Verified => counts.verified += 1,
                VerdictStatus::Caveat => counts.caveat += 1,
                VerdictStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Lines printed at the end of a run: one per failed dump, then totals.
    pub fn summary_lines(&self) -> Vec<String> {
        let counts = self.counts();
        let mut lines = Vec::new();
        for verdict in &self.verdicts {
            if verdict.status != VerdictStatus::Failed {
                continue;
            }
            lines.push(format!("FAILED {}", verdict.label()));
            for detail in &verdict.detail {
                // Trailing whitespace in captured tool output is dropped only here.
                for line in detail.trim_end().lines() {
                    lines.push(format!("  {}", line.trim_end()));
                }
            }
        }
        let cached = self.verdicts.iter().filter(|v| v.from_cache).count();
        lines.push(format!(
            "Successfully verified {} dump(s) ({} with caveats, {} from cache), {} failed.",
            counts.verified + counts.caveat,
            counts.caveat,
            cached,
            counts.failed
        ));
        lines
    }

    /// 0 when no dump failed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.counts().failed == 0 {
            0
        } else {
            1
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {:?}", parent))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("Failed to write report {:?}", path))?;
        Ok(())
    }
}
