//! Configuration primitives for verifydump.
//!
//! Stored in a TOML file located at:
//!   $VERIFYDUMP_HOME/config.toml when the variable is set, otherwise
//!   %APPDATA%/verifydump/config/config.toml on Windows
//!   $XDG_CONFIG_HOME/verifydump/config.toml on Linux
//!   ~/Library/Application Support/verifydump/config.toml on macOS
//!
//! Command-line flags override anything read from the file.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Standard file name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable that relocates config and cache.
pub const HOME_ENV: &str = "VERIFYDUMP_HOME";

/// Root configuration persisted per installation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// External conversion tools.
    #[serde(default)]
    pub tools: ToolSettings,
    /// Worker pool and pipeline defaults.
    #[serde(default)]
    pub verification: VerificationSettings,
    /// Where verified results are remembered between runs.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Represents an invocable tool + optional leading args.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolBinary {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolBinary {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_chdman")]
    pub chdman: ToolBinary,
    #[serde(default = "default_binmerge")]
    pub binmerge: ToolBinary,
    #[serde(default = "default_dolphin_tool")]
    pub dolphin_tool: ToolBinary,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            chdman: default_chdman(),
            binmerge: default_binmerge(),
            dolphin_tool: default_dolphin_tool(),
        }
    }
}

fn default_chdman() -> ToolBinary {
    ToolBinary::new("chdman")
}

fn default_binmerge() -> ToolBinary {
    ToolBinary::new("binmerge")
}

fn default_dolphin_tool() -> ToolBinary {
    ToolBinary::new("DolphinTool")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Number of dumps verified concurrently. 0 means one per CPU.
    #[serde(default)]
    pub jobs: u32,
    /// Wall-clock limit for a single external tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Accept cue sheets that can't be confirmed as a caveat instead of failing.
    #[serde(default)]
    pub allow_cue_file_mismatches: bool,
    /// Directory that receives per-dump scratch folders (system temp dir when unset).
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            jobs: 0,
            tool_timeout_secs: default_tool_timeout_secs(),
            allow_cue_file_mismatches: false,
            work_dir: None,
        }
    }
}

const fn default_tool_timeout_secs() -> u64 {
    3600
}

impl VerificationSettings {
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs as usize;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }

    pub fn effective_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Cache file location (data dir when unset).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: None,
        }
    }
}

const fn default_cache_enabled() -> bool {
    true
}

impl CacheSettings {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("verify-cache.json")),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "verifydump").context("Unable to determine OS config directory")
}

/// Directory holding `config.toml`.
///
/// Order of precedence:
/// 1. `VERIFYDUMP_HOME` environment variable.
/// 2. OS-specific config directory via `directories::ProjectDirs`.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(path) = env::var(HOME_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Directory holding the verification cache.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(path) = env::var(HOME_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(project_dirs()?.data_dir().to_path_buf())
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads the configuration from disk or returns defaults.
pub fn load_or_default() -> Result<AppConfig> {
    let path = config_file_path()?;
    if path.exists() {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let cfg: AppConfig = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

/// Persists the configuration to disk.
pub fn save(config: &AppConfig) -> Result<()> {
    let dir = config_dir()?;
    fs::create_dir_all(&dir)?;
    let path = config_file_path()?;
    let data = toml::to_string_pretty(config)?;
    fs::write(&path, data)?;
    Ok(())
}
