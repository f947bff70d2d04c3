// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Configuration management
//!
//! Layers, lowest first: built-in defaults, the YAML config file, then
//! `KATAZUKE_*` environment variables (`__` separates nested keys, so
//! `KATAZUKE_SYNC__STRATEGY=merge`; `KATAZUKE_EXCLUDE` takes a comma list).

use crate::error::ConfigError;
use crate::sync::SyncOptions;
use crate::types::Strategy;
use config::{Environment, File, FileFormat, Map};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default stale threshold in days
pub const DEFAULT_STALE_DAYS: u32 = 30;

/// Default worker count
pub const DEFAULT_WORKERS: usize = 4;

const ENV_PREFIX: &str = "KATAZUKE";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hyperpolymath", "katazuke")
}

/// `<config-home>/katazuke/config.yaml`
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.yaml"))
}

/// Where metrics go: `<data-dir>/metrics`, with `<data-home>/katazuke` as
/// the default data dir
#[must_use]
pub fn metrics_dir(data_dir: Option<&Path>) -> Option<PathBuf> {
    data_dir
        .map(Path::to_path_buf)
        .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
        .map(|d| d.join("metrics"))
}

/// Sync section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Pull strategy
    pub strategy: Strategy,
    /// Leave dirty default branches alone
    pub skip_dirty: bool,
    /// Stash local changes around the pull
    pub auto_stash: bool,
    /// Move off already-merged branches
    pub switch_merged_branch: bool,
}

impl SyncConfig {
    /// Engine options for a run
    #[must_use]
    pub fn options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            strategy: self.strategy,
            skip_dirty: self.skip_dirty,
            auto_stash: self.auto_stash,
            switch_merged_branch: self.switch_merged_branch,
            dry_run,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the checkouts tree
    pub projects_dir: PathBuf,
    /// Days without a commit before a branch counts as stale
    pub stale_days: u32,
    /// Forge API token
    pub github_token: Option<String>,
    /// Ask the forge about squash-merges and archived repositories
    pub github_api: bool,
    /// Base-name globs skipped during discovery
    pub exclude: Vec<String>,
    /// Parallel workers
    pub workers: usize,
    /// Write local usage metrics
    pub metrics: bool,
    /// Sync settings
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    projects_dir: Option<PathBuf>,
    stale_days: i64,
    github_token: Option<String>,
    github_api: bool,
    exclude: Vec<String>,
    workers: Option<i64>,
    metrics: bool,
    sync: RawSync,
}

#[derive(Debug, Deserialize)]
struct RawSync {
    strategy: String,
    skip_dirty: bool,
    auto_stash: bool,
    switch_merged_branch: bool,
    /// Deprecated; see [`Config::workers`]
    workers: Option<i64>,
}

/// Where configuration is read from
#[derive(Debug, Clone, Default)]
pub struct Sources {
    /// Config file
    pub file: Option<PathBuf>,
    /// Fail if the file is missing (it was named explicitly)
    pub file_required: bool,
    /// Environment variables; `None` reads the process environment
    pub env: Option<Map<String, String>>,
    /// Home directory for `~` and the default projects dir
    pub home: Option<PathBuf>,
}

impl Sources {
    /// The real environment, with an optional explicitly named config file
    #[must_use]
    pub fn system(explicit: Option<PathBuf>) -> Self {
        let file_required = explicit.is_some();
        Self {
            file: explicit.or_else(default_config_file),
            file_required,
            env: None,
            home: BaseDirs::new().map(|d| d.home_dir().to_path_buf()),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        match &self.env {
            Some(map) => map.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
        .filter(|v| !v.is_empty())
    }
}

fn positive(value: i64, name: &'static str) -> Result<usize, ConfigError> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or(ConfigError::NotPositive(name))
}

fn expand_home(path: PathBuf, home: Option<&Path>) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => Some(home.join(rest)),
        _ => None,
    };
    expanded.unwrap_or(path)
}

/// Load and validate configuration
pub fn load(sources: &Sources) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("stale_days", i64::from(DEFAULT_STALE_DAYS))?
        .set_default("github_api", true)?
        .set_default("exclude", Vec::<String>::new())?
        .set_default("metrics", true)?
        .set_default("sync.strategy", Strategy::default().as_str())?
        .set_default("sync.skip_dirty", false)?
        .set_default("sync.auto_stash", true)?
        .set_default("sync.switch_merged_branch", true)?;

    if let Some(file) = &sources.file {
        builder = builder.add_source(
            File::from(file.as_path())
                .format(FileFormat::Yaml)
                .required(sources.file_required),
        );
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("exclude")
            .try_parsing(true)
            .source(sources.env.clone()),
    );

    let raw: RawConfig = builder.build()?.try_deserialize()?;
    let strategy: Strategy = raw.sync.strategy.parse()?;

    let workers = match (raw.workers, raw.sync.workers) {
        (Some(top), _) => positive(top, "workers")?,
        (None, Some(nested)) => {
            warn!("sync.workers is deprecated; use the top-level workers option");
            positive(nested, "sync.workers")?
        }
        (None, None) => DEFAULT_WORKERS,
    };
    let stale_days = positive(raw.stale_days, "stale_days")?;
    let stale_days = u32::try_from(stale_days).map_err(|_| ConfigError::NotPositive("stale_days"))?;

    let home = sources.home.as_deref();
    let projects_dir = match raw.projects_dir {
        Some(dir) => expand_home(dir, home),
        None => home.ok_or(ConfigError::NoHome)?.join("projects"),
    };

    let github_token = raw
        .github_token
        .filter(|t| !t.is_empty())
        .or_else(|| sources.var("GITHUB_TOKEN"))
        .or_else(|| sources.var("GH_TOKEN"));

    Ok(Config {
        projects_dir,
        stale_days,
        github_token,
        github_api: raw.github_api,
        exclude: raw.exclude,
        workers,
        metrics: raw.metrics,
        sync: SyncConfig {
            strategy,
            skip_dirty: raw.sync.skip_dirty,
            auto_stash: raw.sync.auto_stash,
            switch_merged_branch: raw.sync.switch_merged_branch,
        },
    })
}
