// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Katazuke CLI - tidy up a tree of git checkouts

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use katazuke::commands::{self, branches::BranchesArgs, repos::ReposArgs, Session};
use katazuke::config::{self, Config, Sources};
use katazuke::git::Git;
use katazuke::metrics::{FileMetrics, Metrics, NoopMetrics};
use katazuke::platform::{resolve_token, GitHub, Platform};
use katazuke::ui::Terminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "katazuke")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Show what would happen without changing anything
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Root of the checkouts tree
    #[arg(short, long, env = "KATAZUKE_PROJECTS_DIR", global = true)]
    projects_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "KATAZUKE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long, env = "KATAZUKE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Take the default answer at every prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete merged and stale branches
    Branches {
        /// Only branches merged into the default branch
        #[arg(long)]
        merged: bool,

        /// Only branches without recent commits
        #[arg(long)]
        stale: bool,

        /// Days without a commit before a branch is stale
        #[arg(long)]
        stale_days: Option<u32>,
    },

    /// Checkouts on merged branches or of archived repositories
    Repos {
        /// Only checkouts whose upstream is archived
        #[arg(long)]
        archived: bool,

        /// Only checkouts sitting on a merged branch
        #[arg(long)]
        merged: bool,
    },

    /// Look for things under the projects root that are not checkouts
    Audit {
        /// Directories that are not git checkouts
        #[arg(long)]
        non_git: bool,
    },

    /// Fetch and update every checkout
    Sync {
        /// Only checkouts whose directory name matches this glob
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Print version and build details
    Version,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: clap_complete::Shell,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Branches { .. } => "branches",
            Self::Repos { .. } => "repos",
            Self::Audit { .. } => "audit",
            Self::Sync { .. } => "sync",
            Self::Version => "version",
            Self::Completions { .. } => "completions",
        }
    }

    /// Names of the flags that were given, never their values
    fn flags(&self, cli: &Cli) -> Vec<String> {
        let mut flags = Vec::new();
        let mut flag = |set: bool, name: &str| {
            if set {
                flags.push(name.to_string());
            }
        };
        flag(cli.dry_run, "dry-run");
        flag(cli.yes, "yes");
        flag(cli.projects_dir.is_some(), "projects-dir");
        match self {
            Self::Branches { merged, stale, stale_days } => {
                flag(*merged, "merged");
                flag(*stale, "stale");
                flag(stale_days.is_some(), "stale-days");
            }
            Self::Repos { archived, merged } => {
                flag(*archived, "archived");
                flag(*merged, "merged");
            }
            Self::Audit { non_git } => flag(*non_git, "non-git"),
            Self::Sync { pattern } => flag(pattern.is_some(), "pattern"),
            Self::Version | Self::Completions { .. } => {}
        }
        flags
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = config::load(&Sources::system(cli.config.clone()))
        .context("Failed to load configuration")?;
    if let Some(dir) = &cli.projects_dir {
        config.projects_dir.clone_from(dir);
    }
    debug!(projects_dir = %config.projects_dir.display(), workers = config.workers, "configuration loaded");
    Ok(config)
}

fn github(config: &Config) -> Option<GitHub> {
    if !config.github_api {
        return None;
    }
    match GitHub::new(resolve_token(config.github_token.as_deref())) {
        Ok(client) => {
            debug!(authenticated = client.is_authenticated(), "GitHub client ready");
            Some(client)
        }
        Err(e) => {
            debug!("GitHub client unavailable: {e}");
            None
        }
    }
}

fn metrics(config: &Config, data_dir: Option<&PathBuf>) -> Box<dyn Metrics> {
    if !config.metrics {
        return Box::new(NoopMetrics);
    }
    match config::metrics_dir(data_dir.map(PathBuf::as_path)) {
        Some(dir) => Box::new(FileMetrics::new(dir)),
        None => Box::new(NoopMetrics),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let vcs = Git::new();
    let forge = github(&config);
    let metrics = metrics(&config, cli.data_dir.as_ref());
    let mut ui = Terminal::stdio(cli.yes);

    let session = Session {
        config: &config,
        dry_run: cli.dry_run,
        vcs: &vcs,
        platform: forge.as_ref().map(|g| g as &dyn Platform),
        metrics: metrics.as_ref(),
        now: chrono::Utc::now(),
    };

    let started = Instant::now();
    let result = match &cli.command {
        Commands::Branches { merged, stale, stale_days } => commands::branches::run(
            &session,
            &mut ui,
            BranchesArgs {
                merged: *merged,
                stale: *stale,
                stale_days: *stale_days,
            },
        ),
        Commands::Repos { archived, merged } => commands::repos::run(
            &session,
            &mut ui,
            ReposArgs {
                archived: *archived,
                merged: *merged,
            },
        ),
        Commands::Audit { non_git } => commands::audit::run(&session, &mut ui, *non_git),
        Commands::Sync { pattern } => commands::sync::run(&session, &mut ui, pattern.as_deref()),
        Commands::Version | Commands::Completions { .. } => Ok(()),
    };
    let exit_code = i32::from(result.is_err());
    metrics.command(
        cli.command.name(),
        cli.command.flags(cli),
        started.elapsed(),
        exit_code,
    );
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Version => commands::version::run(&mut std::io::stdout()),
        Commands::Completions { shell } => {
            commands::completions::run(*shell, &mut Cli::command(), &mut std::io::stdout())
        }
        _ => run(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
