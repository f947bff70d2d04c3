// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Command implementations

pub mod audit;
pub mod branches;
pub mod completions;
pub mod repos;
pub mod sync;
pub mod version;

use crate::cleanup::Failure;
use crate::config::Config;
use crate::git::Vcs;
use crate::metrics::{fingerprint, Metrics};
use crate::platform::Platform;
use crate::scanner::Scanner;
use crate::types::RepoHandle;
use crate::ui::{Tone, Ui};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::info;

/// Everything a command needs besides the terminal
pub struct Session<'a> {
    /// Loaded configuration
    pub config: &'a Config,
    /// Decide and report, but change nothing
    pub dry_run: bool,
    /// git backend
    pub vcs: &'a dyn Vcs,
    /// Forge client, absent when disabled
    pub platform: Option<&'a dyn Platform>,
    /// Metrics sink
    pub metrics: &'a dyn Metrics,
    /// Reference time for ages
    pub now: DateTime<Utc>,
}

impl Session<'_> {
    /// All checkouts under the projects root
    pub fn discover(&self) -> Result<Vec<RepoHandle>> {
        let started = Instant::now();
        let root = &self.config.projects_dir;
        let scanner = Scanner::new(&self.config.exclude).context("Invalid exclude pattern")?;
        let repos = scanner
            .scan(root)
            .with_context(|| format!("Failed to scan {}", root.display()))?;
        info!(root = %root.display(), count = repos.len(), "discovered checkouts");
        self.metrics.perf("discover", repos.len(), started.elapsed());
        Ok(repos)
    }

    /// Log whether the user took an offered item
    pub fn suggestion(&self, kind: &str, parts: &[&str], accepted: bool, age_days: Option<i64>) {
        self.metrics
            .suggestion(kind, fingerprint(parts), accepted, age_days);
    }
}

/// Standard line for an empty projects root
pub(crate) fn nothing_found(ui: &mut dyn Ui, session: &Session<'_>) -> Result<()> {
    ui.say(
        Tone::Dim,
        &format!(
            "No repositories found in {}, nothing found to do",
            session.config.projects_dir.display()
        ),
    )?;
    Ok(())
}

/// Print failures; error out if there were any
pub(crate) fn finish(ui: &mut dyn Ui, failed: &[Failure]) -> Result<()> {
    for f in failed {
        ui.say(Tone::Bad, &format!("  failed: {}: {}", f.item, f.reason))?;
    }
    if !failed.is_empty() {
        bail!("{} action(s) failed", failed.len());
    }
    Ok(())
}

/// `1 branch` / `2 branches`, `1 repository` / `3 repositories`
pub(crate) fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else if let Some(stem) = word.strip_suffix('y') {
        format!("{n} {stem}ies")
    } else if word.ends_with("ch") || word.ends_with('s') || word.ends_with('x') {
        format!("{n} {word}es")
    } else {
        format!("{n} {word}s")
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "branch"), "1 branch");
        assert_eq!(plural(2, "branch"), "2 branches");
        assert_eq!(plural(0, "repository"), "0 repositories");
        assert_eq!(plural(3, "checkout"), "3 checkouts");
    }
}
