// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Sync command - fetch and fast-track every checkout

use super::{nothing_found, plural, Session};
use crate::sync::SyncEngine;
use crate::types::{RepoHandle, SyncResult, SyncStatus};
use crate::ui::{Tone, Ui};
use anyhow::{bail, Context, Result};
use globset::Glob;
use std::time::Instant;
use tracing::debug;

fn tone(status: SyncStatus) -> Tone {
    match status {
        SyncStatus::Synced | SyncStatus::Switched => Tone::Good,
        SyncStatus::UpToDate => Tone::Dim,
        SyncStatus::Skipped => Tone::Warn,
        SyncStatus::Failed => Tone::Bad,
    }
}

/// Checkouts whose directory name matches `pattern`
pub fn filter_repos(repos: Vec<RepoHandle>, pattern: Option<&str>) -> Result<Vec<RepoHandle>> {
    let Some(pattern) = pattern else {
        return Ok(repos);
    };
    let matcher = Glob::new(pattern)
        .with_context(|| format!("Invalid pattern {pattern:?}"))?
        .compile_matcher();
    Ok(repos.into_iter().filter(|r| matcher.is_match(&r.name)).collect())
}

/// Run the sync command
pub fn run(session: &Session<'_>, ui: &mut dyn Ui, pattern: Option<&str>) -> Result<()> {
    let repos = filter_repos(session.discover()?, pattern)?;
    if repos.is_empty() {
        return nothing_found(ui, session);
    }

    let started = Instant::now();
    let total = repos.len();
    let options = session.config.sync.options(session.dry_run);
    let engine = SyncEngine::new(session.vcs, session.platform, options);
    let mut results = engine.sync_all(repos, session.config.workers, |done, total, r: &SyncResult| {
        let line = format!("[{done}/{total}] {}: {} - {}", r.repo_name, r.status, r.message);
        if let Err(e) = ui.say(tone(r.status), &line) {
            debug!("cannot print progress: {e}");
        }
    });
    session.metrics.perf("sync", total, started.elapsed());
    results.sort_by(|a, b| a.repo_name.cmp(&b.repo_name));

    let count = |s: SyncStatus| results.iter().filter(|r| r.status == s).count();
    let failed = count(SyncStatus::Failed);
    let pulled: usize = results.iter().map(|r| r.commits_pulled).sum();
    let summary = format!(
        "{}: {} synced, {} switched, {} up to date, {} skipped, {failed} failed ({} pulled)",
        plural(total, "repository"),
        count(SyncStatus::Synced),
        count(SyncStatus::Switched),
        count(SyncStatus::UpToDate),
        count(SyncStatus::Skipped),
        plural(pulled, "commit"),
    );
    ui.say(if failed > 0 { Tone::Warn } else { Tone::Heading }, &summary)?;

    if failed > 0 {
        for r in results.iter().filter(|r| r.status == SyncStatus::Failed) {
            ui.say(Tone::Bad, &format!("  {}: {}", r.repo_name, r.message))?;
        }
        bail!("{} failed to sync", plural(failed, "repository"));
    }
    Ok(())
}
