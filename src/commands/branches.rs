// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Branches command - merged and stale branch cleanup

use super::{finish, nothing_found, plural, Session};
use crate::cleanup::{delete_branches, CleanupSummary, DeleteRequest, Failure};
use crate::format::{age_days, format_age};
use crate::merged::find_merged;
use crate::pool;
use crate::stale::{annotate_with_prs, find_stale, Tiers};
use crate::types::{BranchInfo, MergedBranch, RepoHandle, StaleBranch, StaleTier};
use crate::ui::{Choice, Tone, Ui};
use anyhow::Result;
use chrono::Duration;
use std::time::Instant;
use tracing::warn;

/// Which cleanups to offer
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchesArgs {
    /// Offer merged branches
    pub merged: bool,
    /// Offer stale branches
    pub stale: bool,
    /// Override the configured stale threshold
    pub stale_days: Option<u32>,
}

/// Run the branches command
pub fn run(session: &Session<'_>, ui: &mut dyn Ui, args: BranchesArgs) -> Result<()> {
    let (merged, stale) = if args.merged || args.stale {
        (args.merged, args.stale)
    } else {
        (true, true)
    };

    let repos = session.discover()?;
    if repos.is_empty() {
        return nothing_found(ui, session);
    }

    let mut failed: Vec<Failure> = Vec::new();
    if merged {
        failed.extend(merged_branches(session, ui, &repos)?.failed);
    }
    if stale {
        let days = args.stale_days.unwrap_or(session.config.stale_days);
        failed.extend(stale_branches(session, ui, &repos, days)?.failed);
    }
    finish(ui, &failed)
}

fn describe_branch(session: &Session<'_>, b: &BranchInfo) -> String {
    let age = format_age(age_days(b.last_commit, session.now));
    format!("{}/{}  ({age} old) {}", b.repo_name, b.name, b.last_commit_subject)
}

fn merged_branches(session: &Session<'_>, ui: &mut dyn Ui, repos: &[RepoHandle]) -> Result<CleanupSummary> {
    let started = Instant::now();
    let found = pool::run(
        repos.to_vec(),
        session.config.workers,
        |repo| {
            find_merged(session.vcs, session.platform, &repo).unwrap_or_else(|e| {
                warn!(repo = %repo.name, "skipping repository: {e}");
                Vec::new()
            })
        },
        |_, _, _| {},
    );
    let mut found: Vec<MergedBranch> = found.into_iter().flatten().collect();
    found.sort_by(|a, b| (&a.branch.repo_name, &a.branch.name).cmp(&(&b.branch.repo_name, &b.branch.name)));
    session.metrics.perf("merged-branches", repos.len(), started.elapsed());

    if found.is_empty() {
        ui.say(Tone::Good, "No merged branches found")?;
        return Ok(CleanupSummary::default());
    }

    let choices: Vec<Choice> = found
        .iter()
        .map(|m| {
            let label = format!("{}  [merged, via {}]", describe_branch(session, &m.branch), m.method);
            Choice::new(label, true)
        })
        .collect();

    if session.dry_run {
        report_dry_run(ui, "Merged branches", &choices)?;
        return Ok(CleanupSummary::default());
    }

    let picked = ui.select(&format!("Merged branches ({})", found.len()), &choices)?;
    for (i, m) in found.iter().enumerate() {
        let b = &m.branch;
        let path = b.repo_path.to_string_lossy();
        session.suggestion(
            "merged-branch",
            &[path.as_ref(), b.name.as_str()],
            picked.contains(&i),
            Some(age_days(b.last_commit, session.now)),
        );
    }
    let requests: Vec<DeleteRequest> = picked.iter().map(|&i| DeleteRequest::from(&found[i])).collect();
    execute(session, ui, &requests)
}

fn stale_label(session: &Session<'_>, s: &StaleBranch) -> String {
    let mut notes = vec![s.tier().to_string()];
    if s.branch.is_local_only {
        notes.push("local only".into());
    }
    if !s.is_own_branch {
        notes.push("other authors".into());
    }
    if let Some(n) = s.pr_number {
        notes.push(format!("PR #{n} merged"));
    }
    format!("{}  [{}]", describe_branch(session, &s.branch), notes.join(", "))
}

fn stale_branches(
    session: &Session<'_>,
    ui: &mut dyn Ui,
    repos: &[RepoHandle],
    days: u32,
) -> Result<CleanupSummary> {
    let started = Instant::now();
    let threshold = Duration::days(i64::from(days));
    let found = pool::run(
        repos.to_vec(),
        session.config.workers,
        |repo| {
            let stale = match find_stale(session.vcs, &repo, threshold, session.now) {
                Ok(stale) => stale,
                Err(e) => {
                    warn!(repo = %repo.name, "skipping repository: {e}");
                    return Vec::new();
                }
            };
            match session.platform {
                Some(platform) if !stale.is_empty() => annotate_with_prs(session.vcs, platform, &repo, stale),
                _ => stale,
            }
        },
        |_, _, _| {},
    );
    let mut found: Vec<StaleBranch> = found.into_iter().flatten().collect();
    found.sort_by(|a, b| (&a.branch.repo_name, &a.branch.name).cmp(&(&b.branch.repo_name, &b.branch.name)));
    session.metrics.perf("stale-branches", repos.len(), started.elapsed());

    let tiers = Tiers::split(found);
    if tiers.is_empty() {
        ui.say(Tone::Good, &format!("No branches older than {days} days found"))?;
        return Ok(CleanupSummary::default());
    }

    // Listed safe first, then automation, then review
    let ordered: Vec<StaleBranch> = tiers
        .safe
        .into_iter()
        .chain(tiers.automation)
        .chain(tiers.review)
        .collect();
    let choices: Vec<Choice> = ordered
        .iter()
        .map(|s| Choice::new(stale_label(session, s), s.tier() != StaleTier::Review))
        .collect();

    if session.dry_run {
        report_dry_run(ui, &format!("Stale branches (older than {days} days)"), &choices)?;
        return Ok(CleanupSummary::default());
    }

    let picked = ui.select(
        &format!("Stale branches older than {days} days ({})", ordered.len()),
        &choices,
    )?;
    for (i, s) in ordered.iter().enumerate() {
        let b = &s.branch;
        let path = b.repo_path.to_string_lossy();
        session.suggestion(
            "stale-branch",
            &[path.as_ref(), b.name.as_str()],
            picked.contains(&i),
            Some(age_days(b.last_commit, session.now)),
        );
    }
    let requests: Vec<DeleteRequest> = picked.iter().map(|&i| DeleteRequest::from(&ordered[i])).collect();
    execute(session, ui, &requests)
}

fn report_dry_run(ui: &mut dyn Ui, title: &str, choices: &[Choice]) -> Result<()> {
    ui.say(Tone::Heading, title)?;
    for c in choices {
        let verb = if c.preselected { "would delete" } else { "would offer" };
        ui.line(&format!("  {verb}: {}", c.label))?;
    }
    Ok(())
}

fn execute(session: &Session<'_>, ui: &mut dyn Ui, requests: &[DeleteRequest]) -> Result<CleanupSummary> {
    if requests.is_empty() {
        ui.say(Tone::Dim, "Nothing selected")?;
        return Ok(CleanupSummary::default());
    }
    let remote_candidates = requests
        .iter()
        .filter(|r| r.remote_allowed && r.branch.has_remote)
        .count();
    let delete_remote = remote_candidates > 0
        && ui.confirm(
            &format!("Also delete {} on origin?", plural(remote_candidates, "remote branch")),
            false,
        )?;

    let summary = delete_branches(session.vcs, requests, delete_remote);
    let mut line = format!("Deleted {}", plural(summary.deleted, "branch"));
    if delete_remote {
        line.push_str(&format!(", {} on origin", summary.remote_deleted));
    }
    if summary.remote_skipped > 0 {
        line.push_str(&format!(", kept {} remote", summary.remote_skipped));
    }
    line.push_str(&format!(", {} failed", summary.failed.len()));
    let tone = if summary.has_failures() { Tone::Warn } else { Tone::Good };
    ui.say(tone, &line)?;
    Ok(summary)
}
