// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Repos command - checkouts on merged branches and archived upstreams

use super::{finish, nothing_found, plural, Session};
use crate::cleanup::Failure;
use crate::pool;
use crate::repos::{
    archived_status, merged_feature_branch, remove_checkouts, summarize, switch_to_default,
    ActionSummary, ArchivedRepo, OnMergedBranch,
};
use crate::types::RepoHandle;
use crate::ui::{Choice, Tone, Ui};
use anyhow::Result;
use std::time::Instant;

/// Which findings to report
#[derive(Debug, Clone, Copy, Default)]
pub struct ReposArgs {
    /// Checkouts whose upstream is archived
    pub archived: bool,
    /// Checkouts sitting on a merged branch
    pub merged: bool,
}

/// Run the repos command
pub fn run(session: &Session<'_>, ui: &mut dyn Ui, args: ReposArgs) -> Result<()> {
    let everything = !args.archived && !args.merged;
    let repos = session.discover()?;
    if repos.is_empty() {
        return nothing_found(ui, session);
    }

    if everything {
        print_summary(session, ui, &repos)?;
    }
    let mut failed: Vec<Failure> = Vec::new();
    if everything || args.merged {
        failed.extend(on_merged_branches(session, ui, &repos)?.failed);
    }
    if everything || args.archived {
        failed.extend(archived(session, ui, &repos)?.failed);
    }
    finish(ui, &failed)
}

fn print_summary(session: &Session<'_>, ui: &mut dyn Ui, repos: &[RepoHandle]) -> Result<()> {
    let s = summarize(session.vcs, repos);
    ui.say(Tone::Heading, &plural(s.total, "repository"))?;
    ui.line(&format!("  on default branch:   {}", s.on_default))?;
    ui.line(&format!("  on other branch:     {}", s.on_other_branch))?;
    ui.line(&format!("  detached HEAD:       {}", s.detached))?;
    ui.line(&format!("  uncommitted changes: {}", s.dirty))?;
    if s.unreadable > 0 {
        ui.say(Tone::Warn, &format!("  unreadable:          {}", s.unreadable))?;
    }
    Ok(())
}

fn on_merged_branches(session: &Session<'_>, ui: &mut dyn Ui, repos: &[RepoHandle]) -> Result<ActionSummary> {
    let started = Instant::now();
    let found = pool::run(
        repos.to_vec(),
        session.config.workers,
        |repo| merged_feature_branch(session.vcs, session.platform, &repo),
        |_, _, _| {},
    );
    let mut found: Vec<OnMergedBranch> = found.into_iter().flatten().collect();
    found.sort_by(|a, b| a.repo.cmp(&b.repo));
    session.metrics.perf("repos-merged", repos.len(), started.elapsed());

    if found.is_empty() {
        ui.say(Tone::Good, "No checkouts on merged branches")?;
        return Ok(ActionSummary::default());
    }

    let choices: Vec<Choice> = found
        .iter()
        .map(|m| {
            let mut label = format!(
                "{}: on {} (merged, via {}), switch to {}",
                m.repo.name, m.branch, m.method, m.default_branch
            );
            if m.dirty {
                label.push_str("  [uncommitted changes]");
            }
            Choice::new(label, !m.dirty)
        })
        .collect();

    if session.dry_run {
        ui.say(Tone::Heading, "Checkouts on merged branches")?;
        for c in &choices {
            ui.line(&format!("  would offer: {}", c.label))?;
        }
        return Ok(ActionSummary::default());
    }

    let picked = ui.select(&format!("Checkouts on merged branches ({})", found.len()), &choices)?;
    for (i, m) in found.iter().enumerate() {
        let path = m.repo.path.to_string_lossy();
        session.suggestion("switch-branch", &[path.as_ref(), m.branch.as_str()], picked.contains(&i), None);
    }
    let selected: Vec<OnMergedBranch> = picked.iter().map(|&i| found[i].clone()).collect();
    if selected.is_empty() {
        ui.say(Tone::Dim, "Nothing selected")?;
        return Ok(ActionSummary::default());
    }

    let summary = switch_to_default(session.vcs, &selected);
    report(ui, "Switched", &summary)?;
    Ok(summary)
}

fn archived(session: &Session<'_>, ui: &mut dyn Ui, repos: &[RepoHandle]) -> Result<ActionSummary> {
    let Some(platform) = session.platform else {
        ui.say(Tone::Warn, "Skipping archived check: the GitHub API is disabled")?;
        return Ok(ActionSummary::default());
    };
    let started = Instant::now();
    let found = pool::run(
        repos.to_vec(),
        session.config.workers,
        |repo| archived_status(session.vcs, platform, &repo),
        |_, _, _| {},
    );
    let mut found: Vec<ArchivedRepo> = found.into_iter().flatten().collect();
    found.sort_by(|a, b| a.repo.cmp(&b.repo));
    session.metrics.perf("repos-archived", repos.len(), started.elapsed());

    if found.is_empty() {
        ui.say(Tone::Good, "No checkouts of archived repositories")?;
        return Ok(ActionSummary::default());
    }

    let choices: Vec<Choice> = found
        .iter()
        .map(|a| {
            let mut label = format!("{} ({} is archived)", a.repo.name, a.slug);
            if a.dirty {
                label.push_str("  [uncommitted changes]");
            }
            if a.unpushed > 0 {
                label.push_str("  [unpushed commits]");
            }
            Choice::new(label, a.is_clean())
        })
        .collect();

    if session.dry_run {
        ui.say(Tone::Heading, "Checkouts of archived repositories")?;
        for (c, a) in choices.iter().zip(&found) {
            let verb = if a.is_clean() { "would remove" } else { "would keep" };
            ui.line(&format!("  {verb}: {}", c.label))?;
        }
        return Ok(ActionSummary::default());
    }

    let picked = ui.select(
        &format!("Checkouts of archived repositories ({})", found.len()),
        &choices,
    )?;
    for (i, a) in found.iter().enumerate() {
        let path = a.repo.path.to_string_lossy();
        session.suggestion("archived-repo", &[path.as_ref()], picked.contains(&i), None);
    }
    let selected: Vec<ArchivedRepo> = picked.iter().map(|&i| found[i].clone()).collect();
    if selected.is_empty() {
        ui.say(Tone::Dim, "Nothing selected")?;
        return Ok(ActionSummary::default());
    }
    let question = format!("Delete {} from disk?", plural(selected.len(), "checkout"));
    if !ui.confirm(&question, false)? {
        ui.say(Tone::Dim, "Nothing removed")?;
        return Ok(ActionSummary::default());
    }

    let summary = remove_checkouts(&selected);
    report(ui, "Removed", &summary)?;
    Ok(summary)
}

fn report(ui: &mut dyn Ui, verb: &str, summary: &ActionSummary) -> Result<()> {
    let line = format!(
        "{verb} {}, skipped {} with local changes, {} failed",
        plural(summary.done, "checkout"),
        summary.skipped,
        summary.failed.len()
    );
    let tone = if summary.has_failures() { Tone::Warn } else { Tone::Good };
    ui.say(tone, &line)?;
    Ok(())
}
