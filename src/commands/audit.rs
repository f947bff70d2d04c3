// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Audit command - non-git directories under the projects root

use super::{finish, Session};
use crate::audit::{apply, find_non_checkouts, AuditAction, QUARANTINE_DIR};
use crate::format::{age_days, format_age, format_size};
use crate::ui::{Tone, Ui};
use anyhow::{Context, Result};

const ACTIONS: [&str; 3] = ["keep", "remove", "quarantine"];

/// Run the audit command
pub fn run(session: &Session<'_>, ui: &mut dyn Ui, non_git: bool) -> Result<()> {
    if !non_git {
        ui.line("Nothing to audit. Available checks: --non-git")?;
        return Ok(());
    }

    let root = &session.config.projects_dir;
    let found = find_non_checkouts(root)
        .with_context(|| format!("Failed to read {}", root.display()))?;
    if found.is_empty() {
        ui.say(Tone::Good, "No non-git directories found")?;
        return Ok(());
    }

    ui.say(Tone::Heading, &format!("Non-git directories in {}", root.display()))?;
    let mut decisions = Vec::with_capacity(found.len());
    for dir in found {
        let age = dir.modified.map(|m| age_days(m, session.now));
        let modified = age.map_or_else(|| "unknown".to_string(), |d| format!("{} ago", format_age(d)));
        let label = format!("{} ({}, modified {modified})", dir.name, format_size(dir.size));

        if session.dry_run {
            ui.line(&format!("  {label}"))?;
            continue;
        }
        let choice = ui.choose(&label, &ACTIONS, 0)?;
        let action = match choice {
            1 => AuditAction::Remove,
            2 => AuditAction::Quarantine,
            _ => AuditAction::Keep,
        };
        session.suggestion("non-git-dir", &[dir.name.as_str()], action != AuditAction::Keep, age);
        decisions.push((dir, action));
    }
    if session.dry_run {
        return Ok(());
    }

    let summary = apply(root, &decisions);
    let line = format!(
        "Kept {}, removed {}, moved {} to {QUARANTINE_DIR}, {} failed",
        summary.kept,
        summary.removed,
        summary.moved,
        summary.failed.len()
    );
    let tone = if summary.has_failures() { Tone::Warn } else { Tone::Good };
    ui.say(tone, &line)?;
    finish(ui, &summary.failed)
}
