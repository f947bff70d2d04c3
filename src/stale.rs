// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Stale branch classification
//!
//! A branch is stale when its tip is older than the threshold and git does
//! not already consider it merged. Each stale branch is sorted into a tier
//! that decides whether the UI preselects it and whether its remote copy may
//! be deleted.

use crate::branch;
use crate::git::{GitResult, Vcs, ORIGIN};
use crate::platform::{Platform, PrState};
use crate::types::{is_automation_branch, RepoHandle, StaleBranch, StaleTier};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Stale branches of one checkout.
///
/// The default and checked-out branches are never reported. Per-branch read
/// failures are logged and the branch is skipped.
pub fn find_stale<V: Vcs + ?Sized>(
    vcs: &V,
    repo: &RepoHandle,
    threshold: Duration,
    now: DateTime<Utc>,
) -> GitResult<Vec<StaleBranch>> {
    let path = repo.path();
    let default_branch = vcs.default_branch(path)?;
    let current = vcs.current_branch(path)?;
    let merged = vcs.merged_branches(path, &default_branch)?;
    let candidates = branch::candidates(vcs.local_branches(path)?, &default_branch, &current);
    let email = match vcs.config_value(path, "user.email") {
        Ok(email) => email,
        Err(e) => {
            debug!(repo = %repo.name, "cannot read user.email: {e}");
            None
        }
    };
    let cutoff = now - threshold;

    let mut stale = Vec::new();
    for name in candidates.iter().filter(|c| !merged.contains(c)) {
        match vcs.commit_time(path, name) {
            Ok(time) if time < cutoff => {}
            Ok(_) => continue,
            Err(e) => {
                debug!(repo = %repo.name, branch = %name, "cannot read commit date: {e}");
                continue;
            }
        }

        let info = match branch::describe(vcs, repo, &default_branch, name) {
            Ok(info) => info,
            Err(e) => {
                debug!(repo = %repo.name, branch = %name, "skipping branch: {e}");
                continue;
            }
        };
        let is_own_branch = match vcs.unique_authors(path, &default_branch, name) {
            Ok(authors) => authored_by(&authors, email.as_deref()),
            Err(e) => {
                debug!(repo = %repo.name, branch = %name, "cannot read authors: {e}");
                continue;
            }
        };

        stale.push(StaleBranch {
            is_automation: is_automation_branch(name),
            is_own_branch,
            pr_number: None,
            pr_merged_at: None,
            branch: info,
        });
    }
    Ok(stale)
}

/// Every author matches the user's email. No commits, or no configured
/// email, counts as ours.
#[must_use]
pub fn authored_by(authors: &[String], email: Option<&str>) -> bool {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return true;
    };
    authors.iter().all(|a| a.trim().eq_ignore_ascii_case(email))
}

/// Cross-check stale branches against the forge.
///
/// Branches with an open pull request are dropped. Branches whose merged pull
/// request points at the same commit as the local tip get the PR number and
/// merge time attached. Forge errors leave the branch in place untouched.
pub fn annotate_with_prs<V: Vcs + ?Sized>(
    vcs: &V,
    platform: &dyn Platform,
    repo: &RepoHandle,
    branches: Vec<StaleBranch>,
) -> Vec<StaleBranch> {
    let path = repo.path();
    let slug = match vcs.remote_url(path, ORIGIN) {
        Ok(Some(url)) => platform.parse_remote(&url),
        Ok(None) => None,
        Err(e) => {
            debug!(repo = %repo.name, "cannot read origin URL: {e}");
            None
        }
    };
    let Some(slug) = slug else {
        return branches;
    };

    let mut kept = Vec::with_capacity(branches.len());
    for mut stale in branches {
        if !stale.branch.has_remote {
            kept.push(stale);
            continue;
        }
        let name = stale.branch.name.clone();
        let pr = match platform.branch_pr(&slug, &name) {
            Ok(pr) => pr,
            Err(e) => {
                debug!(repo = %repo.name, branch = %name, "pull request lookup failed: {e}");
                kept.push(stale);
                continue;
            }
        };
        match pr.state {
            PrState::Open => {
                debug!(repo = %repo.name, branch = %name, "pull request still open, not stale");
                continue;
            }
            PrState::Merged => {
                let tip = vcs.rev_parse(path, &name).ok();
                if tip.is_some() && tip == pr.head_sha {
                    stale.pr_number = pr.number;
                    stale.pr_merged_at = pr.merged_at;
                }
            }
            PrState::Closed | PrState::None => {}
        }
        kept.push(stale);
    }
    kept
}

/// Stale branches split by tier
#[derive(Debug, Default)]
pub struct Tiers {
    /// Own branches that exist on the remote
    pub safe: Vec<StaleBranch>,
    /// Bot branches
    pub automation: Vec<StaleBranch>,
    /// Everything else
    pub review: Vec<StaleBranch>,
}

impl Tiers {
    /// Partition branches; each lands in exactly one tier
    #[must_use]
    pub fn split(branches: Vec<StaleBranch>) -> Self {
        let mut tiers = Self::default();
        for b in branches {
            match b.tier() {
                StaleTier::Safe => tiers.safe.push(b),
                StaleTier::Automation => tiers.automation.push(b),
                StaleTier::Review => tiers.review.push(b),
            }
        }
        tiers
    }

    /// Total across tiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.safe.len() + self.automation.len() + self.review.len()
    }

    /// No stale branches at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
