// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Checkout-level findings
//!
//! Workspace summary counts, checkouts sitting on a branch that has already
//! been merged, and checkouts whose upstream project is archived.

use crate::cleanup::Failure;
use crate::git::{Vcs, ORIGIN};
use crate::merged::MergeDetector;
use crate::platform::{Platform, RepoSlug};
use crate::types::{DetectionMethod, RepoHandle};
use std::fs;
use tracing::{debug, info};

// =============================================================================
// Summary
// =============================================================================

/// Where each checkout's HEAD is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceSummary {
    /// Checkouts scanned
    pub total: usize,
    /// On their default branch
    pub on_default: usize,
    /// On some other branch
    pub on_other_branch: usize,
    /// HEAD detached
    pub detached: usize,
    /// With uncommitted changes
    pub dirty: usize,
    /// Could not be read
    pub unreadable: usize,
}

/// Count checkout states
pub fn summarize<V: Vcs + ?Sized>(vcs: &V, repos: &[RepoHandle]) -> WorkspaceSummary {
    let mut summary = WorkspaceSummary {
        total: repos.len(),
        ..WorkspaceSummary::default()
    };
    for repo in repos {
        let path = repo.path();
        let state = vcs
            .current_branch(path)
            .and_then(|current| Ok((current, vcs.default_branch(path)?, vcs.is_dirty(path)?)));
        let (current, default_branch, dirty) = match state {
            Ok(state) => state,
            Err(e) => {
                debug!(repo = %repo.name, "cannot read checkout state: {e}");
                summary.unreadable += 1;
                continue;
            }
        };
        if current.is_empty() {
            summary.detached += 1;
        } else if current == default_branch {
            summary.on_default += 1;
        } else {
            summary.on_other_branch += 1;
        }
        if dirty {
            summary.dirty += 1;
        }
    }
    summary
}

// =============================================================================
// Merged feature branches
// =============================================================================

/// A checkout whose current branch is already merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnMergedBranch {
    /// The checkout
    pub repo: RepoHandle,
    /// Checked-out branch
    pub branch: String,
    /// Branch to switch to
    pub default_branch: String,
    /// How the merge was detected
    pub method: DetectionMethod,
    /// Uncommitted changes present
    pub dirty: bool,
}

/// Report `repo` if it is on a merged, non-default branch
pub fn merged_feature_branch<V: Vcs + ?Sized>(
    vcs: &V,
    platform: Option<&dyn Platform>,
    repo: &RepoHandle,
) -> Option<OnMergedBranch> {
    let path = repo.path();
    let read = vcs
        .current_branch(path)
        .and_then(|current| Ok((current, vcs.default_branch(path)?)));
    let (current, default_branch) = match read {
        Ok(read) => read,
        Err(e) => {
            debug!(repo = %repo.name, "cannot read branches: {e}");
            return None;
        }
    };
    if current.is_empty() || current == default_branch {
        return None;
    }

    let detector = MergeDetector::new(vcs, platform);
    let method = match detector.is_merged(path, &current, &default_branch) {
        Ok(method) => method?,
        Err(e) => {
            debug!(repo = %repo.name, branch = %current, "merge check failed: {e}");
            return None;
        }
    };
    let dirty = vcs.is_dirty(path).unwrap_or(true);
    Some(OnMergedBranch {
        repo: repo.clone(),
        branch: current,
        default_branch,
        method,
        dirty,
    })
}

// =============================================================================
// Archived upstreams
// =============================================================================

/// A checkout whose forge repository is archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedRepo {
    /// The checkout
    pub repo: RepoHandle,
    /// Forge repository
    pub slug: RepoSlug,
    /// Uncommitted changes present
    pub dirty: bool,
    /// Commits on local branches that no remote has
    pub unpushed: usize,
}

impl ArchivedRepo {
    /// Safe to delete: nothing local would be lost
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.dirty && self.unpushed == 0
    }
}

/// Report `repo` if its origin is an archived forge repository.
///
/// Any failure to reach the forge reads as "not archived". Local state that
/// cannot be read makes the checkout count as unclean.
pub fn archived_status<V: Vcs + ?Sized>(
    vcs: &V,
    platform: &dyn Platform,
    repo: &RepoHandle,
) -> Option<ArchivedRepo> {
    let path = repo.path();
    let url = match vcs.remote_url(path, ORIGIN) {
        Ok(url) => url?,
        Err(e) => {
            debug!(repo = %repo.name, "cannot read origin URL: {e}");
            return None;
        }
    };
    let slug = platform.parse_remote(&url)?;
    match platform.is_archived(&slug) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            debug!(repo = %slug, "archive lookup failed: {e}");
            return None;
        }
    }

    let dirty = vcs.is_dirty(path).unwrap_or(true);
    let unpushed = vcs.unpushed_commits(path).unwrap_or(usize::MAX);
    Some(ArchivedRepo {
        repo: repo.clone(),
        slug,
        dirty,
        unpushed,
    })
}

// =============================================================================
// Executors
// =============================================================================

/// Counts for a batch of checkout actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    /// Actions carried out
    pub done: usize,
    /// Items left alone because they were not safe to touch
    pub skipped: usize,
    /// Actions that failed
    pub failed: Vec<Failure>,
}

impl ActionSummary {
    /// Whether any action failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Check out the default branch in each selected checkout. Dirty ones are
/// skipped.
pub fn switch_to_default<V: Vcs + ?Sized>(vcs: &V, items: &[OnMergedBranch]) -> ActionSummary {
    let mut summary = ActionSummary::default();
    for item in items {
        if item.dirty {
            summary.skipped += 1;
            continue;
        }
        match vcs.checkout(item.repo.path(), &item.default_branch) {
            Ok(()) => {
                info!(repo = %item.repo.name, from = %item.branch, to = %item.default_branch, "switched");
                summary.done += 1;
            }
            Err(e) => summary.failed.push(Failure {
                item: item.repo.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
    summary
}

/// Delete each selected checkout from disk. Unclean ones are skipped.
pub fn remove_checkouts(items: &[ArchivedRepo]) -> ActionSummary {
    let mut summary = ActionSummary::default();
    for item in items {
        if !item.is_clean() {
            summary.skipped += 1;
            continue;
        }
        match fs::remove_dir_all(item.repo.path()) {
            Ok(()) => {
                info!(repo = %item.repo.name, "removed checkout");
                summary.done += 1;
            }
            Err(e) => summary.failed.push(Failure {
                item: item.repo.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
    summary
}
