// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Branch deletion
//!
//! Executes the deletions the user picked. Local deletion is forced for
//! anything git does not itself consider merged. Remote deletion needs the
//! user's opt-in, an existing remote branch, and for stale branches the
//! ownership predicate; automation and other people's branches are never
//! deleted remotely.

use crate::error::GitError;
use crate::git::{Vcs, ORIGIN};
use crate::types::{BranchInfo, MergedBranch, StaleBranch};
use tracing::{info, warn};

/// One branch queued for deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Branch to delete
    pub branch: BranchInfo,
    /// Use `-D` instead of `-d`
    pub force: bool,
    /// The branch may be deleted on origin if the user asks for it
    pub remote_allowed: bool,
}

impl From<&MergedBranch> for DeleteRequest {
    fn from(m: &MergedBranch) -> Self {
        Self {
            branch: m.branch.clone(),
            force: m.force_delete(),
            remote_allowed: m.branch.has_remote,
        }
    }
}

impl From<&StaleBranch> for DeleteRequest {
    fn from(s: &StaleBranch) -> Self {
        Self {
            branch: s.branch.clone(),
            force: true,
            remote_allowed: s.remote_delete_allowed(),
        }
    }
}

/// A deletion that did not happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// `repo/branch`, with a ` (remote)` suffix for remote deletions
    pub item: String,
    /// What went wrong
    pub reason: String,
}

/// Counts for the closing summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Local branches deleted
    pub deleted: usize,
    /// Remote branches deleted, including ones that were already gone
    pub remote_deleted: usize,
    /// Remote deletions withheld by the ownership predicate
    pub remote_skipped: usize,
    /// Everything that failed
    pub failed: Vec<Failure>,
}

impl CleanupSummary {
    /// Whether any deletion failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Delete the requested branches, continuing past failures
pub fn delete_branches<V: Vcs + ?Sized>(
    vcs: &V,
    requests: &[DeleteRequest],
    delete_remote: bool,
) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    for req in requests {
        let b = &req.branch;
        let label = format!("{}/{}", b.repo_name, b.name);

        if let Err(e) = vcs.delete_branch(&b.repo_path, &b.name, req.force) {
            summary.failed.push(Failure {
                item: label,
                reason: e.to_string(),
            });
            continue;
        }
        info!(repo = %b.repo_name, branch = %b.name, force = req.force, "deleted branch");
        summary.deleted += 1;

        if !delete_remote || !b.has_remote {
            continue;
        }
        if !req.remote_allowed {
            info!(repo = %b.repo_name, branch = %b.name, "remote branch kept");
            summary.remote_skipped += 1;
            continue;
        }
        match vcs.delete_remote_branch(&b.repo_path, ORIGIN, &b.name) {
            Ok(()) => summary.remote_deleted += 1,
            Err(GitError::RemoteRefMissing(_)) => {
                warn!(repo = %b.repo_name, branch = %b.name, "remote branch already deleted");
                summary.remote_deleted += 1;
            }
            Err(e) => summary.failed.push(Failure {
                item: format!("{label} (remote)"),
                reason: e.to_string(),
            }),
        }
    }
    summary
}
