// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Branch descriptors

use crate::git::{GitResult, Vcs, ORIGIN};
use crate::types::{BranchInfo, RepoHandle};

/// Gather the descriptor for a local branch relative to the default branch
pub fn describe<V: Vcs + ?Sized>(
    vcs: &V,
    repo: &RepoHandle,
    default_branch: &str,
    name: &str,
) -> GitResult<BranchInfo> {
    let path = repo.path();
    let last_commit = vcs.commit_time(path, name)?;
    let last_commit_subject = vcs.commit_subject(path, name)?;
    let (commits_ahead, commits_behind) = vcs.ahead_behind(path, default_branch, name)?;
    let has_remote = vcs.remote_branch_exists(path, ORIGIN, name)?;
    let is_local_only = !has_remote && vcs.upstream(path, name)?.is_none();

    Ok(BranchInfo {
        repo_path: repo.path.clone(),
        repo_name: repo.name.clone(),
        name: name.to_string(),
        last_commit,
        last_commit_subject,
        has_remote,
        is_local_only,
        commits_ahead,
        commits_behind,
    })
}

/// Local branches other than the default and the checked-out one
#[must_use]
pub fn candidates(branches: Vec<String>, default_branch: &str, current: &str) -> Vec<String> {
    branches
        .into_iter()
        .filter(|b| b != default_branch && b != current)
        .collect()
}
