// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Hybrid merge detection
//!
//! git recognises merge commits and fast-forwards, but a squash-merge leaves
//! the branch's own commits out of the default branch's history, so git keeps
//! calling the branch unmerged. For those the detector asks the forge whether
//! the branch's latest pull request was merged.

use crate::branch;
use crate::git::{GitResult, MergeProbe, Vcs, ORIGIN};
use crate::platform::{Platform, PrState, RepoSlug};
use crate::types::{DetectionMethod, MergedBranch, RepoHandle};
use std::path::Path;
use tracing::debug;

/// Local-then-forge merge detector
pub struct MergeDetector<'a, M: ?Sized> {
    vcs: &'a M,
    platform: Option<&'a dyn Platform>,
}

impl<'a, M: MergeProbe + ?Sized> MergeDetector<'a, M> {
    /// Detector over a git backend and an optional forge client
    pub fn new(vcs: &'a M, platform: Option<&'a dyn Platform>) -> Self {
        Self { vcs, platform }
    }

    /// Branches merged into `base`, each tagged with how we know.
    ///
    /// Everything git reports comes first. Candidates git does not list are
    /// then checked against the forge, resolving the origin URL once for the
    /// whole batch. Forge errors only ever make a branch look unmerged.
    pub fn merged_branches(
        &self,
        repo: &Path,
        base: &str,
        candidates: &[String],
    ) -> GitResult<Vec<(String, DetectionMethod)>> {
        let local = self.vcs.merged_branches(repo, base)?;
        let mut merged: Vec<(String, DetectionMethod)> = local
            .iter()
            .map(|name| (name.clone(), DetectionMethod::ByLocalVcs))
            .collect();

        let Some((platform, slug)) = self.forge_repo(repo) else {
            return Ok(merged);
        };

        for candidate in candidates.iter().filter(|c| !local.contains(c)) {
            if merged_upstream(platform, &slug, candidate) {
                merged.push((candidate.clone(), DetectionMethod::ByPlatformApi));
            }
        }
        Ok(merged)
    }

    /// Single-branch variant: local check first, forge only if git says no
    pub fn is_merged(
        &self,
        repo: &Path,
        branch: &str,
        base: &str,
    ) -> GitResult<Option<DetectionMethod>> {
        if self.vcs.is_merged(repo, branch, base)? {
            return Ok(Some(DetectionMethod::ByLocalVcs));
        }
        let Some((platform, slug)) = self.forge_repo(repo) else {
            return Ok(None);
        };
        Ok(merged_upstream(platform, &slug, branch).then_some(DetectionMethod::ByPlatformApi))
    }

    fn forge_repo(&self, repo: &Path) -> Option<(&'a dyn Platform, RepoSlug)> {
        let platform = self.platform?;
        let url = match self.vcs.remote_url(repo, ORIGIN) {
            Ok(Some(url)) => url,
            Ok(None) => return None,
            Err(e) => {
                debug!(repo = %repo.display(), "cannot read origin URL: {e}");
                return None;
            }
        };
        let slug = platform.parse_remote(&url);
        if slug.is_none() {
            debug!(repo = %repo.display(), %url, "origin is not on a supported forge");
        }
        slug.map(|slug| (platform, slug))
    }
}

fn merged_upstream(platform: &dyn Platform, slug: &RepoSlug, branch: &str) -> bool {
    match platform.branch_pr(slug, branch) {
        Ok(pr) => pr.state == PrState::Merged,
        Err(e) => {
            debug!(repo = %slug, branch, "pull request lookup failed: {e}");
            false
        }
    }
}

/// Merged branches of one checkout, never including its default or
/// checked-out branch. Branches whose details cannot be read are skipped.
pub fn find_merged<V: Vcs + ?Sized>(
    vcs: &V,
    platform: Option<&dyn Platform>,
    repo: &RepoHandle,
) -> GitResult<Vec<MergedBranch>> {
    let path = repo.path();
    let default_branch = vcs.default_branch(path)?;
    let current = vcs.current_branch(path)?;
    let candidates = branch::candidates(vcs.local_branches(path)?, &default_branch, &current);

    let detector = MergeDetector::new(vcs, platform);
    let merged = detector.merged_branches(path, &default_branch, &candidates)?;

    let mut found = Vec::new();
    for (name, method) in merged {
        if !candidates.contains(&name) {
            continue;
        }
        match branch::describe(vcs, repo, &default_branch, &name) {
            Ok(info) => found.push(MergedBranch::new(info, method)),
            Err(e) => debug!(repo = %repo.name, branch = %name, "skipping branch: {e}"),
        }
    }
    Ok(found)
}
