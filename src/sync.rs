// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Per-checkout sync
//!
//! Every checkout ends in exactly one [`SyncResult`]. The engine fetches,
//! then depending on where HEAD is:
//!
//! - detached: switch to the default branch if the tree is clean
//! - on another branch: switch only if that branch is merged
//! - on the default branch, clean: pull
//! - on the default branch, dirty: probe for conflicts, then
//!   stash, pull, pop
//!
//! A pull that fails is aborted with the strategy's abort command and any
//! stash made for it is left in place.

use crate::git::{GitResult, Vcs, ORIGIN};
use crate::merged::MergeDetector;
use crate::platform::Platform;
use crate::pool;
use crate::types::{RepoHandle, Strategy, SyncResult, SyncStatus};
use std::path::Path;
use tracing::{debug, info};

/// Stash message used for auto-stash
pub const STASH_MESSAGE: &str = "katazuke: auto-stash before sync";

/// Knobs for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// How to pull
    pub strategy: Strategy,
    /// Leave dirty default branches alone
    pub skip_dirty: bool,
    /// Stash local changes around the pull
    pub auto_stash: bool,
    /// Move off branches that are already merged
    pub switch_merged_branch: bool,
    /// Decide but change nothing
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            skip_dirty: false,
            auto_stash: true,
            switch_merged_branch: true,
            dry_run: false,
        }
    }
}

/// Sync state machine
pub struct SyncEngine<'a, V: ?Sized> {
    vcs: &'a V,
    platform: Option<&'a dyn Platform>,
    options: SyncOptions,
}

fn skipped(repo: &RepoHandle, message: impl Into<String>) -> SyncResult {
    SyncResult::new(repo, SyncStatus::Skipped, message)
}

fn failed(repo: &RepoHandle, message: impl Into<String>) -> SyncResult {
    SyncResult::new(repo, SyncStatus::Failed, message)
}

impl<'a, V: Vcs + ?Sized> SyncEngine<'a, V> {
    /// Engine over a git backend and optional forge client
    pub fn new(vcs: &'a V, platform: Option<&'a dyn Platform>, options: SyncOptions) -> Self {
        Self {
            vcs,
            platform,
            options,
        }
    }

    /// Sync many checkouts on a worker pool; `on_result` sees each result
    /// as it completes, on the calling thread.
    pub fn sync_all<C>(&self, repos: Vec<RepoHandle>, workers: usize, on_result: C) -> Vec<SyncResult>
    where
        C: FnMut(usize, usize, &SyncResult),
    {
        pool::run(repos, workers, |repo| self.sync(&repo), on_result)
    }

    /// Sync one checkout
    pub fn sync(&self, repo: &RepoHandle) -> SyncResult {
        let path = repo.path();
        match self.vcs.has_remote(path, ORIGIN) {
            Ok(true) => {}
            Ok(false) => return skipped(repo, "no origin remote"),
            Err(e) => return failed(repo, format!("cannot list remotes: {e}")),
        }
        if let Err(e) = self.vcs.fetch(path, ORIGIN) {
            return failed(repo, format!("fetch failed: {e}"));
        }
        let default_branch = match self.vcs.default_branch(path) {
            Ok(b) => b,
            Err(e) => return failed(repo, format!("cannot determine default branch: {e}")),
        };
        let current = match self.vcs.current_branch(path) {
            Ok(b) => b,
            Err(e) => return failed(repo, format!("cannot determine current branch: {e}")),
        };

        if current.is_empty() {
            return self.detached(repo, &default_branch);
        }
        if current != default_branch {
            return self.on_feature_branch(repo, &default_branch, &current);
        }
        match self.vcs.is_dirty(path) {
            Ok(true) => self.dirty_default(repo, &default_branch),
            Ok(false) => self.clean_default(repo, &default_branch, None),
            Err(e) => failed(repo, format!("cannot read status: {e}")),
        }
    }

    fn detached(&self, repo: &RepoHandle, default_branch: &str) -> SyncResult {
        match self.vcs.is_dirty(repo.path()) {
            Ok(false) => {}
            Ok(true) => return skipped(repo, "detached HEAD, uncommitted changes"),
            Err(e) => return failed(repo, format!("cannot read status: {e}")),
        }
        if self.options.dry_run {
            return skipped(
                repo,
                format!("would switch from detached HEAD to {default_branch}"),
            );
        }
        if let Err(e) = self.vcs.checkout(repo.path(), default_branch) {
            return failed(repo, format!("checkout {default_branch} failed: {e}"));
        }
        self.clean_default(repo, default_branch, Some("detached HEAD"))
    }

    fn on_feature_branch(&self, repo: &RepoHandle, default_branch: &str, current: &str) -> SyncResult {
        let path = repo.path();
        let upstream = format!("{ORIGIN}/{default_branch}");
        let detector = MergeDetector::new(self.vcs, self.platform);
        let merged = match detector.is_merged(path, current, &upstream) {
            Ok(merged) => merged,
            Err(e) => {
                debug!(repo = %repo.name, branch = current, "merge check failed: {e}");
                None
            }
        };
        if merged.is_none() {
            return skipped(repo, format!("on branch {current}, not {default_branch}"));
        }
        if !self.options.switch_merged_branch {
            return skipped(
                repo,
                format!("on branch {current}, merged into {default_branch}, safe to switch"),
            );
        }
        match self.vcs.is_dirty(path) {
            Ok(false) => {}
            Ok(true) => {
                return skipped(repo, format!("on merged branch {current}, uncommitted changes"))
            }
            Err(e) => return failed(repo, format!("cannot read status: {e}")),
        }
        if self.options.dry_run {
            return skipped(repo, format!("would switch from {current} to {default_branch}"));
        }
        if let Err(e) = self.vcs.checkout(path, default_branch) {
            return failed(repo, format!("checkout {default_branch} failed: {e}"));
        }
        self.clean_default(repo, default_branch, Some(current))
    }

    fn behind(&self, path: &Path, default_branch: &str) -> GitResult<usize> {
        self.vcs
            .count_commits(path, &format!("HEAD..{ORIGIN}/{default_branch}"))
    }

    fn clean_default(
        &self,
        repo: &RepoHandle,
        default_branch: &str,
        switched_from: Option<&str>,
    ) -> SyncResult {
        let path = repo.path();
        let behind = match self.behind(path, default_branch) {
            Ok(n) => n,
            Err(e) => return failed(repo, format!("cannot count upstream commits: {e}")),
        };

        if behind == 0 {
            return match switched_from {
                Some(from) => SyncResult::new(
                    repo,
                    SyncStatus::Switched,
                    format!("switched from {from} to {default_branch}"),
                ),
                None => SyncResult::new(repo, SyncStatus::UpToDate, "up to date"),
            };
        }
        if self.options.dry_run {
            return skipped(repo, format!("would pull, {behind} behind"));
        }
        if let Err(e) = self.vcs.pull(path, self.options.strategy, ORIGIN, default_branch) {
            self.abort_pull(repo);
            return failed(repo, format!("pull failed: {e}"));
        }

        info!(repo = %repo.name, behind, "pulled");
        match switched_from {
            Some(from) => SyncResult::pulled(
                repo,
                SyncStatus::Switched,
                format!("switched from {from} to {default_branch}, pulled {behind}"),
                behind,
            ),
            None => SyncResult::pulled(
                repo,
                SyncStatus::Synced,
                format!("pulled {behind} commit(s)"),
                behind,
            ),
        }
    }

    fn dirty_default(&self, repo: &RepoHandle, default_branch: &str) -> SyncResult {
        let path = repo.path();
        if self.options.skip_dirty {
            return skipped(repo, "uncommitted changes");
        }
        if !self.options.auto_stash {
            return skipped(repo, "uncommitted changes, auto-stash disabled");
        }

        let upstream = format!("{ORIGIN}/{default_branch}");
        match self.conflict_probe(path, &upstream) {
            Ok(false) => {}
            Ok(true) => return skipped(repo, "uncommitted changes, potential conflicts with upstream"),
            Err(e) => {
                debug!(repo = %repo.name, "conflict probe failed: {e}");
                return skipped(repo, "uncommitted changes, could not check for conflicts");
            }
        }

        let behind = match self.behind(path, default_branch) {
            Ok(n) => n,
            Err(e) => return failed(repo, format!("cannot count upstream commits: {e}")),
        };
        if behind == 0 {
            return SyncResult::new(repo, SyncStatus::UpToDate, "up to date, uncommitted changes kept");
        }
        if self.options.dry_run {
            return skipped(repo, format!("would stash, pull {behind}, and restore changes"));
        }

        let stashed = match self.vcs.stash_push(path, STASH_MESSAGE) {
            Ok(stashed) => stashed,
            Err(e) => return failed(repo, format!("stash failed: {e}")),
        };
        if let Err(e) = self.vcs.pull(path, self.options.strategy, ORIGIN, default_branch) {
            self.abort_pull(repo);
            let message = if stashed {
                format!("pull failed, changes preserved in stash: {e}")
            } else {
                format!("pull failed: {e}")
            };
            return failed(repo, message);
        }
        if !stashed {
            return SyncResult::pulled(
                repo,
                SyncStatus::Synced,
                format!("pulled {behind} commit(s)"),
                behind,
            );
        }
        if let Err(e) = self.vcs.stash_pop(path) {
            return failed(
                repo,
                format!("pulled {behind} commit(s) but stash pop failed, changes preserved in stash: {e}"),
            );
        }
        SyncResult::pulled(
            repo,
            SyncStatus::Synced,
            format!("pulled {behind} commit(s), local changes restored"),
            behind,
        )
    }

    /// Conflict if a three-way merge of HEAD and upstream conflicts, or if a
    /// locally modified path was also changed upstream.
    fn conflict_probe(&self, path: &Path, upstream: &str) -> GitResult<bool> {
        let base = self.vcs.merge_base(path, "HEAD", upstream)?;
        if self.vcs.merge_tree_conflicts(path, &base, "HEAD", upstream)? {
            return Ok(true);
        }
        let dirty = self.vcs.dirty_paths(path)?;
        let changed = self.vcs.changed_paths(path, "HEAD", upstream)?;
        Ok(dirty.iter().any(|p| changed.contains(p)))
    }

    fn abort_pull(&self, repo: &RepoHandle) {
        if let Err(e) = self.vcs.abort_pull(repo.path(), self.options.strategy) {
            debug!(repo = %repo.name, "abort after failed pull: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, pr_merged, FakeBranch, FakePlatform, FakeRepo, FakeVcs, REPO};

    const MUTATING: &[&str] = &["checkout", "pull", "stash_push", "stash_pop", "delete"];

    fn opts() -> SyncOptions {
        SyncOptions::default()
    }

    fn dry() -> SyncOptions {
        SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        }
    }

    fn sequence(vcs: &FakeVcs, ops: &[&str]) -> Vec<String> {
        vcs.calls()
            .into_iter()
            .filter(|c| ops.iter().any(|op| c.starts_with(op)))
            .collect()
    }

    fn mutations(vcs: &FakeVcs) -> Vec<String> {
        sequence(vcs, MUTATING)
    }

    fn sync_with(repo: FakeRepo, options: SyncOptions) -> (FakeVcs, SyncResult) {
        let vcs = FakeVcs::new(repo);
        let result = SyncEngine::new(&vcs, None, options).sync(&handle());
        (vcs, result)
    }

    #[test]
    fn test_clean_default_behind_pulls() {
        let mut repo = FakeRepo::default();
        repo.behind = 3;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Synced);
        assert_eq!(result.commits_pulled, 3);
        assert_eq!(mutations(&vcs), vec!["pull rebase"]);
    }

    #[test]
    fn test_up_to_date_never_pulls() {
        let (vcs, result) = sync_with(FakeRepo::default(), opts());
        assert_eq!(result.status, SyncStatus::UpToDate);
        assert_eq!(result.commits_pulled, 0);
        assert!(mutations(&vcs).is_empty());

        let mut dirty = FakeRepo::default();
        dirty.dirty = vec!["a.txt".into()];
        let (vcs, result) = sync_with(dirty, opts());
        assert_eq!(result.status, SyncStatus::UpToDate);
        assert_eq!(result.commits_pulled, 0);
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_no_origin_skipped() {
        let mut repo = FakeRepo::default();
        repo.origin = None;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert_eq!(result.message, "no origin remote");
        assert!(vcs.calls_matching("fetch").is_empty());
    }

    #[test]
    fn test_fetch_failure_fails() {
        let (_, result) = sync_with(FakeRepo::default().failing("fetch"), opts());
        assert_eq!(result.status, SyncStatus::Failed);
        assert!(result.message.starts_with("fetch failed"));
    }

    #[test]
    fn test_unknown_default_branch_fails() {
        let mut repo = FakeRepo::default();
        repo.default_branch = None;
        let (_, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Failed);

        let (_, result) = sync_with(FakeRepo::default().failing("current_branch"), opts());
        assert_eq!(result.status, SyncStatus::Failed);
    }

    #[test]
    fn test_dirty_sync_without_conflict() {
        let mut repo = FakeRepo::default();
        repo.dirty = vec!["a.txt".into()];
        repo.upstream_changes = vec!["b.txt".into()];
        repo.behind = 1;
        let (vcs, result) = sync_with(repo, opts());

        assert_eq!(result.status, SyncStatus::Synced);
        assert_eq!(result.commits_pulled, 1);
        assert_eq!(
            sequence(&vcs, &["fetch", "merge_tree", "stash_push", "pull", "stash_pop"]),
            vec!["fetch", "merge_tree", "stash_push", "pull rebase", "stash_pop"]
        );
        let after = vcs.snapshot();
        assert_eq!(after.dirty, vec!["a.txt"]);
        assert!(after.stash.is_empty());
    }

    #[test]
    fn test_dirty_sync_with_merge_tree_conflict() {
        let mut repo = FakeRepo::default();
        repo.dirty = vec!["a.txt".into()];
        repo.behind = 1;
        repo.merge_tree_conflict = true;
        let (vcs, result) = sync_with(repo, opts());

        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(result.message.contains("potential conflicts"));
        assert!(mutations(&vcs).is_empty());
        assert!(vcs.snapshot().stash.is_empty());
        assert_eq!(vcs.snapshot().dirty, vec!["a.txt"]);
    }

    #[test]
    fn test_dirty_sync_with_overlapping_paths() {
        let mut repo = FakeRepo::default();
        repo.dirty = vec!["a.txt".into()];
        repo.upstream_changes = vec!["a.txt".into()];
        repo.behind = 1;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_dirty_pull_failure_keeps_stash_and_aborts() {
        let mut repo = FakeRepo::default().failing("pull");
        repo.dirty = vec!["a.txt".into()];
        repo.behind = 2;
        let (vcs, result) = sync_with(repo, opts());

        assert_eq!(result.status, SyncStatus::Failed);
        assert!(result.message.contains("stash"));
        assert_eq!(vcs.snapshot().stash.len(), 1);
        assert_eq!(vcs.calls_matching("abort"), vec!["abort_rebase"]);
        assert!(vcs.calls_matching("stash_pop").is_empty());
    }

    #[test]
    fn test_dirty_pull_failure_ff_only_aborts_merge() {
        let mut repo = FakeRepo::default().failing("pull");
        repo.dirty = vec!["a.txt".into()];
        repo.behind = 2;
        let options = SyncOptions {
            strategy: Strategy::FfOnly,
            ..opts()
        };
        let (vcs, _) = sync_with(repo, options);
        assert_eq!(vcs.calls_matching("abort"), vec!["abort_merge"]);
        assert_eq!(vcs.snapshot().stash.len(), 1);
    }

    #[test]
    fn test_stash_pop_failure_reports_preserved_stash() {
        let mut repo = FakeRepo::default().failing("stash_pop");
        repo.dirty = vec!["a.txt".into()];
        repo.behind = 1;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Failed);
        assert_eq!(result.commits_pulled, 0);
        assert!(result.message.contains("stash"));
        assert_eq!(vcs.snapshot().stash.len(), 1);
    }

    #[test]
    fn test_dirty_options() {
        let mut repo = FakeRepo::default();
        repo.dirty = vec!["a.txt".into()];
        repo.behind = 1;

        let skip = SyncOptions {
            skip_dirty: true,
            ..opts()
        };
        let (vcs, result) = sync_with(repo.clone(), skip);
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(mutations(&vcs).is_empty());

        let no_stash = SyncOptions {
            auto_stash: false,
            ..opts()
        };
        let (vcs, result) = sync_with(repo.clone(), no_stash);
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(result.message.contains("auto-stash disabled"));
        assert!(mutations(&vcs).is_empty());

        let (vcs, result) = sync_with(repo, dry());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_detached_clean_switches() {
        let mut repo = FakeRepo::default();
        repo.current = String::new();
        repo.behind = 2;
        let (vcs, result) = sync_with(repo, opts());

        assert_eq!(result.status, SyncStatus::Switched);
        assert!(result.message.contains("switched"));
        assert_eq!(result.commits_pulled, 2);
        assert_eq!(mutations(&vcs), vec!["checkout main", "pull rebase"]);
        assert_eq!(vcs.snapshot().current, "main");
    }

    #[test]
    fn test_detached_dirty_skipped() {
        let mut repo = FakeRepo::default();
        repo.current = String::new();
        repo.dirty = vec!["x".into()];
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_switched_without_new_commits() {
        let mut repo = FakeRepo::default();
        repo.current = String::new();
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Switched);
        assert_eq!(result.commits_pulled, 0);
        assert!(vcs.calls_matching("pull").is_empty());
    }

    #[test]
    fn test_unmerged_feature_branch_skipped() {
        let mut repo = FakeRepo::default().branch("feat/x", FakeBranch::aged(1).remote());
        repo.current = "feat/x".into();
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert_eq!(result.message, "on branch feat/x, not main");
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_merged_feature_branch_switches() {
        let mut repo = FakeRepo::default().branch("feat/x", FakeBranch::aged(1).merged());
        repo.current = "feat/x".into();
        repo.behind = 1;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Switched);
        assert_eq!(result.commits_pulled, 1);
        assert_eq!(mutations(&vcs), vec!["checkout main", "pull rebase"]);
    }

    #[test]
    fn test_squash_merged_feature_branch_switches_via_platform() {
        let mut repo = FakeRepo::default().branch("feat/x", FakeBranch::aged(1).remote());
        repo.current = "feat/x".into();
        let vcs = FakeVcs::new(repo);
        let platform = FakePlatform::default().with_pr("feat/x", pr_merged(3, "tip1"));
        let result = SyncEngine::new(&vcs, Some(&platform), opts()).sync(&handle());
        assert_eq!(result.status, SyncStatus::Switched);
    }

    #[test]
    fn test_merged_feature_branch_guards() {
        let mut repo = FakeRepo::default().branch("feat/x", FakeBranch::aged(1).merged());
        repo.current = "feat/x".into();

        let no_switch = SyncOptions {
            switch_merged_branch: false,
            ..opts()
        };
        let (vcs, result) = sync_with(repo.clone(), no_switch);
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(result.message.contains("safe to switch"));
        assert!(mutations(&vcs).is_empty());

        let mut dirty = repo.clone();
        dirty.dirty = vec!["y".into()];
        let (vcs, result) = sync_with(dirty, opts());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(mutations(&vcs).is_empty());

        let (vcs, result) = sync_with(repo.clone(), dry());
        assert_eq!(result.status, SyncStatus::Skipped);
        assert!(result.message.starts_with("would switch"));
        assert!(mutations(&vcs).is_empty());

        let (_, result) = sync_with(repo.failing("checkout"), opts());
        assert_eq!(result.status, SyncStatus::Failed);
    }

    #[test]
    fn test_clean_pull_failure_aborts() {
        let mut repo = FakeRepo::default().failing("pull");
        repo.behind = 1;
        let (vcs, result) = sync_with(repo, opts());
        assert_eq!(result.status, SyncStatus::Failed);
        assert_eq!(vcs.calls_matching("abort"), vec!["abort_rebase"]);
    }

    #[test]
    fn test_dry_run_is_repeatable_and_read_only() {
        let mut repo = FakeRepo::default();
        repo.behind = 4;
        let vcs = FakeVcs::new(repo);
        let engine = SyncEngine::new(&vcs, None, dry());
        let first = engine.sync(&handle());
        let second = engine.sync(&handle());
        assert_eq!(first, second);
        assert_eq!(first.message, "would pull, 4 behind");
        assert!(mutations(&vcs).is_empty());
    }

    #[test]
    fn test_sync_all_one_result_per_repo() {
        let vcs = FakeVcs::default();
        let mut other = FakeRepo::default();
        other.origin = None;
        vcs.add(Path::new("/work/other"), other);
        let engine = SyncEngine::new(&vcs, None, opts());

        let mut progress = Vec::new();
        let repos = vec![RepoHandle::new(REPO), RepoHandle::new("/work/other")];
        let mut results = engine.sync_all(repos, 2, |done, total, _| progress.push((done, total)));
        results.sort_by(|a, b| a.repo_name.cmp(&b.repo_name));

        assert_eq!(progress, vec![(1, 2), (2, 2)]);
        assert_eq!(results[0].repo_name, "other");
        assert_eq!(results[0].status, SyncStatus::Skipped);
        assert_eq!(results[1].status, SyncStatus::UpToDate);
    }

    #[test]
    fn test_pulled_implies_synced_or_switched() {
        let cases = {
            let mut behind = FakeRepo::default();
            behind.behind = 2;
            let mut detached = behind.clone();
            detached.current = String::new();
            let mut dirty = behind.clone();
            dirty.dirty = vec!["a".into()];
            vec![behind, detached, dirty.clone(), dirty.failing("stash_pop")]
        };
        for repo in cases {
            let (_, result) = sync_with(repo, opts());
            if result.commits_pulled > 0 {
                assert!(matches!(result.status, SyncStatus::Synced | SyncStatus::Switched));
            }
        }
    }
}
