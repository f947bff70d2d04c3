// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! In-memory git and forge doubles for unit tests

use crate::error::{GitError, PlatformError};
use crate::git::{GitResult, MergeProbe, Vcs};
use crate::platform::{parse_remote_url, Platform, PrInfo, PrState, RepoSlug, GITHUB_HOST};
use crate::types::{RepoHandle, Strategy};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const REPO: &str = "/work/widgets";

pub fn handle() -> RepoHandle {
    RepoHandle::new(REPO)
}

/// Fixed "now" so ages are deterministic
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

#[derive(Debug, Clone)]
pub struct FakeBranch {
    pub time: DateTime<Utc>,
    pub subject: String,
    pub authors: Vec<String>,
    pub ahead: usize,
    pub behind: usize,
    pub remote: bool,
    pub upstream: bool,
    pub merged: bool,
    pub tip: String,
}

impl FakeBranch {
    pub fn aged(days: i64) -> Self {
        Self {
            time: days_ago(days),
            subject: "work in progress".into(),
            authors: vec!["me@example.com".into()],
            ahead: 1,
            behind: 0,
            remote: false,
            upstream: false,
            merged: false,
            tip: format!("tip{days}"),
        }
    }

    pub fn remote(mut self) -> Self {
        self.remote = true;
        self.upstream = true;
        self
    }

    pub fn merged(mut self) -> Self {
        self.merged = true;
        self.ahead = 0;
        self
    }

    pub fn authors(mut self, authors: &[&str]) -> Self {
        self.authors = authors.iter().map(|a| (*a).to_string()).collect();
        self
    }

    pub fn tip(mut self, tip: &str) -> Self {
        self.tip = tip.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeRepo {
    pub origin: Option<String>,
    pub default_branch: Option<String>,
    pub current: String,
    pub branches: BTreeMap<String, FakeBranch>,
    pub dirty: Vec<String>,
    pub upstream_changes: Vec<String>,
    pub behind: usize,
    pub merge_tree_conflict: bool,
    pub stash: Vec<Vec<String>>,
    pub user_email: Option<String>,
    pub unpushed: usize,
    pub remote_missing: bool,
    pub failing: HashSet<&'static str>,
}

impl Default for FakeRepo {
    fn default() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert("main".to_string(), FakeBranch::aged(1).remote().merged());
        Self {
            origin: Some("git@github.com:acme/widgets.git".into()),
            default_branch: Some("main".into()),
            current: "main".into(),
            branches,
            dirty: Vec::new(),
            upstream_changes: Vec::new(),
            behind: 0,
            merge_tree_conflict: false,
            stash: Vec::new(),
            user_email: Some("me@example.com".into()),
            unpushed: 0,
            remote_missing: false,
            failing: HashSet::new(),
        }
    }
}

impl FakeRepo {
    pub fn branch(mut self, name: &str, branch: FakeBranch) -> Self {
        self.branches.insert(name.into(), branch);
        self
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }
}

#[derive(Debug)]
pub struct FakeVcs {
    repos: Mutex<HashMap<PathBuf, FakeRepo>>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self::new(FakeRepo::default())
    }
}

impl FakeVcs {
    pub fn new(repo: FakeRepo) -> Self {
        let mut repos = HashMap::new();
        repos.insert(PathBuf::from(REPO), repo);
        Self {
            repos: Mutex::new(repos),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, path: &Path, repo: FakeRepo) {
        self.repos.lock().unwrap().insert(path.to_path_buf(), repo);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn snapshot(&self) -> FakeRepo {
        self.snapshot_of(Path::new(REPO))
    }

    pub fn snapshot_of(&self, path: &Path) -> FakeRepo {
        self.repos.lock().unwrap()[path].clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn with<R>(&self, path: &Path, f: impl FnOnce(&mut FakeRepo) -> GitResult<R>) -> GitResult<R> {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.get_mut(path).ok_or_else(|| GitError::Command {
            args: "rev-parse".into(),
            code: 128,
            stderr: "fatal: not a git repository".into(),
        })?;
        f(repo)
    }

    fn op<R>(
        &self,
        path: &Path,
        op: &'static str,
        call: String,
        f: impl FnOnce(&mut FakeRepo) -> GitResult<R>,
    ) -> GitResult<R> {
        self.record(call);
        self.with(path, |repo| {
            if repo.failing.contains(op) {
                return Err(GitError::Command {
                    args: op.into(),
                    code: 1,
                    stderr: format!("error: {op} failed"),
                });
            }
            f(repo)
        })
    }
}

fn branch<'a>(repo: &'a mut FakeRepo, name: &str) -> GitResult<&'a mut FakeBranch> {
    repo.branches.get_mut(name).ok_or_else(|| GitError::Command {
        args: format!("rev-parse {name}"),
        code: 128,
        stderr: format!("fatal: unknown revision {name}"),
    })
}

impl MergeProbe for FakeVcs {
    fn merged_branches(&self, repo: &Path, base: &str) -> GitResult<Vec<String>> {
        self.op(repo, "merged_branches", "merged_branches".into(), |r| {
            Ok(r.branches
                .iter()
                .filter(|(name, b)| b.merged || name.as_str() == base)
                .map(|(name, _)| name.clone())
                .collect())
        })
    }

    fn is_merged(&self, repo: &Path, name: &str, _base: &str) -> GitResult<bool> {
        self.op(repo, "is_merged", format!("is_merged {name}"), |r| {
            Ok(branch(r, name)?.merged)
        })
    }

    fn remote_url(&self, repo: &Path, _remote: &str) -> GitResult<Option<String>> {
        self.op(repo, "remote_url", "remote_url".into(), |r| Ok(r.origin.clone()))
    }
}

impl Vcs for FakeVcs {
    fn local_branches(&self, repo: &Path) -> GitResult<Vec<String>> {
        self.op(repo, "local_branches", "local_branches".into(), |r| {
            Ok(r.branches.keys().cloned().collect())
        })
    }

    fn current_branch(&self, repo: &Path) -> GitResult<String> {
        self.op(repo, "current_branch", "current_branch".into(), |r| Ok(r.current.clone()))
    }

    fn default_branch(&self, repo: &Path) -> GitResult<String> {
        self.op(repo, "default_branch", "default_branch".into(), |r| {
            r.default_branch.clone().ok_or(GitError::NoDefaultBranch)
        })
    }

    fn ahead_behind(&self, repo: &Path, _base: &str, name: &str) -> GitResult<(usize, usize)> {
        self.op(repo, "ahead_behind", format!("ahead_behind {name}"), |r| {
            let b = branch(r, name)?;
            Ok((b.ahead, b.behind))
        })
    }

    fn commit_time(&self, repo: &Path, rev: &str) -> GitResult<DateTime<Utc>> {
        self.op(repo, "commit_time", format!("commit_time {rev}"), |r| Ok(branch(r, rev)?.time))
    }

    fn commit_subject(&self, repo: &Path, rev: &str) -> GitResult<String> {
        self.op(repo, "commit_subject", format!("commit_subject {rev}"), |r| {
            Ok(branch(r, rev)?.subject.clone())
        })
    }

    fn unique_authors(&self, repo: &Path, _base: &str, name: &str) -> GitResult<Vec<String>> {
        self.op(repo, "unique_authors", format!("unique_authors {name}"), |r| {
            Ok(branch(r, name)?.authors.clone())
        })
    }

    fn has_remote(&self, repo: &Path, remote: &str) -> GitResult<bool> {
        self.op(repo, "has_remote", "has_remote".into(), |r| {
            Ok(remote == "origin" && r.origin.is_some())
        })
    }

    fn remote_branch_exists(&self, repo: &Path, _remote: &str, name: &str) -> GitResult<bool> {
        self.op(repo, "remote_branch_exists", format!("remote_branch_exists {name}"), |r| {
            Ok(branch(r, name)?.remote)
        })
    }

    fn upstream(&self, repo: &Path, name: &str) -> GitResult<Option<String>> {
        self.op(repo, "upstream", format!("upstream {name}"), |r| {
            Ok(branch(r, name)?.upstream.then(|| format!("origin/{name}")))
        })
    }

    fn dirty_paths(&self, repo: &Path) -> GitResult<Vec<String>> {
        self.op(repo, "dirty_paths", "dirty_paths".into(), |r| Ok(r.dirty.clone()))
    }

    fn changed_paths(&self, repo: &Path, _from: &str, _to: &str) -> GitResult<Vec<String>> {
        self.op(repo, "changed_paths", "changed_paths".into(), |r| {
            Ok(r.upstream_changes.clone())
        })
    }

    fn fetch(&self, repo: &Path, _remote: &str) -> GitResult<()> {
        self.op(repo, "fetch", "fetch".into(), |_| Ok(()))
    }

    fn pull(&self, repo: &Path, strategy: Strategy, _remote: &str, _branch: &str) -> GitResult<()> {
        self.op(repo, "pull", format!("pull {strategy}"), |r| {
            r.behind = 0;
            Ok(())
        })
    }

    fn checkout(&self, repo: &Path, name: &str) -> GitResult<()> {
        self.op(repo, "checkout", format!("checkout {name}"), |r| {
            branch(r, name)?;
            r.current = name.to_string();
            Ok(())
        })
    }

    fn delete_branch(&self, repo: &Path, name: &str, force: bool) -> GitResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.op(repo, "delete_branch", format!("delete_branch {name} {flag}"), |r| {
            let merged = branch(r, name)?.merged;
            if !force && !merged {
                return Err(GitError::Command {
                    args: format!("branch -d {name}"),
                    code: 1,
                    stderr: format!("error: the branch '{name}' is not fully merged"),
                });
            }
            r.branches.remove(name);
            Ok(())
        })
    }

    fn delete_remote_branch(&self, repo: &Path, _remote: &str, name: &str) -> GitResult<()> {
        self.op(repo, "delete_remote_branch", format!("delete_remote_branch {name}"), |r| {
            if r.remote_missing {
                return Err(GitError::RemoteRefMissing(name.to_string()));
            }
            if let Some(b) = r.branches.get_mut(name) {
                b.remote = false;
            }
            Ok(())
        })
    }

    fn stash_push(&self, repo: &Path, _message: &str) -> GitResult<bool> {
        self.op(repo, "stash_push", "stash_push".into(), |r| {
            if r.dirty.is_empty() {
                return Ok(false);
            }
            let changes = std::mem::take(&mut r.dirty);
            r.stash.push(changes);
            Ok(true)
        })
    }

    fn stash_pop(&self, repo: &Path) -> GitResult<()> {
        self.op(repo, "stash_pop", "stash_pop".into(), |r| {
            let changes = r.stash.pop().ok_or_else(|| GitError::Command {
                args: "stash pop".into(),
                code: 1,
                stderr: "error: no stash entries found".into(),
            })?;
            r.dirty = changes;
            Ok(())
        })
    }

    fn merge_tree_conflicts(
        &self,
        repo: &Path,
        _base: &str,
        _ours: &str,
        _theirs: &str,
    ) -> GitResult<bool> {
        self.op(repo, "merge_tree", "merge_tree".into(), |r| Ok(r.merge_tree_conflict))
    }

    fn merge_base(&self, repo: &Path, _a: &str, _b: &str) -> GitResult<String> {
        self.op(repo, "merge_base", "merge_base".into(), |_| Ok("base000".into()))
    }

    fn rev_parse(&self, repo: &Path, rev: &str) -> GitResult<String> {
        self.op(repo, "rev_parse", format!("rev_parse {rev}"), |r| {
            Ok(r.branches.get(rev).map_or_else(|| "0000".into(), |b| b.tip.clone()))
        })
    }

    fn count_commits(&self, repo: &Path, range: &str) -> GitResult<usize> {
        self.op(repo, "count_commits", format!("count_commits {range}"), |r| Ok(r.behind))
    }

    fn config_value(&self, repo: &Path, key: &str) -> GitResult<Option<String>> {
        self.op(repo, "config_value", format!("config_value {key}"), |r| {
            Ok(if key == "user.email" {
                r.user_email.clone()
            } else {
                None
            })
        })
    }

    fn abort_rebase(&self, repo: &Path) -> GitResult<()> {
        self.op(repo, "abort_rebase", "abort_rebase".into(), |_| Ok(()))
    }

    fn abort_merge(&self, repo: &Path) -> GitResult<()> {
        self.op(repo, "abort_merge", "abort_merge".into(), |_| Ok(()))
    }

    fn unpushed_commits(&self, repo: &Path) -> GitResult<usize> {
        self.op(repo, "unpushed_commits", "unpushed_commits".into(), |r| Ok(r.unpushed))
    }
}

// =============================================================================
// Forge double
// =============================================================================

#[derive(Debug, Default)]
pub struct FakePlatform {
    pub prs: HashMap<String, PrInfo>,
    pub archived: HashSet<String>,
    pub failing_branches: HashSet<String>,
    pub fail_archived: bool,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn with_pr(mut self, branch: &str, pr: PrInfo) -> Self {
        self.prs.insert(branch.into(), pr);
        self
    }

    pub fn failing_for(mut self, branch: &str) -> Self {
        self.failing_branches.insert(branch.into());
        self
    }

    pub fn archived(mut self, repo_name: &str) -> Self {
        self.archived.insert(repo_name.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn pr_merged(number: u64, head_sha: &str) -> PrInfo {
    PrInfo {
        state: PrState::Merged,
        number: Some(number),
        head_sha: Some(head_sha.into()),
        merged_at: Some(days_ago(40)),
    }
}

pub fn pr_open(number: u64) -> PrInfo {
    PrInfo {
        state: PrState::Open,
        number: Some(number),
        head_sha: Some("open-head".into()),
        merged_at: None,
    }
}

pub fn pr_closed(number: u64) -> PrInfo {
    PrInfo {
        state: PrState::Closed,
        number: Some(number),
        head_sha: Some("closed-head".into()),
        merged_at: None,
    }
}

impl Platform for FakePlatform {
    fn parse_remote(&self, url: &str) -> Option<RepoSlug> {
        parse_remote_url(url, GITHUB_HOST)
    }

    fn is_archived(&self, repo: &RepoSlug) -> Result<bool, PlatformError> {
        self.calls.lock().unwrap().push(format!("is_archived {repo}"));
        if self.fail_archived {
            return Err(PlatformError::RateLimited);
        }
        Ok(self.archived.contains(&repo.name))
    }

    fn branch_pr(&self, _repo: &RepoSlug, branch: &str) -> Result<PrInfo, PlatformError> {
        self.calls.lock().unwrap().push(format!("branch_pr {branch}"));
        if self.failing_branches.contains(branch) {
            return Err(PlatformError::RateLimited);
        }
        Ok(self.prs.get(branch).cloned().unwrap_or_else(PrInfo::none))
    }
}
