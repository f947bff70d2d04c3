// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Typed wrapper over the git CLI
//!
//! Everything runs `git` as a child process with the checkout as working
//! directory. The decision engines only see the [`MergeProbe`] and [`Vcs`]
//! traits so tests can swap in an in-memory repository.

use crate::error::GitError;
use crate::process::{best_error_line, run_capture, CmdOutput};
use crate::types::Strategy;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::trace;

/// Result alias for git operations
pub type GitResult<T> = Result<T, GitError>;

/// Name of the remote every operation targets
pub const ORIGIN: &str = "origin";

/// The queries the hybrid merge detector needs
pub trait MergeProbe: Send + Sync {
    /// Local branches whose tips are reachable from `base`
    fn merged_branches(&self, repo: &Path, base: &str) -> GitResult<Vec<String>>;

    /// Whether `branch` is reachable from `base`
    fn is_merged(&self, repo: &Path, branch: &str, base: &str) -> GitResult<bool>;

    /// URL of a remote, `None` when the remote is not configured
    fn remote_url(&self, repo: &Path, remote: &str) -> GitResult<Option<String>>;
}

/// Full set of git operations used by the classifier, sync engine and executors
pub trait Vcs: MergeProbe {
    /// Short names of all local branches
    fn local_branches(&self, repo: &Path) -> GitResult<Vec<String>>;

    /// Checked-out branch; empty string on a detached HEAD
    fn current_branch(&self, repo: &Path) -> GitResult<String>;

    /// Branch a fresh clone would check out
    fn default_branch(&self, repo: &Path) -> GitResult<String>;

    /// `(ahead, behind)` of `branch` relative to `base`
    fn ahead_behind(&self, repo: &Path, base: &str, branch: &str) -> GitResult<(usize, usize)>;

    /// Author date of a commit
    fn commit_time(&self, repo: &Path, rev: &str) -> GitResult<DateTime<Utc>>;

    /// Subject line of a commit
    fn commit_subject(&self, repo: &Path, rev: &str) -> GitResult<String>;

    /// Distinct author emails on `base..branch`
    fn unique_authors(&self, repo: &Path, base: &str, branch: &str) -> GitResult<Vec<String>>;

    /// Whether a remote with this name is configured
    fn has_remote(&self, repo: &Path, remote: &str) -> GitResult<bool>;

    /// Whether `refs/remotes/<remote>/<branch>` exists
    fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<bool>;

    /// Upstream tracking ref of a branch
    fn upstream(&self, repo: &Path, branch: &str) -> GitResult<Option<String>>;

    /// Paths with uncommitted changes to tracked files
    fn dirty_paths(&self, repo: &Path) -> GitResult<Vec<String>>;

    /// Paths changed on `to` since it diverged from `from`
    fn changed_paths(&self, repo: &Path, from: &str, to: &str) -> GitResult<Vec<String>>;

    /// Fetch from a remote, pruning deleted branches
    fn fetch(&self, repo: &Path, remote: &str) -> GitResult<()>;

    /// Pull `branch` from `remote` with the given strategy
    fn pull(&self, repo: &Path, strategy: Strategy, remote: &str, branch: &str) -> GitResult<()>;

    /// Check out an existing branch
    fn checkout(&self, repo: &Path, branch: &str) -> GitResult<()>;

    /// Delete a local branch, with `-D` when `force`
    fn delete_branch(&self, repo: &Path, branch: &str, force: bool) -> GitResult<()>;

    /// Delete a branch on the remote
    fn delete_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<()>;

    /// Stash tracked changes; `false` when there was nothing to stash
    fn stash_push(&self, repo: &Path, message: &str) -> GitResult<bool>;

    /// Re-apply and drop the latest stash
    fn stash_pop(&self, repo: &Path) -> GitResult<()>;

    /// Three-way merge simulation; `true` on conflict
    fn merge_tree_conflicts(&self, repo: &Path, base: &str, ours: &str, theirs: &str)
        -> GitResult<bool>;

    /// Best common ancestor of two revisions
    fn merge_base(&self, repo: &Path, a: &str, b: &str) -> GitResult<String>;

    /// Commit id a revision points at
    fn rev_parse(&self, repo: &Path, rev: &str) -> GitResult<String>;

    /// Number of commits in a revision range
    fn count_commits(&self, repo: &Path, range: &str) -> GitResult<usize>;

    /// Value of a git config key, repository scope falling back to global
    fn config_value(&self, repo: &Path, key: &str) -> GitResult<Option<String>>;

    /// `git rebase --abort`
    fn abort_rebase(&self, repo: &Path) -> GitResult<()>;

    /// `git merge --abort`
    fn abort_merge(&self, repo: &Path) -> GitResult<()>;

    /// Commits on local branches that no remote branch contains
    fn unpushed_commits(&self, repo: &Path) -> GitResult<usize>;

    /// Whether any tracked file has uncommitted changes
    fn is_dirty(&self, repo: &Path) -> GitResult<bool> {
        Ok(!self.dirty_paths(repo)?.is_empty())
    }

    /// Undo a half-finished pull the way the strategy requires
    fn abort_pull(&self, repo: &Path, strategy: Strategy) -> GitResult<()> {
        match strategy {
            Strategy::Rebase => self.abort_rebase(repo),
            Strategy::Merge | Strategy::FfOnly => self.abort_merge(repo),
        }
    }
}

/// git CLI backend
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Git {
    /// Use `git` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    fn run(&self, repo: &Path, args: &[&str]) -> GitResult<CmdOutput> {
        trace!(repo = %repo.display(), "git {}", args.join(" "));
        Ok(run_capture(&self.program, args, Some(repo))?)
    }

    /// Run and return trimmed stdout, failing on a non-zero exit
    fn output(&self, repo: &Path, args: &[&str]) -> GitResult<String> {
        let out = self.run(repo, args)?;
        if !out.status.success() {
            return Err(command_error(args, &out));
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Exit 0 is yes, exit 1 is no, anything else is an error
    fn check(&self, repo: &Path, args: &[&str]) -> GitResult<bool> {
        let out = self.run(repo, args)?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_error(args, &out)),
        }
    }

    fn ref_exists(&self, repo: &Path, full_ref: &str) -> GitResult<bool> {
        self.check(repo, &["rev-parse", "--verify", "--quiet", full_ref])
    }
}

fn command_error(args: &[&str], out: &CmdOutput) -> GitError {
    GitError::Command {
        args: args.join(" "),
        code: out.code(),
        stderr: best_error_line(&out.stderr),
    }
}

impl MergeProbe for Git {
    fn merged_branches(&self, repo: &Path, base: &str) -> GitResult<Vec<String>> {
        let out = self.output(
            repo,
            &[
                "for-each-ref",
                "--format=%(refname:short)",
                "--merged",
                base,
                "refs/heads/",
            ],
        )?;
        Ok(non_empty_lines(&out))
    }

    fn is_merged(&self, repo: &Path, branch: &str, base: &str) -> GitResult<bool> {
        self.check(repo, &["merge-base", "--is-ancestor", branch, base])
    }

    fn remote_url(&self, repo: &Path, remote: &str) -> GitResult<Option<String>> {
        self.config_value(repo, &format!("remote.{remote}.url"))
    }
}

impl Vcs for Git {
    fn local_branches(&self, repo: &Path) -> GitResult<Vec<String>> {
        let out = self.output(repo, &["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(non_empty_lines(&out))
    }

    fn current_branch(&self, repo: &Path) -> GitResult<String> {
        self.output(repo, &["branch", "--show-current"])
    }

    fn default_branch(&self, repo: &Path) -> GitResult<String> {
        let head = format!("refs/remotes/{ORIGIN}/HEAD");
        let out = self.run(repo, &["symbolic-ref", "--quiet", "--short", &head])?;
        if out.status.success() {
            let prefix = format!("{ORIGIN}/");
            if let Some(branch) = out.stdout.trim().strip_prefix(&prefix) {
                if !branch.is_empty() {
                    return Ok(branch.to_string());
                }
            }
        }

        for candidate in ["main", "master"] {
            if self.ref_exists(repo, &format!("refs/heads/{candidate}"))?
                || self.ref_exists(repo, &format!("refs/remotes/{ORIGIN}/{candidate}"))?
            {
                return Ok(candidate.to_string());
            }
        }
        Err(GitError::NoDefaultBranch)
    }

    fn ahead_behind(&self, repo: &Path, base: &str, branch: &str) -> GitResult<(usize, usize)> {
        let range = format!("{base}...{branch}");
        let out = self.output(repo, &["rev-list", "--left-right", "--count", &range])?;
        parse_left_right(&out).ok_or(GitError::Parse {
            what: "rev-list --left-right --count",
            output: out,
        })
    }

    fn commit_time(&self, repo: &Path, rev: &str) -> GitResult<DateTime<Utc>> {
        let out = self.output(repo, &["log", "-1", "--format=%aI", rev, "--"])?;
        DateTime::parse_from_rfc3339(&out)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| GitError::Parse {
                what: "author date",
                output: out,
            })
    }

    fn commit_subject(&self, repo: &Path, rev: &str) -> GitResult<String> {
        self.output(repo, &["log", "-1", "--format=%s", rev, "--"])
    }

    fn unique_authors(&self, repo: &Path, base: &str, branch: &str) -> GitResult<Vec<String>> {
        let range = format!("{base}..{branch}");
        let out = self.output(repo, &["log", "--format=%ae", &range, "--"])?;
        let mut authors: Vec<String> = Vec::new();
        for email in non_empty_lines(&out) {
            if !authors.contains(&email) {
                authors.push(email);
            }
        }
        Ok(authors)
    }

    fn has_remote(&self, repo: &Path, remote: &str) -> GitResult<bool> {
        let out = self.output(repo, &["remote"])?;
        Ok(out.lines().any(|line| line.trim() == remote))
    }

    fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<bool> {
        self.ref_exists(repo, &format!("refs/remotes/{remote}/{branch}"))
    }

    fn upstream(&self, repo: &Path, branch: &str) -> GitResult<Option<String>> {
        let spec = format!("{branch}@{{upstream}}");
        let out = self.run(repo, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        let upstream = out.stdout.trim();
        Ok((!upstream.is_empty()).then(|| upstream.to_string()))
    }

    fn dirty_paths(&self, repo: &Path) -> GitResult<Vec<String>> {
        let args = ["status", "--porcelain", "--untracked-files=no"];
        let out = self.run(repo, &args)?;
        if !out.status.success() {
            return Err(command_error(&args, &out));
        }
        Ok(parse_porcelain_paths(&out.stdout))
    }

    fn changed_paths(&self, repo: &Path, from: &str, to: &str) -> GitResult<Vec<String>> {
        let range = format!("{from}...{to}");
        let out = self.output(repo, &["diff", "--name-only", &range])?;
        Ok(non_empty_lines(&out))
    }

    fn fetch(&self, repo: &Path, remote: &str) -> GitResult<()> {
        self.output(repo, &["fetch", "--prune", "--quiet", remote]).map(drop)
    }

    fn pull(&self, repo: &Path, strategy: Strategy, remote: &str, branch: &str) -> GitResult<()> {
        self.output(repo, &["pull", "--quiet", strategy.pull_flag(), remote, branch])
            .map(drop)
    }

    fn checkout(&self, repo: &Path, branch: &str) -> GitResult<()> {
        self.output(repo, &["checkout", "--quiet", branch]).map(drop)
    }

    fn delete_branch(&self, repo: &Path, branch: &str, force: bool) -> GitResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.output(repo, &["branch", flag, branch]).map(drop)
    }

    fn delete_remote_branch(&self, repo: &Path, remote: &str, branch: &str) -> GitResult<()> {
        let args = ["push", remote, "--delete", branch];
        let out = self.run(repo, &args)?;
        if out.status.success() {
            return Ok(());
        }
        if out.stderr.contains("remote ref does not exist") {
            return Err(GitError::RemoteRefMissing(branch.to_string()));
        }
        Err(command_error(&args, &out))
    }

    fn stash_push(&self, repo: &Path, message: &str) -> GitResult<bool> {
        let out = self.output(repo, &["stash", "push", "-m", message])?;
        Ok(!out.contains("No local changes to save"))
    }

    fn stash_pop(&self, repo: &Path) -> GitResult<()> {
        self.output(repo, &["stash", "pop", "--quiet"]).map(drop)
    }

    fn merge_tree_conflicts(
        &self,
        repo: &Path,
        base: &str,
        ours: &str,
        theirs: &str,
    ) -> GitResult<bool> {
        let out = self.run(repo, &["merge-tree", base, ours, theirs])?;
        Ok(!out.status.success() || out.stdout.contains("<<<<<<<"))
    }

    fn merge_base(&self, repo: &Path, a: &str, b: &str) -> GitResult<String> {
        self.output(repo, &["merge-base", a, b])
    }

    fn rev_parse(&self, repo: &Path, rev: &str) -> GitResult<String> {
        let commit = format!("{rev}^{{commit}}");
        self.output(repo, &["rev-parse", "--verify", &commit])
    }

    fn count_commits(&self, repo: &Path, range: &str) -> GitResult<usize> {
        let out = self.output(repo, &["rev-list", "--count", range])?;
        out.parse().map_err(|_| GitError::Parse {
            what: "rev-list --count",
            output: out,
        })
    }

    fn config_value(&self, repo: &Path, key: &str) -> GitResult<Option<String>> {
        let args = ["config", "--get", key];
        let out = self.run(repo, &args)?;
        match out.status.code() {
            Some(0) => Ok(Some(out.stdout.trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(command_error(&args, &out)),
        }
    }

    fn abort_rebase(&self, repo: &Path) -> GitResult<()> {
        self.output(repo, &["rebase", "--abort"]).map(drop)
    }

    fn abort_merge(&self, repo: &Path) -> GitResult<()> {
        self.output(repo, &["merge", "--abort"]).map(drop)
    }

    fn unpushed_commits(&self, repo: &Path) -> GitResult<usize> {
        let out = self.output(repo, &["rev-list", "--count", "--branches", "--not", "--remotes"])?;
        out.parse().map_err(|_| GitError::Parse {
            what: "rev-list --count --branches",
            output: out,
        })
    }
}

fn non_empty_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `rev-list --left-right --count base...branch` into `(ahead, behind)`
fn parse_left_right(s: &str) -> Option<(usize, usize)> {
    let mut parts = s.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Paths out of `git status --porcelain` (v1) lines
fn parse_porcelain_paths(s: &str) -> Vec<String> {
    s.lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            path.rsplit_once(" -> ")
                .map_or(path, |(_, to)| to)
                .trim_matches('"')
                .to_string()
        })
        .collect()
}
