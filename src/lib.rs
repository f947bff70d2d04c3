// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Katazuke library - tidy up a tree of git checkouts
//!
//! This crate provides the decision engines behind the `katazuke` CLI:
//! discovering checkouts under a projects root, detecting merged branches
//! (including squash-merges only the forge knows about), classifying stale
//! branches, and syncing checkouts with their remotes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod branch;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod git;
pub mod merged;
pub mod metrics;
pub mod platform;
pub mod pool;
pub mod process;
pub mod repos;
pub mod scanner;
pub mod stale;
pub mod sync;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

/// Core data types shared by the decision engines
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::path::{Path, PathBuf};
    use std::str::FromStr;

    use crate::error::ConfigError;

    // =========================================================================
    // Repository Handle
    // =========================================================================

    /// A directory identified as a git checkout
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct RepoHandle {
        /// Filesystem path of the checkout
        pub path: PathBuf,
        /// Display name (the directory's base name)
        pub name: String,
    }

    impl RepoHandle {
        /// Build a handle from a checkout path
        #[must_use]
        pub fn new(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            Self { path, name }
        }

        /// Path of the checkout
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Read-only description of a local branch
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct BranchInfo {
        /// Checkout the branch lives in
        pub repo_path: PathBuf,
        /// Display name of the checkout
        pub repo_name: String,
        /// Branch name
        pub name: String,
        /// Author date of the tip commit
        pub last_commit: DateTime<Utc>,
        /// Subject line of the tip commit
        pub last_commit_subject: String,
        /// A branch with the same name exists on origin
        pub has_remote: bool,
        /// Neither a matching remote branch nor an upstream is configured
        pub is_local_only: bool,
        /// Commits on the branch that the default branch lacks
        pub commits_ahead: usize,
        /// Commits on the default branch that the branch lacks
        pub commits_behind: usize,
    }

    /// How a branch was recognised as merged
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum DetectionMethod {
        /// git itself reports the branch as merged (merge commit or fast-forward)
        ByLocalVcs,
        /// Only the forge knows: the pull request was squash- or rebase-merged
        ByPlatformApi,
    }

    impl fmt::Display for DetectionMethod {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::ByLocalVcs => f.write_str("git"),
                Self::ByPlatformApi => f.write_str("pull request"),
            }
        }
    }

    /// A branch found to be merged into the default branch
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MergedBranch {
        /// Branch details
        pub branch: BranchInfo,
        /// How the merge was detected
        pub method: DetectionMethod,
    }

    impl MergedBranch {
        /// Pair a branch with its detection method
        #[must_use]
        pub fn new(branch: BranchInfo, method: DetectionMethod) -> Self {
            Self { branch, method }
        }

        /// `git branch -d` refuses branches git does not consider merged, so
        /// anything only the forge recognises has to go with `-D`.
        #[must_use]
        pub fn force_delete(&self) -> bool {
            self.method == DetectionMethod::ByPlatformApi
        }
    }

    /// Branch-name prefixes owned by bots
    pub const AUTOMATION_PREFIXES: &[&str] = &["dependabot/", "renovate/", "release-please--"];

    /// Whether a branch name belongs to an automation system
    #[must_use]
    pub fn is_automation_branch(name: &str) -> bool {
        AUTOMATION_PREFIXES.iter().any(|p| name.starts_with(p))
    }

    /// A local branch that has not seen a commit within the threshold
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StaleBranch {
        /// Branch details
        pub branch: BranchInfo,
        /// Created by a bot (dependabot, renovate, release-please)
        pub is_automation: bool,
        /// Every commit unique to the branch was authored by the configured user
        pub is_own_branch: bool,
        /// Number of the merged pull request, when annotated
        pub pr_number: Option<u64>,
        /// Merge time of that pull request, when annotated
        pub pr_merged_at: Option<DateTime<Utc>>,
    }

    impl StaleBranch {
        /// Which selection tier the branch belongs to
        #[must_use]
        pub fn tier(&self) -> StaleTier {
            if self.is_automation {
                StaleTier::Automation
            } else if self.branch.has_remote && self.is_own_branch {
                StaleTier::Safe
            } else {
                StaleTier::Review
            }
        }

        /// Remote deletion is only ever offered for our own, human branches
        #[must_use]
        pub fn remote_delete_allowed(&self) -> bool {
            self.branch.has_remote && !self.is_automation && self.is_own_branch
        }
    }

    /// Selection tier for stale branches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum StaleTier {
        /// Own branch that also exists on the remote; preselected
        Safe,
        /// Bot-owned branch; preselected locally, never deleted remotely
        Automation,
        /// Everything else; needs a human look
        Review,
    }

    impl fmt::Display for StaleTier {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Safe => f.write_str("safe"),
                Self::Automation => f.write_str("automation"),
                Self::Review => f.write_str("review"),
            }
        }
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Pull strategy used when syncing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Strategy {
        /// `git pull --rebase`
        #[default]
        Rebase,
        /// `git pull --no-rebase`
        Merge,
        /// `git pull --ff-only`
        FfOnly,
    }

    impl Strategy {
        /// Flag passed to `git pull`
        #[must_use]
        pub fn pull_flag(self) -> &'static str {
            match self {
                Self::Rebase => "--rebase",
                Self::Merge => "--no-rebase",
                Self::FfOnly => "--ff-only",
            }
        }

        /// Config spelling
        #[must_use]
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Rebase => "rebase",
                Self::Merge => "merge",
                Self::FfOnly => "ff-only",
            }
        }
    }

    impl FromStr for Strategy {
        type Err = ConfigError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "rebase" => Ok(Self::Rebase),
                "merge" => Ok(Self::Merge),
                "ff-only" => Ok(Self::FfOnly),
                other => Err(ConfigError::InvalidStrategy(other.to_string())),
            }
        }
    }

    impl fmt::Display for Strategy {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// Outcome of syncing a single checkout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum SyncStatus {
        /// Pulled new commits on the default branch
        Synced,
        /// Moved from a merged branch or detached HEAD onto the default branch
        Switched,
        /// Nothing to pull
        UpToDate,
        /// Left alone on purpose
        Skipped,
        /// Something went wrong
        Failed,
    }

    impl fmt::Display for SyncStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let s = match self {
                Self::Synced => "synced",
                Self::Switched => "switched",
                Self::UpToDate => "up to date",
                Self::Skipped => "skipped",
                Self::Failed => "failed",
            };
            f.write_str(s)
        }
    }

    /// Result record for one checkout
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SyncResult {
        /// Checkout path
        pub repo_path: PathBuf,
        /// Display name
        pub repo_name: String,
        /// Final state
        pub status: SyncStatus,
        /// Human-readable explanation
        pub message: String,
        /// Commits brought in by the pull (0 unless synced or switched)
        pub commits_pulled: usize,
    }

    impl SyncResult {
        /// Result without pulled commits
        #[must_use]
        pub fn new(repo: &RepoHandle, status: SyncStatus, message: impl Into<String>) -> Self {
            Self {
                repo_path: repo.path.clone(),
                repo_name: repo.name.clone(),
                status,
                message: message.into(),
                commits_pulled: 0,
            }
        }

        /// Result carrying a pull count
        #[must_use]
        pub fn pulled(
            repo: &RepoHandle,
            status: SyncStatus,
            message: impl Into<String>,
            commits: usize,
        ) -> Self {
            Self {
                commits_pulled: commits,
                ..Self::new(repo, status, message)
            }
        }
    }
}
