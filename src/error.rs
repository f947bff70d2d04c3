// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error types for the library layers

use std::path::PathBuf;
use thiserror::Error;

/// Problems loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sync strategy outside rebase / merge / ff-only
    #[error("invalid sync strategy {0:?} (expected rebase, merge or ff-only)")]
    InvalidStrategy(String),

    /// A numeric option that must be positive was zero
    #[error("{0} must be at least 1")]
    NotPositive(&'static str),

    /// The config file or environment could not be parsed
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// No usable home directory to derive default paths from
    #[error("cannot determine the home directory")]
    NoHome,
}

/// Problems walking the projects tree
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A directory could not be listed or resolved
    #[error("failed to read {path}: {source}")]
    Read {
        /// Directory being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The index file is malformed or has unknown fields
    #[error("invalid index file {path}: {source}")]
    InvalidIndex {
        /// Index file path
        path: PathBuf,
        /// Parse error
        #[source]
        source: serde_yaml::Error,
    },

    /// An exclude pattern is not a valid glob
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        /// The offending pattern
        pattern: String,
        /// Glob compile error
        #[source]
        source: globset::Error,
    },
}

impl DiscoveryError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Failures running git
#[derive(Debug, Error)]
pub enum GitError {
    /// git could not be started at all
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    /// git exited non-zero
    #[error("git {args} failed ({code}): {stderr}")]
    Command {
        /// Arguments, space-joined
        args: String,
        /// Exit code, or -1 when killed by a signal
        code: i32,
        /// Most relevant stderr line
        stderr: String,
    },

    /// `git push --delete` for a branch the remote no longer has
    #[error("remote ref does not exist: {0}")]
    RemoteRefMissing(String),

    /// git produced output we could not make sense of
    #[error("unexpected git output for {what}: {output:?}")]
    Parse {
        /// What was being parsed
        what: &'static str,
        /// Raw output
        output: String,
    },

    /// Neither origin/HEAD nor main/master exist
    #[error("cannot determine default branch")]
    NoDefaultBranch,
}

/// Failures talking to the forge API
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport or decoding failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Request URL
        url: String,
        /// Status code
        status: u16,
    },

    /// The API refused us for exceeding the rate limit
    #[error("API rate limit exceeded")]
    RateLimited,

    /// Response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}
