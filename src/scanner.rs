// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Repository discovery
//!
//! Checkouts are found one level below the projects root. A directory can
//! carry an index file listing *groups* (subdirectories to descend into,
//! holding more checkouts) and *ignores* (subdirectories to leave alone).

use crate::error::DiscoveryError;
use crate::types::RepoHandle;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Per-directory index file name
pub const INDEX_FILE: &str = ".katazuke.yaml";

/// Contents of an index file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanIndex {
    /// Subdirectories holding further checkouts, in walk order
    #[serde(default)]
    pub groups: Vec<String>,
    /// Subdirectories to skip entirely
    #[serde(default)]
    pub ignores: Vec<String>,
}

impl ScanIndex {
    /// Read the index file of `dir`, if there is one
    pub fn load(dir: &Path) -> Result<Option<Self>, DiscoveryError> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| DiscoveryError::read(&path, e))?;
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|source| DiscoveryError::InvalidIndex { path, source })
    }

    /// Whether `name` is declared as a group
    #[must_use]
    pub fn is_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    /// Whether `name` is declared as ignored
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignores.iter().any(|i| i == name)
    }
}

/// Whether a directory is a git checkout (`.git` directory or worktree file)
#[must_use]
pub fn is_checkout(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Whether a file name is hidden
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Compile base-name exclude globs
pub fn build_excludes(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| DiscoveryError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| DiscoveryError::Pattern {
        pattern: patterns.join(","),
        source,
    })
}

/// Visible subdirectories of `dir` as `(name, path)`, sorted by name
pub fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| DiscoveryError::read(dir, e.into()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) || !entry.path().is_dir() {
            continue;
        }
        dirs.push((name, entry.into_path()));
    }
    Ok(dirs)
}

/// Discovery walker
#[derive(Debug, Clone)]
pub struct Scanner {
    excludes: GlobSet,
}

impl Scanner {
    /// Walker that skips directories whose base name matches any pattern
    pub fn new(exclude_patterns: &[String]) -> Result<Self, DiscoveryError> {
        Ok(Self {
            excludes: build_excludes(exclude_patterns)?,
        })
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excludes.is_match(name)
    }

    /// All checkouts reachable from `root`, sorted by path
    pub fn scan(&self, root: &Path) -> Result<Vec<RepoHandle>, DiscoveryError> {
        let mut visited = HashSet::new();
        let mut found = Vec::new();
        self.walk(root, &mut visited, &mut found)?;
        found.sort();
        found.dedup();
        Ok(found)
    }

    fn walk(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        found: &mut Vec<RepoHandle>,
    ) -> Result<(), DiscoveryError> {
        let resolved = fs::canonicalize(dir).map_err(|e| DiscoveryError::read(dir, e))?;
        if !visited.insert(resolved) {
            debug!(dir = %dir.display(), "already visited, skipping");
            return Ok(());
        }

        let index = ScanIndex::load(dir)?;

        if let Some(index) = &index {
            for group in &index.groups {
                if index.is_ignored(group) || is_hidden(group) || self.is_excluded(group) {
                    continue;
                }
                let path = dir.join(group);
                if !path.is_dir() {
                    debug!(group = %path.display(), "group directory missing");
                    continue;
                }
                self.walk(&path, visited, found)?;
            }
        }

        for (name, path) in subdirectories(dir)? {
            if self.is_excluded(&name) {
                continue;
            }
            if let Some(index) = &index {
                if index.is_group(&name) || index.is_ignored(&name) {
                    continue;
                }
            }
            if is_checkout(&path) {
                found.push(RepoHandle::new(path));
            }
        }
        Ok(())
    }
}
