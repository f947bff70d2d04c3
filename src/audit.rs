// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Projects-root audit
//!
//! Finds top-level directories under the projects root that are not git
//! checkouts, and removes them or moves them into a quarantine directory.

use crate::cleanup::Failure;
use crate::error::DiscoveryError;
use crate::scanner::{is_checkout, subdirectories, ScanIndex};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directory under the projects root that quarantined items are moved into
pub const QUARANTINE_DIR: &str = ".katazuke-quarantine";

/// A top-level directory that is not a checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrayDir {
    /// Directory name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Total size of regular files in bytes
    pub size: u64,
    /// Newest modification time of anything inside
    pub modified: Option<DateTime<Utc>>,
}

/// What to do with a stray directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Leave it alone
    Keep,
    /// Delete it
    Remove,
    /// Move it under [`QUARANTINE_DIR`]
    Quarantine,
}

/// Counts for the closing summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    /// Left in place
    pub kept: usize,
    /// Deleted
    pub removed: usize,
    /// Moved into quarantine
    pub moved: usize,
    /// Actions that failed
    pub failed: Vec<Failure>,
}

impl AuditSummary {
    /// Whether any action failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Top-level directories of `root` that are not checkouts. Groups and
/// ignores declared in the root index are not reported, nor is anything
/// hidden (which covers the quarantine directory). A root that cannot be
/// read is an error, as it is for discovery.
pub fn find_non_checkouts(root: &Path) -> Result<Vec<StrayDir>, DiscoveryError> {
    fs::read_dir(root).map_err(|e| DiscoveryError::read(root, e))?;
    let index = ScanIndex::load(root)?.unwrap_or_default();
    let mut found = Vec::new();
    for (name, path) in subdirectories(root)? {
        if is_checkout(&path) || index.is_group(&name) || index.is_ignored(&name) {
            continue;
        }
        let (size, modified) = measure(&path);
        found.push(StrayDir {
            name,
            path,
            size,
            modified,
        });
    }
    Ok(found)
}

/// Total file size and newest modification time under `dir`. Unreadable
/// entries are left out.
#[must_use]
pub fn measure(dir: &Path) -> (u64, Option<DateTime<Utc>>) {
    let mut size = 0;
    let mut newest = None;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(dir = %dir.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() {
            size += meta.len();
        }
        if let Ok(mtime) = meta.modified() {
            let mtime = DateTime::<Utc>::from(mtime);
            if newest.map_or(true, |n| mtime > n) {
                newest = Some(mtime);
            }
        }
    }
    (size, newest)
}

/// First free name in `dir` among `name`, `name-1`, `name-2`, ...
#[must_use]
pub fn unique_target(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{name}-{n}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move `item` into the quarantine directory under `root`, never
/// overwriting. Returns the new location.
pub fn quarantine(root: &Path, item: &StrayDir) -> io::Result<PathBuf> {
    let dir = root.join(QUARANTINE_DIR);
    fs::create_dir_all(&dir)?;
    let target = unique_target(&dir, &item.name);
    fs::rename(&item.path, &target)?;
    Ok(target)
}

/// Carry out the chosen actions, continuing past failures
pub fn apply(root: &Path, decisions: &[(StrayDir, AuditAction)]) -> AuditSummary {
    let mut summary = AuditSummary::default();
    for (item, action) in decisions {
        let result = match action {
            AuditAction::Keep => {
                summary.kept += 1;
                continue;
            }
            AuditAction::Remove => fs::remove_dir_all(&item.path).map(|()| {
                info!(dir = %item.path.display(), "removed");
                summary.removed += 1;
            }),
            AuditAction::Quarantine => quarantine(root, item).map(|target| {
                info!(dir = %item.path.display(), to = %target.display(), "quarantined");
                summary.moved += 1;
            }),
        };
        if let Err(e) = result {
            summary.failed.push(Failure {
                item: item.name.clone(),
                reason: e.to_string(),
            });
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stray(root: &Path, name: &str) -> StrayDir {
        let path = root.join(name);
        let (size, modified) = measure(&path);
        StrayDir {
            name: name.into(),
            path,
            size,
            modified,
        }
    }

    fn layout() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("repo/.git")).unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes/a.txt"), "hello").unwrap();
        fs::create_dir_all(root.join("notes/sub")).unwrap();
        fs::write(root.join("notes/sub/b.txt"), "world!").unwrap();
        fs::create_dir_all(root.join("scratch")).unwrap();
        fs::create_dir_all(root.join("work/inner/.git")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::create_dir_all(root.join(QUARANTINE_DIR).join("old")).unwrap();
        fs::write(root.join("README.md"), "not a dir").unwrap();
        fs::write(root.join(".katazuke.yaml"), "groups: [work]\nignores: [vendor]\n").unwrap();
        tmp
    }

    #[test]
    fn test_finds_only_non_checkouts() {
        let tmp = layout();
        let found = find_non_checkouts(tmp.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "scratch"]);
        assert_eq!(found[0].size, 11);
        assert!(found[0].modified.is_some());
        assert_eq!(found[1].size, 0);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = find_non_checkouts(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, DiscoveryError::Read { .. }));
    }

    #[test]
    fn test_quarantine_never_overwrites() {
        let tmp = layout();
        let root = tmp.path();
        fs::create_dir_all(root.join(QUARANTINE_DIR).join("notes")).unwrap();

        let target = quarantine(root, &stray(root, "notes")).unwrap();
        assert_eq!(target, root.join(QUARANTINE_DIR).join("notes-1"));
        assert!(target.join("a.txt").exists());
        assert!(!root.join("notes").exists());

        fs::create_dir_all(root.join("notes")).unwrap();
        let target = quarantine(root, &stray(root, "notes")).unwrap();
        assert_eq!(target, root.join(QUARANTINE_DIR).join("notes-2"));
    }

    #[test]
    fn test_apply_mixed_actions() {
        let tmp = layout();
        let root = tmp.path();
        let decisions = vec![
            (stray(root, "notes"), AuditAction::Quarantine),
            (stray(root, "scratch"), AuditAction::Remove),
            (stray(root, "vendor"), AuditAction::Keep),
            (stray(root, "ghost"), AuditAction::Remove),
        ];
        let summary = apply(root, &decisions);

        assert_eq!(summary.moved, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].item, "ghost");
        assert!(root.join(QUARANTINE_DIR).join("notes/sub/b.txt").exists());
        assert!(!root.join("scratch").exists());
        assert!(root.join("vendor").exists());
    }

    #[test]
    fn test_unique_target_suffixes() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(unique_target(tmp.path(), "x"), tmp.path().join("x"));
        fs::create_dir(tmp.path().join("x")).unwrap();
        fs::create_dir(tmp.path().join("x-1")).unwrap();
        assert_eq!(unique_target(tmp.path(), "x"), tmp.path().join("x-2"));
    }
}
