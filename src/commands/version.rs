// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Version command

use anyhow::Result;
use std::io::Write;

/// Build identity baked in at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub built: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("KATAZUKE_GIT_COMMIT").unwrap_or("unknown"),
            built: option_env!("KATAZUKE_BUILD_DATE").unwrap_or("unknown"),
        }
    }
}

/// Print version, commit and build date
pub fn run(out: &mut dyn Write) -> Result<()> {
    let info = BuildInfo::current();
    writeln!(out, "katazuke {}", info.version)?;
    writeln!(out, "  commit: {}", info.commit)?;
    writeln!(out, "  built:  {}", info.built)?;
    Ok(())
}
