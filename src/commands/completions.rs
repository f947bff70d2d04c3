// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell

use anyhow::Result;
use clap_complete::Shell;
use std::io::Write;

/// Write a completion script for `shell` to `out`
pub fn run(shell: Shell, cmd: &mut clap::Command, out: &mut dyn Write) -> Result<()> {
    clap_complete::generate(shell, cmd, "katazuke", out);
    out.flush()?;
    Ok(())
}
