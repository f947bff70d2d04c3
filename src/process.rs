// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Child process helpers

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Captured output of a finished child process
#[derive(Debug)]
pub struct CmdOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CmdOutput {
    /// Exit code, or -1 when the process was killed by a signal
    #[must_use]
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Run `program args...` in `cwd` and capture its output.
///
/// Stdin is closed so nothing can block on a prompt.
pub fn run_capture(program: &str, args: &[&str], cwd: Option<&Path>) -> std::io::Result<CmdOutput> {
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let output = command.output()?;

    Ok(CmdOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Pick the line of stderr most likely to explain a failure
#[must_use]
pub fn best_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if let Some(line) = lines.iter().find(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("error:") || lower.starts_with("fatal:")
    }) {
        return (*line).to_string();
    }

    lines
        .last()
        .map_or_else(|| "unknown error".to_string(), |line| (*line).to_string())
}
