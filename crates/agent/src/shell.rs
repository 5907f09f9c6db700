// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot platform commands, run through `sh -c` with a deadline.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Default deadline for one-shot platform commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Captured result of a one-shot command.
#[derive(Debug)]
pub struct ShellOutput {
    pub status: std::process::ExitStatus,
    /// Combined stdout + stderr.
    pub output: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `args` joined into a single `sh -c` command line.
pub async fn run_shell(args: &[&str]) -> io::Result<ShellOutput> {
    run_shell_timeout(DEFAULT_TIMEOUT, args).await
}

/// Run `args` through the shell with a hard deadline; the child is
/// killed if the deadline passes.
pub async fn run_shell_timeout(timeout: Duration, args: &[&str]) -> io::Result<ShellOutput> {
    run_shell_timeout_env(timeout, &[], args).await
}

/// Same as [`run_shell_timeout`] with extra environment variables.
pub async fn run_shell_timeout_env(
    timeout: Duration,
    envs: &[(&str, &str)],
    args: &[&str],
) -> io::Result<ShellOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(args.join(" "))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let child = cmd.spawn()?;
    let out = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("command timed out after {timeout:?}: {}", args.join(" ")),
            ))
        }
    };

    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(ShellOutput { status: out.status, output })
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
