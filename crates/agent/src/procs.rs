// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-table helpers: enumeration, pid lookup, kill-by-name.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tracing::info;

/// One row of the process table, as served by the proc endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub ppid: i32,
    pub cmdline: Vec<String>,
    pub name: String,
    #[serde(rename = "threadCount")]
    pub thread_count: i64,
}

/// Enumerate the process table. Rows that vanish mid-scan are skipped.
pub fn list_processes() -> anyhow::Result<Vec<ProcessInfo>> {
    let mut out = Vec::new();
    for proc in procfs::process::all_processes()? {
        let Ok(proc) = proc else { continue };
        let Ok(stat) = proc.stat() else { continue };
        let cmdline = proc.cmdline().unwrap_or_default();
        out.push(ProcessInfo {
            pid: stat.pid,
            ppid: stat.ppid,
            name: stat.comm,
            thread_count: stat.num_threads,
            cmdline,
        });
    }
    Ok(out)
}

/// Resolve a package name to its pid by exact `cmdline[0]` match.
pub fn pid_of(package: &str) -> Option<i32> {
    let procs = list_processes().ok()?;
    procs
        .into_iter()
        .find(|p| p.cmdline.first().map(String::as_str) == Some(package))
        .map(|p| p.pid)
}

/// Kill every process whose command basename matches `name`. Returns the
/// pids that were signaled.
pub fn kill_by_name(name: &str, sig: Signal) -> Vec<i32> {
    kill_matching(name, sig, |_| true)
}

/// Kill matching processes that were reparented to init, i.e. escaped
/// their supervisor. Returns the pids that were signaled.
pub fn kill_orphaned_by_name(name: &str, sig: Signal) -> Vec<i32> {
    kill_matching(name, sig, |p| p.ppid == 1)
}

fn kill_matching(name: &str, sig: Signal, want: impl Fn(&ProcessInfo) -> bool) -> Vec<i32> {
    let Ok(procs) = list_processes() else { return Vec::new() };
    let mut killed = Vec::new();
    for p in procs {
        if !want(&p) {
            continue;
        }
        let base = p
            .cmdline
            .first()
            .map(|c| basename(c))
            .filter(|b| !b.is_empty())
            .unwrap_or(p.name.as_str());
        if base != name {
            continue;
        }
        if signal::kill(Pid::from_raw(p.pid), sig).is_ok() {
            info!(pid = p.pid, name, "killed process");
            killed.push(p.pid);
        }
    }
    killed
}

fn basename(cmd: &str) -> &str {
    // argv[0] may carry arguments after a space, and is often a path.
    let head = cmd.split_whitespace().next().unwrap_or(cmd);
    head.rsplit('/').next().unwrap_or(head)
}

#[cfg(test)]
#[path = "procs_tests.rs"]
mod tests;
