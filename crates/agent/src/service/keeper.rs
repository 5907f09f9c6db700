// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{CommandSpec, IoMode, StartHook};
use crate::error::ServiceError;

/// Grace window between the stop signal and a hard kill.
const TERMINATE_WAIT: Duration = Duration::from_secs(3);

/// Supervisor for a single child process.
///
/// Invariants: at most one keeper task per entry; `running` implies
/// `keeping`; the keeper task is the sole writer of the run state.
pub(crate) struct Keeper {
    name: String,
    state: Mutex<KeeperState>,
}

struct KeeperState {
    spec: CommandSpec,
    keeping: bool,
    running: bool,
    retries: i64,
    child_pid: Option<u32>,
    stop_tx: Option<mpsc::Sender<()>>,
    done_rx: Option<watch::Receiver<bool>>,
}

impl Keeper {
    pub(crate) fn new(name: &str, spec: CommandSpec) -> Self {
        Self {
            name: name.to_owned(),
            state: Mutex::new(KeeperState {
                spec,
                keeping: false,
                running: false,
                retries: 0,
                child_pid: None,
                stop_tx: None,
                done_rx: None,
            }),
        }
    }

    pub(crate) fn on_start(&self) -> Option<StartHook> {
        self.state.lock().spec.on_start.clone()
    }

    pub(crate) fn keeping(&self) -> bool {
        self.state.lock().keeping
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> bool {
        self.state.lock().running
    }

    #[cfg(test)]
    pub(crate) fn retries(&self) -> i64 {
        self.state.lock().retries
    }

    pub(crate) fn child_pid(&self) -> Option<u32> {
        self.state.lock().child_pid
    }

    /// Replace the arg list, returning whether the keeper is active (in
    /// which case the caller is expected to restart it).
    pub(crate) fn set_args(&self, args: Vec<String>) -> bool {
        let mut st = self.state.lock();
        st.spec.args = args;
        st.keeping
    }

    /// Spawn the keeper task. Fails if one is already active.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        let (stop_rx, done_tx) = {
            let mut st = self.state.lock();
            if st.keeping {
                return Err(ServiceError::AlreadyRunning);
            }
            st.keeping = true;
            st.retries = 0;
            let (stop_tx, stop_rx) = mpsc::channel(1);
            let (done_tx, done_rx) = watch::channel(false);
            st.stop_tx = Some(stop_tx);
            st.done_rx = Some(done_rx);
            (stop_rx, done_tx)
        };
        let keeper = Arc::clone(self);
        tokio::spawn(keeper.run(stop_rx, done_tx));
        Ok(())
    }

    /// Send the stop token; with `wait`, block until the keeper task has
    /// finished tearing down.
    pub(crate) async fn stop(&self, wait: bool) -> Result<(), ServiceError> {
        // Copy the done receiver out under the lock so a concurrent
        // teardown cannot drop it between the check and the wait.
        let done_rx = {
            let st = self.state.lock();
            if !st.keeping {
                return Err(ServiceError::AlreadyStopped);
            }
            if let Some(tx) = &st.stop_tx {
                let _ = tx.try_send(());
            }
            st.done_rx.clone()
        };
        if wait {
            if let Some(mut rx) = done_rx {
                let _ = rx.wait_for(|done| *done).await;
            }
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, mut stop_rx: mpsc::Receiver<()>, done_tx: watch::Sender<bool>) {
        loop {
            let spec = {
                let st = self.state.lock();
                if st.retries > i64::from(st.spec.max_retries) {
                    break;
                }
                st.spec.clone()
            };

            let args = match &spec.args_fn {
                Some(producer) => match producer() {
                    Ok(args) => args,
                    Err(e) => {
                        warn!(service = %self.name, err = %e, "args producer failed");
                        break;
                    }
                },
                None => spec.args.clone(),
            };
            if args.is_empty() {
                warn!(service = %self.name, "empty args, giving up");
                break;
            }
            let argv = if spec.shell {
                vec![shell_path(), "-c".to_owned(), args.join(" ")]
            } else {
                args
            };

            debug!(service = %self.name, args = ?argv, "launching child");
            let mut cmd = tokio::process::Command::new(&argv[0]);
            cmd.args(&argv[1..]);
            for (k, v) in &spec.env {
                cmd.env(k, v);
            }
            cmd.stdin(Stdio::null());
            cmd.stdout(stdio_for(spec.stdout));
            cmd.stderr(stdio_for(spec.stderr));

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    // Spawn failure is terminal: no retry, no cooldown.
                    warn!(service = %self.name, err = %e, "failed to spawn child");
                    break;
                }
            };
            let began = Instant::now();
            {
                let mut st = self.state.lock();
                st.running = true;
                st.child_pid = child.id();
            }
            debug!(service = %self.name, pid = ?child.id(), "child running");

            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) => debug!(service = %self.name, %status, "child exited"),
                        Err(e) => warn!(service = %self.name, err = %e, "child wait failed"),
                    }
                    let mut st = self.state.lock();
                    st.retries =
                        exit_retry_cost(st.retries, began.elapsed(), spec.recover_duration);
                }
                _ = stop_rx.recv() => {
                    terminate(&self.name, &mut child, spec.stop_signal).await;
                    break;
                }
            }

            // Cooldown before the next attempt.
            {
                let mut st = self.state.lock();
                st.running = false;
                st.child_pid = None;
            }
            debug!(service = %self.name, wait = ?spec.next_launch_wait, "cooling down");
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = tokio::time::sleep(spec.next_launch_wait) => {}
            }
        }

        debug!(service = %self.name, "keeper finished");
        let on_stop = self.state.lock().spec.on_stop.clone();
        if let Some(hook) = on_stop {
            hook();
        }
        {
            let mut st = self.state.lock();
            st.running = false;
            st.keeping = false;
            st.child_pid = None;
            st.stop_tx = None;
        }
        let _ = done_tx.send(true);
    }
}

/// Retry accounting after a child exit: a child that survived at least
/// the recovery threshold refunds two tokens before the exit charges
/// one. The counter never goes below zero.
fn exit_retry_cost(retries: i64, lifetime: Duration, recover: Duration) -> i64 {
    let mut retries = retries;
    if lifetime >= recover {
        retries -= 2;
    }
    retries += 1;
    retries.max(0)
}

fn stdio_for(mode: IoMode) -> Stdio {
    match mode {
        IoMode::Null => Stdio::null(),
        IoMode::Inherit => Stdio::inherit(),
    }
}

async fn terminate(name: &str, child: &mut Child, stop_signal: Signal) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), stop_signal);
    }
    match tokio::time::timeout(TERMINATE_WAIT, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            warn!(service = name, "child ignored {stop_signal}, killing");
            let _ = child.kill().await;
        }
    }
}

fn shell_path() -> String {
    std::env::var("SHELL").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "sh".to_owned())
}

#[cfg(test)]
#[path = "keeper_tests.rs"]
mod tests;
