// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised process controller: a named registry of long-running child
//! processes with retry/backoff, graceful termination, and lifecycle hooks.

mod keeper;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::RwLock;

use crate::error::ServiceError;
pub(crate) use keeper::Keeper;

/// Deferred argument producer, called at the top of every launch attempt.
pub type ArgsFn = Arc<dyn Fn() -> anyhow::Result<Vec<String>> + Send + Sync>;
/// Pre-launch hook; an `Err` vetoes the start.
pub type StartHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
/// Hook run once the keeper tears down.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// How a child's standard streams are wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IoMode {
    #[default]
    Null,
    Inherit,
}

/// Descriptor for one supervised command.
#[derive(Clone)]
pub struct CommandSpec {
    pub args: Vec<String>,
    pub args_fn: Option<ArgsFn>,
    pub env: Vec<(String, String)>,
    pub max_retries: u32,
    pub next_launch_wait: Duration,
    pub recover_duration: Duration,
    pub stop_signal: Signal,
    pub shell: bool,
    pub stdout: IoMode,
    pub stderr: IoMode,
    pub on_start: Option<StartHook>,
    pub on_stop: Option<StopHook>,
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            args_fn: None,
            env: Vec::new(),
            max_retries: 3,
            next_launch_wait: Duration::from_millis(500),
            recover_duration: Duration::from_secs(30),
            stop_signal: Signal::SIGTERM,
            shell: false,
            stdout: IoMode::Null,
            stderr: IoMode::Null,
            on_start: None,
            on_stop: None,
        }
    }
}

impl CommandSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { args: args.into_iter().map(Into::into).collect(), ..Self::default() }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("args", &self.args)
            .field("args_fn", &self.args_fn.is_some())
            .field("max_retries", &self.max_retries)
            .field("next_launch_wait", &self.next_launch_wait)
            .field("recover_duration", &self.recover_duration)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

/// Named registry of supervised services.
///
/// Entries are created by [`add`](Self::add) and stay registered after stop;
/// the keeper task is the sole writer of its own run state.
#[derive(Default)]
pub struct ServiceRegistry {
    cmds: RwLock<HashMap<String, Arc<Keeper>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Fails on duplicate names and on descriptors
    /// with neither static args nor a deferred producer.
    pub async fn add(&self, name: &str, spec: CommandSpec) -> Result<(), ServiceError> {
        if spec.args.is_empty() && spec.args_fn.is_none() {
            return Err(ServiceError::EmptyArgs);
        }
        let mut cmds = self.cmds.write().await;
        if cmds.contains_key(name) {
            return Err(ServiceError::NameConflict(name.to_owned()));
        }
        cmds.insert(name.to_owned(), Arc::new(Keeper::new(name, spec)));
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.cmds.read().await.contains_key(name)
    }

    async fn get(&self, name: &str) -> Result<Arc<Keeper>, ServiceError> {
        self.cmds
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_owned()))
    }

    /// Start keeping a service. Runs the `on_start` hook first; a hook
    /// error aborts the start and surfaces to the caller.
    pub async fn start(&self, name: &str) -> Result<(), ServiceError> {
        let keeper = self.get(name).await?;
        if let Some(hook) = keeper.on_start() {
            hook().map_err(|e| ServiceError::StartHook(e.to_string()))?;
        }
        keeper.start()
    }

    /// Send the stop token. With `wait` the call blocks until the keeper
    /// task has fully torn down.
    pub async fn stop(&self, name: &str, wait: bool) -> Result<(), ServiceError> {
        let keeper = self.get(name).await?;
        keeper.stop(wait).await
    }

    /// Stop every service, waiting for each teardown.
    pub async fn stop_all(&self) {
        let keepers: Vec<Arc<Keeper>> = self.cmds.read().await.values().cloned().collect();
        for keeper in keepers {
            let _ = keeper.stop(true).await;
        }
    }

    pub async fn restart(&self, name: &str) -> Result<(), ServiceError> {
        let _ = self.stop(name, true).await;
        self.start(name).await
    }

    /// Replace the argument list; a currently-keeping service is restarted
    /// so the new args take effect.
    pub async fn update_args(&self, name: &str, args: Vec<String>) -> Result<(), ServiceError> {
        if args.is_empty() {
            return Err(ServiceError::EmptyArgs);
        }
        let keeper = self.get(name).await?;
        tracing::debug!(service = name, args = ?args, "updating service args");
        let keeping = keeper.set_args(args);
        if !keeping {
            return Ok(());
        }
        self.restart(name).await
    }

    /// Whether the supervisor for `name` is active.
    pub async fn running(&self, name: &str) -> bool {
        match self.cmds.read().await.get(name) {
            Some(keeper) => keeper.keeping(),
            None => false,
        }
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cmds.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
