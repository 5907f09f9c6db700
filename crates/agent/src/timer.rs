// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-safe resettable single-shot timer.
//!
//! Wraps a timer task so that `reset` and `stop` can be called from any
//! task without racing the firing path. The last duration is remembered,
//! so `reset(None)` re-arms with the previous window.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

enum TimerCmd {
    Reset(Option<Duration>),
    Stop,
}

/// Resettable single-shot timer with a one-slot delivery channel.
///
/// A fire that is not consumed before the next one is dropped, matching
/// single-shot timer channel semantics.
pub struct SafeTimer {
    cmd_tx: mpsc::UnboundedSender<TimerCmd>,
    fired_rx: Mutex<mpsc::Receiver<()>>,
}

impl SafeTimer {
    /// Create the timer, armed with `initial`.
    pub fn new(initial: Duration) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut last = initial;
            let mut deadline = Some(Instant::now() + initial);
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(TimerCmd::Reset(d)) => {
                            if let Some(d) = d {
                                last = d;
                            }
                            deadline = Some(Instant::now() + last);
                        }
                        Some(TimerCmd::Stop) => deadline = None,
                        None => return,
                    },
                    () = async {
                        match deadline {
                            Some(at) => tokio::time::sleep_until(at).await,
                            None => std::future::pending().await,
                        }
                    }, if deadline.is_some() => {
                        deadline = None;
                        let _ = fired_tx.try_send(());
                    }
                }
            }
        });

        Self { cmd_tx, fired_rx: Mutex::new(fired_rx) }
    }

    /// Re-arm the timer. `None` reuses the last duration.
    pub fn reset(&self, d: Option<Duration>) {
        let _ = self.cmd_tx.send(TimerCmd::Reset(d));
    }

    /// Disarm the timer. A later `reset` re-arms it.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(TimerCmd::Stop);
    }

    /// Wait for the next fire. Returns `None` once the timer task is gone.
    pub async fn fired(&self) -> Option<()> {
        self.fired_rx.lock().await.recv().await
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
