// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background job registry: keyed async downloads and package installs
//! with progress, cancellation, completion waiting, and deferred cleanup.

mod download;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::install::Installer;

/// Keys are deleted this long after the job reaches a terminal state.
const DELETE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Lifecycle of a background job. Transitions are totally ordered:
/// pending → downloading [→ installing] → success | failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Installing,
    Success,
    Failure,
}

/// Download progress, shared with the HTTP status handler. Setting
/// `canceled` makes the copier fail on its next write.
#[derive(Debug, Default)]
pub struct Progress {
    pub total_size: AtomicU64,
    pub copied_size: AtomicU64,
    pub canceled: AtomicBool,
}

struct JobFields {
    status: JobStatus,
    message: String,
    error: Option<JobError>,
    package_name: Option<String>,
}

/// One background job. Lives in the registry from key allocation until
/// the deferred delete fires.
pub struct Job {
    pub key: String,
    pub progress: Progress,
    fields: Mutex<JobFields>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

/// JSON projection of a job, as served by the status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: ProgressView,
    #[serde(rename = "packageName", skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    #[serde(rename = "copiedSize")]
    pub copied_size: u64,
}

impl Job {
    fn new(key: String) -> Arc<Self> {
        let (done_tx, done_rx) = watch::channel(false);
        Arc::new(Self {
            key,
            progress: Progress::default(),
            fields: Mutex::new(JobFields {
                status: JobStatus::Pending,
                message: String::new(),
                error: None,
                package_name: None,
            }),
            done_tx,
            done_rx,
        })
    }

    pub fn status(&self) -> JobStatus {
        self.fields.lock().status
    }

    pub fn snapshot(&self) -> JobView {
        let fields = self.fields.lock();
        JobView {
            status: fields.status,
            message: fields.message.clone(),
            error: fields.error.as_ref().map(ToString::to_string),
            progress: ProgressView {
                total_size: self.progress.total_size.load(Ordering::Relaxed),
                copied_size: self.progress.copied_size.load(Ordering::Relaxed),
            },
            package_name: fields.package_name.clone(),
        }
    }

    /// Cooperative cancel: the download copier errors on its next write.
    pub fn cancel(&self) {
        self.progress.canceled.store(true, Ordering::Relaxed);
    }

    /// Block until the job reaches a terminal state; returns the exact
    /// terminal error.
    pub async fn wait(&self) -> Result<(), JobError> {
        let mut rx = self.done_rx.clone();
        let _ = rx.wait_for(|done| *done).await;
        match self.fields.lock().error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_phase(&self, status: JobStatus, message: &str) {
        let mut fields = self.fields.lock();
        fields.status = status;
        fields.message = message.to_owned();
    }

    fn set_package_name(&self, name: String) {
        self.fields.lock().package_name = Some(name);
    }

    /// Record the terminal outcome and release all waiters.
    fn finish(&self, result: Result<(), JobError>) {
        {
            let mut fields = self.fields.lock();
            match &result {
                Ok(()) => fields.status = JobStatus::Success,
                Err(err) => {
                    fields.status = JobStatus::Failure;
                    fields.error = Some(err.clone());
                }
            }
        }
        let _ = self.done_tx.send(true);
    }
}

struct RegistryInner {
    counter: u64,
    jobs: HashMap<String, Arc<Job>>,
}

/// Keyed table of background jobs.
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
    client: reqwest::Client,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            inner: Mutex::new(RegistryInner { counter: 0, jobs: HashMap::new() }),
            client,
        })
    }

    /// Allocate the next key and insert a fresh pending job under it.
    fn gen_key(&self) -> (String, Arc<Job>) {
        let mut inner = self.inner.lock();
        inner.counter += 1;
        let key = inner.counter.to_string();
        let job = Job::new(key.clone());
        inner.jobs.insert(key.clone(), Arc::clone(&job));
        (key, job)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Job>> {
        self.inner.lock().jobs.get(key).cloned()
    }

    pub async fn wait(&self, key: &str) -> Result<(), JobError> {
        let job = self.get(key).ok_or_else(|| JobError::NotFound(key.to_owned()))?;
        job.wait().await
    }

    pub fn cancel(&self, key: &str) -> Result<(), JobError> {
        let job = self.get(key).ok_or_else(|| JobError::NotFound(key.to_owned()))?;
        job.cancel();
        Ok(())
    }

    fn delay_delete(self: &Arc<Self>, key: String) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DELETE_DELAY).await;
            registry.inner.lock().jobs.remove(&key);
            debug!(key = %key, "background job deleted");
        });
    }

    /// Start an async HTTP download to `dst`, returning its key.
    pub fn http_download(
        self: &Arc<Self>,
        url: &str,
        dst: PathBuf,
        mode: u32,
    ) -> Result<String, JobError> {
        let url = reqwest::Url::parse(url).map_err(|e| JobError::BadUrl(e.to_string()))?;
        let (key, job) = self.gen_key();
        info!(key = %key, url = %url, dst = %dst.display(), "starting background download");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            job.set_phase(JobStatus::Downloading, "downloading");
            let result =
                download::download_to(&registry.client, url, &dst, mode, &job.progress).await;
            match &result {
                Ok(()) => job.set_phase(JobStatus::Success, "download finished"),
                Err(err) => warn!(key = %job.key, err = %err, "download failed"),
            }
            job.finish(result);
            registry.delay_delete(job.key.clone());
        });
        Ok(key)
    }

    /// Download an APK and hand it to the install policy. The downloaded
    /// file is unlinked whatever the outcome.
    pub fn install_package(
        self: &Arc<Self>,
        url: &str,
        installer: Arc<Installer>,
        download_dir: &str,
    ) -> Result<String, JobError> {
        let url = reqwest::Url::parse(url).map_err(|e| JobError::BadUrl(e.to_string()))?;
        let dst =
            PathBuf::from(download_dir).join(format!("{}.apk", uuid::Uuid::new_v4().simple()));
        let (key, job) = self.gen_key();
        info!(key = %key, url = %url, apk = %dst.display(), "starting package install");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            job.set_phase(JobStatus::Downloading, "downloading");
            let downloaded =
                download::download_to(&registry.client, url, &dst, 0o644, &job.progress).await;

            let result = match downloaded {
                Err(err) => {
                    job.set_phase(JobStatus::Failure, "download failed");
                    Err(err)
                }
                Ok(()) => {
                    job.set_phase(JobStatus::Installing, "installing");
                    if let Ok(name) = installer.package_name(&dst).await {
                        job.set_package_name(name);
                    }
                    match installer.force_install(&dst).await {
                        Ok(()) => {
                            job.set_phase(JobStatus::Success, "install finished");
                            Ok(())
                        }
                        Err(err) => {
                            job.set_phase(JobStatus::Failure, "install failed");
                            Err(JobError::Install(err.to_string()))
                        }
                    }
                }
            };
            // Release the storage whatever happened.
            let _ = tokio::fs::remove_file(&dst).await;
            if let Err(err) = &result {
                warn!(key = %job.key, err = %err, "package install failed");
            }
            job.finish(result);
            registry.delay_delete(job.key.clone());
        });
        Ok(key)
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
