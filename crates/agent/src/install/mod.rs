// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package install policy.
//!
//! Installs go through the platform package manager with replace and
//! downgrade allowed. A failure whose code is known to be fixable by a
//! clean reinstall triggers exactly one uninstall-and-retry.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::InstallError;
use crate::shell;

/// Failure codes a clean reinstall is known to fix.
const FIXABLE_FAILURES: [&str; 3] = [
    "INSTALL_FAILED_PERMISSION_MODEL_DOWNGRADE",
    "INSTALL_FAILED_UPDATE_INCOMPATIBLE",
    "INSTALL_FAILED_VERSION_DOWNGRADE",
];

/// SDK level that introduced install-time runtime-permission grants.
const SDK_RUNTIME_PERMISSIONS: u32 = 23;

fn failure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"Failure \[([\w_ ]+)\]").unwrap())
}

fn badging_re(field: &'static str) -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(&format!(r"{field}: name='([^']+)'")).unwrap()
}

/// Platform installer frontend.
pub struct Installer {
    pm: String,
    aapt: String,
    sdk_override: Option<u32>,
    sdk_probed: OnceCell<u32>,
}

impl Installer {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            pm: cfg.pm_bin.clone(),
            aapt: cfg.aapt_bin.clone(),
            sdk_override: cfg.sdk_level,
            sdk_probed: OnceCell::new(),
        }
    }

    async fn sdk_level(&self) -> u32 {
        if let Some(level) = self.sdk_override {
            return level;
        }
        *self
            .sdk_probed
            .get_or_init(|| async {
                match shell::run_shell_timeout(Duration::from_secs(10), &[
                    "getprop",
                    "ro.build.version.sdk",
                ])
                .await
                {
                    Ok(out) => out.output.trim().parse().unwrap_or(0),
                    Err(_) => 0,
                }
            })
            .await
    }

    /// Run `pm install -d -r [-g] <apk>`; on failure, surface the first
    /// `Failure [<CODE>]` from the installer output.
    pub async fn install(&self, apk: &Path) -> Result<(), InstallError> {
        let apk_str = apk.to_string_lossy();
        let grant = self.sdk_level().await >= SDK_RUNTIME_PERMISSIONS;
        let mut args = vec![self.pm.as_str(), "install", "-d", "-r"];
        if grant {
            args.push("-g");
        }
        args.push(&apk_str);

        let out = shell::run_shell(&args).await?;
        if out.success() {
            return Ok(());
        }
        match failure_re().captures(&out.output).and_then(|c| c.get(1)) {
            Some(code) => Err(InstallError::Failure {
                code: code.as_str().to_owned(),
                output: out.output,
            }),
            None => Err(InstallError::Exit {
                status: out.status.code().unwrap_or(-1),
                output: out.output,
            }),
        }
    }

    /// [`install`](Self::install), retried once through an uninstall when
    /// the failure code is in the fixable set. Any other failure is
    /// returned unchanged.
    pub async fn force_install(&self, apk: &Path) -> Result<(), InstallError> {
        let err = match self.install(apk).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        let code = match &err {
            InstallError::Failure { code, .. } if FIXABLE_FAILURES.contains(&code.as_str()) => {
                code.clone()
            }
            _ => return Err(err),
        };

        info!(code = %code, "install failed with a fixable code, reinstalling");
        let package = self.package_name(apk).await?;
        info!(package = %package, "uninstalling");
        if let Err(e) = shell::run_shell(&[&self.pm, "uninstall", &package]).await {
            warn!(err = %e, "uninstall failed, retrying install anyway");
        }
        self.install(apk).await
    }

    /// Read the package name out of an APK.
    pub async fn package_name(&self, apk: &Path) -> Result<String, InstallError> {
        self.badging_field(apk, "package").await
    }

    /// Read the launchable activity out of an APK.
    pub async fn main_activity(&self, apk: &Path) -> Result<String, InstallError> {
        self.badging_field(apk, "launchable-activity").await
    }

    /// Resolve the main activity of an installed package via the
    /// installer's path listing.
    pub async fn main_activity_of(&self, package: &str) -> Result<String, InstallError> {
        let out = shell::run_shell_timeout(Duration::from_secs(30), &[
            &self.pm, "path", package,
        ])
        .await?;
        let apk = out
            .output
            .lines()
            .find_map(|l| l.trim().strip_prefix("package:"))
            .ok_or_else(|| InstallError::Apk(format!("no apk path for {package}")))?
            .to_owned();
        self.main_activity(Path::new(&apk)).await
    }

    async fn badging_field(&self, apk: &Path, field: &'static str) -> Result<String, InstallError> {
        let apk_str = apk.to_string_lossy();
        let out = shell::run_shell_timeout(Duration::from_secs(30), &[
            &self.aapt, "dump", "badging", &apk_str,
        ])
        .await?;
        if !out.success() {
            return Err(InstallError::Apk(format!(
                "aapt dump badging failed: {}",
                out.output.trim()
            )));
        }
        badging_re(field)
            .captures(&out.output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| InstallError::Apk(format!("{field} not found in badging output")))
    }
}

/// A relative activity name with no dot gets the leading-dot form the
/// activity manager expects; qualified names pass through.
pub fn qualify_activity(activity: &str) -> String {
    if activity.contains('.') {
        activity.to_owned()
    } else {
        format!(".{activity}")
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
