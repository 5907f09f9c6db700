// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::AgentConfig;
use crate::idle::IdleGuard;
use crate::install::Installer;
use crate::jobs::JobRegistry;
use crate::screen::backend::ScreenSettings;
use crate::screen::hub::FrameHub;
use crate::screen::rotation::{spawn_rotation_watcher, RotationCell};
use crate::service::{CommandSpec, ServiceRegistry};
use crate::timer::SafeTimer;
use crate::transport::single_flight::SingleFlight;

/// Supervised entry for the hardware screen-capture helper.
pub const SCREEN_SERVICE: &str = "scrcap";
/// Supervised entry for the hardware touch helper.
pub const TOUCH_SERVICE: &str = "touchd";
/// Supervised entry for the UI test runner.
pub const UITEST_SERVICE: &str = "uitest";

/// Shared agent state.
pub struct AgentState {
    pub config: AgentConfig,
    pub services: Arc<ServiceRegistry>,
    pub settings: Arc<ScreenSettings>,
    pub rotation: Arc<RotationCell>,
    pub hub: Arc<FrameHub>,
    pub jobs: Arc<JobRegistry>,
    pub installer: Arc<Installer>,
    pub flights: Arc<SingleFlight>,
    pub idle: Arc<IdleGuard>,
    pub shutdown: CancellationToken,
}

impl AgentState {
    /// Build the full agent: registries, managed service entries, the
    /// frame hub, and the rotation watcher.
    pub async fn new(config: AgentConfig, shutdown: CancellationToken) -> Arc<Self> {
        let services = Arc::new(ServiceRegistry::new());
        let settings = Arc::new(ScreenSettings::from_config(&config));
        let rotation = Arc::new(RotationCell::new());
        let idle_timer = Arc::new(SafeTimer::new(config.idle_timeout()));

        register_managed_services(&config, &services, &settings, &rotation, &idle_timer).await;

        let hub = FrameHub::spawn(
            Arc::clone(&services),
            Arc::clone(&settings),
            Arc::clone(&rotation),
            shutdown.clone(),
        );
        let idle = IdleGuard::spawn(
            idle_timer,
            config.idle_timeout(),
            Arc::clone(&services),
            vec![UITEST_SERVICE.to_owned()],
            shutdown.clone(),
        );
        spawn_rotation_watcher(
            Arc::clone(&services),
            Arc::clone(&settings),
            Arc::clone(&rotation),
            shutdown.clone(),
        );

        Arc::new(Self {
            installer: Arc::new(Installer::from_config(&config)),
            jobs: JobRegistry::new(),
            flights: SingleFlight::new(),
            config,
            services,
            settings,
            rotation,
            hub,
            idle,
            shutdown,
        })
    }
}

/// Register the three managed service entries. The capture helper's args
/// are produced at launch time so each attempt picks up the current
/// rotation; the UI test runner is tied into the idle timer.
async fn register_managed_services(
    config: &AgentConfig,
    services: &Arc<ServiceRegistry>,
    settings: &Arc<ScreenSettings>,
    rotation: &Arc<RotationCell>,
    idle_timer: &Arc<SafeTimer>,
) {
    let capture_spec = {
        let settings = Arc::clone(settings);
        let rotation = Arc::clone(rotation);
        let env = settings.capture_env();
        CommandSpec {
            args_fn: Some(Arc::new(move || Ok(settings.capture_args(rotation.current())))),
            env,
            ..CommandSpec::default()
        }
    };
    if let Err(e) = services.add(SCREEN_SERVICE, capture_spec).await {
        warn!(err = %e, "failed to register capture service");
    }

    let touch_spec = CommandSpec::new([config.touch_bin.clone()]);
    if let Err(e) = services.add(TOUCH_SERVICE, touch_spec).await {
        warn!(err = %e, "failed to register touch service");
    }

    let uitest_spec = {
        let start_timer = Arc::clone(idle_timer);
        let stop_timer = Arc::clone(idle_timer);
        CommandSpec {
            shell: true,
            on_start: Some(Arc::new(move || {
                start_timer.reset(None);
                Ok(())
            })),
            on_stop: Some(Arc::new(move || stop_timer.stop())),
            ..CommandSpec::new(config.uitest_cmd.split_whitespace())
        }
    };
    if let Err(e) = services.add(UITEST_SERVICE, uitest_spec).await {
        warn!(err = %e, "failed to register uitest service");
    }
}
