//! # Daemon
//!
//! Long-running mode: owns the controller and the auto-fetch timer, serves
//! the D-Bus interface, and follows config file changes until SIGINT or
//! SIGTERM.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{info, warn};
use zbus::connection;

use crate::background::GSettings;
use crate::config::{app_cache_dir, Config, ConfigWatcher};
use crate::controller::{ControllerDeps, WallpaperController, DEFAULT_STAGE_TIMEOUT};
use crate::error::WallpaperError;
use crate::host;
use crate::http::{HttpClient, ReqwestClient};
use crate::service::{register_signal_hooks, WallpaperService, OBJECT_PATH, SERVICE_NAME};
use crate::sources::SourceAdapters;
use crate::timer::AutoFetchTimer;

/// Builds a controller wired to the real network, GSettings and cache dir.
pub fn build_controller(
    config: Config,
    timer: Arc<AutoFetchTimer>,
) -> Result<Arc<WallpaperController>, WallpaperError> {
    let cache_dir = app_cache_dir()
        .ok_or_else(|| WallpaperError::Config("Could not determine cache directory".to_string()))?;
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);

    Ok(WallpaperController::new(ControllerDeps {
        config,
        cache_dir,
        http: http.clone(),
        sources: SourceAdapters::new(http),
        settings: Arc::new(GSettings::new()),
        timer,
        stage_timeout: DEFAULT_STAGE_TIMEOUT,
    }))
}

/// Waits for the next reloaded config, forever if there is no watcher.
async fn next_config(configs: &mut Option<mpsc::UnboundedReceiver<Config>>) -> Option<Config> {
    match configs {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run the D-Bus daemon
pub async fn run_daemon() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    // First run: write the defaults so there is a file to edit and watch
    if Config::config_path().is_some_and(|path| !path.exists()) {
        if let Err(e) = config.save() {
            warn!(target: "daemon", "Failed to write default config: {e}");
        }
    }
    let timer = Arc::new(AutoFetchTimer::new());
    let controller = build_controller(config, timer.clone())?;

    controller.register_wallpaper_changed_hook(|path| {
        let body = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tokio::spawn(async move {
            host::notify("Wallpaper changed", &body).await;
        });
    });

    let conn = connection::Builder::session()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, WallpaperService::new(controller.clone()))?
        .build()
        .await?;
    register_signal_hooks(&controller, &conn)?;

    info!(target: "daemon", "D-Bus daemon running at {OBJECT_PATH} on {SERVICE_NAME}");

    controller.start().await;

    // Keep the watcher alive for the lifetime of the loop
    let (_watcher, mut configs) = match Config::config_path().map(ConfigWatcher::spawn) {
        Some(Ok((watcher, rx))) => (Some(watcher), Some(rx)),
        Some(Err(e)) => {
            warn!(target: "daemon", "Config changes will not be picked up: {e}");
            (None, None)
        }
        None => (None, None),
    };

    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            Some(new_config) = next_config(&mut configs) => {
                if let Err(e) = controller.apply_config(new_config).await {
                    warn!(target: "daemon", "Failed to apply config change: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target: "daemon", "Interrupted, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!(target: "daemon", "Terminated, shutting down");
                break;
            }
        }
    }

    timer.cleanup();
    Ok(())
}
