//! # Host Commands
//!
//! Helpers for running desktop tools (`gsettings`, `notify-send`) on the host.
//! Inside a Flatpak sandbox these go through `flatpak-spawn --host`.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;

/// Checks if the application is running inside a Flatpak sandbox.
///
/// Flatpak creates a `/.flatpak-info` file inside the sandbox.
pub fn is_flatpak() -> bool {
    Path::new("/.flatpak-info").exists()
}

/// Builds a command that runs `cmd` on the host.
pub fn host_command(cmd: &str) -> Command {
    if is_flatpak() {
        let mut command = Command::new("flatpak-spawn");
        command.args(["--host", cmd]);
        command
    } else {
        Command::new(cmd)
    }
}

/// Runs `cmd args...` on the host and collects its output.
pub async fn run_host_command(cmd: &str, args: &[&str]) -> std::io::Result<Output> {
    host_command(cmd).args(args).output().await
}

/// Shows a desktop notification. Failures are only logged.
pub async fn notify(summary: &str, body: &str) {
    let result = run_host_command(
        "notify-send",
        &["--app-name=Random Wallpaper", "--icon=preferences-desktop-wallpaper", summary, body],
    )
    .await;
    if let Err(e) = result {
        tracing::debug!(target: "host", "notify-send unavailable: {e}");
    }
}
