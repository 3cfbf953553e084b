//! # Random Wallpaper
//!
//! A daemon that periodically fetches a random image from an online source
//! (Unsplash, Wallhaven, Reddit or any JSON API), sets it as the GNOME desktop
//! background, and keeps a bounded history of previous wallpapers that can be
//! previewed and restored.
//!
//! ## Architecture
//! - `controller.rs` - Fetch pipeline, history, hover preview, hooks
//! - `sources/` - One adapter per image provider
//! - `fetcher.rs` - Downloads images into the cache directory
//! - `background.rs` - Applies images through GSettings
//! - `history.rs` - Bounded history with a JSON-lines index
//! - `timer.rs` - Auto-fetch timer
//! - `service.rs` / `dbus_client.rs` - D-Bus interface and its client
//! - `daemon.rs` - Long-running mode
//!
//! ## CLI Usage
//! - No arguments: Run the daemon
//! - `--fetch`, `-f`: Fetch and apply a new wallpaper
//! - `--history`: List the wallpaper history
//! - `--set <id>`: Re-apply a wallpaper from the history
//! - `--delete <id>`: Delete one wallpaper from the history
//! - `--clear-history`: Delete all cached wallpapers
//! - `--preview <id> [ms]`, `--reset`: Hover preview through the daemon
//! - `--state`: Show what the daemon is doing
//! - `--watch`: Print daemon events as they happen
//! - `--reload`: Make the daemon re-read its history
//! - `--help`, `-h`: Show help message

mod background;
mod config;
mod controller;
mod daemon;
mod dbus_client;
mod error;
mod fetcher;
mod history;
mod hooks;
mod host;
mod http;
mod logger;
mod service;
mod sources;
mod timer;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::config::{app_cache_dir, Config};
use crate::controller::WallpaperController;
use crate::dbus_client::{is_service_available, WallpaperClient};
use crate::error::WallpaperError;
use crate::history::read_index;
use crate::service::HistoryEntryInfo;
use crate::timer::AutoFetchTimer;

/// Application entry point. Dispatches to the appropriate mode based on CLI arguments.
///
/// Every command except the daemon itself first looks for a running daemon
/// on the session bus and asks it to do the work, so the daemon's history
/// and state stay authoritative. Without a daemon the command runs
/// standalone against the same cache directory.
fn main() {
    logger::init();

    let args: Vec<String> = std::env::args().collect();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let result: Result<(), String> = if args.len() > 1 {
        match args[1].as_str() {
            "--fetch" | "-f" => rt.block_on(run_fetch()),
            "--history" => rt.block_on(run_history()),
            "--set" => match args.get(2) {
                Some(id) => rt.block_on(run_set(id)),
                None => Err("--set needs a history id (see --history)".to_string()),
            },
            "--delete" => match args.get(2) {
                Some(id) => rt.block_on(run_delete(id)),
                None => Err("--delete needs a history id (see --history)".to_string()),
            },
            "--clear-history" => rt.block_on(run_clear_history()),
            "--preview" => match args.get(2) {
                Some(id) => match parse_delay(args.get(3).map(String::as_str)) {
                    Ok(delay_ms) => rt.block_on(run_preview(id, delay_ms)),
                    Err(e) => Err(e),
                },
                None => Err("--preview needs a history id (see --history)".to_string()),
            },
            "--reset" => rt.block_on(run_reset()),
            "--state" => rt.block_on(run_state()),
            "--watch" => rt.block_on(run_watch()),
            "--reload" => rt.block_on(run_reload()),
            "--help" | "-h" => {
                print_help(&args[0]);
                Ok(())
            }
            "--version" | "-v" => {
                println!("random-wallpaper {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            _ => Err(format!(
                "Unknown argument: {}\nUse --help for usage information",
                args[1]
            )),
        }
    } else {
        rt.block_on(daemon::run_daemon()).map_err(|e| e.to_string())
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

/// Prints help message
fn print_help(program: &str) {
    println!("Random Wallpaper\n");
    println!("Usage: {} [OPTIONS]\n", program);
    println!("Options:");
    println!("  (none)             Run the daemon (D-Bus service and auto-fetch timer)");
    println!("  --fetch, -f        Fetch and apply a new wallpaper");
    println!("  --history          List the wallpaper history (active first)");
    println!("  --set <id>         Re-apply a wallpaper from the history");
    println!("  --delete <id>      Delete one wallpaper from the history");
    println!("  --clear-history    Delete all cached wallpapers");
    println!("  --preview <id> [ms] Show a history entry until --reset (daemon only)");
    println!("  --reset            End a preview (daemon only)");
    println!("  --state            Show the daemon's state and next auto-fetch");
    println!("  --watch            Print daemon events until Ctrl+C");
    println!("  --reload           Make the daemon re-read its history");
    println!("  --version, -v      Show version information");
    println!("  --help, -h         Show this help message");
    println!();
    println!("Commands talk to the running daemon when there is one.");
    println!("Settings live in {}", Config::config_path().map(|p| p.display().to_string()).unwrap_or_default());
}

/// Maximum number of attempts for a standalone fetch
const MAX_RETRIES: u32 = 3;

/// Initial delay between retries in seconds.
/// Uses exponential backoff: 10s, 20s (doubles each attempt).
const INITIAL_RETRY_DELAY_SECS: u64 = 10;

/// Controller for one-off commands; its timer is never started.
async fn standalone_controller() -> Result<Arc<WallpaperController>, String> {
    let timer = Arc::new(AutoFetchTimer::with_state_path(None));
    let controller = daemon::build_controller(Config::load(), timer).map_err(|e| e.to_string())?;
    controller
        .update()
        .await
        .map_err(|e| format!("Failed to load history: {e}"))?;
    Ok(controller)
}

/// Errors worth another attempt
fn is_transient(error: &WallpaperError) -> bool {
    match error {
        WallpaperError::NetworkError(_) | WallpaperError::RateLimited(_) | WallpaperError::TimedOut(_) => true,
        WallpaperError::HttpStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

async fn run_fetch() -> Result<(), String> {
    if is_service_available().await {
        let client = WallpaperClient::connect().await.map_err(|e| e.to_string())?;
        let entry = client
            .fetch_wallpaper()
            .await
            .map_err(|e| format!("Fetch failed: {e}"))?;
        println!("Applied: {}", entry.path);
        return Ok(());
    }

    let controller = standalone_controller().await?;
    println!("Fetching from {}", controller.config().await.source.display_name());

    let mut last_error = String::new();
    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = INITIAL_RETRY_DELAY_SECS * (1 << (attempt - 1));
            println!("Retry {} of {} in {} seconds...", attempt, MAX_RETRIES - 1, delay);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        match controller.fetch_new_wallpaper().await {
            Ok(element) => {
                println!("Applied: {}", element.path.display());
                if let Some(author) = &element.source.author {
                    println!("Photo by {} on {}", author, element.source.source_name);
                }
                return Ok(());
            }
            Err(e) if is_transient(&e) => {
                last_error = e.to_string();
                eprintln!("{last_error}");
            }
            Err(e) => return Err(format!("Fetch failed: {e}")),
        }
    }

    Err(format!("All {MAX_RETRIES} attempts failed. Last error: {last_error}"))
}

fn format_entry(entry: &HistoryEntryInfo, active: bool) -> String {
    let marker = if active { '*' } else { ' ' };
    let mut line = format!("{marker} {}  [{}]", entry.id, entry.source_name);
    if !entry.author.is_empty() {
        line.push_str(&format!(" by {}", entry.author));
    }
    line
}

async fn run_history() -> Result<(), String> {
    let entries: Vec<HistoryEntryInfo> = if is_service_available().await {
        let client = WallpaperClient::connect().await.map_err(|e| e.to_string())?;
        client.get_history().await.map_err(|e| e.to_string())?
    } else {
        let index = app_cache_dir()
            .map(|dir| dir.join("history.jsonl"))
            .ok_or("Could not determine cache directory")?;
        read_index(&index)
            .iter()
            .filter(|e| e.path.is_file())
            .map(HistoryEntryInfo::from)
            .collect()
    };

    if entries.is_empty() {
        println!("History is empty");
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{}", format_entry(entry, i == 0));
    }
    Ok(())
}

async fn run_set(id: &str) -> Result<(), String> {
    let path = if is_service_available().await {
        let client = WallpaperClient::connect().await.map_err(|e| e.to_string())?;
        client.set_wallpaper(id).await.map_err(|e| e.to_string())?.path
    } else {
        let controller = standalone_controller().await?;
        let element = controller.set_wallpaper(id).await.map_err(|e| e.to_string())?;
        element.path.display().to_string()
    };
    println!("Applied: {path}");
    Ok(())
}

async fn run_clear_history() -> Result<(), String> {
    if is_service_available().await {
        let client = WallpaperClient::connect().await.map_err(|e| e.to_string())?;
        client.delete_history().await.map_err(|e| e.to_string())?;
    } else {
        let controller = standalone_controller().await?;
        controller.delete_history().await.map_err(|e| e.to_string())?;
    }
    println!("History cleared");
    Ok(())
}

async fn run_delete(id: &str) -> Result<(), String> {
    if is_service_available().await {
        let client = WallpaperClient::connect().await.map_err(|e| e.to_string())?;
        client.delete_wallpaper(id).await.map_err(|e| e.to_string())?;
    } else {
        let controller = standalone_controller().await?;
        controller.delete_wallpaper(id).await.map_err(|e| e.to_string())?;
    }
    println!("Deleted {id}");
    Ok(())
}

/// Client for commands that only make sense against a running daemon
async fn daemon_client() -> Result<WallpaperClient, String> {
    if !is_service_available().await {
        return Err("The daemon is not running (start it with no arguments)".to_string());
    }
    WallpaperClient::connect().await.map_err(|e| e.to_string())
}

/// Optional preview delay in milliseconds; 0 means the daemon default.
fn parse_delay(arg: Option<&str>) -> Result<u32, String> {
    match arg {
        None => Ok(0),
        Some(ms) => ms
            .parse()
            .map_err(|_| format!("Invalid preview delay: {ms} (expected milliseconds)")),
    }
}

async fn run_preview(id: &str, delay_ms: u32) -> Result<(), String> {
    let client = daemon_client().await?;
    client.preview_wallpaper(id, delay_ms).await.map_err(|e| e.to_string())
}

async fn run_reset() -> Result<(), String> {
    let client = daemon_client().await?;
    client.reset_wallpaper().await.map_err(|e| e.to_string())
}

async fn run_reload() -> Result<(), String> {
    let client = daemon_client().await?;
    client.update().await.map_err(|e| e.to_string())?;
    println!("History reloaded");
    Ok(())
}

fn or_none(value: String) -> String {
    if value.is_empty() {
        "none".to_string()
    } else {
        value
    }
}

async fn run_state() -> Result<(), String> {
    let client = daemon_client().await?;
    let state = client.get_state().await.map_err(|e| e.to_string())?;
    let current = client.get_current_wallpaper().await.map_err(|e| e.to_string())?;
    let next_run = client.get_timer_next_run().await.map_err(|e| e.to_string())?;

    println!("State:      {state}");
    println!("Wallpaper:  {}", or_none(current));
    println!("Next fetch: {}", or_none(next_run));
    Ok(())
}

async fn run_watch() -> Result<(), String> {
    let client = daemon_client().await?;
    let mut started = client.subscribe_loading_started().await.map_err(|e| e.to_string())?;
    let mut stopped = client.subscribe_loading_stopped().await.map_err(|e| e.to_string())?;
    let mut changed = client.subscribe_wallpaper_changed().await.map_err(|e| e.to_string())?;

    println!("Watching wallpaper events (Ctrl+C to stop)");
    loop {
        tokio::select! {
            Some(_) = started.next() => println!("Loading..."),
            Some(signal) = stopped.next() => match signal.args() {
                Ok(args) if args.error.is_empty() => println!("Loading finished"),
                Ok(args) => println!("Loading failed: {}", args.error),
                Err(e) => eprintln!("Malformed LoadingStopped signal: {e}"),
            },
            Some(signal) = changed.next() => match signal.args() {
                Ok(args) => println!("Wallpaper changed: {}", args.path),
                Err(e) => eprintln!("Malformed WallpaperChanged signal: {e}"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(author: &str) -> HistoryEntryInfo {
        HistoryEntryInfo {
            id: "1700000000000_photo.jpg".to_string(),
            path: "/cache/wallpapers/1700000000000_photo.jpg".to_string(),
            source_name: "Unsplash".to_string(),
            author: author.to_string(),
            image_link_url: String::new(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_format_entry() {
        assert_eq!(
            format_entry(&entry("Jane"), true),
            "* 1700000000000_photo.jpg  [Unsplash] by Jane"
        );
        assert_eq!(format_entry(&entry(""), false), "  1700000000000_photo.jpg  [Unsplash]");
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay(None), Ok(0));
        assert_eq!(parse_delay(Some("350")), Ok(350));
        assert!(parse_delay(Some("soon")).is_err());
    }

    #[test]
    fn test_or_none() {
        assert_eq!(or_none(String::new()), "none");
        assert_eq!(or_none("idle".to_string()), "idle");
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&WallpaperError::TimedOut("x".to_string())));
        assert!(is_transient(&WallpaperError::HttpStatus { status: 503, url: String::new() }));
        assert!(!is_transient(&WallpaperError::HttpStatus { status: 404, url: String::new() }));
        assert!(!is_transient(&WallpaperError::Config("bad key".to_string())));
        assert!(!is_transient(&WallpaperError::AlreadyFetching));
    }
}
