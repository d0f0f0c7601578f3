//! Mediasync - Terminal Remote
//!
//! Attaches a simulated playback surface to one playlist and drives the
//! playlist from the keyboard, with a terminal dashboard.
//!
//! Usage:
//!   cargo run --release -- --playlist pl-1
//!   cargo run --release -- --playlist pl-1 --no-dashboard  # Plain logging mode

mod dashboard;
mod metrics;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mediasync_core::config::DEFAULT_SERVICE_ADDRESS;
use mediasync_core::{ReconcilePolicy, ServiceConfig};
use parking_lot::RwLock;

#[derive(Parser, Debug)]
#[command(name = "mediasync-remote")]
#[command(about = "Keyboard remote and simulated player for a mediasync playlist")]
struct Args {
    /// Playlist to follow and control
    #[arg(short, long, env = "MEDIASYNC_PLAYLIST")]
    playlist: String,

    /// Service address
    #[arg(short, long, env = "MEDIASYNC_SERVICE_ADDRESS", default_value = DEFAULT_SERVICE_ADDRESS)]
    address: String,

    /// User token sent with playback commands and catalog mutations
    #[arg(short = 't', long, env = "MEDIASYNC_USER_TOKEN")]
    user_token: Option<String>,

    /// Service secret key for user-management catalog calls
    #[arg(long, env = "MEDIASYNC_SECRET_KEY")]
    secret_key: Option<String>,

    /// Drift in seconds that forces a reload and re-seek
    #[arg(long, env = "MEDIASYNC_RESYNC_THRESHOLD", default_value = "1.0")]
    resync_threshold: f64,

    /// Player position in seconds at or below which playback counts as not started
    #[arg(long, env = "MEDIASYNC_STOPPED_POSITION", default_value = "0.0")]
    stopped_position: f64,

    /// Seconds a preparing player may stay unready before its source is reloaded
    #[arg(long, env = "MEDIASYNC_PREPARE_TIMEOUT", default_value = "5.0")]
    prepare_timeout: f64,

    /// Upload an mp4/wav file to the playlist on startup
    #[arg(long)]
    upload: Option<PathBuf>,

    /// Plain logging instead of the dashboard
    #[arg(long)]
    no_dashboard: bool,

    /// Tick interval in milliseconds
    #[arg(long, default_value = "50")]
    tick_ms: u64,

    /// Simulated media preparation time in milliseconds
    #[arg(long, default_value = "300")]
    prepare_ms: u64,

    /// Seconds to wait before reconnecting after a drop (0 disables)
    #[arg(long, default_value = "5")]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = service_config(&args)?;

    let settings = runner::Settings {
        config,
        playlist_id: args.playlist.clone(),
        upload: args.upload.clone(),
        tick: Duration::from_millis(args.tick_ms.max(1)),
        prepare_delay: Duration::from_millis(args.prepare_ms),
        reconnect_after: (args.reconnect_secs > 0).then(|| Duration::from_secs(args.reconnect_secs)),
    };

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new(
        settings.config.base_address(),
        &settings.playlist_id,
    )));

    if args.no_dashboard {
        // Run with plain logging
        runner::run_with_logging(settings, metrics).await
    } else {
        // Run with TUI dashboard
        dashboard::run(settings, metrics).await
    }
}

fn service_config(args: &Args) -> Result<ServiceConfig, Box<dyn std::error::Error + Send + Sync>> {
    for (name, value) in [
        ("--resync-threshold", args.resync_threshold),
        ("--stopped-position", args.stopped_position),
        ("--prepare-timeout", args.prepare_timeout),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{} must be a non-negative number of seconds, got {}", name, value).into());
        }
    }

    let mut config = ServiceConfig::new(args.address.clone()).with_reconcile_policy(ReconcilePolicy {
        resync_threshold_secs: args.resync_threshold,
        stopped_position_secs: args.stopped_position,
        prepare_timeout_secs: args.prepare_timeout,
    });
    config.user_token = args.user_token.clone().filter(|t| !t.is_empty());
    config.secret_key = args.secret_key.clone().filter(|k| !k.is_empty());
    config.socket_url()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_reach_service_config() {
        let args = Args::try_parse_from([
            "mediasync-remote",
            "--playlist",
            "pl-1",
            "--address",
            "https://sync.example.com",
            "--secret-key",
            "s3cret",
            "--resync-threshold",
            "2.5",
            "--stopped-position",
            "0.2",
            "--prepare-timeout",
            "9",
        ])
        .unwrap();

        let config = service_config(&args).unwrap();
        assert_eq!(config.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.reconcile.resync_threshold_secs, 2.5);
        assert_eq!(config.reconcile.stopped_position_secs, 0.2);
        assert_eq!(config.reconcile.prepare_timeout_secs, 9.0);
    }

    #[test]
    fn test_defaults_match_core_policy() {
        let args = Args::try_parse_from(["mediasync-remote", "--playlist", "pl-1"]).unwrap();
        let config = service_config(&args).unwrap();
        assert_eq!(config.reconcile, ReconcilePolicy::default());
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let args = Args::try_parse_from([
            "mediasync-remote",
            "--playlist",
            "pl-1",
            "--resync-threshold=-1",
        ])
        .unwrap();
        assert!(service_config(&args).is_err());
    }
}
