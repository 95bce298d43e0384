//! capture-pacer - Main entry point
//!
//! Runs one capture session against the local display and reports pacing
//! statistics on exit.

use capture_pacer::args::Args;
use capture_pacer::clock::SystemClock;
use capture_pacer::config::{Config, ConfigError, SharedConfigSource};
use capture_pacer::pacer::PacingStats;
use capture_pacer::platform::Platform;
use capture_pacer::runtime_settings::RuntimeSettings;
use capture_pacer::session::{CaptureSession, DeliverError};
use clap::Parser;
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::task;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before logging so its level can apply
    let loaded = args.load_config();
    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => Config::default(),
    };
    args.apply_overrides(&mut config);

    let log_level = if args.verbose { "debug" } else { config.logging.level.as_str() };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("CAPTURE_PACER_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    info!("capture-pacer v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => info!("Loaded configuration from {:?}", args.config),
        Err(e) => warn!("Failed to load config: {}, using defaults", e),
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    let settings = Arc::new(RuntimeSettings::new());
    let source = SharedConfigSource::new(config.capture.to_snapshot());

    // Keep the watcher alive for the whole run
    let _watcher = if args.no_watch {
        None
    } else {
        match watch_config(&args, &config, source.clone(), settings.clone()) {
            Ok(watcher) => {
                info!("Watching {:?} for changes", args.config);
                Some(watcher)
            }
            Err(e) => {
                warn!("Configuration reload disabled: {}", e);
                None
            }
        }
    };

    let platform = build_platform(args.display.clone())?;
    let mut session = CaptureSession::new(
        &config,
        Box::new(source),
        platform,
        Arc::new(SystemClock::new()),
        settings.clone(),
    );

    let frame_limit = args.frames;
    let mut delivery_handle = task::spawn_blocking(move || {
        let mut delivered = 0u64;
        loop {
            match session.deliver_frame() {
                Ok(sample) => {
                    delivered += 1;
                    debug!(
                        "[{}] frame {}..{} repeated={} discontinuity={}",
                        session.id(),
                        sample.start,
                        sample.end,
                        sample.repeated,
                        sample.discontinuity
                    );
                    if frame_limit.is_some_and(|limit| delivered >= limit) {
                        break;
                    }
                }
                Err(DeliverError::Inactive) => break,
                Err(err) => return Err(err.to_string()),
            }
        }
        Ok::<PacingStats, String>(session.stats())
    });

    let shutdown = signal::ctrl_c();
    let finished = tokio::select! {
        _ = shutdown => None,
        result = &mut delivery_handle => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Initiating graceful shutdown...");
            settings.set_active(false);
            delivery_handle.await
        }
    };

    log_delivery_result(result);
    info!("capture-pacer stopped");

    Ok(())
}

/// Re-read the configuration file whenever it changes on disk
fn watch_config(
    args: &Args,
    running: &Config,
    source: SharedConfigSource,
    settings: Arc<RuntimeSettings>,
) -> notify::Result<RecommendedWatcher> {
    let args = args.clone();
    let running = running.clone();
    let file_name = args.config.file_name().map(|name| name.to_os_string());
    let dir = match args.config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && event
                    .paths
                    .iter()
                    .any(|path| path.file_name() == file_name.as_deref());
            if !relevant {
                return;
            }
            match reload_file(&args) {
                Ok(config) => {
                    for change in config.restart_only_changes(&running) {
                        warn!("Ignoring {} until restart", change);
                    }
                    source.replace(config.capture.to_snapshot());
                    settings.request_reload();
                    debug!("Configuration file changed, reload requested");
                }
                Err(e) => warn!("Ignoring configuration change: {}", e),
            }
        }
        Err(e) => warn!("Configuration watch error: {}", e),
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn reload_file(args: &Args) -> Result<Config, ConfigError> {
    let mut config = args.load_config()?;
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "x11")]
fn build_platform(display: Option<String>) -> Result<Box<dyn Platform>, Box<dyn std::error::Error>> {
    Ok(Box::new(capture_pacer::platform::x11::X11Platform::new(display)))
}

#[cfg(not(feature = "x11"))]
fn build_platform(_display: Option<String>) -> Result<Box<dyn Platform>, Box<dyn std::error::Error>> {
    Err("built without a capture platform, enable the x11 feature".into())
}

fn log_delivery_result(result: Result<Result<PacingStats, String>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(stats)) => info!(
            "Delivered {} frames ({} missed) over {:.1}s: average {:.2} fps, possible {:.2} fps, fastest round {:.2} fps, negotiated {:.2} fps",
            stats.delivered,
            stats.missed_count,
            stats.elapsed.as_secs_f64(),
            stats.average_fps(),
            stats.average_possible_fps(),
            stats.fastest_round_fps(),
            stats.negotiated_fps()
        ),
        Ok(Err(err)) => error!("Delivery loop failed: {}", err),
        Err(err) => error!("Delivery loop join error: {}", err),
    }
}
