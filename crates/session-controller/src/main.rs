//! Session Controller replay binary
//!
//! Drives a `SessionActor` from newline-delimited JSON on stdin and prints
//! every session update as one JSON line on stdout. Signaling requests are
//! acknowledged locally and the media transport only logs, so a recorded
//! session can be replayed without a server.
//!
//! # Startup Flow
//!
//! 1. Initialize tracing (`SC_LOG_JSON=true` for JSON output)
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder (`SC_METRICS_ENABLED`)
//! 4. Spawn the session actor with the replay signaling channel and transport
//! 5. Feed stdin lines until EOF or a shutdown signal

#![warn(clippy::pedantic)]

use anyhow::Context;
use session_controller::actors::{SessionActor, SessionMetrics, SessionUpdate};
use session_controller::config::Config;
use session_controller::observability::init_metrics_recorder;
use session_controller::replay::{ReplayLine, ReplaySignaling, ReplayTransport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Render channel capacity.
const UPDATE_CHANNEL_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Session Controller replay");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        session_id = %config.session_id,
        member = %config.member_name,
        room = %config.room_name,
        grid_rows = config.grid_rows,
        grid_cols = config.grid_cols,
        pause_cooldown_seconds = config.pause_cooldown.as_secs(),
        "Configuration loaded successfully"
    );

    if config.metrics_enabled {
        let _prometheus_handle = init_metrics_recorder()
            .map_err(anyhow::Error::msg)
            .context("Failed to install Prometheus metrics recorder")?;
        info!("Prometheus metrics recorder initialized");
    }

    let cancel_token = CancellationToken::new();
    let metrics = SessionMetrics::new();
    let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_BUFFER);

    let (handle, actor_task) = SessionActor::spawn(
        &config,
        Arc::new(ReplaySignaling::new()),
        Arc::new(ReplayTransport),
        update_tx,
        cancel_token.clone(),
        Arc::clone(&metrics),
    );

    let printer = tokio::spawn(print_updates(update_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number: usize = 0;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!(lines = line_number, "Input exhausted");
                    break;
                };
                line_number += 1;

                match ReplayLine::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ReplayLine::Event(event))) => {
                        if let Err(e) = handle.signaling_event(event).await {
                            warn!(line = line_number, error = %e, "Event rejected");
                        }
                    }
                    Ok(Some(ReplayLine::Intent(intent))) => match intent.apply(&handle).await {
                        Ok(Some(result)) => println!("{result}"),
                        Ok(None) => {}
                        Err(e) => warn!(line = line_number, error = %e, "Intent rejected"),
                    },
                    Err(e) => warn!(line = line_number, error = %e, "Skipping malformed line"),
                }
            }
        }
    }

    handle.cancel();
    actor_task.await.context("Session actor task failed")?;
    // The actor dropped its sender, so the printer drains and exits.
    printer.await.context("Update printer task failed")??;

    let counters = metrics.snapshot();
    info!(
        events = counters.events_processed,
        intents = counters.intents_processed,
        rejected = counters.intents_rejected,
        dropped_updates = counters.updates_dropped,
        "Session Controller replay finished"
    );
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "session_controller=debug".into());
    let json = std::env::var("SC_LOG_JSON").is_ok_and(|v| v.eq_ignore_ascii_case("true"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn print_updates(mut updates: mpsc::Receiver<SessionUpdate>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(update) = updates.recv().await {
        let mut line = serde_json::to_vec(&update).context("Failed to serialize update")?;
        line.push(b'\n');
        stdout.write_all(&line).await.context("Failed to write update")?;
    }
    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
