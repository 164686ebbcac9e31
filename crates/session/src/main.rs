//! `chess-play`: play or watch a game through a relay server.

use std::sync::Arc;

use anyhow::Context;
use chess_session::config::Cli;
use chess_session::console::print_events;
use chess_session::source::{EngineSource, HumanInput, MoveSource};
use chess_session::transport::{RelayClient, Transport};
use chess_session::Runner;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    // Quiet by default so logs do not drown the board
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.name.trim().is_empty() {
        anyhow::bail!("--name must not be empty");
    }

    let client = RelayClient::connect(&cli.relay, &cli.name, cli.channel_capacity.get())
        .await
        .with_context(|| format!("connecting to relay at {}", cli.relay))?;
    let transport: Arc<dyn Transport> = Arc::new(client);
    info!(relay = %cli.relay, name = %cli.name, room = %cli.game, "Connected");

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone(), transport.clone(), cli.grace);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events_rx));
    let runner = Runner::new(transport.clone(), cli.game.clone(), cli.presence_timeout, events_tx);

    let result = if cli.watch {
        runner.watch(&cancel).await
    } else {
        match move_source(&cli).await {
            Ok(source) => runner.play(source, &cancel).await,
            Err(e) => Err(e),
        }
    };

    // Let the console drain before exiting
    drop(runner);
    let _ = printer.await;
    transport.close().await;

    let code = match result {
        Ok(report) if report.completed() => 0,
        Ok(report) => {
            println!("{}", report.record);
            1
        }
        Err(e) => {
            error!(error = %e, "Session failed");
            eprintln!("{e}");
            1
        }
    };
    // A cancelled stdin read would otherwise hold up runtime shutdown
    std::process::exit(code)
}

async fn move_source(cli: &Cli) -> chess_session::Result<Box<dyn MoveSource>> {
    match &cli.engine {
        Some(path) => Ok(Box::new(EngineSource::spawn(path, cli.move_time).await?)),
        None => Ok(Box::new(HumanInput::stdio())),
    }
}

/// SIGINT/SIGTERM cancel the session and release the transport. If the
/// session has not unwound after `grace` (a blocking stdin read, say), exit anyway.
fn spawn_signal_handler(cancel: CancellationToken, transport: Arc<dyn Transport>, grace: std::time::Duration) {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        warn!(signal, "Shutting down");
        cancel.cancel();
        transport.close().await;

        tokio::time::sleep(grace).await;
        warn!("Session did not stop in time, forcing exit");
        std::process::exit(1);
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return "SIGINT";
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
