//! vstream-ingest - VoiceStream PBX ingest microservice
//!
//! Accepts sequence-numbered call packets from a PBX, reconstructs each
//! call's stream while tracking gaps, drives the call lifecycle through the
//! AI transcription/sentiment pipeline, and fans lifecycle events out to
//! supervisor subscribers.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vstream_common::events::EventBus;
use vstream_ingest::config::Config;
use vstream_ingest::engine::CallEngine;
use vstream_ingest::services::SimulatedAiClient;
use vstream_ingest::{build_router, AppState};

/// Events buffered per SSE subscriber before it is considered dead
const EVENT_BUS_CAPACITY: usize = 1000;

/// VoiceStream PBX ingest service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store connection (SQLite URL or path; overrides environment)
    #[arg(short, long, value_name = "URL")]
    store_connection: Option<String>,

    /// Host address to bind to
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("vstream_ingest={},vstream_common={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("VoiceStream ingest service starting...");

    let config = Config::resolve(args.store_connection, args.host, args.port);
    info!("Store: {}", config.store_connection);

    let db = vstream_common::db::connect(&config.store_connection).await?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let engine = CallEngine::new(
        db.clone(),
        event_bus.clone(),
        Arc::new(SimulatedAiClient::default()),
    );
    let state = AppState::new(db, event_bus, engine);

    let app = build_router(state);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
