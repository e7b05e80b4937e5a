//! scribe-relay - Meeting Recording Relay Service
//!
//! Listens on the meeting platform's event stream for completed cloud
//! recordings, extracts per-character task facts from the audio, and
//! relays them to the task board through a rate-limited dispatch queue.
//!
//! Designed for unattended operation: connection loss, credential expiry,
//! and downstream throttling are all recovered in place.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use scribe_common::events::EventBus;
use scribe_relay::auth::TokenProvider;
use scribe_relay::config::RelayConfig;
use scribe_relay::dispatch::{Dispatcher, DispatcherConfig};
use scribe_relay::extract::{
    ExtractionChain, ExtractionStrategy, InterpretedExtraction, PatternExtraction,
};
use scribe_relay::process::{EventProcessor, ProcessorConfig};
use scribe_relay::services::{HttpInterpreter, HttpTaskBoard, HttpTranscriber, LocalMediaStore};
use scribe_relay::stream::{StreamConfig, StreamManager, TungsteniteTransport};

#[derive(Parser, Debug)]
#[command(name = "scribe-relay", version, about = "Meeting recording to task board relay")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting scribe-relay");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref())?;

    let event_bus = EventBus::new(100);

    // Outbound side: board client behind the rate-limited queue
    let board = Arc::new(HttpTaskBoard::new(&config.board)?);
    let dispatcher = Dispatcher::new(DispatcherConfig::from(&config.dispatcher));

    // Media scratch area
    let scratch_dir = std::env::temp_dir().join("scribe-relay");
    let media = Arc::new(LocalMediaStore::new(scratch_dir)?);

    // Extraction chain, richest strategy first
    let extraction = &config.extraction;
    let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
    match (
        &extraction.transcriber_url,
        &extraction.transcriber_key,
        &extraction.interpreter_url,
        &extraction.interpreter_key,
    ) {
        (Some(t_url), Some(t_key), Some(i_url), Some(i_key)) => {
            let transcriber = HttpTranscriber::new(t_url.clone(), t_key.clone())?;
            let interpreter = HttpInterpreter::new(
                i_url.clone(),
                i_key.clone(),
                extraction.interpreter_model.clone(),
            )?;
            strategies.push(Box::new(InterpretedExtraction::new(
                Arc::new(transcriber),
                Arc::new(interpreter),
                extraction.default_project.clone(),
            )));
            info!("Interpreted extraction enabled");
        }
        _ => {
            warn!("Transcription/interpretation services not fully configured, relying on pattern extraction only");
        }
    }
    strategies.push(Box::new(PatternExtraction::new(
        extraction.default_project.clone(),
    )?));
    let chain = Arc::new(ExtractionChain::new(strategies));

    let processor = Arc::new(EventProcessor::new(
        media,
        chain,
        dispatcher,
        board,
        event_bus.clone(),
        ProcessorConfig::from(extraction),
    ));

    // Inbound side: the one persistent connection
    let tokens = Arc::new(TokenProvider::new(&config.auth)?);
    let manager = StreamManager::new(
        StreamConfig::from(&config.stream),
        tokens,
        Arc::new(TungsteniteTransport),
        processor,
        event_bus.clone(),
    );

    manager.connect().await;
    info!("Relay running; waiting for events");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    manager.close();

    Ok(())
}
