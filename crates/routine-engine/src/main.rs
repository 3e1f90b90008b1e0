//! Routine engine runner
//!
//! Loads routine definitions from JSON files given on the command line,
//! wires a logging command sink, and runs the engine until interrupted.
//! Fact changes are expected from an external producer applying to the
//! engine's store; the built-in ticker keeps schedule boundaries firing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use routine_core::{CommandCall, CommandSink, FixedAstro, SinkError};
use routine_engine::{Engine, EngineConfig, RoutineConfig};

/// Sink that only logs; stands in until a device transport is wired up
struct LogSink;

#[async_trait]
impl CommandSink for LogSink {
    async fn dispatch(&self, call: CommandCall) -> Result<(), SinkError> {
        info!(device = %call.device, command = %call.command, "dispatch");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting routine engine");

    let astro = Arc::new(FixedAstro::new(
        NaiveTime::from_hms_opt(6, 30, 0).expect("valid time"),
        NaiveTime::from_hms_opt(19, 45, 0).expect("valid time"),
    ));
    let engine = Arc::new(Engine::new(
        Arc::new(LogSink),
        astro,
        EngineConfig::default(),
    ));

    for path in std::env::args().skip(1) {
        let payload = std::fs::read_to_string(&path)
            .with_context(|| format!("reading routine file {path}"))?;
        let config: RoutineConfig = serde_json::from_str(&payload)
            .with_context(|| format!("parsing routine file {path}"))?;
        let name = config.name.clone();
        engine
            .add_routine(config)
            .with_context(|| format!("compiling routine {name}"))?;
    }

    engine.spawn_ticker();
    let run = engine.clone().spawn();

    info!("Routine engine is running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    run.abort();

    Ok(())
}
