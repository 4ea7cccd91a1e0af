//! Main entry point for the tradepost service.
//!
//! This binary wires the engine to its HTTP surface: it loads the
//! configuration, builds the engine over the configured storage
//! backend, runs the startup reconciliation sweep and serves the
//! console API until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tradepost_config::Config;
use tradepost_core::Engine;

mod apis;
mod server;

/// Command-line arguments for the tradepost service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started tradepost");

	// Load configuration
	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.engine.id);

	// Build the engine over the configured storage backend
	let engine = Arc::new(Engine::from_config(config)?);

	// Reconcile storage before taking traffic
	let report = engine.run_sweep().await?;
	tracing::info!(
		scanned = report.scanned,
		duplicates_resolved = report.duplicates_resolved,
		"Startup reconciliation finished"
	);

	match engine.config().api.clone() {
		Some(api_config) if api_config.enabled => {
			server::start_server(api_config, engine).await?;
		},
		_ => {
			tracing::warn!("API server disabled in configuration; nothing to serve");
		},
	}

	tracing::info!("Stopped tradepost");
	Ok(())
}
