//! BML Browser - Main Entry Point

use anyhow::Context;
use bml_browser::AppOptions;
use bml_engine::RuntimeConfig;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: bml-browser <carousel-dir> [start-document] [config.json]";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let carousel = args.next().context(USAGE)?;
    let mut options = AppOptions::new(carousel);
    if let Some(start) = args.next() {
        options.start_document = start;
    }
    if let Some(path) = args.next() {
        options.config = load_config(&path)?;
    }

    tracing::info!("Starting BML browser {}", bml_engine::VERSION);
    smol::block_on(bml_browser::run(options))
}

fn load_config(path: &str) -> anyhow::Result<RuntimeConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid configuration in {}", path))
}
