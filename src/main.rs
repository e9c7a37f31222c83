mod battery;
mod bluetooth;
mod config;
mod database;
mod models;
mod payload;
mod pipeline;

use log::{error, info};
use std::sync::Arc;

use bluetooth::scanner::scan_advertisements;
use config::ServiceConfig;
use database::PostgresSink;
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the logging toggle can take effect
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp_secs()
        .init();

    info!(
        "Starting StructureNode ingestion service (queue_max={}, batch_size={}, flush_ms={}, max_seq_cache={})",
        config.queue_max, config.batch_size, config.flush_ms, config.max_seq_cache
    );

    let sink = Arc::new(PostgresSink::new(config.database_url.clone()));
    let pipeline = Pipeline::start(&config, sink);

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    // Run the scanner until it fails or a shutdown is requested. Dropping
    // the scanner future releases its producer handle.
    tokio::select! {
        result = scan_advertisements(pipeline.producer()) => {
            match result {
                Ok(_) => info!("Scanner stopped"),
                Err(e) => error!("Scanner error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Shutdown requested; draining pipeline");
        }
    }

    // Drain the queue and run the final forced flush before exiting.
    pipeline.shutdown().await;
    info!("Pipeline stopped");

    Ok(())
}
