pub mod config;   // Configuration records
pub mod monitor;  // Built-in logging listener
pub mod options;  // Command line options parsing
pub mod prelude;  // Common imports and types
pub mod simpleip; // Simple IP protocol implementation

use crate::prelude::*;
use crate::monitor::Monitor;
use crate::simpleip::SimpleIpClient;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Delay between attempts to bring the initial connection up.
const OPEN_RETRY_DELAY_SECS: u64 = 5;

fn init_logging(loglevel: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(loglevel))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Main application loop: connect to the configured TV, log everything it
/// tells us, and stay connected until shutdown is signalled.
pub async fn app(mut shutdown_rx: broadcast::Receiver<()>, config: Config) -> Result<()> {
    init_logging(&config.loglevel());
    info!("starting simpleip-bridge {}", CARGO_PKG_VERSION);

    let tv = config.tv();
    let client = SimpleIpClient::with_settings(tv.host(), tv.port(), tv.client_settings());
    client.add_listener(Arc::new(Monitor));

    // Once open() succeeds the client reconnects on its own; until then,
    // keep knocking.
    loop {
        match client.open().await {
            Ok(()) => break,
            Err(e) => {
                error!("tv {}: {}", client.peer(), e);
                info!("tv {}: retrying in {}s", client.peer(), OPEN_RETRY_DELAY_SECS);
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown before connection could be established");
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_secs(OPEN_RETRY_DELAY_SECS)) => {}
        }
    }

    let _ = shutdown_rx.recv().await;
    info!("shutdown signal received");
    client.close().await;
    info!("shutdown complete");

    Ok(())
}

/// Application entry point: wires ctrl-c to the shutdown channel and runs
/// the main loop.
pub async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    app(shutdown_rx, config).await
}
