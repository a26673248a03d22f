//! Basic engine usage: start a worker, wait for Ctrl+C or SIGTERM, run the
//! shutdown hooks, exit.
//!
//! ```text
//! APP_NAME=demo APP_DEBUG=true cargo run --example basic
//! ```

use app_lifecycle::{Engine, Hook, Lifecycle, Logger, Result};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let engine = Engine::from_env()?.with_default_logger().build()?;
    if let Some(logger) = engine.logger() {
        logger.install_global()?;
    }

    info!(
        app = engine.name(),
        version = engine.version(),
        user = %engine.current_user(),
        "Starting, press Ctrl+C to stop"
    );

    // Here you start your servers, workers, etc.
    let token = engine.cancellation_token();
    let worker = tokio::spawn(async move {
        let mut ticks = 0_u64;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(1)) => {
                    ticks += 1;
                    info!(ticks, "Working");
                }
            }
        }
        ticks
    });

    engine.lifecycle().register(
        "worker",
        Hook::new(move || async move {
            match worker.await {
                Ok(ticks) => info!(ticks, "Worker stopped"),
                Err(e) => warn!(error = %e, "Worker task failed"),
            }
            Ok(())
        }),
    )?;

    engine.lifecycle().register(
        "connections",
        Hook::new(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            info!("Connections drained");
            Ok(())
        }),
    )?;

    engine.wait().await;
    println!("Shutdown is over.");
    Ok(())
}
