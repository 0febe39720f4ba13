// midirec - Web-controlled MIDI recorder
// Main library entry point

pub mod config;
pub mod devices;
pub mod error;
pub mod recording;
pub mod session;
pub mod web;

use std::sync::Arc;

use crate::config::Config;
use crate::devices::{MidiInputProvider, MidirProvider};
use crate::recording::{SessionController, StopOutcome};
use crate::session::RecordingStore;

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Build the controller and serve the web interface until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = RecordingStore::open(&config.storage_path)?;
    log::info!("Storing recordings in {}", store.root().display());

    let provider: Arc<dyn MidiInputProvider> =
        Arc::new(MidirProvider::new(config.client_name.clone()));
    let controller = Arc::new(SessionController::new(
        provider,
        store,
        config.capture_options(),
    ));

    let app = web::router(web::WebState {
        controller: controller.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Save whatever was being captured before exiting
    match controller.stop().await {
        StopOutcome::NotActive => {}
        StopOutcome::Finished(Ok(path)) => {
            log::info!("Saved in-progress recording {} on shutdown", path.display())
        }
        StopOutcome::Finished(Err(e)) => log::error!("Recording lost on shutdown: {}", e),
    }

    log::info!("midirec stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
