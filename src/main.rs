//! screen-cropper: Background daemon for hotkey-triggered screen capture
//!
//! This daemon provides:
//! - Global hotkey detection via the native key hook
//! - Full virtual-screen capture into a reusable frame cache
//! - HTTP access to the latest frame at a fixed path

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use screen_cropper::capture::{CaptureBuffer, CaptureWorker, PngEncoder, XcapScreen};
use screen_cropper::config::Config;
use screen_cropper::events::{self, AppEvent};
use screen_cropper::hotkey::{HotkeyEngine, NativeHook};
use screen_cropper::lifecycle::ShutdownSignal;
use screen_cropper::server::FrameServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "screen-cropper starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(addr = %config.addr, hotkey = %config.hotkey, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Hotkey callbacks and the capture worker share one bus
    let (event_tx, _event_rx) = events::bus();

    // Capture bounds are fixed from the displays present at startup
    let buffer = Arc::new(
        CaptureBuffer::new(&XcapScreen, XcapScreen, PngEncoder)
            .context("failed to set up screen capture")?,
    );
    info!(bounds = ?buffer.bounds(), "capture buffer ready");

    let worker = CaptureWorker::new(Arc::clone(&buffer), event_tx.clone());
    let worker_rx = event_tx.subscribe();

    let engine = HotkeyEngine::with_queue_size(NativeHook::new(), config.queue_size);
    let hotkey_tx = event_tx.clone();
    let hotkey = engine.register(config.hotkey.keys().iter().copied(), {
        let name = config.hotkey.to_string();
        move || {
            let _ = hotkey_tx.send(AppEvent::CaptureRequested {
                hotkey: name.clone(),
            });
        }
    });

    // A hook that cannot be installed is fatal
    if let Err(e) = engine.start() {
        error!(?e, "failed to start hotkey engine - check input permissions");
        return Err(e).context("failed to start hotkey engine");
    }
    info!(%hotkey, "hotkey engine started");

    let server = FrameServer::bind(config.addr, Arc::clone(&buffer)).await?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        _ = worker.run(worker_rx) => {
            info!("capture worker exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "frame server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown();
    if let Err(e) = engine.stop().await {
        error!(?e, "failed to stop hotkey engine");
        return Err(e).context("failed to stop hotkey engine");
    }

    info!("screen-cropper stopped");

    Ok(())
}
