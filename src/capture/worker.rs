//! Capture worker driven by the event bus
//!
//! Runs one capture per `CaptureRequested` event, strictly in the order
//! requests arrive, and publishes the outcome.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::buffer::CaptureBuffer;
use crate::events::AppEvent;

pub struct CaptureWorker {
    buffer: Arc<CaptureBuffer>,
    event_tx: broadcast::Sender<AppEvent>,
}

impl CaptureWorker {
    pub fn new(buffer: Arc<CaptureBuffer>, event_tx: broadcast::Sender<AppEvent>) -> Self {
        Self { buffer, event_tx }
    }

    /// Process capture requests until the bus closes
    pub async fn run(&self, mut event_rx: broadcast::Receiver<AppEvent>) {
        info!("capture worker started");

        loop {
            match event_rx.recv().await {
                Ok(AppEvent::CaptureRequested { hotkey }) => {
                    info!(%hotkey, "capture requested");
                    self.capture().await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "capture worker lagged, requests dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("capture worker stopped");
    }

    /// Capture once on a blocking thread and publish the outcome
    pub async fn capture(&self) -> AppEvent {
        let started = Instant::now();
        let buffer = Arc::clone(&self.buffer);
        let result = tokio::task::spawn_blocking(move || buffer.capture()).await;

        let event = match result {
            Ok(Ok(bytes)) => AppEvent::Captured {
                bytes,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(e)) => AppEvent::CaptureFailed {
                message: e.to_string(),
            },
            Err(e) => AppEvent::CaptureFailed {
                message: format!("capture task failed: {e}"),
            },
        };

        info!(%event, "capture finished");
        let _ = self.event_tx.send(event.clone());
        event
    }
}
