//! Periodic sweep that re-enqueues pending originals nobody processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::image_service::ImageService;
use crate::config::ReconcilerConfig;

/// Runs [`ImageService::reconcile_pending`] on an interval.
pub struct Reconciler {
    service: Arc<ImageService>,
    interval: Duration,
    stale_after: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Reconciler {
    pub fn new(service: Arc<ImageService>, config: &ReconcilerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            service,
            interval: Duration::from_secs(config.interval_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the sweep loop (spawns a background task).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reconciler already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let service = Arc::clone(&self.service);
        let interval = self.interval;
        let stale_after = self.stale_after;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Reconciler started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reconciler received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        match service.reconcile_pending(stale_after).await {
                            Ok(0) => {}
                            Ok(n) => info!("Reconciler re-enqueued {} image(s)", n),
                            Err(e) => error!("Reconciliation sweep failed: {}", e),
                        }
                    }
                }
            }
            info!("Reconciler stopped");
        });
    }

    /// Stop the sweep loop.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Reconciler not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }
}
