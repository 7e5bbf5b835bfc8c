//! Background task that works off the delivery queue.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use log::error;
use log::info;
use tokio::time::sleep;
use tracing::Instrument;

use crate::service::delivery_service::DeliveryOutcome;
use crate::service::delivery_service::DeliveryService;

/// Task that delivers one pending listing announcement per interval.
///
/// Only one worker may run against a database: the oldest pending task is
/// read and then processed without claiming it first.
pub struct DeliveryWorker {
    service: Arc<DeliveryService>,
    interval: Duration,
    running: AtomicBool,
}

impl DeliveryWorker {
    pub fn new(service: Arc<DeliveryService>, interval: Duration) -> Arc<Self> {
        info!("Initializing DeliveryWorker with interval {interval:?}");
        Arc::new(Self {
            service,
            interval,
            running: AtomicBool::new(false),
        })
    }

    pub fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            self.running.store(true, Ordering::SeqCst);
            info!("Starting DeliveryWorker.");
            self.spawn_loop();
        }
        Ok(())
    }

    pub fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        info!("Stopping DeliveryWorker.");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn spawn_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            while self.running.load(Ordering::SeqCst) {
                if let Err(e) = self.run_once().await {
                    error!("Delivery cycle failed: {e}");
                }
                sleep(self.interval).await;
            }
            info!("DeliveryWorker stopped.");
        });
    }

    pub async fn run_once(&self) -> anyhow::Result<DeliveryOutcome> {
        let span = tracing::info_span!("deliver", task_id = tracing::field::Empty);
        async {
            let outcome = self.service.process_next(Utc::now()).await?;
            if outcome == DeliveryOutcome::Idle {
                debug!("No pending delivery tasks.");
            }
            Ok::<_, anyhow::Error>(outcome)
        }
        .instrument(span)
        .await
    }
}
