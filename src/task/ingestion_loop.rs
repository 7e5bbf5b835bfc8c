//! Background task that polls the listing source.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use log::error;
use log::info;
use tokio::time::sleep;
use tracing::Instrument;

use crate::service::ingestion_service::IngestionReport;
use crate::service::ingestion_service::IngestionService;
use crate::source::ListingSource;

/// Task that stores new listings on a fixed interval.
pub struct IngestionLoop {
    service: Arc<IngestionService>,
    source: Arc<dyn ListingSource>,
    interval: Duration,
    running: AtomicBool,
    cycles: AtomicU64,
}

impl IngestionLoop {
    pub fn new(
        service: Arc<IngestionService>,
        source: Arc<dyn ListingSource>,
        interval: Duration,
    ) -> Arc<Self> {
        info!("Initializing IngestionLoop with interval {interval:?}");
        Arc::new(Self {
            service,
            source,
            interval,
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        })
    }

    pub fn start(self: Arc<Self>) -> anyhow::Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            self.running.store(true, Ordering::SeqCst);
            info!("Starting IngestionLoop.");
            self.spawn_loop();
        }
        Ok(())
    }

    pub fn stop(self: Arc<Self>) -> anyhow::Result<()> {
        info!("Stopping IngestionLoop.");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn spawn_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            while self.running.load(Ordering::SeqCst) {
                if let Err(e) = self.run_cycle().await {
                    error!("Ingestion cycle failed: {e}");
                }
                // Sleep after every cycle, failed or not.
                sleep(self.interval).await;
            }
            info!("IngestionLoop stopped.");
        });
    }

    /// Runs one ingestion cycle inside its own span.
    pub async fn run_cycle(&self) -> anyhow::Result<IngestionReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let span = tracing::info_span!("ingest", cycle);

        async {
            let report = self.service.run_cycle(self.source.as_ref()).await?;
            if report.persisted > 0 {
                info!(
                    "Stored {} new listings ({} fetched, {} already known)",
                    report.persisted, report.fetched, report.skipped
                );
            } else {
                debug!("No new listings ({} fetched)", report.fetched);
            }
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(span)
        .await
    }
}
