//! Moves newly published listings from a source into storage.

use std::sync::Arc;

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::Utc;
use futures::TryStreamExt;
use log::debug;
use log::info;

use crate::entity::ListingModel;
use crate::repository::Repository;
use crate::service::error::ServiceError;
use crate::service::taxonomy_service::TaxonomyService;
use crate::source::ListingRecord;
use crate::source::ListingSource;

/// Outcome of one ingestion cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub fetched: usize,
    pub persisted: usize,
    /// Records whose article was already stored.
    pub skipped: usize,
}

pub struct IngestionService {
    db: Arc<Repository>,
    taxonomy: Arc<TaxonomyService>,
    listing_offset: FixedOffset,
    lookback: chrono::Duration,
}

impl IngestionService {
    pub fn new(
        db: Arc<Repository>,
        taxonomy: Arc<TaxonomyService>,
        listing_offset: FixedOffset,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            db,
            taxonomy,
            listing_offset,
            lookback,
        }
    }

    /// Publication time of the newest stored listing, or `now` minus the
    /// lookback when nothing is stored yet.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn watermark(&self, now: DateTime<Utc>) -> Result<DateTime<FixedOffset>, ServiceError> {
        let latest = self.db.listing.select_latest_published().await?;
        Ok(match latest {
            Some(published) => published.with_timezone(&self.listing_offset),
            None => (now - self.lookback).with_timezone(&self.listing_offset),
        })
    }

    /// Runs one cycle: fetch everything newer than the watermark and store it
    /// oldest first.
    ///
    /// Nothing is stored when the source fails midway, so the next cycle
    /// starts from the same watermark.
    pub async fn run_cycle(&self, source: &dyn ListingSource) -> Result<IngestionReport, ServiceError> {
        let watermark = self.watermark(Utc::now()).await?;
        debug!("Fetching listings published since {watermark}");

        let records: Vec<ListingRecord> = source.listings_since(watermark).try_collect().await?;
        self.ingest(records).await
    }

    /// Stores `records` in ascending publication order, skipping known
    /// articles. Records published at the same time keep their input order.
    ///
    /// The first storage failure stops the batch. Everything stored before it
    /// is older than what was not, so the watermark never passes a listing
    /// that failed to persist.
    pub async fn ingest(&self, mut records: Vec<ListingRecord>) -> Result<IngestionReport, ServiceError> {
        let mut report = IngestionReport {
            fetched: records.len(),
            ..Default::default()
        };
        records.sort_by_key(|record| record.published);

        for record in records {
            if self.db.listing.exists_by_article(record.article).await? {
                report.skipped += 1;
                continue;
            }

            let category_ids = self.taxonomy.resolve_leaves(&record.categories).await?;
            let now = Utc::now();
            let model = ListingModel {
                id: 0,
                article: record.article,
                title: record.title,
                description: record.description,
                budget: record.budget,
                deadline: record.deadline,
                safe_deal: record.safe_deal,
                without_executor: record.without_executor,
                published: record.published.with_timezone(&self.listing_offset),
                url: record.url,
                created: now,
                updated: now,
            };

            match self.db.listing.insert_with_task(&model, &category_ids).await? {
                Some(id) => {
                    info!("Stored listing {} (ID: {id})", model.article);
                    report.persisted += 1;
                }
                None => report.skipped += 1,
            }
        }

        Ok(report)
    }
}
