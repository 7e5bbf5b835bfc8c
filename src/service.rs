//! Business logic services for ingestion, delivery and subscriber settings.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::messenger::Messenger;
use crate::repository::Repository;
use crate::service::delivery_service::DeliveryService;
use crate::service::ingestion_service::IngestionService;
use crate::service::settings_service::SettingsService;
use crate::service::taxonomy_service::TaxonomyService;
use crate::service::template_service::TemplateCache;
use crate::service::template_service::TemplateService;

pub mod delivery_service;
pub mod error;
pub mod ingestion_service;
pub mod settings_service;
pub mod taxonomy_service;
pub mod template_service;

/// Container for all application services.
pub struct Services {
    pub taxonomy: Arc<TaxonomyService>,
    pub ingestion: Arc<IngestionService>,
    pub delivery: Arc<DeliveryService>,
    pub settings: Arc<SettingsService>,
    pub templates: Arc<TemplateService>,
    pub template_cache: Arc<TemplateCache>,
}

impl Services {
    /// Creates all services and loads the template cache.
    pub async fn new(
        db: Arc<Repository>,
        messenger: Arc<dyn Messenger>,
        config: &Config,
        photo: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let template_cache = Arc::new(TemplateCache::new(db.clone()));
        template_cache.load().await?;

        let taxonomy = Arc::new(TaxonomyService::new(db.clone()));

        Ok(Self {
            ingestion: Arc::new(IngestionService::new(
                db.clone(),
                taxonomy.clone(),
                config.listing_offset,
                config.ingest_lookback,
            )),
            delivery: Arc::new(DeliveryService::new(
                db.clone(),
                template_cache.clone(),
                messenger.clone(),
                photo,
            )),
            settings: Arc::new(SettingsService::new(
                db.clone(),
                template_cache.clone(),
                messenger,
            )),
            templates: Arc::new(TemplateService::new(db, template_cache.clone())),
            taxonomy,
            template_cache,
        })
    }
}
