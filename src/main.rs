//! Application entry point for freelance-feed.
//!
//! Initializes storage and services, then starts the ingestion loop and the
//! delivery worker enabled by configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use dotenv::dotenv;
use freelance_feed::config::Config;
use freelance_feed::logging::setup_logging;
use freelance_feed::messenger::LogMessenger;
use freelance_feed::messenger::Messenger;
use freelance_feed::messenger::telegram::TelegramMessenger;
use freelance_feed::repository::Repository;
use freelance_feed::service::Services;
use freelance_feed::source::fl_source::FlSource;
use freelance_feed::task::delivery_worker::DeliveryWorker;
use freelance_feed::task::ingestion_loop::IngestionLoop;
use log::debug;
use log::info;
use log::warn;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let init_start = Instant::now();
    let config = load_config()?;

    let db = setup_database(&config, init_start).await?;
    let messenger = setup_messenger(&config)?;
    let services = setup_services(db, messenger, &config).await?;

    setup_ingestion(&config, &services, init_start)?;
    setup_delivery(&config, &services, init_start)?;

    run(init_start).await
}

fn load_config() -> Result<Arc<Config>> {
    debug!("Loading configuration...");
    let config = Arc::new(Config::from_env()?);
    setup_logging(&config)?;
    info!("Starting freelance-feed...");
    Ok(config)
}

async fn setup_database(config: &Config, init_start: Instant) -> Result<Arc<Repository>> {
    debug!("Setting up Repository...");
    let db = Arc::new(Repository::new(&config.db_url, &config.db_path).await?);

    info!("Running database migrations...");
    db.run_migrations().await?;
    info!(
        "Database setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );

    Ok(db)
}

fn setup_messenger(config: &Config) -> Result<Arc<dyn Messenger>> {
    if config.telegram_token.is_none() {
        info!("No TELEGRAM_TOKEN set, messages will only be logged.");
        return Ok(Arc::new(LogMessenger));
    }
    Ok(Arc::new(TelegramMessenger::from_config(config)?))
}

fn logo_path(config: &Config) -> Option<PathBuf> {
    if config.logo_path.is_file() {
        Some(config.logo_path.clone())
    } else {
        warn!(
            "Logo {} not found, announcements are sent without a photo.",
            config.logo_path.display()
        );
        None
    }
}

async fn setup_services(
    db: Arc<Repository>,
    messenger: Arc<dyn Messenger>,
    config: &Config,
) -> Result<Arc<Services>> {
    debug!("Setting up Services...");
    let photo = logo_path(config);
    Ok(Arc::new(Services::new(db, messenger, config, photo).await?))
}

fn setup_ingestion(config: &Config, services: &Services, init_start: Instant) -> Result<()> {
    if !config.features.ingestion {
        return Ok(());
    }
    debug!("Setting up IngestionLoop...");

    let source = Arc::new(FlSource::from_config(config)?);
    IngestionLoop::new(services.ingestion.clone(), source, config.ingest_interval).start()?;

    info!(
        "Ingestion setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn setup_delivery(config: &Config, services: &Services, init_start: Instant) -> Result<()> {
    if !config.features.delivery {
        return Ok(());
    }
    debug!("Setting up DeliveryWorker...");

    DeliveryWorker::new(services.delivery.clone(), config.delivery_interval).start()?;

    info!(
        "Delivery setup complete ({:.2}s).",
        init_start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn run(init_start: Instant) -> Result<()> {
    info!(
        "freelance-feed is up in {:.2}s. Press Ctrl+C to stop.",
        init_start.elapsed().as_secs_f64()
    );

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down.");

    Ok(())
}
