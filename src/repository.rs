//! Database module with SQLite storage and SQLx.

use std::str::FromStr;
use std::time::Duration;

use log::debug;
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;

use crate::repository::table::CategoryTable;
use crate::repository::table::DeliveryTaskTable;
use crate::repository::table::FilterTable;
use crate::repository::table::ListingTable;
use crate::repository::table::SubscriberTable;
use crate::repository::table::TableBase;
use crate::repository::table::TemplateTable;

pub mod error;
pub mod table;

/// Main database struct containing all table handlers.
pub struct Repository {
    pool: SqlitePool,
    pub category: CategoryTable,
    pub listing: ListingTable,
    pub subscriber: SubscriberTable,
    pub filter: FilterTable,
    pub delivery_task: DeliveryTaskTable,
    pub template: TemplateTable,
}

impl Repository {
    /// Creates a new database connection and initializes table handlers.
    ///
    /// The database runs in WAL mode so the ingestion writer, the delivery
    /// worker and the settings handler can work on it at the same time, even
    /// from separate processes.
    pub async fn new(db_url: &str, db_path: &str) -> anyhow::Result<Self> {
        let path = std::path::Path::new(db_path);
        if !path.exists() {
            debug!("Database path {db_path} does not exist. Creating...");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, "")?;
            info!("Created {db_path}");
        }

        debug!("Connecting to db...");
        let opts = SqliteConnectOptions::from_str(db_url)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePool::connect_with(opts).await?;
        info!("Connected to db.");

        Ok(Self {
            category: CategoryTable::new(pool.clone()),
            listing: ListingTable::new(pool.clone()),
            subscriber: SubscriberTable::new(pool.clone()),
            filter: FilterTable::new(pool.clone()),
            delivery_task: DeliveryTaskTable::new(pool.clone()),
            template: TemplateTable::new(pool.clone()),
            pool,
        })
    }

    /// Runs database migrations from the migrations directory.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Deletes all data from all tables. Use with caution!
    pub async fn delete_all_tables(&self) -> anyhow::Result<()> {
        self.delivery_task.delete_all().await?;
        self.filter.delete_all().await?;
        self.subscriber.delete_all().await?;
        self.listing.delete_all().await?;
        self.category.delete_all().await?;
        self.template.delete_all().await?;
        Ok(())
    }
}
