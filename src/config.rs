//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::error::AppError;

/// Which long-running loops this process runs.
///
/// Ingestion and delivery only share the database, so they can run in one
/// process or in two processes pointed at the same `DB_URL`.
#[derive(Clone, Debug)]
pub struct Features {
    pub ingestion: bool,
    pub delivery: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_url: String,
    pub db_path: String,
    pub logs_path: PathBuf,
    pub source_url: String,
    pub source_max_pages: u32,
    pub source_rate_limit: u32,
    /// Zone the listing site prints its timestamps in.
    pub source_offset: FixedOffset,
    /// The fixed zone every stored publication timestamp is normalized to.
    pub listing_offset: FixedOffset,
    pub ingest_interval: Duration,
    /// How far back the first cycle looks when nothing is stored yet.
    pub ingest_lookback: chrono::Duration,
    pub delivery_interval: Duration,
    pub telegram_token: Option<String>,
    pub telegram_api_url: String,
    pub telegram_rate_limit: u32,
    pub logo_path: PathBuf,
    pub features: Features,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// of a key or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let features = Features {
            ingestion: parse(&lookup, "FEATURE_INGESTION", true)?,
            delivery: parse(&lookup, "FEATURE_DELIVERY", true)?,
        };

        let telegram_token = lookup("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty());
        if features.delivery && telegram_token.is_none() {
            return Err(AppError::MissingConfig {
                key: "TELEGRAM_TOKEN".to_string(),
            });
        }

        Ok(Self {
            db_url: get("DB_URL", "sqlite://data/freelance-feed.db"),
            db_path: get("DB_PATH", "data/freelance-feed.db"),
            logs_path: PathBuf::from(get("LOGS_PATH", "logs")),
            source_url: get("SOURCE_URL", "https://www.fl.ru")
                .trim_end_matches('/')
                .to_string(),
            source_max_pages: parse(&lookup, "SOURCE_MAX_PAGES", 50)?,
            source_rate_limit: parse(&lookup, "SOURCE_RATE_LIMIT", 2)?,
            source_offset: parse_offset(&lookup, "SOURCE_UTC_OFFSET", 3)?,
            listing_offset: parse_offset(&lookup, "LISTING_UTC_OFFSET", 5)?,
            ingest_interval: Duration::from_secs(parse(&lookup, "INGEST_INTERVAL", 60)?),
            ingest_lookback: parse_lookback(&lookup, "INGEST_LOOKBACK", 300)?,
            delivery_interval: Duration::from_secs(parse(&lookup, "DELIVERY_INTERVAL", 5)?),
            telegram_token,
            telegram_api_url: get("TELEGRAM_API_URL", "https://api.telegram.org")
                .trim_end_matches('/')
                .to_string(),
            telegram_rate_limit: parse(&lookup, "TELEGRAM_RATE_LIMIT", 25)?,
            logo_path: PathBuf::from(get("LOGO_PATH", "assets/logo.jpg")),
            features,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| AppError::InvalidConfig {
            key: key.to_string(),
            value,
        }),
    }
}

fn parse_offset<F>(lookup: &F, key: &str, default_hours: i32) -> Result<FixedOffset, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let hours: i32 = parse(lookup, key, default_hours)?;
    FixedOffset::east_opt(hours * 3600).ok_or_else(|| AppError::InvalidConfig {
        key: key.to_string(),
        value: hours.to_string(),
    })
}

fn parse_lookback<F>(lookup: &F, key: &str, default_secs: u64) -> Result<chrono::Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse(lookup, key, default_secs)?;
    let invalid = || AppError::InvalidConfig {
        key: key.to_string(),
        value: secs.to_string(),
    };
    let secs = i64::try_from(secs).map_err(|_| invalid())?;
    let lookback = chrono::Duration::try_seconds(secs).ok_or_else(invalid)?;
    // Must stay subtractable from the current time.
    chrono::Utc::now().checked_sub_signed(lookback).ok_or_else(invalid)?;
    Ok(lookback)
}
