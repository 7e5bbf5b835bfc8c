//! fl.ru listing source.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::time::Duration;

use chrono::DateTime;
use chrono::FixedOffset;
use futures::StreamExt;
use futures::TryStreamExt;
use futures::future;
use futures::stream;
use futures::stream::BoxStream;
use governor::Quota;
use governor::RateLimiter;
use governor::clock::QuantaClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use log::debug;
use log::warn;
use reqwest::Client;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use url::Url;

use crate::config::Config;
use crate::source::ListingRecord;
use crate::source::ListingSource;
use crate::source::error::SourceError;
use crate::source::parser;
use crate::source::parser::TimeZones;

/// Where a listing stream is within the site's pagination.
#[derive(Default)]
struct PageCursor {
    page: u32,
    pending: VecDeque<String>,
    seen: HashSet<String>,
    exhausted: bool,
}

pub struct FlSource {
    client: Client,
    base_url: Url,
    listings_url: Url,
    max_pages: u32,
    zones: TimeZones,
    limiter: RateLimiter<NotKeyed, InMemoryState, QuantaClock>,
}

impl FlSource {
    pub fn new(
        base_url: &str,
        max_pages: u32,
        requests_per_second: u32,
        zones: TimeZones,
    ) -> Result<Self, SourceError> {
        let invalid_url = || SourceError::InvalidUrl {
            url: base_url.to_string(),
        };
        let base_url = Url::parse(base_url).map_err(|_| invalid_url())?;
        let listings_url = base_url.join("projects").map_err(|_| invalid_url())?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("freelance-feed/0.1"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url,
            listings_url,
            max_pages,
            zones,
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        Self::new(
            &config.source_url,
            config.source_max_pages,
            config.source_rate_limit,
            TimeZones {
                source: config.source_offset,
                listing: config.listing_offset,
            },
        )
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        self.limiter.until_ready().await;
        debug!("Fetching {url} {query:?}");

        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// Raw markup of listing page `page` (1-based).
    pub async fn fetch_page(&self, page: u32) -> Result<String, SourceError> {
        self.get(
            self.listings_url.as_str(),
            &[("kind", "1".to_string()), ("page", page.to_string())],
        )
        .await
    }

    /// Fetches and parses one listing detail page.
    pub async fn fetch_listing(&self, url: &str) -> Result<ListingRecord, SourceError> {
        let html = self.get(url, &[]).await?;
        parser::parse_listing(&html, url, self.zones)
    }

    /// Advances the cursor to the next parsed listing.
    ///
    /// Listings that are gone from the site or whose markup cannot be parsed
    /// are skipped. Transient fetch failures are returned so the caller
    /// retries the whole walk later instead of silently losing a listing.
    async fn next_record(&self, cursor: &mut PageCursor) -> Result<Option<ListingRecord>, SourceError> {
        loop {
            if let Some(url) = cursor.pending.pop_front() {
                match self.fetch_listing(&url).await {
                    Ok(record) => return Ok(Some(record)),
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        warn!("Skipping listing {url}: {e}");
                        continue;
                    }
                }
            }

            if cursor.exhausted || cursor.page >= self.max_pages {
                return Ok(None);
            }

            cursor.page += 1;
            let html = self.fetch_page(cursor.page).await?;
            let urls = parser::parse_listing_urls(&html, &self.base_url)?;
            if urls.is_empty() {
                debug!("Listing page {} is empty", cursor.page);
                cursor.exhausted = true;
            }
            for url in urls {
                // Listings shift down while we paginate.
                if cursor.seen.insert(url.clone()) {
                    cursor.pending.push_back(url);
                }
            }
        }
    }

    fn listings(&self) -> BoxStream<'_, Result<ListingRecord, SourceError>> {
        stream::try_unfold(PageCursor::default(), move |mut cursor| async move {
            let record = self.next_record(&mut cursor).await?;
            Ok(record.map(|record| (record, cursor)))
        })
        .boxed()
    }
}

impl ListingSource for FlSource {
    fn listings_since<'a>(
        &'a self,
        since: DateTime<FixedOffset>,
    ) -> BoxStream<'a, Result<ListingRecord, SourceError>> {
        self.listings()
            .try_take_while(move |record| future::ready(Ok(record.published >= since)))
            .boxed()
    }

    fn listings_up_to<'a>(&'a self, count: usize) -> BoxStream<'a, Result<ListingRecord, SourceError>> {
        self.listings().take(count).boxed()
    }
}
