//! Listing source adapters.
//!
//! A source exposes the listings of a site as lazy streams, newest first.
//! Pages are only fetched while the consumer keeps polling.

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use derive_builder::Builder;
use futures::stream::BoxStream;

use crate::source::error::SourceError;

pub mod error;
pub mod fl_source;
pub mod parser;

/// A listing as parsed from the site, before it is stored.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(pattern = "immutable", build_fn(error = "SourceError"))]
pub struct ListingRecord {
    pub article: i64,
    #[builder(setter(into))]
    pub title: String,
    #[builder(setter(into))]
    pub description: String,
    #[builder(default)]
    pub budget: Option<i64>,
    #[builder(default)]
    pub deadline: Option<NaiveDate>,
    #[builder(default)]
    pub safe_deal: bool,
    #[builder(default)]
    pub without_executor: bool,
    /// Already converted to the listing timezone.
    pub published: DateTime<FixedOffset>,
    #[builder(setter(into))]
    pub url: String,
    /// `(root, leaf)` category name pairs.
    #[builder(default)]
    pub categories: Vec<(String, String)>,
}

/// Something that produces listing records.
pub trait ListingSource: Send + Sync {
    /// Listings published at or after `since`, newest first.
    ///
    /// The stream ends at the first older listing or when the page cap is
    /// reached. A page that cannot be fetched ends it with an error.
    fn listings_since<'a>(
        &'a self,
        since: DateTime<FixedOffset>,
    ) -> BoxStream<'a, Result<ListingRecord, SourceError>>;

    /// At most `count` of the most recent listings, newest first.
    fn listings_up_to<'a>(&'a self, count: usize) -> BoxStream<'a, Result<ListingRecord, SourceError>>;
}
