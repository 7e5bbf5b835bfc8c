//! Prints the most recent listings of the configured source.
//!
//! Usage: `fetch_latest [COUNT]` (default 5).

use anyhow::Context;
use anyhow::Result;
use dotenv::dotenv;
use freelance_feed::config::Config;
use freelance_feed::source::ListingSource;
use freelance_feed::source::fl_source::FlSource;
use futures::TryStreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let count: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid count `{arg}`"))?,
        None => 5,
    };

    // Nothing is delivered from here, so no bot token is needed.
    let config = Config::from_lookup(|key| match key {
        "FEATURE_DELIVERY" => Some("false".to_string()),
        _ => std::env::var(key).ok(),
    })?;
    let source = FlSource::from_config(&config)?;

    println!("Fetching {count} latest listings from {}...", config.source_url);
    let listings: Vec<_> = source.listings_up_to(count).try_collect().await?;

    for listing in &listings {
        let budget = listing
            .budget
            .map(|b| format!("{b} руб."))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{} [{}] {} ({budget})\n    {}",
            listing.article,
            listing.published.format("%d.%m.%Y %H:%M"),
            listing.title,
            listing.url
        );
        for (root, leaf) in &listing.categories {
            println!("    {root} / {leaf}");
        }
    }
    println!("{} listings.", listings.len());

    Ok(())
}
