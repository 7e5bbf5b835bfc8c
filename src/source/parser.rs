//! HTML parsing of fl.ru listing pages.
//!
//! Everything here is synchronous and works on owned markup: `scraper::Html`
//! is not `Send`, so documents never live across an await point.

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeZone;
use log::warn;
use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;
use url::Url;

use crate::source::ListingRecord;
use crate::source::ListingRecordBuilder;
use crate::source::error::SourceError;

const BUDGET_LABEL: &str = "Бюджет:";
const DEADLINE_LABEL: &str = "Дедлайн:";
const PUBLISHED_LABEL: &str = "Опубликован:";
const CATEGORIES_LABEL: &str = "Разделы:";
const EXECUTOR_CHOSEN_LABEL: &str = "Исполнитель определен:";
const BUMPED_LABEL: &str = "поднят:";
const SAFE_DEAL_SELECTOR: &str = r#"[title="Оплата через Безопасную сделку"]"#;
const PINNED_CLASS: &str = "topprjpay";

/// Zones used to interpret the times printed on the site.
#[derive(Clone, Copy, Debug)]
pub struct TimeZones {
    /// Zone the site prints its times in.
    pub source: FixedOffset,
    /// Zone published timestamps are converted to.
    pub listing: FixedOffset,
}

fn selector(s: &str) -> Result<Selector, SourceError> {
    Selector::parse(s).map_err(|e| SourceError::InvalidSelector {
        selector: s.to_string(),
        message: format!("{e:?}"),
    })
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Absolute detail URLs of the listings on one page, in page order.
///
/// Pinned paid rows are skipped since they are not in publication order.
pub fn parse_listing_urls(html: &str, base: &Url) -> Result<Vec<String>, SourceError> {
    let document = Html::parse_document(html);
    let row_sel = selector(".b-post")?;
    let link_sel = selector("a.b-post__link")?;

    let mut urls = Vec::new();
    for row in document.select(&row_sel) {
        if row.value().classes().any(|class| class == PINNED_CLASS) {
            continue;
        }
        let Some(href) = row
            .select(&link_sel)
            .next()
            .and_then(|link| link.value().attr("href"))
        else {
            continue;
        };
        match base.join(href) {
            Ok(url) => urls.push(url.to_string()),
            Err(e) => warn!("Skipping listing row with link `{href}`: {e}"),
        }
    }
    Ok(urls)
}

/// Parses a listing detail page fetched from `url`.
pub fn parse_listing(html: &str, url: &str, zones: TimeZones) -> Result<ListingRecord, SourceError> {
    let article = parse_article(url)?;
    let document = Html::parse_document(html);

    let title = document
        .select(&selector("h1.b-page__title")?)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SourceError::MissingField {
            field: "title".to_string(),
        })?;

    let description = document
        .select(&selector(&format!("#projectp{article}"))?)
        .next()
        .map(element_text)
        .ok_or_else(|| SourceError::MissingField {
            field: "description".to_string(),
        })?;

    let published_text =
        label_value(&document, PUBLISHED_LABEL).ok_or_else(|| SourceError::MissingField {
            field: "published".to_string(),
        })?;

    let safe_deal = document.select(&selector(SAFE_DEAL_SELECTOR)?).next().is_some();
    let without_executor = !contains_text(&document, EXECUTOR_CHOSEN_LABEL);

    ListingRecordBuilder::default()
        .article(article)
        .title(title)
        .description(description)
        .budget(label_value(&document, BUDGET_LABEL).and_then(|t| parse_budget(&t)))
        .deadline(label_value(&document, DEADLINE_LABEL).and_then(|t| parse_deadline(&t)))
        .safe_deal(safe_deal)
        .without_executor(without_executor)
        .published(parse_published(&published_text, zones)?)
        .url(url)
        .categories(
            label_value(&document, CATEGORIES_LABEL)
                .map(|t| parse_categories(&t))
                .unwrap_or_default(),
        )
        .build()
}

/// The article number is the second-to-last path segment, as in
/// `/projects/5123456/title.html`.
pub fn parse_article(url: &str) -> Result<i64, SourceError> {
    let parsed = Url::parse(url).map_err(|_| SourceError::InvalidUrl {
        url: url.to_string(),
    })?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();

    segments
        .len()
        .checked_sub(2)
        .and_then(|i| segments.get(i))
        .and_then(|segment| segment.parse::<i64>().ok())
        .ok_or_else(|| SourceError::InvalidArticle {
            url: url.to_string(),
        })
}

/// `"5 000 руб/заказ"` becomes `Some(5000)`. Anything without a plain number
/// means the customer accepts offers.
pub fn parse_budget(text: &str) -> Option<i64> {
    let text = text.trim();
    let text = text
        .strip_suffix("руб/заказ")
        .or_else(|| text.strip_suffix("руб"))
        .unwrap_or(text);
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    digits.parse::<i64>().ok().filter(|budget| *budget >= 0)
}

/// `dd.mm.yyyy`; anything else is a negotiable deadline.
pub fn parse_deadline(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d.%m.%Y").ok()
}

/// Parses `dd.mm.yyyy | HH:MM`, preferring the bumped time when present,
/// and converts it from the site zone to the listing zone.
pub fn parse_published(text: &str, zones: TimeZones) -> Result<DateTime<FixedOffset>, SourceError> {
    let invalid = || SourceError::InvalidTime {
        time: text.to_string(),
    };

    let text = match text.split_once(BUMPED_LABEL) {
        Some((_, bumped)) => bumped,
        None => text,
    };
    let (date, time) = text.split_once('|').ok_or_else(invalid)?;
    let date = NaiveDate::parse_from_str(date.trim(), "%d.%m.%Y").map_err(|_| invalid())?;
    let time: String = time.trim().chars().take(5).collect();
    let time = NaiveTime::parse_from_str(&time, "%H:%M").map_err(|_| invalid())?;

    let published = zones
        .source
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(invalid)?;
    Ok(published.with_timezone(&zones.listing))
}

/// `"Root / Leaf, Other / Leaf"`; entries that are not exactly one pair are
/// dropped.
pub fn parse_categories(text: &str) -> Vec<(String, String)> {
    text.split(',')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(" / ").collect();
            match parts.as_slice() {
                [root, leaf] if !root.trim().is_empty() && !leaf.trim().is_empty() => {
                    Some((root.trim().to_string(), leaf.trim().to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

fn contains_text(document: &Html, needle: &str) -> bool {
    document
        .root_element()
        .descendants()
        .filter_map(|node| node.value().as_text())
        .any(|text| text.contains(needle))
}

/// Text following `label`.
///
/// Labels are either followed by the value inside the same element
/// (`<div>Бюджет: 500 руб</div>`) or by the next text node
/// (`<span>Бюджет:</span><span>500 руб</span>`).
fn label_value(document: &Html, label: &str) -> Option<String> {
    let mut label_seen = false;
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        if label_seen {
            let value = text.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
            continue;
        }

        if !text.contains(label) {
            continue;
        }

        let parent_text = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|parent| parent.text().collect::<String>())
            .unwrap_or_else(|| text.to_string());
        if let Some((_, after)) = parent_text.split_once(label) {
            let after = after.trim();
            if !after.is_empty() {
                return Some(after.to_string());
            }
        }
        label_seen = true;
    }
    None
}
