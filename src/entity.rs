//! Row models persisted by the repository.

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

/// A node of the two-level category taxonomy.
///
/// Roots have no parent. Leaves point at a root and are what listings and
/// filters link to.
#[derive(FromRow, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CategoryModel {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl CategoryModel {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One scraped freelance-project posting.
///
/// `article` is the number the source site assigns and is unique. It and
/// `published` never change after the row is created.
#[derive(FromRow, Serialize, Clone, Debug)]
pub struct ListingModel {
    pub id: i64,
    pub article: i64,
    pub title: String,
    pub description: String,
    /// `None` means the customer is accepting offers.
    pub budget: Option<i64>,
    /// `None` means the deadline is negotiable.
    pub deadline: Option<NaiveDate>,
    pub safe_deal: bool,
    pub without_executor: bool,
    pub published: DateTime<FixedOffset>,
    pub url: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A pending multi-step input of a subscriber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    AwaitingBudgetMin,
    AwaitingBudgetMax,
}

/// A chat that receives listing announcements.
#[derive(FromRow, Serialize, Clone, Debug)]
pub struct SubscriberModel {
    pub id: i64,
    /// Messaging channel chat identifier.
    pub chat_id: i64,
    pub full_name: String,
    pub active: bool,
    pub state: Option<SubscriberState>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Saved matching criteria of a subscriber. Exactly one per subscriber.
///
/// Selected categories live in `filter_categories`.
#[derive(FromRow, Serialize, Clone, Debug)]
pub struct FilterModel {
    pub id: i64,
    pub subscriber_id: i64,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub only_safe_deal: bool,
    pub only_without_executor: bool,
    pub notifications_enabled: bool,
}

/// Kind of work a delivery task describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, Default, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    NewListing,
}

/// One unit of "announce this listing to every matching subscriber".
///
/// Rows are never deleted and double as an audit log.
#[derive(FromRow, Serialize, Clone, Debug)]
pub struct DeliveryTaskModel {
    pub id: i64,
    pub kind: TaskKind,
    pub listing_id: i64,
    pub scheduled: DateTime<Utc>,
    pub done: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Button and label texts.
    Key,
    /// Full message bodies.
    Message,
    Smile,
}

/// Editable text snippet, looked up by `name`.
#[derive(FromRow, Serialize, Clone, Debug)]
pub struct TemplateModel {
    pub id: i64,
    pub name: String,
    pub kind: TemplateKind,
    pub body: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A listing category joined with the name of its root.
#[derive(FromRow, Clone, Debug)]
pub struct ListingCategoryRow {
    pub id: i64,
    pub name: String,
    pub parent_name: Option<String>,
}

/// A subscriber that may receive announcements, joined with its filter.
#[derive(FromRow, Clone, Debug)]
pub struct RecipientRow {
    pub subscriber_id: i64,
    pub chat_id: i64,
    pub filter_id: i64,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub only_safe_deal: bool,
    pub only_without_executor: bool,
}
