//! Common test utilities and fake implementations.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::FixedOffset;
use chrono::Utc;
use freelance_feed::entity::FilterModel;
use freelance_feed::entity::ListingModel;
use freelance_feed::entity::SubscriberModel;
use freelance_feed::messenger::InlineKeyboard;
use freelance_feed::messenger::Messenger;
use freelance_feed::messenger::error::MessengerError;
use freelance_feed::repository::Repository;
use freelance_feed::source::ListingRecord;
use freelance_feed::source::ListingRecordBuilder;
use freelance_feed::source::ListingSource;
use freelance_feed::source::error::SourceError;
use futures::StreamExt;
use futures::stream;
use futures::stream::BoxStream;
use uuid::Uuid;

/// Sets up a temporary test database.
pub async fn setup_db() -> (Arc<Repository>, PathBuf) {
    let uuid = Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("freelance-feed-test-{}.db", uuid));
    let db_url = format!("sqlite://{}", db_path.to_str().unwrap());

    let db = Repository::new(&db_url, db_path.to_str().unwrap())
        .await
        .expect("Failed to create database");

    db.run_migrations().await.expect("Failed to run migrations");

    (Arc::new(db), db_path)
}

/// Cleans up the test database file.
pub async fn teardown_db(db_path: PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let path = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[allow(dead_code)]
pub fn listing_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600).unwrap()
}

/// A listing record published at `published`, matching default filters.
#[allow(dead_code)]
pub fn record(article: i64, published: DateTime<Utc>) -> ListingRecord {
    ListingRecordBuilder::default()
        .article(article)
        .title(format!("Listing {article}"))
        .description(format!("Description of listing {article}"))
        .without_executor(true)
        .published(published.with_timezone(&listing_offset()))
        .url(format!("https://www.fl.ru/projects/{article}/listing.html"))
        .build()
        .expect("Failed to build record")
}

/// A stored-listing model ready for `insert_with_task`.
#[allow(dead_code)]
pub fn listing_model(article: i64) -> ListingModel {
    let now = Utc::now();
    ListingModel {
        id: 0,
        article,
        title: format!("Listing {article}"),
        description: format!("Description of listing {article}"),
        budget: None,
        deadline: None,
        safe_deal: false,
        without_executor: true,
        published: (now - Duration::seconds(article)).with_timezone(&listing_offset()),
        url: format!("https://www.fl.ru/projects/{article}/listing.html"),
        created: now,
        updated: now,
    }
}

/// Creates a subscriber with its default filter.
#[allow(dead_code)]
pub async fn create_subscriber(db: &Repository, chat_id: i64) -> (SubscriberModel, FilterModel) {
    let now = Utc::now();
    db.subscriber
        .insert_with_filter(&SubscriberModel {
            id: 0,
            chat_id,
            full_name: format!("Subscriber {chat_id}"),
            active: true,
            state: None,
            created: now,
            updated: now,
        })
        .await
        .expect("Failed to create subscriber")
}

// FAKE SOURCE

/// Listing source serving records from memory.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FakeSource {
    pub state: Arc<RwLock<FakeSourceState>>,
}

#[derive(Default)]
#[allow(dead_code)]
pub struct FakeSourceState {
    /// Newest first, like the site.
    pub records: Vec<ListingRecord>,
    /// Fail with a fetch error after this many records.
    pub fail_after: Option<usize>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new(records: Vec<ListingRecord>) -> Self {
        let source = Self::default();
        source.set_records(records);
        source
    }

    pub fn set_records(&self, records: Vec<ListingRecord>) {
        self.state.write().unwrap().records = records;
    }

    pub fn fail_after(&self, count: Option<usize>) {
        self.state.write().unwrap().fail_after = count;
    }

    fn items(&self, records: Vec<ListingRecord>) -> Vec<Result<ListingRecord, SourceError>> {
        let fail_after = self.state.read().unwrap().fail_after;
        let mut items: Vec<_> = records.into_iter().map(Ok).collect();
        if let Some(count) = fail_after {
            items.truncate(count);
            items.push(Err(SourceError::HttpStatus {
                status: 503,
                url: "https://www.fl.ru/projects".to_string(),
            }));
        }
        items
    }
}

impl ListingSource for FakeSource {
    fn listings_since<'a>(
        &'a self,
        since: DateTime<FixedOffset>,
    ) -> BoxStream<'a, Result<ListingRecord, SourceError>> {
        let records: Vec<ListingRecord> = self
            .state
            .read()
            .unwrap()
            .records
            .iter()
            .take_while(|record| record.published >= since)
            .cloned()
            .collect();
        stream::iter(self.items(records)).boxed()
    }

    fn listings_up_to<'a>(&'a self, count: usize) -> BoxStream<'a, Result<ListingRecord, SourceError>> {
        let records: Vec<ListingRecord> = self
            .state
            .read()
            .unwrap()
            .records
            .iter()
            .take(count)
            .cloned()
            .collect();
        stream::iter(self.items(records)).boxed()
    }
}

// RECORDING MESSENGER

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub photo: Option<PathBuf>,
}

/// Messenger that records what it sends and fails for chosen chats.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingMessenger {
    pub sent: Arc<RwLock<Vec<SentMessage>>>,
    pub failing: Arc<RwLock<HashSet<i64>>>,
}

#[allow(dead_code)]
impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: i64) {
        self.failing.write().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.chat_id == chat_id).collect()
    }

    fn record(&self, chat_id: i64, text: &str, photo: Option<&Path>) -> Result<(), MessengerError> {
        if self.failing.read().unwrap().contains(&chat_id) {
            return Err(MessengerError::Blocked { chat_id });
        }
        self.sent.write().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            photo: photo.map(Path::to_path_buf),
        });
        Ok(())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_photo(&self, chat_id: i64, photo: &Path, caption: &str) -> Result<(), MessengerError> {
        self.record(chat_id, caption, Some(photo))
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
        self.record(chat_id, text, None)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        _message_id: i64,
        text: &str,
        _keyboard: Option<InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        self.record(chat_id, text, None)
    }
}
