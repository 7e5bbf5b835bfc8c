//! Works off the delivery queue.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use log::debug;
use log::info;
use log::warn;

use crate::entity::DeliveryTaskModel;
use crate::entity::TaskKind;
use crate::filter::FilterCriteria;
use crate::filter::ListingFacts;
use crate::filter::matches;
use crate::messenger::Messenger;
use crate::messenger::error::MessengerError;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::error::ServiceError;
use crate::service::template_service::ListingCaption;
use crate::service::template_service::TemplateCache;

/// Per-subscriber results of one delivered task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No task is due.
    Idle,
    Delivered {
        task_id: i64,
        report: DeliveryReport,
    },
    /// The task pointed at a listing that no longer exists and was closed.
    ListingMissing { task_id: i64 },
}

/// Everything needed to announce one listing.
struct Announcement {
    caption: String,
    chat_ids: Vec<i64>,
}

pub struct DeliveryService {
    db: Arc<Repository>,
    templates: Arc<TemplateCache>,
    messenger: Arc<dyn Messenger>,
    /// Sent with every announcement. Captions go out as plain messages
    /// without it.
    photo: Option<PathBuf>,
}

impl DeliveryService {
    pub fn new(
        db: Arc<Repository>,
        templates: Arc<TemplateCache>,
        messenger: Arc<dyn Messenger>,
        photo: Option<PathBuf>,
    ) -> Self {
        Self {
            db,
            templates,
            messenger,
            photo,
        }
    }

    /// Processes the oldest due task, if any.
    ///
    /// A task is marked done once its subscribers were attempted, however
    /// many of them failed. If the task cannot even be prepared (storage or
    /// template failure) it stays pending and is retried on the next call.
    pub async fn process_next(&self, now: DateTime<Utc>) -> Result<DeliveryOutcome, ServiceError> {
        let Some(task) = self.db.delivery_task.select_oldest_pending(now).await? else {
            return Ok(DeliveryOutcome::Idle);
        };
        tracing::Span::current().record("task_id", task.id);
        debug!("Processing delivery task {} for listing {}", task.id, task.listing_id);

        let prepared = match task.kind {
            TaskKind::NewListing => self.prepare(&task).await,
        };

        let outcome = match prepared {
            Ok(Some(announcement)) => {
                let report = dispatch(
                    self.messenger.as_ref(),
                    &announcement.chat_ids,
                    self.photo.as_deref(),
                    &announcement.caption,
                )
                .await;
                info!(
                    "Delivery task {} done: {}/{} delivered, {} failed",
                    task.id, report.delivered, report.attempted, report.failed
                );
                DeliveryOutcome::Delivered {
                    task_id: task.id,
                    report,
                }
            }
            Ok(None) => {
                warn!(
                    "Listing {} of delivery task {} does not exist",
                    task.listing_id, task.id
                );
                DeliveryOutcome::ListingMissing { task_id: task.id }
            }
            Err(e) => {
                if let Err(touch_err) = self.db.delivery_task.touch(task.id, Utc::now()).await {
                    warn!("Failed to record attempt on delivery task {}: {touch_err}", task.id);
                }
                return Err(e);
            }
        };

        if !self.db.delivery_task.mark_done(task.id, Utc::now()).await? {
            warn!("Delivery task {} was already done", task.id);
        }
        Ok(outcome)
    }

    /// Resolves the listing, renders its caption and picks the recipients.
    ///
    /// # Performance
    /// * DB calls: 4
    async fn prepare(&self, task: &DeliveryTaskModel) -> Result<Option<Announcement>, ServiceError> {
        let Some(listing) = self.db.listing.select(&task.listing_id).await? else {
            return Ok(None);
        };
        let categories = self.db.category.select_by_listing_id(listing.id).await?;
        let caption = self
            .templates
            .render_caption(&ListingCaption::new(&listing, &categories))
            .await?;

        let facts = ListingFacts::from_listing(&listing, categories.iter().map(|c| c.id));
        let chat_ids = self.matching_chat_ids(&facts).await?;

        Ok(Some(Announcement { caption, chat_ids }))
    }

    /// Chats of active subscribers with notifications on whose filter
    /// accepts the listing.
    pub async fn matching_chat_ids(&self, facts: &ListingFacts) -> Result<Vec<i64>, ServiceError> {
        let recipients = self.db.subscriber.select_recipients().await?;

        let mut selections: HashMap<i64, Vec<i64>> = HashMap::new();
        for (filter_id, category_id) in self.db.filter.select_all_category_links().await? {
            selections.entry(filter_id).or_default().push(category_id);
        }

        Ok(recipients
            .iter()
            .filter(|recipient| {
                let selected = selections.get(&recipient.filter_id).cloned().unwrap_or_default();
                matches(&FilterCriteria::from_recipient(recipient, selected), facts)
            })
            .map(|recipient| recipient.chat_id)
            .collect())
    }
}

/// Sends the announcement to every chat. A failed chat is logged and
/// counted; it never stops the rest.
pub async fn dispatch(
    messenger: &dyn Messenger,
    chat_ids: &[i64],
    photo: Option<&Path>,
    caption: &str,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for &chat_id in chat_ids {
        report.attempted += 1;
        let result = match photo {
            Some(photo) => messenger.send_photo(chat_id, photo, caption).await,
            None => messenger.send_text(chat_id, caption).await,
        };
        match result {
            Ok(()) => report.delivered += 1,
            Err(MessengerError::Blocked { .. }) => {
                info!("Chat {chat_id} blocked the bot, skipping");
                report.failed += 1;
            }
            Err(e) => {
                warn!("Failed to deliver to chat {chat_id}: {e}");
                report.failed += 1;
            }
        }
    }
    report
}
