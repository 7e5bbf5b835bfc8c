//! Subscriber settings: filter fields, category selection and the budget
//! input dialog.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::callback::CallbackPayload;
use crate::entity::CategoryModel;
use crate::entity::FilterModel;
use crate::entity::SubscriberModel;
use crate::entity::SubscriberState;
use crate::messenger::Messenger;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::error::ServiceError;
use crate::service::template_service::BUDGET_INCORRECT_INPUT;
use crate::service::template_service::CANCELED;
use crate::service::template_service::ENTER_VALUE;
use crate::service::template_service::SAVED;
use crate::service::template_service::TemplateCache;

/// Which end of the budget range an input sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetBound {
    Min,
    Max,
}

impl BudgetBound {
    fn awaiting_state(self) -> SubscriberState {
        match self {
            Self::Min => SubscriberState::AwaitingBudgetMin,
            Self::Max => SubscriberState::AwaitingBudgetMax,
        }
    }

    fn from_state(state: SubscriberState) -> Self {
        match state {
            SubscriberState::AwaitingBudgetMin => Self::Min,
            SubscriberState::AwaitingBudgetMax => Self::Max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetInputOutcome {
    /// `None` means the bound was cleared.
    Saved { bound: BudgetBound, value: Option<i64> },
    /// Not a non-negative integer. The subscriber is still awaiting input.
    Invalid,
    /// The subscriber was not asked for a budget.
    NotAwaiting,
}

pub struct SettingsService {
    db: Arc<Repository>,
    templates: Arc<TemplateCache>,
    messenger: Arc<dyn Messenger>,
}

impl SettingsService {
    pub fn new(db: Arc<Repository>, templates: Arc<TemplateCache>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            db,
            templates,
            messenger,
        }
    }

    /// Returns the subscriber of `chat_id` with its filter, creating both on
    /// first contact.
    ///
    /// # Performance
    /// * DB calls: 2 when the subscriber exists, 3 otherwise
    pub async fn get_or_create_subscriber(
        &self,
        chat_id: i64,
        full_name: &str,
    ) -> Result<(SubscriberModel, FilterModel), ServiceError> {
        if let Some(subscriber) = self.db.subscriber.select_by_chat_id(chat_id).await? {
            let filter = self.filter_of(&subscriber).await?;
            return Ok((subscriber, filter));
        }

        let now = Utc::now();
        let subscriber = SubscriberModel {
            id: 0,
            chat_id,
            full_name: full_name.to_string(),
            active: true,
            state: None,
            created: now,
            updated: now,
        };
        debug!("Creating subscriber for chat {chat_id}");
        Ok(self.db.subscriber.insert_with_filter(&subscriber).await?)
    }

    async fn filter_of(&self, subscriber: &SubscriberModel) -> Result<FilterModel, ServiceError> {
        self.db
            .filter
            .select_by_subscriber_id(subscriber.id)
            .await?
            .ok_or(ServiceError::NotFound {
                entity: "Filter",
                id: subscriber.id,
            })
    }

    async fn subscriber(&self, chat_id: i64) -> Result<SubscriberModel, ServiceError> {
        self.db
            .subscriber
            .select_by_chat_id(chat_id)
            .await?
            .ok_or(ServiceError::NotFound {
                entity: "Subscriber",
                id: chat_id,
            })
    }

    pub async fn filter(&self, chat_id: i64) -> Result<FilterModel, ServiceError> {
        let subscriber = self.subscriber(chat_id).await?;
        self.filter_of(&subscriber).await
    }

    async fn update_filter<F>(&self, chat_id: i64, change: F) -> Result<FilterModel, ServiceError>
    where
        F: FnOnce(&mut FilterModel),
    {
        let mut filter = self.filter(chat_id).await?;
        change(&mut filter);
        self.db.filter.update(&filter).await?;
        Ok(filter)
    }

    /// Returns whether notifications are now enabled.
    pub async fn toggle_notifications(&self, chat_id: i64) -> Result<bool, ServiceError> {
        let filter = self
            .update_filter(chat_id, |f| f.notifications_enabled = !f.notifications_enabled)
            .await?;
        Ok(filter.notifications_enabled)
    }

    pub async fn toggle_safe_deal(&self, chat_id: i64) -> Result<bool, ServiceError> {
        let filter = self
            .update_filter(chat_id, |f| f.only_safe_deal = !f.only_safe_deal)
            .await?;
        Ok(filter.only_safe_deal)
    }

    pub async fn toggle_without_executor(&self, chat_id: i64) -> Result<bool, ServiceError> {
        let filter = self
            .update_filter(chat_id, |f| f.only_without_executor = !f.only_without_executor)
            .await?;
        Ok(filter.only_without_executor)
    }

    /// Puts the subscriber into the budget dialog and asks for a value.
    pub async fn begin_budget_input(&self, chat_id: i64, bound: BudgetBound) -> Result<(), ServiceError> {
        let subscriber = self.subscriber(chat_id).await?;
        self.db
            .subscriber
            .update_state(subscriber.id, Some(bound.awaiting_state()), Utc::now())
            .await?;
        let text = self.templates.text(ENTER_VALUE).await?;
        self.messenger.send_text(chat_id, &text).await?;
        Ok(())
    }

    /// Applies a budget typed by the subscriber. `0` clears the bound.
    ///
    /// # Performance
    /// * DB calls: 1 without a pending dialog or on invalid input, 4 otherwise
    pub async fn submit_budget_input(&self, chat_id: i64, text: &str) -> Result<BudgetInputOutcome, ServiceError> {
        let subscriber = self.subscriber(chat_id).await?;
        let Some(state) = subscriber.state else {
            return Ok(BudgetInputOutcome::NotAwaiting);
        };
        let bound = BudgetBound::from_state(state);

        let Some(value) = parse_budget_input(text) else {
            return Ok(BudgetInputOutcome::Invalid);
        };
        let value = (value > 0).then_some(value);

        let mut filter = self.filter_of(&subscriber).await?;
        match bound {
            BudgetBound::Min => filter.budget_min = value,
            BudgetBound::Max => filter.budget_max = value,
        }
        self.db.filter.update(&filter).await?;
        self.db
            .subscriber
            .update_state(subscriber.id, None, Utc::now())
            .await?;

        Ok(BudgetInputOutcome::Saved { bound, value })
    }

    /// [`Self::submit_budget_input`] followed by the matching reply.
    pub async fn handle_budget_text(&self, chat_id: i64, text: &str) -> Result<BudgetInputOutcome, ServiceError> {
        let outcome = self.submit_budget_input(chat_id, text).await?;
        let reply = match outcome {
            BudgetInputOutcome::Saved { .. } => Some(SAVED),
            BudgetInputOutcome::Invalid => Some(BUDGET_INCORRECT_INPUT),
            BudgetInputOutcome::NotAwaiting => None,
        };
        if let Some(name) = reply {
            let text = self.templates.text(name).await?;
            self.messenger.send_text(chat_id, &text).await?;
        }
        Ok(outcome)
    }

    /// Leaves the budget dialog without changing the filter.
    pub async fn cancel_input(&self, chat_id: i64) -> Result<(), ServiceError> {
        let subscriber = self.subscriber(chat_id).await?;
        self.db
            .subscriber
            .update_state(subscriber.id, None, Utc::now())
            .await?;
        let text = self.templates.text(CANCELED).await?;
        self.messenger.send_text(chat_id, &text).await?;
        Ok(())
    }

    pub async fn roots(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(self.db.category.select_roots().await?)
    }

    pub async fn children(&self, root_id: i64) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(self.db.category.select_children(root_id).await?)
    }

    pub async fn selected_category_ids(&self, chat_id: i64) -> Result<HashSet<i64>, ServiceError> {
        let filter = self.filter(chat_id).await?;
        Ok(self
            .db
            .filter
            .select_category_ids(filter.id)
            .await?
            .into_iter()
            .collect())
    }

    /// Selects or deselects one category. Returns whether it is now selected.
    pub async fn toggle_category(&self, chat_id: i64, category_id: i64) -> Result<bool, ServiceError> {
        let filter = self.filter(chat_id).await?;
        let selected = self.db.filter.select_category_ids(filter.id).await?;
        if selected.contains(&category_id) {
            self.db.filter.remove_categories(filter.id, &[category_id]).await?;
            Ok(false)
        } else {
            self.db.filter.add_categories(filter.id, &[category_id]).await?;
            Ok(true)
        }
    }

    pub async fn select_all_children(&self, chat_id: i64, root_id: i64) -> Result<(), ServiceError> {
        let filter = self.filter(chat_id).await?;
        let ids: Vec<i64> = self.children(root_id).await?.iter().map(|c| c.id).collect();
        self.db.filter.add_categories(filter.id, &ids).await?;
        Ok(())
    }

    pub async fn select_categories(&self, chat_id: i64, category_ids: &[i64]) -> Result<(), ServiceError> {
        let filter = self.filter(chat_id).await?;
        self.db.filter.add_categories(filter.id, category_ids).await?;
        Ok(())
    }

    /// Deselects the children of `root_id`, or everything when `None`.
    pub async fn reset_categories(&self, chat_id: i64, root_id: Option<i64>) -> Result<(), ServiceError> {
        let filter = self.filter(chat_id).await?;
        match root_id {
            Some(root_id) => {
                let ids: Vec<i64> = self.children(root_id).await?.iter().map(|c| c.id).collect();
                self.db.filter.remove_categories(filter.id, &ids).await?;
            }
            None => self.db.filter.clear_categories(filter.id).await?,
        }
        Ok(())
    }

    /// Applies a filter-changing button press. Returns `false` for payloads
    /// that only navigate.
    pub async fn apply(&self, chat_id: i64, payload: &CallbackPayload) -> Result<bool, ServiceError> {
        match payload {
            CallbackPayload::FilterActive => {
                self.toggle_notifications(chat_id).await?;
            }
            CallbackPayload::FilterSafeDeal => {
                self.toggle_safe_deal(chat_id).await?;
            }
            CallbackPayload::FilterWithoutExecutor => {
                self.toggle_without_executor(chat_id).await?;
            }
            CallbackPayload::FilterBudgetMin => {
                self.begin_budget_input(chat_id, BudgetBound::Min).await?;
            }
            CallbackPayload::FilterBudgetMax => {
                self.begin_budget_input(chat_id, BudgetBound::Max).await?;
            }
            CallbackPayload::FilterChapter { chapter_id } => {
                // Roots open their children; only leaves toggle.
                let category = self.db.category.select(chapter_id).await?.ok_or(ServiceError::NotFound {
                    entity: "Category",
                    id: *chapter_id,
                })?;
                if category.is_root() {
                    return Ok(false);
                }
                self.toggle_category(chat_id, category.id).await?;
            }
            CallbackPayload::FilterChapterSelectAll { chapter_id } => {
                self.select_all_children(chat_id, *chapter_id).await?;
            }
            CallbackPayload::FilterChapterSelect { chapter_ids } => {
                self.select_categories(chat_id, chapter_ids).await?;
            }
            CallbackPayload::FilterChapterReset { chapter_id } => {
                let root_id = (*chapter_id != 0).then_some(*chapter_id);
                self.reset_categories(chat_id, root_id).await?;
            }
            CallbackPayload::Menu
            | CallbackPayload::Back
            | CallbackPayload::Nothing
            | CallbackPayload::Settings
            | CallbackPayload::Language { .. }
            | CallbackPayload::ProjectsPage { .. }
            | CallbackPayload::FilterChapters => return Ok(false),
        }
        Ok(true)
    }
}

/// A non-negative integer, surrounding whitespace allowed.
fn parse_budget_input(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok().filter(|value| *value >= 0)
}
