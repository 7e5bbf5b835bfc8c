//! Cached message templates and listing captions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::debug;
use log::info;
use minijinja::AutoEscape;
use minijinja::Environment;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::entity::ListingCategoryRow;
use crate::entity::ListingModel;
use crate::entity::TemplateKind;
use crate::entity::TemplateModel;
use crate::repository::Repository;
use crate::repository::table::Table;
use crate::service::error::ServiceError;
use crate::service::error::TemplateError;
use crate::service::taxonomy_service::tag;

pub const LISTING_CAPTION: &str = "listing_caption";
pub const ENTER_VALUE: &str = "enter_value";
pub const CANCELED: &str = "canceled";
pub const BUDGET_INCORRECT_INPUT: &str = "filter_budget_incorrect_input";
pub const SAVED: &str = "saved";

const DESCRIPTION_LIMIT: usize = 700;

/// Values substituted into the listing caption template.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingCaption {
    pub article: i64,
    pub title: String,
    pub safe_deal_info: String,
    pub budget_info: String,
    pub deadline_info: String,
    pub description: String,
    pub chapters_info: String,
    pub url: String,
    pub published: String,
}

impl ListingCaption {
    pub fn new(listing: &ListingModel, categories: &[ListingCategoryRow]) -> Self {
        let description = if listing.description.chars().count() > DESCRIPTION_LIMIT {
            let truncated: String = listing.description.chars().take(DESCRIPTION_LIMIT).collect();
            format!("{truncated}...")
        } else {
            listing.description.clone()
        };

        let chapters_info = categories
            .iter()
            .map(|category| match &category.parent_name {
                Some(parent) => format!("#{} #{} ", tag(&category.name), tag(parent)),
                None => format!("#{} ", tag(&category.name)),
            })
            .collect();

        Self {
            article: listing.article,
            title: listing.title.clone(),
            safe_deal_info: if listing.safe_deal {
                "🛡 Безопасная сделка".to_string()
            } else {
                String::new()
            },
            budget_info: match listing.budget {
                Some(budget) => format!("{budget} руб."),
                None => "ожидает предложений".to_string(),
            },
            deadline_info: match listing.deadline {
                Some(deadline) => deadline.format("%d.%m.%Y").to_string(),
                None => "по договоренности".to_string(),
            },
            description,
            chapters_info,
            url: listing.url.clone(),
            published: listing.published.format("%d.%m.%Y %H:%M").to_string(),
        }
    }
}

/// Templates loaded from storage, keyed by name.
///
/// Loaded once at startup and reloaded explicitly after a template changes.
pub struct TemplateCache {
    db: Arc<Repository>,
    env: Environment<'static>,
    templates: RwLock<HashMap<String, TemplateModel>>,
}

impl TemplateCache {
    pub fn new(db: Arc<Repository>) -> Self {
        let mut env = Environment::new();
        // Messages are sent with HTML parse mode.
        env.set_auto_escape_callback(|_| AutoEscape::Html);

        Self {
            db,
            env,
            templates: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the cached templates with the stored ones.
    ///
    /// # Performance
    /// * DB calls: 1
    pub async fn load(&self) -> Result<usize, ServiceError> {
        let templates: HashMap<String, TemplateModel> = self
            .db
            .template
            .select_all()
            .await?
            .into_iter()
            .map(|template| (template.name.clone(), template))
            .collect();
        let count = templates.len();

        *self.templates.write().await = templates;
        info!("Loaded {count} templates");
        Ok(count)
    }

    pub async fn reload(&self) -> Result<usize, ServiceError> {
        debug!("Reloading templates");
        self.load().await
    }

    pub async fn get(&self, name: &str) -> Option<TemplateModel> {
        self.templates.read().await.get(name).cloned()
    }

    /// Raw body of a template.
    pub async fn text(&self, name: &str) -> Result<String, TemplateError> {
        self.get(name)
            .await
            .map(|template| template.body)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                name: name.to_string(),
            })
    }

    pub async fn render<S: Serialize>(&self, name: &str, context: &S) -> Result<String, TemplateError> {
        let body = self.text(name).await?;
        self.env
            .render_str(&body, context)
            .map_err(|source| TemplateError::RenderFailed {
                name: name.to_string(),
                source,
            })
    }

    pub async fn render_caption(&self, caption: &ListingCaption) -> Result<String, TemplateError> {
        self.render(LISTING_CAPTION, caption).await
    }
}

/// Edits stored templates and keeps the cache in step.
pub struct TemplateService {
    db: Arc<Repository>,
    cache: Arc<TemplateCache>,
}

impl TemplateService {
    pub fn new(db: Arc<Repository>, cache: Arc<TemplateCache>) -> Self {
        Self { db, cache }
    }

    /// Creates or replaces the template `name`, then reloads the cache.
    ///
    /// # Performance
    /// * DB calls: 2
    pub async fn save(&self, name: &str, kind: TemplateKind, body: &str) -> Result<i64, ServiceError> {
        let now = Utc::now();
        let model = TemplateModel {
            id: 0,
            name: name.to_string(),
            kind,
            body: body.to_string(),
            created: now,
            updated: now,
        };
        let id = self.db.template.upsert(&model).await?;
        self.cache.reload().await?;
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<TemplateModel>, ServiceError> {
        Ok(self.db.template.select_all().await?)
    }
}
