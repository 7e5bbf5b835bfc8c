//! Database table operations and implementations.

use chrono::DateTime;
use chrono::FixedOffset;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::entity::CategoryModel;
use crate::entity::DeliveryTaskModel;
use crate::entity::FilterModel;
use crate::entity::ListingCategoryRow;
use crate::entity::ListingModel;
use crate::entity::RecipientRow;
use crate::entity::SubscriberModel;
use crate::entity::SubscriberState;
use crate::entity::TaskKind;
use crate::entity::TemplateModel;
use crate::repository::error::DatabaseError;

/// Base table struct providing database pool access.
#[derive(Clone)]
pub struct BaseTable {
    pub pool: SqlitePool,
}

impl BaseTable {
    /// Creates a new base table with the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Base trait for table operations.
#[async_trait::async_trait]
pub trait TableBase {
    /// Deletes all rows from the table.
    async fn delete_all(&self) -> Result<(), DatabaseError>;
}

/// Read, update and delete by primary key.
///
/// Inserts are not part of this trait: rows that carry invariants (a listing
/// always has a delivery task, a subscriber always has a filter) are only
/// created through the write paths of their table.
#[async_trait::async_trait]
pub trait Table<T, ID>: TableBase {
    async fn select_all(&self) -> Result<Vec<T>, DatabaseError>;
    async fn select(&self, id: &ID) -> Result<Option<T>, DatabaseError>;
    async fn update(&self, model: &T) -> Result<(), DatabaseError>;
    async fn delete(&self, id: &ID) -> Result<(), DatabaseError>;
}

macro_rules! impl_table {
    (
        $struct_name:ident,
        $model:ty,
        $table:expr,
        $pk:ident,
        $id_type:ty,
        $update_set:expr,
        [ $( $field:ident ),+ ]
    ) => {
        #[derive(Clone)]
        pub struct $struct_name {
            base: BaseTable,
        }

        impl $struct_name {
            pub fn new(pool: SqlitePool) -> Self {
                Self {
                    base: BaseTable::new(pool),
                }
            }
        }

        #[async_trait::async_trait]
        impl TableBase for $struct_name {
            async fn delete_all(&self) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DELETE FROM ", $table))
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl Table<$model, $id_type> for $struct_name {
            async fn select_all(&self) -> Result<Vec<$model>, DatabaseError> {
                Ok(sqlx::query_as::<_, $model>(concat!(
                    "SELECT * FROM ", $table, " ORDER BY ", stringify!($pk)
                ))
                .fetch_all(&self.base.pool)
                .await?)
            }

            async fn select(&self, id: &$id_type) -> Result<Option<$model>, DatabaseError> {
                Ok(sqlx::query_as::<_, $model>(concat!(
                    "SELECT * FROM ", $table, " WHERE ", stringify!($pk), " = ?"
                ))
                .bind(id)
                .fetch_optional(&self.base.pool)
                .await?)
            }

            async fn update(&self, model: &$model) -> Result<(), DatabaseError> {
                let mut query = sqlx::query(concat!(
                    "UPDATE ", $table, " SET ", $update_set, " WHERE ", stringify!($pk), " = ?"
                ));

                $(
                    query = query.bind(&model.$field);
                )+
                query = query.bind(&model.$pk);

                query.execute(&self.base.pool).await?;
                Ok(())
            }

            async fn delete(&self, id: &$id_type) -> Result<(), DatabaseError> {
                sqlx::query(concat!("DELETE FROM ", $table, " WHERE ", stringify!($pk), " = ?"))
                    .bind(id)
                    .execute(&self.base.pool)
                    .await?;
                Ok(())
            }
        }
    };
}

// ============================================================================
// CategoryTable
// ============================================================================

impl_table!(
    CategoryTable,
    CategoryModel,
    "categories",
    id,
    i64,
    "name = ?, parent_id = ?, updated = ?",
    [name, parent_id, updated]
);

impl CategoryTable {
    /// Finds the leaf named `child_name` whose root is named `parent_name`.
    pub async fn select_leaf(
        &self,
        parent_name: &str,
        child_name: &str,
    ) -> Result<Option<CategoryModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, CategoryModel>(
            r#"
            SELECT c.* FROM categories c
            JOIN categories p ON p.id = c.parent_id
            WHERE c.name = ?
                AND p.name = ?
                AND p.parent_id IS NULL
            ORDER BY c.id
            LIMIT 1
            "#,
        )
        .bind(child_name)
        .bind(parent_name)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    pub async fn select_roots(&self) -> Result<Vec<CategoryModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, CategoryModel>(
            "SELECT * FROM categories WHERE parent_id IS NULL ORDER BY name, id",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn select_children(&self, root_id: i64) -> Result<Vec<CategoryModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, CategoryModel>(
            "SELECT * FROM categories WHERE parent_id = ? ORDER BY name, id",
        )
        .bind(root_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Categories linked to a listing, each with the name of its root.
    pub async fn select_by_listing_id(
        &self,
        listing_id: i64,
    ) -> Result<Vec<ListingCategoryRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, ListingCategoryRow>(
            r#"
            SELECT c.id AS id, c.name AS name, p.name AS parent_name
            FROM listing_categories lc
            JOIN categories c ON c.id = lc.category_id
            LEFT JOIN categories p ON p.id = c.parent_id
            WHERE lc.listing_id = ?
            ORDER BY c.id
            "#,
        )
        .bind(listing_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Returns the leaf `parent_name / child_name`, creating it on first
    /// sight. The flag is `true` when the leaf was created by this call.
    ///
    /// A new leaf is inserted without a parent first, then the root is
    /// looked up or created, then the leaf is attached. All three steps run
    /// in one transaction, so no reader ever observes the detached leaf.
    ///
    /// # Performance
    /// * DB calls: 1 when the leaf exists, up to 4 otherwise
    pub async fn get_or_create_leaf(
        &self,
        parent_name: &str,
        child_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(CategoryModel, bool), DatabaseError> {
        if let Some(leaf) = self.select_leaf(parent_name, child_name).await? {
            return Ok((leaf, false));
        }

        let mut tx = self.base.pool.begin().await?;

        let leaf_id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (name, parent_id, created, updated) VALUES (?, NULL, ?, ?) RETURNING id",
        )
        .bind(child_name)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let existing_root: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM categories WHERE name = ? AND parent_id IS NULL AND id != ? ORDER BY id LIMIT 1",
        )
        .bind(parent_name)
        .bind(leaf_id)
        .fetch_optional(&mut *tx)
        .await?;

        let root_id = match existing_root {
            Some(id) => id,
            None => {
                sqlx::query_scalar(
                    "INSERT INTO categories (name, parent_id, created, updated) VALUES (?, NULL, ?, ?) RETURNING id",
                )
                .bind(parent_name)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let leaf = sqlx::query_as::<_, CategoryModel>(
            "UPDATE categories SET parent_id = ?, updated = ? WHERE id = ? RETURNING *",
        )
        .bind(root_id)
        .bind(now)
        .bind(leaf_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::InternalError {
            message: format!("category {leaf_id} vanished before it was attached"),
        })?;

        tx.commit().await?;
        Ok((leaf, true))
    }
}

// ============================================================================
// ListingTable
// ============================================================================

impl_table!(
    ListingTable,
    ListingModel,
    "listings",
    id,
    i64,
    "title = ?, description = ?, budget = ?, deadline = ?, safe_deal = ?, without_executor = ?, url = ?, updated = ?",
    [
        title,
        description,
        budget,
        deadline,
        safe_deal,
        without_executor,
        url,
        updated
    ]
);

impl ListingTable {
    pub async fn exists_by_article(&self, article: i64) -> Result<bool, DatabaseError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE article = ?")
                .bind(article)
                .fetch_one(&self.base.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn select_by_article(
        &self,
        article: i64,
    ) -> Result<Option<ListingModel>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ListingModel>("SELECT * FROM listings WHERE article = ?")
                .bind(article)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    /// Publication timestamp of the newest stored listing.
    ///
    /// Compared through `datetime()` so rows written under a different
    /// configured offset still order correctly.
    pub async fn select_latest_published(
        &self,
    ) -> Result<Option<DateTime<FixedOffset>>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, DateTime<FixedOffset>>(
            "SELECT published FROM listings ORDER BY datetime(published) DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.base.pool)
        .await?)
    }

    /// Stores a listing together with its category links and the delivery
    /// task announcing it, in one transaction.
    ///
    /// Returns `None` without writing anything when a listing with the same
    /// article already exists.
    ///
    /// # Performance
    /// * DB calls: 2 + number of categories
    pub async fn insert_with_task(
        &self,
        listing: &ListingModel,
        category_ids: &[i64],
    ) -> Result<Option<i64>, DatabaseError> {
        let mut tx = self.base.pool.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO listings (
                article, title, description, budget, deadline, safe_deal,
                without_executor, published, url, created, updated
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(article) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(listing.article)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.budget)
        .bind(listing.deadline)
        .bind(listing.safe_deal)
        .bind(listing.without_executor)
        .bind(listing.published)
        .bind(&listing.url)
        .bind(listing.created)
        .bind(listing.updated)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(None);
        };

        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO listing_categories (listing_id, category_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO delivery_tasks (kind, listing_id, scheduled, done, created, updated)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(TaskKind::NewListing)
        .bind(id)
        .bind(listing.created)
        .bind(listing.created)
        .bind(listing.created)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(id))
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.base.pool)
            .await?)
    }
}

// ============================================================================
// SubscriberTable
// ============================================================================

impl_table!(
    SubscriberTable,
    SubscriberModel,
    "subscribers",
    id,
    i64,
    "full_name = ?, active = ?, state = ?, updated = ?",
    [full_name, active, state, updated]
);

impl SubscriberTable {
    pub async fn select_by_chat_id(
        &self,
        chat_id: i64,
    ) -> Result<Option<SubscriberModel>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, SubscriberModel>("SELECT * FROM subscribers WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    /// Creates a subscriber and its default filter in one transaction.
    pub async fn insert_with_filter(
        &self,
        subscriber: &SubscriberModel,
    ) -> Result<(SubscriberModel, FilterModel), DatabaseError> {
        let mut tx = self.base.pool.begin().await?;

        let subscriber = sqlx::query_as::<_, SubscriberModel>(
            r#"
            INSERT INTO subscribers (chat_id, full_name, active, state, created, updated)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(subscriber.chat_id)
        .bind(&subscriber.full_name)
        .bind(subscriber.active)
        .bind(subscriber.state)
        .bind(subscriber.created)
        .bind(subscriber.updated)
        .fetch_one(&mut *tx)
        .await?;

        let filter = sqlx::query_as::<_, FilterModel>(
            "INSERT INTO filters (subscriber_id) VALUES (?) RETURNING *",
        )
        .bind(subscriber.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((subscriber, filter))
    }

    pub async fn update_state(
        &self,
        subscriber_id: i64,
        state: Option<SubscriberState>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE subscribers SET state = ?, updated = ? WHERE id = ?")
            .bind(state)
            .bind(now)
            .bind(subscriber_id)
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    /// Active subscribers with notifications enabled, joined with their
    /// filter.
    pub async fn select_recipients(&self) -> Result<Vec<RecipientRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT
                s.id AS subscriber_id,
                s.chat_id AS chat_id,
                f.id AS filter_id,
                f.budget_min AS budget_min,
                f.budget_max AS budget_max,
                f.only_safe_deal AS only_safe_deal,
                f.only_without_executor AS only_without_executor
            FROM subscribers s
            JOIN filters f ON f.subscriber_id = s.id
            WHERE s.active = 1
                AND f.notifications_enabled = 1
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.base.pool)
        .await?)
    }
}

// ============================================================================
// FilterTable
// ============================================================================

impl_table!(
    FilterTable,
    FilterModel,
    "filters",
    id,
    i64,
    "budget_min = ?, budget_max = ?, only_safe_deal = ?, only_without_executor = ?, notifications_enabled = ?",
    [
        budget_min,
        budget_max,
        only_safe_deal,
        only_without_executor,
        notifications_enabled
    ]
);

impl FilterTable {
    pub async fn select_by_subscriber_id(
        &self,
        subscriber_id: i64,
    ) -> Result<Option<FilterModel>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, FilterModel>("SELECT * FROM filters WHERE subscriber_id = ?")
                .bind(subscriber_id)
                .fetch_optional(&self.base.pool)
                .await?,
        )
    }

    pub async fn select_category_ids(&self, filter_id: i64) -> Result<Vec<i64>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT category_id FROM filter_categories WHERE filter_id = ? ORDER BY category_id",
        )
        .bind(filter_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Every `(filter_id, category_id)` selection link.
    pub async fn select_all_category_links(&self) -> Result<Vec<(i64, i64)>, DatabaseError> {
        Ok(sqlx::query_as::<_, (i64, i64)>(
            "SELECT filter_id, category_id FROM filter_categories ORDER BY filter_id, category_id",
        )
        .fetch_all(&self.base.pool)
        .await?)
    }

    pub async fn add_categories(
        &self,
        filter_id: i64,
        category_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.base.pool.begin().await?;
        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO filter_categories (filter_id, category_id) VALUES (?, ?)",
            )
            .bind(filter_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_categories(
        &self,
        filter_id: i64,
        category_ids: &[i64],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.base.pool.begin().await?;
        for category_id in category_ids {
            sqlx::query("DELETE FROM filter_categories WHERE filter_id = ? AND category_id = ?")
                .bind(filter_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear_categories(&self, filter_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM filter_categories WHERE filter_id = ?")
            .bind(filter_id)
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// DeliveryTaskTable
// ============================================================================

impl_table!(
    DeliveryTaskTable,
    DeliveryTaskModel,
    "delivery_tasks",
    id,
    i64,
    "kind = ?, scheduled = ?, updated = ?",
    [kind, scheduled, updated]
);

impl DeliveryTaskTable {
    /// The oldest task that is not done and whose scheduled time has come.
    pub async fn select_oldest_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DeliveryTaskModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, DeliveryTaskModel>(
            r#"
            SELECT * FROM delivery_tasks
            WHERE done = 0
                AND scheduled <= ?
            ORDER BY scheduled ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&self.base.pool)
        .await?)
    }

    pub async fn select_by_listing_id(
        &self,
        listing_id: i64,
    ) -> Result<Vec<DeliveryTaskModel>, DatabaseError> {
        Ok(sqlx::query_as::<_, DeliveryTaskModel>(
            "SELECT * FROM delivery_tasks WHERE listing_id = ? ORDER BY scheduled DESC, id DESC",
        )
        .bind(listing_id)
        .fetch_all(&self.base.pool)
        .await?)
    }

    /// Marks a task done. Returns `true` only for the call that performed the
    /// transition; a task that is already done is left untouched.
    pub async fn mark_done(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE delivery_tasks SET done = 1, updated = ? WHERE id = ? AND done = 0")
                .bind(now)
                .bind(id)
                .execute(&self.base.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Records an attempt that left the task pending.
    pub async fn touch(&self, id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE delivery_tasks SET updated = ? WHERE id = ? AND done = 0")
            .bind(now)
            .bind(id)
            .execute(&self.base.pool)
            .await?;
        Ok(())
    }

    pub async fn count_pending(&self, now: DateTime<Utc>) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM delivery_tasks WHERE done = 0 AND scheduled <= ?",
        )
        .bind(now)
        .fetch_one(&self.base.pool)
        .await?)
    }
}

// ============================================================================
// TemplateTable
// ============================================================================

impl_table!(
    TemplateTable,
    TemplateModel,
    "templates",
    id,
    i64,
    "name = ?, kind = ?, body = ?, updated = ?",
    [name, kind, body, updated]
);

impl TemplateTable {
    /// Inserts a template or replaces the kind and body of the one with the
    /// same name.
    pub async fn upsert(&self, model: &TemplateModel) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO templates (name, kind, body, created, updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                body = excluded.body,
                updated = excluded.updated
            RETURNING id
            "#,
        )
        .bind(&model.name)
        .bind(model.kind)
        .bind(&model.body)
        .bind(model.created)
        .bind(model.updated)
        .fetch_one(&self.base.pool)
        .await?)
    }
}
