//! Two-level category taxonomy.

use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::entity::CategoryModel;
use crate::repository::Repository;
use crate::service::error::ServiceError;

/// Turns a category name into a hashtag-safe token: letters and digits are
/// lower-cased, everything else becomes `_`.
pub fn tag(name: &str) -> String {
    name.chars()
        .flat_map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                vec!['_']
            }
        })
        .collect()
}

pub struct TaxonomyService {
    db: Arc<Repository>,
}

impl TaxonomyService {
    pub fn new(db: Arc<Repository>) -> Self {
        Self { db }
    }

    /// Returns the leaf `parent_name / child_name`, creating the leaf and,
    /// when needed, its root. The flag tells whether the leaf is new.
    ///
    /// # Performance
    /// * DB calls: 1 when the leaf exists, up to 4 otherwise
    pub async fn get_or_create_leaf(
        &self,
        parent_name: &str,
        child_name: &str,
    ) -> Result<(CategoryModel, bool), ServiceError> {
        let (leaf, created) = self
            .db
            .category
            .get_or_create_leaf(parent_name, child_name, Utc::now())
            .await?;
        if created {
            info!("New category {parent_name} / {child_name} (ID: {})", leaf.id);
        }
        Ok((leaf, created))
    }

    /// Resolves `(root, leaf)` name pairs to leaf ids, skipping duplicates.
    pub async fn resolve_leaves(&self, pairs: &[(String, String)]) -> Result<Vec<i64>, ServiceError> {
        let mut ids = Vec::with_capacity(pairs.len());
        for (parent, child) in pairs {
            let (leaf, _) = self.get_or_create_leaf(parent, child).await?;
            if !ids.contains(&leaf.id) {
                ids.push(leaf.id);
            }
        }
        Ok(ids)
    }

    pub async fn roots(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(self.db.category.select_roots().await?)
    }

    pub async fn children(&self, root_id: i64) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(self.db.category.select_children(root_id).await?)
    }
}
