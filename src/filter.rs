//! Matching of listings against subscriber filters.

use std::collections::HashSet;

use crate::entity::FilterModel;
use crate::entity::ListingModel;
use crate::entity::RecipientRow;

/// The criteria a subscriber saved, detached from storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub only_safe_deal: bool,
    pub only_without_executor: bool,
    /// Selected category ids. Empty means no category restriction.
    pub category_ids: HashSet<i64>,
}

impl FilterCriteria {
    pub fn from_filter(filter: &FilterModel, category_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            budget_min: filter.budget_min,
            budget_max: filter.budget_max,
            only_safe_deal: filter.only_safe_deal,
            only_without_executor: filter.only_without_executor,
            category_ids: category_ids.into_iter().collect(),
        }
    }

    pub fn from_recipient(recipient: &RecipientRow, category_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            budget_min: recipient.budget_min,
            budget_max: recipient.budget_max,
            only_safe_deal: recipient.only_safe_deal,
            only_without_executor: recipient.only_without_executor,
            category_ids: category_ids.into_iter().collect(),
        }
    }
}

/// The parts of a listing a filter looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingFacts {
    pub budget: Option<i64>,
    pub safe_deal: bool,
    pub without_executor: bool,
    /// Linked leaf category ids.
    pub category_ids: HashSet<i64>,
}

impl ListingFacts {
    pub fn from_listing(listing: &ListingModel, category_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            budget: listing.budget,
            safe_deal: listing.safe_deal,
            without_executor: listing.without_executor,
            category_ids: category_ids.into_iter().collect(),
        }
    }
}

/// Returns `true` when the listing passes every rule of the filter.
///
/// A listing without a budget is never rejected on budget. An empty category
/// selection accepts any categories; otherwise one shared leaf is enough.
pub fn matches(filter: &FilterCriteria, listing: &ListingFacts) -> bool {
    if let Some(budget) = listing.budget {
        let min = filter.budget_min.unwrap_or(0);
        let max = filter.budget_max.unwrap_or(i64::MAX);
        if budget < min || budget > max {
            return false;
        }
    }

    if filter.only_safe_deal && !listing.safe_deal {
        return false;
    }

    if filter.only_without_executor && !listing.without_executor {
        return false;
    }

    filter.category_ids.is_empty() || !filter.category_ids.is_disjoint(&listing.category_ids)
}
