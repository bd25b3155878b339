use std::collections::BTreeMap;

use crate::model::ids::UserId;
use crate::model::question::Category;

/// Correct/total tally for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategoryScore {
    pub correct: u32,
    pub total: u32,
}

/// Per-user learning history across all sittings ever completed.
///
/// Tallies only grow; nothing is decremented when sittings are deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    user_id: UserId,
    scores: BTreeMap<Category, CategoryScore>,
}

impl Progress {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            scores: BTreeMap::new(),
        }
    }

    /// Rehydrates progress from persisted tallies.
    #[must_use]
    pub fn from_persisted(user_id: UserId, scores: BTreeMap<Category, CategoryScore>) -> Self {
        Self { user_id, scores }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Records one answered question in the given category.
    pub fn record(&mut self, category: Category, correct: bool) {
        let entry = self.scores.entry(category).or_default();
        if correct {
            entry.correct = entry.correct.saturating_add(1);
        }
        entry.total = entry.total.saturating_add(1);
    }

    #[must_use]
    pub fn score_for(&self, category: &Category) -> Option<CategoryScore> {
        self.scores.get(category).copied()
    }

    /// All tallies, ordered by category name.
    #[must_use]
    pub fn scores(&self) -> &BTreeMap<Category, CategoryScore> {
        &self.scores
    }
}
