//! Per-tag statistics over a merged collection of questions.
//!
//! Every tag found inside a question's `tags` list gets a `total` count, and an
//! `answered` count for questions flagged `is_answered`. The key set comes from
//! the questions, not from the tags the caller asked for.

use crate::error::ExtractionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCounts {
    pub total: u64,
    pub answered: u64,
}

/// Tag to counts, ordered by tag so output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagStatistics(BTreeMap<String, TagCounts>);

impl TagStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, tag: &str, answered: bool) {
        let counts = self.0.entry(tag.to_string()).or_default();
        counts.total += 1;
        if answered {
            counts.answered += 1;
        }
    }

    pub fn get(&self, tag: &str) -> Option<&TagCounts> {
        self.0.get(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagCounts)> {
        self.0.iter()
    }
}

/// The two fields of an upstream question we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub tags: Vec<String>,
    pub is_answered: bool,
}

impl Question {
    /// `None` when `tags` is missing or not a list. A missing `is_answered`
    /// counts as unanswered.
    pub fn from_value(value: &Value) -> Option<Self> {
        let tags = value
            .get("tags")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let is_answered = value
            .get("is_answered")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(Self { tags, is_answered })
    }
}

/// Statistics of a result-set shaped payload, `{"items": [..]}`.
pub fn extract(payload: &Value) -> Result<TagStatistics, ExtractionError> {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .ok_or(ExtractionError::MissingItems)?;

    extract_items(items)
}

pub fn extract_items(items: &[Value]) -> Result<TagStatistics, ExtractionError> {
    let mut stats = TagStatistics::new();

    for item in items {
        let Some(question) = Question::from_value(item) else {
            tracing::warn!(
                question_id = ?item.get("question_id"),
                "Skipping question without usable tags"
            );
            continue;
        };

        for tag in &question.tags {
            stats.record(tag, question.is_answered);
        }
    }

    if stats.is_empty() {
        return Err(ExtractionError::EmptyStatistics);
    }

    tracing::trace!(questions = items.len(), tags = stats.len(), "Statistics extracted");
    Ok(stats)
}
