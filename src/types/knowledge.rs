use super::ids::KnowledgeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A knowledge base document. Unlike messages these may be edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: KnowledgeId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: KnowledgeId::generate(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl KnowledgePatch {
    pub fn apply(self, item: &mut KnowledgeItem) {
        if let Some(title) = self.title {
            item.title = title;
        }
        if let Some(content) = self.content {
            item.content = content;
        }
        item.updated_at = Utc::now();
    }
}
