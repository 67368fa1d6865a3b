use crate::error::ArchitectError;
use crate::session::ConversationSession;
use crate::types::{Cost, Message, ModelId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs as async_fs;

/// JSON backup of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExport {
    pub generated_at: DateTime<Utc>,
    pub model: ModelId,
    pub total_cost: Cost,
    pub messages: Vec<Message>,
}

impl ConversationExport {
    pub fn new(model: ModelId, total_cost: Cost, messages: Vec<Message>) -> Self {
        Self {
            generated_at: Utc::now(),
            model,
            total_cost,
            messages,
        }
    }

    /// Everything the session currently shows, including unstored messages
    pub fn from_session(session: &ConversationSession) -> Self {
        Self::new(
            session.options().model.clone(),
            session.total_cost(),
            session.messages(),
        )
    }

    pub fn to_json(&self) -> Result<String, ArchitectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), ArchitectError> {
        let json = self.to_json()?;
        async_fs::write(path, json)
            .await
            .map_err(|source| ArchitectError::ExportWrite {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), messages = self.messages.len(), "conversation exported");
        Ok(())
    }
}
