//! Store adapters.
//!
//! A store owns three collections: `messages` (append-only, observed through
//! [`Subscription`]s), `audit` (append-only) and `knowledge` (the only one that
//! supports update and delete). The traits keep callers independent of which
//! backend holds the data.

pub mod file;
mod log;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{AuditEntry, KnowledgeId, KnowledgeItem, KnowledgePatch, Message, MessageId};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Durably record `message`. Appending an id that is already stored is a
    /// no-op returning the same id.
    async fn append(&self, message: Message) -> Result<MessageId, StoreError>;

    /// Live view of the most recent `limit` messages, oldest first. The first
    /// snapshot is the current state.
    async fn subscribe(&self, limit: usize) -> Result<Subscription, StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    async fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn add_knowledge(&self, item: KnowledgeItem) -> Result<KnowledgeId, StoreError>;

    async fn update_knowledge(
        &self,
        id: &KnowledgeId,
        patch: KnowledgePatch,
    ) -> Result<KnowledgeItem, StoreError>;

    async fn delete_knowledge(&self, id: &KnowledgeId) -> Result<(), StoreError>;

    async fn list_knowledge(&self) -> Result<Vec<KnowledgeItem>, StoreError>;
}

/// A backend serving all three collections
pub trait Store: ConversationStore + AuditLog + KnowledgeStore {}

impl<T: ConversationStore + AuditLog + KnowledgeStore> Store for T {}

/// Handle on a live message subscription.
///
/// Yields full snapshots rather than deltas. Cancelling (or dropping) stops
/// the update task and closes the channel.
pub struct Subscription {
    updates: mpsc::Receiver<Vec<Message>>,
    pump: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(updates: mpsc::Receiver<Vec<Message>>, pump: JoinHandle<()>) -> Self {
        Self { updates, pump }
    }

    /// Next snapshot, or `None` once the subscription has ended
    pub async fn next_snapshot(&mut self) -> Option<Vec<Message>> {
        self.updates.recv().await
    }

    /// Stop receiving updates and release the channel
    pub fn cancel(mut self) {
        self.pump.abort();
        self.updates.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Stream for Subscription {
    type Item = Vec<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_recv(cx)
    }
}
