use super::log::MessageLog;
use super::{AuditLog, ConversationStore, KnowledgeStore, Subscription};
use crate::error::StoreError;
use crate::types::{AuditEntry, KnowledgeId, KnowledgeItem, KnowledgePatch, Message, MessageId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-process store. Backs offline mode, and lets tests simulate an outage
/// with [`MemoryStore::set_available`].
pub struct MemoryStore {
    messages: Arc<MessageLog>,
    audit: Mutex<Vec<AuditEntry>>,
    knowledge: Mutex<Vec<KnowledgeItem>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            messages: MessageLog::new(),
            audit: Mutex::new(Vec::new()),
            knowledge: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable every write fails with [`StoreError::Unavailable`];
    /// reads and subscriptions keep serving the last known state.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(&self, message: Message) -> Result<MessageId, StoreError> {
        self.check_available()?;
        let id = message.id.clone();
        self.messages.insert(message);
        Ok(id)
    }

    async fn subscribe(&self, limit: usize) -> Result<Subscription, StoreError> {
        Ok(self.messages.subscribe(limit))
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.check_available()?;
        lock(&self.audit).push(entry);
        Ok(())
    }

    async fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(lock(&self.audit).clone())
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn add_knowledge(&self, item: KnowledgeItem) -> Result<KnowledgeId, StoreError> {
        self.check_available()?;
        let id = item.id.clone();
        lock(&self.knowledge).push(item);
        Ok(id)
    }

    async fn update_knowledge(
        &self,
        id: &KnowledgeId,
        patch: KnowledgePatch,
    ) -> Result<KnowledgeItem, StoreError> {
        self.check_available()?;
        let mut items = lock(&self.knowledge);
        let item = items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        patch.apply(item);
        Ok(item.clone())
    }

    async fn delete_knowledge(&self, id: &KnowledgeId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut items = lock(&self.knowledge);
        let before = items.len();
        items.retain(|item| &item.id != id);
        if items.len() == before {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn list_knowledge(&self) -> Result<Vec<KnowledgeItem>, StoreError> {
        Ok(lock(&self.knowledge).clone())
    }
}
