use super::log::MessageLog;
use super::{AuditLog, ConversationStore, KnowledgeStore, Subscription};
use crate::error::StoreError;
use crate::types::{AuditEntry, KnowledgeId, KnowledgeItem, KnowledgePatch, Message, MessageId};
use async_trait::async_trait;
use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;

const MESSAGES_FILE: &str = "messages.jsonl";
const AUDIT_FILE: &str = "audit.jsonl";
const KNOWLEDGE_FILE: &str = "knowledge.json";

/// Durable store in a data directory: one JSONL file per append-only
/// collection plus a JSON document for the knowledge base.
pub struct FileStore {
    dir: PathBuf,
    messages: Arc<MessageLog>,
    audit: Mutex<Vec<AuditEntry>>,
    knowledge: AsyncMutex<Vec<KnowledgeItem>>,
    // Serializes appends so lines never interleave
    write_lock: AsyncMutex<()>,
}

impl FileStore {
    /// Open (creating if needed) the store in `dir` and load its collections
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;

        let messages_path = dir.join(MESSAGES_FILE);
        let audit_path = dir.join(AUDIT_FILE);
        let (messages, audit) = task::spawn_blocking(move || {
            let messages = read_jsonl::<Message>(&messages_path)?;
            let audit = read_jsonl::<AuditEntry>(&audit_path)?;
            Ok::<_, StoreError>((messages, audit))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("loader task failed: {e}")))??;

        let knowledge = read_knowledge(&dir.join(KNOWLEDGE_FILE)).await?;

        tracing::info!(
            dir = %dir.display(),
            messages = messages.len(),
            audit = audit.len(),
            knowledge = knowledge.len(),
            "opened file store"
        );

        let log = MessageLog::new();
        log.load(messages);

        Ok(Self {
            dir,
            messages: log,
            audit: Mutex::new(audit),
            knowledge: AsyncMutex::new(knowledge),
            write_lock: AsyncMutex::new(()),
        })
    }

    async fn persist_knowledge(&self, items: &[KnowledgeItem]) -> Result<(), StoreError> {
        let path = self.dir.join(KNOWLEDGE_FILE);
        let tmp = self.dir.join(format!("{KNOWLEDGE_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(items).map_err(|source| StoreError::Encode {
            context: KNOWLEDGE_FILE.to_string(),
            source,
        })?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| io_error(&tmp, source))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| io_error(&path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    if source.kind() == ErrorKind::PermissionDenied {
        StoreError::PermissionDenied(path.display().to_string())
    } else {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Parse a JSONL collection in parallel, skipping blank and unreadable lines
fn read_jsonl<T>(path: &Path) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned + Send,
{
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_error(path, source)),
    };

    Ok(contents
        .par_lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                None
            }
        })
        .collect())
}

async fn read_knowledge(path: &Path) -> Result<Vec<KnowledgeItem>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
        Ok(contents) => serde_json::from_str(&contents).or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "knowledge file unreadable, starting empty");
            Ok(Vec::new())
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(io_error(path, source)),
    }
}

fn encode_line<T: Serialize>(record: &T, context: &str) -> Result<String, StoreError> {
    let mut line = serde_json::to_string(record).map_err(|source| StoreError::Encode {
        context: context.to_string(),
        source,
    })?;
    line.push('\n');
    Ok(line)
}

/// Append one encoded record. A torn tail from an earlier crash is closed
/// off first, and a failed write is cut back to the previous length.
async fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| io_error(path, source))?;
    let len = file
        .metadata()
        .await
        .map_err(|source| io_error(path, source))?
        .len();

    let mut record = String::with_capacity(line.len() + 1);
    if len > 0
        && !ends_with_newline(&mut file, len)
            .await
            .map_err(|source| io_error(path, source))?
    {
        record.push('\n');
    }
    record.push_str(line);

    if let Err(source) = write_record(&mut file, record.as_bytes()).await {
        if let Err(e) = file.set_len(len).await {
            tracing::warn!(path = %path.display(), error = %e, "could not roll back partial record");
        }
        return Err(io_error(path, source));
    }
    Ok(())
}

async fn ends_with_newline(file: &mut tokio::fs::File, len: u64) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn write_record(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn append(&self, message: Message) -> Result<MessageId, StoreError> {
        let id = message.id.clone();
        let line = encode_line(&message, MESSAGES_FILE)?;

        let _guard = self.write_lock.lock().await;
        if self.messages.contains(&id) {
            return Ok(id);
        }
        append_line(&self.dir.join(MESSAGES_FILE), &line).await?;
        self.messages.insert(message);
        Ok(id)
    }

    async fn subscribe(&self, limit: usize) -> Result<Subscription, StoreError> {
        Ok(self.messages.subscribe(limit))
    }
}

#[async_trait]
impl AuditLog for FileStore {
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let line = encode_line(&entry, AUDIT_FILE)?;

        let _guard = self.write_lock.lock().await;
        append_line(&self.dir.join(AUDIT_FILE), &line).await?;
        self.audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }

    async fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .audit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[async_trait]
impl KnowledgeStore for FileStore {
    async fn add_knowledge(&self, item: KnowledgeItem) -> Result<KnowledgeId, StoreError> {
        let mut items = self.knowledge.lock().await;
        let id = item.id.clone();
        let mut next = items.clone();
        next.push(item);
        self.persist_knowledge(&next).await?;
        *items = next;
        Ok(id)
    }

    async fn update_knowledge(
        &self,
        id: &KnowledgeId,
        patch: KnowledgePatch,
    ) -> Result<KnowledgeItem, StoreError> {
        let mut items = self.knowledge.lock().await;
        let mut next = items.clone();
        let item = next
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        patch.apply(item);
        let updated = item.clone();
        self.persist_knowledge(&next).await?;
        *items = next;
        Ok(updated)
    }

    async fn delete_knowledge(&self, id: &KnowledgeId) -> Result<(), StoreError> {
        let mut items = self.knowledge.lock().await;
        let next: Vec<_> = items.iter().filter(|item| &item.id != id).cloned().collect();
        if next.len() == items.len() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        self.persist_knowledge(&next).await?;
        *items = next;
        Ok(())
    }

    async fn list_knowledge(&self) -> Result<Vec<KnowledgeItem>, StoreError> {
        Ok(self.knowledge.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cost, ModelId, TokenUsage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let first = Message::user("hello");
        let second = Message::assistant("hi there");

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.append(first.clone()).await.unwrap();
            store.append(second.clone()).await.unwrap();
            // Duplicate append must not write a second line
            store.append(first.clone()).await.unwrap();
        }

        let contents = fs::read_to_string(dir.path().join(MESSAGES_FILE)).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let store = FileStore::open(dir.path()).await.unwrap();
        let mut sub = store.subscribe(10).await.unwrap();
        let snapshot = sub.next_snapshot().await.unwrap();
        assert_eq!(snapshot, vec![first, second]);
    }

    #[tokio::test]
    async fn test_unreadable_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let good = Message::user("kept");
        let line = serde_json::to_string(&good).unwrap();
        fs::write(
            dir.path().join(MESSAGES_FILE),
            format!("{line}\n\nnot json\n{{\"role\":\"user\"}}\n"),
        )
        .unwrap();

        let store = FileStore::open(dir.path()).await.unwrap();
        let mut sub = store.subscribe(10).await.unwrap();
        assert_eq!(sub.next_snapshot().await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn test_append_after_torn_line_keeps_new_record() {
        let dir = TempDir::new().unwrap();
        let kept = Message::user("kept");
        let line = serde_json::to_string(&kept).unwrap();
        fs::write(
            dir.path().join(MESSAGES_FILE),
            format!("{line}\n{{\"id\":\"torn"),
        )
        .unwrap();

        let added = Message::assistant("written after the crash");
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.append(added.clone()).await.unwrap();
        }

        let contents = fs::read_to_string(dir.path().join(MESSAGES_FILE)).unwrap();
        assert!(contents.ends_with('\n'));
        assert_eq!(contents.lines().count(), 3);

        let store = FileStore::open(dir.path()).await.unwrap();
        let mut sub = store.subscribe(10).await.unwrap();
        assert_eq!(sub.next_snapshot().await.unwrap(), vec![kept, added]);
    }

    #[tokio::test]
    async fn test_audit_log_is_persisted() {
        let dir = TempDir::new().unwrap();
        let entry = AuditEntry::success(
            ModelId::from("gemini-1.5-pro"),
            Cost::ZERO,
            TokenUsage::default(),
            12,
        );

        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.append_audit(entry.clone()).await.unwrap();
        }

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.audit_entries().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_knowledge_crud_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let keep = store
            .add_knowledge(KnowledgeItem::new("Keep", "kept"))
            .await
            .unwrap();
        let removed = store
            .add_knowledge(KnowledgeItem::new("Drop", "dropped"))
            .await
            .unwrap();
        store
            .update_knowledge(
                &keep,
                KnowledgePatch {
                    title: None,
                    content: Some("edited".into()),
                },
            )
            .await
            .unwrap();
        store.delete_knowledge(&removed).await.unwrap();
        assert!(matches!(
            store
                .update_knowledge(&removed, KnowledgePatch::default())
                .await,
            Err(StoreError::NotFound { .. })
        ));
        drop(store);

        let reopened = FileStore::open(dir.path()).await.unwrap();
        let items = reopened.list_knowledge().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, keep);
        assert_eq!(items[0].content, "edited");
        assert!(!dir.path().join(format!("{KNOWLEDGE_FILE}.tmp")).exists());
    }
}
