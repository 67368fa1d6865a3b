use super::Subscription;
use crate::types::{Message, MessageId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

/// Snapshots buffered per subscriber before the pump waits
const SUBSCRIBER_BUFFER: usize = 16;

struct Slot {
    created_at: DateTime<Utc>,
    seq: u64,
    message: Message,
}

#[derive(Default)]
struct LogState {
    // Sorted by (created_at, seq)
    slots: Vec<Slot>,
    ids: HashSet<MessageId>,
    next_seq: u64,
}

/// Ordered, de-duplicated message collection with change notification.
/// Shared by the store backends.
pub(crate) struct MessageLog {
    state: Mutex<LogState>,
    revision: watch::Sender<u64>,
}

impl MessageLog {
    pub(crate) fn new() -> Arc<Self> {
        let (revision, _) = watch::channel(0);
        Arc::new(Self {
            state: Mutex::new(LogState::default()),
            revision,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains(&self, id: &MessageId) -> bool {
        self.lock().ids.contains(id)
    }

    /// Insert without notifying subscribers; used while loading
    pub(crate) fn load(&self, messages: impl IntoIterator<Item = Message>) {
        let mut state = self.lock();
        for message in messages {
            insert_sorted(&mut state, message);
        }
    }

    /// Insert `message` and wake subscribers. Returns `false` for a duplicate id.
    pub(crate) fn insert(&self, message: Message) -> bool {
        let inserted = insert_sorted(&mut self.lock(), message);
        if inserted {
            self.revision.send_modify(|rev| *rev += 1);
        }
        inserted
    }

    /// The most recent `limit` messages, oldest first
    pub(crate) fn latest(&self, limit: usize) -> Vec<Message> {
        let state = self.lock();
        let start = state.slots.len().saturating_sub(limit);
        state.slots[start..]
            .iter()
            .map(|slot| slot.message.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub(crate) fn subscribe(self: &Arc<Self>, limit: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut changes = self.revision.subscribe();
        let log = Arc::clone(self);

        let pump = tokio::spawn(async move {
            loop {
                // Mark seen before reading so a concurrent insert triggers another round
                changes.borrow_and_update();
                let snapshot = log.latest(limit);
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!(limit, "message subscription ended");
        });

        Subscription::new(rx, pump)
    }
}

fn insert_sorted(state: &mut LogState, message: Message) -> bool {
    if state.ids.contains(&message.id) {
        return false;
    }
    let seq = state.next_seq;
    state.next_seq += 1;
    let created_at = message.created_at;

    // Ties on created_at keep insertion order
    let index = state
        .slots
        .partition_point(|slot| (slot.created_at, slot.seq) <= (created_at, seq));
    state.ids.insert(message.id.clone());
    state.slots.insert(
        index,
        Slot {
            created_at,
            seq,
            message,
        },
    );
    true
}
