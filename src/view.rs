//! Client-side conversation view.
//!
//! Messages are shown as soon as they are created (`LocalOnly`) and promoted
//! to `Confirmed` when the store acknowledges them or a snapshot contains
//! them. Reconciliation is keyed by the client-generated message id.

use crate::types::{ChatTurn, ConversationEntry, Message, MessageId, MessageStatus, Role};
use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct ConversationView {
    entries: Vec<ConversationEntry>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `message` immediately, before any store acknowledgement
    pub fn push_local(&mut self, message: Message) {
        if self.position(&message.id).is_some() {
            return;
        }
        let entry = ConversationEntry::local(message);
        let at = self
            .entries
            .partition_point(|e| e.message.created_at <= entry.message.created_at);
        self.entries.insert(at, entry);
    }

    /// Mark `id` as stored. Returns `false` if the view does not hold it.
    pub fn confirm(&mut self, id: &MessageId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries[index].status = MessageStatus::Confirmed;
                true
            }
            None => false,
        }
    }

    /// Replace the view with a store snapshot.
    ///
    /// Local-only entries the snapshot does not contain are kept, and so are
    /// confirmed entries newer than the snapshot's last message (the snapshot
    /// was taken before they landed). Older confirmed entries missing from the
    /// snapshot have left the window and are dropped.
    pub fn reconcile(&mut self, snapshot: Vec<Message>) {
        let ids: HashSet<&MessageId> = snapshot.iter().map(|m| &m.id).collect();
        let horizon = snapshot.last().map(|m| m.created_at);

        let extras: Vec<ConversationEntry> = self
            .entries
            .iter()
            .filter(|entry| !ids.contains(&entry.message.id))
            .filter(|entry| match (entry.status, horizon) {
                (MessageStatus::LocalOnly, _) => true,
                (MessageStatus::Confirmed, Some(horizon)) => entry.message.created_at >= horizon,
                (MessageStatus::Confirmed, None) => false,
            })
            .cloned()
            .collect();

        let mut merged = Vec::with_capacity(snapshot.len() + extras.len());
        let mut extras = extras.into_iter().peekable();
        for message in snapshot {
            while let Some(extra) = extras.next_if(|e| e.message.created_at < message.created_at) {
                merged.push(extra);
            }
            merged.push(ConversationEntry::confirmed(message));
        }
        merged.extend(extras);

        self.entries = merged;
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// Conversation turns for the provider. Local system notes (error
    /// messages) are never sent back to the model.
    pub fn history(&self) -> Vec<ChatTurn> {
        self.entries
            .iter()
            .filter(|e| e.message.role != Role::System)
            .map(|e| ChatTurn::from(&e.message))
            .collect()
    }

    pub fn get(&self, id: &MessageId) -> Option<&ConversationEntry> {
        self.position(id).map(|index| &self.entries[index])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|e| &e.message.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(content: &str, offset: i64) -> Message {
        let mut message = Message::user(content);
        message.created_at = Utc::now() + Duration::seconds(offset);
        message
    }

    fn contents(view: &ConversationView) -> Vec<&str> {
        view.entries()
            .iter()
            .map(|e| e.message.content.as_str())
            .collect()
    }

    #[test]
    fn test_push_local_then_confirm() {
        let mut view = ConversationView::new();
        let message = Message::user("hello");
        let id = message.id.clone();

        view.push_local(message.clone());
        view.push_local(message);
        assert_eq!(view.len(), 1);
        assert_eq!(view.get(&id).unwrap().status, MessageStatus::LocalOnly);

        assert!(view.confirm(&id));
        assert!(view.get(&id).unwrap().is_confirmed());
        assert!(!view.confirm(&MessageId::generate()));
    }

    #[test]
    fn test_snapshot_promotes_local_entries() {
        let mut view = ConversationView::new();
        let message = at("hello", 0);
        view.push_local(message.clone());

        view.reconcile(vec![message.clone()]);
        assert_eq!(view.len(), 1);
        assert!(view.get(&message.id).unwrap().is_confirmed());
    }

    #[test]
    fn test_unstored_entries_survive_reconcile_in_order() {
        let mut view = ConversationView::new();
        let stored_a = at("a", 0);
        let unstored = at("b", 1);
        let stored_c = at("c", 2);
        view.push_local(unstored.clone());

        view.reconcile(vec![stored_a, stored_c]);
        assert_eq!(contents(&view), ["a", "b", "c"]);
        assert_eq!(
            view.get(&unstored.id).unwrap().status,
            MessageStatus::LocalOnly
        );
    }

    #[test]
    fn test_stale_snapshot_keeps_fresh_confirmed_entries() {
        let mut view = ConversationView::new();
        let old = at("old", 0);
        let fresh = at("fresh", 5);
        view.reconcile(vec![old.clone()]);
        view.push_local(fresh.clone());
        view.confirm(&fresh.id);

        // Snapshot produced before `fresh` was stored
        view.reconcile(vec![old]);
        assert_eq!(contents(&view), ["old", "fresh"]);
    }

    #[test]
    fn test_confirmed_entries_leave_with_the_window() {
        let mut view = ConversationView::new();
        let first = at("first", 0);
        let second = at("second", 1);
        let third = at("third", 2);
        view.reconcile(vec![first, second.clone()]);

        view.reconcile(vec![second, third]);
        assert_eq!(contents(&view), ["second", "third"]);
    }

    #[test]
    fn test_history_skips_system_notes() {
        let mut view = ConversationView::new();
        view.push_local(at("question", 0));
        let mut note = Message::system("Error: timed out");
        note.created_at = Utc::now() + Duration::seconds(1);
        view.push_local(note);

        let history = view.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }
}
