use std::collections::{BTreeMap, HashMap};

use crate::types::{Message, MessageId};

/// Outcome of pushing one message through [`MessageStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was not present and is now part of the transcript.
    Added,
    /// A pending optimistic entry was replaced in place by its confirmed
    /// echo; the transcript size did not change.
    Replaced,
    /// The message (by server id, or by client tag for pending entries) was
    /// already present. No-op.
    DuplicateIgnored,
}

/// Ordering identity of a transcript entry.
///
/// Confirmed entries sort before pending ones at equal timestamps; confirmed
/// entries tie-break on the monotonic server id, pending ones on their tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum EntryId {
    Confirmed(MessageId),
    Pending(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey {
    created_at_ms: u64,
    identity: EntryId,
}

/// Ordered, deduplicated in-memory transcript for a single room.
///
/// All insertion paths (backlog fetch, live feed, optimistic sends) go
/// through [`insert`](Self::insert), which makes the backlog/live merge
/// commutative: the final transcript does not depend on arrival order.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: BTreeMap<EntryKey, Message>,
    by_id: HashMap<MessageId, EntryKey>,
    by_tag: HashMap<String, EntryKey>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transcript entries, pending included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the transcript holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a confirmed message with this server id is present.
    pub fn contains(&self, id: MessageId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Iterate entries in `(created_at_ms, id)` order.
    ///
    /// The iterator reflects store contents at call time, not a live view.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values()
    }

    /// Ordered snapshot of the current transcript.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.values().cloned().collect()
    }

    /// Insert one message, deduplicating against existing entries.
    ///
    /// A confirmed message whose `client_tag` matches a pending entry
    /// replaces that entry in place; its ordering key switches from the
    /// local timestamp to the server one at that moment. A message carrying
    /// neither a server id nor a client tag cannot exist in the protocol and
    /// is ignored.
    pub fn insert(&mut self, message: Message) -> InsertOutcome {
        match message.id {
            Some(id) => {
                if self.by_id.contains_key(&id) {
                    // The live-feed echo landed before the send ack; the
                    // pending twin still has to go.
                    if let Some(tag) = message.client_tag.as_deref() {
                        self.remove_pending(tag);
                    }
                    return InsertOutcome::DuplicateIgnored;
                }

                let replaced_pending = message
                    .client_tag
                    .as_deref()
                    .and_then(|tag| self.remove_pending(tag))
                    .is_some();

                let key = EntryKey {
                    created_at_ms: message.created_at_ms,
                    identity: EntryId::Confirmed(id),
                };
                self.by_id.insert(id, key.clone());
                self.entries.insert(key, message);

                if replaced_pending {
                    InsertOutcome::Replaced
                } else {
                    InsertOutcome::Added
                }
            }
            None => {
                let Some(tag) = message.client_tag.clone() else {
                    return InsertOutcome::DuplicateIgnored;
                };
                if self.by_tag.contains_key(&tag) {
                    return InsertOutcome::DuplicateIgnored;
                }

                let key = EntryKey {
                    created_at_ms: message.created_at_ms,
                    identity: EntryId::Pending(tag.clone()),
                };
                self.by_tag.insert(tag, key.clone());
                self.entries.insert(key, message);
                InsertOutcome::Added
            }
        }
    }

    /// Remove a pending optimistic entry after a failed send.
    pub fn remove_pending(&mut self, client_tag: &str) -> Option<Message> {
        let key = self.by_tag.remove(client_tag)?;
        self.entries.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: MessageId, created_at_ms: u64, body: &str) -> Message {
        Message {
            id: Some(id),
            room_id: 7,
            author_id: 1,
            body: body.to_owned(),
            created_at_ms,
            client_tag: None,
        }
    }

    fn pending(tag: &str, created_at_ms: u64, body: &str) -> Message {
        Message {
            id: None,
            room_id: 7,
            author_id: 1,
            body: body.to_owned(),
            created_at_ms,
            client_tag: Some(tag.to_owned()),
        }
    }

    fn ids(store: &MessageStore) -> Vec<Option<MessageId>> {
        store.iter().map(|m| m.id).collect()
    }

    #[test]
    fn double_insert_of_same_server_id_is_idempotent() {
        let mut store = MessageStore::new();
        assert_eq!(store.insert(confirmed(1, 100, "hi")), InsertOutcome::Added);
        assert_eq!(
            store.insert(confirmed(1, 100, "hi")),
            InsertOutcome::DuplicateIgnored
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn orders_by_timestamp_then_id_regardless_of_insertion_order() {
        let mut store = MessageStore::new();
        store.insert(confirmed(3, 300, "third"));
        store.insert(confirmed(1, 100, "first"));
        store.insert(confirmed(2, 200, "second"));

        assert_eq!(ids(&store), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn equal_timestamps_tie_break_on_server_id() {
        let mut store = MessageStore::new();
        store.insert(confirmed(9, 500, "later id"));
        store.insert(confirmed(4, 500, "earlier id"));

        assert_eq!(ids(&store), vec![Some(4), Some(9)]);
    }

    #[test]
    fn backlog_and_live_merge_is_commutative() {
        let batch = [
            confirmed(1, 100, "a"),
            confirmed(2, 150, "b"),
            confirmed(3, 175, "c"),
            confirmed(4, 200, "d"),
        ];

        // Live feed raced ahead of the backlog fetch.
        let mut live_first = MessageStore::new();
        live_first.insert(batch[3].clone());
        live_first.insert(batch[2].clone());
        for message in &batch {
            live_first.insert(message.clone());
        }

        let mut backlog_first = MessageStore::new();
        for message in &batch {
            backlog_first.insert(message.clone());
        }
        backlog_first.insert(batch[3].clone());
        backlog_first.insert(batch[2].clone());

        assert_eq!(live_first.messages(), backlog_first.messages());
        assert_eq!(live_first.len(), 4);
    }

    #[test]
    fn confirmed_echo_replaces_pending_entry_in_place() {
        let mut store = MessageStore::new();
        assert_eq!(
            store.insert(pending("tag-1", 900, "hi")),
            InsertOutcome::Added
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().map(|m| m.id), Some(None));

        let mut echo = confirmed(42, 950, "hi");
        echo.client_tag = Some("tag-1".to_owned());
        assert_eq!(store.insert(echo), InsertOutcome::Replaced);

        assert_eq!(store.len(), 1);
        let entry = store.iter().next().expect("entry should exist");
        assert_eq!(entry.id, Some(42));
        // Ordering key switched to the server timestamp.
        assert_eq!(entry.created_at_ms, 950);
    }

    #[test]
    fn ack_after_feed_echo_clears_the_pending_twin() {
        let mut store = MessageStore::new();
        store.insert(pending("tag-1", 900, "hi"));
        // The feed delivers the confirmed copy first, without the tag.
        store.insert(confirmed(42, 950, "hi"));
        assert_eq!(store.len(), 2);

        // The send ack then arrives carrying both id and tag.
        let mut ack = confirmed(42, 950, "hi");
        ack.client_tag = Some("tag-1".to_owned());
        assert_eq!(store.insert(ack), InsertOutcome::DuplicateIgnored);

        assert_eq!(store.len(), 1);
        assert_eq!(ids(&store), vec![Some(42)]);
    }

    #[test]
    fn duplicate_pending_tag_is_ignored() {
        let mut store = MessageStore::new();
        assert_eq!(
            store.insert(pending("tag-1", 900, "hi")),
            InsertOutcome::Added
        );
        assert_eq!(
            store.insert(pending("tag-1", 905, "hi")),
            InsertOutcome::DuplicateIgnored
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_pending_rolls_back_failed_send() {
        let mut store = MessageStore::new();
        store.insert(confirmed(1, 100, "kept"));
        store.insert(pending("tag-1", 900, "doomed"));

        let removed = store.remove_pending("tag-1").expect("entry should exist");
        assert_eq!(removed.body, "doomed");
        assert_eq!(store.len(), 1);
        assert!(store.remove_pending("tag-1").is_none());
    }

    #[test]
    fn pending_entries_sort_by_local_timestamp_among_confirmed() {
        let mut store = MessageStore::new();
        store.insert(confirmed(1, 100, "old"));
        store.insert(pending("tag-1", 150, "mine"));
        store.insert(confirmed(2, 200, "new"));

        let bodies: Vec<&str> = store.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["old", "mine", "new"]);
    }
}
