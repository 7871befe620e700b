use std::sync::{Arc, Mutex, MutexGuard};

use client_core::{
    ClientEvent, EventBus, InsertOutcome, Message, MessageStore, RoomId, RoomSyncState,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Shared per-room handle: the transcript store behind its mutex, the
/// observation channels, and the close guard.
///
/// The store is written only by the room's controller task and the send
/// coordinator; the `closed` token is checked before every mutation so no
/// stale callback can touch a closed room's store. Reopening a room builds
/// a fresh handle under a new generation.
#[derive(Debug)]
pub(crate) struct RoomShared {
    room_id: RoomId,
    generation: u64,
    store: Mutex<MessageStore>,
    transcript_tx: watch::Sender<Vec<Message>>,
    state_tx: watch::Sender<RoomSyncState>,
    closed: CancellationToken,
    events: EventBus,
}

impl RoomShared {
    pub(crate) fn new(room_id: RoomId, generation: u64, events: EventBus) -> Arc<Self> {
        let (transcript_tx, _) = watch::channel(Vec::new());
        let (state_tx, _) = watch::channel(RoomSyncState::Idle);
        Arc::new(Self {
            room_id,
            generation,
            store: Mutex::new(MessageStore::new()),
            transcript_tx,
            state_tx,
            closed: CancellationToken::new(),
            events,
        })
    }

    pub(crate) fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mark the room closed. Mutations observed after this point are
    /// silently dropped; the controller task unwinds on the same token.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) fn transcript_rx(&self) -> watch::Receiver<Vec<Message>> {
        self.transcript_tx.subscribe()
    }

    pub(crate) fn state_rx(&self) -> watch::Receiver<RoomSyncState> {
        self.state_tx.subscribe()
    }

    /// Ordered snapshot of the current transcript.
    pub(crate) fn transcript(&self) -> Vec<Message> {
        self.lock_store().messages()
    }

    /// Insert a message, unless the room is already closed (`None`).
    ///
    /// Effective insertions publish a fresh transcript snapshot and emit
    /// [`ClientEvent::MessageAdded`].
    pub(crate) fn insert(&self, message: Message) -> Option<InsertOutcome> {
        if self.closed.is_cancelled() {
            trace!(
                room_id = self.room_id,
                generation = self.generation,
                "dropping insert for closed room"
            );
            return None;
        }

        let (outcome, snapshot) = {
            let mut store = self.lock_store();
            let outcome = store.insert(message.clone());
            let snapshot = match outcome {
                InsertOutcome::Added | InsertOutcome::Replaced => Some(store.messages()),
                InsertOutcome::DuplicateIgnored => None,
            };
            (outcome, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.transcript_tx.send_replace(snapshot);
            self.events.emit(ClientEvent::MessageAdded {
                room_id: self.room_id,
                message,
            });
        }
        Some(outcome)
    }

    /// Remove a pending optimistic entry, unless the room is closed.
    pub(crate) fn remove_pending(&self, client_tag: &str) -> Option<Message> {
        if self.closed.is_cancelled() {
            return None;
        }

        let (removed, snapshot) = {
            let mut store = self.lock_store();
            let removed = store.remove_pending(client_tag);
            let snapshot = removed.as_ref().map(|_| store.messages());
            (removed, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.transcript_tx.send_replace(snapshot);
        }
        removed
    }

    /// Publish a lifecycle state to watchers and the event bus.
    pub(crate) fn publish_state(&self, state: RoomSyncState) {
        self.state_tx.send_replace(state);
        self.events.emit(ClientEvent::RoomStateChanged {
            room_id: self.room_id,
            state,
        });
    }

    fn lock_store(&self) -> MutexGuard<'_, MessageStore> {
        // The store is plain data; recover from a poisoned lock.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, created_at_ms: u64) -> Message {
        Message {
            id: Some(id),
            room_id: 1,
            author_id: 2,
            body: "hello".to_owned(),
            created_at_ms,
            client_tag: None,
        }
    }

    #[test]
    fn effective_inserts_publish_transcript_snapshots() {
        let shared = RoomShared::new(1, 1, EventBus::new(8));
        let rx = shared.transcript_rx();

        assert_eq!(shared.insert(message(1, 100)), Some(InsertOutcome::Added));
        assert_eq!(rx.borrow().len(), 1);

        // Duplicate changes nothing and publishes nothing.
        assert_eq!(
            shared.insert(message(1, 100)),
            Some(InsertOutcome::DuplicateIgnored)
        );
        assert_eq!(rx.borrow().len(), 1);
    }

    #[test]
    fn closed_rooms_drop_mutations() {
        let shared = RoomShared::new(1, 1, EventBus::new(8));
        shared.insert(message(1, 100));
        shared.close();

        assert_eq!(shared.insert(message(2, 200)), None);
        assert_eq!(shared.transcript().len(), 1);
        assert!(shared.remove_pending("tag").is_none());
    }

    #[tokio::test]
    async fn inserts_emit_message_added_events() {
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let shared = RoomShared::new(7, 1, bus);

        shared.insert(message(9, 100));

        match events.recv().await.expect("event should arrive") {
            ClientEvent::MessageAdded { room_id, message } => {
                assert_eq!(room_id, 7);
                assert_eq!(message.id, Some(9));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
