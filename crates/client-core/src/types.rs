use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Server-assigned message identifier. Monotonic per room.
pub type MessageId = u64;
/// Server-assigned room identifier.
pub type RoomId = u64;
/// Server-assigned user identifier.
pub type UserId = u64;

/// A single chat message as held by the transcript store.
///
/// `id` is `None` for an optimistic entry that the server has not
/// acknowledged yet; such entries always carry a `client_tag`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned id, absent until acknowledged.
    pub id: Option<MessageId>,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author user id.
    pub author_id: UserId,
    /// Message text (1..=100 chars after trimming).
    pub body: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    ///
    /// Client-local for optimistic entries, server-assigned once confirmed.
    pub created_at_ms: u64,
    /// Locally-generated correlation id for optimistic sends.
    pub client_tag: Option<String>,
}

impl Message {
    /// Whether the server has acknowledged this message.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }
}

/// Room metadata. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    /// Server-assigned room id.
    pub id: RoomId,
    /// Non-empty display name.
    pub name: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    pub created_at_ms: u64,
}

/// Authenticated user identity supplied by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user id, used to tag outgoing messages.
    pub user_id: UserId,
    /// Username, for display only.
    pub username: String,
}

/// Per-room synchronization lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomSyncState {
    /// Room is known but not opened.
    Idle,
    /// Backlog fetch in flight; live feed may already be streaming.
    Loading,
    /// Backlog merged and live feed streaming.
    Live,
    /// Live feed dropped; resubscription attempts running.
    Reconnecting,
    /// Room closed and store discarded. Terminal.
    Closed,
}

/// Cross-room notifications emitted to event bus subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A message entered (or replaced an entry in) a room transcript.
    MessageAdded {
        /// Target room.
        room_id: RoomId,
        /// The inserted message, confirmed or optimistic.
        message: Message,
    },
    /// A room's sync lifecycle state changed.
    RoomStateChanged {
        /// Target room.
        room_id: RoomId,
        /// New state.
        state: RoomSyncState,
    },
    /// Latest full room list snapshot.
    RoomListUpdated {
        /// Rooms in server order.
        rooms: Vec<Room>,
    },
    /// Retry budget exhausted; the room is closed until reopened manually.
    RoomUnavailable {
        /// Target room.
        room_id: RoomId,
        /// Terminal error, usually `ChatError::PersistentFailure`.
        error: ChatError,
    },
}
