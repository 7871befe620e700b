//! Synchronization core shared between the chatter runtime and its frontends.
//!
//! This crate holds the transcript store, the per-room lifecycle model, the
//! retry/backoff policy, validation rules, and common error/event
//! abstractions. It performs no I/O.

/// Broadcast event bus for UI-facing notifications.
pub mod channel;
/// Client error taxonomy and HTTP status classification.
pub mod error;
/// Backoff policy used by history retries and feed resubscription.
pub mod retry;
/// Per-room synchronization lifecycle state machine.
pub mod state_machine;
/// Ordered, deduplicated transcript store.
pub mod store;
/// Domain types shared across the workspace.
pub mod types;
/// Outgoing message and room-name validation.
pub mod validation;

pub use channel::{EventBus, EventStream};
pub use error::{ChatError, classify_status};
pub use retry::RetryPolicy;
pub use state_machine::RoomStateMachine;
pub use store::{InsertOutcome, MessageStore};
pub use types::{
    ClientEvent, Message, MessageId, Room, RoomId, RoomSyncState, Session, UserId,
};
pub use validation::{MAX_MESSAGE_LEN, validate_body, validate_room_name};
