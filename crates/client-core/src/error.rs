use thiserror::Error;

use crate::types::{RoomId, RoomSyncState};

/// Client error taxonomy shared across the workspace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No valid session; the caller must log in first.
    #[error("not logged in")]
    Unauthorized,
    /// Outgoing message failed validation. User-correctable.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Room name failed validation on create.
    #[error("room name must not be empty")]
    InvalidRoomName,
    /// Transient transport failure. Retried only by the controller's
    /// backoff policy, never by the send path.
    #[error("network failure: {0}")]
    Network(String),
    /// Retry budget exhausted; the room stays unavailable until reopened.
    #[error("room {room_id} unavailable after {attempts} attempts")]
    PersistentFailure {
        /// Room that exhausted its retries.
        room_id: RoomId,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Operation requires the room to be open.
    #[error("room {0} is not open")]
    RoomNotOpen(RoomId),
    /// A lifecycle action was applied in a state that does not allow it.
    #[error("cannot run '{action}' while room is in state {state:?}")]
    InvalidTransition {
        /// State the room was in.
        state: RoomSyncState,
        /// Action label, stable for logs and tests.
        action: &'static str,
    },
}

impl ChatError {
    /// True when the controller's backoff policy may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Map an HTTP response status to the client error taxonomy.
pub fn classify_status(status: u16, detail: impl Into<String>) -> ChatError {
    match status {
        401 | 403 => ChatError::Unauthorized,
        408 | 429 => ChatError::Network(detail.into()),
        400..=499 => ChatError::InvalidMessage(detail.into()),
        _ => ChatError::Network(detail.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses_into_taxonomy() {
        assert_eq!(classify_status(401, "denied"), ChatError::Unauthorized);
        assert_eq!(classify_status(403, "denied"), ChatError::Unauthorized);
        assert_eq!(
            classify_status(400, "too long"),
            ChatError::InvalidMessage("too long".to_owned())
        );
        assert_eq!(
            classify_status(429, "slow down"),
            ChatError::Network("slow down".to_owned())
        );
        assert_eq!(
            classify_status(503, "boom"),
            ChatError::Network("boom".to_owned())
        );
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(ChatError::Network("timeout".into()).is_retryable());
        assert!(!ChatError::Unauthorized.is_retryable());
        assert!(!ChatError::InvalidMessage("empty".into()).is_retryable());
        assert!(
            !ChatError::PersistentFailure {
                room_id: 1,
                attempts: 5
            }
            .is_retryable()
        );
    }
}
