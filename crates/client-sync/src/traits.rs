use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use client_core::{ChatError, Message, Room, RoomId, Session, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Authentication collaborator: supplies the current session.
pub trait AuthProvider: Send + Sync + 'static {
    /// Current session, when a user is logged in.
    fn session(&self) -> Option<Session>;

    /// Whether a user is logged in.
    fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }
}

/// In-process [`AuthProvider`] backed by a shared slot.
///
/// The app stores the session obtained from the login endpoint here;
/// clearing the slot is logout.
#[derive(Clone, Debug, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session after a successful login.
    pub fn set(&self, session: Session) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(session);
        }
    }

    /// Drop the stored session.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }
}

impl AuthProvider for SessionHandle {
    fn session(&self) -> Option<Session> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}

/// Persistence/API collaborator.
///
/// The server re-validates message bodies and room names; client-side
/// validation only fails fast.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// Fetch the persisted message backlog for a room. Single request, no
    /// retries; retry policy belongs to the synchronization controller.
    async fn history(&self, room_id: RoomId) -> Result<Vec<Message>, ChatError>;

    /// Submit a message and return the server-confirmed copy.
    async fn post_message(
        &self,
        room_id: RoomId,
        author_id: UserId,
        body: &str,
    ) -> Result<Message, ChatError>;

    /// List all rooms.
    async fn rooms(&self) -> Result<Vec<Room>, ChatError>;

    /// Create a room and return it.
    async fn create_room(&self, name: &str) -> Result<Room, ChatError>;

    /// Register a new user account.
    async fn register(&self, username: &str, password: &str) -> Result<(), ChatError>;

    /// Authenticate and return the resulting session.
    async fn login(&self, username: &str, password: &str) -> Result<Session, ChatError>;
}

/// One event delivered by a live feed connection.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A newly created message in the subscribed room.
    Message(Message),
    /// The connection dropped. Terminal for this subscription epoch; the
    /// controller decides whether to resubscribe.
    Disconnected {
        /// Transport-supplied reason, for logs.
        reason: String,
    },
}

/// Handle for one live feed connection epoch.
///
/// Dropping the subscription cancels its stop token, which transports use
/// to tear down the underlying connection.
#[derive(Debug)]
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    stop: CancellationToken,
}

impl FeedSubscription {
    pub fn new(events: mpsc::Receiver<FeedEvent>, stop: CancellationToken) -> Self {
        Self { events, stop }
    }

    /// Receive the next feed event. `None` means the transport went away
    /// without sending a disconnect reason.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Push-transport collaborator: per-room new-message subscriptions.
#[async_trait]
pub trait LiveFeed: Send + Sync + 'static {
    /// Open a push subscription for a room. Each server-pushed message is
    /// delivered exactly once per connection epoch; no internal auto-retry.
    async fn subscribe(&self, room_id: RoomId) -> Result<FeedSubscription, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_handle_roundtrip() {
        let handle = SessionHandle::new();
        assert!(!handle.is_authenticated());

        handle.set(Session {
            user_id: 5,
            username: "alice".to_owned(),
        });
        assert!(handle.is_authenticated());
        assert_eq!(handle.session().map(|s| s.user_id), Some(5));

        handle.clear();
        assert_eq!(handle.session(), None);
    }

    #[tokio::test]
    async fn dropping_a_subscription_cancels_its_stop_token() {
        let (_tx, rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let watched = stop.clone();

        let sub = FeedSubscription::new(rx, stop);
        assert!(!watched.is_cancelled());
        drop(sub);
        assert!(watched.is_cancelled());
    }
}
