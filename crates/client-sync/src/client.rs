use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use client_core::{
    ChatError, ClientEvent, EventBus, EventStream, Message, RetryPolicy, Room, RoomId,
    RoomSyncState, Session, validate_room_name,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    controller::{self, ControllerContext},
    room::RoomShared,
    send,
    traits::{AuthProvider, ChatApi, LiveFeed},
};

/// Runtime tuning for [`ChatClient`].
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Backoff policy for history retries and feed resubscription.
    pub retry: RetryPolicy,
    /// Event bus buffer size.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            event_buffer: 256,
        }
    }
}

struct OpenRoom {
    shared: Arc<RoomShared>,
    task: JoinHandle<()>,
}

/// Multi-room chat client facade.
///
/// Owns one synchronization controller per open room; rooms are fully
/// independent. All transcript access goes through the per-room store, so
/// the backlog, the live feed, and locally-authored sends share one
/// deduplicating insertion path.
pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    feed: Arc<dyn LiveFeed>,
    auth: Arc<dyn AuthProvider>,
    events: EventBus,
    rooms: Mutex<HashMap<RoomId, OpenRoom>>,
    next_generation: AtomicU64,
    config: SyncConfig,
}

impl ChatClient {
    pub fn new(api: Arc<dyn ChatApi>, feed: Arc<dyn LiveFeed>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_config(api, feed, auth, SyncConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn ChatApi>,
        feed: Arc<dyn LiveFeed>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            api,
            feed,
            auth,
            events: EventBus::new(config.event_buffer),
            rooms: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            config,
        }
    }

    /// Subscribe to cross-room client events.
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Current session from the auth collaborator.
    pub fn session(&self) -> Option<Session> {
        self.auth.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// Open a room: start its synchronization controller (backlog fetch +
    /// live subscription). Opening an already-open room is a no-op;
    /// reopening a room that closed or gave up starts a fresh generation.
    pub fn open_room(&self, room_id: RoomId) -> Result<(), ChatError> {
        let mut rooms = self.lock_rooms();
        if let Some(existing) = rooms.get(&room_id)
            && !existing.shared.closed().is_cancelled()
        {
            debug!(room_id, "room already open");
            return Ok(());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = RoomShared::new(room_id, generation, self.events.clone());
        let ctx = ControllerContext {
            api: Arc::clone(&self.api),
            feed: Arc::clone(&self.feed),
            policy: self.config.retry,
        };
        let task = controller::spawn(ctx, Arc::clone(&shared));
        rooms.insert(room_id, OpenRoom { shared, task });
        Ok(())
    }

    /// Close a room: cancel its in-flight work, unsubscribe the live feed,
    /// and discard the store.
    pub async fn close_room(&self, room_id: RoomId) -> Result<(), ChatError> {
        let slot = self
            .lock_rooms()
            .remove(&room_id)
            .ok_or(ChatError::RoomNotOpen(room_id))?;

        slot.shared.close();
        if let Err(err) = slot.task.await {
            warn!(room_id, error = %err, "room controller task did not exit cleanly");
        }
        info!(room_id, "room closed");
        Ok(())
    }

    /// Live-updating ordered transcript snapshots for an open room.
    ///
    /// The stream ends when the room closes; reopening the room restarts it.
    pub fn observe(&self, room_id: RoomId) -> Result<watch::Receiver<Vec<Message>>, ChatError> {
        Ok(self.shared(room_id)?.transcript_rx())
    }

    /// Live-updating sync lifecycle state for an open room.
    pub fn observe_state(
        &self,
        room_id: RoomId,
    ) -> Result<watch::Receiver<RoomSyncState>, ChatError> {
        Ok(self.shared(room_id)?.state_rx())
    }

    /// Current sync lifecycle state of an open room.
    pub fn sync_state(&self, room_id: RoomId) -> Result<RoomSyncState, ChatError> {
        Ok(*self.shared(room_id)?.state_rx().borrow())
    }

    /// Ordered transcript snapshot of an open room.
    pub fn transcript(&self, room_id: RoomId) -> Result<Vec<Message>, ChatError> {
        Ok(self.shared(room_id)?.transcript())
    }

    /// Send a message to an open room. Requires a session; the body is
    /// validated client-side before any network traffic. Failed sends roll
    /// back their optimistic entry and are never retried automatically.
    pub async fn send(&self, room_id: RoomId, body: &str) -> Result<Message, ChatError> {
        let shared = self.shared(room_id)?;
        send::send_message(&*self.api, &shared, self.auth.session(), body).await
    }

    /// Fetch the room list and broadcast it to event subscribers.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, ChatError> {
        let rooms = self.api.rooms().await?;
        self.events.emit(ClientEvent::RoomListUpdated {
            rooms: rooms.clone(),
        });
        Ok(rooms)
    }

    /// Create a room. The name is validated client-side and re-validated by
    /// the server.
    pub async fn create_room(&self, name: &str) -> Result<Room, ChatError> {
        let name = validate_room_name(name)?;
        let room = self.api.create_room(&name).await?;
        info!(room_id = room.id, name = %room.name, "room created");
        Ok(room)
    }

    /// Register a new account with the API collaborator.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ChatError> {
        self.api.register(username, password).await
    }

    /// Authenticate against the API collaborator and return the session.
    ///
    /// Session storage stays with the auth collaborator: callers hand the
    /// returned session to their [`crate::SessionHandle`] (or equivalent).
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ChatError> {
        let session = self.api.login(username, password).await?;
        info!(user_id = session.user_id, "login succeeded");
        Ok(session)
    }

    fn shared(&self, room_id: RoomId) -> Result<Arc<RoomShared>, ChatError> {
        let rooms = self.lock_rooms();
        let slot = rooms
            .get(&room_id)
            .ok_or(ChatError::RoomNotOpen(room_id))?;
        if slot.shared.closed().is_cancelled() {
            return Err(ChatError::RoomNotOpen(room_id));
        }
        Ok(Arc::clone(&slot.shared))
    }

    fn lock_rooms(&self) -> MutexGuard<'_, HashMap<RoomId, OpenRoom>> {
        self.rooms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
