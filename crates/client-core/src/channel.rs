use tokio::sync::broadcast;

use crate::types::ClientEvent;

/// Broadcast event stream handed to UI subscribers.
pub type EventStream = broadcast::Receiver<ClientEvent>;

/// Fan-out bus for [`ClientEvent`] notifications.
///
/// Emission is best-effort; lagged subscribers are handled by `broadcast`.
#[derive(Clone, Debug)]
pub struct EventBus {
    event_tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(buffer.max(1));
        Self { event_tx }
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoomSyncState;

    #[tokio::test]
    async fn fans_out_events_to_all_subscribers() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(ClientEvent::RoomStateChanged {
            room_id: 3,
            state: RoomSyncState::Loading,
        });

        let event_a = a.recv().await.expect("subscriber a should receive event");
        let event_b = b.recv().await.expect("subscriber b should receive event");
        assert_eq!(event_a, event_b);
    }

    #[test]
    fn emitting_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        bus.emit(ClientEvent::RoomListUpdated { rooms: Vec::new() });
    }
}
