use crate::{error::ChatError, types::RoomSyncState};

/// Per-room lifecycle state machine.
///
/// Owned exclusively by the room's synchronization controller; every
/// transition is driven from that task.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    state: RoomSyncState,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self {
            state: RoomSyncState::Idle,
        }
    }
}

impl RoomStateMachine {
    pub fn state(&self) -> RoomSyncState {
        self.state
    }

    /// `Idle -> Loading`: backlog fetch and live subscription start together.
    pub fn open(&mut self) -> Result<RoomSyncState, ChatError> {
        self.transition_from(&[RoomSyncState::Idle], RoomSyncState::Loading, "open")
    }

    /// `Loading -> Live`: backlog merged into the store.
    pub fn history_done(&mut self) -> Result<RoomSyncState, ChatError> {
        self.transition_from(&[RoomSyncState::Loading], RoomSyncState::Live, "history_done")
    }

    /// `Live -> Reconnecting`: live feed dropped.
    pub fn feed_disconnected(&mut self) -> Result<RoomSyncState, ChatError> {
        self.transition_from(
            &[RoomSyncState::Live],
            RoomSyncState::Reconnecting,
            "feed_disconnected",
        )
    }

    /// `Reconnecting -> Live`: resubscribed; gap-fill runs before this.
    pub fn resubscribed(&mut self) -> Result<RoomSyncState, ChatError> {
        self.transition_from(
            &[RoomSyncState::Reconnecting],
            RoomSyncState::Live,
            "resubscribed",
        )
    }

    /// Any state `-> Closed`. Terminal; repeated closes are a no-op.
    pub fn close(&mut self) -> RoomSyncState {
        self.state = RoomSyncState::Closed;
        self.state
    }

    fn transition_from(
        &mut self,
        expected: &[RoomSyncState],
        next: RoomSyncState,
        action: &'static str,
    ) -> Result<RoomSyncState, ChatError> {
        if !expected.contains(&self.state) {
            return Err(ChatError::InvalidTransition {
                state: self.state,
                action,
            });
        }
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_happy_path_transitions() {
        let mut sm = RoomStateMachine::default();
        assert_eq!(sm.state(), RoomSyncState::Idle);

        sm.open().expect("open must work");
        assert_eq!(sm.state(), RoomSyncState::Loading);

        sm.history_done().expect("history_done must work");
        assert_eq!(sm.state(), RoomSyncState::Live);

        sm.feed_disconnected().expect("feed_disconnected must work");
        assert_eq!(sm.state(), RoomSyncState::Reconnecting);

        sm.resubscribed().expect("resubscribed must work");
        assert_eq!(sm.state(), RoomSyncState::Live);

        assert_eq!(sm.close(), RoomSyncState::Closed);
    }

    #[test]
    fn rejects_history_done_before_open() {
        let mut sm = RoomStateMachine::default();
        let err = sm
            .history_done()
            .expect_err("history_done from Idle should fail");
        assert_eq!(
            err,
            ChatError::InvalidTransition {
                state: RoomSyncState::Idle,
                action: "history_done",
            }
        );
    }

    #[test]
    fn rejects_resubscribed_while_live() {
        let mut sm = RoomStateMachine::default();
        sm.open().expect("open must work");
        sm.history_done().expect("history_done must work");

        let err = sm
            .resubscribed()
            .expect_err("resubscribed from Live should fail");
        assert_eq!(
            err,
            ChatError::InvalidTransition {
                state: RoomSyncState::Live,
                action: "resubscribed",
            }
        );
    }

    #[test]
    fn close_is_reachable_from_every_state() {
        let mut fresh = RoomStateMachine::default();
        assert_eq!(fresh.close(), RoomSyncState::Closed);

        let mut loading = RoomStateMachine::default();
        loading.open().expect("open must work");
        assert_eq!(loading.close(), RoomSyncState::Closed);

        let mut reconnecting = RoomStateMachine::default();
        reconnecting.open().expect("open must work");
        reconnecting.history_done().expect("history_done must work");
        reconnecting
            .feed_disconnected()
            .expect("feed_disconnected must work");
        assert_eq!(reconnecting.close(), RoomSyncState::Closed);
        // Closing twice stays terminal.
        assert_eq!(reconnecting.close(), RoomSyncState::Closed);
    }
}
