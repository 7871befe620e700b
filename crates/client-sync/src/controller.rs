use std::{pin::pin, sync::Arc};

use client_core::{ChatError, ClientEvent, RetryPolicy, RoomStateMachine};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    history,
    room::RoomShared,
    traits::{ChatApi, FeedEvent, FeedSubscription, LiveFeed},
};

/// Collaborators and tuning shared by all room controllers.
pub(crate) struct ControllerContext {
    pub(crate) api: Arc<dyn ChatApi>,
    pub(crate) feed: Arc<dyn LiveFeed>,
    pub(crate) policy: RetryPolicy,
}

/// Spawn the per-room synchronization task.
pub(crate) fn spawn(ctx: ControllerContext, shared: Arc<RoomShared>) -> JoinHandle<()> {
    tokio::spawn(run(ctx, shared))
}

/// Per-room sync loop: open the live subscription and the backlog fetch
/// together, merge both into the store, then keep pumping the feed and
/// reconnecting (with gap-fill) until the room closes.
async fn run(ctx: ControllerContext, shared: Arc<RoomShared>) {
    let mut lifecycle = RoomStateMachine::default();
    if let Ok(state) = lifecycle.open() {
        shared.publish_state(state);
    }
    info!(
        room_id = shared.room_id(),
        generation = shared.generation(),
        "room opened"
    );

    let mut sub = match subscribe_with_retry(&*ctx.feed, &shared, ctx.policy).await {
        Ok(sub) => sub,
        Err(err) => return give_up(&shared, &mut lifecycle, err),
    };

    // Feed events arriving while the backlog fetch is in flight are
    // inserted immediately, not held; the store's dedup makes the merge
    // order-independent. A disconnect seen here is replayed after the
    // backlog lands.
    let mut pending_disconnect: Option<String> = None;
    {
        let mut backlog = pin!(history::load_backlog_with_retry(
            &*ctx.api,
            &shared,
            ctx.policy
        ));
        loop {
            tokio::select! {
                _ = shared.closed().cancelled() => return finish(&shared, &mut lifecycle),
                result = &mut backlog => {
                    match result {
                        Ok(_) => break,
                        Err(err) => return give_up(&shared, &mut lifecycle, err),
                    }
                }
                event = sub.recv(), if pending_disconnect.is_none() => {
                    match event {
                        Some(FeedEvent::Message(message)) => {
                            shared.insert(message);
                        }
                        Some(FeedEvent::Disconnected { reason }) => {
                            pending_disconnect = Some(reason);
                        }
                        None => pending_disconnect = Some("feed channel dropped".to_owned()),
                    }
                }
            }
        }
    }

    if let Ok(state) = lifecycle.history_done() {
        shared.publish_state(state);
    }
    info!(room_id = shared.room_id(), "backlog loaded; room live");

    if let Some(reason) = pending_disconnect.take() {
        sub = match reconnect(&ctx, &shared, &mut lifecycle, reason).await {
            Some(new_sub) => new_sub,
            None => return,
        };
    }

    loop {
        let disconnect_reason = tokio::select! {
            _ = shared.closed().cancelled() => break,
            event = sub.recv() => {
                match event {
                    Some(FeedEvent::Message(message)) => {
                        shared.insert(message);
                        continue;
                    }
                    Some(FeedEvent::Disconnected { reason }) => reason,
                    None => "feed channel dropped".to_owned(),
                }
            }
        };

        sub = match reconnect(&ctx, &shared, &mut lifecycle, disconnect_reason).await {
            Some(new_sub) => new_sub,
            None => return,
        };
    }

    finish(&shared, &mut lifecycle);
}

/// Resubscribe after a feed drop, then gap-fill: one forced history
/// re-fetch catches messages accepted while disconnected, merged through
/// the same dedup path. `None` means the room is done (closed or gave up).
async fn reconnect(
    ctx: &ControllerContext,
    shared: &RoomShared,
    lifecycle: &mut RoomStateMachine,
    reason: String,
) -> Option<FeedSubscription> {
    warn!(room_id = shared.room_id(), %reason, "live feed disconnected");
    if let Ok(state) = lifecycle.feed_disconnected() {
        shared.publish_state(state);
    }

    let sub = match subscribe_with_retry(&*ctx.feed, shared, ctx.policy).await {
        Ok(sub) => sub,
        Err(err) => {
            give_up(shared, lifecycle, err);
            return None;
        }
    };

    if let Err(err) = history::load_backlog_with_retry(&*ctx.api, shared, ctx.policy).await {
        give_up(shared, lifecycle, err);
        return None;
    }

    if let Ok(state) = lifecycle.resubscribed() {
        shared.publish_state(state);
    }
    info!(room_id = shared.room_id(), "live feed resubscribed");
    Some(sub)
}

/// Live feed subscription wrapped in the controller's backoff policy.
async fn subscribe_with_retry(
    feed: &dyn LiveFeed,
    shared: &RoomShared,
    policy: RetryPolicy,
) -> Result<FeedSubscription, ChatError> {
    let mut attempt: u32 = 0;
    loop {
        if shared.closed().is_cancelled() {
            return Err(ChatError::RoomNotOpen(shared.room_id()));
        }

        match feed.subscribe(shared.room_id()).await {
            Ok(sub) => return Ok(sub),
            Err(err) if err.is_retryable() => {
                attempt = attempt.saturating_add(1);
                if policy.exhausted(attempt) {
                    warn!(
                        room_id = shared.room_id(),
                        attempts = attempt,
                        error = %err,
                        "feed resubscription retries exhausted"
                    );
                    return Err(ChatError::PersistentFailure {
                        room_id: shared.room_id(),
                        attempts: attempt,
                    });
                }

                let delay = policy.jittered_delay_for_attempt(attempt - 1);
                debug!(
                    room_id = shared.room_id(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "feed subscription failed; backing off"
                );
                tokio::select! {
                    _ = shared.closed().cancelled() => {
                        return Err(ChatError::RoomNotOpen(shared.room_id()));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Terminal path for retry exhaustion or non-retryable failures: surface
/// `RoomUnavailable` and close the room. Reopening is the manual retry.
fn give_up(shared: &RoomShared, lifecycle: &mut RoomStateMachine, err: ChatError) {
    if !shared.closed().is_cancelled() {
        error!(room_id = shared.room_id(), error = %err, "room sync gave up");
        shared.events().emit(ClientEvent::RoomUnavailable {
            room_id: shared.room_id(),
            error: err,
        });
        shared.close();
    }
    shared.publish_state(lifecycle.close());
}

/// Terminal path for a user-initiated close.
fn finish(shared: &RoomShared, lifecycle: &mut RoomStateMachine) {
    shared.publish_state(lifecycle.close());
    debug!(
        room_id = shared.room_id(),
        generation = shared.generation(),
        "room closed"
    );
}
