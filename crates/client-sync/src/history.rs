use client_core::{ChatError, InsertOutcome, RetryPolicy};
use tracing::{debug, warn};

use crate::{room::RoomShared, traits::ChatApi};

/// One-shot backlog fetch merged into the room store.
///
/// Duplicates against already-live-streamed messages are absorbed by the
/// store's dedup rule, so this may run before, after, or interleaved with
/// live feed insertions. Returns the number of entries actually merged.
pub(crate) async fn load_backlog(
    api: &dyn ChatApi,
    shared: &RoomShared,
) -> Result<usize, ChatError> {
    let backlog = api.history(shared.room_id()).await?;
    let total = backlog.len();

    let mut merged = 0;
    for message in backlog {
        match shared.insert(message) {
            Some(InsertOutcome::Added | InsertOutcome::Replaced) => merged += 1,
            Some(InsertOutcome::DuplicateIgnored) => {}
            // Room closed mid-merge; the remainder is moot.
            None => return Err(ChatError::RoomNotOpen(shared.room_id())),
        }
    }

    debug!(
        room_id = shared.room_id(),
        fetched = total,
        merged,
        "backlog merged"
    );
    Ok(merged)
}

/// Backlog fetch wrapped in the controller's backoff policy.
///
/// Transient failures retry with jittered exponential backoff until the
/// attempt budget is spent; the sleep races the room's close token.
pub(crate) async fn load_backlog_with_retry(
    api: &dyn ChatApi,
    shared: &RoomShared,
    policy: RetryPolicy,
) -> Result<usize, ChatError> {
    let mut attempt: u32 = 0;
    loop {
        match load_backlog(api, shared).await {
            Ok(merged) => return Ok(merged),
            Err(err) if err.is_retryable() => {
                attempt = attempt.saturating_add(1);
                if policy.exhausted(attempt) {
                    warn!(
                        room_id = shared.room_id(),
                        attempts = attempt,
                        error = %err,
                        "backlog fetch retries exhausted"
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
                    "backlog fetch failed; backing off"
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
