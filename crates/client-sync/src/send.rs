use client_core::{ChatError, Message, Session, validate_body};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{room::RoomShared, time::now_ms, traits::ChatApi};

/// Validate and submit one outgoing message with optimistic echo
/// reconciliation.
///
/// Exactly one store mutation happens on the optimistic insert and exactly
/// one follow-up mutation (replace on success, remove on failure) per
/// attempt. Failed sends are never retried here; the user resends.
pub(crate) async fn send_message(
    api: &dyn ChatApi,
    shared: &RoomShared,
    session: Option<Session>,
    body: &str,
) -> Result<Message, ChatError> {
    let session = session.ok_or(ChatError::Unauthorized)?;
    let body = validate_body(body)?;

    let client_tag = Uuid::new_v4().to_string();
    let optimistic = Message {
        id: None,
        room_id: shared.room_id(),
        author_id: session.user_id,
        body: body.clone(),
        created_at_ms: now_ms(),
        client_tag: Some(client_tag.clone()),
    };

    if shared.insert(optimistic).is_none() {
        return Err(ChatError::RoomNotOpen(shared.room_id()));
    }

    match api
        .post_message(shared.room_id(), session.user_id, &body)
        .await
    {
        Ok(mut confirmed) => {
            // Tag the ack so the store replaces the optimistic entry
            // instead of adding a twin; the live-feed echo dedups by id.
            confirmed.client_tag = Some(client_tag);
            shared.insert(confirmed.clone());
            debug!(
                room_id = shared.room_id(),
                message_id = ?confirmed.id,
                "send confirmed"
            );
            Ok(confirmed)
        }
        Err(err) => {
            shared.remove_pending(&client_tag);
            warn!(
                room_id = shared.room_id(),
                error = %err,
                "send failed; optimistic entry rolled back"
            );
            Err(err)
        }
    }
}
