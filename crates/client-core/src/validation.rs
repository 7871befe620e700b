use crate::error::ChatError;

/// Maximum message body length in characters, after trimming.
///
/// The server enforces the same limit; this check only exists to fail fast
/// and must never be the sole gate.
pub const MAX_MESSAGE_LEN: usize = 100;

/// Validate an outgoing message body and return its trimmed form.
pub fn validate_body(body: &str) -> Result<String, ChatError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidMessage(
            "message must not be empty".to_owned(),
        ));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::InvalidMessage(format!(
            "message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Validate a room name for the create path and return its trimmed form.
pub fn validate_room_name(name: &str) -> Result<String, ChatError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidRoomName);
    }
    Ok(trimmed.to_owned())
}
