//! Caller-side message validation.
//!
//! Stores and transports accept any text; composing UIs call this before
//! handing text to a backend.

use crate::error::{Result, RoomwireError};

/// Longest message a composer may submit, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Returns the trimmed text, or `BadRequest` if it is blank or too long.
pub fn validate_message_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RoomwireError::BadRequest("message must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(RoomwireError::BadRequest(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(trimmed)
}
