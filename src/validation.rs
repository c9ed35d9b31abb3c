use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Shortest token accepted before a store lookup is attempted.
pub const MIN_TOKEN_LENGTH: usize = 16;

/// Longest token accepted before a store lookup is attempted.
pub const MAX_TOKEN_LENGTH: usize = 256;

/// Maximum length for a display name, in characters.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 50;

/// Where to send users when no usable redirect target was supplied.
pub const DEFAULT_REDIRECT: &str = "/";

/// Maximum length for a post-login redirect target.
pub const MAX_REDIRECT_LENGTH: usize = 2048;

/// Check whether a raw cookie value could be a session token.
///
/// Tokens are URL-safe base64 without padding. Anything else is rejected
/// here so malformed input never reaches the store.
pub fn is_well_formed_token(token: &str) -> bool {
    (MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validate and normalize a display name submitted from the settings form.
///
/// Rules:
/// - Surrounding whitespace is trimmed
/// - Must contain between 1 and 50 characters after trimming
/// - Must not contain control characters
pub fn validate_display_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Name cannot be empty".to_string()));
    }

    let length = trimmed.chars().count();
    if length > MAX_DISPLAY_NAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Name cannot exceed {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    if let Some((i, c)) = trimmed.chars().enumerate().find(|(_, c)| c.is_control()) {
        return Err(AppError::BadRequest(format!(
            "Name contains invalid control character {:?} at position {i}",
            c
        )));
    }

    Ok(trimmed.to_string())
}

/// Reduce a user-supplied redirect target to a safe local path.
///
/// Only absolute paths on this origin are kept. Protocol-relative (`//host`),
/// backslash-smuggled (`/\host`) and absolute URLs fall back to `/`.
pub fn sanitize_redirect_target(target: Option<&str>) -> String {
    match target {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && path.len() <= MAX_REDIRECT_LENGTH
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => DEFAULT_REDIRECT.to_string(),
    }
}
