//! Display-name normalization.

use crate::errors::JoinError;

/// Trim a raw display name and reject it if nothing is left.
///
/// Uniqueness is not checked here; that needs the live registry.
pub fn normalize_display_name(raw: &str) -> Result<String, JoinError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JoinError::InvalidName);
    }
    Ok(trimmed.to_owned())
}
