//! Container names.

use boxrun_core::error::{BoxError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random name of `len` ASCII letters and digits.
pub fn generate_name(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Check that `name` is usable as a runtime ID and as part of a directory name.
///
/// Accepts ASCII letters, digits, `_`, `+`, `-` and `.`, not starting with
/// `.` or `-`.
pub fn validate_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.'));

    if name.is_empty() || !valid_chars || name.starts_with('.') || name.starts_with('-') {
        return Err(BoxError::InvalidName(name.to_string()));
    }
    Ok(())
}
