//! Qualified type names: `name ('.' name)*` where a name is a letter or
//! underscore followed by letters, underscores and digits.

use crate::error::{ArcadiaError, ArcadiaResult};

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_name_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Consumes one `name` starting at `position`, returning the position after it.
fn scan_name(bytes: &[u8], position: usize) -> Option<usize> {
    match bytes.get(position) {
        Some(&byte) if is_name_start(byte) => {}
        _ => return None,
    }
    let mut end = position + 1;
    while end < bytes.len() && is_name_continue(bytes[end]) {
        end += 1;
    }
    Some(end)
}

pub fn is_qualified_name(bytes: &[u8]) -> bool {
    let mut position = match scan_name(bytes, 0) {
        Some(end) => end,
        None => return false,
    };
    while position < bytes.len() {
        if bytes[position] != b'.' {
            return false;
        }
        position = match scan_name(bytes, position + 1) {
            Some(end) => end,
            None => return false,
        };
    }
    true
}

pub fn validate_qualified_name(bytes: &[u8]) -> ArcadiaResult<()> {
    if is_qualified_name(bytes) {
        Ok(())
    } else {
        Err(ArcadiaError::argument_value_invalid(format!(
            "'{}' is not a qualified name",
            String::from_utf8_lossy(bytes)
        )))
    }
}
