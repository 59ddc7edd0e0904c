//! Filename sanitization.
//!
//! Every character the destination profile forbids is replaced by `_`.
//! Replacement is one-for-one, so a sanitized name has as many characters as
//! the original and keeps its ordering.

use std::ffi::OsStr;

use crate::profile::FilesystemProfile;

/// Character substituted for every illegal character.
pub const PLACEHOLDER: char = '_';

/// Result of sanitizing one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub name: String,
    /// True iff at least one character was replaced
    pub changed: bool,
}

/// Replace every character `profile` forbids with [`PLACEHOLDER`].
pub fn sanitize(name: &str, profile: &FilesystemProfile) -> Sanitized {
    let mut changed = false;
    let name = name
        .chars()
        .map(|ch| {
            if profile.is_legal(ch) {
                ch
            } else {
                changed = true;
                PLACEHOLDER
            }
        })
        .collect();
    Sanitized { name, changed }
}

/// Sanitize a raw OS filename.
///
/// Names that are not valid Unicode are converted lossily first; the
/// replacement character is non-ASCII and therefore replaced in turn.
pub fn sanitize_os(name: &OsStr, profile: &FilesystemProfile) -> Sanitized {
    match name.to_str() {
        Some(name) => sanitize(name, profile),
        None => {
            let mut sanitized = sanitize(&name.to_string_lossy(), profile);
            sanitized.changed = true;
            sanitized
        }
    }
}
