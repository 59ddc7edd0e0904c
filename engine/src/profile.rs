//! Filesystem profiles: which characters a target filesystem accepts in a filename.
//!
//! The table is static data built at compile time. Each profile only models
//! the ASCII range; every non-ASCII character is treated as illegal on every
//! profile, which is an approximation for ext4 and HFS+ (both of which accept
//! most Unicode names in practice).

use std::fmt;

use crate::error::EngineError;

/// Characters Windows-family filesystems reserve.
const WINDOWS_RESERVED: &str = "<>:\"/\\|?*";

/// A named rule set declaring which characters are legal in a filename.
#[derive(Debug, PartialEq, Eq)]
pub struct FilesystemProfile {
    name: &'static str,
    lowest: char,
    highest: char,
    forbidden: &'static str,
    case_sensitive: bool,
}

static PROFILES: [FilesystemProfile; 5] = [
    FilesystemProfile {
        name: "FAT32",
        lowest: '\u{20}',
        highest: '\u{7e}',
        forbidden: WINDOWS_RESERVED,
        case_sensitive: false,
    },
    FilesystemProfile {
        name: "exFAT",
        lowest: '\u{20}',
        highest: '\u{7e}',
        forbidden: WINDOWS_RESERVED,
        case_sensitive: false,
    },
    FilesystemProfile {
        name: "NTFS",
        lowest: '\u{20}',
        highest: '\u{7e}',
        forbidden: WINDOWS_RESERVED,
        case_sensitive: false,
    },
    FilesystemProfile {
        name: "ext4",
        lowest: '\u{01}',
        highest: '\u{7e}',
        forbidden: "/",
        case_sensitive: true,
    },
    FilesystemProfile {
        name: "HFS+",
        lowest: '\u{01}',
        highest: '\u{7e}',
        forbidden: ":",
        case_sensitive: false,
    },
];

impl FilesystemProfile {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `ch` may appear in a filename on this filesystem.
    pub fn is_legal(&self, ch: char) -> bool {
        (self.lowest..=self.highest).contains(&ch) && !self.forbidden.contains(ch)
    }

    /// Whether names differing only in ASCII case are distinct entries.
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

impl fmt::Display for FilesystemProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// All registered profiles, in registration order.
pub fn profiles() -> &'static [FilesystemProfile] {
    &PROFILES
}

/// Look up a profile by name.
///
/// An exact match wins; otherwise the name is matched ignoring ASCII case,
/// so `fat32` resolves to `FAT32`.
pub fn profile_for(name: &str) -> Result<&'static FilesystemProfile, EngineError> {
    let name = name.trim();
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .or_else(|| PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
        .ok_or_else(|| EngineError::UnknownProfile {
            name: name.to_string(),
            known: known_names(),
        })
}

/// Comma-separated list of registered profile names.
pub fn known_names() -> String {
    PROFILES
        .iter()
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// ASCII characters legal on `source` that `destination` forbids.
///
/// These are exactly the characters a transfer between the two may have to
/// replace.
pub fn replaced_characters(
    source: &FilesystemProfile,
    destination: &FilesystemProfile,
) -> Vec<char> {
    (0u8..=0x7f)
        .map(char::from)
        .filter(|&ch| source.is_legal(ch) && !destination.is_legal(ch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> &'static FilesystemProfile {
        profile_for(name).expect("profile should be registered")
    }

    #[test]
    fn test_windows_family_rules() {
        for name in ["FAT32", "exFAT", "NTFS"] {
            let p = profile(name);
            for ch in WINDOWS_RESERVED.chars() {
                assert!(!p.is_legal(ch), "{} should forbid {:?}", name, ch);
            }
            assert!(!p.is_legal('\u{1f}'));
            assert!(!p.is_legal('\u{7f}'));
            assert!(!p.is_legal('é'));
            assert!(p.is_legal(' '));
            assert!(p.is_legal('~'));
            assert!(p.is_legal('a'));
            assert!(!p.is_case_sensitive());
        }
    }

    #[test]
    fn test_ext4_rules() {
        let p = profile("ext4");
        assert!(!p.is_legal('/'));
        assert!(!p.is_legal('\0'));
        assert!(p.is_legal('\u{01}'));
        assert!(p.is_legal(':'));
        assert!(p.is_legal('*'));
        assert!(!p.is_legal('\u{7f}'));
        assert!(p.is_case_sensitive());
    }

    #[test]
    fn test_hfs_plus_rules() {
        let p = profile("HFS+");
        assert!(!p.is_legal(':'));
        assert!(p.is_legal('/'));
        assert!(p.is_legal('\u{01}'));
        assert!(!p.is_legal('\0'));
    }

    #[test]
    fn test_profile_lookup_ignores_case() {
        assert_eq!(profile("fat32").name(), "FAT32");
        assert_eq!(profile("EXFAT").name(), "exFAT");
        assert_eq!(profile(" hfs+ ").name(), "HFS+");
    }

    #[test]
    fn test_unknown_profile() {
        let err = profile_for("zfs").expect_err("zfs is not registered");
        assert!(matches!(err, EngineError::UnknownProfile { .. }));
        assert!(err.to_string().contains("FAT32"));
    }

    #[test]
    fn test_replaced_characters_ext4_to_fat32() {
        let replaced = replaced_characters(profile("ext4"), profile("FAT32"));
        for ch in ['<', '>', ':', '"', '\\', '|', '?', '*'] {
            assert!(replaced.contains(&ch), "expected {:?} in {:?}", ch, replaced);
        }
        // Control characters are legal on ext4 but not on FAT32
        assert!(replaced.contains(&'\u{01}'));
        // '/' is illegal on both
        assert!(!replaced.contains(&'/'));
    }

    #[test]
    fn test_replaced_characters_same_profile_is_empty() {
        let ntfs = profile("NTFS");
        assert!(replaced_characters(ntfs, ntfs).is_empty());
    }
}
