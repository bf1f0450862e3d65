//! Path validation for archive-relative paths.
//!
//! Every path handed to a [`StorageBackend`](crate::StorageBackend) is relative
//! to the archive root. These helpers make sure that stays true, and that
//! single path segments built from user input (event labels, configured file
//! names) can't smuggle in separators.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates an archive-relative path.
/// Ensures that paths don't escape the archive root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use lens_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("2025/02/2025-02-26/photos/20250226_074104_A6401534.JPG").is_ok());
/// assert!(validate_path("2025/../_index.json").is_ok()); // (never leaves archive root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("2025/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("2025/./02//2025-02-26/").unwrap(),
///     Path::new("2025/02/2025-02-26")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a string meant to become exactly one path segment (a file name,
/// or part of a directory name).
///
/// Rejects empty strings, `.`/`..`, separators (both `/` and `\`, whatever
/// the platform) and null bytes. Surrounding whitespace is trimmed first and
/// the trimmed segment is returned.
///
/// ```
/// use lens_storage::validate_segment;
/// assert_eq!(validate_segment("  Kyoto ").unwrap(), "Kyoto");
/// assert_eq!(validate_segment("京都旅行").unwrap(), "京都旅行");
/// assert!(validate_segment("Kyoto/Osaka").is_err());
/// assert!(validate_segment("..").is_err());
/// assert!(validate_segment("   ").is_err());
/// ```
pub fn validate_segment(segment: &str) -> Result<&str> {
    let trimmed = segment.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.chars().any(|c| c == '/' || c == '\\' || c == '\0');
    if invalid {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(segment)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("2025/02/2025-02-26")).unwrap(), Path::new("2025/02/2025-02-26"));
        assert_eq!(validate(Path::new("_index.json")).unwrap(), Path::new("_index.json"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("2025//02")).unwrap(), Path::new("2025/02"));
        assert_eq!(validate(Path::new("2025/./02/./photos")).unwrap(), Path::new("2025/02/photos"));
        // Leading slash is treated as the archive root, not the filesystem root.
        assert_eq!(validate(Path::new("/2025/02")).unwrap(), Path::new("2025/02"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("2025/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_reverse_stays_inside_root() {
        assert_eq!(validate(Path::new("2025/02/..")).unwrap(), Path::new("2025"));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("\0")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("./.")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_segments() {
        assert_eq!(validate_segment("Kyoto").unwrap(), "Kyoto");
        assert_eq!(validate_segment("Trip to Kyoto").unwrap(), "Trip to Kyoto");
        assert!(validate_segment("").is_err());
        assert!(validate_segment(".").is_err());
        assert!(validate_segment("a\\b").is_err());
        assert!(validate_segment("a\0b").is_err());
    }
}
