//! Location paths
//!
//! Paths are slash-separated keys (`/users/alice/name`). Leading, trailing and
//! repeated slashes are ignored. Keys may not contain `.`, `#`, `$`, `[` or `]`.

use crate::errors::ClientError;

const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// Split a path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Check that a single key is acceptable to the client
pub fn validate_key(key: &str) -> Result<(), ClientError> {
    if key.is_empty() {
        return Err(ClientError::invalid_argument("empty key"));
    }
    if let Some(c) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control()) {
        return Err(ClientError::invalid_argument(format!(
            "key {key:?} contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Check every segment of a relative path
pub fn validate_path(path: &str) -> Result<(), ClientError> {
    for segment in segments(path) {
        validate_key(segment)?;
    }
    Ok(())
}

/// Join segments back into a canonical absolute path (`/` for the root)
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_ignore_extra_slashes() {
        assert_eq!(segments("/a//b/c/"), vec!["a", "b", "c"]);
        assert!(segments("/").is_empty());
    }

    #[test]
    fn test_forbidden_characters_rejected() {
        assert!(validate_path("users/alice").is_ok());
        assert!(validate_path("users/al.ice").is_err());
        assert!(validate_path("users/$id").is_err());
    }

    #[test]
    fn test_join_round_trips_root() {
        assert_eq!(join::<&str>(&[]), "/");
        assert_eq!(join(&["a", "b"]), "/a/b");
    }
}
