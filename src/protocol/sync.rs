//! Sync Request Detection
//!
//! A read chunk is treated as one ASCII record. Nothing is reassembled across
//! reads: a `sync` token split over two chunks is not recognised.

use super::constants::{SYNC_TOKEN, TOKEN_DELIMITER};

/// Returns true when the first space-delimited token of `chunk` is exactly `sync`.
///
/// A single trailing record terminator (`\n` or `\r\n`) is ignored, so a
/// line-oriented client sending `"sync\n"` is recognised. Matching is
/// case-sensitive and a leading space yields an empty first token.
pub fn is_sync_request(chunk: &[u8]) -> bool {
    let record = strip_terminator(chunk);
    record
        .split(|&b| b == TOKEN_DELIMITER)
        .next()
        .map_or(false, |token| token == SYNC_TOKEN)
}

fn strip_terminator(chunk: &[u8]) -> &[u8] {
    let chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    chunk.strip_suffix(b"\r").unwrap_or(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sync() {
        assert!(is_sync_request(b"sync"));
    }

    #[test]
    fn test_sync_with_line_terminator() {
        assert!(is_sync_request(b"sync\n"));
        assert!(is_sync_request(b"sync\r\n"));
    }

    #[test]
    fn test_sync_with_extra_tokens() {
        assert!(is_sync_request(b"sync extra-tokens"));
        assert!(is_sync_request(b"sync  double space\n"));
    }

    #[test]
    fn test_prefixed_token_does_not_match() {
        assert!(!is_sync_request(b"sync2 now"));
        assert!(!is_sync_request(b"syncing"));
    }

    #[test]
    fn test_leading_space_does_not_match() {
        assert!(!is_sync_request(b" sync now"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!is_sync_request(b"SYNC"));
        assert!(!is_sync_request(b"Sync now"));
    }

    #[test]
    fn test_other_records_ignored() {
        assert!(!is_sync_request(b""));
        assert!(!is_sync_request(b"\n"));
        assert!(!is_sync_request(b"hello sync"));
        assert!(!is_sync_request(b"syn"));
    }

    #[test]
    fn test_terminator_only_stripped_at_end() {
        assert!(!is_sync_request(b"sync\nmore"));
    }
}
