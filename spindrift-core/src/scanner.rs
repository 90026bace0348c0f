//! URL extraction from process output
//!
//! A pure accumulator over the ordered chunk sequence: each chunk is decoded
//! and appended, then the buffer is searched for the first HTTP/HTTPS token.
//! Because scanning runs over the accumulated text, a token split across a
//! chunk boundary is still found once its tail arrives.

use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid URL pattern"));

/// Incremental scanner for the first URL-shaped token in a chunk stream.
///
/// At most one match is ever produced; the first token seen in chunk-arrival
/// order wins, even if a later chunk carries a different URL. A token that
/// reaches the end of the accumulated text is held back until the next chunk
/// proves it complete, so a URL split across chunks is never truncated.
#[derive(Debug, Default)]
pub struct UrlScanner {
    text: String,
    matched: bool,
}

impl UrlScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns the first URL once it is known complete.
    ///
    /// Returns `None` on every call after the first match.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        if self.matched {
            return None;
        }

        self.text.push_str(&String::from_utf8_lossy(chunk));

        let found = URL_PATTERN.find(&self.text)?;
        if found.end() == self.text.len() {
            // Token may continue in the next chunk
            return None;
        }

        self.matched = true;
        Some(found.as_str().to_string())
    }

    /// Whether an unresolved candidate token ends exactly at the buffer end.
    ///
    /// Such a token is held back because the next chunk could extend it.
    /// Callers bound that wait: once the stream goes quiet or closes,
    /// [`UrlScanner::flush`] accepts the candidate as complete.
    pub fn has_pending(&self) -> bool {
        if self.matched {
            return false;
        }
        URL_PATTERN
            .find(&self.text)
            .is_some_and(|found| found.end() == self.text.len())
    }

    /// Resolve a token still pending at end of stream, if any.
    ///
    /// Called when the stream closes: a URL at the very end of the output
    /// can no longer grow, so it counts as complete.
    pub fn flush(&mut self) -> Option<String> {
        if self.matched {
            return None;
        }

        let found = URL_PATTERN.find(&self.text)?;
        self.matched = true;
        Some(found.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_url_wins_across_chunks() {
        let mut scanner = UrlScanner::new();

        assert_eq!(scanner.push(b"starting...\n"), None);
        assert_eq!(
            scanner.push(b"your url is https://abc123.example.com\n"),
            Some("https://abc123.example.com".to_string())
        );
        // Later URLs are ignored once resolved
        assert_eq!(scanner.push(b"https://ignored.example.com\n"), None);
    }

    #[test]
    fn test_no_match_on_plain_text() {
        let mut scanner = UrlScanner::new();
        assert_eq!(scanner.push(b"tunnel starting\n"), None);
        assert_eq!(scanner.push(b"still waiting\n"), None);
        assert_eq!(scanner.flush(), None);
    }

    #[test]
    fn test_token_split_across_chunk_boundary() {
        let mut scanner = UrlScanner::new();

        // Held back while the token could still continue
        assert_eq!(scanner.push(b"url: https://ab"), None);
        assert_eq!(
            scanner.push(b"c.example.com\nready"),
            Some("https://abc.example.com".to_string())
        );
    }

    #[test]
    fn test_pending_tracks_trailing_candidate() {
        let mut scanner = UrlScanner::new();
        assert!(!scanner.has_pending());

        assert_eq!(scanner.push(b"your url is https://tail.example.com"), None);
        assert!(scanner.has_pending());

        assert!(scanner.flush().is_some());
        assert!(!scanner.has_pending());
    }

    #[test]
    fn test_flush_resolves_trailing_token() {
        let mut scanner = UrlScanner::new();

        assert_eq!(scanner.push(b"your url is https://tail.example.com"), None);
        assert_eq!(
            scanner.flush(),
            Some("https://tail.example.com".to_string())
        );
    }

    #[test]
    fn test_http_scheme_accepted() {
        let mut scanner = UrlScanner::new();
        assert_eq!(
            scanner.push(b"serving at http://127.0.0.1:8000\n"),
            Some("http://127.0.0.1:8000".to_string())
        );
    }

    #[test]
    fn test_first_of_two_urls_in_one_chunk() {
        let mut scanner = UrlScanner::new();
        assert_eq!(
            scanner.push(b"https://first.example.com https://second.example.com\n"),
            Some("https://first.example.com".to_string())
        );
    }
}
