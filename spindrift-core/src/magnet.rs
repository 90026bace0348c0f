//! Magnet link validation
//!
//! A request's magnet link is the only user-controlled text that reaches a
//! child process command line, so it is validated strictly before anything
//! is spawned.

use thiserror::Error;

/// Errors produced while validating a magnet link.
#[derive(Debug, Error)]
pub enum MagnetError {
    #[error("malformed magnet URI: {reason}")]
    Malformed { reason: String },

    #[error("missing xt parameter with a urn topic")]
    MissingTopic,

    #[error("invalid content hash '{hash}': {reason}")]
    InvalidHash { hash: String, reason: String },
}

/// A validated magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Hash algorithm identifier from the urn topic (e.g. "btih")
    pub algorithm: String,
    /// Content hash, normalized to lowercase
    pub hash: String,
    /// Optional display name (dn parameter)
    pub display_name: Option<String>,
}

/// Parses and validates a magnet link.
///
/// Requires the `magnet:` scheme and an `xt` parameter naming a urn with an
/// algorithm identifier and a 32-40 character hash. Hex and base32 hashes
/// are accepted case-insensitively.
///
/// # Errors
/// - `MagnetError::Malformed` - URI does not parse as a magnet link
/// - `MagnetError::MissingTopic` - no `xt=urn:...` parameter present
/// - `MagnetError::InvalidHash` - hash has the wrong length or characters
pub fn parse(raw: &str) -> Result<MagnetLink, MagnetError> {
    let magnet = magnet_url::Magnet::new(raw).map_err(|e| MagnetError::Malformed {
        reason: e.to_string(),
    })?;

    let (algorithm, hash) = extract_topic(raw)?;

    Ok(MagnetLink {
        algorithm,
        hash,
        display_name: magnet.display_name().map(|s| s.to_string()),
    })
}

/// Extract the `xt=urn:<algorithm>:<hash>` topic from the raw URI text.
fn extract_topic(raw: &str) -> Result<(String, String), MagnetError> {
    for param in raw.split(['?', '&']).skip(1) {
        let Some(value) = param.strip_prefix("xt=").or_else(|| param.strip_prefix("XT=")) else {
            continue;
        };
        let Some(topic) = strip_prefix_ignore_case(value, "urn:") else {
            continue;
        };

        // The hash is the final colon-separated segment; everything before
        // it names the algorithm (btih, btmh:1220-style prefixes included).
        let Some((algorithm, hash)) = topic.rsplit_once(':') else {
            return Err(MagnetError::InvalidHash {
                hash: topic.to_string(),
                reason: "missing algorithm identifier".to_string(),
            });
        };

        if algorithm.is_empty() {
            return Err(MagnetError::InvalidHash {
                hash: hash.to_string(),
                reason: "empty algorithm identifier".to_string(),
            });
        }

        validate_hash(hash)?;
        return Ok((algorithm.to_lowercase(), hash.to_lowercase()));
    }

    Err(MagnetError::MissingTopic)
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

fn validate_hash(hash: &str) -> Result<(), MagnetError> {
    if !(32..=40).contains(&hash.len()) {
        return Err(MagnetError::InvalidHash {
            hash: hash.to_string(),
            reason: format!("length {} outside 32-40", hash.len()),
        });
    }

    if !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(MagnetError::InvalidHash {
            hash: hash.to_string(),
            reason: "non-alphanumeric character".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_parse_hex_magnet() {
        let raw = format!("magnet:?xt=urn:btih:{HEX_HASH}");
        let link = parse(&raw).unwrap();

        assert_eq!(link.algorithm, "btih");
        assert_eq!(link.hash, HEX_HASH);
        assert_eq!(link.display_name, None);
    }

    #[test]
    fn test_parse_uppercase_hash() {
        let raw = format!("magnet:?xt=urn:btih:{}", HEX_HASH.to_uppercase());
        let link = parse(&raw).unwrap();
        assert_eq!(link.hash, HEX_HASH);
    }

    #[test]
    fn test_parse_base32_hash() {
        // 32-character base32 info hash, the other common encoding
        let raw = "magnet:?xt=urn:btih:c4lvc5tqmsv5llkqmsnvvmrpcqeqkrny";
        assert!(parse(raw).is_ok());
    }

    #[test]
    fn test_parse_with_display_name() {
        let raw = format!("magnet:?xt=urn:btih:{HEX_HASH}&dn=example");
        let link = parse(&raw).unwrap();
        assert_eq!(link.display_name.as_deref(), Some("example"));
    }

    #[test]
    fn test_rejects_non_magnet() {
        assert!(parse("not-a-magnet").is_err());
        assert!(parse("").is_err());
        assert!(parse("http://example.com").is_err());
    }

    #[test]
    fn test_rejects_missing_topic() {
        assert!(parse("magnet:?dn=example").is_err());
    }

    #[test]
    fn test_rejects_short_hash() {
        let raw = "magnet:?xt=urn:btih:0123456789abcdef";
        assert!(matches!(
            parse(raw),
            Err(MagnetError::InvalidHash { .. }) | Err(MagnetError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_non_alphanumeric_hash() {
        let raw = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef0123456!";
        assert!(parse(raw).is_err());
    }
}
