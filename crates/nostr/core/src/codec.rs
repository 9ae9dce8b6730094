//! Canonical serialization and content hashing.
//!
//! The canonical form of an event is the compact JSON array
//! `[0,<pubkey>,<created_at>,<kind>,<tags>,<content>]`, UTF-8 encoded, with no
//! whitespace. Strings use JSON escaping for `"`, `\` and control characters;
//! non-ASCII characters are written verbatim. The event id is the sha256 of
//! those bytes.

use crate::error::EventError;
use crate::event::{HEX_KEY_LEN, UnsignedEvent, is_lower_hex};
use sha2::{Digest, Sha256};

/// Serialize the signable fields into their canonical byte form.
pub fn canonicalize(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<Vec<u8>, EventError> {
    if !is_lower_hex(pubkey, HEX_KEY_LEN) {
        return Err(EventError::Malformed(
            "can't serialize event with a pubkey that is not 64 lowercase hex chars".to_string(),
        ));
    }

    let bytes = serde_json::to_vec(&(0u8, pubkey, created_at, kind, tags, content))?;
    Ok(bytes)
}

/// Canonical bytes of an unsigned event.
pub fn serialize_event(event: &UnsignedEvent) -> Result<Vec<u8>, EventError> {
    canonicalize(
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    )
}

/// sha256 of `bytes`.
pub fn hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Raw 32-byte id of an unsigned event.
pub fn event_id_bytes(event: &UnsignedEvent) -> Result<[u8; 32], EventError> {
    Ok(hash(&serialize_event(event)?))
}

/// Hex-encoded id of an unsigned event.
pub fn event_id(event: &UnsignedEvent) -> Result<String, EventError> {
    Ok(hex::encode(event_id_bytes(event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PUBKEY: &str = "6e468422dfb74a5738702a8823b9b28168abab8655faacb6853cd0ee15deee93";

    fn note(content: &str) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: PUBKEY.to_string(),
            created_at: 1617932115,
            kind: 1,
            tags: vec![],
            content: content.to_string(),
        }
    }

    #[test]
    fn test_canonical_layout() {
        let bytes = serialize_event(&note("Hello, world!")).unwrap();
        let expected = format!("[0,\"{}\",1617932115,1,[],\"Hello, world!\"]", PUBKEY);
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn test_escaping_rules() {
        let content = "line\nbreak \"q\" \\ tab\t bell\u{7} caf\u{e9} \u{1f30d}";
        let bytes = serialize_event(&note(content)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"line\nbreak \"q\" \\ tab\t bell\u0007"#));
        // Non-ASCII stays verbatim.
        assert!(text.contains("caf\u{e9} \u{1f30d}"));
        assert_eq!(whitespace_outside_strings(&text), 0);
    }

    #[test]
    fn test_no_whitespace_between_tokens() {
        let mut event = note("a b");
        event.tags = vec![vec!["t".to_string(), "x y".to_string()], vec!["p".to_string()]];
        let text = String::from_utf8(serialize_event(&event).unwrap()).unwrap();
        assert_eq!(whitespace_outside_strings(&text), 0);
        assert_eq!(whitespace_outside_strings(r#"[0, "a b"]"#), 1);
    }

    /// Whitespace characters that sit between JSON tokens.
    fn whitespace_outside_strings(json: &str) -> usize {
        let mut in_string = false;
        let mut escaped = false;
        let mut count = 0;
        for c in json.chars() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
            } else if c == '"' {
                in_string = true;
            } else if c.is_whitespace() {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_tags_keep_order_and_shape() {
        let mut event = note("");
        event.tags = vec![
            vec!["d".to_string(), "slot".to_string()],
            vec!["t".to_string()],
        ];
        let text = String::from_utf8(serialize_event(&event).unwrap()).unwrap();
        assert!(text.ends_with(r#",1,[["d","slot"],["t"]],""]"#));
    }

    #[test]
    fn test_rejects_bad_pubkey() {
        let mut event = note("x");
        event.pubkey = PUBKEY.to_uppercase();
        assert!(matches!(
            serialize_event(&event),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            hex::encode(hash(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_same_fields_same_id() {
        assert_eq!(event_id(&note("a")).unwrap(), event_id(&note("a")).unwrap());
        assert_ne!(event_id(&note("a")).unwrap(), event_id(&note("b")).unwrap());
    }
}
