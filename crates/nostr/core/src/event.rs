//! Event structure: the signed record, its unsigned form and producer templates.
//!
//! An [`Event`] is immutable once signed. Any change to `pubkey`, `created_at`,
//! `kind`, `tags` or `content` invalidates both `id` and `sig`; "updates" are
//! new events.

use crate::error::EventError;
use crate::kind::{KindClass, classify_kind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of a hex-encoded event id or x-only public key.
pub const HEX_KEY_LEN: usize = 64;

/// Length of a hex-encoded Schnorr signature.
pub const HEX_SIG_LEN: usize = 128;

/// A signed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the canonical form
    pub id: String,
    /// 32-bytes lowercase hex-encoded x-only public key of the author
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind, selects the schema rule and replacement class
    pub kind: u16,
    /// Tags: a name followed by zero or more values
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex Schnorr signature over `id`
    pub sig: String,
}

/// The five signable fields of an event, before an id or signature exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// An event under construction without a pubkey; the pubkey comes from the
/// key that finalizes it.
///
/// ```
/// use nostr::EventTemplate;
///
/// let template = EventTemplate::new(1503, "")
///     .tag(["card", "30500:aa..:dragon"])
///     .tag(["price", "2100"])
///     .created_at(1_700_000_000);
/// assert_eq!(template.tags.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// True if `s` is exactly `len` lowercase hex characters.
pub fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Name/first-value access shared by events, unsigned events and templates.
fn first_values<'a, 'n>(
    tags: &'a [Vec<String>],
    name: &'n str,
) -> impl Iterator<Item = &'a str> {
    tags.iter()
        .filter(move |tag| tag.first().map(String::as_str) == Some(name))
        .filter_map(|tag| tag.get(1).map(String::as_str))
}

impl Event {
    /// Parse an event from its JSON object form.
    ///
    /// Any decoding failure, including a negative `created_at` or a kind that
    /// does not fit 16 bits, is reported as [`EventError::Malformed`].
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        let event: Event =
            serde_json::from_str(json).map_err(|e| EventError::Malformed(e.to_string()))?;
        Ok(event)
    }

    /// Serialize to the JSON object form.
    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check field encodings without touching cryptography or schema rules.
    pub fn check_structure(&self) -> Result<(), EventError> {
        if !is_lower_hex(&self.id, HEX_KEY_LEN) {
            return Err(EventError::Malformed(format!(
                "id must be {} lowercase hex chars",
                HEX_KEY_LEN
            )));
        }
        if !is_lower_hex(&self.pubkey, HEX_KEY_LEN) {
            return Err(EventError::Malformed(format!(
                "pubkey must be {} lowercase hex chars",
                HEX_KEY_LEN
            )));
        }
        if !is_lower_hex(&self.sig, HEX_SIG_LEN) {
            return Err(EventError::Malformed(format!(
                "sig must be {} lowercase hex chars",
                HEX_SIG_LEN
            )));
        }
        check_timestamp(self.created_at)
    }

    /// The signable fields of this event.
    pub fn unsigned(&self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }

    /// Replacement class of this event's kind.
    pub fn kind_class(&self) -> KindClass {
        classify_kind(self.kind)
    }

    /// First values of every tag named `name`, in tag order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        first_values(&self.tags, name)
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        first_values(&self.tags, name).next()
    }

    /// All tags named `name`, including those without values.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vec<String>> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
    }
}

pub(crate) fn check_timestamp(created_at: u64) -> Result<(), EventError> {
    // Stored as a signed 64-bit integer by the relay.
    if i64::try_from(created_at).is_err() {
        return Err(EventError::Malformed(format!(
            "created_at {} out of range",
            created_at
        )));
    }
    Ok(())
}

impl UnsignedEvent {
    /// Build an unsigned event stamped with the current time.
    pub fn new(
        pubkey: impl Into<String>,
        kind: u16,
        content: impl Into<String>,
        tags: Vec<Vec<String>>,
    ) -> Self {
        Self {
            pubkey: pubkey.into(),
            created_at: unix_now(),
            kind,
            tags,
            content: content.into(),
        }
    }

    /// Override the timestamp.
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        first_values(&self.tags, name).next()
    }
}

impl EventTemplate {
    /// Template stamped with the current time and no tags.
    pub fn new(kind: u16, content: impl Into<String>) -> Self {
        Self {
            created_at: unix_now(),
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    /// Append a tag.
    pub fn tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Attach a pubkey, producing the signable form.
    pub fn into_unsigned(self, pubkey: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.into(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// Sort events newest first, breaking `created_at` ties by ascending id.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, created_at: u64) -> Event {
        Event {
            id: id.to_string(),
            pubkey: "a".repeat(64),
            created_at,
            kind: 1,
            tags: vec![
                vec!["d".to_string(), "slot-1".to_string()],
                vec!["t".to_string(), "news".to_string()],
                vec!["t".to_string(), "cards".to_string()],
                vec!["flag".to_string()],
            ],
            content: "hello".to_string(),
            sig: "b".repeat(128),
        }
    }

    #[test]
    fn test_structure_accepts_well_formed_fields() {
        assert!(sample(&"c".repeat(64), 10).check_structure().is_ok());
    }

    #[test]
    fn test_structure_rejects_uppercase_and_short_hex() {
        let mut event = sample(&"C".repeat(64), 10);
        assert!(matches!(
            event.check_structure(),
            Err(EventError::Malformed(_))
        ));

        event.id = "c".repeat(64);
        event.pubkey = "a".repeat(63);
        assert!(event.check_structure().is_err());

        event.pubkey = "a".repeat(64);
        event.sig = "zz".repeat(64);
        assert!(event.check_structure().is_err());
    }

    #[test]
    fn test_structure_rejects_timestamp_beyond_i64() {
        let event = sample(&"c".repeat(64), u64::MAX);
        assert!(matches!(
            event.check_structure(),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_json_negative_timestamp_is_malformed() {
        let json = format!(
            r#"{{"id":"{}","pubkey":"{}","created_at":-5,"kind":1,"tags":[],"content":"","sig":"{}"}}"#,
            "c".repeat(64),
            "a".repeat(64),
            "b".repeat(128)
        );
        assert!(matches!(
            Event::from_json(&json),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_preserves_tag_order() {
        let event = sample(&"c".repeat(64), 10);
        let parsed = Event::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_tag_accessors() {
        let event = sample(&"c".repeat(64), 10);
        assert_eq!(event.tag_value("d"), Some("slot-1"));
        assert_eq!(event.tag_values("t").collect::<Vec<_>>(), vec!["news", "cards"]);
        assert_eq!(event.tag_value("flag"), None);
        assert_eq!(event.tags_named("flag").count(), 1);
    }

    #[test]
    fn test_sort_events_newest_first_then_id() {
        let mut events = vec![
            sample("abc123", 1610000000),
            sample("abc125", 1620000000),
            sample("abc124", 1620000000),
        ];
        sort_events(&mut events);
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["abc124", "abc125", "abc123"]);
    }

    #[test]
    fn test_template_into_unsigned() {
        let unsigned = EventTemplate::new(1, "hi")
            .tag(["t", "x"])
            .created_at(42)
            .into_unsigned("f".repeat(64));
        assert_eq!(unsigned.created_at, 42);
        assert_eq!(unsigned.tag_value("t"), Some("x"));
    }
}
