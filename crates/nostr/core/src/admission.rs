//! Admission pipeline shared by every event sink.
//!
//! [`prepare`] runs the checks that need no sink state (structure, identity,
//! signature, schema, classification) and yields an [`Admissible`] event with
//! its identity key. Sinks then apply the replace-on-write rule with
//! [`resolve`] and report an [`Admission`].

use crate::error::EventError;
use crate::event::Event;
use crate::kind::discriminator;
use crate::schema::SchemaRegistry;
use crate::signer::verify_or_reject;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Identity under which an event is retained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdmissionKey {
    /// Regular kinds: one slot per event id.
    Event { id: String },
    /// Parameterized-replaceable kinds: one slot per coordinate.
    Address { kind: u16, pubkey: String, d: String },
}

/// An event that passed every stateless check.
///
/// Can only be built by [`prepare`], so holding one proves the event was
/// verified and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admissible {
    event: Event,
    key: AdmissionKey,
}

impl Admissible {
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn key(&self) -> &AdmissionKey {
        &self.key
    }

    /// The `d` value for addressable events.
    pub fn discriminator(&self) -> Option<&str> {
        match &self.key {
            AdmissionKey::Address { d, .. } => Some(d),
            AdmissionKey::Event { .. } => None,
        }
    }

    pub fn into_event(self) -> Event {
        self.event
    }

    pub fn into_parts(self) -> (Event, AdmissionKey) {
        (self.event, self.key)
    }
}

/// Result of admitting a verified event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// Stored under a previously empty key.
    Admitted,
    /// Replaced an older version under the same coordinate.
    Replaced { previous: String },
    /// A newer (or tie-break winning) version is already current.
    Superseded { current: String },
    /// This exact event is already stored.
    Duplicate,
}

impl Admission {
    /// True if the sink's state changed.
    pub fn is_stored(&self) -> bool {
        matches!(self, Admission::Admitted | Admission::Replaced { .. })
    }
}

/// Run structure, identity, signature, schema and discriminator checks.
pub fn prepare(event: Event, registry: &SchemaRegistry) -> Result<Admissible, EventError> {
    event.check_structure()?;

    if let Err(err) = verify_or_reject(&event) {
        log_rejection(&event, &err);
        return Err(err);
    }

    if let Err(violations) = registry.validate(&event) {
        let err = EventError::ValidationFailed(violations);
        log_rejection(&event, &err);
        return Err(err);
    }

    let key = match discriminator(&event) {
        Ok(Some(d)) => AdmissionKey::Address {
            kind: event.kind,
            pubkey: event.pubkey.clone(),
            d: d.to_string(),
        },
        Ok(None) => AdmissionKey::Event {
            id: event.id.clone(),
        },
        Err(err) => {
            log_rejection(&event, &err);
            return Err(err);
        }
    };

    Ok(Admissible { event, key })
}

/// Order two versions of the same coordinate by `(created_at, id)`.
///
/// Ids are lowercase hex of equal length, so comparing the strings bytewise
/// is comparing the digests as big-endian integers.
pub fn version_order(a: (u64, &str), b: (u64, &str)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1))
}

/// True if `candidate` strictly beats `current`.
pub fn supersedes(candidate: (u64, &str), current: (u64, &str)) -> bool {
    version_order(candidate, current) == Ordering::Greater
}

/// Decide what happens when `incoming` arrives while `current` holds its key.
pub fn resolve(current: Option<&Event>, incoming: &Event) -> Admission {
    let Some(current) = current else {
        return Admission::Admitted;
    };

    if current.id == incoming.id {
        return Admission::Duplicate;
    }

    if supersedes(
        (incoming.created_at, incoming.id.as_str()),
        (current.created_at, current.id.as_str()),
    ) {
        Admission::Replaced {
            previous: current.id.clone(),
        }
    } else {
        debug!(
            id = %incoming.id,
            current = %current.id,
            kind = incoming.kind,
            "stale event superseded by current version"
        );
        Admission::Superseded {
            current: current.id.clone(),
        }
    }
}

/// Log a rejected event at the level its failure deserves.
pub fn log_rejection(event: &Event, err: &EventError) {
    if err.is_integrity_failure() {
        warn!(id = %event.id, pubkey = %event.pubkey, kind = event.kind, "{}", err);
    } else {
        debug!(id = %event.id, kind = event.kind, "rejected event: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTemplate;
    use crate::schema::{KIND_CARD_DEFINITION, KIND_PRICE_QUOTE, UnknownKindPolicy};
    use crate::signer::Keypair;
    use pretty_assertions::assert_eq;

    fn card_definition(keys: &Keypair, d: &str, created_at: u64) -> Event {
        keys.finalize(
            &EventTemplate::new(KIND_CARD_DEFINITION, "{}")
                .tag(["d", d])
                .tag(["name", "Dragon"])
                .tag(["rarity", "legendary"])
                .created_at(created_at),
        )
        .unwrap()
    }

    #[test]
    fn test_prepare_regular_event() {
        let keys = Keypair::generate();
        let card = format!("30500:{}:dragon", keys.public_key_hex());
        let quote = keys
            .finalize(
                &EventTemplate::new(KIND_PRICE_QUOTE, "")
                    .tag(["card".to_string(), card])
                    .tag(["price", "2100"]),
            )
            .unwrap();
        let admissible = prepare(quote.clone(), &SchemaRegistry::standard()).unwrap();
        assert_eq!(
            admissible.key(),
            &AdmissionKey::Event {
                id: quote.id.clone()
            }
        );
        assert_eq!(admissible.discriminator(), None);
        assert_eq!(admissible.into_event(), quote);
    }

    #[test]
    fn test_prepare_addressable_event() {
        let keys = Keypair::generate();
        let event = card_definition(&keys, "dragon", 10);
        let admissible = prepare(event, &SchemaRegistry::standard()).unwrap();
        assert_eq!(
            admissible.key(),
            &AdmissionKey::Address {
                kind: KIND_CARD_DEFINITION,
                pubkey: keys.public_key_hex(),
                d: "dragon".to_string(),
            }
        );
        assert_eq!(admissible.discriminator(), Some("dragon"));
    }

    #[test]
    fn test_prepare_stage_order() {
        let keys = Keypair::generate();
        let registry = SchemaRegistry::standard();

        // Tampered and schema-invalid: identity wins.
        let mut tampered = keys
            .finalize(&EventTemplate::new(KIND_PRICE_QUOTE, "").tag(["price", "x"]))
            .unwrap();
        tampered.content = "changed".to_string();
        assert!(matches!(
            prepare(tampered, &registry),
            Err(EventError::IdentityMismatch { .. })
        ));

        // Signed but schema-invalid.
        let bad_price = keys
            .finalize(&EventTemplate::new(KIND_PRICE_QUOTE, "").tag(["price", "x"]))
            .unwrap();
        let err = prepare(bad_price, &registry).unwrap_err();
        assert!(err.violations().iter().any(|v| v.references_tag("price")));

        // Valid schema but no d tag.
        let no_d = keys
            .finalize(
                &EventTemplate::new(KIND_CARD_DEFINITION, "{}")
                    .tag(["name", "Dragon"])
                    .tag(["rarity", "rare"]),
            )
            .unwrap();
        assert_eq!(
            prepare(no_d, &registry),
            Err(EventError::MissingDiscriminator {
                kind: KIND_CARD_DEFINITION,
                found: 0
            })
        );
    }

    #[test]
    fn test_prepare_unknown_kind_policy() {
        let keys = Keypair::generate();
        let event = keys.finalize(&EventTemplate::new(4242, "hi")).unwrap();
        assert!(prepare(event.clone(), &SchemaRegistry::standard()).is_ok());
        let strict = SchemaRegistry::standard().with_policy(UnknownKindPolicy::Reject);
        assert!(matches!(
            prepare(event, &strict),
            Err(EventError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_resolve_replace_only_if_newer() {
        let keys = Keypair::generate();
        let old = card_definition(&keys, "dragon", 10);
        let new = card_definition(&keys, "dragon", 20);

        assert_eq!(resolve(None, &old), Admission::Admitted);
        assert_eq!(
            resolve(Some(&old), &new),
            Admission::Replaced {
                previous: old.id.clone()
            }
        );
        assert_eq!(
            resolve(Some(&new), &old),
            Admission::Superseded {
                current: new.id.clone()
            }
        );
        assert_eq!(resolve(Some(&new), &new), Admission::Duplicate);
    }

    #[test]
    fn test_resolve_tie_break_higher_id_wins() {
        let keys = Keypair::generate();
        let a = card_definition(&keys, "dragon", 10);
        // Same coordinate and timestamp, different content, different id.
        let b = keys
            .finalize(
                &EventTemplate::new(KIND_CARD_DEFINITION, r#"{"v":2}"#)
                    .tag(["d", "dragon"])
                    .tag(["name", "Dragon"])
                    .tag(["rarity", "legendary"])
                    .created_at(10),
            )
            .unwrap();
        let (low, high) = if a.id < b.id { (a, b) } else { (b, a) };

        assert!(resolve(Some(&low), &high).is_stored());
        assert!(!resolve(Some(&high), &low).is_stored());
    }

    #[test]
    fn test_version_order() {
        assert!(supersedes((2, "00"), (1, "ff")));
        assert!(supersedes((1, "0b"), (1, "0a")));
        assert!(!supersedes((1, "0a"), (1, "0a")));
        assert_eq!(version_order((1, "0a"), (1, "0a")), Ordering::Equal);
    }
}
