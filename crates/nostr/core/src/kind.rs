//! Kind classes and addressable coordinates.
//!
//! Kinds `30000..=39999` are parameterized-replaceable: the event's identity is
//! the `(kind, pubkey, d)` coordinate and only the newest version is current.
//! Every other kind is regular and identified by its id alone.

use crate::error::EventError;
use crate::event::{Event, HEX_KEY_LEN, is_lower_hex};
use serde::{Deserialize, Serialize};

/// First parameterized-replaceable kind.
pub const ADDRESSABLE_KIND_MIN: u16 = 30000;

/// Last parameterized-replaceable kind.
pub const ADDRESSABLE_KIND_MAX: u16 = 39999;

/// Name of the discriminator tag.
pub const D_TAG: &str = "d";

/// Replacement class of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindClass {
    /// Each event is its own identity.
    Regular,
    /// Identity is `(kind, pubkey, d)`; newer versions replace older ones.
    ParameterizedReplaceable,
}

pub fn classify_kind(kind: u16) -> KindClass {
    if (ADDRESSABLE_KIND_MIN..=ADDRESSABLE_KIND_MAX).contains(&kind) {
        KindClass::ParameterizedReplaceable
    } else {
        KindClass::Regular
    }
}

pub fn is_addressable_kind(kind: u16) -> bool {
    classify_kind(kind) == KindClass::ParameterizedReplaceable
}

/// The `d` value of a parameterized-replaceable event.
///
/// Returns `Ok(None)` for regular kinds. For addressable kinds the event must
/// carry exactly one `d` tag and that tag must have a value (the empty string
/// is a valid value).
pub fn discriminator(event: &Event) -> Result<Option<&str>, EventError> {
    if event.kind_class() == KindClass::Regular {
        return Ok(None);
    }

    let mut d_tags = event.tags_named(D_TAG);
    let first = d_tags.next();
    let extra = d_tags.count();

    match first.and_then(|tag| tag.get(1)) {
        Some(value) if extra == 0 => Ok(Some(value.as_str())),
        _ => Err(EventError::MissingDiscriminator {
            kind: event.kind,
            found: first.map_or(0, |_| 1) + extra,
        }),
    }
}

/// Build an address string `<kind>:<pubkey>:<d>`.
pub fn create_address(kind: u16, pubkey: &str, d: &str) -> String {
    format!("{}:{}:{}", kind, pubkey, d)
}

/// Split an address into its `(kind, pubkey, d)` parts.
///
/// The `d` part may itself contain colons and may be empty.
pub fn parse_address(address: &str) -> Result<(u16, String, String), EventError> {
    let mut parts = address.splitn(3, ':');
    let (Some(kind), Some(pubkey), Some(d)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(EventError::Malformed(format!(
            "address must be kind:pubkey:d, got {:?}",
            address
        )));
    };

    let kind: u16 = kind
        .parse()
        .map_err(|_| EventError::Malformed(format!("invalid address kind {:?}", kind)))?;
    if !is_lower_hex(pubkey, HEX_KEY_LEN) {
        return Err(EventError::Malformed(format!(
            "invalid address pubkey {:?}",
            pubkey
        )));
    }

    Ok((kind, pubkey.to_string(), d.to_string()))
}
