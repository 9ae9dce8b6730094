//! Change notifications broadcast after every stored event.

use nostr::{AdmissionKey, Event};
use serde::{Deserialize, Serialize};

/// Identity of the slot that changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKey {
    Event { id: String },
    Address { pubkey: String, d: String },
}

impl From<&AdmissionKey> for ChangeKey {
    fn from(key: &AdmissionKey) -> Self {
        match key {
            AdmissionKey::Event { id } => ChangeKey::Event { id: id.clone() },
            AdmissionKey::Address { pubkey, d, .. } => ChangeKey::Address {
                pubkey: pubkey.clone(),
                d: d.clone(),
            },
        }
    }
}

/// An event that became current, and the one it displaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: u16,
    pub key: ChangeKey,
    pub event: Event,
    /// Id of the replaced version, for parameterized-replaceable kinds
    pub replaced: Option<String>,
}
