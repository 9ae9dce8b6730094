//! Signed event protocol layer.
//!
//! This crate provides:
//! - Event model: signed events, unsigned events and producer templates
//! - Canonical codec: deterministic serialization and sha256 event ids
//! - Signer: BIP-340 Schnorr signing and verification over secp256k1
//! - Kind classes: regular vs. parameterized-replaceable, `kind:pubkey:d` addresses
//! - Filters: exact id/author/kind, `#tag` and time-window queries
//! - Schema registry: declarative per-kind validation rules
//! - Admission: the stateless checks and replace-on-write rule every sink applies
//!
//! # Producing an event
//!
//! ```
//! use nostr::{EventTemplate, Keypair, SchemaRegistry, KIND_PRICE_QUOTE, verify_event};
//!
//! let keys = Keypair::generate();
//! let template = EventTemplate::new(KIND_PRICE_QUOTE, "")
//!     .tag(["card".to_string(), format!("30500:{}:dragon", keys.public_key_hex())])
//!     .tag(["price", "2100"]);
//!
//! SchemaRegistry::standard().validate_template(&template).unwrap();
//! let event = keys.finalize(&template).unwrap();
//! assert!(verify_event(&event).unwrap());
//! ```

mod admission;
mod codec;
mod error;
mod event;
mod filter;
mod kind;
mod schema;
mod signer;


pub use admission::{
    Admissible, Admission, AdmissionKey, log_rejection, prepare, resolve, supersedes,
    version_order,
};
pub use codec::{canonicalize, event_id, event_id_bytes, hash, serialize_event};
pub use error::EventError;
pub use event::{
    Event, EventTemplate, HEX_KEY_LEN, HEX_SIG_LEN, UnsignedEvent, is_lower_hex, sort_events,
    unix_now,
};
pub use filter::{Filter, FilterError, matches_any};
pub use kind::{
    ADDRESSABLE_KIND_MAX, ADDRESSABLE_KIND_MIN, D_TAG, KindClass, classify_kind, create_address,
    discriminator, is_addressable_kind, parse_address,
};
pub use schema::{
    Arity, Constraint, ContentRule, Field, KIND_CARD_DEFINITION, KIND_PORTFOLIO,
    KIND_PRICE_QUOTE, KIND_TRADE_ACCEPT, KIND_TRADE_CANCEL, KIND_TRADE_OFFER, Presence, RARITIES,
    SIDES, STANDARD_RULES, SchemaError, SchemaRegistry, TagRule, UnknownKindPolicy,
    ValidationRule, ValueType, Violation, ViolationKind,
};
pub use signer::{
    Keypair, Verification, check_signature, finalize_event, generate_keypair,
    is_valid_secret_key, sign_event, verify_event, verify_or_reject,
};
