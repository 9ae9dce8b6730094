//! Error taxonomy shared by producers and every event sink.

use crate::schema::Violation;
use thiserror::Error;

/// Reasons an event can be refused, or a signing request can fail.
///
/// The variants are ordered roughly by the stage of the admission pipeline
/// that produces them: structure, identity, signature, schema, classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Fields that cannot be parsed: non-hex id/pubkey/sig, wrong lengths,
    /// out-of-range timestamps, JSON that is not an event.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The id recomputed from the signable fields differs from the claimed id.
    #[error("event id mismatch: claimed {claimed}, computed {computed}")]
    IdentityMismatch { claimed: String, computed: String },

    /// Well-formed signature that does not verify for the id and pubkey.
    #[error("invalid signature for event {id}")]
    SignatureInvalid { id: String },

    /// The schema rule registered for the event's kind was broken.
    #[error("schema validation failed: {}", join_violations(.0))]
    ValidationFailed(Vec<Violation>),

    /// Parameterized-replaceable kind without exactly one valued `d` tag.
    #[error("kind {kind} requires exactly one d tag with a value, found {found}")]
    MissingDiscriminator { kind: u16, found: usize },

    /// Secret key bytes that are not a valid secp256k1 scalar, or that do not
    /// belong to the pubkey being signed for.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EventError {
    /// True for failures that point at tampering or a broken producer rather
    /// than an ordinary schema mistake.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            EventError::IdentityMismatch { .. } | EventError::SignatureInvalid { .. }
        )
    }

    /// The schema violations carried by a `ValidationFailed` error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            EventError::ValidationFailed(violations) => violations,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
