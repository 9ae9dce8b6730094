//! BIP-340 Schnorr signing and verification over secp256k1.
//!
//! Signatures are produced without auxiliary randomness, so signing the same
//! event with the same key always yields the same signature.

use crate::codec::event_id_bytes;
use crate::error::EventError;
use crate::event::{Event, EventTemplate, UnsignedEvent};
use rand::RngCore;
use secp256k1::{Message, SECP256K1, SecretKey, XOnlyPublicKey, schnorr};
use std::fmt;

/// A secp256k1 keypair whose public half is used as an x-only key.
#[derive(Clone)]
pub struct Keypair {
    inner: secp256k1::Keypair,
    public_key: XOnlyPublicKey,
}

impl Keypair {
    /// Generate a fresh keypair from the thread-local RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            // Out-of-range scalars are astronomically rare; just draw again.
            if let Ok(keypair) = Self::from_secret_bytes(&bytes) {
                return keypair;
            }
        }
    }

    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, EventError> {
        let inner = secp256k1::Keypair::from_seckey_slice(SECP256K1, secret)
            .map_err(|e| EventError::InvalidKey(e.to_string()))?;
        let (public_key, _parity) = inner.x_only_public_key();
        Ok(Self { inner, public_key })
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, EventError> {
        let bytes = hex::decode(secret).map_err(|e| EventError::InvalidKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Lowercase hex x-only public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.inner.secret_bytes()
    }

    /// Sign an unsigned event. Its pubkey must be this key's public half.
    pub fn sign(&self, event: &UnsignedEvent) -> Result<Event, EventError> {
        if event.pubkey != self.public_key_hex() {
            return Err(EventError::InvalidKey(format!(
                "secret key does not match event pubkey {}",
                event.pubkey
            )));
        }

        let digest = event_id_bytes(event)?;
        let message = Message::from_digest(digest);
        let sig = SECP256K1.sign_schnorr_no_aux_rand(&message, &self.inner);

        Ok(Event {
            id: hex::encode(digest),
            pubkey: event.pubkey.clone(),
            created_at: event.created_at,
            kind: event.kind,
            tags: event.tags.clone(),
            content: event.content.clone(),
            sig: hex::encode(sig.serialize()),
        })
    }

    /// Stamp a template with this key's pubkey and sign it.
    pub fn finalize(&self, template: &EventTemplate) -> Result<Event, EventError> {
        self.sign(&template.clone().into_unsigned(self.public_key_hex()))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

pub fn generate_keypair() -> Keypair {
    Keypair::generate()
}

/// Sign `event` with a raw 32-byte secret key.
///
/// Fails with [`EventError::InvalidKey`] if the key is not a valid scalar or
/// does not belong to `event.pubkey`.
pub fn sign_event(event: &UnsignedEvent, secret: &[u8]) -> Result<Event, EventError> {
    Keypair::from_secret_bytes(secret)?.sign(event)
}

/// Sign a template, deriving the pubkey from the secret key.
pub fn finalize_event(template: &EventTemplate, secret: &[u8; 32]) -> Result<Event, EventError> {
    Keypair::from_secret_bytes(secret)?.finalize(template)
}

/// Outcome of checking an event's id and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    /// The claimed id is not the hash of the signable fields.
    IdentityMismatch { computed: String },
    SignatureInvalid,
}

/// Recompute the id and verify the signature.
///
/// Only a structurally broken event (bad hex, wrong lengths, out-of-range
/// timestamp, a pubkey that is not a curve point) is an `Err`; a tampered or
/// forged event is reported through [`Verification`].
pub fn check_signature(event: &Event) -> Result<Verification, EventError> {
    event.check_structure()?;

    let digest = event_id_bytes(&event.unsigned())?;
    let computed = hex::encode(digest);
    if computed != event.id {
        return Ok(Verification::IdentityMismatch { computed });
    }

    let pubkey_bytes =
        hex::decode(&event.pubkey).map_err(|e| EventError::Malformed(e.to_string()))?;
    let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| EventError::Malformed(format!("pubkey is not a valid x-only key: {}", e)))?;

    let sig_bytes = hex::decode(&event.sig).map_err(|e| EventError::Malformed(e.to_string()))?;
    let Ok(sig) = schnorr::Signature::from_slice(&sig_bytes) else {
        return Ok(Verification::SignatureInvalid);
    };

    let message = Message::from_digest(digest);
    match SECP256K1.verify_schnorr(&sig, &message, &pubkey) {
        Ok(()) => Ok(Verification::Valid),
        Err(_) => Ok(Verification::SignatureInvalid),
    }
}

/// `Ok(true)` only if both the id and the signature check out.
pub fn verify_event(event: &Event) -> Result<bool, EventError> {
    Ok(check_signature(event)? == Verification::Valid)
}

/// Check an event and turn anything but [`Verification::Valid`] into the
/// matching error.
pub fn verify_or_reject(event: &Event) -> Result<(), EventError> {
    match check_signature(event)? {
        Verification::Valid => Ok(()),
        Verification::IdentityMismatch { computed } => Err(EventError::IdentityMismatch {
            claimed: event.id.clone(),
            computed,
        }),
        Verification::SignatureInvalid => Err(EventError::SignatureInvalid {
            id: event.id.clone(),
        }),
    }
}

/// True if `secret` is a valid secp256k1 secret key.
pub fn is_valid_secret_key(secret: &[u8]) -> bool {
    SecretKey::from_slice(secret).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_secret() -> [u8; 32] {
        let mut secret = [0u8; 32];
        hex::decode_to_slice(
            "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa",
            &mut secret,
        )
        .unwrap();
        secret
    }

    fn quote(keys: &Keypair) -> UnsignedEvent {
        EventTemplate::new(1503, "")
            .tag(["card".to_string(), format!("30500:{}:dragon", keys.public_key_hex())])
            .tag(["price", "2100"])
            .created_at(1_700_000_000)
            .into_unsigned(keys.public_key_hex())
    }

    #[test]
    fn test_public_key_is_deterministic() {
        let a = Keypair::from_secret_bytes(&test_secret()).unwrap();
        let b = Keypair::from_secret_hex(&hex::encode(test_secret())).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.public_key_hex().len(), 64);
        assert_eq!(a.secret_key_bytes(), test_secret());
    }

    #[test]
    fn test_invalid_secret_keys() {
        assert!(matches!(
            Keypair::from_secret_bytes(&[0u8; 32]),
            Err(EventError::InvalidKey(_))
        ));
        assert!(Keypair::from_secret_bytes(&[1u8; 31]).is_err());
        assert!(Keypair::from_secret_hex("not hex").is_err());
        assert!(!is_valid_secret_key(&[0xffu8; 32]));
        assert!(is_valid_secret_key(&test_secret()));
    }

    #[test]
    fn test_sign_then_verify() {
        let keys = Keypair::from_secret_bytes(&test_secret()).unwrap();
        let event = sign_event(&quote(&keys), &test_secret()).unwrap();
        assert_eq!(event.sig.len(), 128);
        assert_eq!(check_signature(&event).unwrap(), Verification::Valid);
        assert!(verify_event(&event).unwrap());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let keys = Keypair::from_secret_bytes(&test_secret()).unwrap();
        let a = keys.sign(&quote(&keys)).unwrap();
        let b = keys.sign(&quote(&keys)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_rejects_foreign_pubkey() {
        let keys = Keypair::from_secret_bytes(&test_secret()).unwrap();
        let other = generate_keypair();
        let unsigned = quote(&other);
        assert!(matches!(
            sign_event(&unsigned, &keys.secret_key_bytes()),
            Err(EventError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_tampered_content_is_identity_mismatch() {
        let keys = generate_keypair();
        let mut event = keys.sign(&quote(&keys)).unwrap();
        event.content = "tampered".to_string();
        assert!(matches!(
            check_signature(&event).unwrap(),
            Verification::IdentityMismatch { .. }
        ));
        assert!(!verify_event(&event).unwrap());
        assert!(matches!(
            verify_or_reject(&event),
            Err(EventError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_signature_is_invalid() {
        let keys = generate_keypair();
        let mut event = keys.sign(&quote(&keys)).unwrap();
        let mut sig = hex::decode(&event.sig).unwrap();
        sig[10] ^= 0x01;
        event.sig = hex::encode(sig);
        assert_eq!(check_signature(&event).unwrap(), Verification::SignatureInvalid);
        assert!(matches!(
            verify_or_reject(&event),
            Err(EventError::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_signature_from_other_key_is_invalid() {
        let a = generate_keypair();
        let b = generate_keypair();
        let signed_by_a = a.sign(&quote(&a)).unwrap();
        let signed_by_b = b.sign(&quote(&b)).unwrap();

        let mut forged = signed_by_a.clone();
        forged.sig = signed_by_b.sig;
        assert!(!verify_event(&forged).unwrap());
    }

    #[test]
    fn test_structural_garbage_is_err() {
        let keys = generate_keypair();
        let mut event = keys.sign(&quote(&keys)).unwrap();
        event.sig = "xyz".to_string();
        assert!(matches!(
            check_signature(&event),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_finalize_fills_pubkey() {
        let template = EventTemplate::new(1502, "").tag(["e".to_string(), "ab".repeat(32)]);
        let event = finalize_event(&template, &test_secret()).unwrap();
        let keys = Keypair::from_secret_bytes(&test_secret()).unwrap();
        assert_eq!(event.pubkey, keys.public_key_hex());
        assert!(verify_event(&event).unwrap());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keys = Keypair::from_secret_bytes(&test_secret()).unwrap();
        let debug = format!("{:?}", keys);
        assert!(!debug.contains(&hex::encode(test_secret())));
        assert!(debug.contains(&keys.public_key_hex()));
    }
}
