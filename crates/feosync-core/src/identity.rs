//! Identity and signature primitives.
//!
//! Wraps Ed25519 keys and signatures with strong types and base58 text forms.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use crate::error::ValidationError;

/// Length of a public key (and of a private key seed).
pub const USER_ID_BYTES: usize = 32;

/// Length of a detached signature.
pub const SIGNATURE_BYTES: usize = 64;

/// Length of a base58check-decoded private key: 32-byte seed + 4-byte checksum.
pub const PRIVATE_KEY_ENCODED_BYTES: usize = USER_ID_BYTES + 4;

fn decode_base58(what: &'static str, value: &str) -> Result<Vec<u8>, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty(what));
    }
    bs58::decode(value)
        .into_vec()
        .map_err(|_| ValidationError::InvalidBase58(what))
}

fn check_length(what: &'static str, expected: usize, got: usize) -> Result<(), ValidationError> {
    if got < expected {
        return Err(ValidationError::TooShort {
            what,
            expected,
            got,
        });
    }
    if got > expected {
        return Err(ValidationError::TooLong {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// A user's identity: a 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId([u8; USER_ID_BYTES]);

impl UserId {
    /// Create from raw bytes.
    ///
    /// A 36-byte input is rejected separately: that is the length of a
    /// decoded private key, which users sometimes paste by mistake.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() == PRIVATE_KEY_ENCODED_BYTES {
            return Err(ValidationError::LooksLikePrivateKey);
        }
        check_length("UserID", USER_ID_BYTES, bytes.len())?;
        let mut arr = [0u8; USER_ID_BYTES];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Parse from the base58 representation.
    pub fn from_base58(value: &str) -> Result<Self, ValidationError> {
        let bytes = decode_base58("UserID", value)?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; USER_ID_BYTES] {
        &self.0
    }

    /// Convert to base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_base58(value)
    }
}

impl TryFrom<&[u8]> for UserId {
    type Error = ValidationError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.to_base58())
    }
}

impl AsRef<[u8]> for UserId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 64-byte detached Ed25519 signature.
///
/// Only meaningful together with the [`UserId`] that produced it and the
/// exact bytes it was computed over.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature([u8; SIGNATURE_BYTES]);

impl Signature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        check_length("Signature", SIGNATURE_BYTES, bytes.len())?;
        let mut arr = [0u8; SIGNATURE_BYTES];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Parse from the base58 representation.
    pub fn from_base58(value: &str) -> Result<Self, ValidationError> {
        let bytes = decode_base58("Signature", value)?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }

    /// Convert to base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True if this signature is valid for `user` over exactly `bytes`.
    pub fn verify(&self, user: &UserId, bytes: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(user.as_bytes()) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        verifying_key.verify_strict(bytes, &sig).is_ok()
    }
}

impl FromStr for Signature {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_base58(value)
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = ValidationError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A private signing key.
///
/// Meant to be constructed, used to sign, and dropped. Feosync never
/// persists one.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Parse a base58check-encoded seed (32 bytes + 4 byte checksum).
    pub fn from_base58(encoded: &str) -> Result<Self, ValidationError> {
        let raw = decode_base58("Private key", encoded)?;
        check_length("Private key", PRIVATE_KEY_ENCODED_BYTES, raw.len())?;

        let seed = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|_| ValidationError::BadChecksum)?;
        let seed: [u8; USER_ID_BYTES] = seed
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::BadChecksum)?;

        Ok(Self::from_seed(&seed))
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; USER_ID_BYTES]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// The public half of this key.
    pub fn user_id(&self) -> UserId {
        UserId(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Encode the seed as base58check.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.signing_key.to_bytes())
            .with_check()
            .into_string()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(for {})", self.user_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = PrivateKey::from_seed(&[0x42; 32]);
        let message = b"hello world";
        let signature = key.sign(message);

        assert!(signature.verify(&key.user_id(), message));
    }

    #[test]
    fn test_tampered_message_fails() {
        let key = PrivateKey::from_seed(&[0x42; 32]);
        let message = b"hello world".to_vec();
        let signature = key.sign(&message);

        for i in 0..message.len() {
            let mut tampered = message.clone();
            tampered[i] ^= 0x01;
            assert!(!signature.verify(&key.user_id(), &tampered));
        }
    }

    #[test]
    fn test_tampered_signature_fails() {
        let key = PrivateKey::from_seed(&[0x07; 32]);
        let message = b"signed bytes";
        let signature = key.sign(message);

        for i in 0..SIGNATURE_BYTES {
            let mut bytes = *signature.as_bytes();
            bytes[i] ^= 0x80;
            let tampered = Signature::from_bytes(&bytes).unwrap();
            assert!(!tampered.verify(&key.user_id(), message), "byte {i}");
        }
    }

    #[test]
    fn test_other_user_fails() {
        let alice = PrivateKey::from_seed(&[1; 32]);
        let bob = PrivateKey::from_seed(&[2; 32]);
        let signature = alice.sign(b"msg");

        assert!(!signature.verify(&bob.user_id(), b"msg"));
    }

    #[test]
    fn test_user_id_base58_roundtrip() {
        let user = PrivateKey::from_seed(&[0x11; 32]).user_id();
        let text = user.to_string();
        assert_eq!(text.parse::<UserId>().unwrap(), user);
    }

    #[test]
    fn test_user_id_rejects_bad_input() {
        assert_eq!(UserId::from_base58(""), Err(ValidationError::Empty("UserID")));
        assert_eq!(
            UserId::from_base58("0OIl"),
            Err(ValidationError::InvalidBase58("UserID"))
        );
        assert!(matches!(
            UserId::from_bytes(&[0u8; 31]),
            Err(ValidationError::TooShort { got: 31, .. })
        ));
        assert!(matches!(
            UserId::from_bytes(&[0u8; 33]),
            Err(ValidationError::TooLong { got: 33, .. })
        ));
    }

    #[test]
    fn test_user_id_rejects_private_key() {
        let key = PrivateKey::from_seed(&[0x33; 32]);
        let pasted = key.to_base58();
        assert_eq!(
            UserId::from_base58(&pasted),
            Err(ValidationError::LooksLikePrivateKey)
        );
    }

    #[test]
    fn test_signature_length() {
        assert!(Signature::from_bytes(&[0u8; 64]).is_ok());
        assert!(matches!(
            Signature::from_bytes(&[0u8; 63]),
            Err(ValidationError::TooShort { .. })
        ));
        assert!(matches!(
            Signature::from_bytes(&[0u8; 65]),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_private_key_roundtrip() {
        let key = PrivateKey::from_seed(&[0x55; 32]);
        let encoded = key.to_base58();
        let decoded = PrivateKey::from_base58(&encoded).unwrap();
        assert_eq!(decoded.user_id(), key.user_id());
    }

    #[test]
    fn test_private_key_bad_checksum() {
        let mut raw = bs58::decode(PrivateKey::from_seed(&[0x55; 32]).to_base58())
            .into_vec()
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let corrupted = bs58::encode(raw).into_string();

        assert_eq!(
            PrivateKey::from_base58(&corrupted).unwrap_err(),
            ValidationError::BadChecksum
        );
    }

    #[test]
    fn test_private_key_wrong_length() {
        let short = bs58::encode([1u8; 32]).into_string();
        assert!(matches!(
            PrivateKey::from_base58(&short),
            Err(ValidationError::TooShort { .. })
        ));
    }
}
