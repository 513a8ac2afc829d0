//! Discharger key pairs.
//!
//! Relying parties encrypt third-party caveat payloads to the discharger's
//! public key, which is published at `/publickey`. Keys are X25519 and are
//! exchanged as standard base64 strings.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use curve25519_dalek::montgomery::MontgomeryPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_LEN, random_array};
use crate::error::ProtocolError;

/// A public X25519 key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short prefix embedded in caveat IDs to detect misaddressed caveats.
    pub(crate) fn hint(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64.decode(s.trim())?;
        let arr: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProtocolError::KeyLength {
                actual: bytes.len(),
                expected: KEY_LEN,
            })?;
        Ok(Self(arr))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An X25519 key pair. The private half is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    private: [u8; KEY_LEN],
    #[zeroize(skip)]
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self::from_private(random_array::<KEY_LEN>())
    }

    /// Rebuild a key pair from its private scalar bytes.
    pub fn from_private(private: [u8; KEY_LEN]) -> Self {
        let public = PublicKey(MontgomeryPoint::mul_base_clamped(private).to_bytes());
        Self { private, public }
    }

    /// Parse a base64-encoded private key.
    pub fn from_base64(encoded: &str) -> Result<Self, ProtocolError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let private: [u8; KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| ProtocolError::KeyLength {
                    actual: bytes.len(),
                    expected: KEY_LEN,
                })?;
        Ok(Self::from_private(private))
    }

    /// The public half.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// X25519 shared secret with a peer's public key.
    pub(crate) fn shared_secret(&self, peer: &PublicKey) -> [u8; KEY_LEN] {
        MontgomeryPoint(peer.0).mul_clamped(self.private).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_agrees() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(
            a.shared_secret(&b.public_key()),
            b.shared_secret(&a.public_key())
        );
    }

    #[test]
    fn public_key_text_form() {
        let kp = KeyPair::from_private([5u8; KEY_LEN]);
        let text = kp.public_key().to_string();
        let parsed: PublicKey = text.parse().unwrap();
        assert_eq!(parsed, kp.public_key());

        let json = serde_json::to_string(&kp.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", text));
    }

    #[test]
    fn rejects_short_keys() {
        let err = "AAAA".parse::<PublicKey>().unwrap_err();
        assert!(matches!(err, ProtocolError::KeyLength { actual: 3, expected: 32 }));
    }

    #[test]
    fn debug_hides_private_key() {
        let kp = KeyPair::from_private([0xAB; KEY_LEN]);
        let debug = format!("{:?}", kp);
        assert!(debug.contains("public"));
        assert!(!debug.contains("171"));
    }
}
