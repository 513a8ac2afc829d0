//! Sealed third-party caveat payloads.
//!
//! The relying party encrypts the caveat root key and the condition to the
//! discharger's public key. Key agreement is X25519 between the relying
//! party's key pair and the discharger's, stretched with HKDF-SHA256 and
//! used with ChaCha20-Poly1305.
//!
//! Wire layout:
//!
//! ```text
//! version(1) | key hint(4) | first-party public key(32) | nonce(12) | ciphertext
//! plaintext = root key length(1) | root key | condition
//! ```

use hkdf::Hkdf;
use sha2::Sha256;

use crate::crypto::{self, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::ProtocolError;
use crate::keys::{KeyPair, PublicKey};

/// Current caveat layout version.
pub const CAVEAT_VERSION: u8 = 3;

/// Domain separator for the caveat box key.
const BOX_INFO: &[u8] = b"bakery-third-party-caveat-v3";

const HEADER_LEN: usize = 1 + 4 + KEY_LEN;

/// A decrypted third-party caveat.
#[derive(Debug, Clone)]
pub struct ThirdPartyCaveat {
    first_party: PublicKey,
    root_key: Vec<u8>,
    condition: String,
}

impl ThirdPartyCaveat {
    /// Seal `condition` and `root_key` for the discharger holding `third_party`.
    pub fn seal(
        first_party: &KeyPair,
        third_party: &PublicKey,
        root_key: &[u8],
        condition: &str,
    ) -> Result<Vec<u8>, ProtocolError> {
        let root_len = u8::try_from(root_key.len()).map_err(|_| ProtocolError::KeyLength {
            actual: root_key.len(),
            expected: KEY_LEN,
        })?;
        let fp_public = first_party.public_key();
        let key = box_key(
            &first_party.shared_secret(third_party),
            &fp_public,
            third_party,
        );

        let mut plaintext = Vec::with_capacity(1 + root_key.len() + condition.len());
        plaintext.push(root_len);
        plaintext.extend_from_slice(root_key);
        plaintext.extend_from_slice(condition.as_bytes());
        let sealed = crypto::seal(&key, &plaintext).ok_or(ProtocolError::Encrypt)?;

        let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
        out.push(CAVEAT_VERSION);
        out.extend_from_slice(&third_party.hint());
        out.extend_from_slice(fp_public.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a caveat payload addressed to `key`.
    pub fn open(key: &KeyPair, data: &[u8]) -> Result<Self, ProtocolError> {
        let Some(&version) = data.first() else {
            return Err(ProtocolError::CaveatTooShort);
        };
        if version != CAVEAT_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        if data.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(ProtocolError::CaveatTooShort);
        }
        if data[1..5] != key.public_key().hint() {
            return Err(ProtocolError::PublicKeyMismatch);
        }
        let mut fp = [0u8; KEY_LEN];
        fp.copy_from_slice(&data[5..HEADER_LEN]);
        let first_party = PublicKey::from_bytes(fp);

        let box_key = box_key(
            &key.shared_secret(&first_party),
            &first_party,
            &key.public_key(),
        );
        let plaintext = crypto::open(&box_key, &data[HEADER_LEN..]).ok_or(ProtocolError::Decrypt)?;

        let (&root_len, rest) = plaintext.split_first().ok_or(ProtocolError::CaveatTooShort)?;
        let root_len = usize::from(root_len);
        if rest.len() < root_len {
            return Err(ProtocolError::CaveatTooShort);
        }
        let (root_key, condition) = rest.split_at(root_len);
        let condition =
            String::from_utf8(condition.to_vec()).map_err(|_| ProtocolError::ConditionEncoding)?;

        Ok(Self {
            first_party,
            root_key: root_key.to_vec(),
            condition,
        })
    }

    /// Public key of the relying party that sealed the caveat.
    pub fn first_party_key(&self) -> &PublicKey {
        &self.first_party
    }

    /// Root key the discharge macaroon must be minted with.
    pub fn root_key(&self) -> &[u8] {
        &self.root_key
    }

    /// The caveat condition text.
    pub fn condition(&self) -> &str {
        &self.condition
    }
}

fn box_key(shared: &[u8; KEY_LEN], first_party: &PublicKey, third_party: &PublicKey) -> [u8; KEY_LEN] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut info = Vec::with_capacity(BOX_INFO.len() + 2 * KEY_LEN);
    info.extend_from_slice(BOX_INFO);
    info.extend_from_slice(first_party.as_bytes());
    info.extend_from_slice(third_party.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(&info, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_what_was_sealed() {
        let rp = KeyPair::generate();
        let idm = KeyPair::generate();
        let id = ThirdPartyCaveat::seal(&rp, &idm.public_key(), &[8u8; 24], "is-authenticated-user").unwrap();
        assert_eq!(id[0], CAVEAT_VERSION);

        let cav = ThirdPartyCaveat::open(&idm, &id).unwrap();
        assert_eq!(cav.condition(), "is-authenticated-user");
        assert_eq!(cav.root_key(), &[8u8; 24]);
        assert_eq!(cav.first_party_key(), &rp.public_key());
    }

    #[test]
    fn wrong_recipient_is_rejected() {
        let rp = KeyPair::generate();
        let idm = KeyPair::generate();
        let mut other = KeyPair::generate();
        while other.public_key().hint() == idm.public_key().hint() {
            other = KeyPair::generate();
        }
        let id = ThirdPartyCaveat::seal(&rp, &idm.public_key(), &[1u8; 32], "x").unwrap();
        assert!(matches!(
            ThirdPartyCaveat::open(&other, &id),
            Err(ProtocolError::PublicKeyMismatch)
        ));
    }

    #[test]
    fn tampering_fails_decryption() {
        let rp = KeyPair::generate();
        let idm = KeyPair::generate();
        let mut id = ThirdPartyCaveat::seal(&rp, &idm.public_key(), &[1u8; 32], "x").unwrap();
        let last = id.len() - 1;
        id[last] ^= 0x01;
        assert!(matches!(ThirdPartyCaveat::open(&idm, &id), Err(ProtocolError::Decrypt)));
    }

    #[test]
    fn version_and_length_checks() {
        let idm = KeyPair::generate();
        assert!(matches!(ThirdPartyCaveat::open(&idm, &[]), Err(ProtocolError::CaveatTooShort)));
        assert!(matches!(
            ThirdPartyCaveat::open(&idm, b"plain text id"),
            Err(ProtocolError::UnsupportedVersion(b'p'))
        ));
        assert!(matches!(
            ThirdPartyCaveat::open(&idm, &[CAVEAT_VERSION, 0, 0]),
            Err(ProtocolError::CaveatTooShort)
        ));
    }
}
