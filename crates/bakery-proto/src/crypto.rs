//! Keyed hashing and symmetric sealing shared by macaroons and caveats.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of signatures, root keys and symmetric keys.
pub(crate) const KEY_LEN: usize = 32;

/// Length of a ChaCha20-Poly1305 nonce.
pub(crate) const NONCE_LEN: usize = 12;

/// Length of the Poly1305 authentication tag.
pub(crate) const TAG_LEN: usize = 16;

/// Fixed key used to turn arbitrary-length root keys into HMAC keys.
const KEY_GENERATOR: &[u8] = b"macaroons-key-generator";

/// HMAC-SHA256 of `data` under `key`.
pub(crate) fn keyed_hash(key: &[u8], data: &[u8]) -> [u8; KEY_LEN] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Hash two values under the same key so neither can be swapped or extended.
pub(crate) fn keyed_hash2(key: &[u8], d1: &[u8], d2: &[u8]) -> [u8; KEY_LEN] {
    let h1 = keyed_hash(key, d1);
    let h2 = keyed_hash(key, d2);
    let mut joined = [0u8; KEY_LEN * 2];
    joined[..KEY_LEN].copy_from_slice(&h1);
    joined[KEY_LEN..].copy_from_slice(&h2);
    keyed_hash(key, &joined)
}

/// Derive the HMAC key actually used for a macaroon root key.
pub(crate) fn derive_root_key(root_key: &[u8]) -> [u8; KEY_LEN] {
    keyed_hash(KEY_GENERATOR, root_key)
}

/// Signature of a discharge once bound to the primary macaroon's signature.
pub(crate) fn bind_signature(primary: &[u8], discharge: &[u8]) -> [u8; KEY_LEN] {
    keyed_hash2(&[0u8; KEY_LEN], primary, discharge)
}

/// Fresh random bytes from the thread RNG.
pub(crate) fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// Seal `plaintext` under a 32-byte key. Output is `nonce | ciphertext`.
pub(crate) fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = random_array::<NONCE_LEN>();
    let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce), plaintext).ok()?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Some(out)
}

/// Open a value produced by [`seal`].
pub(crate) fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return None;
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_hash2_is_order_sensitive() {
        let key = [3u8; KEY_LEN];
        assert_ne!(keyed_hash2(&key, b"a", b"b"), keyed_hash2(&key, b"b", b"a"));
    }

    #[test]
    fn seal_then_open() {
        let key = [9u8; KEY_LEN];
        let sealed = seal(&key, b"root key material").unwrap();
        assert_eq!(open(&key, &sealed).unwrap(), b"root key material");
    }

    #[test]
    fn open_rejects_wrong_key_and_short_input() {
        let sealed = seal(&[1u8; KEY_LEN], b"x").unwrap();
        assert!(open(&[2u8; KEY_LEN], &sealed).is_none());
        assert!(open(&[1u8; KEY_LEN], &sealed[..10]).is_none());
    }
}
