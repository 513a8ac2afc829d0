//! Macaroons with chained HMAC-SHA256 signatures.
//!
//! A macaroon is minted from a secret root key and an identifier. Every
//! caveat added afterwards folds into the signature, so caveats can be
//! appended by anyone holding the macaroon but never removed.
//!
//! Third-party caveats additionally carry a verification ID: the caveat's
//! own root key sealed under the signature at the point the caveat was
//! added. The third party recovers that root key from the caveat ID, mints
//! a discharge macaroon with it, and the client binds the discharge to the
//! primary macaroon before sending both.

mod serialize;

pub use serialize::{decode_base64, decode_slice, encode_slice};

use subtle::ConstantTimeEq;

use crate::crypto::{self, KEY_LEN};
use crate::error::{ProtocolError, VerificationError};

/// A caveat attached to a macaroon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caveat {
    /// Caveat identifier. For first-party caveats this is the condition.
    pub id: Vec<u8>,
    /// Sealed caveat root key; present only on third-party caveats.
    pub verification_id: Option<Vec<u8>>,
    /// Location hint of the third party.
    pub location: Option<String>,
}

impl Caveat {
    /// Whether a third party must discharge this caveat.
    pub fn is_third_party(&self) -> bool {
        self.verification_id.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// The first-party condition text, if the identifier is UTF-8.
    pub fn condition(&self) -> Option<&str> {
        if self.is_third_party() {
            return None;
        }
        std::str::from_utf8(&self.id).ok()
    }
}

/// A macaroon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macaroon {
    location: String,
    id: Vec<u8>,
    caveats: Vec<Caveat>,
    signature: [u8; KEY_LEN],
}

impl Macaroon {
    /// Mint a macaroon from a root key.
    pub fn new(root_key: &[u8], id: Vec<u8>, location: impl Into<String>) -> Self {
        let signature = crypto::keyed_hash(&crypto::derive_root_key(root_key), &id);
        Self {
            location: location.into(),
            id,
            caveats: Vec::new(),
            signature,
        }
    }

    /// Rebuild a macaroon from its parts without checking the signature.
    pub(crate) fn from_parts(
        location: String,
        id: Vec<u8>,
        caveats: Vec<Caveat>,
        signature: [u8; KEY_LEN],
    ) -> Self {
        Self {
            location,
            id,
            caveats,
            signature,
        }
    }

    /// Location hint of the minting service.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Macaroon identifier.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Caveats in the order they were added.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// Current signature.
    pub fn signature(&self) -> &[u8; KEY_LEN] {
        &self.signature
    }

    /// Append a first-party caveat.
    pub fn add_first_party_caveat(&mut self, condition: impl Into<String>) {
        let id = condition.into().into_bytes();
        self.signature = crypto::keyed_hash(&self.signature, &id);
        self.caveats.push(Caveat {
            id,
            verification_id: None,
            location: None,
        });
    }

    /// Append a third-party caveat whose discharge must be minted with `root_key`.
    ///
    /// The macaroon is left unchanged if the root key cannot be sealed.
    pub fn add_third_party_caveat(
        &mut self,
        root_key: &[u8],
        id: Vec<u8>,
        location: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let vid = crypto::seal(&self.signature, root_key).ok_or(ProtocolError::Encrypt)?;
        self.signature = crypto::keyed_hash2(&self.signature, &vid, &id);
        self.caveats.push(Caveat {
            id,
            verification_id: Some(vid),
            location: Some(location.into()),
        });
        Ok(())
    }

    /// Bind `discharge` to this macaroon so it cannot be reused with another.
    pub fn bind_for_request(&self, discharge: &mut Macaroon) {
        discharge.signature = crypto::bind_signature(&self.signature, &discharge.signature);
    }

    /// Verify this macaroon and its bound discharges.
    ///
    /// `check` is called with every first-party condition, including those
    /// inside discharges, and returns a reason on failure.
    pub fn verify<F>(
        &self,
        root_key: &[u8],
        check: F,
        discharges: &[Macaroon],
    ) -> Result<(), VerificationError>
    where
        F: Fn(&str) -> Result<(), String>,
    {
        let mut used = vec![false; discharges.len()];
        self.verify_with(
            crypto::derive_root_key(root_key),
            None,
            &self.signature,
            &check,
            discharges,
            &mut used,
        )?;
        if let Some(i) = used.iter().position(|u| !u) {
            return Err(VerificationError::DischargeNotUsed(
                String::from_utf8_lossy(discharges[i].id()).into_owned(),
            ));
        }
        Ok(())
    }

    fn verify_with<F>(
        &self,
        key: [u8; KEY_LEN],
        primary_signature: Option<&[u8; KEY_LEN]>,
        root_signature: &[u8; KEY_LEN],
        check: &F,
        discharges: &[Macaroon],
        used: &mut [bool],
    ) -> Result<(), VerificationError>
    where
        F: Fn(&str) -> Result<(), String>,
    {
        let mut sig = crypto::keyed_hash(&key, &self.id);
        for cav in &self.caveats {
            match &cav.verification_id {
                Some(vid) if !vid.is_empty() => {
                    let cav_key =
                        crypto::open(&sig, vid).ok_or(VerificationError::VerificationId)?;
                    let idx = discharges
                        .iter()
                        .position(|d| d.id == cav.id)
                        .ok_or_else(|| {
                            VerificationError::DischargeNotFound(
                                String::from_utf8_lossy(&cav.id).into_owned(),
                            )
                        })?;
                    if used[idx] {
                        return Err(VerificationError::DischargeUsedTwice(
                            String::from_utf8_lossy(&cav.id).into_owned(),
                        ));
                    }
                    used[idx] = true;
                    discharges[idx].verify_with(
                        crypto::derive_root_key(&cav_key),
                        Some(root_signature),
                        root_signature,
                        check,
                        discharges,
                        used,
                    )?;
                    sig = crypto::keyed_hash2(&sig, vid, &cav.id);
                }
                _ => {
                    let condition = String::from_utf8_lossy(&cav.id);
                    check(&condition).map_err(|reason| VerificationError::CaveatNotSatisfied {
                        condition: condition.clone().into_owned(),
                        reason,
                    })?;
                    sig = crypto::keyed_hash(&sig, &cav.id);
                }
            }
        }

        let expected = match primary_signature {
            Some(primary) => crypto::bind_signature(primary, &sig),
            None => sig,
        };
        if bool::from(expected.ct_eq(&self.signature)) {
            Ok(())
        } else {
            Err(VerificationError::SignatureMismatch)
        }
    }
}
