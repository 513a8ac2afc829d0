//! # bakery-proto
//!
//! Macaroon primitives and the third-party caveat protocol spoken between
//! relying parties, clients and a discharging identity service.
//!
//! ## Features
//!
//! - HMAC-SHA256 chained macaroons with first and third-party caveats
//! - Request binding of discharge macaroons and recursive verification
//! - Sealed third-party caveat payloads (X25519 + ChaCha20-Poly1305)
//! - The identity caveat grammar (`is-authenticated-user`, `is-member-of`)
//! - First-party caveat checkers (`time-before`, `declared`, `origin`, `op`)
//! - Bakery protocol version negotiation
//!
//! ## Quick Start
//!
//! ```rust
//! use bakery_proto::{Condition, KeyPair, Macaroon, ThirdPartyCaveat};
//!
//! let discharger = KeyPair::generate();
//! let relying_party = KeyPair::generate();
//!
//! // The relying party seals a condition for the discharger.
//! let cav_root_key = [7u8; 32];
//! let id = ThirdPartyCaveat::seal(&relying_party, &discharger.public_key(), &cav_root_key, "is-member-of admins")
//!     .expect("seal caveat");
//!
//! let mut m = Macaroon::new(&[1u8; 32], b"primary".to_vec(), "https://rp.example");
//! m.add_third_party_caveat(&cav_root_key, id.clone(), "https://idm.example")
//!     .expect("add caveat");
//!
//! // The discharger opens it and parses the condition.
//! let caveat = ThirdPartyCaveat::open(&discharger, &id).expect("open caveat");
//! let condition: Condition = caveat.condition().parse().expect("parse condition");
//! assert_eq!(condition.groups(), &["admins".to_string()]);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod checkers;
pub mod condition;
mod crypto;
pub mod error;
pub mod keys;
pub mod macaroon;
pub mod third_party;
pub mod version;

pub use checkers::{CheckContext, FirstPartyCheck, infer_declared};
pub use condition::{Condition, is_valid_domain};
pub use error::{ConditionError, ProtocolError, Result, VerificationError};
pub use keys::{KeyPair, PublicKey};
pub use macaroon::{Caveat, Macaroon, decode_base64, decode_slice, encode_slice};
pub use third_party::ThirdPartyCaveat;
pub use version::BakeryVersion;
