//! Discharge and identity session macaroon minting.

use bakery_proto::{FirstPartyCheck, Macaroon};
use chrono::{DateTime, Duration, Utc};

use super::PendingDischarge;
use crate::store::Identity;

/// Operation named by identity session macaroons.
pub const LOGIN_OP: &str = "login";

/// Declared attribute carrying the session's provider ID.
pub const PROVIDER_ID_ATTR: &str = "provider-id";

/// A discharge and, for login caveats, the session macaroon that goes
/// with it.
#[derive(Debug, Clone)]
pub struct Minted {
    pub discharge: Macaroon,
    pub session: Option<Macaroon>,
}

/// Mint the discharge macaroon for a caveat whose condition holds.
///
/// Login discharges declare the username so the relying party learns who
/// logged in.
pub fn mint_discharge(
    pending: &PendingDischarge,
    identity: &Identity,
    location: &str,
    expires: DateTime<Utc>,
) -> Macaroon {
    let mut m = Macaroon::new(&pending.root_key, pending.caveat_id.clone(), location);
    if pending.condition.is_login() {
        m.add_first_party_caveat(FirstPartyCheck::declared("username", &identity.username).to_string());
    }
    m.add_first_party_caveat(FirstPartyCheck::time_before(expires).to_string());
    m
}

/// Mint an identity session macaroon, bound to `origin` and the
/// identity's provider ID.
pub fn mint_session(
    root_key: &[u8],
    location: &str,
    identity: &Identity,
    origin: Option<&str>,
    expires: DateTime<Utc>,
) -> Macaroon {
    let id = uuid::Uuid::new_v4().as_bytes().to_vec();
    let mut m = Macaroon::new(root_key, id, location);
    m.add_first_party_caveat(FirstPartyCheck::Op(vec![LOGIN_OP.to_string()]).to_string());
    m.add_first_party_caveat(
        FirstPartyCheck::declared(PROVIDER_ID_ATTR, &identity.provider_id).to_string(),
    );
    m.add_first_party_caveat(FirstPartyCheck::Origin(origin.unwrap_or("").to_string()).to_string());
    m.add_first_party_caveat(FirstPartyCheck::time_before(expires).to_string());
    m
}

/// Mint everything a completed discharge returns.
pub fn mint(
    pending: &PendingDischarge,
    identity: &Identity,
    location: &str,
    session_root_key: &[u8],
    discharge_expiry: Duration,
    session_expiry: Duration,
) -> Minted {
    let now = Utc::now();
    let discharge = mint_discharge(pending, identity, location, now + discharge_expiry);
    let session = pending.condition.is_login().then(|| {
        mint_session(
            session_root_key,
            location,
            identity,
            pending.origin.as_deref(),
            now + session_expiry,
        )
    });
    Minted { discharge, session }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_proto::{CheckContext, Condition, infer_declared};
    use zeroize::Zeroizing;

    fn pending(condition: &str) -> PendingDischarge {
        PendingDischarge {
            caveat_id: b"caveat".to_vec(),
            root_key: Zeroizing::new(vec![5u8; 32]),
            condition: condition.parse::<Condition>().unwrap(),
            origin: None,
            domain: None,
        }
    }

    fn bob() -> Identity {
        Identity {
            provider_id: "static:bob".into(),
            username: "bob".into(),
            ..Default::default()
        }
    }

    fn ctx(origin: Option<&str>) -> CheckContext<'_> {
        CheckContext {
            now: Utc::now(),
            origin,
            op: Some(LOGIN_OP),
        }
    }

    #[test]
    fn login_discharge_declares_username() {
        let minted = mint(
            &pending("is-authenticated-user"),
            &bob(),
            "https://idm",
            &[9u8; 32],
            Duration::minutes(1),
            Duration::days(1),
        );
        assert_eq!(minted.discharge.id(), b"caveat");
        assert_eq!(
            infer_declared(&minted.discharge).get("username").map(String::as_str),
            Some("bob")
        );

        let session = minted.session.unwrap();
        session
            .verify(&[9u8; 32], |c| ctx(None).check(c), &[])
            .unwrap();
        assert_eq!(
            infer_declared(&session).get(PROVIDER_ID_ATTR).map(String::as_str),
            Some("static:bob")
        );
    }

    #[test]
    fn member_of_discharge_has_no_session() {
        let minted = mint(
            &pending("is-member-of staff"),
            &bob(),
            "https://idm",
            &[9u8; 32],
            Duration::minutes(1),
            Duration::days(1),
        );
        assert!(minted.session.is_none());
        assert!(infer_declared(&minted.discharge).is_empty());
    }

    #[test]
    fn session_is_bound_to_origin() {
        let session = mint_session(
            &[9u8; 32],
            "https://idm",
            &bob(),
            None,
            Utc::now() + Duration::hours(1),
        );
        assert!(session.verify(&[9u8; 32], |c| ctx(Some("somewhere")).check(c), &[]).is_err());
    }

    #[test]
    fn sessions_are_never_reused() {
        let a = mint_session(&[9u8; 32], "l", &bob(), None, Utc::now() + Duration::hours(1));
        let b = mint_session(&[9u8; 32], "l", &bob(), None, Utc::now() + Duration::hours(1));
        assert_ne!(a.signature(), b.signature());
    }
}
