//! Condition evaluation against a resolved identity.

use bakery_proto::Condition;

use crate::error::DischargeError;
use crate::store::Identity;

/// Check `condition` for `identity`. Never touches the store.
pub fn evaluate(condition: &Condition, identity: &Identity) -> Result<(), DischargeError> {
    if let Some(domain) = condition.domain()
        && identity.domain() != Some(domain)
    {
        return Err(DischargeError::Refused(format!(
            "{:?} not in required domain {:?}",
            identity.username, domain
        )));
    }
    match condition {
        Condition::IsAuthenticatedUser { .. } => Ok(()),
        Condition::IsMemberOf { groups, .. } => {
            if groups.iter().any(|g| identity.is_member_of(g)) {
                Ok(())
            } else {
                Err(DischargeError::Refused(
                    "user is not a member of required groups".to_string(),
                ))
            }
        }
    }
}
