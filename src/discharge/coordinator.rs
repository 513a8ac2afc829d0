//! Login session coordinator.
//!
//! Every discharge that needs an interactive login gets a ticket keyed by
//! its `waitid`. The identity provider completes the ticket exactly once;
//! the wait request blocks on it until then, or until the wait timeout.
//!
//! ```text
//! Pending ──reserve──▶ Reserved ──login_success/failure──▶ LoggedIn | Failed ──wait──▶ Consumed
//!    │                    │
//!    │                    └──release──▶ Pending
//!    └──ticket_lifetime elapsed (sweep)──▶ Expired
//! ```
//!
//! A provider reserves the ticket before it writes the identity to the
//! store, so a login against a used or expired ticket changes nothing.
//!
//! Tickets are removed when consumed. Expired tickets stay as tombstones
//! for one more lifetime so late waits get "discharge timed out" rather
//! than "invalid waitid".

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::PendingDischarge;
use crate::error::DischargeError;
use crate::store::Identity;

#[derive(Debug)]
enum TicketState {
    Pending,
    Reserved,
    LoggedIn(Identity),
    Failed(String),
    Consumed,
    Expired,
}

#[derive(Debug)]
struct Ticket {
    pending: PendingDischarge,
    created: Instant,
    state: Mutex<TicketState>,
    done: Notify,
}

/// A completed login, ready to be minted.
#[derive(Debug)]
pub struct CompletedLogin {
    pub identity: Identity,
    pub pending: PendingDischarge,
}

/// In-flight interactive logins keyed by waitid.
#[derive(Debug, Default)]
pub struct TicketTable {
    tickets: DashMap<String, Arc<Ticket>>,
}

impl TicketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a ticket for a discharge awaiting login.
    pub fn create(&self, pending: PendingDischarge) -> String {
        let waitid = uuid::Uuid::new_v4().simple().to_string();
        self.tickets.insert(
            waitid.clone(),
            Arc::new(Ticket {
                pending,
                created: Instant::now(),
                state: Mutex::new(TicketState::Pending),
                done: Notify::new(),
            }),
        );
        crate::metrics::set_pending_tickets(self.tickets.len());
        debug!(waitid = %waitid, "Ticket created");
        waitid
    }

    fn get(&self, waitid: &str) -> Result<Arc<Ticket>, DischargeError> {
        self.tickets
            .get(waitid)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| DischargeError::InvalidWaitId(waitid.to_string()))
    }

    /// Domain the discharge asked logins to be scoped to.
    pub fn domain(&self, waitid: &str) -> Option<String> {
        self.tickets
            .get(waitid)
            .and_then(|t| t.pending.domain.clone())
    }

    /// Claim a pending ticket for a login in progress. Only one login can
    /// hold the claim.
    pub fn reserve(&self, waitid: &str) -> Result<(), DischargeError> {
        let ticket = self.get(waitid)?;
        let mut state = ticket.state.lock();
        match *state {
            TicketState::Pending => {
                *state = TicketState::Reserved;
                Ok(())
            }
            TicketState::Expired => Err(DischargeError::Timeout),
            _ => Err(DischargeError::AlreadyUsed),
        }
    }

    /// Return a reserved ticket to pending after the login could not be
    /// recorded.
    pub fn release(&self, waitid: &str) {
        if let Ok(ticket) = self.get(waitid) {
            let mut state = ticket.state.lock();
            if matches!(*state, TicketState::Reserved) {
                *state = TicketState::Pending;
            }
        }
    }

    /// Record the outcome of a login. A ticket completes at most once.
    pub fn complete(
        &self,
        waitid: &str,
        outcome: Result<Identity, String>,
    ) -> Result<(), DischargeError> {
        let ticket = self.get(waitid)?;
        {
            let mut state = ticket.state.lock();
            match *state {
                TicketState::Pending | TicketState::Reserved => {}
                TicketState::Expired => return Err(DischargeError::Timeout),
                _ => return Err(DischargeError::AlreadyUsed),
            }
            *state = match outcome {
                Ok(identity) => TicketState::LoggedIn(identity),
                Err(message) => TicketState::Failed(message),
            };
        }
        ticket.done.notify_waiters();
        Ok(())
    }

    /// Wait for the ticket's login to complete, for at most `timeout`.
    ///
    /// A successful wait consumes the ticket. Timing out leaves it pending
    /// so the client can wait again until the ticket itself expires.
    pub async fn wait(
        &self,
        waitid: &str,
        timeout: Duration,
    ) -> Result<CompletedLogin, DischargeError> {
        let ticket = self.get(waitid)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = ticket.done.notified();
            {
                let mut state = ticket.state.lock();
                match std::mem::replace(&mut *state, TicketState::Consumed) {
                    TicketState::LoggedIn(identity) => {
                        drop(state);
                        self.remove(waitid);
                        return Ok(CompletedLogin {
                            identity,
                            pending: ticket.pending.clone(),
                        });
                    }
                    TicketState::Failed(message) => {
                        drop(state);
                        self.remove(waitid);
                        return Err(DischargeError::LoginFailed(message));
                    }
                    TicketState::Consumed => return Err(DischargeError::AlreadyUsed),
                    other @ (TicketState::Pending | TicketState::Reserved | TicketState::Expired) => {
                        let expired = matches!(other, TicketState::Expired);
                        *state = other;
                        if expired {
                            return Err(DischargeError::Timeout);
                        }
                    }
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                crate::metrics::record_wait_timeout();
                return Err(DischargeError::Timeout);
            }
        }
    }

    fn remove(&self, waitid: &str) {
        self.tickets.remove(waitid);
        crate::metrics::set_pending_tickets(self.tickets.len());
    }

    /// Expire pending tickets older than `lifetime` and drop tombstones
    /// older than twice that. Returns the number of tickets expired.
    pub fn sweep(&self, lifetime: Duration) -> usize {
        let mut expired = 0;
        self.tickets.retain(|waitid, ticket| {
            let age = ticket.created.elapsed();
            if age < lifetime {
                return true;
            }
            let mut state = ticket.state.lock();
            if matches!(*state, TicketState::Pending | TicketState::Reserved) {
                *state = TicketState::Expired;
                drop(state);
                ticket.done.notify_waiters();
                expired += 1;
                debug!(waitid = %waitid, "Ticket expired");
                return true;
            }
            age < lifetime * 2 && matches!(*state, TicketState::Expired)
        });
        crate::metrics::set_pending_tickets(self.tickets.len());
        expired
    }

    /// Number of tickets held, tombstones included.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakery_proto::Condition;

    fn pending() -> PendingDischarge {
        PendingDischarge {
            caveat_id: b"cav".to_vec(),
            root_key: zeroize::Zeroizing::new(vec![1u8; 32]),
            condition: Condition::IsAuthenticatedUser { domain: None },
            origin: None,
            domain: None,
        }
    }

    fn alice() -> Identity {
        Identity {
            provider_id: "test:alice".into(),
            username: "alice".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn wait_returns_after_completion() {
        let table = Arc::new(TicketTable::new());
        let waitid = table.create(pending());

        let waiter = {
            let table = Arc::clone(&table);
            let waitid = waitid.clone();
            tokio::spawn(async move { table.wait(&waitid, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        table.complete(&waitid, Ok(alice())).unwrap();

        let done = waiter.await.unwrap().unwrap();
        assert_eq!(done.identity.username, "alice");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn second_completion_is_rejected() {
        let table = TicketTable::new();
        let waitid = table.create(pending());
        table.complete(&waitid, Ok(alice())).unwrap();
        assert!(matches!(
            table.complete(&waitid, Ok(alice())),
            Err(DischargeError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn reservation_is_exclusive() {
        let table = TicketTable::new();
        let waitid = table.create(pending());
        table.reserve(&waitid).unwrap();
        assert!(matches!(table.reserve(&waitid), Err(DischargeError::AlreadyUsed)));

        table.release(&waitid);
        table.reserve(&waitid).unwrap();
        table.complete(&waitid, Ok(alice())).unwrap();
        assert!(matches!(table.reserve(&waitid), Err(DischargeError::AlreadyUsed)));
        assert!(matches!(
            table.reserve("nope"),
            Err(DischargeError::InvalidWaitId(_))
        ));
    }

    #[tokio::test]
    async fn failure_is_forwarded() {
        let table = TicketTable::new();
        let waitid = table.create(pending());
        table
            .complete(&waitid, Err("cannot log in: bad token".into()))
            .unwrap();
        let err = table.wait(&waitid, Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot log in: bad token");
    }

    #[tokio::test]
    async fn wait_times_out_and_can_retry() {
        let table = TicketTable::new();
        let waitid = table.create(pending());
        assert!(matches!(
            table.wait(&waitid, Duration::from_millis(20)).await,
            Err(DischargeError::Timeout)
        ));
        table.complete(&waitid, Ok(alice())).unwrap();
        assert!(table.wait(&waitid, Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_waitid() {
        let table = TicketTable::new();
        let err = table.wait("nope", Duration::from_millis(1)).await.unwrap_err();
        assert_eq!(err.to_string(), r#"invalid waitid "nope""#);
    }

    #[tokio::test]
    async fn sweep_expires_then_forgets() {
        let table = TicketTable::new();
        let waitid = table.create(pending());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(table.sweep(Duration::from_millis(20)), 1);
        assert!(matches!(
            table.wait(&waitid, Duration::from_millis(5)).await,
            Err(DischargeError::Timeout)
        ));
        assert!(matches!(
            table.complete(&waitid, Ok(alice())),
            Err(DischargeError::Timeout)
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        table.sweep(Duration::from_millis(20));
        assert!(table.is_empty());
    }
}
