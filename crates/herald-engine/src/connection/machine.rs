// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure transition function of the connection state machine.
//!
//! `transition` never performs IO. It returns the next session value plus a
//! list of [`Effect`]s that the manager carries out in order.

use chrono::{DateTime, Utc};
use herald_core::{ConnectionSession, ConnectionStatus};

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The lease keeper obtained the session lease.
    LeaseAcquired { owner_id: String, fencing_token: u64 },
    /// A connect attempt authenticated with stored credentials.
    CredentialsValid,
    /// A connect attempt opened in pairing mode.
    NoCredentials,
    /// Stored credentials were rejected during connect.
    AuthRejected { reason: String },
    /// A connect attempt failed for another reason.
    ConnectFailed { error: String },
    QrCode(String),
    PairingConfirmed,
    TransportDropped { reason: String, recoverable: bool },
    ReconnectSucceeded,
    ReconnectFailed { error: String },
    /// The backoff elapsed but the lease was no longer valid.
    ReconnectLeaseInvalid,
    /// A renewal reported that another owner took the lease.
    LeaseFenced,
    /// Renewals kept failing and the lease was given up.
    LeaseLost,
    /// The device was logged out, remotely or by the operator.
    LoggedOut,
    /// Credentials expired while connected.
    AuthExpired { reason: String },
    OperatorReset,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a connection with whatever credentials are stored.
    Connect,
    /// Wait out the backoff for `attempt`, then reconnect.
    ScheduleReconnect { attempt: u32 },
    /// Abort sends waiting on or using the current connection.
    CancelInFlight,
    /// Close the current transport handle.
    Disconnect,
    ClearCredentials,
    /// Give up the session lease so it can be re-acquired.
    ReleaseLease,
}

/// Limits the transition function needs.
#[derive(Debug, Clone, Copy)]
pub struct MachineLimits {
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionSession,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(session: &ConnectionSession) -> Self {
        Self {
            next: session.clone(),
            effects: Vec::new(),
        }
    }

    /// `true` when the event was ignored in the current state.
    pub fn is_noop(&self, previous: &ConnectionSession) -> bool {
        self.effects.is_empty() && self.next == *previous
    }
}

/// Computes the state that follows `event`. Events that make no sense in the
/// current state leave it untouched.
pub fn transition(
    session: &ConnectionSession,
    event: ConnectionEvent,
    limits: MachineLimits,
    now: DateTime<Utc>,
) -> Transition {
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    let mut next = session.clone();
    let effects = match (session.status, event) {
        // Lease loss wins from any state.
        (_, E::LeaseFenced) => {
            reset(&mut next, S::Disconnected, Some("lease fenced by another owner"));
            vec![Effect::CancelInFlight, Effect::Disconnect]
        }
        (_, E::LeaseLost) => {
            reset(&mut next, S::Disconnected, Some("lease lost"));
            vec![Effect::CancelInFlight, Effect::Disconnect]
        }
        (_, E::LoggedOut) => {
            reset(&mut next, S::Disconnected, Some("logged out"));
            vec![
                Effect::CancelInFlight,
                Effect::Disconnect,
                Effect::ClearCredentials,
                Effect::ReleaseLease,
            ]
        }
        (S::Connected | S::Connecting | S::Reconnecting | S::QrPending, E::AuthExpired { reason }) => {
            reset(&mut next, S::Disconnected, Some(&reason));
            vec![
                Effect::CancelInFlight,
                Effect::Disconnect,
                Effect::ClearCredentials,
                Effect::ReleaseLease,
            ]
        }

        (S::Disconnected | S::Failed, E::LeaseAcquired { owner_id, fencing_token }) => {
            next.status = S::Connecting;
            next.lease_owner_id = Some(owner_id);
            next.fencing_token = Some(fencing_token);
            next.reconnect_attempt = 0;
            next.qr_code = None;
            vec![Effect::Connect]
        }

        (S::Connecting, E::CredentialsValid) => {
            connected(&mut next);
            Vec::new()
        }
        (S::Connecting | S::Reconnecting, E::NoCredentials) => {
            next.status = S::QrPending;
            next.reconnect_attempt = 0;
            Vec::new()
        }
        (S::Connecting | S::Reconnecting, E::AuthRejected { reason }) => {
            next.status = S::Connecting;
            next.reconnect_attempt = 0;
            next.last_error = Some(reason);
            vec![Effect::ClearCredentials, Effect::Connect]
        }
        (S::Connecting, E::ConnectFailed { error }) => {
            next.status = S::Reconnecting;
            next.reconnect_attempt = 1;
            next.last_error = Some(error);
            vec![Effect::ScheduleReconnect { attempt: 1 }]
        }

        (S::Connecting | S::QrPending, E::QrCode(code)) => {
            next.status = S::QrPending;
            next.qr_code = Some(code);
            Vec::new()
        }
        (S::QrPending, E::PairingConfirmed) => {
            connected(&mut next);
            Vec::new()
        }

        (S::Connected | S::QrPending | S::Connecting, E::TransportDropped { reason, recoverable }) => {
            next.last_error = Some(reason);
            next.qr_code = None;
            if recoverable {
                next.status = S::Reconnecting;
                next.reconnect_attempt = 1;
                vec![
                    Effect::CancelInFlight,
                    Effect::Disconnect,
                    Effect::ScheduleReconnect { attempt: 1 },
                ]
            } else {
                // Credentials survive; the lease cycle brings the session back.
                next.status = S::Disconnected;
                next.reconnect_attempt = 0;
                vec![Effect::CancelInFlight, Effect::Disconnect, Effect::ReleaseLease]
            }
        }

        (S::Reconnecting, E::ReconnectSucceeded) => {
            connected(&mut next);
            Vec::new()
        }
        (S::Reconnecting, E::ReconnectFailed { error }) => {
            next.last_error = Some(error);
            if session.reconnect_attempt >= limits.max_reconnect_attempts {
                next.status = S::Failed;
                vec![Effect::ReleaseLease]
            } else {
                next.reconnect_attempt = session.reconnect_attempt + 1;
                vec![Effect::ScheduleReconnect {
                    attempt: next.reconnect_attempt,
                }]
            }
        }
        (S::Reconnecting, E::ReconnectLeaseInvalid) => {
            next.status = S::Failed;
            next.last_error = Some("lease no longer valid at reconnect".to_string());
            next.lease_owner_id = None;
            next.fencing_token = None;
            Vec::new()
        }

        (S::Failed, E::OperatorReset) => {
            reset(&mut next, S::Disconnected, None);
            Vec::new()
        }

        _ => return Transition::stay(session),
    };

    next.updated_at = now;
    Transition { next, effects }
}

fn connected(session: &mut ConnectionSession) {
    session.status = ConnectionStatus::Connected;
    session.reconnect_attempt = 0;
    session.qr_code = None;
    session.last_error = None;
}

fn reset(session: &mut ConnectionSession, status: ConnectionStatus, error: Option<&str>) {
    session.status = status;
    session.qr_code = None;
    session.lease_owner_id = None;
    session.fencing_token = None;
    session.reconnect_attempt = 0;
    session.last_error = error.map(str::to_string);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LIMITS: MachineLimits = MachineLimits {
        max_reconnect_attempts: 3,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn at(status: ConnectionStatus) -> ConnectionSession {
        let mut s = ConnectionSession::new("worker-a", now());
        s.status = status;
        if status != ConnectionStatus::Disconnected {
            s.lease_owner_id = Some("worker-a".into());
            s.fencing_token = Some(4);
        }
        s
    }

    fn step(s: &ConnectionSession, e: ConnectionEvent) -> Transition {
        transition(s, e, LIMITS, now())
    }

    fn acquired() -> ConnectionEvent {
        ConnectionEvent::LeaseAcquired {
            owner_id: "worker-a".into(),
            fencing_token: 7,
        }
    }

    #[test]
    fn lease_acquired_starts_connecting() {
        let t = step(&at(ConnectionStatus::Disconnected), acquired());
        assert_eq!(t.next.status, ConnectionStatus::Connecting);
        assert_eq!(t.next.fencing_token, Some(7));
        assert_eq!(t.effects, vec![Effect::Connect]);
    }

    #[test]
    fn pairing_flow_reaches_connected() {
        let s = at(ConnectionStatus::Connecting);
        let t = step(&s, ConnectionEvent::NoCredentials);
        assert_eq!(t.next.status, ConnectionStatus::QrPending);

        let t = step(&t.next, ConnectionEvent::QrCode("2@abc".into()));
        assert_eq!(t.next.qr_code.as_deref(), Some("2@abc"));

        let t = step(&t.next, ConnectionEvent::PairingConfirmed);
        assert_eq!(t.next.status, ConnectionStatus::Connected);
        assert_eq!(t.next.qr_code, None);
    }

    #[test]
    fn stored_credentials_connect_directly() {
        let t = step(&at(ConnectionStatus::Connecting), ConnectionEvent::CredentialsValid);
        assert_eq!(t.next.status, ConnectionStatus::Connected);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn rejected_credentials_are_cleared_and_pairing_restarts() {
        let t = step(
            &at(ConnectionStatus::Connecting),
            ConnectionEvent::AuthRejected {
                reason: "401".into(),
            },
        );
        assert_eq!(t.next.status, ConnectionStatus::Connecting);
        assert_eq!(t.effects, vec![Effect::ClearCredentials, Effect::Connect]);
    }

    #[test]
    fn recoverable_drop_schedules_reconnect() {
        let t = step(
            &at(ConnectionStatus::Connected),
            ConnectionEvent::TransportDropped {
                reason: "socket closed".into(),
                recoverable: true,
            },
        );
        assert_eq!(t.next.status, ConnectionStatus::Reconnecting);
        assert_eq!(t.next.reconnect_attempt, 1);
        assert_eq!(
            t.effects,
            vec![
                Effect::CancelInFlight,
                Effect::Disconnect,
                Effect::ScheduleReconnect { attempt: 1 }
            ]
        );
    }

    #[test]
    fn fatal_drop_keeps_credentials() {
        let t = step(
            &at(ConnectionStatus::Connected),
            ConnectionEvent::TransportDropped {
                reason: "protocol violation".into(),
                recoverable: false,
            },
        );
        assert_eq!(t.next.status, ConnectionStatus::Disconnected);
        assert!(!t.effects.contains(&Effect::ClearCredentials));
        assert!(t.effects.contains(&Effect::ReleaseLease));
    }

    #[test]
    fn reconnect_budget_exhaustion_fails() {
        let mut s = at(ConnectionStatus::Reconnecting);
        s.reconnect_attempt = 1;
        let failed = || ConnectionEvent::ReconnectFailed {
            error: "timeout".into(),
        };

        let t = step(&s, failed());
        assert_eq!(t.next.reconnect_attempt, 2);
        assert_eq!(t.effects, vec![Effect::ScheduleReconnect { attempt: 2 }]);
        let t = step(&t.next, failed());
        assert_eq!(t.next.reconnect_attempt, 3);
        let t = step(&t.next, failed());
        assert_eq!(t.next.status, ConnectionStatus::Failed);
        assert_eq!(t.effects, vec![Effect::ReleaseLease]);
    }

    #[test]
    fn reconnect_succeeds_and_resets_attempts() {
        let mut s = at(ConnectionStatus::Reconnecting);
        s.reconnect_attempt = 2;
        let t = step(&s, ConnectionEvent::ReconnectSucceeded);
        assert_eq!(t.next.status, ConnectionStatus::Connected);
        assert_eq!(t.next.reconnect_attempt, 0);
    }

    #[test]
    fn invalid_lease_at_reconnect_fails() {
        let t = step(
            &at(ConnectionStatus::Reconnecting),
            ConnectionEvent::ReconnectLeaseInvalid,
        );
        assert_eq!(t.next.status, ConnectionStatus::Failed);
        assert_eq!(t.next.fencing_token, None);
    }

    #[test]
    fn fencing_disconnects_from_every_state() {
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::QrPending,
            ConnectionStatus::Connected,
            ConnectionStatus::Reconnecting,
            ConnectionStatus::Failed,
        ] {
            let t = step(&at(status), ConnectionEvent::LeaseFenced);
            assert_eq!(t.next.status, ConnectionStatus::Disconnected, "{status}");
            assert_eq!(t.next.fencing_token, None);
            assert_eq!(t.effects[0], Effect::CancelInFlight);
        }
    }

    #[test]
    fn logout_clears_credentials() {
        let t = step(&at(ConnectionStatus::Connected), ConnectionEvent::LoggedOut);
        assert_eq!(t.next.status, ConnectionStatus::Disconnected);
        assert!(t.effects.contains(&Effect::ClearCredentials));
    }

    #[test]
    fn failed_is_revived_by_reset_or_reacquisition() {
        let failed = at(ConnectionStatus::Failed);
        let t = step(&failed, ConnectionEvent::OperatorReset);
        assert_eq!(t.next.status, ConnectionStatus::Disconnected);

        let t = step(&failed, acquired());
        assert_eq!(t.next.status, ConnectionStatus::Connecting);
    }

    #[test]
    fn nonsense_events_are_ignored() {
        let s = at(ConnectionStatus::Connected);
        for e in [
            ConnectionEvent::PairingConfirmed,
            ConnectionEvent::ReconnectSucceeded,
            ConnectionEvent::OperatorReset,
            acquired(),
        ] {
            let t = step(&s, e);
            assert!(t.is_noop(&s));
        }
    }
}
