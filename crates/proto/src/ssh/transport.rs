//! Transport session state machine (RFC 4253).
//!
//! Tracks the connection lifecycle:
//!
//! ```text
//! Initial -> VersionExchanged -> KexInProgress -> NewKeys -> Authenticated
//!                                     ^                          |
//!                                     +----------- re-key -------+
//! any state -> Disconnecting -> Closed
//! ```
//!
//! The machine also owns the invariants that survive re-keys: the session
//! identifier is pinned to the exchange hash of the *first* key exchange,
//! and the strict-KEX flag is latched from the first KEXINIT pair. Re-key
//! triggers (bytes transferred, elapsed time, caller request) are tracked
//! here as well.

use hawser_platform::{HawserError, HawserResult};
use std::time::{Duration, Instant};

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket connected, nothing exchanged yet.
    Initial,
    /// Identification lines exchanged.
    VersionExchanged,
    /// A key exchange (initial or re-key) is running.
    KexInProgress,
    /// NEWKEYS exchanged; keys installed, not yet authenticated.
    NewKeys,
    /// User authentication completed.
    Authenticated,
    /// Fatal error or disconnect requested; DISCONNECT being sent.
    Disconnecting,
    /// Socket closed.
    Closed,
}

/// Transport-level bookkeeping for one session.
#[derive(Debug)]
pub struct TransportState {
    state: SessionState,
    /// Latched when both first KEXINITs advertised strict KEX.
    strict_kex: bool,
    /// Exchange hash of the first KEX; never changes afterwards.
    session_id: Option<Vec<u8>>,
    bytes_since_rekey: u64,
    last_kex: Instant,
    rekey_bytes_limit: u64,
    rekey_time_limit: Duration,
}

impl TransportState {
    /// Creates the machine in `Initial` with the given re-key limits.
    pub fn new(rekey_bytes_limit: u64, rekey_time_limit: Duration) -> Self {
        Self {
            state: SessionState::Initial,
            strict_kex: false,
            session_id: None,
            bytes_since_rekey: 0,
            last_kex: Instant::now(),
            rekey_bytes_limit,
            rekey_time_limit,
        }
    }

    /// Current state.
    pub fn current(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`, validating the edge.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Protocol`] for an edge the lifecycle does
    /// not allow (e.g. `Initial` straight to `Authenticated`).
    pub fn transition(&mut self, next: SessionState) -> HawserResult<()> {
        use SessionState::*;
        let valid = match (self.state, next) {
            (s, n) if s == n => true,
            (Initial, VersionExchanged) => true,
            (VersionExchanged, KexInProgress) => true,
            (KexInProgress, NewKeys) => true,
            (NewKeys, Authenticated) => true,
            // Re-key from either side of authentication.
            (NewKeys, KexInProgress) => true,
            (Authenticated, KexInProgress) => true,
            // Re-key completion returns to the pre-kex stage.
            (KexInProgress, Authenticated) => true,
            // Teardown is reachable from anywhere except a closed socket.
            (Closed, Disconnecting) => false,
            (_, Disconnecting) => true,
            (_, Closed) => true,
            _ => false,
        };

        if !valid {
            return Err(HawserError::Protocol(format!(
                "invalid transport transition: {:?} -> {:?}",
                self.state, next
            )));
        }

        self.state = next;
        Ok(())
    }

    /// Whether strict KEX is in force.
    pub fn strict_kex(&self) -> bool {
        self.strict_kex
    }

    /// Latches strict KEX after the first KEXINIT exchange.
    pub fn set_strict_kex(&mut self) {
        self.strict_kex = true;
    }

    /// The session identifier, once the first KEX completed.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.session_id.as_deref()
    }

    /// Pins the session identifier to the first exchange hash. Later calls
    /// (re-keys) are ignored, keeping the identifier immutable.
    pub fn pin_session_id(&mut self, exchange_hash: &[u8]) {
        if self.session_id.is_none() {
            self.session_id = Some(exchange_hash.to_vec());
        }
    }

    /// Records transferred bytes for re-key accounting.
    pub fn add_bytes(&mut self, bytes: u64) {
        self.bytes_since_rekey = self.bytes_since_rekey.saturating_add(bytes);
    }

    /// Whether the automatic re-key triggers have fired.
    ///
    /// Only meaningful on an established session; during a key exchange the
    /// answer is always false.
    pub fn needs_rekey(&self, now: Instant) -> bool {
        if !matches!(
            self.state,
            SessionState::NewKeys | SessionState::Authenticated
        ) {
            return false;
        }
        self.bytes_since_rekey >= self.rekey_bytes_limit
            || now.duration_since(self.last_kex) >= self.rekey_time_limit
    }

    /// Resets re-key accounting after NEWKEYS.
    pub fn reset_rekey_tracking(&mut self, now: Instant) {
        self.bytes_since_rekey = 0;
        self.last_kex = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> TransportState {
        TransportState::new(1 << 30, Duration::from_secs(3600))
    }

    #[test]
    fn test_normal_progression() {
        let mut t = machine();
        assert_eq!(t.current(), SessionState::Initial);
        t.transition(SessionState::VersionExchanged).unwrap();
        t.transition(SessionState::KexInProgress).unwrap();
        t.transition(SessionState::NewKeys).unwrap();
        t.transition(SessionState::Authenticated).unwrap();
        assert_eq!(t.current(), SessionState::Authenticated);
    }

    #[test]
    fn test_rekey_cycle() {
        let mut t = machine();
        t.transition(SessionState::VersionExchanged).unwrap();
        t.transition(SessionState::KexInProgress).unwrap();
        t.transition(SessionState::NewKeys).unwrap();
        t.transition(SessionState::Authenticated).unwrap();

        t.transition(SessionState::KexInProgress).unwrap();
        t.transition(SessionState::Authenticated).unwrap();
        assert_eq!(t.current(), SessionState::Authenticated);
    }

    #[test]
    fn test_invalid_jumps_rejected() {
        let mut t = machine();
        assert!(t.transition(SessionState::Authenticated).is_err());
        assert!(t.transition(SessionState::NewKeys).is_err());

        let mut t = machine();
        t.transition(SessionState::Closed).unwrap();
        assert!(t.transition(SessionState::Disconnecting).is_err());
    }

    #[test]
    fn test_teardown_from_anywhere() {
        let mut t = machine();
        t.transition(SessionState::VersionExchanged).unwrap();
        t.transition(SessionState::Disconnecting).unwrap();
        t.transition(SessionState::Closed).unwrap();
        assert_eq!(t.current(), SessionState::Closed);
    }

    #[test]
    fn test_session_id_pins_once() {
        let mut t = machine();
        t.pin_session_id(b"first exchange hash");
        t.pin_session_id(b"rekey exchange hash");
        assert_eq!(t.session_id(), Some(&b"first exchange hash"[..]));
    }

    #[test]
    fn test_rekey_triggers() {
        let mut t = machine();
        t.transition(SessionState::VersionExchanged).unwrap();
        t.transition(SessionState::KexInProgress).unwrap();

        // Not established yet: never asks for a re-key.
        t.add_bytes(u64::MAX / 2);
        assert!(!t.needs_rekey(Instant::now()));

        t.transition(SessionState::NewKeys).unwrap();
        assert!(t.needs_rekey(Instant::now()));

        t.reset_rekey_tracking(Instant::now());
        assert!(!t.needs_rekey(Instant::now()));

        // Time trigger.
        let later = Instant::now() + Duration::from_secs(3601);
        assert!(t.needs_rekey(later));
    }

    #[test]
    fn test_strict_kex_latch() {
        let mut t = machine();
        assert!(!t.strict_kex());
        t.set_strict_kex();
        assert!(t.strict_kex());
    }
}
