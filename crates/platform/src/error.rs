//! Error types for Hawser.

use std::fmt;

/// SSH disconnect reason codes (RFC 4253 Section 11.1).
pub mod disconnect_reason {
    /// SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT
    pub const HOST_NOT_ALLOWED: u32 = 1;
    /// SSH_DISCONNECT_PROTOCOL_ERROR
    pub const PROTOCOL_ERROR: u32 = 2;
    /// SSH_DISCONNECT_KEY_EXCHANGE_FAILED
    pub const KEY_EXCHANGE_FAILED: u32 = 3;
    /// SSH_DISCONNECT_MAC_ERROR
    pub const MAC_ERROR: u32 = 5;
    /// SSH_DISCONNECT_SERVICE_NOT_AVAILABLE
    pub const SERVICE_NOT_AVAILABLE: u32 = 7;
    /// SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE
    pub const HOST_KEY_NOT_VERIFIABLE: u32 = 9;
    /// SSH_DISCONNECT_BY_APPLICATION
    pub const BY_APPLICATION: u32 = 11;
    /// SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE
    pub const NO_MORE_AUTH_METHODS: u32 = 14;
}

/// Unified error type for all Hawser operations.
///
/// Every variant carries owned data so a fatal transport error can be
/// cloned and delivered to each pending waiter on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HawserError {
    /// Socket-level failure: refused, reset, DNS, local interface.
    Connection(String),

    /// Protocol violation: malformed packet, unexpected message for the
    /// current state, bad identification line.
    Protocol(String),

    /// MAC or AEAD tag verification failure. Fatal; the session closes
    /// with DISCONNECT reason 5.
    Mac(String),

    /// Key exchange failure: no common algorithm, bad server signature,
    /// strict-KEX violation.
    Kex(String),

    /// Every configured authentication method was exhausted.
    Auth {
        /// Methods the server said could continue, from the last FAILURE.
        methods_remaining: Vec<String>,
        /// Whether any attempt ended in partial success.
        partial_success: bool,
    },

    /// The server refused a CHANNEL_OPEN.
    ChannelOpenRefused {
        /// Reason code from SSH_MSG_CHANNEL_OPEN_FAILURE.
        reason: u32,
        /// Human-readable description from the server.
        description: String,
    },

    /// Channel misuse or a peer-side window violation.
    Channel(String),

    /// The operation was canceled before a reply arrived.
    Canceled,

    /// A configured deadline elapsed.
    Timeout,

    /// The peer sent SSH_MSG_DISCONNECT.
    Disconnected {
        /// Reason code (RFC 4253 Section 11.1).
        reason: u32,
        /// Description supplied by the peer.
        description: String,
    },

    /// An operation was invoked in a state that cannot service it, e.g.
    /// a channel call before connect or completing a waiter twice.
    InvalidState(String),
}

impl fmt::Display for HawserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HawserError::Connection(msg) => write!(f, "connection error: {}", msg),
            HawserError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            HawserError::Mac(msg) => write!(f, "MAC error: {}", msg),
            HawserError::Kex(msg) => write!(f, "key exchange error: {}", msg),
            HawserError::Auth {
                methods_remaining,
                partial_success,
            } => write!(
                f,
                "authentication failed (remaining methods: [{}], partial success: {})",
                methods_remaining.join(","),
                partial_success
            ),
            HawserError::ChannelOpenRefused {
                reason,
                description,
            } => write!(f, "channel open refused (reason {}): {}", reason, description),
            HawserError::Channel(msg) => write!(f, "channel error: {}", msg),
            HawserError::Canceled => write!(f, "operation canceled"),
            HawserError::Timeout => write!(f, "operation timed out"),
            HawserError::Disconnected {
                reason,
                description,
            } => write!(f, "disconnected by peer (reason {}): {}", reason, description),
            HawserError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
        }
    }
}

impl std::error::Error for HawserError {}

impl From<std::io::Error> for HawserError {
    fn from(err: std::io::Error) -> Self {
        HawserError::Connection(err.to_string())
    }
}

/// Result type for Hawser operations.
pub type HawserResult<T> = Result<T, HawserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HawserError::Protocol("truncated name-list".to_string());
        assert_eq!(err.to_string(), "protocol error: truncated name-list");

        let err = HawserError::Disconnected {
            reason: disconnect_reason::MAC_ERROR,
            description: "corrupted MAC on input".to_string(),
        };
        assert!(err.to_string().contains("reason 5"));
    }

    #[test]
    fn test_auth_error_carries_method_list() {
        let err = HawserError::Auth {
            methods_remaining: vec!["publickey".to_string(), "password".to_string()],
            partial_success: false,
        };
        assert!(err.to_string().contains("publickey,password"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: HawserError = io_err.into();
        assert!(matches!(err, HawserError::Connection(_)));
    }

    #[test]
    fn test_errors_clone_for_waiter_fanout() {
        let err = HawserError::Kex("server signature did not verify".to_string());
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
