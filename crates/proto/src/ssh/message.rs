//! SSH protocol message numbers (RFC 4253 Section 12 and extensions).
//!
//! # Message Categories
//!
//! - **Transport layer generic** (1-19): disconnect, ignore, debug, service,
//!   EXT_INFO (RFC 8308)
//! - **Algorithm negotiation** (20-29): KEXINIT, NEWKEYS
//! - **Key exchange method specific** (30-49): meaning depends on the
//!   negotiated method
//! - **User authentication** (50-79): USERAUTH protocol, with 60-61 reserved
//!   for method-specific replies
//! - **Connection protocol** (80-127): global requests and channels
//!
//! # Example
//!
//! ```rust
//! use hawser_proto::ssh::message::MessageType;
//!
//! let msg_type = MessageType::KexInit;
//! assert_eq!(msg_type as u8, 20);
//! ```

/// SSH message types with a fixed, context-free meaning.
///
/// Message numbers 30-34 and 60-61 are method-specific; the variants here
/// carry the name of their most common reading, and [`kexnum`] /
/// [`authnum`] provide the aliases used by the other readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    // Transport layer generic (1-19)
    /// Disconnect message - terminates the connection.
    Disconnect = 1,
    /// Ignore message - padding or keep-alive.
    Ignore = 2,
    /// Unimplemented message - response to an unknown message number.
    Unimplemented = 3,
    /// Debug message.
    Debug = 4,
    /// Service request (e.g., "ssh-userauth").
    ServiceRequest = 5,
    /// Service accept.
    ServiceAccept = 6,
    /// Extension negotiation (RFC 8308).
    ExtInfo = 7,

    // Algorithm negotiation (20-29)
    /// Key exchange init - algorithm negotiation.
    KexInit = 20,
    /// New keys - switch to the freshly derived keys.
    NewKeys = 21,

    // Key exchange method specific (30-49). The same numbers are reused by
    // classic DH, ECDH, group exchange and the PQ hybrid exchange.
    /// First KEX message from the client (ECDH/DH/HYBRID INIT, GEX REQUEST_OLD).
    KexEcdhInit = 30,
    /// First KEX message from the server (ECDH/DH/HYBRID REPLY, GEX GROUP).
    KexEcdhReply = 31,
    /// Group-exchange client init (SSH_MSG_KEX_DH_GEX_INIT).
    KexGexInit = 32,
    /// Group-exchange server reply (SSH_MSG_KEX_DH_GEX_REPLY).
    KexGexReply = 33,
    /// Group-exchange sized request (SSH_MSG_KEX_DH_GEX_REQUEST).
    KexGexRequest = 34,

    // User authentication generic (50-79)
    /// User authentication request.
    UserauthRequest = 50,
    /// User authentication failure (carries the allowed-method list).
    UserauthFailure = 51,
    /// User authentication success.
    UserauthSuccess = 52,
    /// User authentication banner.
    UserauthBanner = 53,
    /// Method-specific server reply: PK_OK for "publickey",
    /// INFO_REQUEST for "keyboard-interactive", PASSWD_CHANGEREQ for
    /// "password".
    UserauthPkOk = 60,
    /// Keyboard-interactive responses from the client.
    UserauthInfoResponse = 61,

    // Connection protocol generic (80-127)
    /// Global request.
    GlobalRequest = 80,
    /// Global request success.
    RequestSuccess = 81,
    /// Global request failure.
    RequestFailure = 82,
    /// Channel open.
    ChannelOpen = 90,
    /// Channel open confirmation.
    ChannelOpenConfirmation = 91,
    /// Channel open failure.
    ChannelOpenFailure = 92,
    /// Channel window adjust.
    ChannelWindowAdjust = 93,
    /// Channel data.
    ChannelData = 94,
    /// Channel extended data (stderr).
    ChannelExtendedData = 95,
    /// Channel EOF.
    ChannelEof = 96,
    /// Channel close.
    ChannelClose = 97,
    /// Channel request.
    ChannelRequest = 98,
    /// Channel request success.
    ChannelSuccess = 99,
    /// Channel request failure.
    ChannelFailure = 100,
}

/// Aliases for the method-specific key exchange numbers 30-34.
pub mod kexnum {
    /// SSH_MSG_KEXDH_INIT / SSH_MSG_KEX_ECDH_INIT / SSH_MSG_KEX_HYBRID_INIT
    pub const INIT: u8 = 30;
    /// SSH_MSG_KEXDH_REPLY / SSH_MSG_KEX_ECDH_REPLY / SSH_MSG_KEX_HYBRID_REPLY
    pub const REPLY: u8 = 31;
    /// SSH_MSG_KEX_DH_GEX_GROUP (RFC 4419)
    pub const GEX_GROUP: u8 = 31;
    /// SSH_MSG_KEX_DH_GEX_INIT (RFC 4419)
    pub const GEX_INIT: u8 = 32;
    /// SSH_MSG_KEX_DH_GEX_REPLY (RFC 4419)
    pub const GEX_REPLY: u8 = 33;
    /// SSH_MSG_KEX_DH_GEX_REQUEST (RFC 4419)
    pub const GEX_REQUEST: u8 = 34;
}

/// Aliases for the method-specific authentication numbers 60-61.
pub mod authnum {
    /// SSH_MSG_USERAUTH_PK_OK ("publickey")
    pub const PK_OK: u8 = 60;
    /// SSH_MSG_USERAUTH_PASSWD_CHANGEREQ ("password")
    pub const PASSWD_CHANGEREQ: u8 = 60;
    /// SSH_MSG_USERAUTH_INFO_REQUEST ("keyboard-interactive")
    pub const INFO_REQUEST: u8 = 60;
    /// SSH_MSG_USERAUTH_INFO_RESPONSE ("keyboard-interactive")
    pub const INFO_RESPONSE: u8 = 61;
}

impl MessageType {
    /// Converts a byte to a message type.
    ///
    /// Returns `None` for unknown numbers; the caller replies with
    /// SSH_MSG_UNIMPLEMENTED in that case rather than failing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hawser_proto::ssh::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(20), Some(MessageType::KexInit));
    /// assert_eq!(MessageType::from_u8(255), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Disconnect),
            2 => Some(MessageType::Ignore),
            3 => Some(MessageType::Unimplemented),
            4 => Some(MessageType::Debug),
            5 => Some(MessageType::ServiceRequest),
            6 => Some(MessageType::ServiceAccept),
            7 => Some(MessageType::ExtInfo),
            20 => Some(MessageType::KexInit),
            21 => Some(MessageType::NewKeys),
            30 => Some(MessageType::KexEcdhInit),
            31 => Some(MessageType::KexEcdhReply),
            32 => Some(MessageType::KexGexInit),
            33 => Some(MessageType::KexGexReply),
            34 => Some(MessageType::KexGexRequest),
            50 => Some(MessageType::UserauthRequest),
            51 => Some(MessageType::UserauthFailure),
            52 => Some(MessageType::UserauthSuccess),
            53 => Some(MessageType::UserauthBanner),
            60 => Some(MessageType::UserauthPkOk),
            61 => Some(MessageType::UserauthInfoResponse),
            80 => Some(MessageType::GlobalRequest),
            81 => Some(MessageType::RequestSuccess),
            82 => Some(MessageType::RequestFailure),
            90 => Some(MessageType::ChannelOpen),
            91 => Some(MessageType::ChannelOpenConfirmation),
            92 => Some(MessageType::ChannelOpenFailure),
            93 => Some(MessageType::ChannelWindowAdjust),
            94 => Some(MessageType::ChannelData),
            95 => Some(MessageType::ChannelExtendedData),
            96 => Some(MessageType::ChannelEof),
            97 => Some(MessageType::ChannelClose),
            98 => Some(MessageType::ChannelRequest),
            99 => Some(MessageType::ChannelSuccess),
            100 => Some(MessageType::ChannelFailure),
            _ => None,
        }
    }

    /// Returns true for the message numbers that are legal while a key
    /// exchange is in progress (strict-KEX treats everything else as fatal).
    pub fn is_kex_message(byte: u8) -> bool {
        matches!(byte, 20 | 21 | 30..=49)
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::Ignore => "SSH_MSG_IGNORE",
            MessageType::Unimplemented => "SSH_MSG_UNIMPLEMENTED",
            MessageType::Debug => "SSH_MSG_DEBUG",
            MessageType::ServiceRequest => "SSH_MSG_SERVICE_REQUEST",
            MessageType::ServiceAccept => "SSH_MSG_SERVICE_ACCEPT",
            MessageType::ExtInfo => "SSH_MSG_EXT_INFO",
            MessageType::KexInit => "SSH_MSG_KEXINIT",
            MessageType::NewKeys => "SSH_MSG_NEWKEYS",
            MessageType::KexEcdhInit => "SSH_MSG_KEX_ECDH_INIT",
            MessageType::KexEcdhReply => "SSH_MSG_KEX_ECDH_REPLY",
            MessageType::KexGexInit => "SSH_MSG_KEX_DH_GEX_INIT",
            MessageType::KexGexReply => "SSH_MSG_KEX_DH_GEX_REPLY",
            MessageType::KexGexRequest => "SSH_MSG_KEX_DH_GEX_REQUEST",
            MessageType::UserauthRequest => "SSH_MSG_USERAUTH_REQUEST",
            MessageType::UserauthFailure => "SSH_MSG_USERAUTH_FAILURE",
            MessageType::UserauthSuccess => "SSH_MSG_USERAUTH_SUCCESS",
            MessageType::UserauthBanner => "SSH_MSG_USERAUTH_BANNER",
            MessageType::UserauthPkOk => "SSH_MSG_USERAUTH_PK_OK",
            MessageType::UserauthInfoResponse => "SSH_MSG_USERAUTH_INFO_RESPONSE",
            MessageType::GlobalRequest => "SSH_MSG_GLOBAL_REQUEST",
            MessageType::RequestSuccess => "SSH_MSG_REQUEST_SUCCESS",
            MessageType::RequestFailure => "SSH_MSG_REQUEST_FAILURE",
            MessageType::ChannelOpen => "SSH_MSG_CHANNEL_OPEN",
            MessageType::ChannelOpenConfirmation => "SSH_MSG_CHANNEL_OPEN_CONFIRMATION",
            MessageType::ChannelOpenFailure => "SSH_MSG_CHANNEL_OPEN_FAILURE",
            MessageType::ChannelWindowAdjust => "SSH_MSG_CHANNEL_WINDOW_ADJUST",
            MessageType::ChannelData => "SSH_MSG_CHANNEL_DATA",
            MessageType::ChannelExtendedData => "SSH_MSG_CHANNEL_EXTENDED_DATA",
            MessageType::ChannelEof => "SSH_MSG_CHANNEL_EOF",
            MessageType::ChannelClose => "SSH_MSG_CHANNEL_CLOSE",
            MessageType::ChannelRequest => "SSH_MSG_CHANNEL_REQUEST",
            MessageType::ChannelSuccess => "SSH_MSG_CHANNEL_SUCCESS",
            MessageType::ChannelFailure => "SSH_MSG_CHANNEL_FAILURE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::from_u8(7), Some(MessageType::ExtInfo));
        assert_eq!(MessageType::from_u8(20), Some(MessageType::KexInit));
        assert_eq!(MessageType::from_u8(61), Some(MessageType::UserauthInfoResponse));
        assert_eq!(MessageType::from_u8(255), None);
    }

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Disconnect as u8, 1);
        assert_eq!(MessageType::ExtInfo as u8, 7);
        assert_eq!(MessageType::KexGexRequest as u8, 34);
        assert_eq!(MessageType::ChannelFailure as u8, 100);
    }

    #[test]
    fn test_kex_message_range() {
        assert!(MessageType::is_kex_message(20));
        assert!(MessageType::is_kex_message(21));
        assert!(MessageType::is_kex_message(30));
        assert!(MessageType::is_kex_message(34));
        assert!(!MessageType::is_kex_message(4));
        assert!(!MessageType::is_kex_message(50));
        assert!(!MessageType::is_kex_message(94));
    }

    #[test]
    fn test_shared_numbers_agree() {
        assert_eq!(kexnum::REPLY, kexnum::GEX_GROUP);
        assert_eq!(authnum::PK_OK, authnum::INFO_REQUEST);
        assert_eq!(MessageType::UserauthPkOk as u8, authnum::PK_OK);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(format!("{}", MessageType::KexInit), "SSH_MSG_KEXINIT(20)");
    }
}
