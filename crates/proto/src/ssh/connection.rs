//! SSH connection protocol messages (RFC 4253 Section 11, RFC 4254).
//!
//! Typed message structs for everything the session multiplexes beyond the
//! key exchange: transport housekeeping (DISCONNECT, IGNORE, DEBUG,
//! UNIMPLEMENTED, SERVICE_*), global requests, and the channel family.
//! Each message pairs `to_bytes` with `from_bytes`; adding a message type
//! is a new struct plus a dispatch arm.

use crate::ssh::message::MessageType;
use crate::ssh::wire::{WireReader, WireWriter};
use hawser_platform::{HawserError, HawserResult};

/// Maximum window size accepted from a peer (16 MB).
pub const MAX_WINDOW_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum per-message data size accepted from a peer (256 KB).
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// SSH_MSG_DISCONNECT (RFC 4253 Section 11.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason code.
    pub reason: u32,
    /// Human-readable description.
    pub description: String,
}

impl Disconnect {
    /// Creates the message.
    pub fn new(reason: u32, description: &str) -> Self {
        Self {
            reason,
            description: description.to_string(),
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(16 + self.description.len());
        w.put_byte(MessageType::Disconnect as u8);
        w.put_u32(self.reason);
        w.put_string(self.description.as_bytes());
        w.put_string(b""); // language tag
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::Disconnect as u8, "SSH_MSG_DISCONNECT")?;
        let reason = r.read_u32()?;
        let description = r.read_string_utf8()?;
        let _language_tag = r.read_string()?;
        Ok(Self {
            reason,
            description,
        })
    }
}

/// SSH_MSG_IGNORE (RFC 4253 Section 11.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ignore {
    /// Arbitrary payload, ignored by the receiver.
    pub data: Vec<u8>,
}

impl Ignore {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8 + self.data.len());
        w.put_byte(MessageType::Ignore as u8);
        w.put_string(&self.data);
        w.into_bytes()
    }
}

/// SSH_MSG_UNIMPLEMENTED (RFC 4253 Section 11.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unimplemented {
    /// Sequence number of the rejected packet.
    pub rejected_seq: u32,
}

impl Unimplemented {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        w.put_byte(MessageType::Unimplemented as u8);
        w.put_u32(self.rejected_seq);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::Unimplemented as u8, "SSH_MSG_UNIMPLEMENTED")?;
        Ok(Self {
            rejected_seq: r.read_u32()?,
        })
    }
}

/// SSH_MSG_DEBUG (RFC 4253 Section 11.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMsg {
    /// Whether the receiver should display the message.
    pub always_display: bool,
    /// Debug text.
    pub message: String,
}

impl DebugMsg {
    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::Debug as u8, "SSH_MSG_DEBUG")?;
        let always_display = r.read_boolean()?;
        let message = r.read_string_utf8()?;
        let _language_tag = r.read_string()?;
        Ok(Self {
            always_display,
            message,
        })
    }
}

/// SSH_MSG_SERVICE_ACCEPT (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    /// Accepted service name.
    pub service: String,
}

impl ServiceAccept {
    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ServiceAccept as u8, "SSH_MSG_SERVICE_ACCEPT")?;
        Ok(Self {
            service: r.read_string_utf8()?,
        })
    }
}

/// Global request payloads (RFC 4254 Section 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalRequestType {
    /// Ask the server to listen on an address for remote forwarding.
    TcpipForward {
        /// Address to bind on the server.
        address: String,
        /// Port to bind (0 lets the server pick).
        port: u32,
    },
    /// Cancel a previous tcpip-forward.
    CancelTcpipForward {
        /// Previously bound address.
        address: String,
        /// Previously bound port.
        port: u32,
    },
    /// Anything this implementation does not interpret.
    Unknown {
        /// Request name.
        name: String,
        /// Raw request-specific payload.
        data: Vec<u8>,
    },
}

impl GlobalRequestType {
    /// Returns the request name.
    pub fn name(&self) -> &str {
        match self {
            GlobalRequestType::TcpipForward { .. } => "tcpip-forward",
            GlobalRequestType::CancelTcpipForward { .. } => "cancel-tcpip-forward",
            GlobalRequestType::Unknown { name, .. } => name,
        }
    }
}

/// SSH_MSG_GLOBAL_REQUEST (RFC 4254 Section 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRequest {
    /// Request payload.
    pub request: GlobalRequestType,
    /// Whether the peer must answer with REQUEST_SUCCESS/FAILURE.
    pub want_reply: bool,
}

impl GlobalRequest {
    /// Creates the message.
    pub fn new(request: GlobalRequestType, want_reply: bool) -> Self {
        Self {
            request,
            want_reply,
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(64);
        w.put_byte(MessageType::GlobalRequest as u8);
        w.put_string(self.request.name().as_bytes());
        w.put_boolean(self.want_reply);
        match &self.request {
            GlobalRequestType::TcpipForward { address, port }
            | GlobalRequestType::CancelTcpipForward { address, port } => {
                w.put_string(address.as_bytes());
                w.put_u32(*port);
            }
            GlobalRequestType::Unknown { data, .. } => w.put_raw(data),
        }
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::GlobalRequest as u8, "SSH_MSG_GLOBAL_REQUEST")?;
        let name = r.read_string_utf8()?;
        let want_reply = r.read_boolean()?;

        let request = match name.as_str() {
            "tcpip-forward" => GlobalRequestType::TcpipForward {
                address: r.read_string_utf8()?,
                port: r.read_u32()?,
            },
            "cancel-tcpip-forward" => GlobalRequestType::CancelTcpipForward {
                address: r.read_string_utf8()?,
                port: r.read_u32()?,
            },
            _ => GlobalRequestType::Unknown {
                name,
                data: r.rest().to_vec(),
            },
        };

        Ok(Self {
            request,
            want_reply,
        })
    }
}

/// SSH_MSG_REQUEST_SUCCESS (RFC 4254 Section 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSuccess {
    /// Request-specific response data (e.g. the bound port for
    /// "tcpip-forward" with port 0).
    pub data: Vec<u8>,
}

impl RequestSuccess {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(1 + self.data.len());
        w.put_byte(MessageType::RequestSuccess as u8);
        w.put_raw(&self.data);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::RequestSuccess as u8, "SSH_MSG_REQUEST_SUCCESS")?;
        Ok(Self {
            data: r.rest().to_vec(),
        })
    }
}

/// SSH_MSG_REQUEST_FAILURE (RFC 4254 Section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFailure;

impl RequestFailure {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::RequestFailure as u8]
    }
}

/// Channel type for SSH_MSG_CHANNEL_OPEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    /// Session channel (shell, exec, subsystem).
    Session,
    /// Direct TCP/IP channel (local port forwarding).
    DirectTcpip {
        /// Host to connect to.
        host: String,
        /// Port to connect to.
        port: u32,
        /// Originator IP address.
        originator_address: String,
        /// Originator port.
        originator_port: u32,
    },
    /// Forwarded TCP/IP channel (remote port forwarding).
    ForwardedTcpip {
        /// Address that was connected on the server.
        connected_address: String,
        /// Port that was connected.
        connected_port: u32,
        /// Originator IP address.
        originator_address: String,
        /// Originator port.
        originator_port: u32,
    },
}

impl ChannelType {
    /// Returns the channel type name.
    pub fn name(&self) -> &str {
        match self {
            ChannelType::Session => "session",
            ChannelType::DirectTcpip { .. } => "direct-tcpip",
            ChannelType::ForwardedTcpip { .. } => "forwarded-tcpip",
        }
    }
}

/// SSH_MSG_CHANNEL_OPEN (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpen {
    /// Channel type and type-specific parameters.
    pub channel_type: ChannelType,
    /// Sender's channel number.
    pub sender_channel: u32,
    /// Initial window size granted to the peer.
    pub initial_window_size: u32,
    /// Maximum packet size accepted from the peer.
    pub maximum_packet_size: u32,
}

impl ChannelOpen {
    /// Creates the message.
    pub fn new(
        channel_type: ChannelType,
        sender_channel: u32,
        initial_window_size: u32,
        maximum_packet_size: u32,
    ) -> Self {
        Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(64);
        w.put_byte(MessageType::ChannelOpen as u8);
        w.put_string(self.channel_type.name().as_bytes());
        w.put_u32(self.sender_channel);
        w.put_u32(self.initial_window_size);
        w.put_u32(self.maximum_packet_size);
        match &self.channel_type {
            ChannelType::Session => {}
            ChannelType::DirectTcpip {
                host,
                port,
                originator_address,
                originator_port,
            } => {
                w.put_string(host.as_bytes());
                w.put_u32(*port);
                w.put_string(originator_address.as_bytes());
                w.put_u32(*originator_port);
            }
            ChannelType::ForwardedTcpip {
                connected_address,
                connected_port,
                originator_address,
                originator_port,
            } => {
                w.put_string(connected_address.as_bytes());
                w.put_u32(*connected_port);
                w.put_string(originator_address.as_bytes());
                w.put_u32(*originator_port);
            }
        }
        w.into_bytes()
    }

    /// Parses the message body.
    ///
    /// # Errors
    ///
    /// Rejects window or packet sizes beyond [`MAX_WINDOW_SIZE`] /
    /// [`MAX_PACKET_SIZE`] and unknown channel types.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelOpen as u8, "SSH_MSG_CHANNEL_OPEN")?;
        let type_name = r.read_string_utf8()?;
        let sender_channel = r.read_u32()?;
        let initial_window_size = r.read_u32()?;
        let maximum_packet_size = r.read_u32()?;

        if initial_window_size > MAX_WINDOW_SIZE {
            return Err(HawserError::Channel(format!(
                "initial window {} exceeds limit {}",
                initial_window_size, MAX_WINDOW_SIZE
            )));
        }
        if maximum_packet_size > MAX_PACKET_SIZE {
            return Err(HawserError::Channel(format!(
                "maximum packet size {} exceeds limit {}",
                maximum_packet_size, MAX_PACKET_SIZE
            )));
        }

        let channel_type = match type_name.as_str() {
            "session" => ChannelType::Session,
            "direct-tcpip" => ChannelType::DirectTcpip {
                host: r.read_string_utf8()?,
                port: r.read_u32()?,
                originator_address: r.read_string_utf8()?,
                originator_port: r.read_u32()?,
            },
            "forwarded-tcpip" => ChannelType::ForwardedTcpip {
                connected_address: r.read_string_utf8()?,
                connected_port: r.read_u32()?,
                originator_address: r.read_string_utf8()?,
                originator_port: r.read_u32()?,
            },
            other => {
                return Err(HawserError::Channel(format!(
                    "unsupported channel type '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            channel_type,
            sender_channel,
            initial_window_size,
            maximum_packet_size,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_CONFIRMATION (RFC 4254 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOpenConfirmation {
    /// Recipient (our) channel number.
    pub recipient_channel: u32,
    /// Sender (the peer's) channel number.
    pub sender_channel: u32,
    /// Window the peer grants us.
    pub initial_window_size: u32,
    /// Largest message the peer accepts.
    pub maximum_packet_size: u32,
}

impl ChannelOpenConfirmation {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(20);
        w.put_byte(MessageType::ChannelOpenConfirmation as u8);
        w.put_u32(self.recipient_channel);
        w.put_u32(self.sender_channel);
        w.put_u32(self.initial_window_size);
        w.put_u32(self.maximum_packet_size);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(
            MessageType::ChannelOpenConfirmation as u8,
            "SSH_MSG_CHANNEL_OPEN_CONFIRMATION",
        )?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
            sender_channel: r.read_u32()?,
            initial_window_size: r.read_u32()?,
            maximum_packet_size: r.read_u32()?,
        })
    }
}

/// SSH_MSG_CHANNEL_OPEN_FAILURE (RFC 4254 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOpenFailure {
    /// Recipient (our) channel number.
    pub recipient_channel: u32,
    /// Failure reason code.
    pub reason: u32,
    /// Description text.
    pub description: String,
}

/// Reason codes for [`ChannelOpenFailure`].
pub mod open_failure_reason {
    /// SSH_OPEN_ADMINISTRATIVELY_PROHIBITED
    pub const ADMINISTRATIVELY_PROHIBITED: u32 = 1;
    /// SSH_OPEN_CONNECT_FAILED
    pub const CONNECT_FAILED: u32 = 2;
    /// SSH_OPEN_UNKNOWN_CHANNEL_TYPE
    pub const UNKNOWN_CHANNEL_TYPE: u32 = 3;
    /// SSH_OPEN_RESOURCE_SHORTAGE
    pub const RESOURCE_SHORTAGE: u32 = 4;
}

impl ChannelOpenFailure {
    /// Creates the message.
    pub fn new(recipient_channel: u32, reason: u32, description: &str) -> Self {
        Self {
            recipient_channel,
            reason,
            description: description.to_string(),
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(24 + self.description.len());
        w.put_byte(MessageType::ChannelOpenFailure as u8);
        w.put_u32(self.recipient_channel);
        w.put_u32(self.reason);
        w.put_string(self.description.as_bytes());
        w.put_string(b""); // language tag
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(
            MessageType::ChannelOpenFailure as u8,
            "SSH_MSG_CHANNEL_OPEN_FAILURE",
        )?;
        let recipient_channel = r.read_u32()?;
        let reason = r.read_u32()?;
        let description = r.read_string_utf8()?;
        let _language_tag = r.read_string()?;
        Ok(Self {
            recipient_channel,
            reason,
            description,
        })
    }
}

/// SSH_MSG_CHANNEL_WINDOW_ADJUST (RFC 4254 Section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWindowAdjust {
    /// Recipient channel number.
    pub recipient_channel: u32,
    /// Bytes added to the window.
    pub bytes_to_add: u32,
}

impl ChannelWindowAdjust {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(12);
        w.put_byte(MessageType::ChannelWindowAdjust as u8);
        w.put_u32(self.recipient_channel);
        w.put_u32(self.bytes_to_add);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(
            MessageType::ChannelWindowAdjust as u8,
            "SSH_MSG_CHANNEL_WINDOW_ADJUST",
        )?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
            bytes_to_add: r.read_u32()?,
        })
    }
}

/// SSH_MSG_CHANNEL_DATA (RFC 4254 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    /// Recipient channel number.
    pub recipient_channel: u32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl ChannelData {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(12 + self.data.len());
        w.put_byte(MessageType::ChannelData as u8);
        w.put_u32(self.recipient_channel);
        w.put_string(&self.data);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelData as u8, "SSH_MSG_CHANNEL_DATA")?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
            data: r.read_string()?,
        })
    }
}

/// Extended data stream code (RFC 4254 Section 5.2); 1 is stderr.
pub const EXTENDED_DATA_STDERR: u32 = 1;

/// SSH_MSG_CHANNEL_EXTENDED_DATA (RFC 4254 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelExtendedData {
    /// Recipient channel number.
    pub recipient_channel: u32,
    /// Stream code (1 = stderr).
    pub data_type: u32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl ChannelExtendedData {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(16 + self.data.len());
        w.put_byte(MessageType::ChannelExtendedData as u8);
        w.put_u32(self.recipient_channel);
        w.put_u32(self.data_type);
        w.put_string(&self.data);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(
            MessageType::ChannelExtendedData as u8,
            "SSH_MSG_CHANNEL_EXTENDED_DATA",
        )?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
            data_type: r.read_u32()?,
            data: r.read_string()?,
        })
    }
}

/// SSH_MSG_CHANNEL_EOF (RFC 4254 Section 5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEof {
    /// Recipient channel number.
    pub recipient_channel: u32,
}

impl ChannelEof {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        w.put_byte(MessageType::ChannelEof as u8);
        w.put_u32(self.recipient_channel);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelEof as u8, "SSH_MSG_CHANNEL_EOF")?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
        })
    }
}

/// SSH_MSG_CHANNEL_CLOSE (RFC 4254 Section 5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClose {
    /// Recipient channel number.
    pub recipient_channel: u32,
}

impl ChannelClose {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        w.put_byte(MessageType::ChannelClose as u8);
        w.put_u32(self.recipient_channel);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelClose as u8, "SSH_MSG_CHANNEL_CLOSE")?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
        })
    }
}

/// Channel request payloads (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequestType {
    /// Allocate a pseudoterminal.
    PtyReq {
        /// TERM value (e.g. "xterm-256color").
        term: String,
        /// Width in characters.
        width_chars: u32,
        /// Height in rows.
        height_rows: u32,
        /// Width in pixels.
        width_pixels: u32,
        /// Height in pixels.
        height_pixels: u32,
        /// Encoded terminal modes.
        modes: Vec<u8>,
    },
    /// Set an environment variable.
    Env {
        /// Variable name.
        name: String,
        /// Variable value.
        value: String,
    },
    /// Execute a command.
    Exec {
        /// Command line.
        command: String,
    },
    /// Start the user's shell.
    Shell,
    /// Start a subsystem (e.g. "sftp").
    Subsystem {
        /// Subsystem name.
        name: String,
    },
    /// Report the terminal was resized.
    WindowChange {
        /// Width in characters.
        width_chars: u32,
        /// Height in rows.
        height_rows: u32,
        /// Width in pixels.
        width_pixels: u32,
        /// Height in pixels.
        height_pixels: u32,
    },
    /// Deliver a signal to the remote process.
    Signal {
        /// Signal name without the "SIG" prefix.
        name: String,
    },
    /// Remote process exit status.
    ExitStatus {
        /// Exit code.
        exit_status: u32,
    },
    /// Remote process terminated by signal.
    ExitSignal {
        /// Signal name without the "SIG" prefix.
        signal_name: String,
        /// Whether a core dump was produced.
        core_dumped: bool,
        /// Error text.
        error_message: String,
    },
}

impl ChannelRequestType {
    /// Returns the request type name.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelRequestType::PtyReq { .. } => "pty-req",
            ChannelRequestType::Env { .. } => "env",
            ChannelRequestType::Exec { .. } => "exec",
            ChannelRequestType::Shell => "shell",
            ChannelRequestType::Subsystem { .. } => "subsystem",
            ChannelRequestType::WindowChange { .. } => "window-change",
            ChannelRequestType::Signal { .. } => "signal",
            ChannelRequestType::ExitStatus { .. } => "exit-status",
            ChannelRequestType::ExitSignal { .. } => "exit-signal",
        }
    }
}

/// SSH_MSG_CHANNEL_REQUEST (RFC 4254 Section 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Recipient channel number.
    pub recipient_channel: u32,
    /// Request payload.
    pub request: ChannelRequestType,
    /// Whether CHANNEL_SUCCESS/FAILURE must be sent back.
    pub want_reply: bool,
}

impl ChannelRequest {
    /// Creates the message.
    pub fn new(recipient_channel: u32, request: ChannelRequestType, want_reply: bool) -> Self {
        Self {
            recipient_channel,
            request,
            want_reply,
        }
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(64);
        w.put_byte(MessageType::ChannelRequest as u8);
        w.put_u32(self.recipient_channel);
        w.put_string(self.request.name().as_bytes());
        w.put_boolean(self.want_reply);
        match &self.request {
            ChannelRequestType::PtyReq {
                term,
                width_chars,
                height_rows,
                width_pixels,
                height_pixels,
                modes,
            } => {
                w.put_string(term.as_bytes());
                w.put_u32(*width_chars);
                w.put_u32(*height_rows);
                w.put_u32(*width_pixels);
                w.put_u32(*height_pixels);
                w.put_string(modes);
            }
            ChannelRequestType::Env { name, value } => {
                w.put_string(name.as_bytes());
                w.put_string(value.as_bytes());
            }
            ChannelRequestType::Exec { command } => w.put_string(command.as_bytes()),
            ChannelRequestType::Shell => {}
            ChannelRequestType::Subsystem { name } => w.put_string(name.as_bytes()),
            ChannelRequestType::WindowChange {
                width_chars,
                height_rows,
                width_pixels,
                height_pixels,
            } => {
                w.put_u32(*width_chars);
                w.put_u32(*height_rows);
                w.put_u32(*width_pixels);
                w.put_u32(*height_pixels);
            }
            ChannelRequestType::Signal { name } => w.put_string(name.as_bytes()),
            ChannelRequestType::ExitStatus { exit_status } => w.put_u32(*exit_status),
            ChannelRequestType::ExitSignal {
                signal_name,
                core_dumped,
                error_message,
            } => {
                w.put_string(signal_name.as_bytes());
                w.put_boolean(*core_dumped);
                w.put_string(error_message.as_bytes());
                w.put_string(b""); // language tag
            }
        }
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelRequest as u8, "SSH_MSG_CHANNEL_REQUEST")?;
        let recipient_channel = r.read_u32()?;
        let name = r.read_string_utf8()?;
        let want_reply = r.read_boolean()?;

        let request = match name.as_str() {
            "pty-req" => ChannelRequestType::PtyReq {
                term: r.read_string_utf8()?,
                width_chars: r.read_u32()?,
                height_rows: r.read_u32()?,
                width_pixels: r.read_u32()?,
                height_pixels: r.read_u32()?,
                modes: r.read_string()?,
            },
            "env" => ChannelRequestType::Env {
                name: r.read_string_utf8()?,
                value: r.read_string_utf8()?,
            },
            "exec" => ChannelRequestType::Exec {
                command: r.read_string_utf8()?,
            },
            "shell" => ChannelRequestType::Shell,
            "subsystem" => ChannelRequestType::Subsystem {
                name: r.read_string_utf8()?,
            },
            "window-change" => ChannelRequestType::WindowChange {
                width_chars: r.read_u32()?,
                height_rows: r.read_u32()?,
                width_pixels: r.read_u32()?,
                height_pixels: r.read_u32()?,
            },
            "signal" => ChannelRequestType::Signal {
                name: r.read_string_utf8()?,
            },
            "exit-status" => ChannelRequestType::ExitStatus {
                exit_status: r.read_u32()?,
            },
            "exit-signal" => {
                let signal_name = r.read_string_utf8()?;
                let core_dumped = r.read_boolean()?;
                let error_message = r.read_string_utf8()?;
                let _language_tag = r.read_string()?;
                ChannelRequestType::ExitSignal {
                    signal_name,
                    core_dumped,
                    error_message,
                }
            }
            other => {
                return Err(HawserError::Channel(format!(
                    "unsupported channel request '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            recipient_channel,
            request,
            want_reply,
        })
    }
}

/// SSH_MSG_CHANNEL_SUCCESS (RFC 4254 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSuccess {
    /// Recipient channel number.
    pub recipient_channel: u32,
}

impl ChannelSuccess {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        w.put_byte(MessageType::ChannelSuccess as u8);
        w.put_u32(self.recipient_channel);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelSuccess as u8, "SSH_MSG_CHANNEL_SUCCESS")?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
        })
    }
}

/// SSH_MSG_CHANNEL_FAILURE (RFC 4254 Section 6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFailure {
    /// Recipient channel number.
    pub recipient_channel: u32,
}

impl ChannelFailure {
    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(8);
        w.put_byte(MessageType::ChannelFailure as u8);
        w.put_u32(self.recipient_channel);
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ChannelFailure as u8, "SSH_MSG_CHANNEL_FAILURE")?;
        Ok(Self {
            recipient_channel: r.read_u32()?,
        })
    }
}
