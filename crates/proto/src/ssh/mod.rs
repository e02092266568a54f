//! SSH-2 client protocol implementation.
//!
//! This module implements the client side of the SSH protocol according to
//! RFC 4251-4254 and the extensions in RFC 4419, 5656, 5647, 8268, 8308,
//! 8332, 8709 and 8731, plus the OpenSSH strict-KEX, ChaCha20-Poly1305 and
//! delayed-zlib extensions.
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Wire codec** ([`wire`]) - RFC 4251 primitive types
//! 2. **Packet layer** ([`packet`], [`crypto`]) - binary packet protocol:
//!    framing, encryption, MAC, compression, sequence counters
//! 3. **Negotiation and key exchange** ([`kex`], [`kex_dh`], [`hostkey`]) -
//!    KEXINIT, the key agreement families, host key verification
//! 4. **Authentication** ([`auth`]) - ordered-method USERAUTH driver
//! 5. **Connection layer** ([`connection`], [`channel`]) - channels with
//!    window flow control, global and channel requests
//! 6. **Session** ([`session`]) - the state machine tying it together: one
//!    background receive task demultiplexes the socket while foreground
//!    callers wait on one-shot waiters
//! 7. **Forwarding** ([`forwarding`]) - local and remote port forwarding
//!
//! # Example
//!
//! ```rust,no_run
//! use hawser_proto::ssh::config::{AuthAttempt, ConnectionConfig};
//! use hawser_proto::ssh::session::Session;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = ConnectionConfig::default();
//! config.username = "alice".to_string();
//! config.auth_attempts = vec![AuthAttempt::Password {
//!     password: "secret".to_string(),
//! }];
//! config.host_key_verifier = Some(Box::new(|key| {
//!     println!("host key: {} {}", key.algorithm, key.fingerprint);
//!     true
//! }));
//!
//! let session = Session::new(config);
//! session.connect("127.0.0.1:22").await?;
//!
//! let output = session.exec("uname -a").await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//!
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod forwarding;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod message;
pub mod packet;
pub mod session;
pub mod transport;
pub mod version;
pub mod wire;

// Re-export the main types.
pub use auth::{AuthDriver, AuthProgress};
pub use channel::{Channel, ChannelEvent, ChannelState};
pub use config::{AlgorithmPreferences, AuthAttempt, ConnectionConfig, InfoPrompt};
pub use connection::{ChannelRequestType, ChannelType, GlobalRequestType};
pub use crypto::{CipherAlgorithm, CompressionAlgorithm, MacAlgorithm, PacketCipher};
pub use forwarding::{ForwardAddr, LocalForward, RemoteForward};
pub use hostkey::{fingerprint_sha256, HostKeyAlgorithm, HostKeyInfo};
pub use kex::{negotiate, KexInit, NegotiatedAlgorithms, NewKeys};
pub use kex_dh::{derive_key, KexAlgorithm, KexHash, KeyExchange};
pub use message::MessageType;
pub use packet::{PacketOpener, PacketSealer};
pub use session::{ExecOutput, ForwardedChannel, Session};
pub use transport::{SessionState, TransportState};
pub use version::Version;
