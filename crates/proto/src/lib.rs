//! SSH-2 client protocol engine for the Hawser ecosystem.
//!
//! This crate provides the network-facing protocol core of an SSH client:
//! the binary packet protocol, algorithm negotiation, key exchange and
//! re-keying, MAC/encryption, authentication method dispatch, and channel
//! multiplexing with window-based flow control.
//!
//! # Example
//!
//! ```rust
//! use hawser_proto::ssh::wire::{WireReader, WireWriter};
//!
//! let mut w = WireWriter::new();
//! w.put_string(b"ssh-connection");
//! let bytes = w.into_bytes();
//!
//! let mut r = WireReader::new(&bytes);
//! assert_eq!(r.read_string().unwrap(), b"ssh-connection");
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted libraries (`ring`, the
//!   RustCrypto cipher crates, `ml-kem`)
//! - Constant-time MAC comparison via `subtle`
//! - Secret key material is zeroized with `zeroize`
//! - Strict-KEX hardening and EtM cipher modes are supported and preferred
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ssh;
