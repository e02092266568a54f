//! SSH wire-format primitives (RFC 4251 Section 5).
//!
//! Every SSH message is built from a small set of primitive encodings:
//!
//! - `byte`, `boolean` (0 = false, nonzero = true)
//! - `uint32`, `uint64` (big-endian)
//! - `string` (uint32 length prefix + raw bytes)
//! - `mpint` (two's-complement big-endian with minimal leading-byte rules)
//! - `name-list` (comma-joined ASCII names inside a `string`)
//!
//! [`WireWriter`] appends primitives to a growable buffer; callers that know
//! a message's size reserve capacity up front with [`WireWriter::with_capacity`].
//! [`WireReader`] consumes a byte slice; any read past the end fails with
//! [`HawserError::Protocol`] instead of panicking.
//!
//! # Example
//!
//! ```rust
//! use hawser_proto::ssh::wire::{WireReader, WireWriter};
//!
//! let mut w = WireWriter::new();
//! w.put_u32(42);
//! w.put_string(b"ssh-userauth");
//!
//! let bytes = w.into_bytes();
//! let mut r = WireReader::new(&bytes);
//! assert_eq!(r.read_u32().unwrap(), 42);
//! assert_eq!(r.read_string().unwrap(), b"ssh-userauth");
//! ```

use bytes::{BufMut, BytesMut};
use hawser_platform::{HawserError, HawserResult};

/// Writer for SSH primitive types.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Creates a writer with `capacity` bytes reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends a single byte.
    pub fn put_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Appends a boolean as a single byte (RFC 4251: 0 or 1).
    pub fn put_boolean(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Appends a big-endian uint32.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Appends a big-endian uint64.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Appends raw bytes without a length prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Appends a length-prefixed string.
    pub fn put_string(&mut self, bytes: &[u8]) {
        self.buf.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    /// Appends a name-list: comma-joined names in a `string`.
    pub fn put_name_list(&mut self, names: &[String]) {
        let joined = names.join(",");
        self.put_string(joined.as_bytes());
    }

    /// Appends an mpint.
    ///
    /// The magnitude is taken as an unsigned big-endian integer: leading
    /// zero bytes are stripped, and a single zero byte is prepended when
    /// the high bit of the first remaining byte is set, so the value always
    /// parses as non-negative.
    pub fn put_mpint(&mut self, magnitude: &[u8]) {
        let stripped: &[u8] = {
            let mut s = magnitude;
            while let Some((&0, rest)) = s.split_first() {
                s = rest;
            }
            s
        };

        if stripped.is_empty() {
            self.buf.put_u32(0);
            return;
        }

        let pad = stripped[0] & 0x80 != 0;
        self.buf.put_u32((stripped.len() + usize::from(pad)) as u32);
        if pad {
            self.buf.put_u8(0);
        }
        self.buf.put_slice(stripped);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Reader over a borrowed SSH message body.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn malformed(what: &str) -> HawserError {
        HawserError::Protocol(format!("malformed packet: truncated {}", what))
    }

    /// Consumes `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> HawserResult<&'a [u8]> {
        if self.offset + len > self.data.len() {
            return Err(Self::malformed("raw bytes"));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Consumes a single byte.
    pub fn read_byte(&mut self) -> HawserResult<u8> {
        let b = self.read_raw(1).map_err(|_| Self::malformed("byte"))?;
        Ok(b[0])
    }

    /// Consumes a boolean (any nonzero byte is true).
    pub fn read_boolean(&mut self) -> HawserResult<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Consumes a big-endian uint32.
    pub fn read_u32(&mut self) -> HawserResult<u32> {
        let b = self.read_raw(4).map_err(|_| Self::malformed("uint32"))?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Consumes a big-endian uint64.
    pub fn read_u64(&mut self) -> HawserResult<u64> {
        let b = self.read_raw(8).map_err(|_| Self::malformed("uint64"))?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_be_bytes(out))
    }

    /// Consumes a length-prefixed string.
    pub fn read_string(&mut self) -> HawserResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.read_raw(len).map_err(|_| Self::malformed("string"))?.to_vec())
    }

    /// Consumes a length-prefixed string and validates it as UTF-8.
    pub fn read_string_utf8(&mut self) -> HawserResult<String> {
        String::from_utf8(self.read_string()?)
            .map_err(|_| HawserError::Protocol("string contains invalid UTF-8".to_string()))
    }

    /// Consumes a name-list.
    pub fn read_name_list(&mut self) -> HawserResult<Vec<String>> {
        let raw = self.read_string()?;
        let text = std::str::from_utf8(&raw)
            .map_err(|_| HawserError::Protocol("name-list contains invalid UTF-8".to_string()))?;
        if text.is_empty() {
            Ok(vec![])
        } else {
            Ok(text.split(',').map(String::from).collect())
        }
    }

    /// Consumes an mpint and returns its unsigned magnitude with leading
    /// zeros removed.
    pub fn read_mpint(&mut self) -> HawserResult<Vec<u8>> {
        let raw = self.read_string()?;
        if let Some(&first) = raw.first() {
            if first & 0x80 != 0 {
                return Err(HawserError::Protocol(
                    "negative mpint is not valid here".to_string(),
                ));
            }
        }
        let mut slice = &raw[..];
        while let Some((&0, rest)) = slice.split_first() {
            slice = rest;
        }
        Ok(slice.to_vec())
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns the unconsumed tail without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Consumes the leading message-type byte and checks it.
    pub fn expect_message(&mut self, expected: u8, name: &str) -> HawserResult<()> {
        let got = self.read_byte()?;
        if got != expected {
            return Err(HawserError::Protocol(format!(
                "expected {} ({}), got message number {}",
                name, expected, got
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut w = WireWriter::with_capacity(64);
        w.put_byte(21);
        w.put_boolean(true);
        w.put_u32(0xDEAD_BEEF);
        w.put_u64(1 << 40);
        w.put_string(b"ssh-connection");

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_byte().unwrap(), 21);
        assert!(r.read_boolean().unwrap());
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_u64().unwrap(), 1 << 40);
        assert_eq!(r.read_string().unwrap(), b"ssh-connection");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_is_protocol_error() {
        let mut r = WireReader::new(&[0, 0, 0, 9, b'x']);
        let err = r.read_string().unwrap_err();
        assert!(matches!(err, HawserError::Protocol(_)));
    }

    #[test]
    fn test_name_list_round_trip() {
        let names = vec![
            "curve25519-sha256".to_string(),
            "ecdh-sha2-nistp256".to_string(),
        ];
        let mut w = WireWriter::new();
        w.put_name_list(&names);

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_name_list().unwrap(), names);
    }

    #[test]
    fn test_empty_name_list() {
        let mut w = WireWriter::new();
        w.put_name_list(&[]);

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert!(r.read_name_list().unwrap().is_empty());
    }

    #[test]
    fn test_mpint_minimal_encoding() {
        // Zero encodes as a zero-length string.
        let mut w = WireWriter::new();
        w.put_mpint(&[0, 0, 0]);
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 0]);

        // No high bit: written as-is with leading zeros stripped.
        let mut w = WireWriter::new();
        w.put_mpint(&[0x00, 0x12, 0x34]);
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 2, 0x12, 0x34]);

        // High bit set: one zero byte of padding.
        let mut w = WireWriter::new();
        w.put_mpint(&[0x80, 0x01]);
        assert_eq!(w.into_bytes(), vec![0, 0, 0, 3, 0x00, 0x80, 0x01]);
    }

    #[test]
    fn test_mpint_read_strips_padding() {
        let mut w = WireWriter::new();
        w.put_mpint(&[0xFF; 32]);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_mpint().unwrap(), vec![0xFF; 32]);
    }

    #[test]
    fn test_negative_mpint_rejected() {
        // A raw string whose first byte has the high bit set parses as a
        // negative mpint, which no SSH field in this protocol uses.
        let mut r = WireReader::new(&[0, 0, 0, 1, 0x80]);
        assert!(r.read_mpint().is_err());
    }

    #[test]
    fn test_expect_message() {
        let mut r = WireReader::new(&[20, 0]);
        assert!(r.expect_message(20, "SSH_MSG_KEXINIT").is_ok());

        let mut r = WireReader::new(&[21]);
        let err = r.expect_message(20, "SSH_MSG_KEXINIT").unwrap_err();
        assert!(err.to_string().contains("SSH_MSG_KEXINIT"));
    }
}
