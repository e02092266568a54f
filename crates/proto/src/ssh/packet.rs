//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet Format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! byte[m]   mac / AEAD tag
//! ```
//!
//! # Constraints
//!
//! - `(4 + 1 + payload + padding) % cipher_block_size == 0`
//! - minimum 4 bytes of padding, total packet at least 16 bytes
//! - maximum packet size 35000 bytes (RFC 4253 Section 6.1)
//!
//! Each direction owns one framing context ([`PacketSealer`] outbound,
//! [`PacketOpener`] inbound) holding its cipher state and a 32-bit sequence
//! counter. The counter increments by exactly one per packet regardless of
//! size, wraps modulo 2^32, and is never reset except by the strict-KEX
//! rule at NEWKEYS.

use crate::ssh::crypto::{Deflater, Inflater, PacketCipher};
use hawser_platform::{HawserError, HawserResult};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum packet size in bytes (RFC 4253 Section 6.1).
pub const MAX_PACKET_SIZE: usize = 35000;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: usize = 4;

/// Outbound framing context: compress, pad, seal, count.
pub struct PacketSealer {
    cipher: PacketCipher,
    deflater: Deflater,
    seq: u32,
}

impl std::fmt::Debug for PacketSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSealer")
            .field("cipher", &self.cipher)
            .field("seq", &self.seq)
            .finish()
    }
}

impl PacketSealer {
    /// Creates the pre-NEWKEYS context: identity cipher, no compression.
    pub fn new() -> Self {
        Self {
            cipher: PacketCipher::none(),
            deflater: Deflater::new(crate::ssh::crypto::CompressionAlgorithm::None),
            seq: 0,
        }
    }

    /// Current outbound sequence number.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Atomically replaces cipher and compression state at NEWKEYS.
    ///
    /// `reset_seq` is true only under strict KEX after the first NEWKEYS.
    pub fn install(&mut self, cipher: PacketCipher, deflater: Deflater, reset_seq: bool) {
        self.cipher = cipher;
        self.deflater = deflater;
        if reset_seq {
            self.seq = 0;
        }
    }

    /// Activates delayed compression (`zlib@openssh.com`) after
    /// USERAUTH_SUCCESS.
    pub fn enable_compression(&mut self) {
        self.deflater.activate();
    }

    /// Frames and seals a payload, returning the wire bytes and advancing
    /// the sequence counter.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Protocol`] if the framed packet would exceed
    /// the 35000-byte limit.
    pub fn seal(&mut self, payload: &[u8]) -> HawserResult<Vec<u8>> {
        let payload = self.deflater.compress(payload)?;

        let block_size = self.cipher.block_size();
        let min_len = self.cipher.min_packet_len();

        // padding so that (4 + 1 + payload + padding) % block == 0,
        // at least MIN_PADDING_LEN, total at least min_len.
        let mut padding_len = MIN_PADDING_LEN;
        while (4 + 1 + payload.len() + padding_len) % block_size != 0
            || 4 + 1 + payload.len() + padding_len < min_len
        {
            padding_len += 1;
        }

        let packet_length = 1 + payload.len() + padding_len;
        if 4 + packet_length > MAX_PACKET_SIZE {
            return Err(HawserError::Protocol(format!(
                "outbound packet too large: {} bytes (maximum {})",
                4 + packet_length,
                MAX_PACKET_SIZE
            )));
        }

        let mut packet = Vec::with_capacity(4 + packet_length + self.cipher.mac_len());
        packet.extend_from_slice(&(packet_length as u32).to_be_bytes());
        packet.push(padding_len as u8);
        packet.extend_from_slice(&payload);

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);
        packet.extend_from_slice(&padding);

        self.cipher.seal(&mut packet, self.seq)?;
        self.seq = self.seq.wrapping_add(1);

        Ok(packet)
    }
}

impl Default for PacketSealer {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded inbound packet together with the sequence number it consumed,
/// needed for SSH_MSG_UNIMPLEMENTED replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    /// Sequence number the packet was received under.
    pub seq: u32,
    /// Decompressed message payload.
    pub payload: Vec<u8>,
}

/// Inbound framing context: read, open, unpad, decompress, count.
pub struct PacketOpener {
    cipher: PacketCipher,
    inflater: Inflater,
    seq: u32,
}

impl std::fmt::Debug for PacketOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketOpener")
            .field("cipher", &self.cipher)
            .field("seq", &self.seq)
            .finish()
    }
}

impl PacketOpener {
    /// Creates the pre-NEWKEYS context: identity cipher, no compression.
    pub fn new() -> Self {
        Self {
            cipher: PacketCipher::none(),
            inflater: Inflater::new(crate::ssh::crypto::CompressionAlgorithm::None),
            seq: 0,
        }
    }

    /// Current inbound sequence number.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Atomically replaces cipher and compression state at NEWKEYS.
    pub fn install(&mut self, cipher: PacketCipher, inflater: Inflater, reset_seq: bool) {
        self.cipher = cipher;
        self.inflater = inflater;
        if reset_seq {
            self.seq = 0;
        }
    }

    /// Activates delayed decompression after USERAUTH_SUCCESS.
    pub fn enable_compression(&mut self) {
        self.inflater.activate();
    }

    /// Reads exactly one packet from `stream`, verifies and decrypts it,
    /// and returns the payload with the sequence number it consumed.
    ///
    /// # Errors
    ///
    /// - [`HawserError::Connection`] on socket errors or EOF
    /// - [`HawserError::Mac`] on tag/MAC mismatch (fatal)
    /// - [`HawserError::Protocol`] on framing violations
    pub async fn read_packet<R>(&mut self, stream: &mut R) -> HawserResult<ReceivedPacket>
    where
        R: AsyncRead + Unpin,
    {
        let head_len = self.cipher.length_bytes();
        let mut head = vec![0u8; head_len];
        stream.read_exact(&mut head).await?;

        let packet_length = self.cipher.packet_length(&mut head, self.seq)? as usize;

        if packet_length > MAX_PACKET_SIZE {
            return Err(HawserError::Protocol(format!(
                "inbound packet too large: {} bytes (maximum {})",
                packet_length, MAX_PACKET_SIZE
            )));
        }
        if packet_length < 1 + MIN_PADDING_LEN {
            return Err(HawserError::Protocol(format!(
                "inbound packet too small: {} bytes",
                packet_length
            )));
        }

        // Bytes of the packet body still on the wire, plus the tag/MAC.
        let already = head_len - 4;
        if packet_length < already {
            return Err(HawserError::Protocol(
                "packet length shorter than first cipher block".to_string(),
            ));
        }
        let mut rest = vec![0u8; packet_length - already + self.cipher.mac_len()];
        stream.read_exact(&mut rest).await?;

        let body = self.cipher.open(&head, &rest, self.seq)?;
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        if body.len() != packet_length {
            return Err(HawserError::Protocol(format!(
                "packet body length {} does not match declared {}",
                body.len(),
                packet_length
            )));
        }

        let padding_length = body[0] as usize;
        if padding_length < MIN_PADDING_LEN {
            return Err(HawserError::Protocol(format!(
                "padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }
        if 1 + padding_length > packet_length {
            return Err(HawserError::Protocol(format!(
                "padding length {} exceeds packet length {}",
                padding_length, packet_length
            )));
        }

        let payload = self.inflater.decompress(&body[1..packet_length - padding_length])?;

        Ok(ReceivedPacket { seq, payload })
    }
}

impl Default for PacketOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::{CipherAlgorithm, CompressionAlgorithm, MacAlgorithm};

    fn cipher_pair(
        cipher: CipherAlgorithm,
        mac: Option<MacAlgorithm>,
    ) -> (PacketCipher, PacketCipher) {
        let key = vec![0x42u8; cipher.key_len()];
        let iv = vec![0x24u8; cipher.iv_len().max(1)];
        let mac_key = vec![0x66u8; mac.map_or(0, |m| m.key_len())];
        (
            PacketCipher::new(cipher, mac, &key, &iv, &mac_key).unwrap(),
            PacketCipher::new(cipher, mac, &key, &iv, &mac_key).unwrap(),
        )
    }

    #[test]
    fn test_seal_alignment_and_minimums() {
        let mut sealer = PacketSealer::new();
        for payload_len in [0usize, 1, 7, 8, 100, 1000] {
            let payload = vec![0xAB; payload_len];
            let wire = sealer.seal(&payload).unwrap();
            assert_eq!(wire.len() % 8, 0, "not aligned for payload {}", payload_len);
            assert!(wire.len() >= 16);

            let padding_len = wire[4] as usize;
            assert!(padding_len >= MIN_PADDING_LEN);
        }
    }

    #[test]
    fn test_sequence_increments_per_packet() {
        let mut sealer = PacketSealer::new();
        assert_eq!(sealer.seq(), 0);
        sealer.seal(b"a").unwrap();
        sealer.seal(&vec![0u8; 5000]).unwrap();
        sealer.seal(b"").unwrap();
        assert_eq!(sealer.seq(), 3);
    }

    #[test]
    fn test_seal_rejects_oversized_payload() {
        let mut sealer = PacketSealer::new();
        let err = sealer.seal(&vec![0u8; MAX_PACKET_SIZE + 100]).unwrap_err();
        assert!(matches!(err, HawserError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_plaintext_round_trip() {
        let mut sealer = PacketSealer::new();
        let mut opener = PacketOpener::new();

        let wire = sealer.seal(b"SSH message payload").unwrap();
        let mut cursor = std::io::Cursor::new(wire);
        let received = opener.read_packet(&mut cursor).await.unwrap();

        assert_eq!(received.payload, b"SSH message payload");
        assert_eq!(received.seq, 0);
        assert_eq!(opener.seq(), 1);
    }

    #[tokio::test]
    async fn test_encrypted_round_trip_all_suites() {
        let suites = [
            (CipherAlgorithm::ChaCha20Poly1305, None),
            (CipherAlgorithm::Aes128Gcm, None),
            (CipherAlgorithm::Aes256Gcm, None),
            (CipherAlgorithm::Aes128Ctr, Some(MacAlgorithm::HmacSha256)),
            (CipherAlgorithm::Aes256Ctr, Some(MacAlgorithm::HmacSha512Etm)),
        ];

        for (cipher, mac) in suites {
            let (seal_cipher, open_cipher) = cipher_pair(cipher, mac);
            let mut sealer = PacketSealer::new();
            let mut opener = PacketOpener::new();
            sealer.install(
                seal_cipher,
                Deflater::new(CompressionAlgorithm::None),
                false,
            );
            opener.install(
                open_cipher,
                Inflater::new(CompressionAlgorithm::None),
                false,
            );

            let mut wire = Vec::new();
            for i in 0..3 {
                wire.extend(sealer.seal(format!("message {}", i).as_bytes()).unwrap());
            }

            let mut cursor = std::io::Cursor::new(wire);
            for i in 0..3u32 {
                let received = opener.read_packet(&mut cursor).await.unwrap();
                assert_eq!(received.payload, format!("message {}", i).as_bytes());
                assert_eq!(received.seq, i, "suite {}", cipher.name());
            }
        }
    }

    #[tokio::test]
    async fn test_mac_mismatch_is_mac_error() {
        let (seal_cipher, open_cipher) =
            cipher_pair(CipherAlgorithm::Aes128Ctr, Some(MacAlgorithm::HmacSha256Etm));
        let mut sealer = PacketSealer::new();
        let mut opener = PacketOpener::new();
        sealer.install(seal_cipher, Deflater::new(CompressionAlgorithm::None), false);
        opener.install(open_cipher, Inflater::new(CompressionAlgorithm::None), false);

        let mut wire = sealer.seal(b"tamper me").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut cursor = std::io::Cursor::new(wire);
        let err = opener.read_packet(&mut cursor).await.unwrap_err();
        assert!(matches!(err, HawserError::Mac(_)));
    }

    #[tokio::test]
    async fn test_strict_kex_sequence_reset() {
        let (seal_cipher, open_cipher) = cipher_pair(CipherAlgorithm::ChaCha20Poly1305, None);
        let mut sealer = PacketSealer::new();
        let mut opener = PacketOpener::new();

        sealer.seal(b"kexinit").unwrap();
        sealer.seal(b"ecdh init").unwrap();
        assert_eq!(sealer.seq(), 2);

        // Strict KEX resets both counters at NEWKEYS.
        sealer.install(seal_cipher, Deflater::new(CompressionAlgorithm::None), true);
        opener.install(open_cipher, Inflater::new(CompressionAlgorithm::None), true);
        assert_eq!(sealer.seq(), 0);
        assert_eq!(opener.seq(), 0);

        let wire = sealer.seal(b"first after newkeys").unwrap();
        let mut cursor = std::io::Cursor::new(wire);
        let received = opener.read_packet(&mut cursor).await.unwrap();
        assert_eq!(received.seq, 0);
        assert_eq!(received.payload, b"first after newkeys");
    }

    #[tokio::test]
    async fn test_compressed_round_trip() {
        let mut sealer = PacketSealer::new();
        let mut opener = PacketOpener::new();
        sealer.install(
            PacketCipher::none(),
            Deflater::new(CompressionAlgorithm::ZlibDelayed),
            false,
        );
        opener.install(
            PacketCipher::none(),
            Inflater::new(CompressionAlgorithm::ZlibDelayed),
            false,
        );
        sealer.enable_compression();
        opener.enable_compression();

        let payload = b"compressible payload ".repeat(100);
        let wire = sealer.seal(&payload).unwrap();
        assert!(wire.len() < payload.len());

        let mut cursor = std::io::Cursor::new(wire);
        let received = opener.read_packet(&mut cursor).await.unwrap();
        assert_eq!(received.payload, payload);
    }

    #[tokio::test]
    async fn test_padding_violation_rejected() {
        // Hand-build a packet with 2 bytes of padding.
        let mut wire = Vec::new();
        wire.extend_from_slice(&8u32.to_be_bytes());
        wire.push(2); // padding_length < 4
        wire.extend_from_slice(b"hello");
        wire.extend_from_slice(&[0u8; 2]);

        let mut opener = PacketOpener::new();
        let mut cursor = std::io::Cursor::new(wire);
        let err = opener.read_packet(&mut cursor).await.unwrap_err();
        assert!(matches!(err, HawserError::Protocol(_)));
    }
}
