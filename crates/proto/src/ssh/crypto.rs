//! SSH packet cryptography.
//!
//! This module implements the cipher, MAC and compression backends used by
//! the binary packet protocol:
//!
//! - `chacha20-poly1305@openssh.com` - AEAD with a separately encrypted
//!   length field (PROTOCOL.chacha20poly1305)
//! - `aes128-gcm@openssh.com`, `aes256-gcm@openssh.com` - AEAD per RFC 5647,
//!   length sent in clear as associated data
//! - `aes128-ctr`, `aes256-ctr` - stream ciphers paired with
//!   `hmac-sha2-256`/`hmac-sha2-512`, in classic (MAC over plaintext) or
//!   `-etm@openssh.com` (MAC over ciphertext) layout
//! - `none` / `zlib@openssh.com` compression
//!
//! All backends sit behind [`PacketCipher`], the capability interface the
//! packet layer selects at key-installation time: it exposes the block
//! size used for padding, the trailing tag length, how the length field is
//! recovered, and seal/open over whole packets.

use hawser_platform::{HawserError, HawserResult};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

/// `chacha20-poly1305@openssh.com` uses the original 64-bit-nonce ChaCha20,
/// not the 96-bit IETF variant.
type SshChaCha20 = chacha20::ChaCha20Legacy;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Cipher algorithm for SSH packet encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// ChaCha20-Poly1305 (OpenSSH variant).
    ChaCha20Poly1305,
    /// AES-128 in GCM mode (RFC 5647).
    Aes128Gcm,
    /// AES-256 in GCM mode (RFC 5647).
    Aes256Gcm,
    /// AES-128 in CTR mode (requires a MAC).
    Aes128Ctr,
    /// AES-256 in CTR mode (requires a MAC).
    Aes256Ctr,
}

impl CipherAlgorithm {
    /// Returns the negotiation name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305@openssh.com",
            CipherAlgorithm::Aes128Gcm => "aes128-gcm@openssh.com",
            CipherAlgorithm::Aes256Gcm => "aes256-gcm@openssh.com",
            CipherAlgorithm::Aes128Ctr => "aes128-ctr",
            CipherAlgorithm::Aes256Ctr => "aes256-ctr",
        }
    }

    /// Parses a negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chacha20-poly1305@openssh.com" => Some(CipherAlgorithm::ChaCha20Poly1305),
            "aes128-gcm@openssh.com" => Some(CipherAlgorithm::Aes128Gcm),
            "aes256-gcm@openssh.com" => Some(CipherAlgorithm::Aes256Gcm),
            "aes128-ctr" => Some(CipherAlgorithm::Aes128Ctr),
            "aes256-ctr" => Some(CipherAlgorithm::Aes256Ctr),
            _ => None,
        }
    }

    /// Bytes of key material consumed from the KEX key stream.
    ///
    /// The OpenSSH ChaCha20-Poly1305 construction takes two 256-bit keys:
    /// the main key followed by the length-header key.
    pub fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => 64,
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes128Ctr => 16,
            CipherAlgorithm::Aes256Gcm | CipherAlgorithm::Aes256Ctr => 32,
        }
    }

    /// Bytes of IV material consumed from the KEX key stream.
    pub fn iv_len(&self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => 0,
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => 12,
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes256Ctr => 16,
        }
    }

    /// Padding alignment unit for outbound framing.
    pub fn block_size(&self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => 8,
            _ => 16,
        }
    }

    /// Authentication tag length appended to the packet (0 for CTR).
    pub fn tag_len(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes256Ctr => 0,
            _ => 16,
        }
    }

    /// Returns true for AEAD ciphers, which do not take a separate MAC.
    pub fn is_aead(&self) -> bool {
        self.tag_len() > 0
    }
}

/// MAC algorithm for non-AEAD ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA-256, MAC over the plaintext packet.
    HmacSha256,
    /// HMAC-SHA-256, encrypt-then-MAC layout.
    HmacSha256Etm,
    /// HMAC-SHA-512, MAC over the plaintext packet.
    HmacSha512,
    /// HMAC-SHA-512, encrypt-then-MAC layout.
    HmacSha512Etm,
}

impl MacAlgorithm {
    /// Returns the negotiation name.
    pub fn name(&self) -> &'static str {
        match self {
            MacAlgorithm::HmacSha256 => "hmac-sha2-256",
            MacAlgorithm::HmacSha256Etm => "hmac-sha2-256-etm@openssh.com",
            MacAlgorithm::HmacSha512 => "hmac-sha2-512",
            MacAlgorithm::HmacSha512Etm => "hmac-sha2-512-etm@openssh.com",
        }
    }

    /// Parses a negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hmac-sha2-256" => Some(MacAlgorithm::HmacSha256),
            "hmac-sha2-256-etm@openssh.com" => Some(MacAlgorithm::HmacSha256Etm),
            "hmac-sha2-512" => Some(MacAlgorithm::HmacSha512),
            "hmac-sha2-512-etm@openssh.com" => Some(MacAlgorithm::HmacSha512Etm),
            _ => None,
        }
    }

    /// Bytes of key material consumed from the KEX key stream.
    pub fn key_len(&self) -> usize {
        match self {
            MacAlgorithm::HmacSha256 | MacAlgorithm::HmacSha256Etm => 32,
            MacAlgorithm::HmacSha512 | MacAlgorithm::HmacSha512Etm => 64,
        }
    }

    /// Length of the MAC appended to each packet.
    pub fn mac_len(&self) -> usize {
        self.key_len()
    }

    /// Returns true for encrypt-then-MAC variants.
    pub fn is_etm(&self) -> bool {
        matches!(self, MacAlgorithm::HmacSha256Etm | MacAlgorithm::HmacSha512Etm)
    }
}

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// No compression.
    None,
    /// zlib, active from NEWKEYS (RFC 4253).
    Zlib,
    /// zlib, active only after USERAUTH_SUCCESS (OpenSSH).
    ZlibDelayed,
}

impl CompressionAlgorithm {
    /// Returns the negotiation name.
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::ZlibDelayed => "zlib@openssh.com",
        }
    }

    /// Parses a negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(CompressionAlgorithm::None),
            "zlib" => Some(CompressionAlgorithm::Zlib),
            "zlib@openssh.com" => Some(CompressionAlgorithm::ZlibDelayed),
            _ => None,
        }
    }
}

fn hmac_over(algorithm: MacAlgorithm, key: &[u8], seq: u32, data: &[u8]) -> Vec<u8> {
    match algorithm {
        MacAlgorithm::HmacSha256 | MacAlgorithm::HmacSha256Etm => {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(&seq.to_be_bytes());
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        MacAlgorithm::HmacSha512 | MacAlgorithm::HmacSha512Etm => {
            let mut mac = <HmacSha512 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(&seq.to_be_bytes());
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

struct ChaChaPolyState {
    main_key: chacha20::Key,
    header_key: chacha20::Key,
}

impl ChaChaPolyState {
    fn new(key_material: &[u8]) -> Self {
        let mut main = [0u8; 32];
        let mut header = [0u8; 32];
        main.copy_from_slice(&key_material[..32]);
        header.copy_from_slice(&key_material[32..64]);
        let state = Self {
            main_key: main.into(),
            header_key: header.into(),
        };
        main.zeroize();
        header.zeroize();
        state
    }
}

enum GcmKey {
    A128(Aes128Gcm),
    A256(Aes256Gcm),
}

struct GcmState {
    key: GcmKey,
    /// fixed[4] || invocation_counter[8], counter incremented per packet.
    nonce: [u8; 12],
}

impl GcmState {
    fn bump_nonce(&mut self) {
        let mut counter = u64::from_be_bytes(self.nonce[4..12].try_into().expect("8 bytes"));
        counter = counter.wrapping_add(1);
        self.nonce[4..12].copy_from_slice(&counter.to_be_bytes());
    }
}

enum CtrKeystream {
    A128(Aes128Ctr),
    A256(Aes256Ctr),
}

impl CtrKeystream {
    fn apply(&mut self, data: &mut [u8]) {
        match self {
            CtrKeystream::A128(c) => c.apply_keystream(data),
            CtrKeystream::A256(c) => c.apply_keystream(data),
        }
    }
}

struct CtrHmacState {
    keystream: CtrKeystream,
    mac_algorithm: MacAlgorithm,
    mac_key: Vec<u8>,
}

impl Drop for CtrHmacState {
    fn drop(&mut self) {
        self.mac_key.zeroize();
    }
}

/// A directional packet cipher: one instance encrypts (outbound) or
/// decrypts (inbound) whole SSH packets.
///
/// The packet layer drives it through four capabilities:
///
/// 1. [`block_size`](PacketCipher::block_size) for outbound padding,
/// 2. [`length_bytes`](PacketCipher::length_bytes) +
///    [`packet_length`](PacketCipher::packet_length) to recover the length
///    field of an incoming packet,
/// 3. [`seal`](PacketCipher::seal) to turn a cleartext packet into wire
///    bytes,
/// 4. [`open`](PacketCipher::open) to verify and decrypt an incoming one.
pub struct PacketCipher {
    inner: CipherState,
}

enum CipherState {
    /// Identity transform, used until the first NEWKEYS.
    None,
    ChaCha20Poly1305(Box<ChaChaPolyState>),
    AesGcm(Box<GcmState>),
    AesCtrHmac(Box<CtrHmacState>),
}

impl std::fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.inner {
            CipherState::None => "none",
            CipherState::ChaCha20Poly1305(_) => "chacha20-poly1305@openssh.com",
            CipherState::AesGcm(_) => "aes-gcm@openssh.com",
            CipherState::AesCtrHmac(_) => "aes-ctr+hmac",
        };
        f.debug_struct("PacketCipher")
            .field("algorithm", &name)
            .field("keys", &"<redacted>")
            .finish()
    }
}

impl PacketCipher {
    /// Returns the identity transform used before the first NEWKEYS.
    pub fn none() -> Self {
        PacketCipher {
            inner: CipherState::None,
        }
    }

    /// Builds a directional cipher from negotiated algorithms and derived
    /// key material.
    ///
    /// `mac` must be `Some` exactly when `cipher` is not AEAD.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Kex`] if the key material is shorter than the
    /// algorithm requires or the cipher/MAC pairing is inconsistent.
    pub fn new(
        cipher: CipherAlgorithm,
        mac: Option<MacAlgorithm>,
        key: &[u8],
        iv: &[u8],
        mac_key: &[u8],
    ) -> HawserResult<Self> {
        if key.len() < cipher.key_len() || iv.len() < cipher.iv_len() {
            return Err(HawserError::Kex(format!(
                "insufficient key material for {}",
                cipher.name()
            )));
        }

        match cipher {
            CipherAlgorithm::ChaCha20Poly1305 => Ok(PacketCipher {
                inner: CipherState::ChaCha20Poly1305(Box::new(ChaChaPolyState::new(key))),
            }),
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => {
                let gcm_key = match cipher {
                    CipherAlgorithm::Aes128Gcm => GcmKey::A128(
                        Aes128Gcm::new_from_slice(&key[..16])
                            .map_err(|_| HawserError::Kex("bad AES-128-GCM key".to_string()))?,
                    ),
                    _ => GcmKey::A256(
                        Aes256Gcm::new_from_slice(&key[..32])
                            .map_err(|_| HawserError::Kex("bad AES-256-GCM key".to_string()))?,
                    ),
                };
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&iv[..12]);
                Ok(PacketCipher {
                    inner: CipherState::AesGcm(Box::new(GcmState {
                        key: gcm_key,
                        nonce,
                    })),
                })
            }
            CipherAlgorithm::Aes128Ctr | CipherAlgorithm::Aes256Ctr => {
                let mac_algorithm = mac.ok_or_else(|| {
                    HawserError::Kex(format!("{} requires a MAC algorithm", cipher.name()))
                })?;
                if mac_key.len() < mac_algorithm.key_len() {
                    return Err(HawserError::Kex(format!(
                        "insufficient MAC key material for {}",
                        mac_algorithm.name()
                    )));
                }
                let keystream = match cipher {
                    CipherAlgorithm::Aes128Ctr => CtrKeystream::A128(
                        Aes128Ctr::new_from_slices(&key[..16], &iv[..16])
                            .map_err(|_| HawserError::Kex("bad AES-128-CTR key".to_string()))?,
                    ),
                    _ => CtrKeystream::A256(
                        Aes256Ctr::new_from_slices(&key[..32], &iv[..16])
                            .map_err(|_| HawserError::Kex("bad AES-256-CTR key".to_string()))?,
                    ),
                };
                Ok(PacketCipher {
                    inner: CipherState::AesCtrHmac(Box::new(CtrHmacState {
                        keystream,
                        mac_algorithm,
                        mac_key: mac_key[..mac_algorithm.key_len()].to_vec(),
                    })),
                })
            }
        }
    }

    /// Padding alignment unit, at least 8.
    pub fn block_size(&self) -> usize {
        match self.inner {
            CipherState::None | CipherState::ChaCha20Poly1305(_) => 8,
            CipherState::AesGcm(_) | CipherState::AesCtrHmac(_) => 16,
        }
    }

    /// Minimum total packet size produced by framing.
    pub fn min_packet_len(&self) -> usize {
        16
    }

    /// Trailing tag/MAC bytes on the wire.
    pub fn mac_len(&self) -> usize {
        match &self.inner {
            CipherState::None => 0,
            CipherState::ChaCha20Poly1305(_) | CipherState::AesGcm(_) => 16,
            CipherState::AesCtrHmac(s) => s.mac_algorithm.mac_len(),
        }
    }

    /// Whether the 4-byte length field travels encrypted together with the
    /// packet body (classic CTR layout). When true the reader must fetch a
    /// whole cipher block before it can learn the packet length.
    pub fn length_is_encrypted(&self) -> bool {
        match &self.inner {
            CipherState::AesCtrHmac(s) => !s.mac_algorithm.is_etm(),
            _ => false,
        }
    }

    /// How many bytes the reader must consume before calling
    /// [`packet_length`](Self::packet_length).
    pub fn length_bytes(&self) -> usize {
        if self.length_is_encrypted() {
            self.block_size()
        } else {
            4
        }
    }

    /// Recovers the packet length from the first [`length_bytes`](Self::length_bytes)
    /// of a packet.
    ///
    /// For the classic CTR layout the whole first block is decrypted in
    /// place; for ChaCha20-Poly1305 a copy of the length is decrypted and
    /// `head` is left as ciphertext for the MAC pass.
    pub fn packet_length(&mut self, head: &mut [u8], seq: u32) -> HawserResult<u32> {
        match &mut self.inner {
            CipherState::None | CipherState::AesGcm(_) => {
                Ok(u32::from_be_bytes(head[..4].try_into().expect("4 bytes")))
            }
            CipherState::ChaCha20Poly1305(s) => {
                let mut len_bytes = [head[0], head[1], head[2], head[3]];
                let mut cipher = <SshChaCha20 as KeyIvInit>::new(
                    &s.header_key,
                    &u64::from(seq).to_be_bytes().into(),
                );
                cipher.apply_keystream(&mut len_bytes);
                Ok(u32::from_be_bytes(len_bytes))
            }
            CipherState::AesCtrHmac(s) => {
                if s.mac_algorithm.is_etm() {
                    Ok(u32::from_be_bytes(head[..4].try_into().expect("4 bytes")))
                } else {
                    s.keystream.apply(head);
                    Ok(u32::from_be_bytes(head[..4].try_into().expect("4 bytes")))
                }
            }
        }
    }

    /// Seals a cleartext packet `length || padding_length || payload || padding`
    /// into its wire representation, appending the tag/MAC.
    pub fn seal(&mut self, packet: &mut Vec<u8>, seq: u32) -> HawserResult<()> {
        match &mut self.inner {
            CipherState::None => Ok(()),
            CipherState::ChaCha20Poly1305(s) => {
                let mut main = <SshChaCha20 as KeyIvInit>::new(
                    &s.main_key,
                    &u64::from(seq).to_be_bytes().into(),
                );

                // Poly1305 key = first 32 keystream bytes of block 0.
                let mut poly_key = [0u8; poly1305::KEY_SIZE];
                main.apply_keystream(&mut poly_key);

                let mut header = <SshChaCha20 as KeyIvInit>::new(
                    &s.header_key,
                    &u64::from(seq).to_be_bytes().into(),
                );
                header.apply_keystream(&mut packet[..4]);

                // Payload encryption starts at block 1.
                main.seek(
                    <chacha20::ChaCha20LegacyCore as chacha20::cipher::BlockSizeUser>::block_size(),
                );
                main.apply_keystream(&mut packet[4..]);

                let tag = poly1305::Poly1305::new(&poly_key.into()).compute_unpadded(packet);
                poly_key.zeroize();
                packet.extend_from_slice(tag.as_slice());
                Ok(())
            }
            CipherState::AesGcm(s) => {
                let mut aad = [0u8; 4];
                aad.copy_from_slice(&packet[..4]);
                let tag = match &s.key {
                    GcmKey::A128(key) => key
                        .encrypt_in_place_detached((&s.nonce).into(), &aad, &mut packet[4..])
                        .map_err(|_| HawserError::Mac("AES-GCM seal failed".to_string()))?,
                    GcmKey::A256(key) => key
                        .encrypt_in_place_detached((&s.nonce).into(), &aad, &mut packet[4..])
                        .map_err(|_| HawserError::Mac("AES-GCM seal failed".to_string()))?,
                };
                s.bump_nonce();
                packet.extend_from_slice(tag.as_slice());
                Ok(())
            }
            CipherState::AesCtrHmac(s) => {
                if s.mac_algorithm.is_etm() {
                    s.keystream.apply(&mut packet[4..]);
                    let mac = hmac_over(s.mac_algorithm, &s.mac_key, seq, packet);
                    packet.extend_from_slice(&mac);
                } else {
                    let mac = hmac_over(s.mac_algorithm, &s.mac_key, seq, packet);
                    s.keystream.apply(&mut packet[..]);
                    packet.extend_from_slice(&mac);
                }
                Ok(())
            }
        }
    }

    /// Verifies and decrypts an incoming packet.
    ///
    /// `head` is the prefix consumed for length discovery (possibly already
    /// decrypted by [`packet_length`](Self::packet_length)); `rest` is the
    /// remainder of the wire packet including the trailing tag/MAC. Returns
    /// the cleartext `padding_length || payload || padding` body.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Mac`] on tag or MAC mismatch.
    pub fn open(&mut self, head: &[u8], rest: &[u8], seq: u32) -> HawserResult<Vec<u8>> {
        match &mut self.inner {
            CipherState::None => {
                let mut body = Vec::with_capacity(head.len() - 4 + rest.len());
                body.extend_from_slice(&head[4..]);
                body.extend_from_slice(rest);
                Ok(body)
            }
            CipherState::ChaCha20Poly1305(s) => {
                if rest.len() < 16 {
                    return Err(HawserError::Mac("packet shorter than tag".to_string()));
                }
                let (ciphertext, tag) = rest.split_at(rest.len() - 16);

                let mut main = <SshChaCha20 as KeyIvInit>::new(
                    &s.main_key,
                    &u64::from(seq).to_be_bytes().into(),
                );
                let mut poly_key = [0u8; poly1305::KEY_SIZE];
                main.apply_keystream(&mut poly_key);

                let expected = {
                    let mut authed = Vec::with_capacity(4 + ciphertext.len());
                    authed.extend_from_slice(head);
                    authed.extend_from_slice(ciphertext);
                    poly1305::Poly1305::new(&poly_key.into()).compute_unpadded(&authed)
                };
                poly_key.zeroize();

                if !bool::from(expected.ct_eq(poly1305::Tag::from_slice(tag))) {
                    return Err(HawserError::Mac("corrupted MAC on input".to_string()));
                }

                main.seek(
                    <chacha20::ChaCha20LegacyCore as chacha20::cipher::BlockSizeUser>::block_size(),
                );
                let mut body = ciphertext.to_vec();
                main.apply_keystream(&mut body);
                Ok(body)
            }
            CipherState::AesGcm(s) => {
                if rest.len() < 16 {
                    return Err(HawserError::Mac("packet shorter than tag".to_string()));
                }
                let (ciphertext, tag) = rest.split_at(rest.len() - 16);
                let mut tag_bytes = [0u8; 16];
                tag_bytes.copy_from_slice(tag);

                let mut aad = [0u8; 4];
                aad.copy_from_slice(&head[..4]);

                let mut body = ciphertext.to_vec();
                let opened = match &s.key {
                    GcmKey::A128(key) => key.decrypt_in_place_detached(
                        (&s.nonce).into(),
                        &aad,
                        &mut body,
                        (&tag_bytes).into(),
                    ),
                    GcmKey::A256(key) => key.decrypt_in_place_detached(
                        (&s.nonce).into(),
                        &aad,
                        &mut body,
                        (&tag_bytes).into(),
                    ),
                };
                opened.map_err(|_| HawserError::Mac("corrupted MAC on input".to_string()))?;
                s.bump_nonce();
                Ok(body)
            }
            CipherState::AesCtrHmac(s) => {
                let mac_len = s.mac_algorithm.mac_len();
                if rest.len() < mac_len {
                    return Err(HawserError::Mac("packet shorter than MAC".to_string()));
                }
                let (wire_body, received_mac) = rest.split_at(rest.len() - mac_len);

                if s.mac_algorithm.is_etm() {
                    // MAC over seq || length || ciphertext, then decrypt.
                    let expected = {
                        let mut authed = Vec::with_capacity(head.len() + wire_body.len());
                        authed.extend_from_slice(head);
                        authed.extend_from_slice(wire_body);
                        hmac_over(s.mac_algorithm, &s.mac_key, seq, &authed)
                    };
                    if !bool::from(expected.as_slice().ct_eq(received_mac)) {
                        return Err(HawserError::Mac("corrupted MAC on input".to_string()));
                    }
                    let mut body = wire_body.to_vec();
                    s.keystream.apply(&mut body);
                    Ok(body)
                } else {
                    // head (the first block) was decrypted during length
                    // discovery; decrypt the remainder, then MAC over the
                    // whole cleartext packet.
                    let mut body = wire_body.to_vec();
                    s.keystream.apply(&mut body);

                    let expected = {
                        let mut cleartext = Vec::with_capacity(head.len() + body.len());
                        cleartext.extend_from_slice(head);
                        cleartext.extend_from_slice(&body);
                        hmac_over(s.mac_algorithm, &s.mac_key, seq, &cleartext)
                    };
                    if !bool::from(expected.as_slice().ct_eq(received_mac)) {
                        return Err(HawserError::Mac("corrupted MAC on input".to_string()));
                    }

                    let mut full = Vec::with_capacity(head.len() - 4 + body.len());
                    full.extend_from_slice(&head[4..]);
                    full.extend_from_slice(&body);
                    Ok(full)
                }
            }
        }
    }
}

/// Stateful zlib deflate stream for outbound payloads.
///
/// SSH compression is one continuous stream across packets, flushed at each
/// packet boundary so the peer can decompress without the next packet.
pub struct Deflater {
    algorithm: CompressionAlgorithm,
    stream: Option<flate2::Compress>,
}

impl Deflater {
    /// Creates a deflater; zlib streams start inactive until
    /// [`activate`](Self::activate) (immediately for `zlib`, after
    /// authentication for `zlib@openssh.com`).
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            stream: None,
        }
    }

    /// Switches compression on. A no-op for `none` and for an already
    /// active stream.
    pub fn activate(&mut self) {
        if self.algorithm != CompressionAlgorithm::None && self.stream.is_none() {
            self.stream = Some(flate2::Compress::new(flate2::Compression::default(), true));
        }
    }

    /// Returns true once payloads are being compressed.
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Compresses one payload, flushing so the packet is self-contained.
    pub fn compress(&mut self, payload: &[u8]) -> HawserResult<Vec<u8>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(payload.to_vec());
        };

        let mut out = Vec::with_capacity(payload.len() + 64);
        let start_in = stream.total_in();
        loop {
            let consumed = (stream.total_in() - start_in) as usize;
            let status = stream
                .compress_vec(&payload[consumed..], &mut out, flate2::FlushCompress::Partial)
                .map_err(|e| HawserError::Protocol(format!("deflate failed: {}", e)))?;
            let consumed = (stream.total_in() - start_in) as usize;
            if consumed == payload.len()
                && status == flate2::Status::Ok
                && out.len() < out.capacity()
            {
                break;
            }
            out.reserve(1024);
        }
        Ok(out)
    }
}

/// Stateful zlib inflate stream for inbound payloads.
pub struct Inflater {
    algorithm: CompressionAlgorithm,
    stream: Option<flate2::Decompress>,
}

impl Inflater {
    /// Creates an inflater matching [`Deflater::new`].
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            stream: None,
        }
    }

    /// Switches decompression on.
    pub fn activate(&mut self) {
        if self.algorithm != CompressionAlgorithm::None && self.stream.is_none() {
            self.stream = Some(flate2::Decompress::new(true));
        }
    }

    /// Returns true once payloads are being decompressed.
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Decompresses one payload.
    pub fn decompress(&mut self, payload: &[u8]) -> HawserResult<Vec<u8>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(payload.to_vec());
        };

        let mut out = Vec::with_capacity(payload.len() * 4 + 64);
        let start_in = stream.total_in();
        loop {
            let consumed = (stream.total_in() - start_in) as usize;
            stream
                .decompress_vec(&payload[consumed..], &mut out, flate2::FlushDecompress::None)
                .map_err(|e| HawserError::Protocol(format!("inflate failed: {}", e)))?;
            let consumed = (stream.total_in() - start_in) as usize;
            if consumed == payload.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(4096);
        }
        Ok(out)
    }
}
