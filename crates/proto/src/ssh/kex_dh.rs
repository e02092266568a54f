//! Key agreement engines (RFC 4253 Section 8, RFC 4419, RFC 5656, RFC 8731).
//!
//! One [`KeyExchange`] drives the client side of a single key exchange:
//!
//! - `curve25519-sha256` (and the `@libssh.org` alias)
//! - `ecdh-sha2-nistp256`, `ecdh-sha2-nistp384`
//! - `diffie-hellman-group14-sha256`
//! - `diffie-hellman-group-exchange-sha256` (server-supplied group)
//! - `mlkem768x25519-sha256` (PQ hybrid, two-message HYBRID_INIT/REPLY)
//!
//! The engine produces the first message to send, consumes server replies,
//! and finishes with an [`ExchangeOutcome`]: shared secret K, exchange hash
//! H, and the server's host key and signature for the caller to verify.
//! The RFC 4253 Section 7.2 key derivation lives here as [`derive_key`].

use crate::ssh::message::kexnum;
use crate::ssh::wire::{WireReader, WireWriter};
use hawser_platform::{HawserError, HawserResult};
use kem::Decapsulate;
use ml_kem::kem::DecapsulationKey;
use ml_kem::{EncodedSizeUser, KemCore, MlKem768, MlKem768Params};
use num_bigint::{BigUint, RandBigInt};
use once_cell::sync::Lazy;
use ring::agreement::{
    agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, ECDH_P256, ECDH_P384, X25519,
};
use ring::rand::SystemRandom;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// ML-KEM-768 encapsulation key length in bytes.
pub const MLKEM768_PUBLIC_LEN: usize = 1184;

/// ML-KEM-768 ciphertext length in bytes.
pub const MLKEM768_CIPHERTEXT_LEN: usize = 1088;

/// X25519 public key length in bytes.
pub const X25519_PUBLIC_LEN: usize = 32;

/// Group-exchange modulus size bounds sent in SSH_MSG_KEX_DH_GEX_REQUEST.
const GEX_MIN_BITS: u32 = 1024;
const GEX_PREFERRED_BITS: u32 = 2048;
const GEX_MAX_BITS: u32 = 8192;

/// Diffie-Hellman Group 14 parameters (RFC 3526), a 2048-bit MODP group.
mod dh_group14 {
    use num_bigint::BigUint;
    use once_cell::sync::Lazy;

    /// DH Group 14 prime (2048-bit)
    pub static P: Lazy<BigUint> = Lazy::new(|| {
        BigUint::from_bytes_be(
            &hex::decode(
                "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
             29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
             EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
             E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
             EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
             C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
             83655D23DCA3AD961C62F356208552BB9ED529077096966D\
             670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
             E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9\
             DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
             15728E5A8AACAA68FFFFFFFFFFFFFFFF",
            )
            .expect("group14 prime is valid hex"),
        )
    });

    /// DH Group 14 generator
    pub static G: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u32));
}

static BIGUINT_ONE: Lazy<BigUint> = Lazy::new(|| BigUint::from(1u32));

/// Key exchange method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexAlgorithm {
    /// curve25519-sha256 (RFC 8731).
    Curve25519Sha256,
    /// curve25519-sha256@libssh.org, identical on the wire.
    Curve25519Sha256Libssh,
    /// ecdh-sha2-nistp256 (RFC 5656).
    EcdhNistp256,
    /// ecdh-sha2-nistp384 (RFC 5656).
    EcdhNistp384,
    /// diffie-hellman-group14-sha256 (RFC 8268).
    DhGroup14Sha256,
    /// diffie-hellman-group-exchange-sha256 (RFC 4419).
    DhGexSha256,
    /// mlkem768x25519-sha256 PQ hybrid.
    MlKem768X25519Sha256,
}

impl KexAlgorithm {
    /// Returns the negotiation name.
    pub fn name(&self) -> &'static str {
        match self {
            KexAlgorithm::Curve25519Sha256 => "curve25519-sha256",
            KexAlgorithm::Curve25519Sha256Libssh => "curve25519-sha256@libssh.org",
            KexAlgorithm::EcdhNistp256 => "ecdh-sha2-nistp256",
            KexAlgorithm::EcdhNistp384 => "ecdh-sha2-nistp384",
            KexAlgorithm::DhGroup14Sha256 => "diffie-hellman-group14-sha256",
            KexAlgorithm::DhGexSha256 => "diffie-hellman-group-exchange-sha256",
            KexAlgorithm::MlKem768X25519Sha256 => "mlkem768x25519-sha256",
        }
    }

    /// Parses a negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "curve25519-sha256" => Some(KexAlgorithm::Curve25519Sha256),
            "curve25519-sha256@libssh.org" => Some(KexAlgorithm::Curve25519Sha256Libssh),
            "ecdh-sha2-nistp256" => Some(KexAlgorithm::EcdhNistp256),
            "ecdh-sha2-nistp384" => Some(KexAlgorithm::EcdhNistp384),
            "diffie-hellman-group14-sha256" => Some(KexAlgorithm::DhGroup14Sha256),
            "diffie-hellman-group-exchange-sha256" => Some(KexAlgorithm::DhGexSha256),
            "mlkem768x25519-sha256" => Some(KexAlgorithm::MlKem768X25519Sha256),
            _ => None,
        }
    }

    /// Hash function paired with this method.
    pub fn hash(&self) -> KexHash {
        match self {
            KexAlgorithm::EcdhNistp384 => KexHash::Sha384,
            _ => KexHash::Sha256,
        }
    }
}

/// Hash function used for the exchange hash and key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexHash {
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl KexHash {
    /// Digest output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            KexHash::Sha256 => 32,
            KexHash::Sha384 => 48,
            KexHash::Sha512 => 64,
        }
    }

    /// Starts an incremental hasher.
    pub fn hasher(&self) -> KexHasher {
        match self {
            KexHash::Sha256 => KexHasher::Sha256(Sha256::new()),
            KexHash::Sha384 => KexHasher::Sha384(Sha384::new()),
            KexHash::Sha512 => KexHasher::Sha512(Sha512::new()),
        }
    }

    /// One-shot digest.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental hasher over the negotiated KEX hash.
pub enum KexHasher {
    /// SHA-256 state
    Sha256(Sha256),
    /// SHA-384 state
    Sha384(Sha384),
    /// SHA-512 state
    Sha512(Sha512),
}

impl KexHasher {
    /// Feeds bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            KexHasher::Sha256(h) => h.update(data),
            KexHasher::Sha384(h) => h.update(data),
            KexHasher::Sha512(h) => h.update(data),
        }
    }

    /// Finishes and returns the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            KexHasher::Sha256(h) => h.finalize().to_vec(),
            KexHasher::Sha384(h) => h.finalize().to_vec(),
            KexHasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Result of a completed key exchange.
///
/// The caller still has to verify `signature_blob` over `exchange_hash`
/// with the negotiated host key algorithm before trusting the keys.
pub struct ExchangeOutcome {
    /// Shared secret K as an unsigned magnitude (encoded as mpint wherever
    /// it is hashed).
    pub shared_secret: Vec<u8>,
    /// Exchange hash H.
    pub exchange_hash: Vec<u8>,
    /// Server host key blob K_S.
    pub host_key_blob: Vec<u8>,
    /// Server signature over H.
    pub signature_blob: Vec<u8>,
    /// Hash the exchange ran under, needed for key derivation.
    pub hash: KexHash,
}

impl std::fmt::Debug for ExchangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeOutcome")
            .field("shared_secret", &"<redacted>")
            .field("exchange_hash_len", &self.exchange_hash.len())
            .field("host_key_blob_len", &self.host_key_blob.len())
            .finish()
    }
}

/// Progress after feeding a server message to [`KeyExchange::handle`].
#[derive(Debug)]
pub enum KexProgress {
    /// Another client message must be sent (group exchange).
    Reply(Vec<u8>),
    /// Exchange complete.
    Finished(Box<ExchangeOutcome>),
}

/// Identification and KEXINIT context hashed into H.
struct HashContext {
    client_version: String,
    server_version: String,
    client_kexinit: Vec<u8>,
    server_kexinit: Vec<u8>,
}

enum State {
    /// X25519 / P-256 / P-384: INIT sent, awaiting REPLY.
    EcdhAwaitReply {
        private: Option<EphemeralPrivateKey>,
        public: Vec<u8>,
    },
    /// group14: INIT sent, awaiting REPLY.
    DhAwaitReply { x: BigUint, e: BigUint },
    /// GEX: REQUEST sent, awaiting GROUP.
    GexAwaitGroup,
    /// GEX: INIT sent, awaiting REPLY.
    GexAwaitReply {
        p: BigUint,
        g: BigUint,
        x: BigUint,
        e: BigUint,
    },
    /// Hybrid: INIT sent, awaiting REPLY.
    HybridAwaitReply {
        kem: Option<DecapsulationKey<MlKem768Params>>,
        curve: Option<EphemeralPrivateKey>,
        client_init: Vec<u8>,
    },
    Done,
}

/// Client side of one key exchange run.
pub struct KeyExchange {
    algorithm: KexAlgorithm,
    hash: KexHash,
    context: HashContext,
    state: State,
}

impl KeyExchange {
    /// Creates the engine and generates the ephemeral key material.
    ///
    /// `client_version`/`server_version` are the identification lines
    /// without CR LF; the KEXINIT payloads are the raw message bodies.
    pub fn new(
        algorithm: KexAlgorithm,
        client_version: &str,
        server_version: &str,
        client_kexinit: Vec<u8>,
        server_kexinit: Vec<u8>,
    ) -> HawserResult<Self> {
        let context = HashContext {
            client_version: client_version.trim_end_matches("\r\n").to_string(),
            server_version: server_version.trim_end_matches("\r\n").to_string(),
            client_kexinit,
            server_kexinit,
        };

        let state = match algorithm {
            KexAlgorithm::Curve25519Sha256
            | KexAlgorithm::Curve25519Sha256Libssh
            | KexAlgorithm::EcdhNistp256
            | KexAlgorithm::EcdhNistp384 => {
                let agreement = match algorithm {
                    KexAlgorithm::EcdhNistp256 => &ECDH_P256,
                    KexAlgorithm::EcdhNistp384 => &ECDH_P384,
                    _ => &X25519,
                };
                let rng = SystemRandom::new();
                let private = EphemeralPrivateKey::generate(agreement, &rng).map_err(|_| {
                    HawserError::Kex("failed to generate ephemeral key".to_string())
                })?;
                let public = private
                    .compute_public_key()
                    .map_err(|_| HawserError::Kex("failed to compute public key".to_string()))?
                    .as_ref()
                    .to_vec();
                State::EcdhAwaitReply {
                    private: Some(private),
                    public,
                }
            }
            KexAlgorithm::DhGroup14Sha256 => {
                let mut rng = rand::thread_rng();
                let p_minus_one = &*dh_group14::P - 1u32;
                let x = rng.gen_biguint_range(&BigUint::from(2u32), &p_minus_one);
                let e = dh_group14::G.modpow(&x, &dh_group14::P);
                State::DhAwaitReply { x, e }
            }
            KexAlgorithm::DhGexSha256 => State::GexAwaitGroup,
            KexAlgorithm::MlKem768X25519Sha256 => {
                let mut rng = rand::thread_rng();
                let (kem_dk, kem_ek) = MlKem768::generate(&mut rng);

                let ring_rng = SystemRandom::new();
                let curve = EphemeralPrivateKey::generate(&X25519, &ring_rng).map_err(|_| {
                    HawserError::Kex("failed to generate ephemeral key".to_string())
                })?;
                let curve_public = curve
                    .compute_public_key()
                    .map_err(|_| HawserError::Kex("failed to compute public key".to_string()))?;

                let mut client_init = Vec::with_capacity(MLKEM768_PUBLIC_LEN + X25519_PUBLIC_LEN);
                client_init.extend_from_slice(kem_ek.as_bytes().as_slice());
                client_init.extend_from_slice(curve_public.as_ref());

                State::HybridAwaitReply {
                    kem: Some(kem_dk),
                    curve: Some(curve),
                    client_init,
                }
            }
        };

        Ok(Self {
            algorithm,
            hash: algorithm.hash(),
            context,
            state,
        })
    }

    /// Returns the algorithm this engine runs.
    pub fn algorithm(&self) -> KexAlgorithm {
        self.algorithm
    }

    /// Builds the first client message of the exchange.
    pub fn initial_message(&self) -> HawserResult<Vec<u8>> {
        match &self.state {
            State::EcdhAwaitReply { public, .. } => {
                let mut w = WireWriter::with_capacity(public.len() + 16);
                w.put_byte(kexnum::INIT);
                w.put_string(public);
                Ok(w.into_bytes())
            }
            State::DhAwaitReply { e, .. } => {
                let mut w = WireWriter::with_capacity(300);
                w.put_byte(kexnum::INIT);
                w.put_mpint(&e.to_bytes_be());
                Ok(w.into_bytes())
            }
            State::GexAwaitGroup => {
                let mut w = WireWriter::with_capacity(16);
                w.put_byte(kexnum::GEX_REQUEST);
                w.put_u32(GEX_MIN_BITS);
                w.put_u32(GEX_PREFERRED_BITS);
                w.put_u32(GEX_MAX_BITS);
                Ok(w.into_bytes())
            }
            State::HybridAwaitReply { client_init, .. } => {
                let mut w = WireWriter::with_capacity(client_init.len() + 16);
                w.put_byte(kexnum::INIT);
                w.put_string(client_init);
                Ok(w.into_bytes())
            }
            State::GexAwaitReply { .. } | State::Done => Err(HawserError::InvalidState(
                "key exchange already started".to_string(),
            )),
        }
    }

    /// Consumes one server KEX message.
    ///
    /// # Errors
    ///
    /// - [`HawserError::Protocol`] for an unexpected message number
    /// - [`HawserError::Kex`] for invalid parameters or failed agreement
    /// - [`HawserError::InvalidState`] if called after completion
    pub fn handle(&mut self, payload: &[u8]) -> HawserResult<KexProgress> {
        let state = std::mem::replace(&mut self.state, State::Done);
        match state {
            State::EcdhAwaitReply { private, public } => {
                let (host_key_blob, server_public, signature_blob) =
                    parse_kex_reply(payload, kexnum::REPLY)?;

                let private = private
                    .ok_or_else(|| HawserError::InvalidState("ephemeral key spent".to_string()))?;
                let peer = UnparsedPublicKey::new(private.algorithm(), server_public.clone());
                let shared_secret = agree_ephemeral(private, &peer, |k| k.to_vec())
                    .map_err(|_| HawserError::Kex("ECDH agreement failed".to_string()))?;

                let exchange_hash = exchange_hash_strings(
                    self.hash,
                    &self.context,
                    &host_key_blob,
                    &public,
                    &server_public,
                    &shared_secret,
                );

                Ok(KexProgress::Finished(Box::new(ExchangeOutcome {
                    shared_secret,
                    exchange_hash,
                    host_key_blob,
                    signature_blob,
                    hash: self.hash,
                })))
            }
            State::DhAwaitReply { x, e } => {
                let mut r = WireReader::new(payload);
                r.expect_message(kexnum::REPLY, "SSH_MSG_KEXDH_REPLY")?;
                let host_key_blob = r.read_string()?;
                let f = BigUint::from_bytes_be(&r.read_mpint()?);
                let signature_blob = r.read_string()?;

                validate_dh_public(&f, &dh_group14::P)?;
                let k = f.modpow(&x, &dh_group14::P);

                let exchange_hash = exchange_hash_mpints(
                    self.hash,
                    &self.context,
                    &host_key_blob,
                    None,
                    &e,
                    &f,
                    &k.to_bytes_be(),
                );

                Ok(KexProgress::Finished(Box::new(ExchangeOutcome {
                    shared_secret: k.to_bytes_be(),
                    exchange_hash,
                    host_key_blob,
                    signature_blob,
                    hash: self.hash,
                })))
            }
            State::GexAwaitGroup => {
                let mut r = WireReader::new(payload);
                r.expect_message(kexnum::GEX_GROUP, "SSH_MSG_KEX_DH_GEX_GROUP")?;
                let p = BigUint::from_bytes_be(&r.read_mpint()?);
                let g = BigUint::from_bytes_be(&r.read_mpint()?);

                let bits = p.bits() as u32;
                if !(GEX_MIN_BITS..=GEX_MAX_BITS).contains(&bits) {
                    return Err(HawserError::Kex(format!(
                        "group-exchange modulus of {} bits outside [{}, {}]",
                        bits, GEX_MIN_BITS, GEX_MAX_BITS
                    )));
                }
                if g < BigUint::from(2u32) || g >= p {
                    return Err(HawserError::Kex(
                        "group-exchange generator out of range".to_string(),
                    ));
                }

                let mut rng = rand::thread_rng();
                let p_minus_one = &p - 1u32;
                let x = rng.gen_biguint_range(&BigUint::from(2u32), &p_minus_one);
                let e = g.modpow(&x, &p);

                let mut w = WireWriter::with_capacity(p.bits() as usize / 8 + 16);
                w.put_byte(kexnum::GEX_INIT);
                w.put_mpint(&e.to_bytes_be());
                let reply = w.into_bytes();

                self.state = State::GexAwaitReply { p, g, x, e };
                Ok(KexProgress::Reply(reply))
            }
            State::GexAwaitReply { p, g, x, e } => {
                let mut r = WireReader::new(payload);
                r.expect_message(kexnum::GEX_REPLY, "SSH_MSG_KEX_DH_GEX_REPLY")?;
                let host_key_blob = r.read_string()?;
                let f = BigUint::from_bytes_be(&r.read_mpint()?);
                let signature_blob = r.read_string()?;

                validate_dh_public(&f, &p)?;
                let k = f.modpow(&x, &p);

                let exchange_hash = exchange_hash_mpints(
                    self.hash,
                    &self.context,
                    &host_key_blob,
                    Some((&p, &g)),
                    &e,
                    &f,
                    &k.to_bytes_be(),
                );

                Ok(KexProgress::Finished(Box::new(ExchangeOutcome {
                    shared_secret: k.to_bytes_be(),
                    exchange_hash,
                    host_key_blob,
                    signature_blob,
                    hash: self.hash,
                })))
            }
            State::HybridAwaitReply {
                kem,
                curve,
                client_init,
            } => {
                let (host_key_blob, server_reply, signature_blob) =
                    parse_kex_reply(payload, kexnum::REPLY)?;

                if server_reply.len() != MLKEM768_CIPHERTEXT_LEN + X25519_PUBLIC_LEN {
                    return Err(HawserError::Kex(format!(
                        "hybrid reply must be {} bytes, got {}",
                        MLKEM768_CIPHERTEXT_LEN + X25519_PUBLIC_LEN,
                        server_reply.len()
                    )));
                }
                let (ct_bytes, server_curve) = server_reply.split_at(MLKEM768_CIPHERTEXT_LEN);

                let kem = kem
                    .ok_or_else(|| HawserError::InvalidState("KEM key spent".to_string()))?;
                let ct: [u8; MLKEM768_CIPHERTEXT_LEN] = ct_bytes
                    .try_into()
                    .expect("length checked above");
                let pq_secret = kem
                    .decapsulate(&ct.into())
                    .map_err(|_| HawserError::Kex("ML-KEM decapsulation failed".to_string()))?;

                let curve = curve
                    .ok_or_else(|| HawserError::InvalidState("ephemeral key spent".to_string()))?;
                let peer = UnparsedPublicKey::new(&X25519, server_curve.to_vec());
                let ec_secret = agree_ephemeral(curve, &peer, |k| k.to_vec())
                    .map_err(|_| HawserError::Kex("X25519 agreement failed".to_string()))?;

                // K for the hybrid exchange is HASH(K_PQ || K_EC).
                let mut combined = Vec::with_capacity(pq_secret.len() + ec_secret.len());
                combined.extend_from_slice(pq_secret.as_slice());
                combined.extend_from_slice(&ec_secret);
                let shared_secret = self.hash.digest(&combined);

                let exchange_hash = exchange_hash_strings(
                    self.hash,
                    &self.context,
                    &host_key_blob,
                    &client_init,
                    &server_reply,
                    &shared_secret,
                );

                Ok(KexProgress::Finished(Box::new(ExchangeOutcome {
                    shared_secret,
                    exchange_hash,
                    host_key_blob,
                    signature_blob,
                    hash: self.hash,
                })))
            }
            State::Done => Err(HawserError::InvalidState(
                "key exchange already completed".to_string(),
            )),
        }
    }
}

/// Parses `byte n, string K_S, string Q_S, string signature`.
fn parse_kex_reply(payload: &[u8], number: u8) -> HawserResult<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let mut r = WireReader::new(payload);
    r.expect_message(number, "SSH_MSG_KEX_ECDH_REPLY")?;
    let host_key_blob = r.read_string()?;
    let server_public = r.read_string()?;
    let signature_blob = r.read_string()?;
    Ok((host_key_blob, server_public, signature_blob))
}

/// Rejects trivial DH public values: 1 < f < p-1 (RFC 4253 Section 8).
fn validate_dh_public(f: &BigUint, p: &BigUint) -> HawserResult<()> {
    let p_minus_one = p - 1u32;
    if *f <= *BIGUINT_ONE || *f >= p_minus_one {
        return Err(HawserError::Kex(
            "peer DH public value out of range".to_string(),
        ));
    }
    Ok(())
}

/// Common prefix of every exchange hash:
/// `string V_C, string V_S, string I_C, string I_S, string K_S`.
fn hash_common_prefix(w: &mut WireWriter, context: &HashContext, host_key_blob: &[u8]) {
    w.put_string(context.client_version.as_bytes());
    w.put_string(context.server_version.as_bytes());
    w.put_string(&context.client_kexinit);
    w.put_string(&context.server_kexinit);
    w.put_string(host_key_blob);
}

/// H for the string-keyed families (ECDH, curve25519, hybrid):
/// `... string Q_C, string Q_S, mpint K`.
fn exchange_hash_strings(
    hash: KexHash,
    context: &HashContext,
    host_key_blob: &[u8],
    q_c: &[u8],
    q_s: &[u8],
    k: &[u8],
) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(1024);
    hash_common_prefix(&mut w, context, host_key_blob);
    w.put_string(q_c);
    w.put_string(q_s);
    w.put_mpint(k);
    hash.digest(&w.into_bytes())
}

/// H for the mpint-keyed families (classic DH and group exchange):
/// `... [uint32 min, n, max, mpint p, mpint g,] mpint e, mpint f, mpint K`.
fn exchange_hash_mpints(
    hash: KexHash,
    context: &HashContext,
    host_key_blob: &[u8],
    gex_group: Option<(&BigUint, &BigUint)>,
    e: &BigUint,
    f: &BigUint,
    k: &[u8],
) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(2048);
    hash_common_prefix(&mut w, context, host_key_blob);
    if let Some((p, g)) = gex_group {
        w.put_u32(GEX_MIN_BITS);
        w.put_u32(GEX_PREFERRED_BITS);
        w.put_u32(GEX_MAX_BITS);
        w.put_mpint(&p.to_bytes_be());
        w.put_mpint(&g.to_bytes_be());
    }
    w.put_mpint(&e.to_bytes_be());
    w.put_mpint(&f.to_bytes_be());
    w.put_mpint(k);
    hash.digest(&w.into_bytes())
}

/// Derives one key from (K, H, session_id) per RFC 4253 Section 7.2.
///
/// ```text
/// K1 = HASH(K || H || X || session_id)    (X = "A".."F")
/// K2 = HASH(K || H || K1)
/// key = K1 || K2 || ...   truncated to key_len
/// ```
///
/// `shared_secret` is the unsigned magnitude of K; it is encoded as an
/// mpint before hashing.
pub fn derive_key(
    hash: KexHash,
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    key_type: u8,
    key_len: usize,
) -> Vec<u8> {
    let k_mpint = {
        let mut w = WireWriter::with_capacity(shared_secret.len() + 5);
        w.put_mpint(shared_secret);
        w.into_bytes()
    };

    let mut key = Vec::with_capacity(key_len + hash.output_len());

    let mut hasher = hash.hasher();
    hasher.update(&k_mpint);
    hasher.update(exchange_hash);
    hasher.update(&[key_type]);
    hasher.update(session_id);
    key.extend_from_slice(&hasher.finalize());

    while key.len() < key_len {
        let mut hasher = hash.hasher();
        hasher.update(&k_mpint);
        hasher.update(exchange_hash);
        hasher.update(&key);
        let block = hasher.finalize();
        key.extend_from_slice(&block);
    }

    key.truncate(key_len);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use kem::Encapsulate;
    use ml_kem::kem::EncapsulationKey;

    fn context() -> (&'static str, &'static str, Vec<u8>, Vec<u8>) {
        (
            "SSH-2.0-hawser_0.1.0",
            "SSH-2.0-TestServer_1.0",
            b"client kexinit payload".to_vec(),
            b"server kexinit payload".to_vec(),
        )
    }

    fn new_exchange(algorithm: KexAlgorithm) -> KeyExchange {
        let (v_c, v_s, i_c, i_s) = context();
        KeyExchange::new(algorithm, v_c, v_s, i_c, i_s).unwrap()
    }

    fn kex_reply(host_key: &[u8], public: &[u8], sig: &[u8]) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_byte(kexnum::REPLY);
        w.put_string(host_key);
        w.put_string(public);
        w.put_string(sig);
        w.into_bytes()
    }

    #[test]
    fn test_names_round_trip() {
        for alg in [
            KexAlgorithm::Curve25519Sha256,
            KexAlgorithm::Curve25519Sha256Libssh,
            KexAlgorithm::EcdhNistp256,
            KexAlgorithm::EcdhNistp384,
            KexAlgorithm::DhGroup14Sha256,
            KexAlgorithm::DhGexSha256,
            KexAlgorithm::MlKem768X25519Sha256,
        ] {
            assert_eq!(KexAlgorithm::from_name(alg.name()), Some(alg));
        }
        assert!(KexAlgorithm::from_name("diffie-hellman-group1-sha1").is_none());
    }

    #[test]
    fn test_nistp384_pairs_with_sha384() {
        assert_eq!(KexAlgorithm::EcdhNistp384.hash(), KexHash::Sha384);
        assert_eq!(KexAlgorithm::Curve25519Sha256.hash(), KexHash::Sha256);
    }

    #[test]
    fn test_curve25519_exchange_agrees_with_server() {
        let mut client = new_exchange(KexAlgorithm::Curve25519Sha256);
        let init = client.initial_message().unwrap();

        let mut r = WireReader::new(&init);
        assert_eq!(r.read_byte().unwrap(), kexnum::INIT);
        let client_public = r.read_string().unwrap();
        assert_eq!(client_public.len(), 32);

        // Server half via ring directly.
        let rng = SystemRandom::new();
        let server_private = EphemeralPrivateKey::generate(&X25519, &rng).unwrap();
        let server_public = server_private.compute_public_key().unwrap();
        let server_secret = agree_ephemeral(
            server_private,
            &UnparsedPublicKey::new(&X25519, client_public),
            |k| k.to_vec(),
        )
        .unwrap();

        let reply = kex_reply(b"host-key-blob", server_public.as_ref(), b"signature");
        let progress = client.handle(&reply).unwrap();
        let outcome = match progress {
            KexProgress::Finished(outcome) => outcome,
            KexProgress::Reply(_) => panic!("curve25519 finishes in one round trip"),
        };

        assert_eq!(outcome.shared_secret, server_secret);
        assert_eq!(outcome.exchange_hash.len(), 32);
        assert_eq!(outcome.host_key_blob, b"host-key-blob");
        assert_eq!(outcome.signature_blob, b"signature");
    }

    #[test]
    fn test_group14_exchange_agrees_with_server() {
        let mut client = new_exchange(KexAlgorithm::DhGroup14Sha256);
        let init = client.initial_message().unwrap();

        let mut r = WireReader::new(&init);
        assert_eq!(r.read_byte().unwrap(), kexnum::INIT);
        let e = BigUint::from_bytes_be(&r.read_mpint().unwrap());

        let mut rng = rand::thread_rng();
        let y = rng.gen_biguint_range(&BigUint::from(2u32), &(&*dh_group14::P - 1u32));
        let f = dh_group14::G.modpow(&y, &dh_group14::P);
        let server_k = e.modpow(&y, &dh_group14::P);

        let mut w = WireWriter::new();
        w.put_byte(kexnum::REPLY);
        w.put_string(b"host-key-blob");
        w.put_mpint(&f.to_bytes_be());
        w.put_string(b"signature");

        let outcome = match client.handle(&w.into_bytes()).unwrap() {
            KexProgress::Finished(outcome) => outcome,
            KexProgress::Reply(_) => panic!("group14 finishes in one round trip"),
        };
        assert_eq!(outcome.shared_secret, server_k.to_bytes_be());
    }

    #[test]
    fn test_dh_rejects_trivial_public_values() {
        let mut client = new_exchange(KexAlgorithm::DhGroup14Sha256);
        client.initial_message().unwrap();

        let mut w = WireWriter::new();
        w.put_byte(kexnum::REPLY);
        w.put_string(b"host-key-blob");
        w.put_mpint(&[1]);
        w.put_string(b"signature");

        let err = client.handle(&w.into_bytes()).unwrap_err();
        assert!(matches!(err, HawserError::Kex(_)));
    }

    #[test]
    fn test_gex_two_round_flow() {
        let mut client = new_exchange(KexAlgorithm::DhGexSha256);
        let request = client.initial_message().unwrap();

        let mut r = WireReader::new(&request);
        assert_eq!(r.read_byte().unwrap(), kexnum::GEX_REQUEST);
        assert_eq!(r.read_u32().unwrap(), GEX_MIN_BITS);
        assert_eq!(r.read_u32().unwrap(), GEX_PREFERRED_BITS);
        assert_eq!(r.read_u32().unwrap(), GEX_MAX_BITS);

        // Serve group14 as the chosen group.
        let mut w = WireWriter::new();
        w.put_byte(kexnum::GEX_GROUP);
        w.put_mpint(&dh_group14::P.to_bytes_be());
        w.put_mpint(&dh_group14::G.to_bytes_be());

        let gex_init = match client.handle(&w.into_bytes()).unwrap() {
            KexProgress::Reply(msg) => msg,
            KexProgress::Finished(_) => panic!("GEX needs a second round trip"),
        };

        let mut r = WireReader::new(&gex_init);
        assert_eq!(r.read_byte().unwrap(), kexnum::GEX_INIT);
        let e = BigUint::from_bytes_be(&r.read_mpint().unwrap());

        let mut rng = rand::thread_rng();
        let y = rng.gen_biguint_range(&BigUint::from(2u32), &(&*dh_group14::P - 1u32));
        let f = dh_group14::G.modpow(&y, &dh_group14::P);
        let server_k = e.modpow(&y, &dh_group14::P);

        let mut w = WireWriter::new();
        w.put_byte(kexnum::GEX_REPLY);
        w.put_string(b"host-key-blob");
        w.put_mpint(&f.to_bytes_be());
        w.put_string(b"signature");

        let outcome = match client.handle(&w.into_bytes()).unwrap() {
            KexProgress::Finished(outcome) => outcome,
            KexProgress::Reply(_) => panic!("GEX_REPLY completes the exchange"),
        };
        assert_eq!(outcome.shared_secret, server_k.to_bytes_be());
    }

    #[test]
    fn test_gex_rejects_undersized_modulus() {
        let mut client = new_exchange(KexAlgorithm::DhGexSha256);
        client.initial_message().unwrap();

        let mut w = WireWriter::new();
        w.put_byte(kexnum::GEX_GROUP);
        w.put_mpint(&[0x07, 0xFF]); // tiny modulus
        w.put_mpint(&[2]);

        assert!(client.handle(&w.into_bytes()).is_err());
    }

    #[test]
    fn test_hybrid_exchange_agrees_with_server() {
        let mut client = new_exchange(KexAlgorithm::MlKem768X25519Sha256);
        let init = client.initial_message().unwrap();

        let mut r = WireReader::new(&init);
        assert_eq!(r.read_byte().unwrap(), kexnum::INIT);
        let client_init = r.read_string().unwrap();
        assert_eq!(client_init.len(), MLKEM768_PUBLIC_LEN + X25519_PUBLIC_LEN);

        let (ek_bytes, client_curve) = client_init.split_at(MLKEM768_PUBLIC_LEN);
        let ek_arr: [u8; MLKEM768_PUBLIC_LEN] = ek_bytes.try_into().unwrap();
        let ek = EncapsulationKey::<MlKem768Params>::from_bytes(&ek_arr.into());

        let mut rng = rand::thread_rng();
        let (ct, pq_secret) = ek.encapsulate(&mut rng).unwrap();

        let ring_rng = SystemRandom::new();
        let server_curve = EphemeralPrivateKey::generate(&X25519, &ring_rng).unwrap();
        let server_curve_public = server_curve.compute_public_key().unwrap();
        let ec_secret = agree_ephemeral(
            server_curve,
            &UnparsedPublicKey::new(&X25519, client_curve.to_vec()),
            |k| k.to_vec(),
        )
        .unwrap();

        let mut server_reply = Vec::new();
        server_reply.extend_from_slice(ct.as_slice());
        server_reply.extend_from_slice(server_curve_public.as_ref());

        let reply = kex_reply(b"host-key-blob", &server_reply, b"signature");
        let outcome = match client.handle(&reply).unwrap() {
            KexProgress::Finished(outcome) => outcome,
            KexProgress::Reply(_) => panic!("hybrid finishes in one round trip"),
        };

        let mut combined = Vec::new();
        combined.extend_from_slice(pq_secret.as_slice());
        combined.extend_from_slice(&ec_secret);
        assert_eq!(outcome.shared_secret, KexHash::Sha256.digest(&combined));
    }

    #[test]
    fn test_handle_after_completion_is_invalid_state() {
        let mut client = new_exchange(KexAlgorithm::Curve25519Sha256);
        let init = client.initial_message().unwrap();

        let mut r = WireReader::new(&init);
        r.read_byte().unwrap();
        let client_public = r.read_string().unwrap();

        let rng = SystemRandom::new();
        let server_private = EphemeralPrivateKey::generate(&X25519, &rng).unwrap();
        let server_public = server_private.compute_public_key().unwrap();
        drop(agree_ephemeral(
            server_private,
            &UnparsedPublicKey::new(&X25519, client_public),
            |k| k.to_vec(),
        ));

        let reply = kex_reply(b"host-key-blob", server_public.as_ref(), b"signature");
        client.handle(&reply).unwrap();

        let err = client.handle(&reply).unwrap_err();
        assert!(matches!(err, HawserError::InvalidState(_)));
    }

    #[test]
    fn test_derive_key_lengths_and_separation() {
        let k = vec![0x42; 32];
        let h = vec![0x01; 32];
        let sid = vec![0x02; 32];

        let key_a = derive_key(KexHash::Sha256, &k, &h, &sid, b'A', 32);
        let key_c = derive_key(KexHash::Sha256, &k, &h, &sid, b'C', 32);
        assert_eq!(key_a.len(), 32);
        assert_ne!(key_a, key_c);

        // Expansion past one digest block.
        let long = derive_key(KexHash::Sha256, &k, &h, &sid, b'C', 96);
        assert_eq!(long.len(), 96);
        assert_eq!(&long[..32], &key_c[..]);

        // Different session_id changes everything.
        let other_sid = derive_key(KexHash::Sha256, &k, &h, &[0x03; 32], b'C', 32);
        assert_ne!(other_sid, key_c);
    }

    #[test]
    fn test_exchange_hash_is_deterministic() {
        let (v_c, v_s, i_c, i_s) = context();
        let ctx = HashContext {
            client_version: v_c.to_string(),
            server_version: v_s.to_string(),
            client_kexinit: i_c,
            server_kexinit: i_s,
        };
        let h1 = exchange_hash_strings(KexHash::Sha256, &ctx, b"ks", b"qc", b"qs", b"k");
        let h2 = exchange_hash_strings(KexHash::Sha256, &ctx, b"ks", b"qc", b"qs", b"k");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);

        let h3 = exchange_hash_strings(KexHash::Sha256, &ctx, b"ks", b"qc", b"qs", b"other");
        assert_ne!(h1, h3);
    }
}
