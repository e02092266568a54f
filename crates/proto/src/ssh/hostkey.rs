//! Server host key verification.
//!
//! During key exchange the server proves possession of its host key by
//! signing the exchange hash. This module parses the advertised key blob,
//! verifies the signature with `ring`, and computes the SHA-256 fingerprint
//! handed to the host-key acceptance callback.
//!
//! Supported algorithms: `ssh-ed25519`, `rsa-sha2-256`, `rsa-sha2-512`,
//! legacy `ssh-rsa` (SHA-1 signatures over the same key type), and
//! `ecdsa-sha2-nistp256`/`ecdsa-sha2-nistp384` (RFC 8709, RFC 8332,
//! RFC 5656).

use crate::ssh::wire::WireReader;
use base64::Engine;
use hawser_platform::{HawserError, HawserResult};
use ring::signature::{
    RsaPublicKeyComponents, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED,
    ED25519, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY, RSA_PKCS1_2048_8192_SHA256,
    RSA_PKCS1_2048_8192_SHA512,
};
use sha2::{Digest, Sha256};

/// Host key algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyAlgorithm {
    /// Ed25519 (RFC 8709).
    SshEd25519,
    /// RSA with SHA-256 signatures (RFC 8332).
    RsaSha2_256,
    /// RSA with SHA-512 signatures (RFC 8332).
    RsaSha2_512,
    /// Legacy RSA with SHA-1 signatures.
    SshRsa,
    /// ECDSA over P-256 (RFC 5656).
    EcdsaP256,
    /// ECDSA over P-384 (RFC 5656).
    EcdsaP384,
}

impl HostKeyAlgorithm {
    /// Returns the negotiation name.
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::SshEd25519 => "ssh-ed25519",
            HostKeyAlgorithm::RsaSha2_256 => "rsa-sha2-256",
            HostKeyAlgorithm::RsaSha2_512 => "rsa-sha2-512",
            HostKeyAlgorithm::SshRsa => "ssh-rsa",
            HostKeyAlgorithm::EcdsaP256 => "ecdsa-sha2-nistp256",
            HostKeyAlgorithm::EcdsaP384 => "ecdsa-sha2-nistp384",
        }
    }

    /// Parses a negotiation name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ssh-ed25519" => Some(HostKeyAlgorithm::SshEd25519),
            "rsa-sha2-256" => Some(HostKeyAlgorithm::RsaSha2_256),
            "rsa-sha2-512" => Some(HostKeyAlgorithm::RsaSha2_512),
            "ssh-rsa" => Some(HostKeyAlgorithm::SshRsa),
            "ecdsa-sha2-nistp256" => Some(HostKeyAlgorithm::EcdsaP256),
            "ecdsa-sha2-nistp384" => Some(HostKeyAlgorithm::EcdsaP384),
            _ => None,
        }
    }

    /// The key-blob type name, which differs from the signature name for
    /// the RSA SHA-2 algorithms (the key stays "ssh-rsa").
    pub fn key_type(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::RsaSha2_256 | HostKeyAlgorithm::RsaSha2_512 => "ssh-rsa",
            other => other.name(),
        }
    }
}

/// Host key details handed to the acceptance callback.
#[derive(Debug)]
pub struct HostKeyInfo<'a> {
    /// Negotiated host key algorithm name.
    pub algorithm: &'a str,
    /// Raw SSH-encoded public key blob.
    pub key_blob: &'a [u8],
    /// SHA-256 fingerprint in the OpenSSH presentation.
    pub fingerprint: String,
}

/// Computes the OpenSSH-style SHA-256 fingerprint of a key blob.
pub fn fingerprint_sha256(key_blob: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_blob);
    let digest = hasher.finalize();
    // OpenSSH prints unpadded base64.
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest);
    format!("SHA256:{}", encoded)
}

fn bad_key(msg: &str) -> HawserError {
    HawserError::Kex(format!("invalid host key: {}", msg))
}

fn bad_signature() -> HawserError {
    HawserError::Kex("server host key signature did not verify".to_string())
}

/// Left-pads or trims an ECDSA scalar to the curve's fixed width.
fn fixed_scalar(mpint: &[u8], width: usize) -> HawserResult<Vec<u8>> {
    if mpint.len() > width {
        return Err(bad_key("ECDSA scalar wider than curve"));
    }
    let mut out = vec![0u8; width - mpint.len()];
    out.extend_from_slice(mpint);
    Ok(out)
}

/// Verifies the server's signature over the exchange hash.
///
/// `key_blob` is the K_S field from the KEX reply; `signature_blob` is the
/// signature field (`string format-name, string data`). The signature
/// format must match the negotiated algorithm, preventing downgrade from
/// `rsa-sha2-*` to `ssh-rsa`.
///
/// # Errors
///
/// Returns [`HawserError::Kex`] on malformed blobs, an algorithm mismatch,
/// or a signature that does not verify.
pub fn verify_signature(
    algorithm: HostKeyAlgorithm,
    key_blob: &[u8],
    message: &[u8],
    signature_blob: &[u8],
) -> HawserResult<()> {
    let mut sig_reader = WireReader::new(signature_blob);
    let sig_format = sig_reader.read_string_utf8()?;
    let sig_bytes = sig_reader.read_string()?;

    if sig_format != algorithm.name() {
        return Err(HawserError::Kex(format!(
            "signature format '{}' does not match negotiated '{}'",
            sig_format,
            algorithm.name()
        )));
    }

    let mut key_reader = WireReader::new(key_blob);
    let key_type = key_reader.read_string_utf8()?;
    if key_type != algorithm.key_type() {
        return Err(HawserError::Kex(format!(
            "host key type '{}' does not match negotiated '{}'",
            key_type,
            algorithm.key_type()
        )));
    }

    match algorithm {
        HostKeyAlgorithm::SshEd25519 => {
            let public_key = key_reader.read_string()?;
            if public_key.len() != 32 {
                return Err(bad_key("Ed25519 key must be 32 bytes"));
            }
            UnparsedPublicKey::new(&ED25519, &public_key)
                .verify(message, &sig_bytes)
                .map_err(|_| bad_signature())
        }
        HostKeyAlgorithm::RsaSha2_256 | HostKeyAlgorithm::RsaSha2_512 | HostKeyAlgorithm::SshRsa => {
            let e = key_reader.read_mpint()?;
            let n = key_reader.read_mpint()?;
            let params = match algorithm {
                HostKeyAlgorithm::RsaSha2_256 => &RSA_PKCS1_2048_8192_SHA256,
                HostKeyAlgorithm::RsaSha2_512 => &RSA_PKCS1_2048_8192_SHA512,
                _ => &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            };
            RsaPublicKeyComponents { n: &n, e: &e }
                .verify(params, message, &sig_bytes)
                .map_err(|_| bad_signature())
        }
        HostKeyAlgorithm::EcdsaP256 | HostKeyAlgorithm::EcdsaP384 => {
            let curve_name = key_reader.read_string_utf8()?;
            let expected_curve = match algorithm {
                HostKeyAlgorithm::EcdsaP256 => "nistp256",
                _ => "nistp384",
            };
            if curve_name != expected_curve {
                return Err(bad_key("curve name does not match algorithm"));
            }
            let point = key_reader.read_string()?;

            // The signature data is itself `mpint r, mpint s`; ring wants
            // the fixed-width concatenation.
            let mut rs_reader = WireReader::new(&sig_bytes);
            let r = rs_reader.read_mpint()?;
            let s = rs_reader.read_mpint()?;
            let (params, width) = match algorithm {
                HostKeyAlgorithm::EcdsaP256 => (&ECDSA_P256_SHA256_FIXED, 32),
                _ => (&ECDSA_P384_SHA384_FIXED, 48),
            };
            let mut fixed = fixed_scalar(&r, width)?;
            fixed.extend(fixed_scalar(&s, width)?);

            UnparsedPublicKey::new(params, &point)
                .verify(message, &fixed)
                .map_err(|_| bad_signature())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::wire::WireWriter;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    fn ed25519_blobs(message: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();

        let mut key_blob = WireWriter::new();
        key_blob.put_string(b"ssh-ed25519");
        key_blob.put_string(key_pair.public_key().as_ref());

        let signature = key_pair.sign(message);
        let mut sig_blob = WireWriter::new();
        sig_blob.put_string(b"ssh-ed25519");
        sig_blob.put_string(signature.as_ref());

        (key_blob.into_bytes(), sig_blob.into_bytes())
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for alg in [
            HostKeyAlgorithm::SshEd25519,
            HostKeyAlgorithm::RsaSha2_256,
            HostKeyAlgorithm::RsaSha2_512,
            HostKeyAlgorithm::SshRsa,
            HostKeyAlgorithm::EcdsaP256,
            HostKeyAlgorithm::EcdsaP384,
        ] {
            assert_eq!(HostKeyAlgorithm::from_name(alg.name()), Some(alg));
        }
        assert!(HostKeyAlgorithm::from_name("ssh-dss").is_none());
    }

    #[test]
    fn test_rsa_sha2_key_type_is_ssh_rsa() {
        assert_eq!(HostKeyAlgorithm::RsaSha2_256.key_type(), "ssh-rsa");
        assert_eq!(HostKeyAlgorithm::RsaSha2_512.key_type(), "ssh-rsa");
        assert_eq!(HostKeyAlgorithm::SshEd25519.key_type(), "ssh-ed25519");
    }

    #[test]
    fn test_ed25519_verify_ok() {
        let message = b"exchange hash bytes";
        let (key_blob, sig_blob) = ed25519_blobs(message);
        assert!(
            verify_signature(HostKeyAlgorithm::SshEd25519, &key_blob, message, &sig_blob).is_ok()
        );
    }

    #[test]
    fn test_ed25519_verify_rejects_wrong_message() {
        let (key_blob, sig_blob) = ed25519_blobs(b"exchange hash bytes");
        let err = verify_signature(
            HostKeyAlgorithm::SshEd25519,
            &key_blob,
            b"different hash",
            &sig_blob,
        )
        .unwrap_err();
        assert!(matches!(err, HawserError::Kex(_)));
    }

    #[test]
    fn test_signature_format_downgrade_rejected() {
        let message = b"exchange hash bytes";
        let (key_blob, sig_blob) = ed25519_blobs(message);
        // Negotiated rsa-sha2-256 but the server answered with an Ed25519
        // signature format.
        let err = verify_signature(HostKeyAlgorithm::RsaSha2_256, &key_blob, message, &sig_blob)
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint_sha256(b"some key blob");
        assert!(fp.starts_with("SHA256:"));
        assert!(!fp.ends_with('='));
        assert!(fp.len() > 20);
    }

    #[test]
    fn test_fixed_scalar_padding() {
        assert_eq!(fixed_scalar(&[0x01], 4).unwrap(), vec![0, 0, 0, 1]);
        assert_eq!(
            fixed_scalar(&[0xAA, 0xBB], 2).unwrap(),
            vec![0xAA, 0xBB]
        );
        assert!(fixed_scalar(&[1, 2, 3], 2).is_err());
    }
}
