//! SSH algorithm negotiation (RFC 4253 Section 7.1, RFC 8308).
//!
//! This module carries the negotiation-phase messages and the selection
//! logic:
//!
//! - SSH_MSG_KEXINIT with the OpenSSH strict-KEX and `ext-info-c` markers
//! - SSH_MSG_NEWKEYS
//! - SSH_MSG_EXT_INFO (RFC 8308)
//! - guest-preferred algorithm selection: the first entry on the client's
//!   list that also appears on the server's list wins
//!
//! # Strict KEX
//!
//! The client's *first* KEXINIT advertises `kex-strict-c-v00@openssh.com`;
//! re-key KEXINITs must not. When the server reciprocates with
//! `kex-strict-s-v00@openssh.com`, any non-KEX message during key exchange
//! is fatal and both sequence counters reset to zero at NEWKEYS.

use crate::ssh::config::AlgorithmPreferences;
use crate::ssh::crypto::{CipherAlgorithm, CompressionAlgorithm, MacAlgorithm};
use crate::ssh::hostkey::HostKeyAlgorithm;
use crate::ssh::kex_dh::KexAlgorithm;
use crate::ssh::message::MessageType;
use crate::ssh::wire::{WireReader, WireWriter};
use hawser_platform::{HawserError, HawserResult};
use rand::RngCore;

/// Marker the client adds to its first KEXINIT kex list.
pub const STRICT_KEX_CLIENT: &str = "kex-strict-c-v00@openssh.com";

/// Marker a strict-KEX server adds to its first KEXINIT kex list.
pub const STRICT_KEX_SERVER: &str = "kex-strict-s-v00@openssh.com";

/// Marker requesting SSH_MSG_EXT_INFO from the server (RFC 8308).
pub const EXT_INFO_CLIENT: &str = "ext-info-c";

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie (16 bytes)
    cookie: [u8; 16],
    /// Key exchange algorithms
    kex_algorithms: Vec<String>,
    /// Server host key algorithms
    server_host_key_algorithms: Vec<String>,
    /// Encryption algorithms client to server
    encryption_client_to_server: Vec<String>,
    /// Encryption algorithms server to client
    encryption_server_to_client: Vec<String>,
    /// MAC algorithms client to server
    mac_client_to_server: Vec<String>,
    /// MAC algorithms server to client
    mac_server_to_client: Vec<String>,
    /// Compression algorithms client to server
    compression_client_to_server: Vec<String>,
    /// Compression algorithms server to client
    compression_server_to_client: Vec<String>,
    /// Languages client to server (usually empty)
    languages_client_to_server: Vec<String>,
    /// Languages server to client (usually empty)
    languages_server_to_client: Vec<String>,
    /// First KEX packet follows
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Builds the client KEXINIT from configured preference lists.
    ///
    /// `first_kex` controls the one-shot markers: the strict-KEX marker and
    /// `ext-info-c` appear only on the connection's first KEXINIT, never on
    /// re-keys.
    pub fn from_preferences(preferences: &AlgorithmPreferences, first_kex: bool) -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        let mut kex_algorithms = preferences.kex.clone();
        if first_kex {
            kex_algorithms.push(EXT_INFO_CLIENT.to_string());
            kex_algorithms.push(STRICT_KEX_CLIENT.to_string());
        }

        Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms: preferences.host_key.clone(),
            encryption_client_to_server: preferences.cipher.clone(),
            encryption_server_to_client: preferences.cipher.clone(),
            mac_client_to_server: preferences.mac.clone(),
            mac_server_to_client: preferences.mac.clone(),
            compression_client_to_server: preferences.compression.clone(),
            compression_server_to_client: preferences.compression.clone(),
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithm list.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithm list.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns whether this KEXINIT advertises the server strict-KEX marker.
    pub fn advertises_strict_server(&self) -> bool {
        self.kex_algorithms.iter().any(|a| a == STRICT_KEX_SERVER)
    }

    /// Returns whether this KEXINIT advertises the client strict-KEX marker.
    pub fn advertises_strict_client(&self) -> bool {
        self.kex_algorithms.iter().any(|a| a == STRICT_KEX_CLIENT)
    }

    /// Returns whether first_kex_packet_follows was set.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the message body (RFC 4253 Section 7.1).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(1024);
        w.put_byte(MessageType::KexInit as u8);
        w.put_raw(&self.cookie);
        w.put_name_list(&self.kex_algorithms);
        w.put_name_list(&self.server_host_key_algorithms);
        w.put_name_list(&self.encryption_client_to_server);
        w.put_name_list(&self.encryption_server_to_client);
        w.put_name_list(&self.mac_client_to_server);
        w.put_name_list(&self.mac_server_to_client);
        w.put_name_list(&self.compression_client_to_server);
        w.put_name_list(&self.compression_server_to_client);
        w.put_name_list(&self.languages_client_to_server);
        w.put_name_list(&self.languages_server_to_client);
        w.put_boolean(self.first_kex_packet_follows);
        w.put_u32(0); // reserved
        w.into_bytes()
    }

    /// Parses a KEXINIT message body.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Protocol`] on truncation or a wrong message
    /// number.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::KexInit as u8, "SSH_MSG_KEXINIT")?;

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(r.read_raw(16)?);

        let kex_algorithms = r.read_name_list()?;
        let server_host_key_algorithms = r.read_name_list()?;
        let encryption_client_to_server = r.read_name_list()?;
        let encryption_server_to_client = r.read_name_list()?;
        let mac_client_to_server = r.read_name_list()?;
        let mac_server_to_client = r.read_name_list()?;
        let compression_client_to_server = r.read_name_list()?;
        let compression_server_to_client = r.read_name_list()?;
        let languages_client_to_server = r.read_name_list()?;
        let languages_server_to_client = r.read_name_list()?;
        let first_kex_packet_follows = r.read_boolean()?;
        let _reserved = r.read_u32()?;

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_client_to_server,
            encryption_server_to_client,
            mac_client_to_server,
            mac_server_to_client,
            compression_client_to_server,
            compression_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// A single byte; after it is sent and received, both sides switch to the
/// newly derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Creates the message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![MessageType::NewKeys as u8]
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::NewKeys as u8, "SSH_MSG_NEWKEYS")?;
        Ok(Self)
    }
}

/// SSH_MSG_EXT_INFO message (RFC 8308).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtInfo {
    /// Extension name/value pairs in received order.
    extensions: Vec<(String, Vec<u8>)>,
}

impl ExtInfo {
    /// Returns all extensions.
    pub fn extensions(&self) -> &[(String, Vec<u8>)] {
        &self.extensions
    }

    /// Returns the server's `server-sig-algs` list, if present.
    pub fn server_sig_algs(&self) -> Option<Vec<String>> {
        self.extensions
            .iter()
            .find(|(name, _)| name == "server-sig-algs")
            .map(|(_, value)| {
                String::from_utf8_lossy(value)
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
    }

    /// Serializes the message body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_byte(MessageType::ExtInfo as u8);
        w.put_u32(self.extensions.len() as u32);
        for (name, value) in &self.extensions {
            w.put_string(name.as_bytes());
            w.put_string(value);
        }
        w.into_bytes()
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::ExtInfo as u8, "SSH_MSG_EXT_INFO")?;

        let count = r.read_u32()?;
        let mut extensions = Vec::new();
        for _ in 0..count {
            let name = r.read_string_utf8()?;
            let value = r.read_string()?;
            extensions.push((name, value));
        }
        Ok(Self { extensions })
    }
}

/// Picks the first client algorithm the server also supports
/// (RFC 4253 Section 7.1).
///
/// # Errors
///
/// Returns [`HawserError::Kex`] when the lists share no entry.
pub fn negotiate_algorithm(
    client_list: &[String],
    server_list: &[String],
    what: &str,
) -> HawserResult<String> {
    for client_alg in client_list {
        if server_list.contains(client_alg) {
            return Ok(client_alg.clone());
        }
    }

    Err(HawserError::Kex(format!(
        "no common {} algorithm: client={:?}, server={:?}",
        what, client_list, server_list
    )))
}

/// The full negotiated algorithm suite for one key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedAlgorithms {
    /// Key exchange method.
    pub kex: KexAlgorithm,
    /// Host key algorithm the server will sign with.
    pub host_key: HostKeyAlgorithm,
    /// Cipher, client to server.
    pub cipher_c2s: CipherAlgorithm,
    /// Cipher, server to client.
    pub cipher_s2c: CipherAlgorithm,
    /// MAC, client to server (None for AEAD ciphers).
    pub mac_c2s: Option<MacAlgorithm>,
    /// MAC, server to client (None for AEAD ciphers).
    pub mac_s2c: Option<MacAlgorithm>,
    /// Compression, client to server.
    pub compression_c2s: CompressionAlgorithm,
    /// Compression, server to client.
    pub compression_s2c: CompressionAlgorithm,
}

/// Pseudo-algorithms that never name a key exchange method.
fn is_kex_marker(name: &str) -> bool {
    name == STRICT_KEX_CLIENT || name == STRICT_KEX_SERVER || name == EXT_INFO_CLIENT
        || name == "ext-info-s"
}

/// Resolves the complete suite from both KEXINIT messages.
///
/// # Errors
///
/// Returns [`HawserError::Kex`] when any slot has no common algorithm or a
/// negotiated name is not implemented.
pub fn negotiate(client: &KexInit, server: &KexInit) -> HawserResult<NegotiatedAlgorithms> {
    let client_kex: Vec<String> = client
        .kex_algorithms
        .iter()
        .filter(|a| !is_kex_marker(a))
        .cloned()
        .collect();
    let server_kex: Vec<String> = server
        .kex_algorithms
        .iter()
        .filter(|a| !is_kex_marker(a))
        .cloned()
        .collect();

    let kex_name = negotiate_algorithm(&client_kex, &server_kex, "key exchange")?;
    let kex = KexAlgorithm::from_name(&kex_name)
        .ok_or_else(|| HawserError::Kex(format!("negotiated unknown kex: {}", kex_name)))?;

    let host_key_name = negotiate_algorithm(
        &client.server_host_key_algorithms,
        &server.server_host_key_algorithms,
        "host key",
    )?;
    let host_key = HostKeyAlgorithm::from_name(&host_key_name)
        .ok_or_else(|| HawserError::Kex(format!("negotiated unknown host key: {}", host_key_name)))?;

    let cipher_c2s_name = negotiate_algorithm(
        &client.encryption_client_to_server,
        &server.encryption_client_to_server,
        "cipher (client to server)",
    )?;
    let cipher_c2s = CipherAlgorithm::from_name(&cipher_c2s_name)
        .ok_or_else(|| HawserError::Kex(format!("negotiated unknown cipher: {}", cipher_c2s_name)))?;

    let cipher_s2c_name = negotiate_algorithm(
        &client.encryption_server_to_client,
        &server.encryption_server_to_client,
        "cipher (server to client)",
    )?;
    let cipher_s2c = CipherAlgorithm::from_name(&cipher_s2c_name)
        .ok_or_else(|| HawserError::Kex(format!("negotiated unknown cipher: {}", cipher_s2c_name)))?;

    let mac_c2s = if cipher_c2s.is_aead() {
        None
    } else {
        let name = negotiate_algorithm(
            &client.mac_client_to_server,
            &server.mac_client_to_server,
            "MAC (client to server)",
        )?;
        Some(
            MacAlgorithm::from_name(&name)
                .ok_or_else(|| HawserError::Kex(format!("negotiated unknown MAC: {}", name)))?,
        )
    };

    let mac_s2c = if cipher_s2c.is_aead() {
        None
    } else {
        let name = negotiate_algorithm(
            &client.mac_server_to_client,
            &server.mac_server_to_client,
            "MAC (server to client)",
        )?;
        Some(
            MacAlgorithm::from_name(&name)
                .ok_or_else(|| HawserError::Kex(format!("negotiated unknown MAC: {}", name)))?,
        )
    };

    let compression_c2s_name = negotiate_algorithm(
        &client.compression_client_to_server,
        &server.compression_client_to_server,
        "compression (client to server)",
    )?;
    let compression_c2s = CompressionAlgorithm::from_name(&compression_c2s_name).ok_or_else(|| {
        HawserError::Kex(format!(
            "negotiated unknown compression: {}",
            compression_c2s_name
        ))
    })?;

    let compression_s2c_name = negotiate_algorithm(
        &client.compression_server_to_client,
        &server.compression_server_to_client,
        "compression (server to client)",
    )?;
    let compression_s2c = CompressionAlgorithm::from_name(&compression_s2c_name).ok_or_else(|| {
        HawserError::Kex(format!(
            "negotiated unknown compression: {}",
            compression_s2c_name
        ))
    })?;

    Ok(NegotiatedAlgorithms {
        kex,
        host_key,
        cipher_c2s,
        cipher_s2c,
        mac_c2s,
        mac_s2c,
        compression_c2s,
        compression_s2c,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> AlgorithmPreferences {
        AlgorithmPreferences::default()
    }

    #[test]
    fn test_first_kexinit_carries_markers() {
        let kexinit = KexInit::from_preferences(&prefs(), true);
        assert!(kexinit.advertises_strict_client());
        assert!(kexinit
            .kex_algorithms()
            .contains(&EXT_INFO_CLIENT.to_string()));
    }

    #[test]
    fn test_rekey_kexinit_has_no_markers() {
        let kexinit = KexInit::from_preferences(&prefs(), false);
        assert!(!kexinit.advertises_strict_client());
        assert!(!kexinit
            .kex_algorithms()
            .contains(&EXT_INFO_CLIENT.to_string()));
    }

    #[test]
    fn test_kexinit_round_trip() {
        let original = KexInit::from_preferences(&prefs(), true);
        let parsed = KexInit::from_bytes(&original.to_bytes()).unwrap();

        assert_eq!(parsed.cookie(), original.cookie());
        assert_eq!(parsed.kex_algorithms(), original.kex_algorithms());
        assert_eq!(
            parsed.server_host_key_algorithms(),
            original.server_host_key_algorithms()
        );
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_kexinit_rejects_wrong_message_number() {
        let mut bytes = KexInit::from_preferences(&prefs(), true).to_bytes();
        bytes[0] = 21;
        assert!(KexInit::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_newkeys_round_trip() {
        let bytes = NewKeys::new().to_bytes();
        assert_eq!(bytes, vec![21]);
        assert!(NewKeys::from_bytes(&bytes).is_ok());
        assert!(NewKeys::from_bytes(&[20]).is_err());
    }

    #[test]
    fn test_ext_info_server_sig_algs() {
        let ext = ExtInfo {
            extensions: vec![(
                "server-sig-algs".to_string(),
                b"ssh-ed25519,rsa-sha2-512,rsa-sha2-256".to_vec(),
            )],
        };
        let parsed = ExtInfo::from_bytes(&ext.to_bytes()).unwrap();
        let algs = parsed.server_sig_algs().unwrap();
        assert_eq!(algs, vec!["ssh-ed25519", "rsa-sha2-512", "rsa-sha2-256"]);
    }

    #[test]
    fn test_negotiate_algorithm_prefers_client_order() {
        let client = vec!["aes256-ctr".to_string(), "aes128-ctr".to_string()];
        let server = vec!["aes128-ctr".to_string(), "aes256-ctr".to_string()];
        assert_eq!(
            negotiate_algorithm(&client, &server, "cipher").unwrap(),
            "aes256-ctr"
        );
    }

    #[test]
    fn test_negotiate_algorithm_no_match() {
        let client = vec!["aes256-ctr".to_string()];
        let server = vec!["3des-cbc".to_string()];
        let err = negotiate_algorithm(&client, &server, "cipher").unwrap_err();
        assert!(matches!(err, HawserError::Kex(_)));
    }

    #[test]
    fn test_full_negotiation_ignores_markers() {
        let client = KexInit::from_preferences(&prefs(), true);
        // Server that *only* offers the strict marker plus one real kex.
        let mut server_prefs = prefs();
        server_prefs.kex = vec![
            STRICT_KEX_SERVER.to_string(),
            "curve25519-sha256".to_string(),
        ];
        let server = KexInit::from_preferences(&server_prefs, false);

        let negotiated = negotiate(&client, &server).unwrap();
        assert_eq!(negotiated.kex, KexAlgorithm::Curve25519Sha256);
        assert_eq!(negotiated.cipher_c2s, CipherAlgorithm::ChaCha20Poly1305);
        assert_eq!(negotiated.mac_c2s, None); // AEAD
    }

    #[test]
    fn test_negotiation_resolves_ctr_with_mac() {
        let mut client_prefs = prefs();
        client_prefs.cipher = vec!["aes128-ctr".to_string()];
        client_prefs.mac = vec!["hmac-sha2-256-etm@openssh.com".to_string()];
        let client = KexInit::from_preferences(&client_prefs, true);
        let server = KexInit::from_preferences(&client_prefs, false);

        let negotiated = negotiate(&client, &server).unwrap();
        assert_eq!(negotiated.cipher_c2s, CipherAlgorithm::Aes128Ctr);
        assert_eq!(negotiated.mac_c2s, Some(MacAlgorithm::HmacSha256Etm));
        assert_eq!(
            negotiated.compression_c2s,
            CompressionAlgorithm::None
        );
    }
}
