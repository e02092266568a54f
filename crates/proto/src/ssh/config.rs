//! Client configuration.
//!
//! All tunables and algorithm preferences live in [`ConnectionConfig`], a
//! plain value handed to the session at construction. There are no
//! process-wide registries; defaults come from [`ConnectionConfig::default`]
//! and callers override fields before connecting.

use crate::ssh::hostkey::HostKeyInfo;
use hawser_platform::HawserResult;
use std::time::Duration;

/// Decides whether the server's host key is acceptable.
///
/// Invoked once per key exchange with the parsed key blob and its SHA-256
/// fingerprint. Returning `false` aborts the connection.
pub type HostKeyVerifier = Box<dyn Fn(&HostKeyInfo<'_>) -> bool + Send + Sync>;

/// Supplies a password when a configured `password` attempt has none.
pub type PasswordPrompt = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Answers keyboard-interactive prompts.
///
/// Receives the server's name, instruction and prompt list; must return one
/// response per prompt.
pub type InteractivePrompt =
    Box<dyn Fn(&str, &str, &[InfoPrompt]) -> Vec<String> + Send + Sync>;

/// Receives USERAUTH_BANNER text.
pub type BannerHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Signs authentication challenges for the `publickey` method.
///
/// Private-key handling is the caller's concern; the session only needs a
/// signing oracle over the exact bytes it supplies.
pub type Signer = Box<dyn Fn(&[u8]) -> HawserResult<Vec<u8>> + Send + Sync>;

/// One prompt inside a keyboard-interactive INFO_REQUEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoPrompt {
    /// Prompt text shown to the user.
    pub text: String,
    /// Whether the response may be echoed.
    pub echo: bool,
}

/// One entry in the ordered authentication plan.
pub enum AuthAttempt {
    /// The "none" probe; mostly useful to learn the allowed-method list.
    None,
    /// Password authentication with a pre-supplied password. An empty
    /// password defers to [`ConnectionConfig::password_prompt`].
    Password {
        /// The password to present.
        password: String,
    },
    /// Two-phase public-key authentication.
    PublicKey {
        /// Public key algorithm name (e.g., "ssh-ed25519", "rsa-sha2-256").
        algorithm: String,
        /// SSH-encoded public key blob.
        public_key: Vec<u8>,
        /// Signing oracle for the server's challenge.
        signer: Signer,
    },
    /// Keyboard-interactive, driven by
    /// [`ConnectionConfig::interactive_prompt`].
    KeyboardInteractive,
}

impl AuthAttempt {
    /// Returns the SSH method name.
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthAttempt::None => "none",
            AuthAttempt::Password { .. } => "password",
            AuthAttempt::PublicKey { .. } => "publickey",
            AuthAttempt::KeyboardInteractive => "keyboard-interactive",
        }
    }
}

impl std::fmt::Debug for AuthAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthAttempt::None => f.write_str("None"),
            AuthAttempt::Password { .. } => f.write_str("Password(<redacted>)"),
            AuthAttempt::PublicKey { algorithm, .. } => {
                f.debug_struct("PublicKey").field("algorithm", algorithm).finish()
            }
            AuthAttempt::KeyboardInteractive => f.write_str("KeyboardInteractive"),
        }
    }
}

/// Ordered algorithm preference lists advertised in KEXINIT.
///
/// The same cipher/MAC/compression lists are used for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmPreferences {
    /// Key exchange algorithms, most preferred first.
    pub kex: Vec<String>,
    /// Server host key algorithms.
    pub host_key: Vec<String>,
    /// Encryption algorithms.
    pub cipher: Vec<String>,
    /// MAC algorithms (ignored for AEAD ciphers).
    pub mac: Vec<String>,
    /// Compression algorithms.
    pub compression: Vec<String>,
}

impl Default for AlgorithmPreferences {
    fn default() -> Self {
        Self {
            kex: vec![
                "mlkem768x25519-sha256".to_string(),
                "curve25519-sha256".to_string(),
                "curve25519-sha256@libssh.org".to_string(),
                "ecdh-sha2-nistp256".to_string(),
                "ecdh-sha2-nistp384".to_string(),
                "diffie-hellman-group-exchange-sha256".to_string(),
                "diffie-hellman-group14-sha256".to_string(),
            ],
            host_key: vec![
                "ssh-ed25519".to_string(),
                "ecdsa-sha2-nistp256".to_string(),
                "ecdsa-sha2-nistp384".to_string(),
                "rsa-sha2-512".to_string(),
                "rsa-sha2-256".to_string(),
            ],
            cipher: vec![
                "chacha20-poly1305@openssh.com".to_string(),
                "aes256-gcm@openssh.com".to_string(),
                "aes128-gcm@openssh.com".to_string(),
                "aes256-ctr".to_string(),
                "aes128-ctr".to_string(),
            ],
            mac: vec![
                "hmac-sha2-256-etm@openssh.com".to_string(),
                "hmac-sha2-512-etm@openssh.com".to_string(),
                "hmac-sha2-256".to_string(),
                "hmac-sha2-512".to_string(),
            ],
            compression: vec!["none".to_string(), "zlib@openssh.com".to_string()],
        }
    }
}

/// Session configuration.
pub struct ConnectionConfig {
    /// Connect deadline and default per-operation deadline.
    pub timeout: Duration,
    /// Keep-alive interval; `None` disables the timer entirely.
    pub keep_alive_interval: Option<Duration>,
    /// Bytes transferred before a re-key is forced (default 1 GiB).
    pub rekey_bytes_limit: u64,
    /// Elapsed time before a re-key is forced (default 1 hour).
    pub rekey_time_limit: Duration,
    /// Initial receive window granted to each new channel.
    pub channel_initial_window: u32,
    /// Maximum packet size advertised for each new channel.
    pub channel_max_packet: u32,
    /// Algorithm preference lists.
    pub preferences: AlgorithmPreferences,
    /// Ordered authentication plan.
    pub auth_attempts: Vec<AuthAttempt>,
    /// User name to authenticate as.
    pub username: String,
    /// Product identifier for the identification line
    /// (must match `[A-Za-z0-9._-]+`).
    pub product_id: String,
    /// Host-key acceptance callback. `None` rejects every key.
    pub host_key_verifier: Option<HostKeyVerifier>,
    /// Password fallback prompt.
    pub password_prompt: Option<PasswordPrompt>,
    /// Keyboard-interactive prompt handler.
    pub interactive_prompt: Option<InteractivePrompt>,
    /// Banner text handler.
    pub banner_handler: Option<BannerHandler>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("timeout", &self.timeout)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("rekey_bytes_limit", &self.rekey_bytes_limit)
            .field("rekey_time_limit", &self.rekey_time_limit)
            .field("channel_initial_window", &self.channel_initial_window)
            .field("channel_max_packet", &self.channel_max_packet)
            .field("preferences", &self.preferences)
            .field("auth_attempts", &self.auth_attempts)
            .field("username", &self.username)
            .field("product_id", &self.product_id)
            .field(
                "host_key_verifier",
                &self.host_key_verifier.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            keep_alive_interval: None,
            rekey_bytes_limit: 1 << 30,
            rekey_time_limit: Duration::from_secs(3600),
            channel_initial_window: 2 * 1024 * 1024,
            channel_max_packet: 32 * 1024,
            preferences: AlgorithmPreferences::default(),
            auth_attempts: Vec::new(),
            username: String::new(),
            product_id: format!("hawser_{}", env!("CARGO_PKG_VERSION")),
            host_key_verifier: None,
            password_prompt: None,
            interactive_prompt: None,
            banner_handler: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.keep_alive_interval, None);
        assert_eq!(config.rekey_bytes_limit, 1 << 30);
        assert_eq!(config.channel_max_packet, 32 * 1024);
        assert!(config.auth_attempts.is_empty());
    }

    #[test]
    fn test_default_preferences_lead_with_modern_algorithms() {
        let prefs = AlgorithmPreferences::default();
        assert_eq!(prefs.kex[0], "mlkem768x25519-sha256");
        assert!(prefs.kex.contains(&"curve25519-sha256".to_string()));
        assert_eq!(prefs.cipher[0], "chacha20-poly1305@openssh.com");
        assert_eq!(prefs.compression[0], "none");
    }

    #[test]
    fn test_auth_attempt_method_names() {
        assert_eq!(AuthAttempt::None.method_name(), "none");
        assert_eq!(
            AuthAttempt::Password {
                password: "secret".to_string()
            }
            .method_name(),
            "password"
        );
        assert_eq!(AuthAttempt::KeyboardInteractive.method_name(), "keyboard-interactive");
    }

    #[test]
    fn test_auth_attempt_debug_redacts_password() {
        let attempt = AuthAttempt::Password {
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", attempt).contains("hunter2"));
    }
}
