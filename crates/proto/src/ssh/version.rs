//! SSH identification line exchange (RFC 4253 Section 4.2).
//!
//! The connection begins with both sides sending an identification string
//! of the form `SSH-protoversion-softwareversion SP comments CR LF`. A
//! server may precede its identification line with banner text; any line
//! not beginning with `SSH-` is discarded by the reader.
//!
//! # Example
//!
//! ```rust
//! use hawser_proto::ssh::version::Version;
//!
//! let version = Version::new("hawser_0.1.0", None);
//! assert_eq!(version.to_string(), "SSH-2.0-hawser_0.1.0");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_9.6").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_9.6");
//! ```

use hawser_platform::{HawserError, HawserResult};

/// Maximum length of an identification line (RFC 4253 Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// Maximum number of banner lines tolerated before the identification line.
pub const MAX_BANNER_LINES: usize = 64;

/// SSH protocol identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version, "2.0" or the compatibility "1.99".
    protocol: String,
    /// Software name and version, e.g. "hawser_0.1.0".
    software: String,
    /// Trailing comment, if any.
    comments: Option<String>,
}

impl Version {
    /// Creates a new identification string with protocol version "2.0".
    ///
    /// # Panics
    ///
    /// Panics if `software` is not a valid product identifier
    /// (`[A-Za-z0-9._-]+`). Use [`Version::is_valid_product_id`] to check
    /// untrusted input first.
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        assert!(
            Self::is_valid_product_id(software),
            "invalid product identifier: {:?}",
            software
        );
        Self {
            protocol: "2.0".to_string(),
            software: software.to_string(),
            comments: comments.map(str::to_string),
        }
    }

    /// Returns the default Hawser identification.
    pub fn default_hawser() -> Self {
        Self::new(&format!("hawser_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Checks whether `id` matches the allowed product-identifier alphabet
    /// `[A-Za-z0-9._-]+`.
    pub fn is_valid_product_id(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }

    /// Parses an identification line, with or without the trailing CR LF.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Protocol`] if the line is longer than 255
    /// characters, contains a null byte, does not start with `SSH-`, or
    /// advertises a protocol version other than "2.0" / "1.99".
    pub fn parse(line: &str) -> HawserResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.len() > MAX_VERSION_LENGTH {
            return Err(HawserError::Protocol(format!(
                "identification line of {} bytes exceeds the {}-byte limit",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }
        if line.contains('\0') {
            return Err(HawserError::Protocol(
                "identification line contains a null byte".to_string(),
            ));
        }

        let body = line.strip_prefix("SSH-").ok_or_else(|| {
            HawserError::Protocol(format!(
                "identification line must start with 'SSH-', got '{}'",
                line
            ))
        })?;

        let (protocol, rest) = body.split_once('-').ok_or_else(|| {
            HawserError::Protocol(format!("invalid identification line: '{}'", line))
        })?;

        if protocol != "2.0" && protocol != "1.99" {
            return Err(HawserError::Protocol(format!(
                "unsupported protocol version '{}' (expected '2.0' or '1.99')",
                protocol
            )));
        }

        let (software, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments.trim().to_string())),
            None => (rest, None),
        };

        Ok(Self {
            protocol: protocol.to_string(),
            software: software.to_string(),
            comments,
        })
    }

    /// Returns the protocol version (e.g., "2.0").
    pub fn proto_version(&self) -> &str {
        &self.protocol
    }

    /// Returns the software version (e.g., "hawser_0.1.0").
    pub fn software(&self) -> &str {
        &self.software
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format, CR LF terminated.
    pub fn to_wire_format(&self) -> Vec<u8> {
        let mut line = self.to_string();
        line.push_str("\r\n");
        line.into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.comments {
            Some(comments) => {
                write!(f, "SSH-{}-{} {}", self.protocol, self.software, comments)
            }
            None => write!(f, "SSH-{}-{}", self.protocol, self.software),
        }
    }
}
