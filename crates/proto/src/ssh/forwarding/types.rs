//! Forwarding address types.

use hawser_platform::{HawserError, HawserResult};

/// A host/port pair used on either end of a forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardAddr {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ForwardAddr {
    /// Creates an address.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Parses `"host:port"`.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Connection`] when the string has no port or
    /// the port does not parse.
    pub fn parse(addr: &str) -> HawserResult<Self> {
        let Some(colon) = addr.rfind(':') else {
            return Err(HawserError::Connection(format!(
                "forward address '{}' is missing a port",
                addr
            )));
        };
        let host = &addr[..colon];
        let port = addr[colon + 1..].parse::<u16>().map_err(|_| {
            HawserError::Connection(format!("invalid port in forward address '{}'", addr))
        })?;
        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for ForwardAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr = ForwardAddr::parse("localhost:8080").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 8080);
        assert_eq!(addr.to_string(), "localhost:8080");
    }

    #[test]
    fn test_parse_ipv6_uses_last_colon() {
        let addr = ForwardAddr::parse("[::1]:2222").unwrap();
        assert_eq!(addr.host, "[::1]");
        assert_eq!(addr.port, 2222);
    }

    #[test]
    fn test_parse_rejects_missing_or_bad_port() {
        assert!(ForwardAddr::parse("localhost").is_err());
        assert!(ForwardAddr::parse("localhost:http").is_err());
    }
}
