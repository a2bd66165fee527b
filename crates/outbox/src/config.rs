//! Relay connection settings.

use serde::{Deserialize, Serialize};

/// Security/encryption mode for the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Plain connection upgraded with STARTTLS before authenticating.
    #[default]
    StartTls,
    /// TLS from the first byte (implicit TLS).
    Tls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::StartTls => "STARTTLS",
            Self::Tls => "SSL/TLS",
        }
    }
}

impl From<bool> for Security {
    /// Maps a `use_tls` flag: `true` upgrades with STARTTLS.
    fn from(use_tls: bool) -> Self {
        if use_tls { Self::StartTls } else { Self::None }
    }
}

/// Where and how to reach the mail relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    #[serde(default)]
    pub security: Security,
}

impl RelayConfig {
    /// Creates a relay configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, security: Security) -> Self {
        Self {
            host: host.into(),
            port,
            security,
        }
    }

    /// Creates a relay configuration on the default port for `security`.
    #[must_use]
    pub fn with_default_port(host: impl Into<String>, security: Security) -> Self {
        Self::new(host, Self::default_port(security), security)
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }
}
