//! Network and channel identities.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    6667
}

/// An IRC server endpoint.
///
/// Equality and hashing consider only `host` (ASCII case-insensitively),
/// `port` and `tls`. The password is not part of a network's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to wrap the connection in TLS.
    #[serde(default, rename = "ssl")]
    pub tls: bool,
    /// Optional server password, sent as `PASS` during registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Network {
    /// Creates a plain-text network identity.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            password: None,
        }
    }

    /// Enables or disables TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the server password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.host.eq_ignore_ascii_case(&other.host) && self.port == other.port && self.tls == other.tls
    }
}

impl Eq for Network {}

impl Hash for Network {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.host.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
        self.port.hash(state);
        self.tls.hash(state);
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "ircs" } else { "irc" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// A channel on some network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name as given; sent verbatim on the wire.
    #[serde(rename = "channel")]
    pub name: String,
    /// Optional channel key used with `JOIN`.
    #[serde(
        default,
        rename = "channel_password",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
}

impl Channel {
    /// Creates a channel without a key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
        }
    }

    /// Sets the channel key.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Lower-cased name used for membership tracking.
    pub fn key(&self) -> String {
        channel_key(&self.name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Normalises a channel name for comparisons.
pub fn channel_key(name: &str) -> String {
    name.to_lowercase()
}
