//! Queue entry shapes.
//!
//! Entries are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "message",
//!  "channel": {"host": "irc.example.org", "port": 6667, "ssl": false, "channel": "#notices"},
//!  "payload": {"msg": "build passed"}}
//! ```
//!
//! The network may also be given as a separate `network` object
//! (`host`, `port`, `ssl`, `password`), which wins over inline fields.

use serde::Deserialize;
use serde_json::{Map, Value};

use courier_core::{Channel, Network};

use crate::error::EntryError;

const DEFAULT_PORT: u16 = 6667;

/// One decoded queue entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueueEntry {
    /// Deliver a message to a channel.
    Message(MessageEntry),
    /// Command-and-control; accepted and ignored.
    Cnc(CncEntry),
}

impl QueueEntry {
    /// Decodes a raw entry.
    pub fn parse(raw: &str) -> Result<Self, EntryError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntry {
    #[serde(default)]
    pub network: Option<Network>,
    pub channel: ChannelLocation,
    pub payload: Payload,
}

/// The `channel` object, optionally carrying its network inline.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelLocation {
    #[serde(flatten)]
    pub channel: Channel,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ssl: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payload {
    pub msg: String,
}

/// A `cnc` entry. Its fields are kept for logging only.
#[derive(Debug, Clone, Deserialize)]
pub struct CncEntry {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MessageEntry {
    /// Resolves where the message goes.
    pub fn route(&self) -> Result<(Network, Channel), EntryError> {
        if self.channel.channel.name.trim().is_empty() {
            return Err(EntryError::MissingChannel);
        }

        let network = match (&self.network, &self.channel.host) {
            (Some(network), _) => network.clone(),
            (None, Some(host)) => Network::new(host.clone(), self.channel.port.unwrap_or(DEFAULT_PORT))
                .with_tls(self.channel.ssl.unwrap_or(false)),
            (None, None) => return Err(EntryError::MissingNetwork),
        };
        if network.host.trim().is_empty() {
            return Err(EntryError::MissingNetwork);
        }

        Ok((network, self.channel.channel.clone()))
    }

    /// The text to send.
    pub fn text(&self) -> Result<&str, EntryError> {
        match self.payload.msg.as_str() {
            "" => Err(EntryError::EmptyMessage),
            text => Ok(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(raw: &str) -> MessageEntry {
        match QueueEntry::parse(raw).unwrap() {
            QueueEntry::Message(entry) => entry,
            other => panic!("expected a message entry, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_network() {
        let entry = message(
            r##"{"type": "message",
                "channel": {"host": "irc.example.org", "port": 6697, "ssl": true,
                            "channel": "#notices", "channel_password": "k"},
                "payload": {"msg": "build passed"}}"##,
        );
        let (network, channel) = entry.route().unwrap();

        assert_eq!(network, Network::new("irc.example.org", 6697).with_tls(true));
        assert_eq!(channel, Channel::new("#notices").with_password("k"));
        assert_eq!(entry.text().unwrap(), "build passed");
    }

    #[test]
    fn test_inline_network_defaults() {
        let entry = message(
            r##"{"type": "message", "channel": {"host": "irc.example.org", "channel": "#c"},
                "payload": {"msg": "hi"}}"##,
        );
        let (network, _) = entry.route().unwrap();

        assert_eq!(network.port, 6667);
        assert!(!network.tls);
    }

    #[test]
    fn test_separate_network_object_wins() {
        let entry = message(
            r##"{"type": "message",
                "network": {"host": "irc.libera.chat", "port": 6697, "ssl": true, "password": "p"},
                "channel": {"host": "ignored.example", "channel": "#c"},
                "payload": {"msg": "hi"}}"##,
        );
        let (network, _) = entry.route().unwrap();

        assert_eq!(network.host, "irc.libera.chat");
        assert_eq!(network.password.as_deref(), Some("p"));
    }

    #[test]
    fn test_cnc_entry() {
        let entry = QueueEntry::parse(r#"{"type": "cnc", "action": "restart"}"#).unwrap();
        match entry {
            QueueEntry::Cnc(cnc) => assert_eq!(cnc.fields["action"], "restart"),
            other => panic!("expected cnc, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_entries() {
        assert!(matches!(QueueEntry::parse("not json"), Err(EntryError::Malformed(_))));
        assert!(matches!(
            QueueEntry::parse(r#"{"type": "unknown"}"#),
            Err(EntryError::Malformed(_))
        ));
        assert!(matches!(
            QueueEntry::parse(r#"{"type": "message", "payload": {"msg": "x"}}"#),
            Err(EntryError::Malformed(_))
        ));

        let no_network = message(r##"{"type": "message", "channel": {"channel": "#c"}, "payload": {"msg": "x"}}"##);
        assert!(matches!(no_network.route(), Err(EntryError::MissingNetwork)));

        let no_channel = message(
            r#"{"type": "message", "channel": {"host": "h", "channel": ""}, "payload": {"msg": "x"}}"#,
        );
        assert!(matches!(no_channel.route(), Err(EntryError::MissingChannel)));

        let empty = message(
            r##"{"type": "message", "channel": {"host": "h", "channel": "#c"}, "payload": {"msg": ""}}"##,
        );
        assert!(matches!(empty.text(), Err(EntryError::EmptyMessage)));
    }
}
