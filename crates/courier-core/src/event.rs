//! Event names used by the per-bot event bus.
//!
//! Event names are either protocol commands (`PING`, `JOIN`, `433`, ...) or
//! one of the lifecycle names below. Conversion from strings is
//! case-insensitive: `"ping"` and `"PING"` name the same event.

use std::fmt;

/// The name of an event on a bot's bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The transport was opened.
    Connected,
    /// The connection ended, for any reason.
    Disconnected,
    /// Any line was received and parsed.
    Message,
    /// A line is about to be written to the transport.
    BeforeWrite,
    /// A specific protocol command or numeric, upper-cased.
    Command(String),
}

impl EventKind {
    /// Builds a command event, normalising the name to upper case.
    pub fn command(name: impl AsRef<str>) -> Self {
        Self::Command(name.as_ref().to_ascii_uppercase())
    }

    /// Returns `true` for the lifecycle (non-command) events.
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::Command(_))
    }

    /// Returns the canonical name of this event.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Message => "message",
            Self::BeforeWrite => "before_write",
            Self::Command(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "message" => Self::Message,
            "before_write" => Self::BeforeWrite,
            _ => Self::command(name),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
