//! IRC line parsing and encoding.
//!
//! [`Message::parse`] turns one protocol line (without its terminator) into a
//! structured [`Message`]. [`encode`] builds an outbound line from a command and
//! its arguments.
//!
//! ```rust
//! use courier_core::Message;
//!
//! let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello there").unwrap();
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.args, vec!["#chan", "hello there"]);
//! assert_eq!(msg.prefix.unwrap().nick, "nick");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, ParseResult};

/// The source of a message, `nick[!user][@host]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prefix {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
}

impl Prefix {
    /// Splits a raw prefix (without the leading `:`).
    ///
    /// `@` is split first, so a host containing `!` stays intact.
    pub fn parse(raw: &str) -> Self {
        let (rest, host) = match raw.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (raw, None),
        };
        let (nick, user) = match rest.split_once('!') {
            Some((nick, user)) => (nick, Some(user.to_string())),
            None => (rest, None),
        };

        Self {
            nick: nick.to_string(),
            user,
            host,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message source, when the line carried one.
    pub prefix: Option<Prefix>,
    /// Upper-cased command or numeric reply code.
    pub command: String,
    /// Arguments; a trailing argument is kept whole, spaces included.
    pub args: Vec<String>,
}

impl Message {
    /// Parses one line. The line terminator must already be stripped.
    pub fn parse(line: &str) -> ParseResult<Self> {
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => {
                let (raw, rest) = stripped.split_once(' ').unwrap_or((stripped, ""));
                (Some(Prefix::parse(raw)), rest)
            }
            None => (None, line),
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split_whitespace();
        let command = words
            .next()
            .ok_or_else(|| ParseError::MissingCommand {
                line: line.to_string(),
            })?
            .to_ascii_uppercase();

        let mut args: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            args.push(trailing.to_string());
        }

        Ok(Self {
            prefix,
            command,
            args,
        })
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns the last argument, which is the text of PRIVMSG/NOTICE lines.
    pub fn trailing(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Returns the nickname from the prefix, if any.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(|p| p.nick.as_str())
    }
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&encode(&self.command, &self.args))
    }
}

/// Builds an outbound line (without CR-LF) from a command and arguments.
///
/// The command is upper-cased. The last argument gets a `:` marker when it
/// contains a space, is empty, or starts with `:`. CR and LF inside arguments
/// become spaces so a single call can never emit two commands.
pub fn encode<S: AsRef<str>>(command: &str, args: &[S]) -> String {
    let mut line = command.to_ascii_uppercase();
    let last = args.len().saturating_sub(1);

    for (i, arg) in args.iter().enumerate() {
        let arg = sanitize(arg.as_ref());
        line.push(' ');
        if i == last && (arg.is_empty() || arg.contains(' ') || arg.starts_with(':')) {
            line.push(':');
        }
        line.push_str(&arg);
    }

    line
}

fn sanitize(arg: &str) -> std::borrow::Cow<'_, str> {
    if arg.contains(['\r', '\n']) {
        arg.replace(['\r', '\n'], " ").into()
    } else {
        arg.into()
    }
}
