//! Line formats spoken between client and server.

use thiserror::Error;

pub const QUIT: &str = "/quit";
pub const LOGIN: &str = "LOGIN";
pub const SERVER_NAME: &str = "SERVER";
pub const MAX_USERNAME_LEN: usize = 32;

/// Longest system notice text the server writes, excluding the prefix.
const MAX_NOTICE_LEN: usize = 128;

/// A line received from a client.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Quit,
    Say(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("usage: LOGIN <username>")]
    MalformedLogin,
    #[error("username {0} is reserved")]
    ReservedName(String),
}

/// One token of at most [`MAX_USERNAME_LEN`] bytes, without `:`, and not
/// the name system notices are sent under. With those rules the
/// `<name>: <text>` prefix of a relayed line is unambiguous.
pub fn check_username(name: &str) -> Result<(), ParseError> {
    if name.is_empty()
        || name.len() > MAX_USERNAME_LEN
        || name.contains(':')
        || name.contains(char::is_whitespace)
    {
        return Err(ParseError::MalformedLogin);
    }

    if name.eq_ignore_ascii_case(SERVER_NAME) {
        return Err(ParseError::ReservedName(name.to_string()));
    }

    Ok(())
}

/// Longest line the server can send when clients may send `max_text_len`.
///
/// A relayed chat line carries the sender's name and `": "` on top of the
/// text the server accepted.
pub fn relayed_line_limit(max_text_len: usize) -> usize {
    max_text_len.max(MAX_NOTICE_LEN) + MAX_USERNAME_LEN + 2
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();

    if line == QUIT {
        return Ok(Command::Quit);
    }

    let mut parts = line.split_whitespace();

    if parts.next() != Some(LOGIN) {
        return Ok(Command::Say(line.to_string()));
    }

    let name = parts.next().ok_or(ParseError::MalformedLogin)?;

    if parts.next().is_some() {
        return Err(ParseError::MalformedLogin);
    }
    check_username(name)?;

    Ok(Command::Login(name.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
}

/// One fan-out unit. Lives only for the duration of a broadcast.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub sender: String,
    pub text: String,
    pub kind: MessageKind,
}

impl OutboundMessage {
    pub fn chat(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            kind: MessageKind::Chat,
        }
    }

    pub fn joined(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: String::new(),
            kind: MessageKind::Join,
        }
    }

    pub fn left(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: String::new(),
            kind: MessageKind::Leave,
        }
    }

    pub fn to_line(&self) -> String {
        match self.kind {
            MessageKind::Chat => format!("{}: {}", self.sender, self.text),
            MessageKind::Join => notice(format!("{} has joined the chat", self.sender)),
            MessageKind::Leave => notice(format!("{} has left the chat", self.sender)),
        }
    }
}

/// System line addressed to a single client.
pub fn notice<S: AsRef<str>>(text: S) -> String {
    format!("{}: {}", SERVER_NAME, text.as_ref())
}

pub fn welcome(name: &str) -> String {
    notice(format!("welcome, {name}"))
}

pub fn name_taken(name: &str) -> String {
    notice(format!("username {name} is already taken"))
}

pub fn already_logged_in(name: &str) -> String {
    notice(format!("already logged in as {name}"))
}

pub fn login_first() -> String {
    notice("please log in first with LOGIN <username>")
}

pub fn line_too_long() -> String {
    notice("line too long, closing connection")
}

/// A line received by the client, split for rendering.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming<'a> {
    System(&'a str),
    Chat { from: &'a str, text: &'a str },
    Raw(&'a str),
}

impl<'a> Incoming<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.split_once(": ") {
            Some((SERVER_NAME, text)) => Incoming::System(text),
            Some((from, text)) if !from.is_empty() && !from.contains(char::is_whitespace) => {
                Incoming::Chat { from, text }
            }
            _ => Incoming::Raw(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login() {
        assert_eq!(parse_command("LOGIN alice"), Ok(Command::Login("alice".into())));
        assert_eq!(parse_command("  LOGIN   bob  "), Ok(Command::Login("bob".into())));
    }

    #[test]
    fn rejects_malformed_login() {
        assert_eq!(parse_command("LOGIN"), Err(ParseError::MalformedLogin));
        assert_eq!(parse_command("LOGIN a b"), Err(ParseError::MalformedLogin));

        let long = format!("LOGIN {}", "x".repeat(MAX_USERNAME_LEN + 1));
        assert_eq!(parse_command(&long), Err(ParseError::MalformedLogin));
        assert_eq!(parse_command("LOGIN mal:lory"), Err(ParseError::MalformedLogin));
    }

    #[test]
    fn server_name_is_reserved() {
        assert_eq!(
            parse_command("LOGIN SERVER"),
            Err(ParseError::ReservedName("SERVER".into()))
        );
        assert_eq!(
            parse_command("LOGIN server"),
            Err(ParseError::ReservedName("server".into()))
        );
        assert_eq!(check_username("servers"), Ok(()));
    }

    #[test]
    fn relayed_limit_covers_name_and_separator() {
        let name = "x".repeat(MAX_USERNAME_LEN);
        let line = OutboundMessage::chat(name, "y".repeat(4096)).to_line();
        assert_eq!(line.len(), relayed_line_limit(4096));
        assert!(name_taken(&"x".repeat(MAX_USERNAME_LEN)).len() <= relayed_line_limit(8));
    }

    #[test]
    fn login_keyword_is_exact() {
        assert_eq!(parse_command("login alice"), Ok(Command::Say("login alice".into())));
        assert_eq!(parse_command("LOGINalice"), Ok(Command::Say("LOGINalice".into())));
    }

    #[test]
    fn quit_and_chat() {
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command(" /quit \r"), Ok(Command::Quit));
        assert_eq!(parse_command("/quit now"), Ok(Command::Say("/quit now".into())));
        assert_eq!(parse_command("hi there "), Ok(Command::Say("hi there".into())));
    }

    #[test]
    fn renders_wire_lines() {
        assert_eq!(OutboundMessage::chat("bob", "hello").to_line(), "bob: hello");
        assert_eq!(
            OutboundMessage::joined("bob").to_line(),
            "SERVER: bob has joined the chat"
        );
        assert_eq!(
            OutboundMessage::left("alice").to_line(),
            "SERVER: alice has left the chat"
        );
        assert_eq!(name_taken("alice"), "SERVER: username alice is already taken");
    }

    #[test]
    fn classifies_incoming_lines() {
        assert_eq!(
            Incoming::parse("SERVER: bob has joined the chat"),
            Incoming::System("bob has joined the chat")
        );
        assert_eq!(
            Incoming::parse("bob: a: b"),
            Incoming::Chat { from: "bob", text: "a: b" }
        );
        assert_eq!(Incoming::parse("no separator"), Incoming::Raw("no separator"));
    }
}
