//! Relay wire protocol: handshake, routing and system notices.
//!
//! The handshake is the only plaintext frame. Every later frame carries an
//! envelope whose plaintext is either a broadcast line or a directed message
//! of the form `@<user> <body>`.

/// Prefix of the handshake frame.
pub const HANDSHAKE_PREFIX: &str = "USERNAME:";

/// Prefix of directed messages.
pub const DIRECTED_PREFIX: char = '@';

/// Prefix of server-generated notices.
pub const SYSTEM_PREFIX: &str = "[SYSTEM]";

/// Result of parsing the first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// A regular join with the trimmed username.
    Join(String),
    /// A roster probe; the connection is answered and closed.
    RosterRequest,
    /// Anything else, including an empty name.
    Malformed,
}

/// Builds the handshake frame for `username`.
pub fn handshake_frame(username: &str) -> Vec<u8> {
    format!("{}{}", HANDSHAKE_PREFIX, username).into_bytes()
}

/// Parses a handshake frame. `is_sentinel` decides whether a name is a roster probe.
pub fn parse_handshake<F>(frame: &[u8], is_sentinel: F) -> Handshake
where
    F: Fn(&str) -> bool,
{
    let Ok(text) = std::str::from_utf8(frame) else {
        return Handshake::Malformed;
    };
    let Some(name) = text.strip_prefix(HANDSHAKE_PREFIX) else {
        return Handshake::Malformed;
    };

    let name = name.trim();
    if name.is_empty() {
        Handshake::Malformed
    } else if is_sentinel(name) {
        Handshake::RosterRequest
    } else {
        Handshake::Join(name.to_string())
    }
}

/// Routing decision for a decrypted inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Fan out to everyone but the sender.
    Broadcast(&'a str),
    /// Deliver to every session named `target`.
    Directed { target: &'a str, body: &'a str },
    /// Starts with `@` but lacks a target or a body.
    BadDirected,
}

/// Classifies a decrypted message.
pub fn classify(plaintext: &str) -> Inbound<'_> {
    let Some(rest) = plaintext.strip_prefix(DIRECTED_PREFIX) else {
        return Inbound::Broadcast(plaintext);
    };

    match rest.split_once(' ') {
        Some((target, body)) if !target.is_empty() && !body.trim().is_empty() => {
            Inbound::Directed { target, body }
        }
        _ => Inbound::BadDirected,
    }
}

/// Client-side text for a directed message.
pub fn directed(target: &str, body: &str) -> String {
    format!("{}{} {}", DIRECTED_PREFIX, target, body)
}

/// `[sender]: text`, as seen by the other members.
pub fn broadcast_line(sender: &str, text: &str) -> String {
    format!("[{}]: {}", sender, text)
}

/// Directed message as seen by its recipient.
pub fn private_line(sender: &str, body: &str) -> String {
    format!("[PRIVATE from {}]: {}", sender, body)
}

/// Announces a new member.
pub fn joined_notice(username: &str) -> String {
    format!("{} {} joined the room", SYSTEM_PREFIX, username)
}

/// Announces a departure.
pub fn left_notice(username: &str) -> String {
    format!("{} {} left the room", SYSTEM_PREFIX, username)
}

/// Tells the sender a directed message was delivered.
pub fn private_sent_ack(target: &str) -> String {
    format!("{} Private message sent to {}", SYSTEM_PREFIX, target)
}

/// Tells the sender nobody by that name is connected.
pub fn user_not_found(target: &str) -> String {
    format!("{} User {} not found", SYSTEM_PREFIX, target)
}

/// Reply to an `@` message lacking a target or a body.
pub fn usage_notice() -> String {
    format!("{} Usage: @<user> <message>", SYSTEM_PREFIX)
}

/// Sent to every member when the server shuts down.
pub fn termination_notice(port: u16) -> String {
    format!("{}: The room port {} has been terminated", SYSTEM_PREFIX, port)
}

/// `Connected: a, b | Created: c, d`
pub fn roster_line<A, K>(connected: A, known: K) -> String
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    K: IntoIterator,
    K::Item: AsRef<str>,
{
    fn join<I>(names: I) -> String
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        names
            .into_iter()
            .map(|n| n.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    format!("Connected: {} | Created: {}", join(connected), join(known))
}

/// True if `text` answers a directed message.
pub fn is_directed_ack(text: &str) -> bool {
    let Some(rest) = text.strip_prefix(SYSTEM_PREFIX) else {
        return false;
    };
    let rest = rest.trim_start();
    rest.starts_with("Private message sent to ")
        || (rest.starts_with("User ") && rest.ends_with(" not found"))
        || rest.starts_with("Usage: ")
}
