//! Slash commands handled by the interactive client.
//!
//! A line whose first word names a registered command (`/stealth`,
//! `/extract`, `/help`) runs locally and is never sent to the room. Other
//! lines, including unknown `/words`, go to the room as usual.

use std::path::Path;

use crate::crypto::Secret;
use crate::stego::{save_lossless, HiddenMessage, ImageStego};

/// Trait for in-room commands (Strategy pattern).
pub trait RoomCommand: Send + Sync {
    /// Command name without the slash.
    fn name(&self) -> &'static str;

    /// Argument synopsis shown in usage errors and help.
    fn usage(&self) -> &'static str;

    /// Short description for help.
    fn description(&self) -> &'static str;

    /// Runs the command. `args` is the raw text after the command name.
    /// Returns the lines to show the user.
    fn execute(&self, args: &str, room_secret: &Secret) -> Vec<String>;
}

/// The key a command was given, or the room secret when none was.
fn key_or_room(key: Option<&str>, room_secret: &Secret) -> (Secret, &'static str) {
    match key {
        Some(key) => (Secret::from_passphrase(key), "the given key"),
        None => (room_secret.clone(), "the room key"),
    }
}

fn usage_line(command: &dyn RoomCommand) -> String {
    format!("Usage: /{} {}", command.name(), command.usage())
}

/// Arguments of `/stealth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthArgs<'a> {
    pub image: &'a str,
    pub message: &'a str,
    pub output: &'a str,
    pub key: Option<&'a str>,
    pub target: Option<&'a str>,
}

/// Why `/stealth` arguments were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealthParseError {
    Usage,
    Unquoted,
}

/// Parses `<image> "<message>" <output> [key] [@user|@all]`.
///
/// After the output path, a word starting with `@` is the target and any
/// other word is the key, in either order.
pub fn parse_stealth(args: &str) -> Result<StealthArgs<'_>, StealthParseError> {
    let args = args.trim();
    let Some(open) = args.find('"') else {
        return Err(if args.split_whitespace().count() < 3 {
            StealthParseError::Usage
        } else {
            StealthParseError::Unquoted
        });
    };
    let close = args[open + 1..]
        .find('"')
        .map(|i| open + 1 + i)
        .ok_or(StealthParseError::Unquoted)?;

    let image = args[..open].trim();
    if image.is_empty() || image.contains(char::is_whitespace) {
        return Err(StealthParseError::Usage);
    }
    let message = &args[open + 1..close];

    let mut rest = args[close + 1..].split_whitespace();
    let output = rest.next().ok_or(StealthParseError::Usage)?;

    let mut key = None;
    let mut target = None;
    for word in rest {
        let slot = if word.starts_with('@') { &mut target } else { &mut key };
        if slot.replace(word).is_some() {
            return Err(StealthParseError::Usage);
        }
    }

    Ok(StealthArgs {
        image,
        message,
        output,
        key,
        target,
    })
}

/// Hide a message in an image.
pub struct StealthCommand;

impl RoomCommand for StealthCommand {
    fn name(&self) -> &'static str {
        "stealth"
    }

    fn usage(&self) -> &'static str {
        "<image> \"<message>\" <output.png> [key] [@user|@all]"
    }

    fn description(&self) -> &'static str {
        "Hide a message in an image (room key unless a key is given)"
    }

    fn execute(&self, args: &str, room_secret: &Secret) -> Vec<String> {
        let parsed = match parse_stealth(args) {
            Ok(parsed) => parsed,
            Err(StealthParseError::Usage) => return vec![usage_line(self)],
            Err(StealthParseError::Unquoted) => {
                return vec!["Message must be in quotes".to_string()]
            }
        };
        if !Path::new(parsed.image).exists() {
            return vec![format!("Error: image file {} not found", parsed.image)];
        }

        let (secret, key_source) = key_or_room(parsed.key, room_secret);
        let result = ImageStego::from_file(parsed.image)
            .and_then(|cover| cover.embed(parsed.message.as_bytes(), Some(&secret)))
            .and_then(|stego| save_lossless(&stego, parsed.output));
        if let Err(e) = result {
            return vec![format!("Error: {}", e)];
        }

        let mut lines = vec![
            format!("Hid {} bytes in {}", parsed.message.len(), parsed.output),
            format!("Encrypted with {}", key_source),
        ];
        match parsed.target {
            None | Some("@all") => lines.push(format!("Send {} to everyone", parsed.output)),
            Some(target) => lines.push(format!(
                "Send {} to {}",
                parsed.output,
                target.trim_start_matches('@')
            )),
        }
        lines
    }
}

/// Recover a message from an image.
pub struct ExtractCommand;

impl RoomCommand for ExtractCommand {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn usage(&self) -> &'static str {
        "<image> [key]"
    }

    fn description(&self) -> &'static str {
        "Recover a hidden message (room key unless a key is given)"
    }

    fn execute(&self, args: &str, room_secret: &Secret) -> Vec<String> {
        let mut words = args.split_whitespace();
        let (Some(image), key, None) = (words.next(), words.next(), words.next()) else {
            return vec![usage_line(self)];
        };
        if !Path::new(image).exists() {
            return vec![format!("Error: image file {} not found", image)];
        }

        let (secret, key_source) = key_or_room(key, room_secret);
        match ImageStego::from_file(image).and_then(|stego| stego.extract(Some(&secret))) {
            Ok(HiddenMessage::Decrypted(bytes)) => vec![
                "Hidden message:".to_string(),
                String::from_utf8_lossy(&bytes).into_owned(),
                format!("Decrypted with {}", key_source),
            ],
            Ok(message) => vec![
                "Hidden message (not encrypted):".to_string(),
                message.to_string_lossy(),
            ],
            Err(e) => vec![format!("Error: {}", e)],
        }
    }
}

/// List the in-room commands.
pub struct HelpCommand;

impl RoomCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self) -> &'static str {
        ""
    }

    fn description(&self) -> &'static str {
        "Show this help"
    }

    fn execute(&self, _args: &str, _room_secret: &Secret) -> Vec<String> {
        CommandRegistry::new().help_lines()
    }
}

/// Registry of in-room commands.
pub struct CommandRegistry {
    commands: Vec<Box<dyn RoomCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates a registry with every built-in command.
    pub fn new() -> Self {
        let commands: Vec<Box<dyn RoomCommand>> = vec![
            Box::new(StealthCommand),
            Box::new(ExtractCommand),
            Box::new(HelpCommand),
        ];
        Self { commands }
    }

    /// Finds the command a line invokes, with the text after its name.
    pub fn lookup<'a>(&self, line: &'a str) -> Option<(&dyn RoomCommand, &'a str)> {
        let line = line.trim_start();
        let rest = line.strip_prefix('/')?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));

        self.commands
            .iter()
            .find(|cmd| cmd.name() == name)
            .map(|cmd| (cmd.as_ref(), args))
    }

    /// True if `line` runs locally instead of going to the room.
    pub fn is_local(&self, line: &str) -> bool {
        self.lookup(line).is_some()
    }

    /// Runs `line` if it names a command; `None` means it belongs to the room.
    pub fn execute(&self, line: &str, room_secret: &Secret) -> Option<Vec<String>> {
        self.lookup(line)
            .map(|(cmd, args)| cmd.execute(args, room_secret))
    }

    /// Help text, one line per entry.
    pub fn help_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Commands:".to_string(),
            "  @user <message> - Send a private message".to_string(),
        ];
        for cmd in &self.commands {
            let synopsis = if cmd.usage().is_empty() {
                format!("/{}", cmd.name())
            } else {
                format!("/{} {}", cmd.name(), cmd.usage())
            };
            lines.push(format!("  {} - {}", synopsis, cmd.description()));
        }
        lines
    }
}
