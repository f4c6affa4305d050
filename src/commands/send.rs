//! Send command - deliver one message and disconnect.

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::relay::send_once;

use super::{load_profile, runtime, CommandExecutor, ConnectArgs, KeyArgs};

/// Username used when neither --user nor a saved profile provides one.
const DEFAULT_SENDER: &str = "anonymous";

/// Send a single message to a room.
#[derive(Args, Debug)]
pub struct SendCommand {
    /// Message text
    #[arg(short, long)]
    pub message: String,

    /// Send to everyone in the room
    #[arg(long, conflicts_with = "to", required_unless_present = "to")]
    pub all: bool,

    /// Send only to this user
    #[arg(long)]
    pub to: Option<String>,

    /// Username to send as (default: saved profile)
    #[arg(short, long)]
    pub user: Option<String>,

    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub keys: KeyArgs,
}

impl CommandExecutor for SendCommand {
    fn execute(&self) -> Result<()> {
        let profile = load_profile();
        let config = self.connect.relay_config(profile.as_ref())?;
        let secret = self.keys.secret_or_profile(profile.as_ref())?;
        let user = self
            .user
            .clone()
            .or_else(|| profile.as_ref().and_then(|p| p.username.clone()))
            .unwrap_or_else(|| DEFAULT_SENDER.to_string());

        let rt = runtime()?;
        let ack = rt
            .block_on(send_once(
                &config,
                secret,
                &user,
                &self.message,
                self.to.as_deref(),
            ))
            .with_context(|| format!("Failed to send to {}", config.address()))?;

        match ack {
            Some(ack) => println!("{}", ack),
            None => println!("Message sent to everyone on {}.", config.address()),
        }
        Ok(())
    }
}
