//! List command - show who is in a room.

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::relay::request_roster;

use super::{load_profile, runtime, CommandExecutor, ConnectArgs, KeyArgs};

/// List connected and known users of a room.
#[derive(Args, Debug)]
pub struct ListCommand {
    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub keys: KeyArgs,
}

impl CommandExecutor for ListCommand {
    fn execute(&self) -> Result<()> {
        let profile = load_profile();
        let config = self.connect.relay_config(profile.as_ref())?;
        let secret = self.keys.secret_or_profile(profile.as_ref())?;

        let rt = runtime()?;
        let roster = rt
            .block_on(request_roster(&config, &secret))
            .with_context(|| format!("Failed to query {}", config.address()))?;

        println!("{}", roster);
        Ok(())
    }
}
