//! Join command - interactive room session.

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::BufReader;

use ghostwire::relay::RelayClient;
use ghostwire::store::Profile;

use super::{load_profile, runtime, save_profile, CommandExecutor, ConnectArgs, KeyArgs};

/// Join a room and chat interactively.
///
/// Lines you type go to everyone; `@name message` goes only to `name`.
/// `/stealth`, `/extract` and `/help` run locally. Type `quit` to leave.
#[derive(Args, Debug)]
pub struct JoinCommand {
    /// Your username in the room
    #[arg(short, long)]
    pub user: String,

    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub keys: KeyArgs,
}

impl CommandExecutor for JoinCommand {
    fn execute(&self) -> Result<()> {
        let profile = load_profile();
        let config = self.connect.relay_config(profile.as_ref())?;
        let secret = self.keys.secret_or_profile(profile.as_ref())?;

        let rt = runtime()?;
        rt.block_on(async {
            let client = RelayClient::connect(&config, secret.clone(), &self.user)
                .await
                .with_context(|| format!("Failed to join {}", config.address()))?;

            save_profile(&Profile::new(&config, &secret, Some(client.username())));

            println!("Joined {} as {}.", config.address(), client.username());
            println!(
                "Type a message to send to everyone, @user <message> for private, /help for commands, '{}' to leave.",
                config.exit_keyword
            );

            let stdin = BufReader::new(tokio::io::stdin());
            client.run_interactive(stdin, tokio::io::stdout()).await?;

            println!("Disconnected.");
            Ok(())
        })
    }
}
