//! Serve command - host a relay room.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::relay::{HandshakePolicy, RelayConfig, RelayHandle, RelayServer};
use ghostwire::store::{Profile, RosterStore};

use super::{runtime, save_profile, CommandExecutor, KeyArgs};

/// Bind address when neither a flag nor a config file names one.
const SERVE_HOST: &str = "0.0.0.0";

/// Room name when neither a flag nor a config file names one.
const SERVE_ALIAS: &str = "ghostwire";

/// Host a relay room on a TCP port.
///
/// Runs until Ctrl+C (or SIGTERM), then tells every member the room is
/// closing and saves the list of users that joined.
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Port to listen on [default: 2222]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Room name shown in logs and saved in the profile [default: ghostwire]
    #[arg(short, long)]
    pub alias: Option<String>,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Pre-register a username in the roster (repeatable)
    #[arg(long = "create-user")]
    pub create_user: Vec<String>,

    /// Accept clients that skip the handshake, naming them user_<port>
    #[arg(long)]
    pub lenient: bool,

    /// Relay configuration file (TOML); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ServeCommand {
    fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RelayConfig::default()
                .with_host(SERVE_HOST)
                .with_alias(SERVE_ALIAS),
        };

        if let Some(host) = &self.host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(alias) = &self.alias {
            config = config.with_alias(alias.clone());
        }
        if self.lenient {
            config = config.with_handshake_policy(HandshakePolicy::Lenient);
        }
        Ok(config)
    }
}

impl CommandExecutor for ServeCommand {
    fn execute(&self) -> Result<()> {
        let config = self.relay_config()?;
        let secret = self
            .keys
            .secret()?
            .context("serve needs --key1, --key2 and --key3")?;

        let rt = runtime()?;
        rt.block_on(async {
            let server = RelayServer::bind(config.clone(), secret.clone())
                .await
                .context("Failed to start relay")?;
            let addr = server.local_addr()?;
            let server = server
                .with_roster_store(RosterStore::for_port(addr.port())?)
                .await?;

            for name in &self.create_user {
                if server.create_user(name).await {
                    println!("Created user {}", name.trim());
                } else {
                    println!("User {} already known", name.trim());
                }
            }

            let client_host = if config.host == "0.0.0.0" {
                "127.0.0.1".to_string()
            } else {
                config.host.clone()
            };
            let profile_config = config.clone().with_host(client_host).with_port(addr.port());
            save_profile(&Profile::new(&profile_config, &secret, None));

            println!("Relay '{}' listening on {}", config.alias, addr);
            println!("Press Ctrl+C to stop.");

            tokio::spawn(shutdown_on_signal(server.handle()));
            server.run().await?;

            println!("Relay stopped.");
            Ok(())
        })
    }
}

/// Requests shutdown on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_on_signal(handle: RelayHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    log::info!("Shutdown requested");
    handle.shutdown();
}
