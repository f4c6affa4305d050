//! Ghostwire - encrypted rooms and hidden messages
//!
//! A CLI for hosting and joining encrypted relay rooms, and for hiding
//! messages in images, all keyed by the same three shared fragments.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    CapacityCommand, CommandExecutor, EmbedCommand, ExtractCommand, JoinCommand, ListCommand,
    SendCommand, ServeCommand,
};

/// Ghostwire - encrypted rooms and hidden messages
///
/// Everyone holding the same three key fragments shares one secret. Use it to
/// talk through a relay or to hide messages in images.
#[derive(Parser)]
#[command(name = "ghostwire")]
#[command(version)]
#[command(about = "Encrypted group relay and image steganography")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a relay room
    Serve(ServeCommand),

    /// Join a room interactively
    Join(JoinCommand),

    /// Send one message to a room
    Send(SendCommand),

    /// List users of a room
    List(ListCommand),

    /// Hide a message in an image
    Embed(EmbedCommand),

    /// Recover a message from an image
    Extract(ExtractCommand),

    /// Show how much an image can hide
    Capacity(CapacityCommand),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(cmd) => cmd.execute(),
        Commands::Join(cmd) => cmd.execute(),
        Commands::Send(cmd) => cmd.execute(),
        Commands::List(cmd) => cmd.execute(),
        Commands::Embed(cmd) => cmd.execute(),
        Commands::Extract(cmd) => cmd.execute(),
        Commands::Capacity(cmd) => cmd.execute(),
    }
}
