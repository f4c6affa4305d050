//! Extract command - recover a message hidden in an image.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::stego::ImageStego;

use super::{CommandExecutor, KeyArgs};

/// Recover a message hidden with `embed`.
#[derive(Args, Debug)]
pub struct ExtractCommand {
    /// Image holding the message
    #[arg(short, long)]
    pub image: PathBuf,

    /// Write the raw message bytes to this file instead of printing
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub keys: KeyArgs,
}

impl CommandExecutor for ExtractCommand {
    fn execute(&self) -> Result<()> {
        let secret = self.keys.secret()?;
        let stego = ImageStego::from_file(&self.image)
            .with_context(|| format!("Failed to open {}", self.image.display()))?;

        let message = stego
            .extract(secret.as_ref())
            .context("Failed to extract message")?;

        if message.is_sealed() {
            eprintln!("WARNING: message is encrypted; pass --key1/--key2/--key3 to decrypt it.");
        }

        match &self.output {
            Some(path) => {
                fs::write(path, message.as_bytes())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote {} bytes to {}", message.as_bytes().len(), path.display());
            }
            None => println!("{}", message.to_string_lossy()),
        }
        Ok(())
    }
}
