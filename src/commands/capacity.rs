//! Capacity command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::stego::{ImageStego, END_MARKER};

use super::CommandExecutor;

/// Show how much an image can hide.
#[derive(Args, Debug)]
pub struct CapacityCommand {
    /// Image to inspect
    #[arg(short, long)]
    pub image: PathBuf,
}

impl CommandExecutor for CapacityCommand {
    fn execute(&self) -> Result<()> {
        let stego = ImageStego::from_file(&self.image)
            .with_context(|| format!("Failed to open {}", self.image.display()))?;
        let (width, height) = stego.dimensions();

        println!("Image:     {} ({}x{})", self.image.display(), width, height);
        println!("Capacity:  {} bytes", stego.capacity());
        println!(
            "Plain:     up to {} message bytes",
            stego.capacity().saturating_sub(END_MARKER.len())
        );
        Ok(())
    }
}
