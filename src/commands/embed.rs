//! Embed command - hide a message in an image.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ghostwire::stego::{save_lossless, ImageStego, END_MARKER};

use super::{CommandExecutor, KeyArgs};

/// Hide a message in the pixels of an image.
///
/// With key fragments the message is encrypted before embedding.
/// The output must be a lossless format (png, bmp, tiff, tga, pnm).
#[derive(Args, Debug)]
pub struct EmbedCommand {
    /// Cover image
    #[arg(short, long)]
    pub image: PathBuf,

    /// Message to hide
    #[arg(short, long)]
    pub message: String,

    /// Where to write the resulting image
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub keys: KeyArgs,
}

impl CommandExecutor for EmbedCommand {
    fn execute(&self) -> Result<()> {
        let secret = self.keys.secret()?;
        let stego = ImageStego::from_file(&self.image)
            .with_context(|| format!("Failed to open {}", self.image.display()))?;

        let hidden = stego
            .embed(self.message.as_bytes(), secret.as_ref())
            .context("Failed to embed message")?;
        save_lossless(&hidden, &self.output)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;

        let (width, height) = stego.dimensions();
        println!(
            "Hid {} bytes{} in {} ({}x{}, up to {} bytes).",
            self.message.len(),
            if secret.is_some() { " (encrypted)" } else { "" },
            self.output.display(),
            width,
            height,
            stego.capacity().saturating_sub(END_MARKER.len())
        );
        Ok(())
    }
}
