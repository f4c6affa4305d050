//! LSB (Least Significant Bit) steganography for images.
//!
//! Hides data in the least significant bit of the red, green and blue
//! channels of each pixel, in raster order. Alpha is never touched.
//! Output must be written in a lossless format.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Pixel};

use crate::crypto::Secret;

use super::error::StegoError;
use super::payload::{self, HiddenMessage};

/// Color channels carrying payload bits in each pixel.
const CHANNELS_PER_PIXEL: usize = 3;

/// Image steganography handler.
#[derive(Debug, Clone)]
pub struct ImageStego {
    image: DynamicImage,
}

impl ImageStego {
    /// Creates a new ImageStego from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StegoError> {
        let image = image::open(path).map_err(|e| StegoError::ImageLoad(e.to_string()))?;
        Ok(Self { image })
    }

    /// Creates a new ImageStego from encoded image bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StegoError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| StegoError::ImageLoad(e.to_string()))?;
        Ok(Self { image })
    }

    /// Creates a new ImageStego from a DynamicImage.
    pub fn from_image(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of payload bits the image can carry.
    pub fn capacity_bits(&self) -> usize {
        let (width, height) = self.image.dimensions();
        (width as usize) * (height as usize) * CHANNELS_PER_PIXEL
    }

    /// Maximum payload in bytes, marker and tag overhead included.
    pub fn capacity(&self) -> usize {
        self.capacity_bits() / 8
    }

    /// Hides `data` in a copy of the image.
    ///
    /// With a secret the payload is encrypted and tagged first. Fails when
    /// the framed payload needs more bits than the image has channels.
    pub fn embed(&self, data: &[u8], secret: Option<&Secret>) -> Result<DynamicImage, StegoError> {
        let framed = payload::frame(data, secret);
        let total_bits = framed.len() * 8;

        if total_bits > self.capacity_bits() {
            return Err(StegoError::Capacity {
                needed: framed.len(),
                capacity: self.capacity(),
            });
        }

        let output = if self.image.color().has_alpha() {
            let mut rgba = self.image.to_rgba8();
            write_bits(&mut rgba, &framed);
            DynamicImage::ImageRgba8(rgba)
        } else {
            let mut rgb = self.image.to_rgb8();
            write_bits(&mut rgb, &framed);
            DynamicImage::ImageRgb8(rgb)
        };

        Ok(output)
    }

    /// Recovers a hidden message.
    ///
    /// Tagged payloads are decrypted when `secret` is given and returned
    /// still sealed otherwise.
    pub fn extract(&self, secret: Option<&Secret>) -> Result<HiddenMessage, StegoError> {
        let rgba = self.image.to_rgba8();
        let bits = rgba.pixels().flat_map(|pixel| {
            let [r, g, b, _] = pixel.0;
            [r & 1, g & 1, b & 1]
        });

        let stream = payload::pack_bits(bits);
        payload::unframe(&stream, secret)
    }

    /// Saves the image; only lossless formats are accepted.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StegoError> {
        save_lossless(&self.image, path)
    }

    /// Returns the image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, StegoError> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| StegoError::ImageSave(e.to_string()))?;
        Ok(bytes)
    }

    /// Returns a reference to the underlying image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Consumes self and returns the underlying image.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Writes `image` to `path`, refusing formats that would destroy LSBs.
pub fn save_lossless<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<(), StegoError> {
    let path = path.as_ref();
    let format =
        ImageFormat::from_path(path).map_err(|e| StegoError::ImageSave(e.to_string()))?;

    match format {
        ImageFormat::Png
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::Tga
        | ImageFormat::Pnm => image
            .save_with_format(path, format)
            .map_err(|e| StegoError::ImageSave(e.to_string())),
        other => Err(StegoError::LossyFormat(format!("{:?}", other))),
    }
}

fn write_bits<P>(buffer: &mut ImageBuffer<P, Vec<u8>>, framed: &[u8])
where
    P: Pixel<Subpixel = u8>,
{
    let total_bits = framed.len() * 8;
    let mut bit_index = 0;

    for pixel in buffer.pixels_mut() {
        if bit_index >= total_bits {
            break;
        }
        for channel in pixel.channels_mut().iter_mut().take(CHANNELS_PER_PIXEL) {
            if bit_index >= total_bits {
                break;
            }
            *channel = (*channel & 0xFE) | payload::bit_at(framed, bit_index);
            bit_index += 1;
        }
    }
}
