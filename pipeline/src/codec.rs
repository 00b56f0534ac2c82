//! Image codec seam.
//!
//! The pipeline decides *what* to do with pixels; an [`ImageCodec`] does it.
//! [`RasterCodec`] is backed by the `image` crate.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};

use crate::error::{PipelineError, Result};

/// Output encoding, chosen from the source file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeFormat {
    /// Lossy, honours the profile quality.
    Jpeg,
    /// Lossless.
    Png,
    /// Lossless.
    Tiff,
}

impl EncodeFormat {
    /// Pick the encoder for a source path.
    pub fn for_source(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(PipelineError::UnsupportedFormat(format!(
                "{} ({})",
                if ext.is_empty() { "<none>" } else { ext.as_str() },
                path.display()
            ))),
        }
    }
}

/// Pixel operations consumed by the pipeline.
pub trait ImageCodec: Send + Sync {
    /// Decode the file at `path`.
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Resize to exactly `width` x `height`.
    ///
    /// Aspect ratio is the caller's concern; the pipeline passes a size
    /// already fitted to the bounding box.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, FilterType::Lanczos3)
    }

    /// Centre `image` on a `width` x `height` canvas filled with `fill`.
    fn pad(&self, image: &DynamicImage, width: u32, height: u32, fill: Rgba<u8>) -> DynamicImage {
        let mut canvas = RgbaImage::from_pixel(width, height, fill);
        let x = i64::from(width.saturating_sub(image.width()) / 2);
        let y = i64::from(height.saturating_sub(image.height()) / 2);
        imageops::overlay(&mut canvas, &image.to_rgba8(), x, y);

        let padded = DynamicImage::ImageRgba8(canvas);
        if !image.color().has_alpha() && fill[3] == u8::MAX {
            DynamicImage::ImageRgb8(padded.into_rgb8())
        } else {
            padded
        }
    }

    /// Write `image` to `path`. `quality` applies to JPEG only.
    fn encode(
        &self,
        image: &DynamicImage,
        path: &Path,
        format: EncodeFormat,
        quality: u8,
    ) -> Result<()>;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)
            .map_err(|e| PipelineError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| PipelineError::io(path, e))?;

        reader.decode().map_err(|source| PipelineError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        path: &Path,
        format: EncodeFormat,
        quality: u8,
    ) -> Result<()> {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let encode_err = |source| PipelineError::Encode {
            path: path.to_path_buf(),
            source,
        };

        match format {
            EncodeFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder).map_err(encode_err)?;
            }
            EncodeFormat::Png => {
                image
                    .write_with_encoder(PngEncoder::new(&mut writer))
                    .map_err(encode_err)?;
            }
            EncodeFormat::Tiff => {
                image
                    .write_with_encoder(TiffEncoder::new(&mut writer))
                    .map_err(encode_err)?;
            }
        }

        writer.flush().map_err(|e| PipelineError::io(path, e))
    }
}
