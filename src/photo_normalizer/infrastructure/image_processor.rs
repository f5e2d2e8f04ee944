use crate::domain::budget::Quality;
use crate::domain::image::RawImageInput;
use crate::domain::image_processor_trait::ImageProcessor;
use super::error::InfrastructureError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;

pub struct DefaultImageProcessor {
    background: Rgb<u8>,
    filter: FilterType,
}

impl DefaultImageProcessor {
    // canvas の JPEG 書き出しと同じく、透過部分は黒になる
    pub fn new() -> Self {
        Self::with_background(Rgb([0, 0, 0]))
    }

    pub fn with_background(background: Rgb<u8>) -> Self {
        Self {
            background,
            filter: FilterType::Triangle,
        }
    }
}

impl Default for DefaultImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProcessor for DefaultImageProcessor {
    fn decode(&self, input: &RawImageInput) -> Result<DynamicImage, InfrastructureError> {
        if input.bytes().is_empty() {
            return Err(InfrastructureError::DecodingError("input is empty".to_string()));
        }
        // 宣言された mime は信用せず、中身から判定する
        let reader = image::io::Reader::new(Cursor::new(input.bytes()))
            .with_guessed_format()
            .map_err(InfrastructureError::IoError)?;
        let format = reader.format().ok_or_else(|| {
            InfrastructureError::DecodingError(format!(
                "unrecognized image format (declared as {})",
                input.mime_type()
            ))
        })?;
        debug!(?format, declared = input.mime_type(), bytes = input.byte_len(), "decoding image");
        Ok(reader.decode()?)
    }

    fn render(
        &self,
        source: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, InfrastructureError> {
        if width == 0 || height == 0 {
            return Err(InfrastructureError::ImageProcessingError(format!(
                "cannot render a {}x{} surface",
                width, height
            )));
        }
        if source.width() == width && source.height() == height {
            return Ok(flatten(source, self.background));
        }
        let resized = source.resize_exact(width, height, self.filter);
        Ok(flatten(&resized, self.background))
    }

    fn encode_jpeg(&self, surface: &RgbImage, quality: Quality) -> Result<Vec<u8>, InfrastructureError> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.jpeg_quality());
        encoder.encode(surface.as_raw(), surface.width(), surface.height(), ColorType::Rgb8)?;
        Ok(buffer)
    }
}

fn flatten(image: &DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |channel: u8, back: u8| {
            ((u16::from(channel) * alpha + u16::from(back) * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}
