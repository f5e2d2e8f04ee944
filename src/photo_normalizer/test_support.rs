use crate::domain::image::RawImageInput;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

// xorshift で決定的なノイズを作る。JPEG にとって最悪のケース
pub fn noise_image(width: u32, height: u32, seed: u32) -> RgbImage {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        Rgb([next(), next(), next()])
    })
}

pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

pub fn solid_image(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
    RgbImage::from_pixel(width, height, color)
}

pub fn png_input(image: &DynamicImage) -> RawImageInput {
    encoded_input(image, ImageFormat::Png, "image/png")
}

pub fn jpeg_input(image: &DynamicImage) -> RawImageInput {
    encoded_input(image, ImageFormat::Jpeg, "image/jpeg")
}

fn encoded_input(image: &DynamicImage, format: ImageFormat, mime_type: &str) -> RawImageInput {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).expect("test image should encode");
    RawImageInput::new(buffer.into_inner(), mime_type)
}
