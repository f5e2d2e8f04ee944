use crate::domain::budget::Quality;
use crate::domain::image::RawImageInput;
use crate::infrastructure::error::InfrastructureError;
use image::{DynamicImage, RgbImage};

// デコード・描画・エンコードの3段階。探索ループ自体はアプリケーション層が持つ
pub trait ImageProcessor {
    fn decode(&self, input: &RawImageInput) -> Result<DynamicImage, InfrastructureError>;

    // アルファは不透明な背景に合成される (JPEG は透過を持てない)
    fn render(
        &self,
        source: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, InfrastructureError>;

    fn encode_jpeg(&self, surface: &RgbImage, quality: Quality) -> Result<Vec<u8>, InfrastructureError>;
}
