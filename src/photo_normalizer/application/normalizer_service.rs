use std::sync::Arc;
use super::error::ApplicationError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::budget::{EncodingBudget, Quality, RenderSize};
use crate::domain::image::{NormalizedImage, RawImageInput};
use crate::domain::image_processor_trait::ImageProcessor;
use crate::infrastructure::error::InfrastructureError;

/// Turns an arbitrary raster image into a JPEG that fits an [`EncodingBudget`].
///
/// The search is two-level: the quality ladder (0.9 down to 0.1) is the inner
/// loop, and shrinking both sides by 0.9 is the outer loop, which stops once
/// either side is at or below 200px.
pub struct NormalizerService {
    image_processor: Arc<dyn ImageProcessor + Send + Sync>,
}

impl NormalizerService {
    pub fn new(image_processor: Arc<dyn ImageProcessor + Send + Sync>) -> Self {
        Self { image_processor }
    }

    pub async fn normalize(
        &self,
        input: RawImageInput,
        budget: EncodingBudget,
        cancel: &CancellationToken,
    ) -> Result<NormalizedImage, ApplicationError> {
        checkpoint(cancel)?;
        let processor = Arc::clone(&self.image_processor);
        // 元のバイト列はデコードのタスク内で破棄される
        let source = off_executor(move || processor.decode(&input))
            .await?
            .map_err(|e| ApplicationError::Decode(e.to_string()))?;
        let source = Arc::new(source);

        let mut size = RenderSize::clamped(source.width(), source.height(), budget.max_dimension_px());
        debug!(
            source_width = source.width(),
            source_height = source.height(),
            width = size.width(),
            height = size.height(),
            clamped = !size.is_source_size(),
            "decoded image"
        );

        loop {
            checkpoint(cancel)?;
            let processor = Arc::clone(&self.image_processor);
            let render_source = Arc::clone(&source);
            let (width, height) = (size.width(), size.height());
            let surface = Arc::new(off_executor(move || processor.render(&render_source, width, height)).await??);

            let mut quality = Quality::START;
            let smallest_size = loop {
                checkpoint(cancel)?;
                let processor = Arc::clone(&self.image_processor);
                let encode_surface = Arc::clone(&surface);
                let encoded = off_executor(move || processor.encode_jpeg(&encode_surface, quality)).await??;
                let encoded_size = encoded.len();
                debug!(%quality, width = size.width(), height = size.height(), encoded_size, "encoded attempt");

                if budget.fits(encoded_size) {
                    info!(
                        %quality,
                        width = size.width(),
                        height = size.height(),
                        encoded_size,
                        max_bytes = budget.max_bytes(),
                        "image normalized"
                    );
                    return Ok(NormalizedImage::new(encoded, size.width(), size.height(), quality));
                }
                match quality.step_down() {
                    Some(next) => quality = next,
                    None => break encoded_size,
                }
            };

            if !size.can_shrink() {
                return Err(ApplicationError::BudgetUnreachable {
                    max_bytes: budget.max_bytes(),
                    smallest_size,
                    width: size.width(),
                    height: size.height(),
                });
            }
            size = size.shrunk();
        }
    }
}

// 各ステップの前にキャンセルを確認する
fn checkpoint(cancel: &CancellationToken) -> Result<(), ApplicationError> {
    if cancel.is_cancelled() {
        return Err(ApplicationError::Cancelled);
    }
    Ok(())
}

// Decode, resize and encode are CPU-bound; run them on the blocking pool so
// the async workers stay free for other requests.
async fn off_executor<R, F>(work: F) -> Result<R, InfrastructureError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::{AVATAR_MAX_DIMENSION_PX, DEFAULT_MAX_BYTES};
    use crate::infrastructure::image_processor::DefaultImageProcessor;
    use crate::test_support::{gradient_image, jpeg_input, noise_image, png_input, solid_image};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    // 手動モック: エンコード後のサイズを (幅, 高さ, 品質) から決める
    struct MockImageProcessor {
        source_dimensions: Option<(u32, u32)>,
        size_of: Box<dyn Fn(u32, u32, Quality) -> usize + Send + Sync>,
        renders: Mutex<Vec<(u32, u32)>>,
        encodes: Mutex<Vec<(u32, u32, Quality)>>,
        cancel_after_encodes: Option<(usize, CancellationToken)>,
        // エンコード開始を知らせ、解放されるまで待つ
        encode_gate: Option<EncodeGate>,
    }

    struct EncodeGate {
        started: Mutex<Option<oneshot::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl MockImageProcessor {
        fn new(
            source_dimensions: Option<(u32, u32)>,
            size_of: impl Fn(u32, u32, Quality) -> usize + Send + Sync + 'static,
        ) -> Self {
            Self {
                source_dimensions,
                size_of: Box::new(size_of),
                renders: Mutex::new(Vec::new()),
                encodes: Mutex::new(Vec::new()),
                cancel_after_encodes: None,
                encode_gate: None,
            }
        }
    }

    impl ImageProcessor for MockImageProcessor {
        fn decode(&self, _input: &RawImageInput) -> Result<DynamicImage, InfrastructureError> {
            match self.source_dimensions {
                Some((w, h)) => Ok(DynamicImage::new_rgb8(w, h)),
                None => Err(InfrastructureError::DecodingError("mock decode failure".to_string())),
            }
        }

        fn render(&self, _source: &DynamicImage, width: u32, height: u32) -> Result<RgbImage, InfrastructureError> {
            self.renders.lock().unwrap().push((width, height));
            Ok(RgbImage::new(width, height))
        }

        fn encode_jpeg(&self, surface: &RgbImage, quality: Quality) -> Result<Vec<u8>, InfrastructureError> {
            if let Some(gate) = &self.encode_gate {
                if let Some(started) = gate.started.lock().unwrap().take() {
                    let _ = started.send(());
                }
                gate.release
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|_| InfrastructureError::ImageProcessingError("encoder blocked the runtime".to_string()))?;
            }
            let mut encodes = self.encodes.lock().unwrap();
            encodes.push((surface.width(), surface.height(), quality));
            if let Some((limit, token)) = &self.cancel_after_encodes {
                if encodes.len() >= *limit {
                    token.cancel();
                }
            }
            Ok(vec![0; (self.size_of)(surface.width(), surface.height(), quality)])
        }
    }

    fn service(processor: &Arc<MockImageProcessor>) -> NormalizerService {
        NormalizerService::new(processor.clone())
    }

    fn raw() -> RawImageInput {
        RawImageInput::new(vec![1, 2, 3], "image/png")
    }

    fn budget(max_bytes: usize, max_dimension_px: u32) -> EncodingBudget {
        EncodingBudget::new(max_bytes, max_dimension_px).unwrap()
    }

    #[tokio::test]
    async fn test_first_attempt_fits() {
        let processor = Arc::new(MockImageProcessor::new(Some((50, 50)), |_, _, _| 100));
        let image = service(&processor)
            .normalize(raw(), budget(DEFAULT_MAX_BYTES, 800), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.quality, Quality::START);
        assert_eq!((image.width, image.height), (50, 50));
        assert_eq!(*processor.encodes.lock().unwrap(), vec![(50, 50, Quality::START)]);
        assert_eq!(*processor.renders.lock().unwrap(), vec![(50, 50)]);
    }

    #[tokio::test]
    async fn test_quality_steps_down_until_it_fits() {
        // 品質 0.x → x * 100 バイト
        let processor = Arc::new(MockImageProcessor::new(Some((300, 300)), |_, _, q| {
            usize::from(q.tenths()) * 100
        }));
        let image = service(&processor)
            .normalize(raw(), budget(450, 800), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.quality.tenths(), 4);
        assert_eq!(image.encoded_byte_size, 400);
        let tried: Vec<u8> = processor.encodes.lock().unwrap().iter().map(|(_, _, q)| q.tenths()).collect();
        assert_eq!(tried, vec![9, 8, 7, 6, 5, 4]);
        assert_eq!(processor.renders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lowest_quality_tried_is_exactly_0_1() {
        let processor = Arc::new(MockImageProcessor::new(Some((300, 300)), |w, _, q| {
            if w == 300 && q == Quality::FLOOR { 10 } else { 1000 }
        }));
        let image = service(&processor)
            .normalize(raw(), budget(10, 800), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.quality, Quality::FLOOR);
        assert_eq!((image.width, image.height), (300, 300));
        assert_eq!(processor.encodes.lock().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_shrinks_after_quality_floor_and_restarts_ladder() {
        let processor = Arc::new(MockImageProcessor::new(Some((1000, 500)), |w, h, q| {
            (w * h) as usize / 100 + usize::from(q.tenths())
        }));
        // 1000x500 は何をしても 5000 バイト超。900x450 なら 0.9 で 4059 バイト
        let image = service(&processor)
            .normalize(raw(), budget(4100, 1000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((image.width, image.height), (900, 450));
        assert_eq!(image.quality, Quality::START);
        assert_eq!(*processor.renders.lock().unwrap(), vec![(1000, 500), (900, 450)]);
        let encodes = processor.encodes.lock().unwrap();
        assert_eq!(encodes.len(), 10);
        assert_eq!(encodes[8], (1000, 500, Quality::FLOOR));
        assert_eq!(encodes[9], (900, 450, Quality::START));
    }

    #[tokio::test]
    async fn test_clamp_happens_once_before_encoding() {
        let processor = Arc::new(MockImageProcessor::new(Some((4000, 3000)), |_, _, _| 1));
        let image = service(&processor)
            .normalize(raw(), budget(DEFAULT_MAX_BYTES, AVATAR_MAX_DIMENSION_PX), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((image.width, image.height), (800, 600));
        assert_eq!(*processor.renders.lock().unwrap(), vec![(800, 600)]);
    }

    #[tokio::test]
    async fn test_unreachable_budget_stops_at_dimension_floor() {
        let processor = Arc::new(MockImageProcessor::new(Some((400, 400)), |_, _, _| 500));
        let result = service(&processor)
            .normalize(raw(), budget(100, 800), &CancellationToken::new())
            .await;

        match result {
            Err(ApplicationError::BudgetUnreachable { max_bytes, smallest_size, width, height }) => {
                assert_eq!(max_bytes, 100);
                assert_eq!(smallest_size, 500);
                assert_eq!((width, height), (191, 191));
            }
            other => panic!("Expected BudgetUnreachable, got {:?}", other),
        }
        // 400 から 7 回縮小、各サイズで 9 段の品質
        assert_eq!(processor.renders.lock().unwrap().len(), 8);
        assert_eq!(processor.encodes.lock().unwrap().len(), 8 * 9);
    }

    #[tokio::test]
    async fn test_decode_failure_happens_before_any_render() {
        let processor = Arc::new(MockImageProcessor::new(None, |_, _, _| 1));
        let result = service(&processor)
            .normalize(raw(), budget(DEFAULT_MAX_BYTES, 800), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ApplicationError::Decode(_))));
        assert!(processor.renders.lock().unwrap().is_empty());
        assert!(processor.encodes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let processor = Arc::new(MockImageProcessor::new(Some((50, 50)), |_, _, _| 1));
        let token = CancellationToken::new();
        token.cancel();
        let result = service(&processor).normalize(raw(), budget(10, 800), &token).await;

        assert!(matches!(result, Err(ApplicationError::Cancelled)));
        assert!(processor.encodes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_quality_steps() {
        let token = CancellationToken::new();
        let mut mock = MockImageProcessor::new(Some((300, 300)), |_, _, _| 1000);
        mock.cancel_after_encodes = Some((3, token.clone()));
        let processor = Arc::new(mock);

        let result = service(&processor).normalize(raw(), budget(10, 800), &token).await;

        assert!(matches!(result, Err(ApplicationError::Cancelled)));
        assert_eq!(processor.encodes.lock().unwrap().len(), 3);
    }

    // ランタイムは 1 スレッドのみ。エンコードがその上で動くと解放役のタスクが動けない
    #[tokio::test(flavor = "current_thread")]
    async fn test_encoding_leaves_the_runtime_free() {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut mock = MockImageProcessor::new(Some((50, 50)), |_, _, _| 1);
        mock.encode_gate = Some(EncodeGate {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
        });
        let processor = Arc::new(mock);

        let releaser = tokio::spawn(async move {
            started_rx.await.unwrap();
            release_tx.send(()).unwrap();
        });
        let image = service(&processor)
            .normalize(raw(), budget(DEFAULT_MAX_BYTES, 800), &CancellationToken::new())
            .await
            .unwrap();

        releaser.await.unwrap();
        assert_eq!(image.quality, Quality::START);
        assert_eq!(processor.encodes.lock().unwrap().len(), 1);
    }

    // 以下は実際のエンコーダを使う
    fn real_service() -> NormalizerService {
        NormalizerService::new(Arc::new(DefaultImageProcessor::new()))
    }

    #[tokio::test]
    async fn test_large_photo_fits_avatar_budget() {
        let photo = DynamicImage::ImageRgb8(gradient_image(4000, 3000));
        let image = real_service()
            .normalize(jpeg_input(&photo), budget(DEFAULT_MAX_BYTES, AVATAR_MAX_DIMENSION_PX), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.mime_type, "image/jpeg");
        assert!(image.width.max(image.height) <= AVATAR_MAX_DIMENSION_PX);
        assert_eq!((image.width, image.height), (800, 600));
        assert!(image.encoded_byte_size <= DEFAULT_MAX_BYTES);
        assert_eq!(image.encoded_byte_size, image.data.len());
        let ratio = f64::from(image.width) / f64::from(image.height);
        assert!((ratio - 4000.0 / 3000.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_solid_square_fits_on_first_attempt() {
        let square = DynamicImage::ImageRgb8(solid_image(50, 50, Rgb([30, 144, 255])));
        let image = real_service()
            .normalize(png_input(&square), budget(DEFAULT_MAX_BYTES, 800), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.quality, Quality::START);
        assert_eq!((image.width, image.height), (50, 50));
    }

    #[tokio::test]
    async fn test_noise_with_tiny_budget_is_unreachable() {
        let noise = DynamicImage::ImageRgb8(noise_image(400, 400, 7));
        let result = real_service()
            .normalize(png_input(&noise), budget(100, 800), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ApplicationError::BudgetUnreachable { max_bytes: 100, .. })));
    }

    // 実エンコーダで 0.1 のサイズを測り、それより 1 バイト小さい予算にする
    fn floor_size(source: &DynamicImage, quality: Quality) -> usize {
        let processor = DefaultImageProcessor::new();
        let surface = processor.render(source, source.width(), source.height()).unwrap();
        processor.encode_jpeg(&surface, quality).unwrap().len()
    }

    #[tokio::test]
    async fn test_noise_gets_squeezed_under_budget() {
        let noise = DynamicImage::ImageRgb8(noise_image(600, 400, 11));
        let max_bytes = floor_size(&noise, Quality::FLOOR) - 1;
        let image = real_service()
            .normalize(png_input(&noise), budget(max_bytes, 800), &CancellationToken::new())
            .await
            .unwrap();

        assert!(image.encoded_byte_size <= max_bytes);
        assert!(image.width < 600);
        let ratio = f64::from(image.width) / f64::from(image.height);
        assert!((ratio - 1.5).abs() < 1.5 / f64::from(image.height));
    }

    #[tokio::test]
    async fn test_same_input_gives_same_output() {
        let noise = DynamicImage::ImageRgb8(noise_image(300, 200, 5));
        let limits = budget(floor_size(&noise, Quality::START) / 2, 800);
        let input = png_input(&noise);
        let service = real_service();

        let first = service.normalize(input.clone(), limits, &CancellationToken::new()).await.unwrap();
        let second = service.normalize(input, limits, &CancellationToken::new()).await.unwrap();
        assert_eq!(first, second);
        assert!(first.encoded_byte_size <= limits.max_bytes());
    }

    #[tokio::test]
    async fn test_corrupt_bytes_are_a_decode_error() {
        let result = real_service()
            .normalize(
                RawImageInput::new(b"definitely not an image".to_vec(), "image/jpeg"),
                budget(DEFAULT_MAX_BYTES, 800),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ApplicationError::Decode(_))));
    }
}
