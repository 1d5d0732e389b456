use crate::common::{CapturedFrame, EncodedImage, ProcessedImage};
use crate::error::AppError;
use crate::pipeline::orchestration::stage::{PipelineStage, StageOutcome, StageReport};
use futures::future::BoxFuture;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::timeout::error::Elapsed;
use tower::timeout::Timeout;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, instrument, warn};

/// Downscales a frame to `max_edge` and JPEG-encodes it on the blocking pool.
#[derive(Debug, Clone)]
pub struct PreprocessingService {
    max_edge: u32,
    quality: u8,
}

impl PreprocessingService {
    pub fn new(max_edge: u32, quality: u8) -> Self {
        Self { max_edge, quality }
    }
}

fn encode(image: &DynamicImage, max_edge: u32, quality: u8) -> Result<EncodedImage, AppError> {
    let resized;
    let source = if image.width().max(image.height()) > max_edge {
        resized = image.resize(max_edge, max_edge, FilterType::Triangle);
        &resized
    } else {
        image
    };
    let rgb = source.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
    Ok(EncodedImage {
        bytes: Arc::from(bytes),
        width: rgb.width(),
        height: rgb.height(),
    })
}

impl Service<CapturedFrame> for PreprocessingService {
    type Response = EncodedImage;
    type Error = AppError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: CapturedFrame) -> Self::Future {
        let image = frame.image().clone();
        let (max_edge, quality) = (self.max_edge, self.quality);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || encode(&image, max_edge, quality))
                .await
                .map_err(|e| AppError::Pipeline(format!("Encoder task failed: {}", e)))?
        })
    }
}

/// Best-effort pre-processor: never stalls longer than its timeout, and
/// substitutes the original frame when encoding is slow or fails.
#[derive(Clone)]
pub struct Preprocessor<S = PreprocessingService> {
    service: Timeout<S>,
}

impl Preprocessor {
    pub fn new(max_edge: u32, quality: u8, timeout: Duration) -> Self {
        Self::with_service(PreprocessingService::new(max_edge, quality), timeout)
    }
}

impl<S> Preprocessor<S>
where
    S: Service<CapturedFrame, Response = EncodedImage> + Clone,
    S::Error: Into<BoxError>,
{
    pub fn with_service(service: S, timeout: Duration) -> Self {
        Self {
            service: Timeout::new(service, timeout),
        }
    }

    #[instrument(skip(self, frame), fields(frame_id = %frame.frame_id()))]
    pub async fn process(&self, frame: &CapturedFrame) -> (ProcessedImage, StageReport) {
        let started = Instant::now();
        let result: Result<EncodedImage, BoxError> =
            self.service.clone().oneshot(frame.clone()).await;
        let (image, outcome) = match result {
            Ok(encoded) => {
                debug!(
                    width = encoded.width,
                    height = encoded.height,
                    bytes = encoded.bytes.len(),
                    "Frame encoded"
                );
                (ProcessedImage::Encoded(encoded), StageOutcome::Completed)
            }
            Err(e) if e.is::<Elapsed>() => {
                warn!("Pre-processing timed out, sending original frame");
                (
                    ProcessedImage::Original(frame.image().clone()),
                    StageOutcome::TimedOut,
                )
            }
            Err(e) => {
                warn!(error = %e, "Pre-processing failed, sending original frame");
                (
                    ProcessedImage::Original(frame.image().clone()),
                    StageOutcome::Failed,
                )
            }
        };
        let report = StageReport::new(PipelineStage::Preprocess, started.elapsed(), outcome);
        (image, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn frame(width: u32, height: u32) -> CapturedFrame {
        CapturedFrame::new(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            width,
            height,
            Rgb([200, 30, 30]),
        )))
    }

    #[test]
    fn large_frames_are_downscaled_preserving_aspect() {
        let image = DynamicImage::new_rgb8(400, 200);
        let encoded = encode(&image, 100, 70).unwrap();
        assert_eq!((encoded.width, encoded.height), (100, 50));
        assert!(!encoded.bytes.is_empty());
    }

    #[test]
    fn small_frames_keep_their_size() {
        let image = DynamicImage::new_rgba8(40, 30);
        let encoded = encode(&image, 100, 70).unwrap();
        assert_eq!((encoded.width, encoded.height), (40, 30));
        // JPEG SOI marker
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn preprocessor_encodes_within_budget() {
        let preprocessor = Preprocessor::new(64, 70, Duration::from_secs(30));
        let (image, report) = preprocessor.process(&frame(256, 128)).await;
        assert_eq!(report.outcome, StageOutcome::Completed);
        assert!(!image.is_fallback());
        assert_eq!(image.dimensions(), (64, 32));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_encoder_falls_back_to_original() {
        let slow = tower::service_fn(|_frame: CapturedFrame| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, AppError>(EncodedImage {
                bytes: Arc::from(Vec::new()),
                width: 1,
                height: 1,
            })
        });
        let preprocessor = Preprocessor::with_service(slow, Duration::from_secs(3));
        let frame = frame(32, 16);
        let (image, report) = preprocessor.process(&frame).await;
        assert_eq!(report.outcome, StageOutcome::TimedOut);
        assert!(report.duration >= Duration::from_secs(3) && report.duration < Duration::from_secs(4));
        assert!(image.is_fallback());
        assert_eq!(image.dimensions(), frame.dimensions());
    }

    #[tokio::test]
    async fn failing_encoder_falls_back_to_original() {
        let broken = tower::service_fn(|_frame: CapturedFrame| async {
            Err::<EncodedImage, _>(AppError::Pipeline("encoder crashed".into()))
        });
        let preprocessor = Preprocessor::with_service(broken, Duration::from_secs(3));
        let (image, report) = preprocessor.process(&frame(8, 8)).await;
        assert_eq!(report.outcome, StageOutcome::Failed);
        assert!(image.is_fallback());
    }
}
