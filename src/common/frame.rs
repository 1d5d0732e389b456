use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::sync::Arc;
use uuid::Uuid;

/// A photo as it came off the camera. Immutable once captured.
#[derive(Clone)]
pub struct CapturedFrame {
    frame_id: Uuid,
    image: Arc<DynamicImage>,
    captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

/// What every stage sends over the wire: the compressed frame, or the raw one
/// when compression did not finish in time.
#[derive(Clone)]
pub enum ProcessedImage {
    Encoded(EncodedImage),
    Original(Arc<DynamicImage>),
}

impl ProcessedImage {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ProcessedImage::Original(_))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ProcessedImage::Encoded(encoded) => (encoded.width, encoded.height),
            ProcessedImage::Original(image) => (image.width(), image.height()),
        }
    }
}

impl std::fmt::Debug for ProcessedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.dimensions();
        match self {
            ProcessedImage::Encoded(encoded) => f
                .debug_struct("Encoded")
                .field("width", &width)
                .field("height", &height)
                .field("bytes", &encoded.bytes.len())
                .finish(),
            ProcessedImage::Original(_) => f
                .debug_struct("Original")
                .field("width", &width)
                .field("height", &height)
                .finish(),
        }
    }
}
