pub mod frame;

pub use frame::{CapturedFrame, EncodedImage, ProcessedImage};
