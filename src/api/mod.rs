pub mod segmentation;

pub use segmentation::{RunError, VideoSegmenter};
