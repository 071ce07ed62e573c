pub mod config;
pub mod error;
pub mod interval;
pub mod pipeline;
pub mod reconciler;
pub mod refiner;
pub mod state_machine;

pub use config::{ConfigError, SegmentationConfig};
pub use error::SegmentError;
pub use interval::{FlatInterval, IntervalMap, SlideInterval};
pub use pipeline::{ScanStats, Segmentation, SlideSegmenter};
pub use reconciler::{Decision, IntervalReconciler};
pub use refiner::{round_time, Refinement, TransitionRefiner};
pub use state_machine::{DriverState, ScanEvent};
