pub mod diff_filter;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod source;

pub use diff_filter::{ChangeDetector, DEFAULT_CHANGE_THRESHOLD};
pub use error::VideoError;
pub use ffmpeg::{FfmpegFrameSource, FfmpegTools, VideoInfo, DEFAULT_DECODE_TIMEOUT};
pub use frame::Frame;
pub use source::{FrameSource, SyntheticFrameSource};
