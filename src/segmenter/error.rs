use super::config::ConfigError;
use crate::core::video::VideoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    #[error("输入帧与预期几何不符: {0}")]
    InvalidFrame(VideoError),
    #[error("视频源错误: {0}")]
    Source(VideoError),
    #[error("观测时间 {time:.2}s 早于当前区间开始 {open_start:.2}s")]
    OutOfOrder { time: f64, open_start: f64 },
}
