use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("无法打开视频文件: {0}")]
    FileOpen(String),
    #[error("ffprobe 元数据解析失败: {0}")]
    Probe(String),
    #[error("帧解码失败: {0}")]
    Decode(String),
    #[error("定位到 {time:.2}s 失败: {reason}")]
    Seek { time: f64, reason: String },
    #[error("帧尺寸非法 {width}x{height}: {reason}")]
    InvalidFrame {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
}
