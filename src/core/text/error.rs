use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("OCR 引擎错误: {0}")]
    Engine(String),
    #[error("OCR 超时（{0} 秒）")]
    Timeout(u64),
    #[error("帧编码失败: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
