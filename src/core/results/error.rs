use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("结果文件 JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("结果文件格式错误: {0}")]
    Format(String),
    #[error("等待结果文件锁超时: {0}")]
    LockTimeout(String),
}
