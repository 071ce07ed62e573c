use crate::segmenter::IntervalMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 一次处理的结果，写入结果文件后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub video_name: String,
    pub text_data: IntervalMap,
    pub total_processing_time_seconds: f64,
    pub processing_datetime: String,
}

impl RunResult {
    pub fn new(video_name: impl Into<String>, text_data: IntervalMap, elapsed: Duration) -> Self {
        Self {
            video_name: video_name.into(),
            text_data,
            total_processing_time_seconds: elapsed.as_secs_f64(),
            processing_datetime: chrono::Local::now().format(DATETIME_FORMAT).to_string(),
        }
    }

    /// 视频路径的文件名部分
    pub fn video_name_from_path(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}
