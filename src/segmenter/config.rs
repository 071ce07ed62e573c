use crate::core::video::DEFAULT_CHANGE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("采样间隔必须为正数，当前 {0}")]
    Cadence(f64),
    #[error("帧差阈值必须为非负数，当前 {0}")]
    ChangeThreshold(f64),
    #[error("相似度阈值必须在 0..=100，当前 {0}")]
    SimilarityThreshold(u8),
    #[error("水印比例必须在 [0, 1)，当前 {0}")]
    WatermarkFraction(f64),
    #[error("超时必须大于 0 秒: {0}")]
    Timeout(&'static str),
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// 分段参数，运行期间不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// 轮询间隔（视频时间，秒）
    pub sampling_cadence_secs: f64,
    /// 帧差 L2 阈值，依赖分辨率和内容
    pub change_threshold_l2: f64,
    /// 续页判定的相似度阈值（严格大于）
    pub continuation_similarity_threshold: u8,
    /// 底部水印条带占帧高的比例
    pub watermark_fraction: f64,
    /// 单帧 OCR 超时
    pub ocr_timeout_secs: u64,
    /// 单帧解码 / 定位超时
    pub decode_timeout_secs: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            sampling_cadence_secs: 10.0,
            change_threshold_l2: DEFAULT_CHANGE_THRESHOLD,
            continuation_similarity_threshold: 60,
            watermark_fraction: 0.05,
            ocr_timeout_secs: 30,
            decode_timeout_secs: 30,
        }
    }
}

impl SegmentationConfig {
    /// 翻页频繁的讲座
    pub fn for_fast_paced() -> Self {
        Self {
            sampling_cadence_secs: 5.0,
            ..Self::default()
        }
    }

    /// 一页讲很久的讲座
    pub fn for_slow_paced() -> Self {
        Self {
            sampling_cadence_secs: 20.0,
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_cadence_secs.is_finite() && self.sampling_cadence_secs > 0.0) {
            return Err(ConfigError::Cadence(self.sampling_cadence_secs));
        }
        if !(self.change_threshold_l2.is_finite() && self.change_threshold_l2 >= 0.0) {
            return Err(ConfigError::ChangeThreshold(self.change_threshold_l2));
        }
        if self.continuation_similarity_threshold > 100 {
            return Err(ConfigError::SimilarityThreshold(
                self.continuation_similarity_threshold,
            ));
        }
        if !(0.0..1.0).contains(&self.watermark_fraction) {
            return Err(ConfigError::WatermarkFraction(self.watermark_fraction));
        }
        if self.ocr_timeout_secs == 0 {
            return Err(ConfigError::Timeout("ocr_timeout_secs"));
        }
        if self.decode_timeout_secs == 0 {
            return Err(ConfigError::Timeout("decode_timeout_secs"));
        }
        Ok(())
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }
}
