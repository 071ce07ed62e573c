use super::error::VideoError;
use image::GrayImage;

/// 灰度帧（8-bit luma，行优先）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// 解码时间（秒）
    pub timestamp: f64,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: f64, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        }
    }

    /// 纯色帧，测试和合成视频源使用
    pub fn filled(width: u32, height: u32, value: u8, timestamp: f64, frame_number: u64) -> Self {
        Self::new(
            width,
            height,
            vec![value; (width * height) as usize],
            timestamp,
            frame_number,
        )
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn mean_intensity(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as u64).sum::<u64>() as f64 / self.data.len() as f64
    }

    /// 去掉底部水印条带
    ///
    /// 保留 `[0, H - round(H * fraction))` 行、所有列。裁剪后为空则返回
    /// `InvalidFrame`，说明输入几何不符合预期。
    pub fn crop_watermark(&self, fraction: f64) -> Result<Frame, VideoError> {
        if self.data.len() != self.pixel_count() {
            return Err(self.invalid(format!(
                "buffer holds {} bytes, expected {}",
                self.data.len(),
                self.pixel_count()
            )));
        }

        let band = (self.height as f64 * fraction).round() as u32;
        if self.width == 0 || band >= self.height {
            return Err(self.invalid(format!("watermark band of {} rows leaves nothing", band)));
        }

        let kept_height = self.height - band;
        let kept = (kept_height * self.width) as usize;

        Ok(Frame {
            width: self.width,
            height: kept_height,
            data: self.data[..kept].to_vec(),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Result<Frame, VideoError> {
        let img = self.to_image()?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    pub fn to_image(&self) -> Result<GrayImage, VideoError> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| self.invalid("buffer does not match dimensions".to_string()))
    }

    fn invalid(&self, reason: String) -> VideoError {
        VideoError::InvalidFrame {
            width: self.width,
            height: self.height,
            reason,
        }
    }
}
