use super::error::VideoError;
use super::frame::Frame;
use log::debug;
use rayon::prelude::*;

/// 默认 L2 阈值，按常见课件分辨率标定
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 4000.0;

const ROWS_PER_CHUNK: usize = 64;

/// 帧差检测器：两帧逐像素差的欧氏范数超过阈值即视为换页
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    threshold: f64,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_CHANGE_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 与上一保留帧比较，返回 `(is_different, current)`
    ///
    /// 没有上一帧时总是返回 `true`。尺寸不一致时先把当前帧缩放到上一帧的尺寸
    /// 再比较，但返回的仍是原始的当前帧。
    pub fn compare(
        &self,
        previous: Option<&Frame>,
        current: Frame,
    ) -> Result<(bool, Frame), VideoError> {
        let Some(previous) = previous else {
            return Ok((true, current));
        };

        let norm = Self::l2_distance(previous, &current)?;
        debug!(
            "frame #{} @ {:.2}s: L2 = {:.1} (threshold {:.1})",
            current.frame_number, current.timestamp, norm, self.threshold
        );

        Ok((norm > self.threshold, current))
    }

    /// 逐像素差的 L2 范数，必要时把 `b` 缩放到 `a` 的尺寸
    pub fn l2_distance(a: &Frame, b: &Frame) -> Result<f64, VideoError> {
        let resized;
        let b = if a.width != b.width || a.height != b.height {
            resized = b.resize_to(a.width, a.height)?;
            &resized
        } else {
            b
        };

        if a.data.len() != b.data.len() {
            return Err(VideoError::InvalidFrame {
                width: b.width,
                height: b.height,
                reason: format!("{} bytes vs reference {} bytes", b.data.len(), a.data.len()),
            });
        }

        let chunk = (a.width as usize).max(1) * ROWS_PER_CHUNK;
        let sum: u64 = a
            .data
            .par_chunks(chunk)
            .zip(b.data.par_chunks(chunk))
            .map(|(ra, rb)| {
                ra.iter()
                    .zip(rb.iter())
                    .map(|(&x, &y)| {
                        let d = x as i64 - y as i64;
                        (d * d) as u64
                    })
                    .sum::<u64>()
            })
            .sum();

        Ok((sum as f64).sqrt())
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}
