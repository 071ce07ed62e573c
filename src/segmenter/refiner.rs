use crate::core::video::{ChangeDetector, Frame, FrameSource};
use log::{debug, warn};

/// 时间保留两位小数
pub fn round_time(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// 二分结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    /// 换页时间（两位小数）
    pub time: f64,
    pub probes: u32,
    /// 探测失败提前结束时为 false
    pub converged: bool,
}

/// 在 `[start, end]` 内二分查找换页时间，精度一帧
///
/// 窗口内恰有一次换页：`start` 处与参考帧相同，`end` 处不同。每次探测都与
/// 同一张换页前的参考帧比较，回答"是否已经变了"。
#[derive(Debug, Clone)]
pub struct TransitionRefiner {
    detector: ChangeDetector,
    watermark_fraction: f64,
}

impl TransitionRefiner {
    pub fn new(detector: ChangeDetector, watermark_fraction: f64) -> Self {
        Self {
            detector,
            watermark_fraction,
        }
    }

    pub fn refine<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        reference: &Frame,
        start: f64,
        end: f64,
    ) -> Refinement {
        let fps = source.frame_rate();
        let period = if fps > 0.0 { 1.0 / fps } else { f64::INFINITY };

        let (mut lo, mut hi) = (start, end);
        let mut probes = 0u32;
        let mut converged = true;

        while hi - lo > period {
            let mid = (lo + hi) / 2.0;
            probes += 1;

            match self.probe(source, reference, mid) {
                Some(true) => hi = mid,
                Some(false) => lo = mid,
                None => {
                    converged = false;
                    break;
                }
            }
        }

        debug!(
            "🔎 refined [{:.2}, {:.2}] -> {:.3}s after {} probes",
            start, end, hi, probes
        );

        Refinement {
            time: round_time(hi),
            probes,
            converged,
        }
    }

    /// `None` 表示该时间点无法解码或比较
    fn probe<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        reference: &Frame,
        time: f64,
    ) -> Option<bool> {
        let frame = source
            .seek(time)
            .and_then(|frame| frame.crop_watermark(self.watermark_fraction));
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("probe at {:.3}s failed, stopping search: {}", time, e);
                return None;
            }
        };

        match self.detector.compare(Some(reference), frame) {
            Ok((different, _)) => Some(different),
            Err(e) => {
                warn!("probe at {:.3}s not comparable, stopping search: {}", time, e);
                None
            }
        }
    }
}
