//! 区间合并
//!
//! 每次检测到换页都会得到一条 `(时间, OCR 文本)` 观测。逐步展开的幻灯片
//! （动画、分步显示）会让同一页被读出多次，而且后一次通常更完整，
//! 所以与上一页文本足够相似的观测视为"续页"：延长当前区间并用新文本覆盖，
//! 否则关闭当前区间并开新区间。

use super::error::SegmentError;
use super::interval::{IntervalMap, SlideInterval};
use crate::core::text::{partial_ratio, SimilarityScore};
use log::{debug, info};

/// 一次观测的处理结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// 延长当前区间
    Continued { score: SimilarityScore },
    /// 开了新区间；任一文本为空时没有分数
    NewSlide { score: Option<SimilarityScore> },
}

pub struct IntervalReconciler {
    threshold: SimilarityScore,
    closed: Vec<SlideInterval>,
    open: Option<SlideInterval>,
}

impl IntervalReconciler {
    pub fn new(threshold: SimilarityScore) -> Self {
        Self {
            threshold,
            closed: Vec::new(),
            open: None,
        }
    }

    /// 续页判定：两段文本都非空且 partial ratio 严格大于阈值
    pub fn is_continuation(
        &self,
        previous_text: &str,
        current_text: &str,
    ) -> (bool, Option<SimilarityScore>) {
        if previous_text.trim().is_empty() || current_text.trim().is_empty() {
            return (false, None);
        }
        let score = partial_ratio(previous_text, current_text);
        (score > self.threshold, Some(score))
    }

    pub fn observe(
        &mut self,
        previous_text: &str,
        current_text: &str,
        time: f64,
    ) -> Result<Decision, SegmentError> {
        let (continuation, score) = self.is_continuation(previous_text, current_text);

        if let (true, Some(open), Some(score)) = (continuation, self.open.as_mut(), score) {
            if time < open.start_time {
                return Err(SegmentError::OutOfOrder {
                    time,
                    open_start: open.start_time,
                });
            }
            open.end_time = time;
            open.text_value = current_text.to_string();
            debug!(
                "⏩ {:.2}s continues slide from {:.2}s (score {})",
                time, open.start_time, score
            );
            return Ok(Decision::Continued { score });
        }

        if let Some(open) = &self.open {
            if time <= open.start_time {
                return Err(SegmentError::OutOfOrder {
                    time,
                    open_start: open.start_time,
                });
            }
        }

        if let Some(mut open) = self.open.take() {
            open.end_time = time;
            self.closed.push(open);
        }
        self.open = Some(SlideInterval::opened_at(time, current_text));
        info!(
            "🆕 New slide at {:.2}s (score {:?}, {} chars)",
            time,
            score,
            current_text.chars().count()
        );

        Ok(Decision::NewSlide { score })
    }

    pub fn open_interval(&self) -> Option<&SlideInterval> {
        self.open.as_ref()
    }

    pub fn len(&self) -> usize {
        self.closed.len() + usize::from(self.open.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前状态的快照，未关闭的区间按现状输出
    pub fn snapshot(&self) -> IntervalMap {
        let mut map = IntervalMap::from_intervals(self.closed.clone());
        if let Some(open) = &self.open {
            map.push(open.clone());
        }
        map
    }

    /// 视频结束：把最后一个区间的结束时间设为视频总时长
    pub fn finish(self, duration: f64) -> IntervalMap {
        let mut map = IntervalMap::from_intervals(self.closed);
        if let Some(mut open) = self.open {
            open.end_time = duration.max(open.start_time);
            map.push(open);
        }
        map
    }
}
