use super::config::SegmentationConfig;
use super::error::SegmentError;
use super::interval::IntervalMap;
use super::reconciler::{Decision, IntervalReconciler};
use super::refiner::{round_time, TransitionRefiner};
use super::state_machine::{DriverState, ScanEvent};
use crate::core::text::TextExtractor;
use crate::core::video::{ChangeDetector, Frame, FrameSource, VideoError};
use log::{debug, info, warn};

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStats {
    pub decoded_frames: u64,
    pub polls: u64,
    pub transitions: u64,
    pub merged_transitions: u64,
    pub probes: u64,
    pub ocr_failures: u64,
    /// 扫描因解码错误提前结束
    pub ended_on_decode_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub intervals: IntervalMap,
    /// 视频总时长（秒）
    pub duration: f64,
    pub stats: ScanStats,
}

/// 上一次检测到的帧及其文字
struct Retained {
    frame: Frame,
    text: String,
}

/// 分段驱动器：按固定间隔轮询整段视频，输出幻灯片区间
pub struct SlideSegmenter {
    config: SegmentationConfig,
    detector: ChangeDetector,
    refiner: TransitionRefiner,
}

impl SlideSegmenter {
    pub fn new() -> Self {
        Self::with_config(SegmentationConfig::default())
    }

    pub fn with_config(config: SegmentationConfig) -> Self {
        let detector = ChangeDetector::with_threshold(config.change_threshold_l2);
        Self {
            refiner: TransitionRefiner::new(detector.clone(), config.watermark_fraction),
            detector,
            config,
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        extractor: &dyn TextExtractor,
    ) -> Result<Segmentation, SegmentError> {
        self.config.validate()?;

        let fps = source.frame_rate();
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SegmentError::Source(VideoError::Probe(format!(
                "invalid frame rate {}",
                fps
            ))));
        }

        let cadence = self.config.sampling_cadence_secs;
        let mut state = DriverState::new();
        let mut reconciler = IntervalReconciler::new(self.config.continuation_similarity_threshold);
        let mut stats = ScanStats::default();
        let mut retained: Option<Retained> = None;
        let mut last_poll: Option<f64> = None;
        let mut next_check = 0.0f64;

        info!(
            "▶️ Segmenting {:.1}s of video @ {:.2} fps, cadence {}s",
            source.duration(),
            fps,
            cadence
        );

        while !state.is_done() {
            let frame = match source.read_next() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    state = state.transition(ScanEvent::EndOfStream);
                    continue;
                }
                Err(e) => {
                    warn!(
                        "decode failed after {} frames, ending scan: {}",
                        stats.decoded_frames, e
                    );
                    stats.ended_on_decode_error = true;
                    state = state.transition(ScanEvent::EndOfStream);
                    continue;
                }
            };
            stats.decoded_frames += 1;

            let time = frame.frame_number as f64 / fps;
            if time + 1e-9 < next_check {
                continue;
            }
            while next_check <= time + 1e-9 {
                next_check += cadence;
            }
            stats.polls += 1;

            let cropped = frame
                .crop_watermark(self.config.watermark_fraction)
                .map_err(SegmentError::InvalidFrame)?;
            let (changed, cropped) = self
                .detector
                .compare(retained.as_ref().map(|r| &r.frame), cropped)
                .map_err(SegmentError::InvalidFrame)?;

            if !changed {
                state = state.transition(ScanEvent::Unchanged);
                last_poll = Some(time);
                continue;
            }

            state = state.transition(ScanEvent::Changed {
                since: last_poll.unwrap_or(time),
                at: time,
            });

            let (transition_time, text) = match (&retained, state) {
                (
                    Some(previous),
                    DriverState::Refining {
                        window_start,
                        window_end,
                    },
                ) => {
                    let refinement =
                        self.refiner
                            .refine(source, &previous.frame, window_start, window_end);
                    stats.probes += refinement.probes as u64;
                    let text =
                        self.text_at(source, extractor, refinement.time, &cropped, &mut stats);
                    (refinement.time, text)
                }
                _ => (round_time(time), self.read_text(extractor, &cropped, &mut stats)),
            };

            // 帧率极高时两次换页可能被舍入到同一时间
            let transition_time = match reconciler.open_interval() {
                Some(open) if transition_time <= open.start_time => round_time(time),
                _ => transition_time,
            };

            let previous_text = retained.as_ref().map(|r| r.text.as_str()).unwrap_or("");
            match reconciler.observe(previous_text, &text, transition_time)? {
                Decision::Continued { .. } => stats.merged_transitions += 1,
                Decision::NewSlide { .. } => {}
            }
            stats.transitions += 1;
            state = state.transition(ScanEvent::Refined);

            retained = Some(Retained {
                frame: cropped,
                text,
            });
            last_poll = Some(time);
        }

        let duration = if source.frame_count() > 0 {
            source.duration()
        } else {
            stats.decoded_frames as f64 / fps
        };
        let intervals = reconciler.finish(duration);

        info!(
            "✅ Segmentation done: {} intervals, {} transitions ({} merged), {} polls, {} probes",
            intervals.len(),
            stats.transitions,
            stats.merged_transitions,
            stats.polls,
            stats.probes
        );

        Ok(Segmentation {
            intervals,
            duration,
            stats,
        })
    }

    /// 换页时间点的文字；定位失败时退回本次轮询的帧
    fn text_at<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        extractor: &dyn TextExtractor,
        time: f64,
        fallback: &Frame,
        stats: &mut ScanStats,
    ) -> String {
        let frame = source
            .seek(time)
            .and_then(|frame| frame.crop_watermark(self.config.watermark_fraction));
        match frame {
            Ok(frame) => self.read_text(extractor, &frame, stats),
            Err(e) => {
                debug!("seek to {:.2}s for OCR failed, using poll frame: {}", time, e);
                self.read_text(extractor, fallback, stats)
            }
        }
    }

    fn read_text(
        &self,
        extractor: &dyn TextExtractor,
        frame: &Frame,
        stats: &mut ScanStats,
    ) -> String {
        match extractor.extract(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("OCR failed on frame #{}, treating as empty: {}", frame.frame_number, e);
                stats.ocr_failures += 1;
                String::new()
            }
        }
    }
}

impl Default for SlideSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::text::MockTextExtractor;
    use crate::core::video::SyntheticFrameSource;
    use crate::segmenter::SlideInterval;

    fn two_slide_source() -> SyntheticFrameSource {
        SyntheticFrameSource::with_scenes(30.0, 40.0, 64, 48, vec![(0.0, 10), (20.0, 200)])
    }

    fn lecture_extractor() -> MockTextExtractor {
        MockTextExtractor::with_table(vec![(10, "Introduction"), (200, "Graph Search")])
    }

    fn assert_contiguous(map: &IntervalMap, duration: f64) {
        let intervals = map.intervals();
        for pair in intervals.windows(2) {
            assert!(pair[0].start_time < pair[1].start_time);
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        for interval in intervals {
            assert!(interval.start_time <= interval.end_time);
        }
        assert_eq!(intervals.last().unwrap().end_time, duration);
    }

    #[test]
    fn test_two_slide_video() {
        let mut source = two_slide_source();
        let extractor = lecture_extractor();

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert_eq!(
            result.intervals.intervals(),
            &[
                SlideInterval::new(0.0, 20.0, "Introduction"),
                SlideInterval::new(20.0, 40.0, "Graph Search"),
            ]
        );
        assert_eq!(result.duration, 40.0);
        assert_eq!(result.stats.decoded_frames, 1200);
        assert_eq!(result.stats.polls, 4);
        assert_eq!(result.stats.transitions, 2);
        assert_contiguous(&result.intervals, 40.0);
    }

    #[test]
    fn test_transition_between_polls_is_refined() {
        // 23.4s 换页，在 30s 的轮询才被发现
        let mut source =
            SyntheticFrameSource::with_scenes(30.0, 60.0, 64, 48, vec![(0.0, 10), (23.4, 200)]);
        let extractor = lecture_extractor();

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();
        let intervals = result.intervals.intervals();

        assert_eq!(intervals.len(), 2);
        assert!((intervals[1].start_time - 23.4).abs() <= 1.0 / 30.0);
        assert_eq!(intervals[1].text_value, "Graph Search");
        assert_contiguous(&result.intervals, 60.0);
    }

    #[test]
    fn test_progressive_reveal_is_merged() {
        let mut source = SyntheticFrameSource::with_scenes(
            30.0,
            40.0,
            64,
            48,
            vec![(0.0, 10), (15.0, 120), (25.0, 200)],
        );
        let extractor = MockTextExtractor::with_table(vec![
            (10, "Search"),
            (120, "Search Algorithms"),
            (200, "Search Algorithms: BFS and DFS"),
        ]);

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert_eq!(result.intervals.len(), 1);
        let only = &result.intervals.intervals()[0];
        assert_eq!(only.start_time, 0.0);
        assert_eq!(only.end_time, 40.0);
        assert_eq!(only.text_value, "Search Algorithms: BFS and DFS");
        assert_eq!(result.stats.merged_transitions, 2);
    }

    #[test]
    fn test_ocr_failure_is_empty_text() {
        let mut source = two_slide_source();
        let extractor = MockTextExtractor::failing();

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert_eq!(result.intervals.len(), 2);
        assert!(result.intervals.iter().all(|i| i.text_value.is_empty()));
        assert!(result.stats.ocr_failures >= 2);
    }

    #[test]
    fn test_decode_failure_ends_scan() {
        let mut source = two_slide_source().failing_decode_at(700);
        let extractor = lecture_extractor();

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert!(result.stats.ended_on_decode_error);
        assert_eq!(result.stats.decoded_frames, 700);
        // 最后一个区间仍以容器报告的时长收尾
        assert_eq!(result.intervals.last().unwrap().end_time, 40.0);
    }

    #[test]
    fn test_refine_seek_failure_uses_window_end() {
        let mut source =
            SyntheticFrameSource::with_scenes(30.0, 60.0, 64, 48, vec![(0.0, 10), (23.4, 200)])
                .failing_seeks_after(0.0);
        let extractor = lecture_extractor();

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();
        let intervals = result.intervals.intervals();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[1].start_time, 30.0);
        assert_eq!(intervals[1].text_value, "Graph Search");
    }

    #[test]
    fn test_static_video_has_single_interval() {
        let mut source = SyntheticFrameSource::with_scenes(25.0, 35.0, 64, 48, vec![(0.0, 90)]);
        let extractor = MockTextExtractor::with_table(vec![(90, "Welcome")]);

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert_eq!(
            result.intervals.intervals(),
            &[SlideInterval::new(0.0, 35.0, "Welcome")]
        );
        assert_eq!(result.stats.polls, 4);
    }

    #[test]
    fn test_empty_video() {
        let mut source = SyntheticFrameSource::with_scenes(30.0, 0.0, 64, 48, vec![(0.0, 10)]);
        let result = SlideSegmenter::new()
            .run(&mut source, &MockTextExtractor::new())
            .unwrap();

        assert!(result.intervals.is_empty());
        assert_eq!(result.stats.polls, 0);
    }

    #[test]
    fn test_degenerate_frame_aborts() {
        let mut source =
            SyntheticFrameSource::new(30.0, 5.0, |time, n| Frame::filled(8, 0, 0, time, n));
        let result = SlideSegmenter::new().run(&mut source, &MockTextExtractor::new());

        assert!(matches!(result, Err(SegmentError::InvalidFrame(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SegmentationConfig {
            sampling_cadence_secs: -1.0,
            ..Default::default()
        };
        let mut source = two_slide_source();
        let result =
            SlideSegmenter::with_config(config).run(&mut source, &MockTextExtractor::new());

        assert!(matches!(result, Err(SegmentError::Config(_))));
    }

    #[test]
    fn test_many_slides_cover_whole_video() {
        // 相邻两页灰度差至少 75，保证超过默认阈值
        let names = [
            "Overview",
            "Agents",
            "Environments",
            "Uninformed Search",
            "Heuristics",
            "Constraint Satisfaction",
            "Logic",
            "Resolution",
            "Planning",
            "Probability",
            "Bayes Nets",
            "Wrap-up",
        ];
        let value = |i: usize| -> u8 {
            if i % 2 == 0 {
                (20 + i * 5) as u8
            } else {
                (200 - i * 5) as u8
            }
        };
        let scenes: Vec<(f64, u8)> = (0..names.len())
            .map(|i| (i as f64 * 17.0, value(i)))
            .collect();
        let texts: Vec<(u8, &'static str)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (value(i), *n))
            .collect();
        let mut source = SyntheticFrameSource::with_scenes(30.0, 210.0, 64, 48, scenes);
        let extractor = MockTextExtractor::with_table(texts);

        let result = SlideSegmenter::new().run(&mut source, &extractor).unwrap();

        assert!(result.intervals.len() >= 2);
        assert_eq!(result.intervals.first().unwrap().start_time, 0.0);
        assert_contiguous(&result.intervals, 210.0);
    }
}
