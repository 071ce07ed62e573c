//! 讲座视频分段入口：打开视频、分段、写入结果

use crate::core::results::{ResultError, ResultSink, RunResult};
use crate::core::text::TextExtractor;
use crate::core::video::{FfmpegFrameSource, FfmpegTools, FrameSource, VideoError};
use crate::segmenter::{SegmentError, SegmentationConfig, SlideSegmenter};
use log::{error, info};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("无法打开视频: {0}")]
    Open(#[from] VideoError),
    #[error("分段失败: {0}")]
    Segment(#[from] SegmentError),
    #[error("结果写入失败: {0}")]
    Persist(#[from] ResultError),
}

/// 视频分段器：封装分段驱动和外部工具
///
/// ```ignore
/// let segmenter = VideoSegmenter::create(SegmentationConfig::default())?;
/// let sink = JsonFileSink::new("Results.json");
/// let extractor = TesseractExtractor::new();
/// let result = segmenter.process_file("AI1.m4v", &extractor, &sink)?;
/// ```
pub struct VideoSegmenter {
    segmenter: SlideSegmenter,
    tools: FfmpegTools,
}

impl VideoSegmenter {
    pub fn create(config: SegmentationConfig) -> Result<Self, RunError> {
        config.validate().map_err(SegmentError::from)?;
        info!("🎬 VideoSegmenter: created with {:?}", config);
        Ok(Self {
            segmenter: SlideSegmenter::with_config(config),
            tools: FfmpegTools::default(),
        })
    }

    pub fn with_tools(mut self, tools: FfmpegTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        self.segmenter.config()
    }

    /// 处理一个视频文件并把结果追加到 `sink`
    pub fn process_file(
        &self,
        path: impl AsRef<Path>,
        extractor: &dyn TextExtractor,
        sink: &dyn ResultSink,
    ) -> Result<RunResult, RunError> {
        let path = path.as_ref();
        let started = Instant::now();
        info!("📂 Opening {}", path.display());

        let opened = FfmpegFrameSource::open_with(path, self.tools.clone())
            .map(|source| source.with_decode_timeout(self.config().decode_timeout()));
        let mut source = match opened {
            Ok(source) => source,
            Err(e) => {
                error!("❌ Failed to open {}: {}", path.display(), e);
                return Err(e.into());
            }
        };

        let video_name = RunResult::video_name_from_path(path);
        self.process(&video_name, &mut source, extractor, sink, started)
    }

    /// 处理任意帧源，`video_name` 作为结果中的视频名
    pub fn process_source<S: FrameSource + ?Sized>(
        &self,
        video_name: &str,
        source: &mut S,
        extractor: &dyn TextExtractor,
        sink: &dyn ResultSink,
    ) -> Result<RunResult, RunError> {
        self.process(video_name, source, extractor, sink, Instant::now())
    }

    fn process<S: FrameSource + ?Sized>(
        &self,
        video_name: &str,
        source: &mut S,
        extractor: &dyn TextExtractor,
        sink: &dyn ResultSink,
        started: Instant,
    ) -> Result<RunResult, RunError> {
        let segmentation = match self.segmenter.run(source, extractor) {
            Ok(segmentation) => segmentation,
            Err(e) => {
                error!("❌ Segmentation of {} failed: {}", video_name, e);
                return Err(e.into());
            }
        };

        let result = RunResult::new(video_name, segmentation.intervals, started.elapsed());
        sink.append(&result)?;

        info!(
            "✅ {}: {} intervals in {:.2}s, saved to {}",
            video_name,
            result.text_data.len(),
            result.total_processing_time_seconds,
            sink.location()
        );
        Ok(result)
    }
}

impl Drop for VideoSegmenter {
    fn drop(&mut self) {
        info!("🗑️ VideoSegmenter: released");
    }
}
