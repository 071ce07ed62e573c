use super::error::VideoError;
use super::frame::Frame;

/// 可定位的视频帧源
///
/// 打开由具体实现的构造函数负责，关闭由 `Drop` 负责。
pub trait FrameSource {
    fn frame_rate(&self) -> f64;

    /// 容器报告的总帧数，未知时为 0
    fn frame_count(&self) -> u64;

    /// 视频总时长（秒）= 帧数 / 帧率
    fn duration(&self) -> f64 {
        let fps = self.frame_rate();
        if fps > 0.0 {
            self.frame_count() as f64 / fps
        } else {
            0.0
        }
    }

    /// 顺序读取下一帧，流结束返回 `Ok(None)`
    fn read_next(&mut self) -> Result<Option<Frame>, VideoError>;

    /// 定位到 `time_secs` 并解码一帧，不影响顺序读取的游标
    fn seek(&mut self, time_secs: f64) -> Result<Frame, VideoError>;
}

type Renderer = Box<dyn Fn(f64, u64) -> Frame + Send>;

/// 内存中的合成视频源：帧内容由闭包按时间生成
pub struct SyntheticFrameSource {
    fps: f64,
    total_frames: u64,
    cursor: u64,
    render: Renderer,
    seek_fails_after: Option<f64>,
    decode_fails_at: Option<u64>,
}

impl SyntheticFrameSource {
    pub fn new<F>(fps: f64, duration_secs: f64, render: F) -> Self
    where
        F: Fn(f64, u64) -> Frame + Send + 'static,
    {
        Self {
            fps,
            total_frames: (duration_secs * fps).round() as u64,
            cursor: 0,
            render: Box::new(render),
            seek_fails_after: None,
            decode_fails_at: None,
        }
    }

    /// 单色场景序列：`scenes` 为 `(开始时间, 灰度值)`，按时间升序
    pub fn with_scenes(
        fps: f64,
        duration_secs: f64,
        width: u32,
        height: u32,
        scenes: Vec<(f64, u8)>,
    ) -> Self {
        Self::new(fps, duration_secs, move |time, frame_number| {
            let value = scenes
                .iter()
                .rev()
                .find(|(start, _)| time >= *start)
                .or(scenes.first())
                .map(|(_, v)| *v)
                .unwrap_or(0);
            Frame::filled(width, height, value, time, frame_number)
        })
    }

    /// 晚于 `time_secs` 的 seek 全部失败
    pub fn failing_seeks_after(mut self, time_secs: f64) -> Self {
        self.seek_fails_after = Some(time_secs);
        self
    }

    /// 顺序读取到第 `frame_number` 帧时解码失败
    pub fn failing_decode_at(mut self, frame_number: u64) -> Self {
        self.decode_fails_at = Some(frame_number);
        self
    }

    fn index_at(&self, time_secs: f64) -> u64 {
        (time_secs * self.fps + 1e-9).floor().max(0.0) as u64
    }

    fn render_index(&self, index: u64) -> Frame {
        let time = index as f64 / self.fps;
        (self.render)(time, index)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.total_frames
    }

    fn read_next(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.cursor >= self.total_frames {
            return Ok(None);
        }
        if self.decode_fails_at == Some(self.cursor) {
            return Err(VideoError::Decode(format!(
                "synthetic decode failure at frame {}",
                self.cursor
            )));
        }

        let frame = self.render_index(self.cursor);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, time_secs: f64) -> Result<Frame, VideoError> {
        if let Some(limit) = self.seek_fails_after {
            if time_secs > limit {
                return Err(VideoError::Seek {
                    time: time_secs,
                    reason: "synthetic seek failure".to_string(),
                });
            }
        }

        let index = self.index_at(time_secs);
        if index >= self.total_frames {
            return Err(VideoError::Seek {
                time: time_secs,
                reason: "past end of stream".to_string(),
            });
        }
        Ok(self.render_index(index))
    }
}
