//! 基于 ffmpeg / ffprobe 命令行的帧源
//!
//! 顺序读取走一个常驻的 `ffmpeg -f rawvideo -pix_fmt gray -` 管道，
//! 二分定位时每次单独起一个 `ffmpeg -ss <t> -frames:v 1` 进程，
//! 两者互不干扰。每一帧（顺序读取或定位）都有解码超时，超时按解码 /
//! 定位失败处理。

use super::error::VideoError;
use super::frame::Frame;
use super::source::FrameSource;
use crate::core::process::{self, run_with_timeout, CommandError};
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(30);

/// 解码线程预读的帧数
const READ_AHEAD_FRAMES: usize = 4;

/// 外部工具路径
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// 视频流元数据
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl VideoInfo {
    /// 解析 `ffprobe -of json` 的输出
    pub fn from_probe_json(json: &str) -> Result<Self, VideoError> {
        let probe: ProbeOutput = serde_json::from_str(json)?;
        let stream = probe
            .streams
            .first()
            .ok_or_else(|| VideoError::Probe("no video stream".to_string()))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(VideoError::Probe("missing frame dimensions".to_string())),
        };

        let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
            .into_iter()
            .flatten()
            .filter_map(|rate| parse_rate(rate))
            .next()
            .ok_or_else(|| VideoError::Probe("missing frame rate".to_string()))?;

        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<u64>().ok())
            .or_else(|| {
                probe
                    .format
                    .as_ref()
                    .and_then(|f| f.duration.as_deref())
                    .and_then(|d| d.parse::<f64>().ok())
                    .map(|d| (d * fps).round() as u64)
            })
            .unwrap_or(0);

        Ok(Self {
            width,
            height,
            fps,
            frame_count,
        })
    }

    fn frame_bytes(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// "30000/1001" 或 "25"
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

pub struct FfmpegFrameSource {
    path: PathBuf,
    tools: FfmpegTools,
    info: VideoInfo,
    decode_timeout: Duration,
    decoder: Option<Child>,
    frames: Option<Receiver<DecodedChunk>>,
    cursor: u64,
    exhausted: bool,
}

/// 解码线程送来的一块数据
enum DecodedChunk {
    Frame(Vec<u8>),
    /// 流在帧中间结束，只读到这么多字节
    Truncated(usize),
    Failed(String),
}

impl FfmpegFrameSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        Self::open_with(path, FfmpegTools::default())
    }

    pub fn open_with(path: impl AsRef<Path>, tools: FfmpegTools) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(VideoError::FileOpen(path.display().to_string()));
        }

        let info = Self::probe(&path, &tools, DEFAULT_DECODE_TIMEOUT)?;
        info!(
            "🎬 Opened {}: {}x{} @ {:.3} fps, {} frames",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
        );

        Ok(Self {
            path,
            tools,
            info,
            decode_timeout: DEFAULT_DECODE_TIMEOUT,
            decoder: None,
            frames: None,
            cursor: 0,
            exhausted: false,
        })
    }

    /// 单帧解码超时（顺序读取和定位都适用）
    pub fn with_decode_timeout(mut self, timeout: Duration) -> Self {
        self.decode_timeout = timeout;
        self
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn probe(path: &Path, tools: &FfmpegTools, timeout: Duration) -> Result<VideoInfo, VideoError> {
        let mut cmd = Command::new(&tools.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames:format=duration",
            "-of",
            "json",
        ])
        .arg(path);

        let output = run_with_timeout(&mut cmd, None, timeout)
            .map_err(|e| VideoError::FileOpen(format!("{}: {}", path.display(), e)))?;
        if !output.status.success() {
            return Err(VideoError::FileOpen(format!(
                "{}: {}",
                path.display(),
                output.stderr_text()
            )));
        }

        VideoInfo::from_probe_json(&String::from_utf8_lossy(&output.stdout))
    }

    fn spawn_decoder(&mut self) -> Result<(), VideoError> {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "gray", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        debug!("running {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| VideoError::Decode(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::Decode("ffmpeg stdout not captured".to_string()))?;

        let (tx, rx) = mpsc::sync_channel(READ_AHEAD_FRAMES);
        let frame_bytes = self.info.frame_bytes();
        thread::spawn(move || pump_frames(stdout, frame_bytes, tx));

        self.frames = Some(rx);
        self.decoder = Some(child);
        Ok(())
    }

    fn shutdown_decoder(&mut self) {
        // 先断开通道，解码线程的 send 随即失败退出
        self.frames = None;
        if let Some(mut child) = self.decoder.take() {
            process::kill(&mut child);
        }
    }

    fn finish_with(&mut self, error: Option<VideoError>) -> Result<Option<Frame>, VideoError> {
        self.exhausted = true;
        self.shutdown_decoder();
        match error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// 从 ffmpeg stdout 按整帧切块送出，接收端断开即退出
fn pump_frames(mut stdout: ChildStdout, frame_bytes: usize, tx: SyncSender<DecodedChunk>) {
    loop {
        let mut buf = vec![0u8; frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(DecodedChunk::Failed(e.to_string()));
                    return;
                }
            }
        }

        let chunk = match filled {
            0 => return,
            n if n < frame_bytes => DecodedChunk::Truncated(n),
            _ => DecodedChunk::Frame(buf),
        };
        let last = matches!(chunk, DecodedChunk::Truncated(_));
        if tx.send(chunk).is_err() || last {
            return;
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn frame_rate(&self) -> f64 {
        self.info.fps
    }

    fn frame_count(&self) -> u64 {
        self.info.frame_count
    }

    fn read_next(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.exhausted {
            return Ok(None);
        }
        if self.decoder.is_none() {
            self.spawn_decoder()?;
        }
        let Some(frames) = self.frames.as_ref() else {
            return Ok(None);
        };

        let buf = match frames.recv_timeout(self.decode_timeout) {
            Ok(DecodedChunk::Frame(buf)) => buf,
            Ok(DecodedChunk::Truncated(filled)) => {
                warn!(
                    "truncated frame #{}: {} of {} bytes",
                    self.cursor,
                    filled,
                    self.info.frame_bytes()
                );
                let error = VideoError::Decode(format!("truncated frame #{}", self.cursor));
                return self.finish_with(Some(error));
            }
            Ok(DecodedChunk::Failed(reason)) => {
                return self.finish_with(Some(VideoError::Decode(reason)));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "⏱️ frame #{} not decoded within {:?}, stopping decoder",
                    self.cursor, self.decode_timeout
                );
                let error = VideoError::Decode(format!(
                    "frame #{} not decoded within {:?}",
                    self.cursor, self.decode_timeout
                ));
                return self.finish_with(Some(error));
            }
            Err(RecvTimeoutError::Disconnected) => return self.finish_with(None),
        };

        let frame_number = self.cursor;
        self.cursor += 1;
        Ok(Some(Frame::new(
            self.info.width,
            self.info.height,
            buf,
            frame_number as f64 / self.info.fps,
            frame_number,
        )))
    }

    fn seek(&mut self, time_secs: f64) -> Result<Frame, VideoError> {
        let seek_err = |reason: String| VideoError::Seek {
            time: time_secs,
            reason,
        };

        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-ss"])
            .arg(format!("{:.3}", time_secs.max(0.0)))
            .arg("-i")
            .arg(&self.path)
            .args([
                "-map", "0:v:0", "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "gray", "-",
            ]);

        let output = run_with_timeout(&mut cmd, None, self.decode_timeout).map_err(|e| {
            if let CommandError::Timeout { .. } = e {
                warn!("⏱️ seek to {:.3}s exceeded {:?}", time_secs, self.decode_timeout);
            }
            seek_err(e.to_string())
        })?;
        if !output.status.success() {
            return Err(seek_err(output.stderr_text()));
        }

        let expected = self.info.frame_bytes();
        if output.stdout.len() < expected {
            return Err(seek_err(format!(
                "decoded {} of {} bytes",
                output.stdout.len(),
                expected
            )));
        }

        let mut data = output.stdout;
        data.truncate(expected);
        Ok(Frame::new(
            self.info.width,
            self.info.height,
            data,
            time_secs,
            (time_secs * self.info.fps).round() as u64,
        ))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.shutdown_decoder();
        debug!("🗑️ FfmpegFrameSource released: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("garbage"), None);
    }

    #[test]
    fn test_probe_json_with_frame_count() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "width": 1280, "height": 720,
                "r_frame_rate": "30/1", "avg_frame_rate": "30/1",
                "nb_frames": "1200"
            }],
            "format": { "duration": "40.000000" }
        }"#;

        let info = VideoInfo::from_probe_json(json).unwrap();
        assert_eq!(
            info,
            VideoInfo {
                width: 1280,
                height: 720,
                fps: 30.0,
                frame_count: 1200,
            }
        );
    }

    #[test]
    fn test_probe_json_falls_back_to_duration() {
        // mkv 等容器通常不报告 nb_frames
        let json = r#"{
            "streams": [{ "width": 640, "height": 360, "r_frame_rate": "25/1", "avg_frame_rate": "0/0" }],
            "format": { "duration": "12.0" }
        }"#;

        let info = VideoInfo::from_probe_json(json).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.frame_count, 300);
    }

    #[test]
    fn test_probe_json_without_stream() {
        let json = r#"{ "streams": [], "format": { "duration": "1.0" } }"#;
        assert!(matches!(
            VideoInfo::from_probe_json(json),
            Err(VideoError::Probe(_))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegFrameSource::open("/definitely/not/here.m4v");
        assert!(matches!(result, Err(VideoError::FileOpen(_))));
    }

    #[cfg(unix)]
    mod with_fake_ffmpeg {
        use super::*;
        use crate::core::process::test_support::write_script;
        use std::time::Instant;
        use tempfile::TempDir;

        /// 4x4 灰度、10 fps 的帧源，ffmpeg 换成给定脚本
        fn source(dir: &TempDir, ffmpeg_body: &str) -> FfmpegFrameSource {
            let ffmpeg = write_script(dir.path(), "ffmpeg", ffmpeg_body);
            FfmpegFrameSource {
                path: dir.path().join("lecture.m4v"),
                tools: FfmpegTools {
                    ffmpeg,
                    ffprobe: PathBuf::from("ffprobe"),
                },
                info: VideoInfo {
                    width: 4,
                    height: 4,
                    fps: 10.0,
                    frame_count: 2,
                },
                decode_timeout: Duration::from_secs(5),
                decoder: None,
                frames: None,
                cursor: 0,
                exhausted: false,
            }
        }

        #[test]
        fn test_sequential_frames_then_end() {
            let dir = tempfile::tempdir().unwrap();
            let mut source = source(&dir, "head -c 32 /dev/zero");

            let first = source.read_next().unwrap().unwrap();
            assert_eq!(first.frame_number, 0);
            assert_eq!(first.data.len(), 16);
            let second = source.read_next().unwrap().unwrap();
            assert!((second.timestamp - 0.1).abs() < 1e-9);
            assert!(source.read_next().unwrap().is_none());
            assert!(source.read_next().unwrap().is_none());
        }

        #[test]
        fn test_truncated_stream_is_decode_error() {
            let dir = tempfile::tempdir().unwrap();
            let mut source = source(&dir, "head -c 20 /dev/zero");

            assert!(source.read_next().unwrap().is_some());
            assert!(matches!(source.read_next(), Err(VideoError::Decode(_))));
            assert!(source.read_next().unwrap().is_none());
        }

        #[test]
        fn test_stalled_decoder_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let mut source =
                source(&dir, "sleep 8").with_decode_timeout(Duration::from_millis(500));

            let started = Instant::now();
            assert!(matches!(source.read_next(), Err(VideoError::Decode(_))));
            assert!(started.elapsed() < Duration::from_secs(4));
            assert!(source.read_next().unwrap().is_none());
        }

        #[test]
        fn test_stalled_seek_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let mut source =
                source(&dir, "sleep 8").with_decode_timeout(Duration::from_millis(500));

            let started = Instant::now();
            assert!(matches!(source.seek(0.1), Err(VideoError::Seek { .. })));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_seek_reads_one_frame() {
            let dir = tempfile::tempdir().unwrap();
            let mut source = source(&dir, "head -c 16 /dev/zero");

            let frame = source.seek(0.1).unwrap();
            assert_eq!(frame.frame_number, 1);
            assert_eq!(frame.data, vec![0u8; 16]);
        }
    }
}
