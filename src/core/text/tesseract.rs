use super::error::TextError;
use super::extractor::TextExtractor;
use crate::core::process::{run_with_timeout, CommandError};
use crate::core::video::Frame;
use image::ImageOutputFormat;
use log::debug;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// 调用 tesseract 命令行：PNG 从 stdin 送入，文字从 stdout 读出
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    binary: PathBuf,
    language: String,
    page_segmentation_mode: u8,
    timeout: Duration,
}

impl TesseractExtractor {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation_mode: 3,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_psm(mut self, psm: u8) -> Self {
        self.page_segmentation_mode = psm;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn encode_png(frame: &Frame) -> Result<Vec<u8>, TextError> {
        let img = frame
            .to_image()
            .map_err(|e| TextError::Encode(e.to_string()))?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Png)
            .map_err(|e| TextError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&self, frame: &Frame) -> Result<String, TextError> {
        let png = Self::encode_png(frame)?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(["stdin", "stdout", "-l", &self.language, "--psm"])
            .arg(self.page_segmentation_mode.to_string());
        debug!("OCR on frame #{} ({} byte PNG)", frame.frame_number, png.len());

        let output = run_with_timeout(&mut cmd, Some(png), self.timeout).map_err(|e| match e {
            CommandError::Timeout { .. } => TextError::Timeout(self.timeout.as_secs()),
            err @ CommandError::Spawn { .. } => TextError::Engine(err.to_string()),
            CommandError::Io(e) => TextError::Io(e),
        })?;

        if !output.status.success() {
            return Err(TextError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status.code().unwrap_or(-1),
                output.stderr_text()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_encoding() {
        let frame = Frame::filled(16, 8, 200, 0.0, 0);
        let png = TesseractExtractor::encode_png(&frame).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_missing_binary_is_engine_error() {
        let extractor = TesseractExtractor::new().with_binary("/nonexistent/tesseract-binary");
        let frame = Frame::filled(16, 8, 200, 0.0, 0);
        assert!(matches!(
            extractor.extract(&frame),
            Err(TextError::Engine(_))
        ));
    }

    #[test]
    fn test_builder() {
        let extractor = TesseractExtractor::new()
            .with_language("deu")
            .with_psm(6)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(extractor.language, "deu");
        assert_eq!(extractor.page_segmentation_mode, 6);
        assert_eq!(extractor.timeout, Duration::from_secs(5));
    }

    /// 伪随机噪点帧，PNG 压缩后仍远大于管道缓冲区
    fn noisy_frame(width: u32, height: u32) -> Frame {
        let mut state = 0x2545_f491u32;
        let data = (0..width * height)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            })
            .collect();
        Frame::new(width, height, data, 0.0, 0)
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_is_killed_at_timeout() {
        use crate::core::process::test_support::write_script;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let engine = write_script(dir.path(), "tesseract", "sleep 8");
        let extractor = TesseractExtractor::new()
            .with_binary(engine)
            .with_timeout(Duration::from_secs(1));
        let frame = noisy_frame(600, 600);
        assert!(TesseractExtractor::encode_png(&frame).unwrap().len() > 256 * 1024);

        let started = Instant::now();
        let result = extractor.extract(&frame);

        assert!(matches!(result, Err(TextError::Timeout(1))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_output_is_trimmed() {
        use crate::core::process::test_support::write_script;

        let dir = tempfile::tempdir().unwrap();
        let engine = write_script(
            dir.path(),
            "tesseract",
            "cat > /dev/null\nprintf 'Graph Search\\n\\n'",
        );
        let extractor = TesseractExtractor::new().with_binary(engine);

        let text = extractor.extract(&Frame::filled(16, 8, 200, 0.0, 0)).unwrap();
        assert_eq!(text, "Graph Search");
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_failure_reports_stderr() {
        use crate::core::process::test_support::write_script;

        let dir = tempfile::tempdir().unwrap();
        let engine = write_script(dir.path(), "tesseract", "echo 'no traineddata' >&2\nexit 1");
        let extractor = TesseractExtractor::new().with_binary(engine);

        match extractor.extract(&Frame::filled(16, 8, 200, 0.0, 0)) {
            Err(TextError::Engine(message)) => assert!(message.contains("no traineddata")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
