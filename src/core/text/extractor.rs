use super::error::TextError;
use crate::core::video::Frame;

/// 文字提取引擎（OCR）
///
/// 实现可以返回空串；调用方把 `Err` 当作"没有文字"处理。
pub trait TextExtractor: Send + Sync {
    fn extract(&self, frame: &Frame) -> Result<String, TextError>;
}

type Reader = Box<dyn Fn(&Frame) -> Result<String, TextError> + Send + Sync>;

/// 测试用提取器：按帧内容返回预设文字
pub struct MockTextExtractor {
    reader: Reader,
}

impl MockTextExtractor {
    pub fn new() -> Self {
        Self::with_reader(|_| Ok(String::new()))
    }

    pub fn with_reader<F>(reader: F) -> Self
    where
        F: Fn(&Frame) -> Result<String, TextError> + Send + Sync + 'static,
    {
        Self {
            reader: Box::new(reader),
        }
    }

    /// 以帧左上角像素值查表，找不到返回空串
    pub fn with_table(table: Vec<(u8, &'static str)>) -> Self {
        Self::with_reader(move |frame| {
            let key = frame.data.first().copied().unwrap_or(0);
            Ok(table
                .iter()
                .find(|(value, _)| *value == key)
                .map(|(_, text)| text.to_string())
                .unwrap_or_default())
        })
    }

    /// 每次都失败
    pub fn failing() -> Self {
        Self::with_reader(|_| Err(TextError::Engine("mock engine failure".to_string())))
    }
}

impl Default for MockTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for MockTextExtractor {
    fn extract(&self, frame: &Frame) -> Result<String, TextError> {
        (self.reader)(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let extractor = MockTextExtractor::with_table(vec![(10, "Intro"), (200, "Outro")]);

        let intro = Frame::filled(4, 4, 10, 0.0, 0);
        let outro = Frame::filled(4, 4, 200, 0.0, 0);
        let unknown = Frame::filled(4, 4, 99, 0.0, 0);

        assert_eq!(extractor.extract(&intro).unwrap(), "Intro");
        assert_eq!(extractor.extract(&outro).unwrap(), "Outro");
        assert_eq!(extractor.extract(&unknown).unwrap(), "");
    }

    #[test]
    fn test_failing_extractor() {
        let extractor = MockTextExtractor::failing();
        let frame = Frame::filled(4, 4, 0, 0.0, 0);
        assert!(matches!(extractor.extract(&frame), Err(TextError::Engine(_))));
    }
}
