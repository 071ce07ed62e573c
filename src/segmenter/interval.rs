use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 一页幻灯片在视频中的时间区间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideInterval {
    pub start_time: f64,
    pub end_time: f64,
    pub text_value: String,
}

impl SlideInterval {
    pub fn new(start_time: f64, end_time: f64, text_value: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text_value: text_value.into(),
        }
    }

    /// 在 `time` 开始、尚未结束的区间
    pub fn opened_at(time: f64, text_value: impl Into<String>) -> Self {
        Self::new(time, time, text_value)
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// 下游匹配使用的扁平行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatInterval {
    pub video_name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text_value: String,
}

/// 按开始时间严格递增的区间序列
///
/// JSON 中表示为以开始时间为键的对象（`{"0": {...}, "20.03": {...}}`），
/// 与历史结果文件的格式一致。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalMap {
    intervals: Vec<SlideInterval>,
}

impl IntervalMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按开始时间排序后构建
    pub fn from_intervals(mut intervals: Vec<SlideInterval>) -> Self {
        intervals.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[SlideInterval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlideInterval> {
        self.intervals.iter()
    }

    pub fn first(&self) -> Option<&SlideInterval> {
        self.intervals.first()
    }

    pub fn last(&self) -> Option<&SlideInterval> {
        self.intervals.last()
    }

    /// 按开始时间查找
    pub fn get(&self, start_time: f64) -> Option<&SlideInterval> {
        self.intervals
            .binary_search_by(|i| i.start_time.total_cmp(&start_time))
            .ok()
            .map(|idx| &self.intervals[idx])
    }

    /// 覆盖 `time` 的区间（左闭右开，最后一个区间右闭）
    pub fn at(&self, time: f64) -> Option<&SlideInterval> {
        let last = self.intervals.len().checked_sub(1)?;
        self.intervals.iter().enumerate().find_map(|(idx, i)| {
            let inside = time >= i.start_time
                && (time < i.end_time || (idx == last && time <= i.end_time));
            inside.then_some(i)
        })
    }

    pub fn flatten(&self, video_name: &str) -> Vec<FlatInterval> {
        self.intervals
            .iter()
            .map(|i| FlatInterval {
                video_name: video_name.to_string(),
                start_time: i.start_time,
                end_time: i.end_time,
                text_value: i.text_value.clone(),
            })
            .collect()
    }

    pub fn key_for(start_time: f64) -> String {
        format!("{}", start_time)
    }

    pub(crate) fn push(&mut self, interval: SlideInterval) {
        self.intervals.push(interval);
    }
}

impl<'a> IntoIterator for &'a IntervalMap {
    type Item = &'a SlideInterval;
    type IntoIter = std::slice::Iter<'a, SlideInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

impl Serialize for IntervalMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.intervals.len()))?;
        for interval in &self.intervals {
            map.serialize_entry(&Self::key_for(interval.start_time), interval)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IntervalMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, SlideInterval>::deserialize(deserializer)?;
        Ok(Self::from_intervals(raw.into_values().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IntervalMap {
        IntervalMap::from_intervals(vec![
            SlideInterval::new(20.03, 40.0, "Search"),
            SlideInterval::new(0.0, 20.03, "Intro"),
        ])
    }

    #[test]
    fn test_sorted_by_start() {
        let map = sample();
        assert_eq!(map.len(), 2);
        assert_eq!(map.first().unwrap().text_value, "Intro");
        assert_eq!(map.last().unwrap().text_value, "Search");
    }

    #[test]
    fn test_lookup() {
        let map = sample();
        assert_eq!(map.get(20.03).unwrap().text_value, "Search");
        assert!(map.get(5.0).is_none());

        assert_eq!(map.at(0.0).unwrap().text_value, "Intro");
        assert_eq!(map.at(20.03).unwrap().text_value, "Search");
        assert_eq!(map.at(40.0).unwrap().text_value, "Search");
        assert!(map.at(40.5).is_none());
    }

    #[test]
    fn test_keys() {
        assert_eq!(IntervalMap::key_for(0.0), "0");
        assert_eq!(IntervalMap::key_for(20.0), "20");
        assert_eq!(IntervalMap::key_for(20.03), "20.03");
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.starts_with(r#"{"0":{"start_time":0.0"#));

        let back: IntervalMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_flatten() {
        let rows = sample().flatten("AI1.m4v");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].video_name, "AI1.m4v");
        assert_eq!(rows[1].start_time, 20.03);
        assert_eq!(rows[1].text_value, "Search");
    }
}
