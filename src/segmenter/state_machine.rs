/// 分段驱动器的状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverState {
    Scanning,
    /// 正在二分查找 `[window_start, window_end]` 内的换页时间
    Refining { window_start: f64, window_end: f64 },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanEvent {
    /// 本次轮询与保留帧相同
    Unchanged,
    /// 本次轮询检测到变化，窗口下界是上一次轮询的时间
    Changed { since: f64, at: f64 },
    /// 换页时间已确定并完成合并
    Refined,
    EndOfStream,
}

impl DriverState {
    pub fn new() -> Self {
        DriverState::Scanning
    }

    pub fn transition(&self, event: ScanEvent) -> DriverState {
        match (self, event) {
            (DriverState::Done, _) => DriverState::Done,
            (_, ScanEvent::EndOfStream) => DriverState::Done,

            (DriverState::Scanning, ScanEvent::Changed { since, at }) => DriverState::Refining {
                window_start: since,
                window_end: at,
            },
            (DriverState::Scanning, _) => DriverState::Scanning,

            (DriverState::Refining { .. }, ScanEvent::Refined) => DriverState::Scanning,
            (state @ DriverState::Refining { .. }, _) => *state,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, DriverState::Done)
    }
}

impl Default for DriverState {
    fn default() -> Self {
        Self::new()
    }
}
