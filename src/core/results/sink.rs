use super::error::ResultError;
use super::record::RunResult;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 结果存储：追加必须是原子的（读-改-写整体不可被打断）
pub trait ResultSink {
    fn append(&self, result: &RunResult) -> Result<(), ResultError>;

    /// 存储位置描述，用于提示用户
    fn location(&self) -> String;
}

/// JSON 数组文件存储，例如 `Results.json`
///
/// 追加时先拿 `<file>.lock` 独占锁，再整体读出、追加、写入同目录下的临时文件并
/// rename 覆盖原文件。多个进程同时追加不会丢记录，写到一半崩溃也不会留下半截文件。
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
    lock_timeout: Duration,
    stale_lock_after: Duration,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: Duration::from_secs(10),
            stale_lock_after: Duration::from_secs(120),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读出全部记录
    pub fn load_all(&self) -> Result<Vec<RunResult>, ResultError> {
        self.load_raw()?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(ResultError::from))
            .collect()
    }

    /// 原始 JSON 记录，旧格式的记录原样保留
    fn load_raw(&self) -> Result<Vec<Value>, ResultError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Array(items) => Ok(items),
            other => Err(ResultError::Format(format!(
                "{} holds a JSON {} instead of an array",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn write_all(&self, records: &[Value]) -> Result<(), ResultError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut ser = serde_json::Serializer::with_formatter(&mut tmp, formatter);
            records.serialize(&mut ser)?;
        }
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ResultError::Io(e.error))?;
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

impl ResultSink for JsonFileSink {
    fn append(&self, result: &RunResult) -> Result<(), ResultError> {
        let _lock = StoreLock::acquire(
            &self.lock_path(),
            self.lock_timeout,
            self.stale_lock_after,
        )?;

        let mut records = self.load_raw()?;
        let previous = records.len();
        records.push(serde_json::to_value(result)?);
        self.write_all(&records)?;

        info!(
            "💾 Appended run for {} to {} ({} -> {} records)",
            result.video_name,
            self.path.display(),
            previous,
            records.len()
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 基于 `create_new` 的独占锁文件，内容是持有者的唯一标识
///
/// 过期锁先 rename 成唯一的墓碑文件，确认搬走的正是判定过期的那一把才删除，
/// 搬错了（期间别人刚拿到新锁）就原样放回。
struct StoreLock {
    path: PathBuf,
    token: String,
}

static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{}-{}-{}",
        std::process::id(),
        nanos,
        LOCK_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

impl StoreLock {
    fn acquire(path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self, ResultError> {
        let start = SystemTime::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(file) => {
                    let token = unique_token();
                    if let Err(e) = Self::stamp(file, &token) {
                        let _ = fs::remove_file(path);
                        return Err(e.into());
                    }
                    debug!("acquired {} as {}", path.display(), token);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(observed) = Self::stale_token(path, stale_after) {
                        match Self::reclaim(path, &observed, stale_after) {
                            Ok(true) => {
                                warn!("Removed stale result lock {}", path.display());
                                continue;
                            }
                            Ok(false) => debug!("{} changed hands, not reclaiming", path.display()),
                            Err(e) => warn!("could not reclaim {}: {}", path.display(), e),
                        }
                    }
                    if start.elapsed().unwrap_or_default() >= timeout {
                        return Err(ResultError::LockTimeout(path.display().to_string()));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn stamp(mut file: File, token: &str) -> io::Result<()> {
        writeln!(file, "{}", token)?;
        file.sync_all()
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age > stale_after)
            .unwrap_or(false)
    }

    /// 过期锁的持有者标识；锁不存在或未过期返回 `None`
    fn stale_token(path: &Path, stale_after: Duration) -> Option<String> {
        if !Self::is_stale(path, stale_after) {
            return None;
        }
        fs::read_to_string(path).ok().map(|c| c.trim().to_string())
    }

    /// 回收 `observed` 持有的过期锁，返回是否真的删掉了它
    fn reclaim(path: &Path, observed: &str, stale_after: Duration) -> io::Result<bool> {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".stale-{}", unique_token()));
        let tombstone = path.with_file_name(name);

        match fs::rename(path, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }

        let moved = fs::read_to_string(&tombstone).unwrap_or_default();
        if moved.trim() == observed && Self::is_stale(&tombstone, stale_after) {
            fs::remove_file(&tombstone)?;
            return Ok(true);
        }

        // hard_link 不覆盖已存在的文件，期间又有人拿到锁时不会顶掉它
        if let Err(e) = fs::hard_link(&tombstone, path) {
            warn!("could not restore live lock {}: {}", path.display(), e);
        }
        fs::remove_file(&tombstone)?;
        Ok(false)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.token => {
                let _ = fs::remove_file(&self.path);
            }
            Ok(_) => warn!("{} no longer holds our lock, leaving it", self.path.display()),
            Err(e) => debug!("lock {} already gone: {}", self.path.display(), e),
        }
    }
}

/// 内存存储，测试和嵌入场景使用
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<RunResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RunResult> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn append(&self, result: &RunResult) -> Result<(), ResultError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| ResultError::Format("memory sink poisoned".to_string()))?;
        records.push(result.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
