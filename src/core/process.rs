//! 带超时的外部命令（ffmpeg / ffprobe / tesseract）
//!
//! stdin 写入、stdout / stderr 读取各占一个线程，主线程只负责等待和计时，
//! 所以引擎不读 stdin 或不关 stdout 都不会让调用方卡住。超时后子进程被
//! kill 并回收，读写线程随管道关闭自行退出。

use log::{debug, warn};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("无法启动 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} 超过 {timeout:?} 未结束，已终止")]
    Timeout { program: String, timeout: Duration },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// 运行命令，`input` 写入 stdin，`timeout` 从启动时开始计算
pub fn run_with_timeout(
    cmd: &mut Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    debug!("running {:?} (timeout {:?})", cmd, timeout);

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;
    let deadline = Instant::now() + timeout;

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        thread::spawn(move || {
            // 引擎提前退出时这里会 BrokenPipe，由退出码说明问题
            if let Err(e) = stdin.write_all(&bytes) {
                debug!("stdin closed early: {}", e);
            }
        });
    }
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!("{} exceeded {:?}, killing it", program, timeout);
            kill(&mut child);
            return Err(CommandError::Timeout { program, timeout });
        }
        Err(e) => {
            kill(&mut child);
            return Err(e.into());
        }
    };

    // 子进程已退出，但它派生的进程可能还占着管道
    let stdout = collect(stdout, deadline).ok_or_else(|| CommandError::Timeout {
        program: program.clone(),
        timeout,
    })??;
    let stderr = collect(stderr, deadline).unwrap_or(Ok(Vec::new()))?;

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut out = Vec::new();
                let _ = tx.send(pipe.read_to_end(&mut out).map(|_| out));
            });
        }
        None => {
            let _ = tx.send(Ok(Vec::new()));
        }
    }
    rx
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// `None` 表示截止时间前没读完
fn collect(rx: Receiver<io::Result<Vec<u8>>>, deadline: Instant) -> Option<io::Result<Vec<u8>>> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(result) => Some(result),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Ok(Vec::new())),
    }
}

pub(crate) fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// 在 `dir` 下写一个可执行的 sh 脚本，用来冒充外部工具
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn test_pipes_input_through() {
        let output =
            run_with_timeout(&mut sh("cat"), Some(b"slide".to_vec()), Duration::from_secs(5))
                .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"slide");
    }

    #[test]
    fn test_stderr_and_exit_code() {
        let output =
            run_with_timeout(&mut sh("echo oops >&2; exit 3"), None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stderr_text(), "oops");
    }

    #[test]
    fn test_engine_ignoring_stdin_times_out() {
        // 输入远大于管道缓冲区，对方又从不读取
        let input = vec![7u8; 4 * 1024 * 1024];
        let started = Instant::now();

        let result = run_with_timeout(&mut sh("sleep 5"), Some(input), Duration::from_millis(500));

        assert!(matches!(result, Err(CommandError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let result = run_with_timeout(
            &mut Command::new("/nonexistent/engine"),
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
