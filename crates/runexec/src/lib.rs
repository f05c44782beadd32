//! One-shot script execution for the ScriptPad “Run” feature.
//! （提供 ScriptPad「執行」功能使用的單次腳本執行器。）
//!
//! The executor persists the buffer to a uniquely named temporary file,
//! invokes an external interpreter with that file as its sole argument,
//! and captures stdout/stderr. `RunDispatcher` moves the blocking call
//! onto a detached worker thread and hands the finished report back over
//! an `mpsc` channel, so only the UI thread ever touches widget state.
//! 本模組會將緩衝區寫入獨一無二的暫存檔，以該檔案為唯一引數呼叫外部直譯器，
//! 並擷取標準輸出與標準錯誤。`RunDispatcher` 將阻塞呼叫移至獨立工作執行緒，
//! 完成後經由 `mpsc` 通道回傳結果，確保只有 UI 執行緒會更動介面狀態。

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Errors that may surface while staging or executing a script.
/// （準備或執行腳本時有可能發生的錯誤。）
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to stage script to a temporary file: {0}")]
    Stage(io::Error),
    #[error("failed to spawn interpreter: {0}")]
    Spawn(io::Error),
    #[error("failed to read interpreter output: {0}")]
    Output(io::Error),
    #[error("run result channel disconnected")]
    ChannelDisconnected,
}

/// Serializable description of one run: which interpreter, what source.
/// （可序列化的執行設定：使用哪個直譯器、執行什麼原始碼。）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub interpreter: String,
    pub source: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl RunRequest {
    /// Creates a request for the given interpreter and buffer snapshot.
    /// （以指定直譯器與緩衝區快照建立執行要求。）
    pub fn new(interpreter: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            source: source.into(),
            working_dir: None,
        }
    }

    /// Sets the working directory for the child process.
    /// （設定子進程執行的工作目錄。）
    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

/// Name of the Python interpreter expected on the search path.
/// （預期存在於搜尋路徑上的 Python 直譯器名稱。）
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Result information produced by one completed run.
/// （單次執行完成後的結果資訊。）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl RunReport {
    /// Indicates whether the script exited successfully (code `0`).
    /// （判斷腳本是否以 0 代表成功結束。）
    pub fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Text shown in the output console: stdout, then a newline and
    /// stderr when the latter is non-empty.
    /// （輸出視窗顯示的文字：先標準輸出，標準錯誤非空時接一個換行再附上。）
    pub fn console_text(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        if !self.stdout.is_empty() {
            text.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            text.push('\n');
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Runs the request to completion, blocking the calling thread.
/// （以阻塞方式執行要求直到結束。）
///
/// The staged script file is removed when this function returns, on
/// success and failure paths alike; a failed removal is logged and
/// otherwise ignored.
pub fn execute(request: &RunRequest) -> Result<RunReport, RunError> {
    let script = stage_script(&request.source)?;

    let mut command = Command::new(&request.interpreter);
    command
        .arg(script.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &request.working_dir {
        command.current_dir(dir);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let start = Instant::now();
    let child = command.spawn().map_err(RunError::Spawn)?;
    let output = child.wait_with_output().map_err(RunError::Output)?;
    let duration = start.elapsed();

    if let Err(err) = script.close() {
        tracing::warn!(error = %err, "failed to remove staged script file");
    }

    Ok(RunReport {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: duration.as_millis(),
    })
}

/// Writes the source into a uniquely named temporary script file.
/// （將原始碼寫入名稱獨一無二的暫存腳本檔。）
fn stage_script(source: &str) -> Result<NamedTempFile, RunError> {
    let mut file = tempfile::Builder::new()
        .prefix("scriptpad-run-")
        .suffix(".py")
        .tempfile()
        .map_err(RunError::Stage)?;
    file.write_all(source.as_bytes()).map_err(RunError::Stage)?;
    file.flush().map_err(RunError::Stage)?;
    Ok(file)
}

/// Message delivered when a dispatched run finishes.
/// （背景執行結束時送回的訊息。）
#[derive(Debug)]
pub struct RunEvent {
    pub id: u64,
    pub outcome: Result<RunReport, RunError>,
}

/// Hands run requests to detached worker threads and collects their
/// reports on the UI side of an `mpsc` channel.
/// （將執行要求交給獨立工作執行緒，並在 UI 端經由 `mpsc` 通道收取結果。）
///
/// Workers are neither pooled nor joined; a hung interpreter parks its
/// thread forever while the dispatcher keeps serving new runs.
pub struct RunDispatcher {
    tx: Sender<RunEvent>,
    rx: Receiver<RunEvent>,
    next_id: u64,
    pending: usize,
}

impl RunDispatcher {
    /// Creates a dispatcher with an empty channel.
    /// （建立附帶空通道的分派器。）
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            next_id: 1,
            pending: 0,
        }
    }

    /// Starts one background run and returns its id immediately.
    /// （啟動一次背景執行並立即回傳其編號。）
    pub fn spawn(&mut self, request: RunRequest) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending += 1;

        let tx = self.tx.clone();
        thread::spawn(move || {
            tracing::info!(run = id, interpreter = %request.interpreter, "run started");
            let outcome = execute(&request);
            match &outcome {
                Ok(report) => tracing::info!(
                    run = id,
                    exit_code = ?report.exit_code,
                    duration_ms = report.duration_ms,
                    "run finished"
                ),
                Err(err) => tracing::error!(run = id, error = %err, "run failed"),
            }
            let _ = tx.send(RunEvent { id, outcome });
        });
        id
    }

    /// Number of runs dispatched but not yet collected.
    /// （已送出但尚未收取結果的執行數。）
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Attempts to fetch the next finished run without blocking.
    /// （嘗試取得下一筆完成的執行結果，不阻塞。）
    pub fn try_next(&mut self) -> Option<RunEvent> {
        match self.rx.try_recv() {
            Ok(event) => {
                self.pending = self.pending.saturating_sub(1);
                Some(event)
            }
            Err(_) => None,
        }
    }

    /// Waits for a finished run until the timeout, returning `None` on timeout.
    /// （在期限內等待執行結果，逾時回傳 `None`。）
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<RunEvent>, RunError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.pending = self.pending.saturating_sub(1);
                Ok(Some(event))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RunError::ChannelDisconnected),
        }
    }
}

impl Default for RunDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
