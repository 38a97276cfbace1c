//! Status snapshots returned by the registries.
//!
//! Field names serialize in camelCase and are kept stable for front-ends.

use chrono::{DateTime, Utc};
use proctrack_core::{ExitInfo, ProcessId};
use serde::Serialize;
use std::path::PathBuf;

/// Output and status returned by `SessionRegistry::start` and `read`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    pub session_id: String,
    pub output: String,
    pub is_running: bool,
    pub exit_code: Option<i32>,
}

/// Status fields of one session, without its buffer or process handle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub pid: Option<ProcessId>,
    pub command: String,
    pub working_directory: PathBuf,
    pub start_time: DateTime<Utc>,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    pub running_time_ms: u64,
}

/// Returned by `MonitorRegistry::start_monitoring`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStarted {
    pub pid: ProcessId,
    pub command: String,
}

/// Buffered lines of a monitored process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSnapshot {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exists: bool,
}

/// Status of one monitored process, without buffer contents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredProcessSummary {
    pub pid: ProcessId,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub running_time_ms: u64,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub last_error: Option<String>,
}

/// Events delivered to monitor subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Stdout(Vec<String>),
    Stderr(Vec<String>),
    Exit(ExitInfo),
    Error(String),
}

/// Which registry an aggregated entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrackedKind {
    #[serde(rename_all = "camelCase")]
    Session { session_id: String },
    Monitored,
}

/// Combined view over sessions and monitored processes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntry {
    #[serde(flatten)]
    pub kind: TrackedKind,
    pub pid: Option<ProcessId>,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    pub running_time_ms: u64,
}

impl From<SessionInfo> for TrackedEntry {
    fn from(info: SessionInfo) -> Self {
        Self {
            kind: TrackedKind::Session {
                session_id: info.session_id,
            },
            pid: info.pid,
            command: info.command,
            start_time: info.start_time,
            is_running: info.is_running,
            exit_code: info.exit_code,
            running_time_ms: info.running_time_ms,
        }
    }
}

impl From<MonitoredProcessSummary> for TrackedEntry {
    fn from(summary: MonitoredProcessSummary) -> Self {
        Self {
            kind: TrackedKind::Monitored,
            pid: Some(summary.pid),
            command: summary.command,
            start_time: summary.start_time,
            is_running: summary.is_running,
            exit_code: summary.exit_code,
            running_time_ms: summary.running_time_ms,
        }
    }
}
