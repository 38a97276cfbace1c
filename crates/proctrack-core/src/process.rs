use crate::error::ProcessError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Exit code recorded when a process was stopped by force or by a signal
pub const FORCED_TERMINATION_EXIT_CODE: i32 = -1;

/// Boxed child output stream handed to reader tasks
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Portable stop intents understood by every platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Ask the process to shut down (SIGTERM on Unix)
    Terminate,
    /// Stop the process immediately (SIGKILL on Unix)
    Kill,
    /// Interrupt the process (SIGINT on Unix)
    Interrupt,
}

impl Signal {
    /// The strongest stop signal available on every platform
    pub const STRONGEST: Signal = Signal::Kill;

    /// Whether the platform is allowed to skip the process's own cleanup
    pub fn is_forceful(&self) -> bool {
        matches!(self, Signal::Kill)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Kill => write!(f, "SIGKILL"),
            Self::Interrupt => write!(f, "SIGINT"),
        }
    }
}

impl std::str::FromStr for Signal {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().trim_start_matches("SIG") {
            "TERM" | "TERMINATE" | "15" => Ok(Signal::Terminate),
            "KILL" | "9" => Ok(Signal::Kill),
            "INT" | "INTERRUPT" | "2" => Ok(Signal::Interrupt),
            other => Err(ProcessError::Other(anyhow::anyhow!(
                "Unsupported signal: {other}"
            ))),
        }
    }
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    /// OS exit code, absent when the process died from a signal
    pub exit_code: Option<i32>,
    /// Name of the terminating signal, if any
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn from_code(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
        }
    }

    /// Exit code with signal deaths folded into the forced-termination sentinel
    pub fn code_or_sentinel(&self) -> i32 {
        self.exit_code.unwrap_or(FORCED_TERMINATION_EXIT_CODE)
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of a signal delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// The operating system accepted the signal
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TerminationResult::Success)
    }

    /// Convert a failed delivery into [`ProcessError::ProcessNotFound`] or
    /// [`ProcessError::SignalFailed`]
    pub fn into_result(self, pid: ProcessId) -> Result<(), ProcessError> {
        match self {
            TerminationResult::Success => Ok(()),
            TerminationResult::ProcessNotFound => Err(ProcessError::ProcessNotFound(pid)),
            TerminationResult::AccessDenied => Err(ProcessError::SignalFailed {
                pid,
                reason: "permission denied".to_string(),
            }),
            TerminationResult::Failed(reason) => Err(ProcessError::SignalFailed { pid, reason }),
        }
    }
}

/// One row of the operating system's process table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRow {
    pub pid: ProcessId,
    /// Full command line, or the executable name when it is unreadable
    pub command: String,
    pub user: Option<String>,
    /// CPU usage in percent
    pub cpu: f32,
    /// Resident memory in percent of total memory
    pub mem: f32,
}

/// Everything a platform needs to start a child
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Overlay merged over the inherited environment; entries here win
    pub env: HashMap<String, String>,
}

impl SpawnRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Trait representing a handle to a spawned child process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None if process has exited)
    fn get_pid(&self) -> Option<ProcessId>;

    /// Take ownership of the child's stdout, once
    fn take_stdout(&mut self) -> Option<OutputStream>;

    /// Take ownership of the child's stderr, once
    fn take_stderr(&mut self) -> Option<OutputStream>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<ExitInfo, ProcessError>;
}

/// Spawning children, either directly or through the platform shell
#[async_trait]
pub trait ProcessLifecycle: Send + Sync {
    /// The type of process handle this lifecycle manager produces
    type Handle: ProcessHandle + 'static;

    /// Spawn a new process with piped stdout/stderr in its own process group
    async fn spawn_process(&self, request: &SpawnRequest) -> Result<Self::Handle, ProcessError>;

    /// Program and arguments that run `command_line` through the platform shell
    fn shell_invocation(&self, command_line: &str) -> (String, Vec<String>);
}

/// Signal delivery by pid
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Send `signal` to a single process
    async fn send_signal(&self, pid: ProcessId, signal: Signal) -> TerminationResult;

    /// Send `signal` to the process group led by `pid`, falling back to the
    /// process tree where groups do not exist
    async fn signal_group(&self, pid: ProcessId, signal: Signal) -> TerminationResult;

    /// Check whether a process with this pid still exists
    async fn is_alive(&self, pid: ProcessId) -> bool;
}

/// Read access to the operating system's process table
pub trait ProcessEnumeration: Send + Sync {
    fn list_processes(&self) -> anyhow::Result<Vec<ProcessRow>>;
}

/// High-level process manager trait that combines lifecycle, termination and enumeration
pub trait ProcessManager: ProcessLifecycle + ProcessTermination + ProcessEnumeration {
    /// Create a new process manager instance
    fn new() -> Self
    where
        Self: Sized;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}
