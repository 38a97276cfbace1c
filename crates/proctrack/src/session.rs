//! One-shot command sessions with cursor-based incremental reads.

use crate::capture::drain_readers;
use crate::sync::mutex_lock_or_recover;
use crate::types::{SessionInfo, SessionOutput};
use chrono::{DateTime, Utc};
use proctrack_core::{
    FORCED_TERMINATION_EXIT_CODE, OutputStream, ProcessError, ProcessHandle, ProcessId,
    ProcessManager, RegistryConfig, SessionBuffer, Signal, SpawnRequest, StreamKind,
    TerminationResult, stream_chunks,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type SessionMap = RwLock<HashMap<String, Arc<SessionEntry>>>;

struct SessionState {
    buffer: SessionBuffer,
    is_running: bool,
    exit_code: Option<i32>,
    finished_at: Option<Instant>,
}

/// How far a session has got towards being fully collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Exit status known; trailing output may still be arriving
    Exited,
    /// Readers reached end of stream or the drain timeout gave up on them
    Drained,
}

struct SessionEntry {
    id: String,
    pid: Option<ProcessId>,
    command: String,
    working_directory: PathBuf,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<SessionState>,
    phase: watch::Sender<Phase>,
}

impl SessionEntry {
    fn new(
        id: String,
        pid: Option<ProcessId>,
        command: &str,
        working_directory: PathBuf,
    ) -> Self {
        Self {
            id,
            pid,
            command: command.to_string(),
            working_directory,
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(SessionState {
                buffer: SessionBuffer::new(),
                is_running: true,
                exit_code: None,
                finished_at: None,
            }),
            phase: watch::channel(Phase::Running).0,
        }
    }

    fn append(&self, chunk: &str) {
        mutex_lock_or_recover(&self.state).buffer.push_str(chunk);
    }

    fn is_running(&self) -> bool {
        mutex_lock_or_recover(&self.state).is_running
    }

    /// Record the end of the session. Only the first call has any effect.
    fn finish(&self, exit_code: i32) -> bool {
        let changed = {
            let mut state = mutex_lock_or_recover(&self.state);
            if state.is_running {
                state.is_running = false;
                state.exit_code = Some(exit_code);
                state.finished_at = Some(Instant::now());
                true
            } else {
                false
            }
        };
        self.phase.send_if_modified(|phase| {
            let running = *phase == Phase::Running;
            if running {
                *phase = Phase::Exited;
            }
            running
        });
        changed
    }

    fn read_new(&self) -> SessionOutput {
        let mut state = mutex_lock_or_recover(&self.state);
        SessionOutput {
            session_id: self.id.clone(),
            output: state.buffer.read_new(),
            is_running: state.is_running,
            exit_code: state.exit_code,
        }
    }

    fn info(&self) -> SessionInfo {
        let state = mutex_lock_or_recover(&self.state);
        let end = state.finished_at.unwrap_or_else(Instant::now);
        SessionInfo {
            session_id: self.id.clone(),
            pid: self.pid,
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
            start_time: self.start_time,
            is_running: state.is_running,
            exit_code: state.exit_code,
            running_time_ms: end.saturating_duration_since(self.started).as_millis() as u64,
        }
    }
}

/// Registry of shell command sessions.
///
/// Each session runs its command through the platform shell, collects stdout
/// and stderr into one interleaved buffer, and hands out each byte at most
/// once through [`SessionRegistry::read`].
pub struct SessionRegistry<M: ProcessManager + 'static> {
    manager: Arc<M>,
    config: RegistryConfig,
    sessions: Arc<SessionMap>,
}

impl<M: ProcessManager + 'static> SessionRegistry<M> {
    pub fn new(manager: Arc<M>, config: RegistryConfig) -> Self {
        Self {
            manager,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start `command` in a new session.
    ///
    /// Without a timeout this returns right away. With one, it waits until the
    /// command exits or the timeout elapses; an elapsed timeout only abandons
    /// the wait and the command keeps running. Once the command has exited,
    /// the rest of the timeout is spent waiting for its trailing output, so a
    /// background child holding the pipes open cannot delay the exit status.
    /// Output returned here counts as read.
    pub async fn start(
        &self,
        command: &str,
        working_directory: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<SessionOutput, ProcessError> {
        let working_directory = resolve_working_directory(working_directory)?;
        let (program, args) = self.manager.shell_invocation(command);
        let request =
            SpawnRequest::new(program, args).working_dir(Some(working_directory.clone()));

        let mut handle = self.manager.spawn_process(&request).await?;

        let entry = Arc::new(SessionEntry::new(
            Uuid::new_v4().to_string(),
            handle.get_pid(),
            command,
            working_directory,
        ));

        info!(
            session_id = %entry.id,
            pid = ?entry.pid,
            command = %command,
            "Started session"
        );

        self.sessions
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());

        let readers = [
            (StreamKind::Stdout, handle.take_stdout()),
            (StreamKind::Stderr, handle.take_stderr()),
        ]
        .into_iter()
        .filter_map(|(kind, stream)| stream.map(|s| spawn_reader(entry.clone(), kind, s)))
        .collect();

        tokio::spawn(watch_exit(
            entry.clone(),
            handle,
            readers,
            self.config.output_drain_timeout(),
            self.config.session_retention(),
            Arc::downgrade(&self.sessions),
        ));

        if let Some(timeout) = timeout {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut phase = entry.phase.subscribe();
            let exited =
                tokio::time::timeout_at(deadline, phase.wait_for(|p| *p != Phase::Running))
                    .await
                    .is_ok();
            if !exited {
                debug!(session_id = %entry.id, "Session still running after start timeout");
            } else if tokio::time::timeout_at(deadline, phase.wait_for(|p| *p == Phase::Drained))
                .await
                .is_err()
            {
                debug!(session_id = %entry.id, "Session output still open after start timeout");
            }
        }

        Ok(entry.read_new())
    }

    /// Output produced since the previous read, plus current status
    pub async fn read(&self, session_id: &str) -> Result<SessionOutput, ProcessError> {
        Ok(self.lookup(session_id).await?.read_new())
    }

    /// Force-kill a running session.
    ///
    /// A session that already finished reports success and keeps its exit
    /// code. Otherwise the result says whether the OS accepted the signal.
    pub async fn terminate(&self, session_id: &str) -> Result<bool, ProcessError> {
        let entry = self.lookup(session_id).await?;
        if !entry.is_running() {
            return Ok(true);
        }

        let Some(pid) = entry.pid else {
            entry.finish(FORCED_TERMINATION_EXIT_CODE);
            return Ok(true);
        };

        match self.manager.signal_group(pid, Signal::Kill).await {
            TerminationResult::Success => {
                entry.finish(FORCED_TERMINATION_EXIT_CODE);
                info!(session_id = %session_id, pid = %pid, "Terminated session");
                Ok(true)
            }
            // Exited on its own; the exit watcher records the real code
            TerminationResult::ProcessNotFound => Ok(true),
            other => {
                warn!(session_id = %session_id, pid = %pid, result = ?other, "Failed to terminate session");
                Ok(false)
            }
        }
    }

    /// Snapshot of one session's status
    pub async fn get(&self, session_id: &str) -> Result<SessionInfo, ProcessError> {
        Ok(self.lookup(session_id).await?.info())
    }

    /// Snapshot of every session's status, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .await
            .values()
            .map(|entry| entry.info())
            .collect();
        infos.sort_by_key(|info| info.start_time);
        infos
    }

    /// Drop a finished session. Running sessions are kept and `false` is returned.
    pub async fn remove(&self, session_id: &str) -> Result<bool, ProcessError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| ProcessError::SessionNotFound(session_id.to_string()))?;
        if entry.is_running() {
            return Ok(false);
        }
        sessions.remove(session_id);
        debug!(session_id = %session_id, "Removed session");
        Ok(true)
    }

    /// Pid and command of every session that is still running
    pub async fn running_pids(&self) -> Vec<(ProcessId, String)> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|entry| entry.is_running())
            .filter_map(|entry| entry.pid.map(|pid| (pid, entry.command.clone())))
            .collect()
    }

    async fn lookup(&self, session_id: &str) -> Result<Arc<SessionEntry>, ProcessError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProcessError::SessionNotFound(session_id.to_string()))
    }
}

fn resolve_working_directory(dir: Option<&Path>) -> Result<PathBuf, ProcessError> {
    let dir = match dir {
        Some(dir) => std::path::absolute(dir)?,
        None => std::env::current_dir()?,
    };
    if !dir.is_dir() {
        return Err(ProcessError::SpawnFailed(format!(
            "working directory does not exist: {}",
            dir.display()
        )));
    }
    Ok(dir)
}

fn spawn_reader(entry: Arc<SessionEntry>, kind: StreamKind, stream: OutputStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = stream_chunks(stream, |chunk| entry.append(&chunk)).await {
            warn!(session_id = %entry.id, stream = %kind, error = %e, "Session output reader failed");
        }
    })
}

async fn watch_exit<H: ProcessHandle>(
    entry: Arc<SessionEntry>,
    mut handle: H,
    readers: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
    retention: Option<Duration>,
    sessions: Weak<SessionMap>,
) {
    let exit_code = match handle.wait().await {
        Ok(exit) => exit.code_or_sentinel(),
        Err(e) => {
            warn!(session_id = %entry.id, error = %e, "Failed to wait for session process");
            FORCED_TERMINATION_EXIT_CODE
        }
    };
    if entry.finish(exit_code) {
        info!(session_id = %entry.id, exit_code, "Session exited");
    }

    drain_readers(readers, drain_timeout).await;
    entry.phase.send_replace(Phase::Drained);

    let Some(retention) = retention else {
        return;
    };
    tokio::time::sleep(retention).await;
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    if remove_if_current(&sessions, &entry).await {
        debug!(session_id = %entry.id, "Purged finished session");
    }
}

/// Remove `entry` only if it is still the one registered under its id
async fn remove_if_current(sessions: &SessionMap, entry: &Arc<SessionEntry>) -> bool {
    let mut sessions = sessions.write().await;
    if sessions
        .get(&entry.id)
        .is_some_and(|current| Arc::ptr_eq(current, entry))
    {
        sessions.remove(&entry.id);
        true
    } else {
        false
    }
}
