//! Long-lived monitored processes with line-bounded output and event
//! subscriptions.

use crate::capture::drain_readers;
use crate::sync::mutex_lock_or_recover;
use crate::types::{MonitorEvent, MonitorStarted, MonitoredProcessSummary, OutputSnapshot};
use chrono::{DateTime, Utc};
use proctrack_core::{
    ExitInfo, LineBuffer, LineSplitter, MonitorSpec, OutputStream, ProcessError, ProcessHandle,
    ProcessId, ProcessManager, RegistryConfig, Signal, SpawnRequest, StreamKind,
    TerminationResult, stream_chunks,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type LinesHandler = Arc<dyn Fn(&[String]) + Send + Sync>;
type ExitHandler = Arc<dyn Fn(&ExitInfo) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

type MonitorMap = RwLock<HashMap<ProcessId, Arc<MonitorEntry>>>;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`MonitorRegistry::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callbacks for the events of one monitored process. Unset kinds are ignored.
///
/// Callbacks run on the process's reader and exit tasks, so they should not
/// block.
#[derive(Clone, Default)]
pub struct MonitorHandlers {
    on_stdout: Option<LinesHandler>,
    on_stderr: Option<LinesHandler>,
    on_exit: Option<ExitHandler>,
    on_error: Option<ErrorHandler>,
}

impl MonitorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stdout(mut self, handler: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(handler));
        self
    }

    pub fn on_stderr(mut self, handler: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(handler));
        self
    }

    pub fn on_exit(mut self, handler: impl Fn(&ExitInfo) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Handlers that forward every event into an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stdout = tx.clone();
        let stderr = tx.clone();
        let exit = tx.clone();
        let handlers = Self::new()
            .on_stdout(move |lines| {
                let _ = stdout.send(MonitorEvent::Stdout(lines.to_vec()));
            })
            .on_stderr(move |lines| {
                let _ = stderr.send(MonitorEvent::Stderr(lines.to_vec()));
            })
            .on_exit(move |info| {
                let _ = exit.send(MonitorEvent::Exit(info.clone()));
            })
            .on_error(move |message| {
                let _ = tx.send(MonitorEvent::Error(message.to_string()));
            });
        (handlers, rx)
    }

    fn dispatch(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Stdout(lines) => {
                if let Some(handler) = &self.on_stdout {
                    handler(lines);
                }
            }
            MonitorEvent::Stderr(lines) => {
                if let Some(handler) = &self.on_stderr {
                    handler(lines);
                }
            }
            MonitorEvent::Exit(info) => {
                if let Some(handler) = &self.on_exit {
                    handler(info);
                }
            }
            MonitorEvent::Error(message) => {
                if let Some(handler) = &self.on_error {
                    handler(message);
                }
            }
        }
    }
}

impl std::fmt::Debug for MonitorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandlers")
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

struct MonitorState {
    stdout: LineBuffer,
    stderr: LineBuffer,
    exit: Option<ExitInfo>,
    last_error: Option<String>,
    /// The exit watcher gave up, so no exit will ever be recorded
    abandoned: bool,
    finished_at: Option<Instant>,
    subscribers: Vec<(SubscriptionId, MonitorHandlers)>,
}

struct MonitorEntry {
    pid: ProcessId,
    command: String,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<MonitorState>,
}

impl MonitorEntry {
    fn new(
        pid: ProcessId,
        command: String,
        limit: usize,
        subscribers: Vec<(SubscriptionId, MonitorHandlers)>,
    ) -> Self {
        Self {
            pid,
            command,
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(MonitorState {
                stdout: LineBuffer::new(limit),
                stderr: LineBuffer::new(limit),
                exit: None,
                last_error: None,
                abandoned: false,
                finished_at: None,
                subscribers,
            }),
        }
    }

    fn has_exited(&self) -> bool {
        mutex_lock_or_recover(&self.state).exit.is_some()
    }

    fn is_abandoned(&self) -> bool {
        mutex_lock_or_recover(&self.state).abandoned
    }

    fn append(&self, kind: StreamKind, lines: Vec<String>) {
        let handlers = {
            let mut state = mutex_lock_or_recover(&self.state);
            match kind {
                StreamKind::Stdout => state.stdout.extend(lines.iter().cloned()),
                StreamKind::Stderr => state.stderr.extend(lines.iter().cloned()),
            }
            state.handlers()
        };
        let event = match kind {
            StreamKind::Stdout => MonitorEvent::Stdout(lines),
            StreamKind::Stderr => MonitorEvent::Stderr(lines),
        };
        publish(&handlers, &event);
    }

    fn record_error(&self, message: String) {
        let handlers = {
            let mut state = mutex_lock_or_recover(&self.state);
            state.last_error = Some(message.clone());
            state.handlers()
        };
        publish(&handlers, &MonitorEvent::Error(message));
    }

    /// Freeze the exit status; later calls are ignored
    fn record_exit(&self, exit: ExitInfo) -> bool {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.exit.is_some() {
            return false;
        }
        state.exit = Some(exit);
        state.finished_at = Some(Instant::now());
        true
    }

    /// Tell subscribers about the exit. Sent after trailing output so that
    /// `Exit` is the last event they see.
    fn publish_exit(&self, exit: ExitInfo) {
        let handlers = mutex_lock_or_recover(&self.state).handlers();
        publish(&handlers, &MonitorEvent::Exit(exit));
    }

    fn summary(&self) -> MonitoredProcessSummary {
        let state = mutex_lock_or_recover(&self.state);
        let end = state.finished_at.unwrap_or_else(Instant::now);
        MonitoredProcessSummary {
            pid: self.pid,
            command: self.command.clone(),
            start_time: self.start_time,
            running_time_ms: end.saturating_duration_since(self.started).as_millis() as u64,
            is_running: state.exit.is_none(),
            exit_code: state.exit.as_ref().and_then(|exit| exit.exit_code),
            signal: state.exit.as_ref().and_then(|exit| exit.signal.clone()),
            stdout_lines: state.stdout.len(),
            stderr_lines: state.stderr.len(),
            last_error: state.last_error.clone(),
        }
    }
}

impl MonitorState {
    fn handlers(&self) -> Vec<MonitorHandlers> {
        self.subscribers
            .iter()
            .map(|(_, handlers)| handlers.clone())
            .collect()
    }
}

fn publish(handlers: &[MonitorHandlers], event: &MonitorEvent) {
    for handler in handlers {
        handler.dispatch(event);
    }
}

/// Registry of monitored processes keyed by pid.
///
/// Exited entries stay readable for `monitor_purge_grace_ms` and are then
/// dropped.
pub struct MonitorRegistry<M: ProcessManager + 'static> {
    manager: Arc<M>,
    config: RegistryConfig,
    monitors: Arc<MonitorMap>,
}

impl<M: ProcessManager + 'static> MonitorRegistry<M> {
    pub fn new(manager: Arc<M>, config: RegistryConfig) -> Self {
        Self {
            manager,
            config,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn and monitor a process described by `spec`
    pub async fn start_monitoring(&self, spec: &MonitorSpec) -> Result<MonitorStarted, ProcessError> {
        self.spawn_monitored(spec, Vec::new()).await
    }

    /// Like [`start_monitoring`](Self::start_monitoring), with `handlers`
    /// subscribed before the first line is read
    pub async fn start_monitoring_with(
        &self,
        spec: &MonitorSpec,
        handlers: MonitorHandlers,
    ) -> Result<(MonitorStarted, SubscriptionId), ProcessError> {
        let id = SubscriptionId::next();
        let started = self.spawn_monitored(spec, vec![(id, handlers)]).await?;
        Ok((started, id))
    }

    async fn spawn_monitored(
        &self,
        spec: &MonitorSpec,
        subscribers: Vec<(SubscriptionId, MonitorHandlers)>,
    ) -> Result<MonitorStarted, ProcessError> {
        let command = spec.display_command();
        let (program, args) = if spec.use_shell {
            self.manager.shell_invocation(&command)
        } else {
            (spec.command.clone(), spec.args.clone())
        };
        let request = SpawnRequest::new(program, args)
            .working_dir(spec.working_directory.clone())
            .env(spec.env.clone());

        let mut handle = self.manager.spawn_process(&request).await?;
        let pid = handle.get_pid().ok_or_else(|| {
            ProcessError::SpawnFailed(format!("{command}: exited before a pid was assigned"))
        })?;

        let limit = spec.output_limit.unwrap_or(self.config.default_output_limit);
        let entry = Arc::new(MonitorEntry::new(pid, command.clone(), limit, subscribers));

        if self
            .monitors
            .write()
            .await
            .insert(pid, entry.clone())
            .is_some()
        {
            warn!(pid = %pid, "Replaced stale monitor entry for reused pid");
        }
        info!(pid = %pid, command = %command, limit, "Started monitoring process");

        let readers = [
            (StreamKind::Stdout, handle.take_stdout()),
            (StreamKind::Stderr, handle.take_stderr()),
        ]
        .into_iter()
        .filter_map(|(kind, stream)| stream.map(|s| spawn_line_reader(entry.clone(), kind, s)))
        .collect();

        tokio::spawn(watch_exit(
            entry,
            handle,
            readers,
            self.config.output_drain_timeout(),
            self.config.monitor_purge_grace(),
            Arc::downgrade(&self.monitors),
        ));

        Ok(MonitorStarted { pid, command })
    }

    /// Ask a monitored process to stop.
    ///
    /// The entry is not purged early, so trailing output stays readable.
    pub async fn stop_monitoring(&self, pid: ProcessId) -> bool {
        let Some(entry) = self.lookup(pid).await else {
            return false;
        };
        if entry.has_exited() {
            return true;
        }

        let result = self.manager.signal_group(pid, Signal::Terminate).await;

        if entry.is_abandoned() {
            remove_if_current(&self.monitors, &entry).await;
            return true;
        }

        match result {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {
                info!(pid = %pid, "Stopped monitored process");
                true
            }
            other => {
                warn!(pid = %pid, result = ?other, "Failed to stop monitored process");
                false
            }
        }
    }

    /// Buffered lines of both streams, optionally limited to `lines` per stream
    pub async fn get_output(
        &self,
        pid: ProcessId,
        lines: Option<usize>,
        from_tail: bool,
    ) -> OutputSnapshot {
        let Some(entry) = self.lookup(pid).await else {
            return OutputSnapshot::default();
        };
        let state = mutex_lock_or_recover(&entry.state);
        let (stdout, stderr) = match lines {
            Some(n) if from_tail => (state.stdout.tail(n), state.stderr.tail(n)),
            Some(n) => (state.stdout.head(n), state.stderr.head(n)),
            None => (state.stdout.to_vec(), state.stderr.to_vec()),
        };
        OutputSnapshot {
            stdout,
            stderr,
            exists: true,
        }
    }

    pub async fn clear_output(&self, pid: ProcessId) -> bool {
        let Some(entry) = self.lookup(pid).await else {
            return false;
        };
        let mut state = mutex_lock_or_recover(&entry.state);
        state.stdout.clear();
        state.stderr.clear();
        debug!(pid = %pid, "Cleared monitored output");
        true
    }

    /// Summaries of every monitored process, oldest first
    pub async fn list(&self) -> Vec<MonitoredProcessSummary> {
        let mut summaries: Vec<MonitoredProcessSummary> = self
            .monitors
            .read()
            .await
            .values()
            .map(|entry| entry.summary())
            .collect();
        summaries.sort_by_key(|summary| summary.start_time);
        summaries
    }

    pub async fn get(&self, pid: ProcessId) -> Option<MonitoredProcessSummary> {
        self.lookup(pid).await.map(|entry| entry.summary())
    }

    /// Register `handlers` for future events of `pid`; `None` if it is not monitored
    pub async fn subscribe(
        &self,
        pid: ProcessId,
        handlers: MonitorHandlers,
    ) -> Option<SubscriptionId> {
        let entry = self.lookup(pid).await?;
        let id = SubscriptionId::next();
        mutex_lock_or_recover(&entry.state)
            .subscribers
            .push((id, handlers));
        debug!(pid = %pid, subscription = ?id, "Subscribed to monitored process");
        Some(id)
    }

    pub async fn unsubscribe(&self, pid: ProcessId, subscription: SubscriptionId) -> bool {
        let Some(entry) = self.lookup(pid).await else {
            return false;
        };
        let mut state = mutex_lock_or_recover(&entry.state);
        let before = state.subscribers.len();
        state.subscribers.retain(|(id, _)| *id != subscription);
        state.subscribers.len() != before
    }

    pub async fn contains(&self, pid: ProcessId) -> bool {
        self.monitors.read().await.contains_key(&pid)
    }

    /// Pid and command of every monitored process that is still running
    pub async fn pids(&self) -> Vec<(ProcessId, String)> {
        self.monitors
            .read()
            .await
            .values()
            .filter(|entry| !entry.has_exited())
            .map(|entry| (entry.pid, entry.command.clone()))
            .collect()
    }

    async fn lookup(&self, pid: ProcessId) -> Option<Arc<MonitorEntry>> {
        self.monitors.read().await.get(&pid).cloned()
    }
}

/// Remove `entry` only if the pid still maps to it and not to a newer process
async fn remove_if_current(monitors: &MonitorMap, entry: &Arc<MonitorEntry>) -> bool {
    let mut monitors = monitors.write().await;
    if monitors
        .get(&entry.pid)
        .is_some_and(|current| Arc::ptr_eq(current, entry))
    {
        monitors.remove(&entry.pid);
        debug!(pid = %entry.pid, "Purged monitored process");
        true
    } else {
        false
    }
}

fn spawn_line_reader(
    entry: Arc<MonitorEntry>,
    kind: StreamKind,
    stream: OutputStream,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut splitter = LineSplitter::new();
        let result = stream_chunks(stream, |chunk| {
            let lines = splitter.push(&chunk);
            if !lines.is_empty() {
                entry.append(kind, lines);
            }
        })
        .await;

        if let Some(line) = splitter.finish() {
            entry.append(kind, vec![line]);
        }
        if let Err(e) = result {
            warn!(pid = %entry.pid, stream = %kind, error = %e, "Monitored output reader failed");
            entry.record_error(format!("{kind} read failed: {e}"));
        }
    })
}

async fn watch_exit<H: ProcessHandle>(
    entry: Arc<MonitorEntry>,
    mut handle: H,
    readers: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
    purge_grace: Duration,
    monitors: Weak<MonitorMap>,
) {
    let exit = match handle.wait().await {
        Ok(exit) => exit,
        Err(e) => {
            warn!(pid = %entry.pid, error = %e, "Failed to wait for monitored process");
            mutex_lock_or_recover(&entry.state).abandoned = true;
            entry.record_error(format!("wait failed: {e}"));
            return;
        }
    };
    let first = entry.record_exit(exit.clone());
    if first {
        info!(
            pid = %entry.pid,
            exit_code = ?exit.exit_code,
            signal = ?exit.signal,
            "Monitored process exited"
        );
    }

    drain_readers(readers, drain_timeout).await;
    if first {
        entry.publish_exit(exit);
    }

    tokio::time::sleep(purge_grace).await;
    if let Some(monitors) = monitors.upgrade() {
        remove_if_current(&monitors, &entry).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::PlatformProcessManagerFactory;
    use proctrack_core::ProcessManagerFactory;

    fn registry(config: RegistryConfig) -> MonitorRegistry<crate::PlatformProcessManager> {
        MonitorRegistry::new(
            Arc::new(PlatformProcessManagerFactory::create_process_manager()),
            config,
        )
    }

    fn shell(script: &str) -> MonitorSpec {
        MonitorSpec::builder()
            .command("/bin/sh")
            .args(["-c", script])
            .build()
            .unwrap()
    }

    async fn collect_until_exit(
        rx: &mut mpsc::UnboundedReceiver<MonitorEvent>,
    ) -> (Vec<MonitorEvent>, ExitInfo) {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("monitored process did not exit in time")
                .expect("event channel closed");
            if let MonitorEvent::Exit(info) = event {
                return (events, info);
            }
            events.push(event);
        }
    }

    #[tokio::test]
    async fn test_output_limit_keeps_latest_lines() {
        let monitors = registry(RegistryConfig::default());
        let mut spec = shell("for i in $(seq 1 20); do echo line $i; done");
        spec.output_limit = Some(5);

        let (handlers, mut rx) = MonitorHandlers::channel();
        let (started, _) = monitors.start_monitoring_with(&spec, handlers).await.unwrap();
        let (_, exit) = collect_until_exit(&mut rx).await;
        assert_eq!(exit.exit_code, Some(0));

        let output = monitors.get_output(started.pid, None, true).await;
        assert!(output.exists);
        let expected: Vec<String> = (16..=20).map(|i| format!("line {i}")).collect();
        assert_eq!(output.stdout, expected);

        let head = monitors.get_output(started.pid, Some(2), false).await;
        assert_eq!(head.stdout, vec!["line 16", "line 17"]);
        let tail = monitors.get_output(started.pid, Some(2), true).await;
        assert_eq!(tail.stdout, vec!["line 19", "line 20"]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_exactly_new_lines() {
        let monitors = registry(RegistryConfig::default());
        let spec = shell("echo out1; echo err1 >&2; printf 'partial'");

        let (handlers, mut rx) = MonitorHandlers::channel();
        monitors.start_monitoring_with(&spec, handlers).await.unwrap();
        let (events, exit) = collect_until_exit(&mut rx).await;

        let stdout: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::Stdout(lines) => Some(lines.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        let stderr: Vec<String> = events
            .iter()
            .filter_map(|event| match event {
                MonitorEvent::Stderr(lines) => Some(lines.clone()),
                _ => None,
            })
            .flatten()
            .collect();

        assert_eq!(stdout, vec!["out1", "partial"]);
        assert_eq!(stderr, vec!["err1"]);
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let monitors = registry(RegistryConfig::default());
        let started = monitors
            .start_monitoring(&shell("sleep 0.3; echo late"))
            .await
            .unwrap();

        let (handlers, mut rx) = MonitorHandlers::channel();
        let id = monitors.subscribe(started.pid, handlers).await.unwrap();
        assert!(monitors.unsubscribe(started.pid, id).await);
        assert!(!monitors.unsubscribe(started.pid, id).await);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(
            monitors.get_output(started.pid, None, true).await.stdout,
            vec!["late"]
        );
    }

    #[tokio::test]
    async fn test_unknown_pid_reports_absence() {
        let monitors = registry(RegistryConfig::default());
        let missing = u32::MAX - 1;

        assert!(!monitors.stop_monitoring(missing).await);
        assert!(!monitors.clear_output(missing).await);
        assert!(monitors.subscribe(missing, MonitorHandlers::new()).await.is_none());
        assert_eq!(monitors.get_output(missing, None, true).await, OutputSnapshot::default());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let monitors = registry(RegistryConfig::default());
        let spec = MonitorSpec::builder()
            .command("/definitely/not/a/binary")
            .build()
            .unwrap();
        assert!(matches!(
            monitors.start_monitoring(&spec).await,
            Err(ProcessError::SpawnFailed(_))
        ));
        assert!(monitors.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_and_purge_after_grace() {
        let config = RegistryConfig {
            monitor_purge_grace_ms: 200,
            ..Default::default()
        };
        let monitors = registry(config);
        let (handlers, mut rx) = MonitorHandlers::channel();
        let (started, _) = monitors
            .start_monitoring_with(&shell("exec sleep 30"), handlers)
            .await
            .unwrap();

        assert_eq!(monitors.pids().await.len(), 1);
        assert!(monitors.stop_monitoring(started.pid).await);

        let (_, exit) = collect_until_exit(&mut rx).await;
        assert_eq!(exit.signal.as_deref(), Some("SIGTERM"));

        // Still readable during the grace window
        let summary = monitors.get(started.pid).await.unwrap();
        assert!(!summary.is_running);
        assert!(monitors.stop_monitoring(started.pid).await);
        assert!(monitors.pids().await.is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!monitors.contains(started.pid).await);
    }

    #[tokio::test]
    async fn test_exit_is_visible_while_background_child_holds_output() {
        let monitors = registry(RegistryConfig::default());
        let (handlers, mut rx) = MonitorHandlers::channel();
        let (started, _) = monitors
            .start_monitoring_with(&shell("echo hi; sleep 10 &"), handlers)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let summary = monitors.get(started.pid).await.unwrap();
        assert!(!summary.is_running);
        assert_eq!(summary.exit_code, Some(0));
        assert!(monitors.pids().await.is_empty());
        assert!(monitors.stop_monitoring(started.pid).await);

        // The exit event still follows the trailing output
        let (events, exit) = collect_until_exit(&mut rx).await;
        assert_eq!(exit.exit_code, Some(0));
        assert_eq!(events, vec![MonitorEvent::Stdout(vec!["hi".to_string()])]);
    }

    #[tokio::test]
    async fn test_purge_spares_newer_process_with_reused_pid() {
        let map: MonitorMap = RwLock::new(HashMap::new());
        let old = Arc::new(MonitorEntry::new(4242, "old".to_string(), 10, Vec::new()));
        let newer = Arc::new(MonitorEntry::new(4242, "newer".to_string(), 10, Vec::new()));
        map.write().await.insert(4242, newer.clone());

        assert!(!remove_if_current(&map, &old).await);
        assert_eq!(map.read().await.get(&4242).unwrap().command, "newer");

        assert!(remove_if_current(&map, &newer).await);
        assert!(map.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_output_keeps_subscriptions() {
        let monitors = registry(RegistryConfig::default());
        let (handlers, mut rx) = MonitorHandlers::channel();
        let (started, _) = monitors
            .start_monitoring_with(&shell("echo first; sleep 0.5; echo second"), handlers)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(monitors.clear_output(started.pid).await);
        assert!(monitors.get_output(started.pid, None, true).await.stdout.is_empty());

        let (events, _) = collect_until_exit(&mut rx).await;
        assert!(events.contains(&MonitorEvent::Stdout(vec!["second".to_string()])));
        assert_eq!(
            monitors.get_output(started.pid, None, true).await.stdout,
            vec!["second"]
        );
    }

    #[tokio::test]
    async fn test_use_shell_with_env_overlay() {
        let monitors = registry(RegistryConfig::default());
        let spec = MonitorSpec::builder()
            .command("echo")
            .args(["$PROCTRACK_GREETING"])
            .env("PROCTRACK_GREETING", "hello")
            .use_shell(true)
            .build()
            .unwrap();

        let (handlers, mut rx) = MonitorHandlers::channel();
        let (started, _) = monitors.start_monitoring_with(&spec, handlers).await.unwrap();
        assert_eq!(started.command, "echo $PROCTRACK_GREETING");
        collect_until_exit(&mut rx).await;

        assert_eq!(
            monitors.get_output(started.pid, None, true).await.stdout,
            vec!["hello"]
        );
    }
}
