//! Bulk operations across sessions and monitored processes.

use crate::controller::ProcessController;
use crate::monitor::MonitorRegistry;
use crate::session::SessionRegistry;
use crate::types::TrackedEntry;
use proctrack_core::{ProcessError, ProcessId, ProcessManager, Signal};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SessionAggregator<M: ProcessManager + 'static> {
    sessions: Arc<SessionRegistry<M>>,
    monitors: Arc<MonitorRegistry<M>>,
    controller: Arc<ProcessController<M>>,
}

impl<M: ProcessManager + 'static> SessionAggregator<M> {
    pub fn new(
        sessions: Arc<SessionRegistry<M>>,
        monitors: Arc<MonitorRegistry<M>>,
        controller: Arc<ProcessController<M>>,
    ) -> Self {
        Self {
            sessions,
            monitors,
            controller,
        }
    }

    /// Stop every running session and monitored process whose pid is not in
    /// `exclude`. Returns how many were stopped.
    ///
    /// `signal` and `force` apply to sessions only. Monitored processes are
    /// stopped through [`MonitorRegistry::stop_monitoring`], which always asks
    /// politely (SIGTERM on Unix).
    pub async fn kill_all(&self, signal: Signal, force: bool, exclude: &[ProcessId]) -> usize {
        let targets: Vec<ProcessId> = self
            .candidates()
            .await
            .into_iter()
            .map(|(pid, _)| pid)
            .filter(|pid| !exclude.contains(pid))
            .collect();

        let killed = self.stop_each(&targets, signal, force).await;
        info!(killed, excluded = exclude.len(), "Killed all tracked processes");
        killed
    }

    /// Stop every running session and monitored process whose command matches
    /// the regular expression `pattern`.
    ///
    /// As with [`kill_all`](Self::kill_all), `signal` and `force` are ignored
    /// for monitored processes.
    pub async fn kill_by_command_pattern(
        &self,
        pattern: &str,
        signal: Signal,
        force: bool,
    ) -> Result<usize, ProcessError> {
        let regex = Regex::new(pattern).map_err(|e| ProcessError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let targets: Vec<ProcessId> = self
            .candidates()
            .await
            .into_iter()
            .filter(|(_, command)| regex.is_match(command))
            .map(|(pid, _)| pid)
            .collect();

        let killed = self.stop_each(&targets, signal, force).await;
        info!(pattern = %pattern, killed, "Killed tracked processes by command");
        Ok(killed)
    }

    /// Sessions and monitored processes together, oldest first
    pub async fn list_all(&self) -> Vec<TrackedEntry> {
        let mut entries: Vec<TrackedEntry> = self
            .sessions
            .list()
            .await
            .into_iter()
            .map(TrackedEntry::from)
            .chain(self.monitors.list().await.into_iter().map(TrackedEntry::from))
            .collect();
        entries.sort_by_key(|entry| entry.start_time);
        entries
    }

    /// Running pids from both registries, monitored entries first, each pid once
    async fn candidates(&self) -> Vec<(ProcessId, String)> {
        let mut seen = HashSet::new();
        self.monitors
            .pids()
            .await
            .into_iter()
            .chain(self.sessions.running_pids().await)
            .filter(|(pid, _)| seen.insert(*pid))
            .collect()
    }

    async fn stop_each(&self, pids: &[ProcessId], signal: Signal, force: bool) -> usize {
        let mut stopped = 0;
        for &pid in pids {
            let ok = if self.monitors.contains(pid).await {
                self.monitors.stop_monitoring(pid).await
            } else {
                self.controller.kill_by_pid(pid, signal, force).await
            };
            debug!(pid = %pid, ok, "Stop requested");
            if ok {
                stopped += 1;
            }
        }
        stopped
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::PlatformProcessManagerFactory;
    use crate::types::TrackedKind;
    use proctrack_core::{MonitorSpec, ProcessManagerFactory, RegistryConfig};
    use std::time::Duration;

    fn aggregator() -> SessionAggregator<crate::PlatformProcessManager> {
        let manager = Arc::new(PlatformProcessManagerFactory::create_process_manager());
        let config = RegistryConfig::default();
        SessionAggregator::new(
            Arc::new(SessionRegistry::new(manager.clone(), config.clone())),
            Arc::new(MonitorRegistry::new(manager.clone(), config.clone())),
            Arc::new(ProcessController::new(manager, config)),
        )
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let aggregator = aggregator();
        let err = aggregator
            .kill_by_command_pattern("(unclosed", Signal::Terminate, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidPattern { .. }));
        assert!(err.is_caller_error());
    }

    #[tokio::test]
    async fn test_list_all_tags_both_kinds() {
        let aggregator = aggregator();
        let session = aggregator
            .sessions
            .start("exec sleep 5", None, None)
            .await
            .unwrap();
        let spec = MonitorSpec::builder()
            .command("sleep")
            .args(["5"])
            .build()
            .unwrap();
        let monitored = aggregator.monitors.start_monitoring(&spec).await.unwrap();

        let entries = aggregator.list_all().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|entry| entry.kind
            == TrackedKind::Session {
                session_id: session.session_id.clone()
            }));
        assert!(entries
            .iter()
            .any(|entry| entry.kind == TrackedKind::Monitored && entry.pid == Some(monitored.pid)));

        assert_eq!(aggregator.kill_all(Signal::Kill, true, &[]).await, 2);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(aggregator.candidates().await.is_empty());
    }

    #[tokio::test]
    async fn test_forced_kill_all_stops_monitored_process_gracefully() {
        let aggregator = aggregator();
        let spec = MonitorSpec::builder()
            .command("sleep")
            .args(["30"])
            .build()
            .unwrap();
        let monitored = aggregator.monitors.start_monitoring(&spec).await.unwrap();

        assert_eq!(aggregator.kill_all(Signal::Kill, true, &[]).await, 1);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let summary = aggregator.monitors.get(monitored.pid).await.unwrap();
        assert!(!summary.is_running);
        assert_eq!(summary.signal.as_deref(), Some("SIGTERM"));
    }
}
