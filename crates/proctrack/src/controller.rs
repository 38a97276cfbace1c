//! Pid- and name-based termination of arbitrary OS processes.

use proctrack_core::{ProcessError, ProcessId, ProcessManager, ProcessRow, RegistryConfig, Signal};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signals processes found through the OS process table, independent of the
/// session and monitor registries
pub struct ProcessController<M: ProcessManager + 'static> {
    manager: Arc<M>,
    config: RegistryConfig,
}

impl<M: ProcessManager + 'static> ProcessController<M> {
    pub fn new(manager: Arc<M>, config: RegistryConfig) -> Self {
        Self { manager, config }
    }

    /// Send `signal` to `pid`, or the strongest stop signal when `force` is set.
    ///
    /// A forced kill that was delivered is re-sent after the escalation grace
    /// if the process is still alive by then. That follow-up runs detached and
    /// this call does not wait for it.
    pub async fn kill_by_pid(&self, pid: ProcessId, signal: Signal, force: bool) -> bool {
        let signal = if force { Signal::STRONGEST } else { signal };
        if let Err(e) = self.signal(pid, signal).await {
            debug!(pid = %pid, error = %e, "Signal not delivered");
            return false;
        }

        if force {
            let manager = self.manager.clone();
            let grace = self.config.kill_escalation_grace();
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                if manager.is_alive(pid).await {
                    warn!(pid = %pid, "Process survived forced kill, sending again");
                    manager.send_signal(pid, Signal::STRONGEST).await;
                }
            });
        }
        true
    }

    /// Send `signal` to `pid` once, without escalation.
    ///
    /// A process that no longer exists is [`ProcessError::ProcessNotFound`];
    /// any other refusal is [`ProcessError::SignalFailed`].
    pub async fn signal(&self, pid: ProcessId, signal: Signal) -> Result<(), ProcessError> {
        self.manager.send_signal(pid, signal).await.into_result(pid)
    }

    /// Pids whose command line matches `pattern`, case-insensitively.
    ///
    /// `pattern` is a regular expression; one that does not compile is matched
    /// literally. The calling process is never included.
    pub async fn find_by_name(&self, pattern: &str) -> Vec<ProcessId> {
        let Some(matcher) = name_matcher(pattern) else {
            return Vec::new();
        };
        let own_pid = std::process::id();
        self.list_processes()
            .await
            .into_iter()
            .filter(|row| row.pid != own_pid && matcher.is_match(&row.command))
            .map(|row| row.pid)
            .collect()
    }

    /// Signal every process matching `pattern`; returns how many were delivered
    pub async fn kill_by_name(&self, pattern: &str, signal: Signal, force: bool) -> usize {
        let pids = self.find_by_name(pattern).await;
        let mut killed = 0;
        for pid in pids {
            if self.kill_by_pid(pid, signal, force).await {
                killed += 1;
            }
        }
        info!(pattern = %pattern, killed, "Killed processes by name");
        killed
    }

    /// Snapshot of the OS process table; empty if it cannot be read
    pub async fn list_processes(&self) -> Vec<ProcessRow> {
        let manager = self.manager.clone();
        match tokio::task::spawn_blocking(move || manager.list_processes()).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to enumerate processes");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Process enumeration task failed");
                Vec::new()
            }
        }
    }

    pub async fn is_alive(&self, pid: ProcessId) -> bool {
        self.manager.is_alive(pid).await
    }
}

fn name_matcher(pattern: &str) -> Option<Regex> {
    let build = |source: &str| RegexBuilder::new(source).case_insensitive(true).build();
    match build(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            debug!(pattern = %pattern, error = %e, "Invalid name pattern, matching literally");
            build(&regex::escape(pattern))
                .inspect_err(|e| warn!(pattern = %pattern, error = %e, "Unusable name pattern"))
                .ok()
        }
    }
}
