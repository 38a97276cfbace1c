use anyhow::Result;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use proctrack_core::*;

/// Windows-specific process handle implementation
pub struct WindowsProcessHandle {
    child: Child,
    pid: Option<ProcessId>,
}

impl WindowsProcessHandle {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }
}

#[async_trait]
impl ProcessHandle for WindowsProcessHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.child
            .stdout
            .take()
            .map(|out| Box::new(out) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.child
            .stderr
            .take()
            .map(|err| Box::new(err) as OutputStream)
    }

    async fn wait(&mut self) -> Result<ExitInfo, ProcessError> {
        let status = self.child.wait().await?;
        // Windows has no signals; taskkill surfaces as an ordinary exit code
        Ok(ExitInfo {
            exit_code: status.code(),
            signal: None,
        })
    }
}

/// Windows-specific process manager built on taskkill and sysinfo
pub struct WindowsProcessManager {
    system: Mutex<System>,
}

impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLifecycle for WindowsProcessManager {
    type Handle = WindowsProcessHandle;

    async fn spawn_process(&self, request: &SpawnRequest) -> Result<Self::Handle, ProcessError> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP
            cmd.creation_flags(0x0800_0000 | 0x0000_0200);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(format!("{}: {e}", request.program)))?;

        if let Some(pid) = child.id() {
            info!(
                pid = %pid,
                command = %request.program,
                args = ?request.args,
                "Spawned Windows process"
            );
        }

        Ok(WindowsProcessHandle::new(child))
    }

    fn shell_invocation(&self, command_line: &str) -> (String, Vec<String>) {
        let shell = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
        (shell, vec!["/C".to_string(), command_line.to_string()])
    }
}

#[async_trait]
impl ProcessTermination for WindowsProcessManager {
    async fn send_signal(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
        self.taskkill(pid, signal.is_forceful(), false).await
    }

    async fn signal_group(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
        // No process groups on Windows; /T takes the whole tree instead
        self.taskkill(pid, signal.is_forceful(), true).await
    }

    async fn is_alive(&self, pid: ProcessId) -> bool {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let target = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        system.process(target).is_some()
    }
}

impl WindowsProcessManager {
    /// Use taskkill to terminate a process, optionally with its tree
    async fn taskkill(&self, pid: ProcessId, force: bool, tree: bool) -> TerminationResult {
        let pid_string = pid.to_string();
        let mut args = vec!["/PID", pid_string.as_str()];
        if tree {
            args.push("/T");
        }
        if force {
            args.push("/F");
        }

        let output = match Command::new("taskkill").args(&args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!(pid = %pid, error = %e, "Failed to run taskkill");
                return TerminationResult::Failed(format!("taskkill failed to start: {e}"));
            }
        };

        if output.status.success() {
            info!(pid = %pid, force, tree, "taskkill accepted termination request");
            return TerminationResult::Success;
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("not found") {
            debug!(pid = %pid, "Process not found (already terminated)");
            TerminationResult::ProcessNotFound
        } else if stderr.contains("access is denied") {
            warn!(pid = %pid, "Permission denied to terminate process");
            TerminationResult::AccessDenied
        } else {
            warn!(pid = %pid, stderr = %stderr.trim(), "taskkill rejected termination request");
            TerminationResult::Failed(stderr.trim().to_string())
        }
    }
}

impl ProcessEnumeration for WindowsProcessManager {
    fn list_processes(&self) -> Result<Vec<ProcessRow>> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );

        let users = Users::new_with_refreshed_list();
        let total_memory = system.total_memory().max(1) as f64;

        Ok(system
            .processes()
            .values()
            .map(|process| {
                let cmd = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                ProcessRow {
                    pid: process.pid().as_u32(),
                    command: if cmd.is_empty() {
                        process.name().to_string_lossy().into_owned()
                    } else {
                        cmd
                    },
                    user: process
                        .user_id()
                        .and_then(|uid| users.get_user_by_id(uid))
                        .map(|user| user.name().to_string()),
                    cpu: process.cpu_usage(),
                    mem: (process.memory() as f64 / total_memory * 100.0) as f32,
                }
            })
            .collect())
    }
}

impl ProcessManager for WindowsProcessManager {
    fn new() -> Self {
        info!("Initializing Windows process manager with system monitoring");
        Self {
            system: Mutex::new(System::new()),
        }
    }
}
