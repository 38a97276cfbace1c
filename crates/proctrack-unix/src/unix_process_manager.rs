#[cfg(unix)]
mod unix_impl {
    use anyhow::Result;
    use async_trait::async_trait;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid as NixPid;
    use proctrack_core::{
        ExitInfo, OutputStream, ProcessEnumeration, ProcessError, ProcessHandle, ProcessId,
        ProcessLifecycle, ProcessManager, ProcessRow, ProcessTermination, Signal, SpawnRequest,
        TerminationResult,
    };
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;
    use std::sync::{Mutex, PoisonError};
    use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    const FALLBACK_SHELL: &str = "/bin/sh";

    fn to_nix(signal: Signal) -> NixSignal {
        match signal {
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Interrupt => NixSignal::SIGINT,
        }
    }

    fn to_nix_pid(pid: ProcessId) -> Option<NixPid> {
        // pid 0 and values that wrap negative would address whole groups
        i32::try_from(pid).ok().filter(|raw| *raw > 0).map(NixPid::from_raw)
    }

    fn classify(pid: ProcessId, signal: Signal, result: nix::Result<()>) -> TerminationResult {
        match result {
            Ok(()) => {
                info!(pid = %pid, signal = %signal, "Sent signal to process");
                TerminationResult::Success
            }
            Err(Errno::ESRCH) => {
                debug!(pid = %pid, "Process not found (already terminated)");
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!(pid = %pid, signal = %signal, "Permission denied to signal process");
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!(pid = %pid, signal = %signal, error = %e, "Failed to signal process");
                TerminationResult::Failed(format!("{signal} failed: {e}"))
            }
        }
    }

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
        pid: Option<ProcessId>,
    }

    impl UnixProcessHandle {
        pub fn new(child: Child) -> Self {
            let pid = child.id();
            Self { child, pid }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
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
            let signal = status
                .signal()
                .and_then(|raw| NixSignal::try_from(raw).ok())
                .map(|sig| sig.as_str().to_string());

            Ok(ExitInfo {
                exit_code: status.code(),
                signal,
            })
        }
    }

    /// Unix-specific process manager: spawning, signals and process table access
    pub struct UnixProcessManager {
        system: Mutex<System>,
    }

    impl Default for UnixProcessManager {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProcessLifecycle for UnixProcessManager {
        type Handle = UnixProcessHandle;

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

            // New process group so the whole pipeline can be signalled at once
            cmd.process_group(0);

            let child = cmd.spawn().map_err(|e| {
                ProcessError::SpawnFailed(format!("{}: {e}", request.program))
            })?;

            if let Some(pid) = child.id() {
                info!(
                    pid = %pid,
                    command = %request.program,
                    args = ?request.args,
                    "Spawned Unix process"
                );
            }

            Ok(UnixProcessHandle::new(child))
        }

        fn shell_invocation(&self, command_line: &str) -> (String, Vec<String>) {
            let shell = std::env::var("SHELL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_SHELL.to_string());
            (shell, vec!["-c".to_string(), command_line.to_string()])
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn send_signal(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
            let Some(nix_pid) = to_nix_pid(pid) else {
                return TerminationResult::Failed(format!("Refusing to signal pid {pid}"));
            };
            classify(pid, signal, signal::kill(nix_pid, to_nix(signal)))
        }

        async fn signal_group(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
            let Some(pgid) = to_nix_pid(pid) else {
                return TerminationResult::Failed(format!("Refusing to signal group {pid}"));
            };

            match signal::killpg(pgid, to_nix(signal)) {
                Ok(()) => {
                    info!(pgid = %pid, signal = %signal, "Sent signal to process group");
                    TerminationResult::Success
                }
                // Not a group leader: fall back to the single process
                Err(Errno::ESRCH) => self.send_signal(pid, signal).await,
                Err(e) => classify(pid, signal, Err(e)),
            }
        }

        async fn is_alive(&self, pid: ProcessId) -> bool {
            let Some(nix_pid) = to_nix_pid(pid) else {
                return false;
            };
            // Signal 0 only checks existence; EPERM means it exists but is not ours
            match signal::kill(nix_pid, None) {
                Ok(()) | Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }
    }

    impl ProcessEnumeration for UnixProcessManager {
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

            let rows = system
                .processes()
                .values()
                .map(|process| {
                    let cmd = process
                        .cmd()
                        .iter()
                        .map(|part| part.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let command = if cmd.is_empty() {
                        process.name().to_string_lossy().into_owned()
                    } else {
                        cmd
                    };
                    let user = process
                        .user_id()
                        .and_then(|uid| users.get_user_by_id(uid))
                        .map(|user| user.name().to_string());

                    ProcessRow {
                        pid: process.pid().as_u32(),
                        command,
                        user,
                        cpu: process.cpu_usage(),
                        mem: (process.memory() as f64 / total_memory * 100.0) as f32,
                    }
                })
                .collect();

            Ok(rows)
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn new() -> Self {
            info!("Initializing Unix process manager with system monitoring");
            Self {
                system: Mutex::new(System::new()),
            }
        }
    }

}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
pub struct UnixProcessHandle;

#[cfg(not(unix))]
pub struct UnixProcessManager;
