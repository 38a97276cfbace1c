//! Windows-specific process management implementation

mod windows_process_manager;

pub use windows_process_manager::{WindowsProcessHandle, WindowsProcessManager};

/// Windows-specific process manager factory
pub struct WindowsProcessManagerFactory;

impl proctrack_core::ProcessManagerFactory for WindowsProcessManagerFactory {
    type Manager = WindowsProcessManager;

    fn create_process_manager() -> WindowsProcessManager {
        use proctrack_core::ProcessManager;
        WindowsProcessManager::new()
    }

    fn platform_name() -> &'static str {
        "Windows"
    }
}
