use proctrack_core::ProcessManagerFactory;

/// Process manager for the platform this crate was compiled for
#[cfg(unix)]
pub type PlatformProcessManager = proctrack_unix::UnixProcessManager;

/// Process manager for the platform this crate was compiled for
#[cfg(windows)]
pub type PlatformProcessManager = proctrack_windows::WindowsProcessManager;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    type Manager = PlatformProcessManager;

    fn create_process_manager() -> Self::Manager {
        #[cfg(unix)]
        return proctrack_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return proctrack_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return proctrack_unix::UnixProcessManagerFactory::platform_name();

        #[cfg(windows)]
        return proctrack_windows::WindowsProcessManagerFactory::platform_name();
    }
}
