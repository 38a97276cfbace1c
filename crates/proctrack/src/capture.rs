use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Wait for stream readers to reach end of stream, giving up at `timeout`.
///
/// Called after the exit status has been recorded, so it only bounds how long
/// trailing output is waited for. Readers that outlive the deadline (a
/// grandchild still holding the pipe) keep running and keep appending; only
/// the wait is abandoned.
pub(crate) async fn drain_readers(readers: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    for reader in readers {
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            debug!("Output reader still open after drain timeout");
            return;
        }
    }
}
