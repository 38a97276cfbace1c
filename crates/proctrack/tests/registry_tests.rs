#![cfg(unix)]

use proctrack::{
    MonitorEvent, MonitorHandlers, MonitorSpec, ProcessHub, RegistryConfig, Signal,
    FORCED_TERMINATION_EXIT_CODE,
};
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

fn hub() -> ProcessHub {
    init_tracing();
    ProcessHub::new(RegistryConfig::default()).unwrap()
}

/// Start `sleep 5` without a timeout
#[tokio::test]
async fn test_start_returns_immediately_without_timeout() {
    let hub = hub();
    let started = Instant::now();
    let result = hub.sessions.start("sleep 5", None, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(result.is_running);
    assert!(result.exit_code.is_none());
    assert!(
        hub.sessions
            .list()
            .await
            .iter()
            .any(|info| info.session_id == result.session_id && info.is_running)
    );

    assert!(hub.sessions.terminate(&result.session_id).await.unwrap());
}

/// Start `echo hi` with a timeout long enough for it to finish
#[tokio::test]
async fn test_start_with_timeout_waits_for_exit() {
    let hub = hub();
    let started = Instant::now();
    let result = hub
        .sessions
        .start("echo hi", None, Some(Duration::from_secs(2)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(1500));
    assert!(result.output.contains("hi\n"));
    assert!(!result.is_running);
    assert_eq!(result.exit_code, Some(0));

    // Output returned by start counts as read
    let again = hub.sessions.read(&result.session_id).await.unwrap();
    assert_eq!(again.output, "");
    assert_eq!(again.exit_code, Some(0));
}

#[tokio::test]
async fn test_elapsed_timeout_keeps_process_running() {
    let hub = hub();
    let result = hub
        .sessions
        .start(
            "echo before; sleep 1; echo after",
            None,
            Some(Duration::from_millis(300)),
        )
        .await
        .unwrap();

    assert!(result.is_running);
    assert_eq!(result.output, "before\n");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let later = hub.sessions.read(&result.session_id).await.unwrap();
    assert_eq!(later.output, "after\n");
    assert!(!later.is_running);
    assert_eq!(later.exit_code, Some(0));
}

#[tokio::test]
async fn test_reads_are_incremental() {
    let hub = hub();
    let result = hub
        .sessions
        .start(
            "echo one; sleep 0.4; echo two >&2; sleep 0.4; echo three",
            None,
            None,
        )
        .await
        .unwrap();

    let mut collected = result.output;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let chunk = hub.sessions.read(&result.session_id).await.unwrap();
        collected.push_str(&chunk.output);
        if !chunk.is_running || Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // The exit can be reported before the last chunk is read
    tokio::time::sleep(Duration::from_millis(300)).await;
    collected.push_str(&hub.sessions.read(&result.session_id).await.unwrap().output);

    assert_eq!(collected, "one\ntwo\nthree\n");
    assert_eq!(hub.sessions.read(&result.session_id).await.unwrap().output, "");
}

/// Terminate a running session
#[tokio::test]
async fn test_terminate_sets_sentinel_exit_code() {
    let hub = hub();
    let result = hub.sessions.start("sleep 30", None, None).await.unwrap();

    assert!(hub.sessions.terminate(&result.session_id).await.unwrap());
    let after = hub.sessions.read(&result.session_id).await.unwrap();
    assert!(!after.is_running);
    assert_eq!(after.exit_code, Some(FORCED_TERMINATION_EXIT_CODE));

    // Idempotent, and the exit code is never overwritten
    assert!(hub.sessions.terminate(&result.session_id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;
    let info = hub.sessions.get(&result.session_id).await.unwrap();
    assert_eq!(info.exit_code, Some(FORCED_TERMINATION_EXIT_CODE));
}

#[tokio::test]
async fn test_terminate_after_natural_exit_keeps_code() {
    let hub = hub();
    let result = hub
        .sessions
        .start("exit 7", None, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(7));

    assert!(hub.sessions.terminate(&result.session_id).await.unwrap());
    assert_eq!(
        hub.sessions.read(&result.session_id).await.unwrap().exit_code,
        Some(7)
    );
}

#[tokio::test]
async fn test_session_runs_in_working_directory() {
    let hub = hub();
    let dir = std::env::temp_dir();
    let result = hub
        .sessions
        .start("pwd", Some(dir.as_path()), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    let reported = std::fs::canonicalize(result.output.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(&dir).unwrap());
}

/// A monitored process printing 20 lines with a 5 line limit
#[tokio::test]
async fn test_monitor_output_limit() {
    let hub = hub();
    let spec = MonitorSpec::builder()
        .command("for i in $(seq 1 20); do echo line $i; done")
        .use_shell(true)
        .output_limit(5usize)
        .build()
        .unwrap();

    let (handlers, mut rx) = MonitorHandlers::channel();
    let (started, _) = hub
        .monitors
        .start_monitoring_with(&spec, handlers)
        .await
        .unwrap();

    let mut delivered = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            MonitorEvent::Stdout(lines) => delivered.extend(lines),
            MonitorEvent::Exit(exit) => {
                assert_eq!(exit.exit_code, Some(0));
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // Subscribers see every line even though the buffer keeps only five
    assert_eq!(delivered.len(), 20);

    let output = hub.monitors.get_output(started.pid, None, true).await;
    let expected: Vec<String> = (16..=20).map(|i| format!("line {i}")).collect();
    assert_eq!(output.stdout, expected);

    let summary = hub.monitors.get(started.pid).await.unwrap();
    assert_eq!(summary.stdout_lines, 5);
    assert_eq!(summary.exit_code, Some(0));
}

/// Kill by a name that matches nothing
#[tokio::test]
async fn test_kill_by_unknown_name_is_zero() {
    let hub = hub();
    let killed = hub
        .controller
        .kill_by_name("definitely-not-a-real-process", Signal::Terminate, false)
        .await;
    assert_eq!(killed, 0);
}

#[tokio::test]
async fn test_kill_all_honours_exclusions() {
    let hub = hub();
    let keep = hub.sessions.start("exec sleep 30", None, None).await.unwrap();
    let victim = hub.sessions.start("exec sleep 31", None, None).await.unwrap();
    let keep_pid = hub.sessions.get(&keep.session_id).await.unwrap().pid.unwrap();

    let killed = hub
        .aggregator
        .kill_all(Signal::Kill, true, &[keep_pid])
        .await;
    assert_eq!(killed, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(hub.sessions.get(&keep.session_id).await.unwrap().is_running);
    let killed_session = hub.sessions.get(&victim.session_id).await.unwrap();
    assert!(!killed_session.is_running);
    assert_eq!(killed_session.exit_code, Some(FORCED_TERMINATION_EXIT_CODE));

    hub.sessions.terminate(&keep.session_id).await.unwrap();
}

#[tokio::test]
async fn test_kill_by_command_pattern_filters() {
    let hub = hub();
    let spec = |seconds: &str| {
        MonitorSpec::builder()
            .command("sleep")
            .args([seconds])
            .build()
            .unwrap()
    };
    let target = hub.monitors.start_monitoring(&spec("41")).await.unwrap();
    let other = hub.monitors.start_monitoring(&spec("42")).await.unwrap();

    let killed = hub
        .aggregator
        .kill_by_command_pattern(r"^sleep 41$", Signal::Terminate, false)
        .await
        .unwrap();
    assert_eq!(killed, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!hub.monitors.get(target.pid).await.unwrap().is_running);
    assert!(hub.monitors.get(other.pid).await.unwrap().is_running);

    assert!(hub.monitors.stop_monitoring(other.pid).await);
}
