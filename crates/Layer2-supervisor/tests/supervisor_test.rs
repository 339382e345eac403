//! Supervisor 통합 테스트 - 실제 자식 프로세스 사용
//!
//! `cargo test -p warden-supervisor --test supervisor_test`

#![cfg(unix)]

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use warden_foundation::{JsonStore, WardenConfig};
use warden_supervisor::process::os;
use warden_supervisor::{
    JsonSnapshotStore, LifecycleEvent, ProcessRef, ReadinessConfig, StartOptions, StartSpec,
    Supervisor,
};

fn config(dir: &TempDir) -> WardenConfig {
    WardenConfig {
        state_dir: dir.path().to_path_buf(),
        stop_grace_ms: 500,
        restart_settle_ms: 50,
        persist_debounce_ms: 50,
        reattach: true,
        ..Default::default()
    }
}

fn supervisor(dir: &TempDir) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(config(dir)))
}

fn sh(script: &str) -> StartSpec {
    StartSpec::new("sh", vec!["-c".to_string(), script.to_string()])
}

fn sleeper() -> StartSpec {
    StartSpec::new("sleep", vec!["30".to_string()])
}

/// 열려 있지 않은 포트
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    listener.local_addr().expect("no addr").port()
}

#[tokio::test]
async fn test_concurrent_singleton_starts_share_one_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);

    let spec = sleeper().with_options(StartOptions {
        singleton: true,
        ..Default::default()
    });
    let results: Vec<_> = join_all((0..4).map(|_| supervisor.start(spec.clone())))
        .await
        .into_iter()
        .map(|r| r.expect("start failed"))
        .collect();

    let pid = results[0].pid;
    assert!(results.iter().all(|r| r.pid == pid));
    assert_eq!(results.iter().filter(|r| !r.reused).count(), 1);
    assert_eq!(supervisor.list(true, None).await.len(), 1);

    supervisor.shutdown().await;
    assert!(!os::is_alive(pid));
}

#[tokio::test]
async fn test_port_readiness_succeeds_when_listening() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let spec = sleeper().with_options(StartOptions {
        readiness: Some(ReadinessConfig::port(port).with_timeout_ms(2000)),
        ..Default::default()
    });
    let result = supervisor.start(spec).await.unwrap();

    assert!(result.ready);
    assert!(result.ready_at.is_some());
    assert!(result.ports.contains(&port));
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_readiness_timeout_keeps_process_running() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);
    let port = closed_port().await;

    let spec = sleeper().with_options(StartOptions {
        readiness: Some(
            ReadinessConfig::port(port)
                .with_timeout_ms(500)
                .with_interval_ms(100),
        ),
        ..Default::default()
    });
    let started = Instant::now();
    let result = supervisor.start(spec).await.expect("start must not fail on readiness");
    let elapsed = started.elapsed();

    assert!(!result.ready);
    assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "elapsed {:?}", elapsed);
    assert!(result.last_error.unwrap().contains("timeout"));

    let status = supervisor.status(&ProcessRef::Pid(result.pid)).await.unwrap();
    assert!(status.process.running);
    assert!(!status.process.ready);
    assert!(os::is_alive(result.pid));
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_readiness_fails_fast_when_process_exits() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);
    let port = closed_port().await;

    let spec = sh("exit 3").with_options(StartOptions {
        readiness: Some(ReadinessConfig::port(port).with_timeout_ms(10_000)),
        ..Default::default()
    });
    let started = Instant::now();
    let result = supervisor.start(spec).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.ready);
    assert!(result.last_error.unwrap().contains("exited"));
}

#[tokio::test]
async fn test_log_readiness_and_port_discovery() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);

    let spec = sh("echo 'Server LISTENING on http://localhost:4567'; echo 'Error: boom' >&2; sleep 30")
        .with_options(StartOptions {
            name: Some("api".to_string()),
            readiness: Some(ReadinessConfig::log("listening").with_timeout_ms(3000)),
            ..Default::default()
        });
    let result = supervisor.start(spec).await.unwrap();
    assert!(result.ready);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = supervisor.status(&ProcessRef::Name("api".to_string())).await.unwrap();
    assert!(status.process.ports.contains(&4567));
    assert_eq!(status.error_count, 1);

    let errors = supervisor
        .logs(&ProcessRef::Pid(result.pid), None, true)
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].content.contains("boom"));

    assert_eq!(supervisor.find_by_port(4567).await.len(), 1);
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_log_readiness_ignores_command_line() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);

    // 패턴이 커맨드 라인에도 있지만 출력은 타임아웃 이후에 나온다
    let spec = sh("sleep 3; echo ready").with_options(StartOptions {
        readiness: Some(ReadinessConfig::log("ready").with_timeout_ms(1000)),
        ..Default::default()
    });
    let started = Instant::now();
    let result = supervisor.start(spec).await.unwrap();

    assert!(!result.ready);
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(result.last_error.unwrap().contains("timeout"));
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_graceful_then_forced_stop() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);

    let result = supervisor.start(sh("trap '' TERM; sleep 30")).await.unwrap();
    // trap 설치 대기
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let stopped = supervisor
        .stop(ProcessRef::Pid(result.pid), false)
        .await
        .expect("stop failed");

    assert!(stopped.forced);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(!os::is_alive(result.pid));
}

#[tokio::test]
async fn test_second_stop_is_not_found() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);
    let result = supervisor.start(sleeper()).await.unwrap();

    let first = supervisor.stop(ProcessRef::Pid(result.pid), false).await.unwrap();
    assert!(!first.forced);

    let second = supervisor.stop(ProcessRef::Pid(result.pid), false).await.unwrap_err();
    assert_eq!(second.kind(), "not_found");

    // 로그는 보관 기간 동안 남는다
    assert!(supervisor.logs(&ProcessRef::Pid(result.pid), None, false).await.is_ok());
}

#[tokio::test]
async fn test_unexpected_exit_is_reported_as_crash() {
    let dir = TempDir::new().unwrap();
    let supervisor = Arc::new(Supervisor::new(WardenConfig {
        crash_grace_ms: 0,
        ..config(&dir)
    }));
    let mut events = supervisor.events().receiver();

    let result = supervisor.start(sh("sleep 0.2; exit 2")).await.unwrap();

    let exited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(LifecycleEvent::ProcessExited {
                code,
                unexpected,
                crashed,
                ..
            }) = events.recv().await
            {
                return (code, unexpected, crashed);
            }
        }
    })
    .await
    .expect("no exit event");
    assert_eq!(exited, (Some(2), true, true));

    // 종료된 엔트리는 purge 전까지 남는다
    let process = supervisor.process(result.pid).await.unwrap();
    assert!(!process.running);
    assert_eq!(process.last_error.as_deref(), Some("crashed (exit code 2)"));
}

#[tokio::test]
async fn test_restart_replaces_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = supervisor(&dir);
    let spec = sleeper().with_options(StartOptions {
        name: Some("worker".to_string()),
        ..Default::default()
    });
    let first = supervisor.start(spec).await.unwrap();

    let restarted = supervisor
        .restart(ProcessRef::Name("worker".to_string()), false)
        .await
        .unwrap();
    assert_eq!(restarted.old_pid, first.pid);
    assert_ne!(restarted.new_pid, first.pid);
    assert_eq!(supervisor.restart_count("worker").await, 1);
    assert!(!os::is_alive(first.pid));
    assert!(supervisor.process(restarted.new_pid).await.unwrap().running);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_reattach_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonSnapshotStore::new(JsonStore::new(dir.path()), "processes.json"));

    let first = Arc::new(Supervisor::new(config(&dir)).with_snapshot_store(store.clone()));
    let result = first.start(sleeper()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store.path().exists());

    let second = Arc::new(Supervisor::new(config(&dir)).with_snapshot_store(store));
    assert_eq!(second.reattach().await, 1);

    let listed = second.list(true, None).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].pid, result.pid);
    assert!(listed[0].reattached);

    second.stop(ProcessRef::Pid(result.pid), false).await.unwrap();
    assert!(second.list(true, None).await.is_empty());
}
