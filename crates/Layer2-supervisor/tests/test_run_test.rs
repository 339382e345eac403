//! Test run orchestrator / recovery 통합 테스트
//!
//! `cargo test -p warden-supervisor --test test_run_test`

#![cfg(unix)]

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use warden_foundation::{TestRunSettings, WardenConfig};
use warden_supervisor::process::os;
use warden_supervisor::{
    HealthCheckResult, HealthEvent, HealthIssue, HealthMonitor, IssueType, ProcessMetrics, ProcessRef,
    ReadinessConfig, RecoveryEngine, RunProcessSpec, Severity, StartOptions, StartSpec,
    Supervisor, TestRunConfig, TestRunOrchestrator, TestRunState, TestRunStatus,
};

fn config(dir: &TempDir) -> WardenConfig {
    WardenConfig {
        state_dir: dir.path().to_path_buf(),
        stop_grace_ms: 500,
        restart_settle_ms: 50,
        kill_restart_settle_ms: 50,
        test_run: TestRunSettings {
            poll_interval_ms: 100,
        },
        ..Default::default()
    }
}

fn setup(dir: &TempDir) -> (Arc<Supervisor>, Arc<TestRunOrchestrator>) {
    let config = config(dir);
    let supervisor = Arc::new(Supervisor::new(config.clone()));
    let orchestrator = Arc::new(TestRunOrchestrator::new(supervisor.clone(), &config.test_run));
    (supervisor, orchestrator)
}

fn sleeper(name: &str) -> RunProcessSpec {
    let mut spec = RunProcessSpec::new("sleep", vec!["30".to_string()]);
    spec.name = Some(name.to_string());
    spec
}

fn script(body: &str) -> RunProcessSpec {
    RunProcessSpec::new("sh", vec!["-c".to_string(), body.to_string()])
}

async fn wait_terminal(orchestrator: &TestRunOrchestrator, run_id: &str) -> TestRunState {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let state = orchestrator.status(run_id).await.expect("unknown run");
            if state.status.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("run did not finish")
}

#[tokio::test]
async fn test_auto_stop_tears_down_backends() {
    let dir = TempDir::new().unwrap();
    let (supervisor, orchestrator) = setup(&dir);

    let config = TestRunConfig {
        backend: Some(sleeper("api")),
        frontend: Some(sleeper("web")),
        auto_stop: true,
        ..TestRunConfig::new(script("sleep 0.3; exit 1"))
    };
    let started = orchestrator.start_run(config).await.unwrap();
    assert_eq!(started.status, TestRunStatus::Running);
    let backend = started.backend_pid.unwrap();
    let frontend = started.frontend_pid.unwrap();

    let finished = wait_terminal(&orchestrator, &started.run_id).await;
    assert_eq!(finished.status, TestRunStatus::Failed);
    assert_eq!(finished.exit_code, Some(1));

    // 상태 전이 직후 teardown 이 이어진다
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(supervisor.process(backend).await.is_none());
    assert!(supervisor.process(frontend).await.is_none());
    assert!(!os::is_alive(backend));
    assert!(!os::is_alive(frontend));
}

#[tokio::test]
async fn test_failed_test_runner_is_not_recovered() {
    let dir = TempDir::new().unwrap();
    let config = WardenConfig {
        crash_grace_ms: 0,
        ..config(&dir)
    };
    let supervisor = Arc::new(Supervisor::new(config.clone()));
    let monitor = Arc::new(HealthMonitor::new(config.health.clone(), supervisor.clone()));
    monitor.attach(supervisor.events()).await;
    let engine = Arc::new(RecoveryEngine::new(&config, Arc::new(supervisor.clone())));
    engine.attach(monitor.events()).await;
    engine.attach_lifecycle(supervisor.events()).await;
    let orchestrator = Arc::new(TestRunOrchestrator::new(supervisor.clone(), &config.test_run));

    let started = orchestrator
        .start_run(TestRunConfig::new(script("sleep 1; exit 1")))
        .await
        .unwrap();
    let finished = wait_terminal(&orchestrator, &started.run_id).await;
    assert_eq!(finished.status, TestRunStatus::Failed);
    assert_eq!(finished.exit_code, Some(1));

    // 실패한 러너가 다시 떠서는 안 된다
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.stats().await.total_attempts, 0);
    assert!(!supervisor.list(true, None).await.iter().any(|p| p.running));
    let test_pid = finished.test_pid.unwrap();
    assert!(!os::is_alive(test_pid));
    assert_eq!(supervisor.restart_count("test").await, 0);

    monitor.shutdown().await;
    engine.shutdown().await;
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_keep_backends_after_success() {
    let dir = TempDir::new().unwrap();
    let (supervisor, orchestrator) = setup(&dir);

    let config = TestRunConfig {
        run_id: Some("keep".to_string()),
        backend: Some(sleeper("api")),
        keep_backends: true,
        ..TestRunConfig::new(script("sleep 0.2"))
    };
    orchestrator.start_run(config).await.unwrap();

    let finished = wait_terminal(&orchestrator, "keep").await;
    assert_eq!(finished.status, TestRunStatus::Completed);
    assert_eq!(finished.exit_code, Some(0));
    let backend = finished.backend_pid.unwrap();
    assert!(supervisor.process(backend).await.unwrap().running);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_run_id_rejected() {
    let dir = TempDir::new().unwrap();
    let (supervisor, orchestrator) = setup(&dir);

    let config = TestRunConfig {
        run_id: Some("dup".to_string()),
        ..TestRunConfig::new(sleeper("suite"))
    };
    orchestrator.start_run(config.clone()).await.unwrap();
    let err = orchestrator.start_run(config).await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    orchestrator.abort_run("dup").await.unwrap();
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_readiness_failure_fails_run_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let (supervisor, orchestrator) = setup(&dir);
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut backend = sleeper("api");
    backend.readiness = Some(ReadinessConfig::port(port).with_timeout_ms(300));
    let config = TestRunConfig {
        run_id: Some("not-ready".to_string()),
        backend: Some(backend),
        ..TestRunConfig::new(sleeper("suite"))
    };

    let err = orchestrator.start_run(config).await.unwrap_err();
    assert_eq!(err.kind(), "readiness_timeout");

    let state = orchestrator.status("not-ready").await.unwrap();
    assert_eq!(state.status, TestRunStatus::Failed);
    assert!(state.error.is_some());
    assert!(state.test_pid.is_none());
    assert!(supervisor.list(true, None).await.is_empty());
}

#[tokio::test]
async fn test_abort_stops_processes_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (supervisor, orchestrator) = setup(&dir);

    let config = TestRunConfig {
        run_id: Some("abort".to_string()),
        backend: Some(sleeper("api")),
        ..TestRunConfig::new(sleeper("suite"))
    };
    let started = orchestrator.start_run(config).await.unwrap();
    let test_pid = started.test_pid.unwrap();

    let aborted = orchestrator.abort_run("abort").await.unwrap();
    assert_eq!(aborted.status, TestRunStatus::Aborted);
    assert!(!os::is_alive(test_pid));
    assert!(supervisor.list(true, None).await.is_empty());

    let again = orchestrator.abort_run("abort").await.unwrap();
    assert_eq!(again.status, TestRunStatus::Aborted);
    assert_eq!(again.log.len(), aborted.log.len());
    assert_eq!(orchestrator.list().await.len(), 1);
}

#[tokio::test]
async fn test_emergency_recovery_replaces_process() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let supervisor = Arc::new(Supervisor::new(config.clone()));
    let engine = RecoveryEngine::new(&config, Arc::new(supervisor.clone()));

    let spec = StartSpec::new("sleep", vec!["30".to_string()]).with_options(StartOptions {
        name: Some("api".to_string()),
        ..Default::default()
    });
    let started = supervisor.start(spec).await.unwrap();

    let result = HealthCheckResult {
        pid: started.pid,
        name: "api".to_string(),
        is_healthy: false,
        health_score: 0,
        issues: vec![HealthIssue::new(IssueType::Zombie, Severity::Critical, "gone")],
        metrics: ProcessMetrics::default(),
        timestamp: Utc::now(),
    };
    let attempt = engine
        .handle(&HealthEvent::Critical(result))
        .await
        .expect("no recovery attempt");

    assert!(attempt.success, "{:?}", attempt.error);
    let new_pid = attempt.new_pid.unwrap();
    assert_ne!(new_pid, started.pid);
    assert!(!os::is_alive(started.pid));
    assert!(supervisor.process(new_pid).await.unwrap().running);
    assert_eq!(supervisor.restart_count("api").await, 1);

    supervisor.stop(ProcessRef::Pid(new_pid), true).await.unwrap();
}
