//! Runtime - 컴포넌트 배선
//!
//! ```text
//! Supervisor ──LifecycleEvent──▶ HealthMonitor ──HealthEvent──▶ RecoveryEngine
//!     ▲                                                              │
//!     └──────────────── restart / kill-restart 콜백 ─────────────────┘
//! TestRunOrchestrator ──▶ Supervisor (public API)
//! ```
//!
//! 모든 컴포넌트는 하나의 `Lifecycle` 을 공유한다.

use crate::workspace::{FsProjectDetector, FsTaskReader, ProjectDetector, TaskReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use warden_foundation::{Lifecycle, Result, SharedSink, TracingSink, WardenConfig};
use warden_supervisor::{
    HealthMonitor, JsonSnapshotStore, RecoveryEngine, Supervisor, TestRunOrchestrator,
};

pub struct Runtime {
    config: WardenConfig,
    lifecycle: Lifecycle,
    supervisor: Arc<Supervisor>,
    monitor: Arc<HealthMonitor>,
    recovery: Arc<RecoveryEngine>,
    test_runs: Arc<TestRunOrchestrator>,
    tasks: Arc<dyn TaskReader>,
    detector: Arc<dyn ProjectDetector>,
    /// `list_tasks`/`detect_project` 의 기본 root
    workspace_root: PathBuf,
}

impl Runtime {
    /// 컴포넌트를 만들고 연결한 뒤 이전 세션 프로세스에 재연결한다
    pub async fn start(config: WardenConfig) -> Result<Arc<Self>> {
        Self::start_with(config, TracingSink::shared()).await
    }

    pub async fn start_with(config: WardenConfig, telemetry: SharedSink) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.state_dir)?;
        let lifecycle = Lifecycle::new();

        let store = Arc::new(JsonSnapshotStore::new(
            config.state_store(),
            config.snapshot_file.clone(),
        ));
        let supervisor = Arc::new(
            Supervisor::new(config.clone())
                .with_lifecycle(lifecycle.clone())
                .with_telemetry(telemetry.clone())
                .with_snapshot_store(store),
        );

        let monitor = Arc::new(
            HealthMonitor::new(config.health.clone(), supervisor.clone())
                .with_lifecycle(lifecycle.clone())
                .with_telemetry(telemetry.clone()),
        );
        monitor.attach(supervisor.events()).await;

        let recovery = Arc::new(
            RecoveryEngine::new(&config, Arc::new(supervisor.clone()))
                .with_lifecycle(lifecycle.clone())
                .with_telemetry(telemetry),
        );
        recovery.attach(monitor.events()).await;
        recovery.attach_lifecycle(supervisor.events()).await;

        let test_runs = Arc::new(TestRunOrchestrator::new(
            supervisor.clone(),
            &config.test_run,
        ));

        let workspace_root = std::env::current_dir()?;
        let runtime = Arc::new(Self {
            config,
            lifecycle,
            supervisor,
            monitor,
            recovery,
            test_runs,
            tasks: Arc::new(FsTaskReader),
            detector: Arc::new(FsProjectDetector),
            workspace_root,
        });

        // 리스너가 모두 붙은 뒤에 재연결해야 재연결 프로세스도 모니터링된다
        let reattached = runtime.supervisor.reattach().await;
        info!(
            state_dir = %runtime.config.state_dir.display(),
            reattached,
            "Runtime started"
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    pub fn test_runs(&self) -> &Arc<TestRunOrchestrator> {
        &self.test_runs
    }

    pub fn tasks(&self) -> &dyn TaskReader {
        self.tasks.as_ref()
    }

    pub fn detector(&self) -> &dyn ProjectDetector {
        self.detector.as_ref()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// 상대 경로는 workspace root 기준
    pub fn resolve_root(&self, root: Option<&str>) -> PathBuf {
        match root {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => self.workspace_root.join(p),
            None => self.workspace_root.clone(),
        }
    }

    /// 전역 종료. 두 번째 호출부터는 아무 일도 하지 않는다
    pub async fn shutdown(&self) {
        // 먼저 넘겨 두면 이후 새 모니터링과 복구가 시작되지 않는다
        if !self.lifecycle.begin_shutdown() {
            return;
        }
        info!("Shutting down runtime");
        self.test_runs.shutdown().await;
        self.monitor.shutdown().await;
        self.recovery.shutdown().await;
        self.supervisor.shutdown().await;
    }
}
