//! Test Run Orchestrator - backend / frontend / test 순차 기동과 정리
//!
//! ```text
//! start_run ─▶ backend (ready 대기) ─▶ frontend (ready 대기) ─▶ test ─▶ running
//!                                                                    │ poll
//!                                    completed | failed ◀────────────┘
//! ```
//!
//! 기동 중 실패는 run 을 `failed` 로 만들고, 이 run 이 새로 띄운 프로세스를
//! 정리한 뒤 호출자에게 에러를 돌려준다.

use crate::process::{ManagedProcess, ProcessRef, ProcessRole, StartResult};
use crate::state::{RunProcessSpec, TestRunConfig, TestRunState, TestRunStatus};
use crate::supervisor::Supervisor;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_foundation::{Error, Result, TestRunSettings};

/// 구성 요소 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Backend,
    Frontend,
    Test,
}

impl Component {
    fn role(self) -> ProcessRole {
        match self {
            Component::Backend => ProcessRole::Backend,
            Component::Frontend => ProcessRole::Frontend,
            Component::Test => ProcessRole::Test,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Component::Backend => "backend",
            Component::Frontend => "frontend",
            Component::Test => "test",
        }
    }
}

pub struct TestRunOrchestrator {
    supervisor: Arc<Supervisor>,
    poll_interval: Duration,
    runs: RwLock<HashMap<String, TestRunState>>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TestRunOrchestrator {
    pub fn new(supervisor: Arc<Supervisor>, settings: &TestRunSettings) -> Self {
        Self {
            supervisor,
            poll_interval: settings.poll_interval().max(Duration::from_millis(10)),
            runs: RwLock::new(HashMap::new()),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // start
    // ========================================================================

    /// run 시작. 테스트 프로세스가 뜨고 `running` 이 되면 반환한다
    pub async fn start_run(self: &Arc<Self>, config: TestRunConfig) -> Result<TestRunState> {
        config.validate()?;
        let run_id = config
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut runs = self.runs.write().await;
            if runs.contains_key(&run_id) {
                return Err(Error::Validation(format!("test run '{}' already exists", run_id)));
            }
            runs.insert(run_id.clone(), TestRunState::new(run_id.clone(), config.clone()));
        }
        info!(run_id = %run_id, "Starting test run");

        let mut spawned = Vec::new();
        match self.start_sequence(&run_id, &config, &mut spawned).await {
            Ok(true) => {
                self.spawn_poller(&run_id).await;
                self.status(&run_id).await
            }
            // 기동 중 abort 됨
            Ok(false) => {
                self.stop_all(&spawned).await;
                self.status(&run_id).await
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Test run failed during startup");
                self.update(&run_id, |state| {
                    state.fail(e.to_string());
                })
                .await;
                self.stop_all(&spawned).await;
                Err(e)
            }
        }
    }

    /// 순차 기동. abort 로 중단되면 Ok(false)
    ///
    /// `spawned` 에는 이 run 이 새로 띄운 (재사용이 아닌) pid 가 쌓인다.
    async fn start_sequence(
        &self,
        run_id: &str,
        config: &TestRunConfig,
        spawned: &mut Vec<u32>,
    ) -> Result<bool> {
        if !self.update(run_id, |s| s.transition(TestRunStatus::Starting)).await {
            return Ok(false);
        }

        let components = [
            (Component::Backend, config.backend.as_ref()),
            (Component::Frontend, config.frontend.as_ref()),
            (Component::Test, Some(&config.test)),
        ];
        for (component, spec) in components {
            let Some(spec) = spec else { continue };
            let started = self.start_component(run_id, component, spec).await?;
            if !started.reused {
                spawned.push(started.pid);
            }
            if !self.record_pid(run_id, component, &started).await {
                return Ok(false);
            }
        }

        Ok(self.update(run_id, |s| s.transition(TestRunStatus::Running)).await)
    }

    async fn start_component(
        &self,
        run_id: &str,
        component: Component,
        spec: &RunProcessSpec,
    ) -> Result<StartResult> {
        let start_spec = spec.to_start_spec(component.role(), run_id);
        let waits_for_ready = component != Component::Test && spec.readiness.is_some();
        let started = self.supervisor.start(start_spec).await?;

        if waits_for_ready && !started.ready {
            let detail = started
                .last_error
                .clone()
                .unwrap_or_else(|| "readiness probe did not succeed".to_string());
            let message = format!("{} '{}' not ready: {}", component.as_str(), started.name, detail);
            let exited = self
                .supervisor
                .process(started.pid)
                .await
                .map_or(true, |p| !p.running);
            // 에러로 돌아가면 spawned 에 남지 않으므로 여기서 내린다
            if !started.reused {
                self.stop_quietly(started.pid).await;
            }
            return Err(if exited {
                Error::ReadinessProcessExited(message)
            } else {
                Error::ReadinessTimeout(message)
            });
        }
        Ok(started)
    }

    /// pid 기록. run 이 이미 종료 상태면 false
    async fn record_pid(&self, run_id: &str, component: Component, started: &StartResult) -> bool {
        let pid = started.pid;
        let reused = started.reused;
        self.update(run_id, |state| {
            if state.status.is_terminal() {
                return false;
            }
            match component {
                Component::Backend => state.backend_pid = Some(pid),
                Component::Frontend => state.frontend_pid = Some(pid),
                Component::Test => state.test_pid = Some(pid),
            }
            let suffix = if reused { " (reused)" } else { "" };
            state.push_log(format!("{} started: pid {}{}", component.as_str(), pid, suffix));
            true
        })
        .await
    }

    // ========================================================================
    // polling
    // ========================================================================

    async fn spawn_poller(self: &Arc<Self>, run_id: &str) {
        let this: Weak<Self> = Arc::downgrade(self);
        let id = run_id.to_string();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = this.upgrade() else { break };
                if orchestrator.poll(&id).await {
                    break;
                }
            }
        });
        self.pollers.lock().await.insert(run_id.to_string(), handle);
    }

    /// 테스트 프로세스 상태 확인. run 이 끝났으면 true
    async fn poll(&self, run_id: &str) -> bool {
        let test_pid = {
            let runs = self.runs.read().await;
            match runs.get(run_id) {
                Some(state) if !state.status.is_terminal() => state.test_pid,
                _ => return true,
            }
        };
        let Some(test_pid) = test_pid else {
            return true;
        };

        let outcome = match self.supervisor.process(test_pid).await {
            Some(process) if process.running => return false,
            Some(process) => exit_outcome(&process),
            None => Err("test process is no longer managed".to_string()),
        };
        self.finish(run_id, outcome).await;
        true
    }

    async fn finish(&self, run_id: &str, outcome: std::result::Result<Option<i32>, String>) {
        let teardown = self
            .update(run_id, |state| {
                let applied = match &outcome {
                    Ok(code) => {
                        state.exit_code = *code;
                        state.transition(TestRunStatus::Completed)
                    }
                    Err(error) => {
                        if let Some(code) = error_exit_code(error) {
                            state.exit_code = Some(code);
                        }
                        state.fail(error.clone())
                    }
                };
                (applied && state.should_teardown()).then(|| state.backend_pids())
            })
            .await;

        match &outcome {
            Ok(_) => info!(run_id, "Test run completed"),
            Err(error) => warn!(run_id, error = %error, "Test run failed"),
        }

        if let Some(pids) = teardown {
            debug!(run_id, ?pids, "Tearing down test run processes");
            self.stop_all(&pids).await;
            self.update(run_id, |s| s.push_log("backends stopped")).await;
        }
        self.pollers.lock().await.remove(run_id);
    }

    // ========================================================================
    // abort / queries
    // ========================================================================

    /// run 중단. 이미 종료된 run 은 그대로 돌려준다
    pub async fn abort_run(&self, run_id: &str) -> Result<TestRunState> {
        let pids = {
            let mut runs = self.runs.write().await;
            let state = runs
                .get_mut(run_id)
                .ok_or_else(|| Error::not_found(format!("test run {}", run_id)))?;
            if state.status.is_terminal() {
                return Ok(state.clone());
            }
            state.transition(TestRunStatus::Aborted);
            let mut pids: Vec<u32> = state.test_pid.into_iter().collect();
            if !state.config.keep_backends {
                pids.extend(state.backend_pids());
            }
            pids
        };

        if let Some(handle) = self.pollers.lock().await.remove(run_id) {
            handle.abort();
        }
        info!(run_id, "Aborting test run");
        self.stop_all(&pids).await;
        self.update(run_id, |s| s.push_log("aborted")).await;
        self.status(run_id).await
    }

    pub async fn status(&self, run_id: &str) -> Result<TestRunState> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("test run {}", run_id)))
    }

    /// 생성 순
    pub async fn list(&self) -> Vec<TestRunState> {
        let mut runs: Vec<TestRunState> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    /// poller 중단 (프로세스는 supervisor 종료가 정리)
    pub async fn shutdown(&self) {
        for (_, handle) in self.pollers.lock().await.drain() {
            handle.abort();
        }
    }

    // ========================================================================
    // helpers
    // ========================================================================

    async fn update<T>(&self, run_id: &str, f: impl FnOnce(&mut TestRunState) -> T) -> T
    where
        T: Default,
    {
        match self.runs.write().await.get_mut(run_id) {
            Some(state) => f(state),
            None => T::default(),
        }
    }

    async fn stop_all(&self, pids: &[u32]) {
        futures::future::join_all(pids.iter().map(|pid| self.stop_quietly(*pid))).await;
    }

    /// 이미 없는 프로세스는 무시
    async fn stop_quietly(&self, pid: u32) {
        match self.supervisor.stop(ProcessRef::Pid(pid), false).await {
            Ok(_) => {}
            Err(e) if e.kind() == "not_found" => {
                self.supervisor.forget(pid).await;
            }
            Err(e) => warn!(pid, error = %e, "Failed to stop test run process"),
        }
    }
}

/// 종료된 테스트 프로세스의 결과. 성공이면 Ok(exit code)
fn exit_outcome(process: &ManagedProcess) -> std::result::Result<Option<i32>, String> {
    match (&process.last_error, process.exit_code) {
        (None, Some(0)) => Ok(Some(0)),
        (Some(error), _) => Err(error.clone()),
        (None, Some(code)) => Err(format!("test process exited with code {}", code)),
        (None, None) => Err("test process terminated by signal".to_string()),
    }
}

fn error_exit_code(error: &str) -> Option<i32> {
    let code = error.rsplit("code ").next()?;
    code.trim_end_matches(')').trim().parse().ok()
}
