//! RecoveryEngine - HealthEvent 에 반응해 전략을 적용
//!
//! 모든 헬스 이벤트는 조건 타이머를 갱신한다. 전략 적용은 unhealthy/critical
//! 에서만, pid 당 한 번에 하나만 진행된다. critical 이고 emergency 가 켜져
//! 있으면 설정된 전략 대신 emergency kill-restart 를 적용한다.
//!
//! lifecycle 버스에도 구독해 엔트리가 제거된 pid 의 타이머를 버린다.

use super::condition::ConditionTimers;
use super::history::{AttemptHistory, RecoveryAttempt, RecoveryStats};
use super::{default_strategies, emergency_strategy, ActionType, RecoveryAction, RecoveryStrategy};
use crate::events::{HealthEvent, LifecycleEvent, RecoveryEvent};
use crate::process::{ProcessRef, StartSpec};
use crate::supervisor::Supervisor;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use warden_foundation::{
    labels, Error, EventBus, EventFilter, EventListener, Lifecycle, ListenerId,
    RecoverySettings, Result, SharedSink, TracingSink, WardenConfig,
};

// ============================================================================
// Target
// ============================================================================

/// 복구 액션이 조작하는 대상 (supervisor)
#[async_trait]
pub trait RecoveryTarget: Send + Sync {
    /// stop → settle → start. 새 pid 를 돌려준다
    async fn restart(&self, pid: u32) -> Result<u32>;

    /// 강제 종료 (이미 종료된 경우 엔트리만 정리) 후 재기동 명세를 돌려준다
    async fn force_stop(&self, pid: u32) -> Result<StartSpec>;

    /// 명세로 새 프로세스를 띄우고 재시작으로 기록
    async fn respawn(&self, old_pid: u32, spec: StartSpec) -> Result<u32>;

    async fn is_shutting_down(&self, pid: u32) -> bool;

    /// 복구하지 않는 프로세스 (test/e2e 러너 등)
    async fn is_exempt(&self, _pid: u32) -> bool {
        false
    }
}

#[async_trait]
impl RecoveryTarget for Arc<Supervisor> {
    async fn restart(&self, pid: u32) -> Result<u32> {
        Supervisor::restart(self, ProcessRef::Pid(pid), false)
            .await
            .map(|r| r.new_pid)
    }

    async fn force_stop(&self, pid: u32) -> Result<StartSpec> {
        let spec = self.spec(&ProcessRef::Pid(pid)).await?;
        match self.process(pid).await {
            Some(process) if process.running => {
                self.stop(ProcessRef::Pid(pid), true).await?;
            }
            _ => {
                self.forget(pid).await;
            }
        }
        Ok(spec)
    }

    async fn respawn(&self, old_pid: u32, spec: StartSpec) -> Result<u32> {
        let name = spec.options.name.clone().unwrap_or_default();
        let started = self.start(spec).await?;
        self.note_restart(old_pid, started.pid, &name).await;
        Ok(started.pid)
    }

    async fn is_shutting_down(&self, pid: u32) -> bool {
        Supervisor::is_shutting_down(self, pid).await
    }

    async fn is_exempt(&self, pid: u32) -> bool {
        self.process(pid)
            .await
            .is_some_and(|p| p.role.is_one_shot())
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct RecoveryEngine {
    settings: RecoverySettings,
    kill_restart_settle: Duration,
    silent: bool,
    target: Arc<dyn RecoveryTarget>,
    defaults: Vec<RecoveryStrategy>,
    /// 프로세스 이름별 전략 (없으면 defaults)
    overrides: RwLock<HashMap<String, Vec<RecoveryStrategy>>>,
    timers: Mutex<ConditionTimers>,
    history: RwLock<AttemptHistory>,
    in_flight: Mutex<HashSet<u32>>,
    events: Arc<EventBus<RecoveryEvent>>,
    lifecycle: Lifecycle,
    telemetry: SharedSink,
}

impl RecoveryEngine {
    pub fn new(config: &WardenConfig, target: Arc<dyn RecoveryTarget>) -> Self {
        Self {
            settings: config.recovery.clone(),
            kill_restart_settle: config.kill_restart_settle(),
            silent: config.silent_recovery,
            target,
            defaults: default_strategies(),
            overrides: RwLock::new(HashMap::new()),
            timers: Mutex::new(ConditionTimers::new()),
            history: RwLock::new(AttemptHistory::new(config.recovery.attempt_history_size)),
            in_flight: Mutex::new(HashSet::new()),
            events: Arc::new(EventBus::new()),
            lifecycle: Lifecycle::new(),
            telemetry: TracingSink::shared(),
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<RecoveryStrategy>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus<RecoveryEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_telemetry(mut self, telemetry: SharedSink) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn events(&self) -> &Arc<EventBus<RecoveryEvent>> {
        &self.events
    }

    /// health 버스에 구독
    pub async fn attach(self: &Arc<Self>, bus: &EventBus<HealthEvent>) -> ListenerId {
        bus.subscribe(Arc::new(HealthListener {
            engine: Arc::downgrade(self),
        }))
        .await
    }

    /// lifecycle 버스에 구독 (제거된 pid 의 타이머 정리)
    pub async fn attach_lifecycle(self: &Arc<Self>, bus: &EventBus<LifecycleEvent>) -> ListenerId {
        let filter = EventFilter::new().with_event_types(vec!["process.unregistered".to_string()]);
        bus.subscribe_with_filter(
            Arc::new(LifecycleListener {
                engine: Arc::downgrade(self),
            }),
            Some(filter),
        )
        .await
    }

    /// 종료. 이후 이벤트에는 반응하지 않고 남은 타이머는 모두 버린다
    pub async fn shutdown(&self) {
        self.lifecycle.begin_shutdown();
        self.timers.lock().await.clear();
        debug!("Recovery engine stopped");
    }

    /// pid 엔트리가 사라졌을 때
    pub async fn forget(&self, pid: u32) {
        self.timers.lock().await.clear_pid(pid);
    }

    /// pid 에 걸린 조건 타이머 수
    pub async fn armed_timers(&self, pid: u32) -> usize {
        self.timers.lock().await.armed_count(pid)
    }

    // ========================================================================
    // configuration / queries
    // ========================================================================

    /// 프로세스 이름에 전략 목록 지정. 빈 목록이면 기본 전략으로 되돌린다
    pub async fn configure(&self, name: &str, strategies: Vec<RecoveryStrategy>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Validation("process name must not be empty".to_string()));
        }
        for strategy in &strategies {
            strategy.validate()?;
        }

        let mut overrides = self.overrides.write().await;
        if strategies.is_empty() {
            overrides.remove(name);
            info!(name, "Recovery strategies reset to defaults");
        } else {
            info!(name, count = strategies.len(), "Configured recovery strategies");
            overrides.insert(name.to_string(), strategies);
        }
        Ok(())
    }

    pub async fn strategies(&self, name: &str) -> Vec<RecoveryStrategy> {
        self.overrides
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub async fn stats(&self) -> RecoveryStats {
        self.history.read().await.stats()
    }

    /// 이름별 시도 기록 (최신순)
    pub async fn attempts(&self, name: &str) -> Vec<RecoveryAttempt> {
        self.history.read().await.attempts(name)
    }

    pub async fn is_recovering(&self, pid: u32) -> bool {
        self.in_flight.lock().await.contains(&pid)
    }

    // ========================================================================
    // event handling
    // ========================================================================

    /// 이벤트 하나를 끝까지 처리. 적용된 시도가 있으면 돌려준다
    pub async fn handle(&self, event: &HealthEvent) -> Option<RecoveryAttempt> {
        let matched = self.observe(event).await;
        self.apply(event, matched).await
    }

    /// 조건 타이머 갱신. 모든 조건이 충족된 전략을 순서대로 돌려준다
    pub async fn observe(&self, event: &HealthEvent) -> Vec<RecoveryStrategy> {
        if !self.settings.enabled || self.lifecycle.is_shutting_down() {
            return Vec::new();
        }
        let result = event.result();
        let strategies = self.strategies(&result.name).await;
        let now = Instant::now();

        let mut timers = self.timers.lock().await;
        strategies
            .into_iter()
            .filter(|s| s.enabled)
            .filter(|s| {
                // 단락 평가 없이 모든 조건의 타이머를 갱신
                s.conditions
                    .iter()
                    .fold(true, |all, c| timers.observe(result.pid, c, result, now) && all)
            })
            .collect()
    }

    /// 충족된 전략 중 하나 적용 (unhealthy/critical 에서만)
    pub async fn apply(
        &self,
        event: &HealthEvent,
        matched: Vec<RecoveryStrategy>,
    ) -> Option<RecoveryAttempt> {
        if !self.settings.enabled || !event.needs_attention() {
            return None;
        }
        let result = event.result();
        let pid = result.pid;

        if self.lifecycle.is_shutting_down() || self.target.is_shutting_down(pid).await {
            debug!(pid, "Skipping recovery for stopping process");
            return None;
        }
        if self.target.is_exempt(pid).await {
            debug!(pid, name = %result.name, "Process is not recoverable");
            return None;
        }
        if !self.in_flight.lock().await.insert(pid) {
            debug!(pid, "Recovery already in progress");
            return None;
        }

        let candidates = if event.is_critical() && self.settings.emergency_enabled {
            vec![emergency_strategy()]
        } else {
            matched
        };

        let now = Instant::now();
        let chosen = {
            let history = self.history.read().await;
            candidates.into_iter().find(|s| {
                let skip = history.should_skip(&result.name, s, now);
                if skip {
                    debug!(pid, strategy = %s.name, "Strategy in cooldown");
                }
                !skip
            })
        };

        let Some(strategy) = chosen else {
            self.in_flight.lock().await.remove(&pid);
            return None;
        };

        self.timers.lock().await.consume(pid, &strategy.conditions);
        let attempt = self.execute(&strategy, pid, &result.name, now).await;
        if attempt.new_pid.is_some() {
            self.timers.lock().await.clear_pid(pid);
        }
        self.in_flight.lock().await.remove(&pid);
        Some(attempt)
    }

    async fn execute(
        &self,
        strategy: &RecoveryStrategy,
        pid: u32,
        name: &str,
        started: Instant,
    ) -> RecoveryAttempt {
        if self.silent {
            debug!(pid, name, strategy = %strategy.name, "Applying recovery strategy");
        } else {
            info!(pid, name, strategy = %strategy.name, "Applying recovery strategy");
        }
        self.events
            .publish(RecoveryEvent::RecoveryStarted {
                pid,
                name: name.to_string(),
                strategy: strategy.name.clone(),
            })
            .await;

        let mut current = pid;
        let mut actions = Vec::new();
        let mut error = None;
        for action in &strategy.actions {
            if let Some(delay) = action.delay() {
                tokio::time::sleep(delay).await;
            }
            match self.run_action(action, current, name).await {
                Ok(new_pid) => {
                    actions.push(action.action_type.as_str().to_string());
                    if let Some(new_pid) = new_pid {
                        current = new_pid;
                    }
                }
                Err(e) => {
                    // 남은 액션은 실행하지 않음
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        let attempt = RecoveryAttempt {
            pid,
            name: name.to_string(),
            strategy: strategy.name.clone(),
            timestamp: Utc::now(),
            actions,
            success: error.is_none(),
            error,
            new_pid: (current != pid).then_some(current),
        };
        self.history.write().await.record(attempt.clone(), started);

        self.telemetry.record_metric(
            "recovery.attempt",
            1.0,
            Some(&labels([
                ("strategy", strategy.name.clone()),
                ("success", attempt.success.to_string()),
            ])),
        );

        let event = match &attempt.error {
            None => {
                if self.silent {
                    debug!(pid, name, new_pid = ?attempt.new_pid, "Recovery succeeded");
                } else {
                    info!(pid, name, new_pid = ?attempt.new_pid, "Recovery succeeded");
                }
                RecoveryEvent::RecoverySucceeded {
                    pid,
                    name: name.to_string(),
                    strategy: strategy.name.clone(),
                    new_pid: attempt.new_pid,
                }
            }
            Some(error) => {
                warn!(pid, name, strategy = %strategy.name, error = %error, "Recovery failed");
                RecoveryEvent::RecoveryFailed {
                    pid,
                    name: name.to_string(),
                    strategy: strategy.name.clone(),
                    error: error.clone(),
                }
            }
        };
        self.events.publish(event).await;
        attempt
    }

    /// 액션 1개 실행. 프로세스를 새로 띄웠으면 새 pid
    async fn run_action(&self, action: &RecoveryAction, pid: u32, name: &str) -> Result<Option<u32>> {
        let kind = action.action_type.as_str();
        let fail = |e: Error| Error::recovery_action(kind, e.to_string());

        match action.action_type {
            ActionType::Restart => self.target.restart(pid).await.map(Some).map_err(fail),
            ActionType::KillRestart => {
                let spec = self.target.force_stop(pid).await.map_err(fail)?;
                tokio::time::sleep(self.kill_restart_settle).await;
                self.target.respawn(pid, spec).await.map(Some).map_err(fail)
            }
            ActionType::Notify => {
                let message = action
                    .params
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Process {} ({}) needs attention", name, pid));
                self.events
                    .publish(RecoveryEvent::RecoveryNotify {
                        pid,
                        name: name.to_string(),
                        message,
                        params: action.params.clone(),
                    })
                    .await;
                Ok(None)
            }
            ActionType::Cleanup => {
                self.events
                    .publish(RecoveryEvent::RecoveryCleanup {
                        pid,
                        name: name.to_string(),
                        params: action.params.clone(),
                    })
                    .await;
                Ok(None)
            }
            ActionType::Custom => {
                self.events
                    .publish(RecoveryEvent::RecoveryCustom {
                        pid,
                        name: name.to_string(),
                        params: action.params.clone(),
                    })
                    .await;
                Ok(None)
            }
        }
    }
}

struct HealthListener {
    engine: Weak<RecoveryEngine>,
}

#[async_trait]
impl EventListener<HealthEvent> for HealthListener {
    fn name(&self) -> &str {
        "recovery-engine"
    }

    async fn on_event(&self, event: &HealthEvent) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        // 타이머는 도착 순서대로 갱신하고, 적용은 발행자를 막지 않도록 분리
        let matched = engine.observe(event).await;
        if event.needs_attention() {
            let event = event.clone();
            tokio::spawn(async move {
                engine.apply(&event, matched).await;
            });
        }
    }
}

struct LifecycleListener {
    engine: Weak<RecoveryEngine>,
}

#[async_trait]
impl EventListener<LifecycleEvent> for LifecycleListener {
    fn name(&self) -> &str {
        "recovery-engine-lifecycle"
    }

    async fn on_event(&self, event: &LifecycleEvent) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if let LifecycleEvent::ProcessUnregistered { pid, .. } = event {
            engine.forget(*pid).await;
        }
    }
}
