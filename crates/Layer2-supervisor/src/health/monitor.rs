//! HealthMonitor - pid 별 주기 체크
//!
//! `ProcessRegistered` 에서 모니터링을 시작하고 `ProcessUnregistered` 에서
//! 멈춘다. 전역 종료 중에는 새 모니터링을 시작하지 않는다. 매 체크마다
//! `HealthEvent` 를 발행하고, recovery engine 은 unhealthy/critical 에만 반응한다.

use super::scoring::{score, Responsiveness, ScoringInput, Thresholds};
use super::{
    HealthCheckResult, HealthSummary, MetricsSampler, RecentIssue, Severity, SysinfoSampler,
    UNHEALTHY_BELOW,
};
use crate::events::{HealthEvent, LifecycleEvent};
use crate::process::{ProcessRole, ReadinessConfig};
use crate::readiness::probe_once;
use crate::supervisor::Supervisor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_foundation::{
    labels, Error, EventBus, EventListener, HealthSettings, Lifecycle, ListenerId, Result,
    SharedSink, TracingSink,
};

/// 요약에 포함하는 최근 이슈 수
const SUMMARY_ISSUE_LIMIT: usize = 10;

// ============================================================================
// Metadata source
// ============================================================================

/// 헬스 체크에 필요한 프로세스 정보
#[derive(Debug, Clone)]
pub struct ProcessMetadata {
    pub pid: u32,
    pub name: String,
    pub role: ProcessRole,
    pub tags: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub readiness: Option<ReadinessConfig>,
    pub ready: bool,
    pub error_count: usize,
    pub restart_count: u32,
}

impl ProcessMetadata {
    /// 응답성 체크 대상: `task` 태그, 또는 port/http 프로브가 있는 frontend/backend
    pub fn is_task(&self) -> bool {
        let network_probe = self
            .readiness
            .as_ref()
            .is_some_and(|r| r.is_network_probe());
        self.tags.iter().any(|t| t.eq_ignore_ascii_case("task"))
            || (matches!(self.role, ProcessRole::Backend | ProcessRole::Frontend) && network_probe)
    }

    pub fn uptime_ms(&self) -> u64 {
        (Utc::now() - self.start_time)
            .to_std()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// 메타데이터 제공자 (supervisor)
#[async_trait]
pub trait ProcessMetadataSource: Send + Sync {
    async fn metadata(&self, pid: u32) -> Option<ProcessMetadata>;

    /// stop 진행 중이거나 전역 종료 중
    async fn is_shutting_down(&self, pid: u32) -> bool;
}

#[async_trait]
impl ProcessMetadataSource for Supervisor {
    async fn metadata(&self, pid: u32) -> Option<ProcessMetadata> {
        let process = self.process(pid).await?;
        Some(ProcessMetadata {
            error_count: self.error_count(pid).await,
            restart_count: self.restart_count(&process.name).await,
            pid,
            name: process.name,
            role: process.role,
            tags: process.tags,
            start_time: process.start_time,
            readiness: process.readiness,
            ready: process.ready,
        })
    }

    async fn is_shutting_down(&self, pid: u32) -> bool {
        Supervisor::is_shutting_down(self, pid).await
    }
}

// ============================================================================
// HealthMonitor
// ============================================================================

pub struct HealthMonitor {
    settings: HealthSettings,
    thresholds: Thresholds,
    source: Arc<dyn ProcessMetadataSource>,
    sampler: Arc<dyn MetricsSampler>,
    /// pid 별 bounded 히스토리 (오래된 것부터)
    history: RwLock<HashMap<u32, VecDeque<HealthCheckResult>>>,
    monitors: Mutex<HashMap<u32, JoinHandle<()>>>,
    events: Arc<EventBus<HealthEvent>>,
    lifecycle: Lifecycle,
    telemetry: SharedSink,
}

impl HealthMonitor {
    pub fn new(settings: HealthSettings, source: Arc<dyn ProcessMetadataSource>) -> Self {
        Self {
            thresholds: Thresholds::from(&settings),
            settings,
            source,
            sampler: Arc::new(SysinfoSampler::new()),
            history: RwLock::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            events: Arc::new(EventBus::new()),
            lifecycle: Lifecycle::new(),
            telemetry: TracingSink::shared(),
        }
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn MetricsSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus<HealthEvent>>) -> Self {
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

    pub fn events(&self) -> &Arc<EventBus<HealthEvent>> {
        &self.events
    }

    /// lifecycle 버스에 구독
    pub async fn attach(self: &Arc<Self>, bus: &EventBus<LifecycleEvent>) -> ListenerId {
        bus.subscribe(Arc::new(LifecycleListener {
            monitor: Arc::downgrade(self),
        }))
        .await
    }

    // ========================================================================
    // monitoring timers
    // ========================================================================

    /// 주기 체크 시작 (이미 있으면 교체). 종료 중이면 false
    pub async fn start_monitoring(self: &Arc<Self>, pid: u32, interval: Option<Duration>) -> bool {
        if self.lifecycle.is_shutting_down() {
            debug!(pid, "Not monitoring during shutdown");
            return false;
        }

        let period = interval
            .unwrap_or_else(|| self.settings.interval())
            .max(Duration::from_millis(1));
        let this = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(monitor) = this.upgrade() else { break };
                if monitor.lifecycle.is_shutting_down() {
                    break;
                }
                match monitor.check_and_publish(pid).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == "not_found" => {
                        debug!(pid, "Process gone, stopping health checks");
                        break;
                    }
                    Err(e) => warn!(pid, error = %e, "Health check failed"),
                }
            }
        });

        if let Some(previous) = self.monitors.lock().await.insert(pid, handle) {
            previous.abort();
        }
        debug!(pid, interval_ms = period.as_millis() as u64, "Started health monitoring");
        true
    }

    pub async fn stop_monitoring(&self, pid: u32) -> bool {
        let stopped = match self.monitors.lock().await.remove(&pid) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        };
        self.sampler.forget(pid);
        if stopped {
            debug!(pid, "Stopped health monitoring");
        }
        stopped
    }

    pub async fn is_monitoring(&self, pid: u32) -> bool {
        self.monitors.lock().await.contains_key(&pid)
    }

    pub async fn monitored_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.monitors.lock().await.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// 모든 타이머 중단
    pub async fn shutdown(&self) {
        for (_, handle) in self.monitors.lock().await.drain() {
            handle.abort();
        }
    }

    // ========================================================================
    // checks
    // ========================================================================

    /// 체크 1회 수행 후 히스토리에 기록 (이벤트는 발행하지 않음)
    pub async fn perform_health_check(&self, pid: u32) -> Result<HealthCheckResult> {
        let meta = self
            .source
            .metadata(pid)
            .await
            .ok_or_else(|| Error::not_found(format!("process pid {}", pid)))?;

        let sampler = self.sampler.clone();
        let sample = tokio::task::spawn_blocking(move || sampler.sample(pid))
            .await
            .map_err(|e| Error::Internal(format!("sampler task failed: {}", e)))?;

        let responsiveness = match &meta.readiness {
            Some(readiness) if meta.is_task() && meta.ready && readiness.is_network_probe() => {
                match probe_once(readiness).await {
                    Some(rtt) => Responsiveness::Responded(rtt),
                    None => Responsiveness::NoResponse,
                }
            }
            _ => Responsiveness::Skipped,
        };

        let previous_memory = self
            .history
            .read()
            .await
            .get(&pid)
            .and_then(|h| h.back())
            .map(|r| r.metrics.memory_bytes);

        let input = ScoringInput {
            pid,
            name: meta.name.clone(),
            sample,
            previous_memory,
            uptime_ms: meta.uptime_ms(),
            error_count: meta.error_count,
            restart_count: meta.restart_count,
            responsiveness,
        };
        let result = score(&input, &self.thresholds);

        {
            let mut history = self.history.write().await;
            let ring = history.entry(pid).or_default();
            ring.push_back(result.clone());
            while ring.len() > self.settings.history_size.max(1) {
                ring.pop_front();
            }
        }

        self.telemetry.record_metric(
            "health.score",
            result.health_score as f64,
            Some(&labels([("name", meta.name)])),
        );
        Ok(result)
    }

    /// 체크 후 이벤트 발행. stop 진행 중인 프로세스는 발행하지 않는다
    pub async fn check_and_publish(&self, pid: u32) -> Result<HealthCheckResult> {
        let result = self.perform_health_check(pid).await?;

        if self.source.is_shutting_down(pid).await {
            debug!(pid, "Suppressing health event for stopping process");
            return Ok(result);
        }

        let event = HealthEvent::classify(result.clone(), UNHEALTHY_BELOW);
        match &event {
            HealthEvent::Critical(r) => warn!(pid, name = %r.name, score = r.health_score, "Process critical"),
            HealthEvent::Unhealthy(r) => info!(pid, name = %r.name, score = r.health_score, "Process unhealthy"),
            HealthEvent::Healthy(_) => {}
        }
        self.events.publish(event).await;
        Ok(result)
    }

    // ========================================================================
    // history / summary
    // ========================================================================

    /// 히스토리 (최신순)
    pub async fn history(&self, pid: u32, limit: Option<usize>) -> Vec<HealthCheckResult> {
        let history = self.history.read().await;
        let Some(ring) = history.get(&pid) else {
            return Vec::new();
        };
        ring.iter()
            .rev()
            .take(limit.unwrap_or(ring.len()))
            .cloned()
            .collect()
    }

    pub async fn latest(&self, pid: u32) -> Option<HealthCheckResult> {
        self.history
            .read()
            .await
            .get(&pid)
            .and_then(|h| h.back().cloned())
    }

    pub async fn forget(&self, pid: u32) {
        self.history.write().await.remove(&pid);
    }

    /// 추적 중인 모든 pid 의 최신 결과 요약
    pub async fn summary(&self) -> HealthSummary {
        let history = self.history.read().await;
        let mut summary = HealthSummary::default();
        let mut total_score = 0u64;
        let mut issues = Vec::new();

        for (pid, ring) in history.iter() {
            let Some(latest) = ring.back() else { continue };
            summary.total += 1;
            total_score += latest.health_score as u64;

            match HealthEvent::classify(latest.clone(), UNHEALTHY_BELOW) {
                HealthEvent::Critical(_) => summary.critical += 1,
                HealthEvent::Unhealthy(_) => summary.unhealthy += 1,
                HealthEvent::Healthy(_) => summary.healthy += 1,
            }

            for result in ring.iter() {
                for issue in result.issues.iter().filter(|i| i.severity >= Severity::High) {
                    issues.push(RecentIssue {
                        pid: *pid,
                        name: result.name.clone(),
                        issue: issue.clone(),
                    });
                }
            }
        }

        if summary.total > 0 {
            summary.average_score = total_score as f64 / summary.total as f64;
        }
        issues.sort_by(|a, b| b.issue.timestamp.cmp(&a.issue.timestamp));
        issues.truncate(SUMMARY_ISSUE_LIMIT);
        summary.recent_issues = issues;
        summary
    }

    async fn on_lifecycle(self: &Arc<Self>, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::ProcessRegistered { pid, .. } => {
                if self.settings.auto_monitor {
                    self.start_monitoring(*pid, None).await;
                }
            }
            LifecycleEvent::ProcessExited {
                pid,
                unexpected,
                crashed,
                ..
            } => {
                self.stop_monitoring(*pid).await;
                if *unexpected && *crashed && self.lifecycle.is_running() {
                    // 크래시: 즉시 체크해 critical 을 알린다
                    let this = self.clone();
                    let pid = *pid;
                    tokio::spawn(async move {
                        if let Err(e) = this.check_and_publish(pid).await {
                            debug!(pid, error = %e, "Post-crash health check skipped");
                        }
                    });
                }
            }
            LifecycleEvent::ProcessUnregistered { pid, .. } => {
                self.stop_monitoring(*pid).await;
                self.forget(*pid).await;
            }
            LifecycleEvent::ProcessReady { .. } | LifecycleEvent::ProcessRestarted { .. } => {}
        }
    }
}

struct LifecycleListener {
    monitor: Weak<HealthMonitor>,
}

#[async_trait]
impl EventListener<LifecycleEvent> for LifecycleListener {
    fn name(&self) -> &str {
        "health-monitor"
    }

    async fn on_event(&self, event: &LifecycleEvent) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.on_lifecycle(event).await;
        }
    }
}
