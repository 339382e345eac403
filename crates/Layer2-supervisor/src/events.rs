//! Typed events exchanged between supervisor, health monitor and recovery engine
//!
//! ```text
//! Supervisor ──LifecycleEvent──▶ HealthMonitor ──HealthEvent──▶ RecoveryEngine
//!                                                               │
//!                                               RecoveryEvent ◀─┘
//! ```

use crate::health::HealthCheckResult;
use crate::process::ProcessRole;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_foundation::Event;

// ============================================================================
// Lifecycle
// ============================================================================

/// 엔트리 제거 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterReason {
    /// 명시적 stop
    Stopped,
    /// 종료 후 보관 기간 경과
    Exited,
}

/// supervisor 가 발행하는 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProcessRegistered {
        pid: u32,
        name: String,
        role: ProcessRole,
        reattached: bool,
    },
    ProcessReady {
        pid: u32,
        name: String,
        ready: bool,
        error: Option<String>,
    },
    ProcessExited {
        pid: u32,
        name: String,
        code: Option<i32>,
        /// 의도하지 않은 비정상 종료
        unexpected: bool,
        /// unexpected 이고 crash grace 이후에 발생
        crashed: bool,
    },
    ProcessUnregistered {
        pid: u32,
        name: String,
        reason: UnregisterReason,
    },
    ProcessRestarted {
        old_pid: u32,
        new_pid: u32,
        name: String,
    },
}

impl LifecycleEvent {
    pub fn pid(&self) -> u32 {
        match self {
            LifecycleEvent::ProcessRegistered { pid, .. }
            | LifecycleEvent::ProcessReady { pid, .. }
            | LifecycleEvent::ProcessExited { pid, .. }
            | LifecycleEvent::ProcessUnregistered { pid, .. } => *pid,
            LifecycleEvent::ProcessRestarted { new_pid, .. } => *new_pid,
        }
    }
}

impl Event for LifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::ProcessRegistered { .. } => "process.registered",
            LifecycleEvent::ProcessReady { .. } => "process.ready",
            LifecycleEvent::ProcessExited { .. } => "process.exited",
            LifecycleEvent::ProcessUnregistered { .. } => "process.unregistered",
            LifecycleEvent::ProcessRestarted { .. } => "process.restarted",
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// health monitor 가 매 체크마다 발행하는 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum HealthEvent {
    Healthy(HealthCheckResult),
    Unhealthy(HealthCheckResult),
    Critical(HealthCheckResult),
}

impl HealthEvent {
    /// 결과에 따라 이벤트 분류
    pub fn classify(result: HealthCheckResult, unhealthy_below: u8) -> Self {
        if result.has_critical() {
            HealthEvent::Critical(result)
        } else if result.health_score < unhealthy_below || result.has_high() {
            HealthEvent::Unhealthy(result)
        } else {
            HealthEvent::Healthy(result)
        }
    }

    pub fn result(&self) -> &HealthCheckResult {
        match self {
            HealthEvent::Healthy(r) | HealthEvent::Unhealthy(r) | HealthEvent::Critical(r) => r,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, HealthEvent::Critical(_))
    }

    /// 복구 대상 이벤트인지
    pub fn needs_attention(&self) -> bool {
        !matches!(self, HealthEvent::Healthy(_))
    }
}

impl Event for HealthEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HealthEvent::Healthy(_) => "health.healthy",
            HealthEvent::Unhealthy(_) => "health.unhealthy",
            HealthEvent::Critical(_) => "health.critical",
        }
    }
}

// ============================================================================
// Recovery
// ============================================================================

/// recovery engine 이 발행하는 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    RecoveryStarted {
        pid: u32,
        name: String,
        strategy: String,
    },
    RecoverySucceeded {
        pid: u32,
        name: String,
        strategy: String,
        new_pid: Option<u32>,
    },
    RecoveryFailed {
        pid: u32,
        name: String,
        strategy: String,
        error: String,
    },
    RecoveryNotify {
        pid: u32,
        name: String,
        message: String,
        params: Value,
    },
    RecoveryCleanup {
        pid: u32,
        name: String,
        params: Value,
    },
    RecoveryCustom {
        pid: u32,
        name: String,
        params: Value,
    },
}

impl Event for RecoveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecoveryEvent::RecoveryStarted { .. } => "recovery.started",
            RecoveryEvent::RecoverySucceeded { .. } => "recovery.succeeded",
            RecoveryEvent::RecoveryFailed { .. } => "recovery.failed",
            RecoveryEvent::RecoveryNotify { .. } => "recovery.notify",
            RecoveryEvent::RecoveryCleanup { .. } => "recovery.cleanup",
            RecoveryEvent::RecoveryCustom { .. } => "recovery.custom",
        }
    }
}
