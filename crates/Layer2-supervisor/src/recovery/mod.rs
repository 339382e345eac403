//! Recovery Engine - 조건 기반 자동 복구
//!
//! ```text
//! HealthEvent ─▶ 조건 타이머 갱신 ─▶ (unhealthy/critical) ─▶ 전략 선택 ─▶ 액션 실행
//!                                                                │
//!                                                    AttemptHistory ◀─┘
//! ```
//!
//! - `condition`: 조건 평가와 지속 시간 타이머
//! - `history`: 프로세스 이름별 시도 기록 (cooldown / maxAttempts)
//! - `engine`: 전략 선택, 액션 실행, emergency kill-restart

pub mod condition;
pub mod engine;
pub mod history;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use warden_foundation::{Error, Result};

pub use condition::ConditionTimers;
pub use engine::{RecoveryEngine, RecoveryTarget};
pub use history::{AttemptHistory, RecoveryAttempt, RecoveryStats, StrategyStats};

/// emergency 전략 이름
pub const EMERGENCY_STRATEGY: &str = "emergency-kill-restart";

// ============================================================================
// Condition
// ============================================================================

/// 조건이 보는 값
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    HealthScore,
    Cpu,
    /// bytes
    Memory,
    MemoryMb,
    ErrorCount,
    RestartCount,
    /// ms
    Uptime,
    IssueCount,
    /// unresponsive 이슈가 있으면 1
    Unresponsive,
    /// zombie 이슈가 있으면 1
    Zombie,
    /// ms
    ResponseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl Operator {
    pub fn compare(self, actual: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => actual > threshold,
            Operator::Lt => actual < threshold,
            Operator::Eq => (actual - threshold).abs() < f64::EPSILON,
            Operator::Gte => actual >= threshold,
            Operator::Lte => actual <= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operator: Operator,
    pub value: f64,
    /// 이 시간(ms) 동안 계속 참이어야 충족
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl RecoveryCondition {
    pub fn new(condition_type: ConditionType, operator: Operator, value: f64) -> Self {
        Self {
            condition_type,
            operator,
            value,
            duration: None,
        }
    }

    pub fn sustained_for(mut self, duration: Duration) -> Self {
        self.duration = Some(duration.as_millis() as u64);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.map(Duration::from_millis)
    }
}

// ============================================================================
// Action
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Restart,
    KillRestart,
    Notify,
    Cleanup,
    Custom,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Restart => "restart",
            ActionType::KillRestart => "kill-restart",
            ActionType::Notify => "notify",
            ActionType::Cleanup => "cleanup",
            ActionType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// 실행 전 대기 (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RecoveryAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            delay: None,
            params: Value::Null,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay.map(Duration::from_millis)
    }
}

// ============================================================================
// Strategy
// ============================================================================

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStrategy {
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub conditions: Vec<RecoveryCondition>,
    pub actions: Vec<RecoveryAction>,
    pub max_attempts: u32,
    /// ms
    pub cooldown_period: u64,
}

impl RecoveryStrategy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_period)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("strategy name must not be empty".to_string()));
        }
        if self.actions.is_empty() {
            return Err(Error::Validation(format!(
                "strategy '{}' has no actions",
                self.name
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Validation(format!(
                "strategy '{}' must allow at least one attempt",
                self.name
            )));
        }
        Ok(())
    }
}

fn strategy(
    name: &str,
    condition: RecoveryCondition,
    action: ActionType,
    max_attempts: u32,
    cooldown: Duration,
) -> RecoveryStrategy {
    RecoveryStrategy {
        name: name.to_string(),
        enabled: true,
        conditions: vec![condition],
        actions: vec![RecoveryAction::new(action)],
        max_attempts,
        cooldown_period: cooldown.as_millis() as u64,
    }
}

/// 프로세스별 설정이 없을 때 쓰는 기본 전략 (순서대로 평가)
pub fn default_strategies() -> Vec<RecoveryStrategy> {
    vec![
        strategy(
            "error-restart",
            RecoveryCondition::new(ConditionType::ErrorCount, Operator::Gte, 10.0),
            ActionType::Restart,
            3,
            Duration::from_secs(60),
        ),
        strategy(
            "unresponsive-kill-restart",
            RecoveryCondition::new(ConditionType::Unresponsive, Operator::Eq, 1.0)
                .sustained_for(Duration::from_secs(10)),
            ActionType::KillRestart,
            2,
            Duration::from_secs(120),
        ),
        strategy(
            "low-health-restart",
            RecoveryCondition::new(ConditionType::HealthScore, Operator::Lt, 30.0)
                .sustained_for(Duration::from_secs(30)),
            ActionType::Restart,
            3,
            Duration::from_secs(300),
        ),
        strategy(
            "high-memory-restart",
            RecoveryCondition::new(ConditionType::MemoryMb, Operator::Gt, 2048.0)
                .sustained_for(Duration::from_secs(60)),
            ActionType::Restart,
            2,
            Duration::from_secs(300),
        ),
    ]
}

/// critical 이벤트 시 적용하는 단발 kill-restart
pub fn emergency_strategy() -> RecoveryStrategy {
    RecoveryStrategy {
        name: EMERGENCY_STRATEGY.to_string(),
        enabled: true,
        conditions: Vec::new(),
        actions: vec![RecoveryAction::new(ActionType::KillRestart)],
        max_attempts: 1,
        cooldown_period: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strategy_wire_format() {
        let strategy: RecoveryStrategy = serde_json::from_value(json!({
            "name": "slow",
            "conditions": [{"type": "response_time", "operator": "gte", "value": 500, "duration": 2000}],
            "actions": [{"type": "notify"}, {"type": "kill-restart", "delay": 100}],
            "maxAttempts": 2,
            "cooldownPeriod": 60000
        }))
        .unwrap();

        assert!(strategy.enabled);
        assert_eq!(strategy.conditions[0].condition_type, ConditionType::ResponseTime);
        assert_eq!(strategy.conditions[0].duration(), Some(Duration::from_secs(2)));
        assert_eq!(strategy.actions[1].action_type, ActionType::KillRestart);
        assert_eq!(strategy.cooldown(), Duration::from_secs(60));
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_operators() {
        assert!(Operator::Gt.compare(2.0, 1.0));
        assert!(!Operator::Gt.compare(1.0, 1.0));
        assert!(Operator::Gte.compare(1.0, 1.0));
        assert!(Operator::Lt.compare(0.5, 1.0));
        assert!(Operator::Lte.compare(1.0, 1.0));
        assert!(Operator::Eq.compare(1.0, 1.0));
    }

    #[test]
    fn test_defaults_are_valid() {
        let defaults = default_strategies();
        assert_eq!(
            defaults.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec![
                "error-restart",
                "unresponsive-kill-restart",
                "low-health-restart",
                "high-memory-restart"
            ]
        );
        assert!(defaults.iter().all(|s| s.validate().is_ok()));
        assert!(emergency_strategy().validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut s = emergency_strategy();
        s.actions.clear();
        assert_eq!(s.validate().unwrap_err().kind(), "validation");
    }
}
