//! 조건 평가와 지속 시간 타이머
//!
//! `duration` 이 있는 조건은 처음 참으로 관찰될 때 타이머를 시작하고, 그 동안은
//! "아직 아님"을 보고한다. 거짓이 한 번이라도 관찰되면 타이머는 즉시 지워진다.
//! 연속으로 참인 구간 하나에서 전략이 적용되면 그 구간의 타이머는 소진된다.

use super::{ConditionType, Operator, RecoveryCondition};
use crate::health::{HealthCheckResult, IssueType};
use std::collections::HashMap;
use tokio::time::Instant;

const MIB: f64 = 1024.0 * 1024.0;

/// 결과에서 조건이 보는 값. 측정되지 않은 값은 None
pub fn condition_value(condition_type: ConditionType, result: &HealthCheckResult) -> Option<f64> {
    let m = &result.metrics;
    let flag = |t: IssueType| if result.has_issue(t) { 1.0 } else { 0.0 };

    Some(match condition_type {
        ConditionType::HealthScore => result.health_score as f64,
        ConditionType::Cpu => m.cpu_percent as f64,
        ConditionType::Memory => m.memory_bytes as f64,
        ConditionType::MemoryMb => m.memory_bytes as f64 / MIB,
        ConditionType::ErrorCount => m.error_count as f64,
        ConditionType::RestartCount => m.restart_count as f64,
        ConditionType::Uptime => m.uptime_ms as f64,
        ConditionType::IssueCount => result.issues.len() as f64,
        ConditionType::Unresponsive => flag(IssueType::Unresponsive),
        ConditionType::Zombie => flag(IssueType::Zombie),
        ConditionType::ResponseTime => m.response_time_ms? as f64,
    })
}

/// 지속 시간을 무시한 순간 판정
pub fn holds(condition: &RecoveryCondition, result: &HealthCheckResult) -> bool {
    condition_value(condition.condition_type, result)
        .is_some_and(|actual| condition.operator.compare(actual, condition.value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TimerKey {
    pid: u32,
    condition_type: ConditionType,
    operator: Operator,
    threshold: u64,
}

impl TimerKey {
    fn new(pid: u32, condition: &RecoveryCondition) -> Self {
        Self {
            pid,
            condition_type: condition.condition_type,
            operator: condition.operator,
            threshold: condition.value.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    armed_at: Instant,
    consumed: bool,
}

/// (pid, type, operator, threshold) 별 지속 시간 타이머
#[derive(Debug, Default)]
pub struct ConditionTimers {
    timers: HashMap<TimerKey, Timer>,
}

impl ConditionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 관찰 한 번. 조건이 충족되었는지 돌려준다
    pub fn observe(
        &mut self,
        pid: u32,
        condition: &RecoveryCondition,
        result: &HealthCheckResult,
        now: Instant,
    ) -> bool {
        let truth = holds(condition, result);
        let Some(required) = condition.duration() else {
            return truth;
        };

        let key = TimerKey::new(pid, condition);
        if !truth {
            self.timers.remove(&key);
            return false;
        }

        let timer = self.timers.entry(key).or_insert(Timer {
            armed_at: now,
            consumed: false,
        });
        !timer.consumed && now.saturating_duration_since(timer.armed_at) >= required
    }

    /// 적용된 전략의 타이머 소진 (다음 연속 구간까지 다시 충족되지 않음)
    pub fn consume(&mut self, pid: u32, conditions: &[RecoveryCondition]) {
        for condition in conditions.iter().filter(|c| c.duration.is_some()) {
            if let Some(timer) = self.timers.get_mut(&TimerKey::new(pid, condition)) {
                timer.consumed = true;
            }
        }
    }

    /// pid 의 모든 타이머 취소
    pub fn clear_pid(&mut self, pid: u32) {
        self.timers.retain(|key, _| key.pid != pid);
    }

    /// 전체 타이머 취소 (종료 시)
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn armed_count(&self, pid: u32) -> usize {
        self.timers.keys().filter(|k| k.pid == pid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthIssue, ProcessMetrics, Severity};
    use chrono::Utc;
    use std::time::Duration;

    fn result(score: u8) -> HealthCheckResult {
        HealthCheckResult {
            pid: 1,
            name: "api".to_string(),
            is_healthy: true,
            health_score: score,
            issues: vec![],
            metrics: ProcessMetrics {
                memory_bytes: 3 * 1024 * 1024 * 1024,
                ..Default::default()
            },
            timestamp: Utc::now(),
        }
    }

    fn low_score(duration_ms: u64) -> RecoveryCondition {
        RecoveryCondition::new(ConditionType::HealthScore, Operator::Lt, 30.0)
            .sustained_for(Duration::from_millis(duration_ms))
    }

    #[test]
    fn test_values() {
        let mut r = result(50);
        assert_eq!(condition_value(ConditionType::MemoryMb, &r), Some(3072.0));
        assert_eq!(condition_value(ConditionType::ResponseTime, &r), None);
        assert_eq!(condition_value(ConditionType::Unresponsive, &r), Some(0.0));

        r.issues.push(HealthIssue::new(IssueType::Unresponsive, Severity::Critical, "x"));
        assert_eq!(condition_value(ConditionType::Unresponsive, &r), Some(1.0));
        assert_eq!(condition_value(ConditionType::IssueCount, &r), Some(1.0));
    }

    #[test]
    fn test_instant_condition() {
        let mut timers = ConditionTimers::new();
        let c = RecoveryCondition::new(ConditionType::HealthScore, Operator::Lt, 30.0);
        let now = Instant::now();
        assert!(timers.observe(1, &c, &result(10), now));
        assert!(!timers.observe(1, &c, &result(90), now));
        assert_eq!(timers.armed_count(1), 0);
    }

    #[test]
    fn test_flapping_never_triggers() {
        let mut timers = ConditionTimers::new();
        let c = low_score(1000);
        let start = Instant::now();

        for i in 0..10u64 {
            let t = start + Duration::from_millis(i * 600);
            let r = if i % 2 == 0 { result(10) } else { result(90) };
            assert!(!timers.observe(1, &c, &r, t));
        }
    }

    #[test]
    fn test_sustained_triggers_once_per_period() {
        let mut timers = ConditionTimers::new();
        let c = low_score(1000);
        let start = Instant::now();

        assert!(!timers.observe(1, &c, &result(10), start));
        assert!(!timers.observe(1, &c, &result(10), start + Duration::from_millis(500)));
        assert!(timers.observe(1, &c, &result(10), start + Duration::from_millis(1000)));

        timers.consume(1, std::slice::from_ref(&c));
        assert!(!timers.observe(1, &c, &result(10), start + Duration::from_millis(3000)));

        // 거짓 관찰로 구간이 끝나면 다시 처음부터
        assert!(!timers.observe(1, &c, &result(90), start + Duration::from_millis(3100)));
        assert!(!timers.observe(1, &c, &result(10), start + Duration::from_millis(3200)));
        assert!(timers.observe(1, &c, &result(10), start + Duration::from_millis(4200)));
    }

    #[test]
    fn test_timers_are_per_pid() {
        let mut timers = ConditionTimers::new();
        let c = low_score(100);
        let start = Instant::now();

        timers.observe(1, &c, &result(10), start);
        timers.observe(2, &c, &result(10), start);
        timers.clear_pid(1);
        assert_eq!(timers.armed_count(1), 0);
        assert_eq!(timers.armed_count(2), 1);

        timers.clear();
        assert!(timers.is_empty());
    }
}
