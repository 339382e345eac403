//! 복구 시도 기록
//!
//! 프로세스 이름 기준으로 쌓는다. pid 는 재시작마다 바뀌므로 이름이 있어야
//! maxAttempts / cooldown 이 재시작을 넘어 유지된다.

use super::RecoveryStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::time::Instant;

/// 복구 시도 1회
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAttempt {
    pub pid: u32,
    pub name: String,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    /// 실행된 액션 (순서대로)
    pub actions: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_pid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStats {
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
}

/// 집계
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStats {
    pub total_attempts: usize,
    pub successful: usize,
    pub failed: usize,
    pub by_strategy: BTreeMap<String, StrategyStats>,
    /// 프로세스 이름별 마지막 시도
    pub last_attempts: BTreeMap<String, RecoveryAttempt>,
}

#[derive(Debug, Clone)]
struct Recorded {
    at: Instant,
    attempt: RecoveryAttempt,
}

/// 이름별 bounded 기록
#[derive(Debug)]
pub struct AttemptHistory {
    limit: usize,
    entries: HashMap<String, VecDeque<Recorded>>,
}

impl AttemptHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn record(&mut self, attempt: RecoveryAttempt, at: Instant) {
        let ring = self.entries.entry(attempt.name.clone()).or_default();
        ring.push_back(Recorded { at, attempt });
        while ring.len() > self.limit {
            ring.pop_front();
        }
    }

    /// maxAttempts 에 도달했고 마지막 시도가 cooldown 안이면 건너뛴다
    pub fn should_skip(&self, name: &str, strategy: &RecoveryStrategy, now: Instant) -> bool {
        let Some(ring) = self.entries.get(name) else {
            return false;
        };
        let mut attempts = ring.iter().filter(|r| r.attempt.strategy == strategy.name);
        let count = attempts.clone().count();
        if count < strategy.max_attempts as usize {
            return false;
        }
        attempts
            .next_back()
            .is_some_and(|last| now.saturating_duration_since(last.at) < strategy.cooldown())
    }

    /// 최신순
    pub fn attempts(&self, name: &str) -> Vec<RecoveryAttempt> {
        self.entries
            .get(name)
            .map(|ring| ring.iter().rev().map(|r| r.attempt.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RecoveryStats {
        let mut stats = RecoveryStats::default();
        for (name, ring) in &self.entries {
            for recorded in ring {
                let attempt = &recorded.attempt;
                let entry = stats.by_strategy.entry(attempt.strategy.clone()).or_default();
                entry.attempts += 1;
                stats.total_attempts += 1;
                if attempt.success {
                    entry.successes += 1;
                    stats.successful += 1;
                } else {
                    entry.failures += 1;
                    stats.failed += 1;
                }
            }
            if let Some(last) = ring.back() {
                stats.last_attempts.insert(name.clone(), last.attempt.clone());
            }
        }
        stats
    }

    pub fn clear(&mut self, name: &str) {
        self.entries.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{default_strategies, emergency_strategy};
    use std::time::Duration;

    fn attempt(strategy: &str, success: bool) -> RecoveryAttempt {
        RecoveryAttempt {
            pid: 10,
            name: "api".to_string(),
            strategy: strategy.to_string(),
            timestamp: Utc::now(),
            actions: vec!["restart".to_string()],
            success,
            error: None,
            new_pid: None,
        }
    }

    #[test]
    fn test_cooldown_after_max_attempts() {
        let error_restart = default_strategies().remove(0);
        let mut history = AttemptHistory::new(50);
        let start = Instant::now();

        for i in 0..3 {
            assert!(!history.should_skip("api", &error_restart, start));
            history.record(attempt("error-restart", true), start + Duration::from_secs(i));
        }

        assert!(history.should_skip("api", &error_restart, start + Duration::from_secs(10)));
        // 다른 이름은 영향 없음
        assert!(!history.should_skip("web", &error_restart, start + Duration::from_secs(10)));
        // cooldown 이 지나면 다시 허용
        assert!(!history.should_skip("api", &error_restart, start + Duration::from_secs(63)));
    }

    #[test]
    fn test_zero_cooldown_never_skips() {
        let emergency = emergency_strategy();
        let mut history = AttemptHistory::new(50);
        let now = Instant::now();
        history.record(attempt(&emergency.name, false), now);
        assert!(!history.should_skip("api", &emergency, now));
    }

    #[test]
    fn test_history_bounded_and_stats() {
        let mut history = AttemptHistory::new(3);
        let now = Instant::now();
        history.record(attempt("a", true), now);
        history.record(attempt("a", false), now);
        history.record(attempt("b", true), now);
        history.record(attempt("b", true), now);

        assert_eq!(history.attempts("api").len(), 3);
        let stats = history.stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_strategy["b"].successes, 2);
        assert_eq!(stats.last_attempts["api"].strategy, "b");
    }
}
