//! Health scoring
//!
//! 100 점에서 시작해 규칙마다 독립적으로 감점하고 0 에서 멈춘다.
//!
//! | 규칙 | 감점 | 심각도 |
//! |------|------|--------|
//! | OS 테이블에 없음 / 좀비 | 0 점 고정 | critical |
//! | CPU 임계값 초과 | -20 | high (>95% 면 critical) |
//! | 메모리 임계값 초과 | -15 | high |
//! | 메모리 증가 추세 + 급증 | -10 | medium |
//! | 에러 로그 임계값 초과 | -25 | high |
//! | 응답 없음 | -30 | critical |

use super::{
    HealthCheckResult, HealthIssue, IssueType, MemoryTrend, OsSample, ProcessMetrics, Severity,
};
use chrono::Utc;
use std::time::Duration;
use warden_foundation::HealthSettings;

const CPU_PENALTY: i32 = 20;
const CPU_CRITICAL_PERCENT: f32 = 95.0;
const MEMORY_PENALTY: i32 = 15;
const LEAK_PENALTY: i32 = 10;
const ERROR_PENALTY: i32 = 25;
const UNRESPONSIVE_PENALTY: i32 = 30;

/// 추세 판정에서 무시하는 변화량
const TREND_TOLERANCE_BYTES: u64 = 1024 * 1024;

const MIB: f64 = 1024.0 * 1024.0;

/// 임계값
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub leak_delta_bytes: u64,
    pub error_count: usize,
}

impl From<&HealthSettings> for Thresholds {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            cpu_percent: settings.cpu_threshold,
            memory_bytes: settings.memory_threshold_bytes,
            leak_delta_bytes: settings.memory_leak_delta_bytes,
            error_count: settings.error_log_threshold,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&HealthSettings::default())
    }
}

/// 응답성 체크 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Responsiveness {
    /// 대상이 아님 (task 프로세스가 아니거나 프로브 없음)
    Skipped,
    Responded(Duration),
    NoResponse,
}

/// 점수 계산 입력
#[derive(Debug, Clone)]
pub struct ScoringInput {
    pub pid: u32,
    pub name: String,
    pub sample: OsSample,
    /// 직전 체크의 메모리
    pub previous_memory: Option<u64>,
    pub uptime_ms: u64,
    pub error_count: usize,
    pub restart_count: u32,
    pub responsiveness: Responsiveness,
}

/// 직전 대비 메모리 추세
pub fn memory_trend(previous: Option<u64>, current: u64) -> MemoryTrend {
    match previous {
        Some(prev) if current > prev.saturating_add(TREND_TOLERANCE_BYTES) => MemoryTrend::Increasing,
        Some(prev) if current.saturating_add(TREND_TOLERANCE_BYTES) < prev => MemoryTrend::Decreasing,
        _ => MemoryTrend::Stable,
    }
}

/// 점수 계산
pub fn score(input: &ScoringInput, thresholds: &Thresholds) -> HealthCheckResult {
    let mut metrics = ProcessMetrics {
        uptime_ms: input.uptime_ms,
        error_count: input.error_count,
        restart_count: input.restart_count,
        ..Default::default()
    };

    let (cpu_percent, memory_bytes) = match input.sample {
        OsSample::Alive {
            cpu_percent,
            memory_bytes,
        } => (cpu_percent, memory_bytes),
        OsSample::NotFound | OsSample::Zombie => {
            let message = if input.sample == OsSample::Zombie {
                format!("process {} is a zombie", input.pid)
            } else {
                format!("process {} not found in OS process table", input.pid)
            };
            return finish(
                input,
                0,
                vec![HealthIssue::new(IssueType::Zombie, Severity::Critical, message)],
                metrics,
            );
        }
    };

    metrics.cpu_percent = cpu_percent;
    metrics.memory_bytes = memory_bytes;
    metrics.memory_trend = memory_trend(input.previous_memory, memory_bytes);

    let mut score: i32 = 100;
    let mut issues = Vec::new();

    if cpu_percent > thresholds.cpu_percent {
        score -= CPU_PENALTY;
        let severity = if cpu_percent > CPU_CRITICAL_PERCENT {
            Severity::Critical
        } else {
            Severity::High
        };
        issues.push(HealthIssue::new(
            IssueType::Cpu,
            severity,
            format!("high CPU usage: {:.1}%", cpu_percent),
        ));
    }

    if memory_bytes > thresholds.memory_bytes {
        score -= MEMORY_PENALTY;
        issues.push(HealthIssue::new(
            IssueType::Memory,
            Severity::High,
            format!("high memory usage: {:.1} MB", memory_bytes as f64 / MIB),
        ));
    }

    if metrics.memory_trend == MemoryTrend::Increasing {
        let delta = memory_bytes.saturating_sub(input.previous_memory.unwrap_or(memory_bytes));
        if delta > thresholds.leak_delta_bytes {
            score -= LEAK_PENALTY;
            issues.push(HealthIssue::new(
                IssueType::Memory,
                Severity::Medium,
                format!("possible memory leak: +{:.1} MB since last check", delta as f64 / MIB),
            ));
        }
    }

    if input.error_count > thresholds.error_count {
        score -= ERROR_PENALTY;
        issues.push(HealthIssue::new(
            IssueType::Error,
            Severity::High,
            format!("{} error lines in recent logs", input.error_count),
        ));
    }

    match input.responsiveness {
        Responsiveness::Responded(rtt) => {
            metrics.response_time_ms = Some(rtt.as_millis() as u64);
        }
        Responsiveness::NoResponse => {
            score -= UNRESPONSIVE_PENALTY;
            issues.push(HealthIssue::new(
                IssueType::Unresponsive,
                Severity::Critical,
                "process did not respond to its readiness probe",
            ));
        }
        Responsiveness::Skipped => {}
    }

    finish(input, score.max(0) as u8, issues, metrics)
}

fn finish(
    input: &ScoringInput,
    score: u8,
    issues: Vec<HealthIssue>,
    metrics: ProcessMetrics,
) -> HealthCheckResult {
    let is_healthy = !issues.iter().any(|i| i.severity == Severity::Critical);
    HealthCheckResult {
        pid: input.pid,
        name: input.name.clone(),
        is_healthy,
        health_score: score,
        issues,
        metrics,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn input(sample: OsSample) -> ScoringInput {
        ScoringInput {
            pid: 42,
            name: "api".to_string(),
            sample,
            previous_memory: None,
            uptime_ms: 10_000,
            error_count: 0,
            restart_count: 0,
            responsiveness: Responsiveness::Skipped,
        }
    }

    fn alive(cpu: f32, memory: u64) -> OsSample {
        OsSample::Alive {
            cpu_percent: cpu,
            memory_bytes: memory,
        }
    }

    #[test]
    fn test_healthy_process() {
        let result = score(&input(alive(5.0, 100 * MB)), &Thresholds::default());
        assert_eq!(result.health_score, 100);
        assert!(result.is_healthy);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_missing_process_short_circuits() {
        let mut i = input(OsSample::NotFound);
        i.error_count = 100;
        let result = score(&i, &Thresholds::default());
        assert_eq!(result.health_score, 0);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].issue_type, IssueType::Zombie);
        assert!(!result.is_healthy);
    }

    #[test]
    fn test_cpu_severity() {
        let high = score(&input(alive(85.0, MB)), &Thresholds::default());
        assert_eq!(high.health_score, 80);
        assert_eq!(high.issues[0].severity, Severity::High);
        assert!(high.is_healthy);

        let critical = score(&input(alive(99.0, MB)), &Thresholds::default());
        assert_eq!(critical.issues[0].severity, Severity::Critical);
        assert!(!critical.is_healthy);
    }

    #[test]
    fn test_leak_requires_large_delta() {
        let mut i = input(alive(1.0, 200 * MB));
        i.previous_memory = Some(190 * MB);
        let small = score(&i, &Thresholds::default());
        assert_eq!(small.metrics.memory_trend, MemoryTrend::Increasing);
        assert_eq!(small.health_score, 100);

        i.previous_memory = Some(100 * MB);
        let leak = score(&i, &Thresholds::default());
        assert_eq!(leak.health_score, 90);
        assert_eq!(leak.issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_score_never_below_zero() {
        let mut i = input(alive(99.0, 4096 * MB));
        i.previous_memory = Some(MB);
        i.error_count = 50;
        i.responsiveness = Responsiveness::NoResponse;
        let result = score(&i, &Thresholds::default());
        // 20 + 15 + 10 + 25 + 30 = 100
        assert_eq!(result.health_score, 0);
        assert_eq!(result.issues.len(), 5);

        let strict = Thresholds {
            cpu_percent: 0.0,
            memory_bytes: 0,
            leak_delta_bytes: 0,
            error_count: 0,
        };
        assert_eq!(score(&i, &strict).health_score, 0);
    }

    #[test]
    fn test_response_time_reported() {
        let mut i = input(alive(1.0, MB));
        i.responsiveness = Responsiveness::Responded(Duration::from_millis(12));
        let result = score(&i, &Thresholds::default());
        assert_eq!(result.metrics.response_time_ms, Some(12));
        assert_eq!(result.health_score, 100);
    }

    #[test]
    fn test_memory_trend_tolerance() {
        assert_eq!(memory_trend(None, 10 * MB), MemoryTrend::Stable);
        assert_eq!(memory_trend(Some(10 * MB), 10 * MB + 100), MemoryTrend::Stable);
        assert_eq!(memory_trend(Some(10 * MB), 20 * MB), MemoryTrend::Increasing);
        assert_eq!(memory_trend(Some(20 * MB), 10 * MB), MemoryTrend::Decreasing);
    }
}
