//! Health Monitor - 주기적 점수 계산과 이슈 감지
//!
//! - `sampler`: OS 에서 CPU/메모리/좀비 여부 샘플링
//! - `scoring`: 100 점에서 규칙별 감점 (순수 함수)
//! - `monitor`: pid 별 타이머, 히스토리 ring, 이벤트 발행

pub mod monitor;
pub mod sampler;
pub mod scoring;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use monitor::{HealthMonitor, ProcessMetadata, ProcessMetadataSource};
pub use sampler::{MetricsSampler, OsSample, SysinfoSampler};
pub use scoring::{memory_trend, score, Responsiveness, ScoringInput, Thresholds};

/// 이 점수 미만이면 Unhealthy
pub const UNHEALTHY_BELOW: u8 = 70;

/// 이슈 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Memory,
    Cpu,
    Unresponsive,
    Error,
    Zombie,
    Resource,
}

/// 심각도 (낮은 것부터)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthIssue {
    pub fn new(issue_type: IssueType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 메모리 추세
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTrend {
    #[default]
    Stable,
    Increasing,
    Decreasing,
}

/// 체크 시점의 측정값
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub memory_trend: MemoryTrend,
    pub uptime_ms: u64,
    pub error_count: usize,
    pub restart_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// 헬스 체크 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub pid: u32,
    pub name: String,
    /// critical 이슈가 하나라도 있으면 false
    pub is_healthy: bool,
    pub health_score: u8,
    pub issues: Vec<HealthIssue>,
    pub metrics: ProcessMetrics,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn has_high(&self) -> bool {
        self.issues.iter().any(|i| i.severity >= Severity::High)
    }

    pub fn has_issue(&self, issue_type: IssueType) -> bool {
        self.issues.iter().any(|i| i.issue_type == issue_type)
    }
}

/// 최근 high/critical 이슈 (요약용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentIssue {
    pub pid: u32,
    pub name: String,
    #[serde(flatten)]
    pub issue: HealthIssue,
}

/// 전체 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub critical: usize,
    pub average_score: f64,
    pub recent_issues: Vec<RecentIssue>,
}
