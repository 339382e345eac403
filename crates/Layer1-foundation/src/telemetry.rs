//! Telemetry - 로그/메트릭 sink
//!
//! 코어는 sink를 fire-and-forget으로 호출하며 결과를 기다리지 않는다.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, trace, warn};

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// 메트릭 라벨
pub type Labels = HashMap<String, String>;

/// 로그/메트릭 sink
pub trait TelemetrySink: Send + Sync {
    fn log(
        &self,
        level: TelemetryLevel,
        category: &str,
        message: &str,
        meta: Option<&Value>,
        pid: Option<u32>,
    );

    fn record_metric(&self, name: &str, value: f64, labels: Option<&Labels>);
}

/// 공유 sink 핸들
pub type SharedSink = Arc<dyn TelemetrySink>;

/// `tracing` 이벤트로 전달하는 기본 sink
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl TracingSink {
    pub fn shared() -> SharedSink {
        Arc::new(Self)
    }
}

impl TelemetrySink for TracingSink {
    fn log(
        &self,
        level: TelemetryLevel,
        category: &str,
        message: &str,
        meta: Option<&Value>,
        pid: Option<u32>,
    ) {
        let meta = meta.map(|m| m.to_string()).unwrap_or_default();
        match level {
            TelemetryLevel::Trace => {
                trace!(target: "warden::telemetry", category, pid, %meta, "{}", message)
            }
            TelemetryLevel::Debug => {
                debug!(target: "warden::telemetry", category, pid, %meta, "{}", message)
            }
            TelemetryLevel::Info => {
                info!(target: "warden::telemetry", category, pid, %meta, "{}", message)
            }
            TelemetryLevel::Warn => {
                warn!(target: "warden::telemetry", category, pid, %meta, "{}", message)
            }
            TelemetryLevel::Error => {
                error!(target: "warden::telemetry", category, pid, %meta, "{}", message)
            }
        }
    }

    fn record_metric(&self, name: &str, value: f64, labels: Option<&Labels>) {
        let labels = labels
            .map(|l| {
                let mut pairs: Vec<_> = l.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                pairs.sort();
                pairs.join(",")
            })
            .unwrap_or_default();
        debug!(target: "warden::telemetry", metric = name, value, %labels, "metric");
    }
}

/// 기록된 메트릭 (MemorySink)
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

/// 메모리에 메트릭을 쌓는 sink (관찰/테스트용)
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.metrics().iter().filter(|m| m.name == name).count()
    }
}

impl TelemetrySink for MemorySink {
    fn log(&self, _: TelemetryLevel, _: &str, _: &str, _: Option<&Value>, _: Option<u32>) {}

    fn record_metric(&self, name: &str, value: f64, labels: Option<&Labels>) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedMetric {
                name: name.to_string(),
                value,
                labels: labels.cloned().unwrap_or_default(),
            });
    }
}

/// 라벨 생성 헬퍼
pub fn labels<const N: usize>(pairs: [(&str, String); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemorySink::new();
        sink.record_metric("process.spawned", 1.0, Some(&labels([("role", "backend".into())])));
        sink.record_metric("health.score", 85.0, None);

        assert_eq!(sink.count("process.spawned"), 1);
        let metrics = sink.metrics();
        assert_eq!(metrics[0].labels.get("role").map(String::as_str), Some("backend"));
        assert_eq!(metrics[1].value, 85.0);
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let sink = TracingSink;
        sink.log(
            TelemetryLevel::Warn,
            "recovery",
            "restart failed",
            Some(&serde_json::json!({"attempt": 2})),
            Some(42),
        );
        sink.record_metric("recovery.attempt", 1.0, None);
    }
}
