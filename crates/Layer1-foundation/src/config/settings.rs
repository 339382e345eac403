//! WardenConfig - 통합 설정

use crate::storage::JsonStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const SETTINGS_FILE: &str = "settings.json";

/// 프로세스 테이블 스냅샷 파일명
pub const SNAPSHOT_FILE: &str = "processes.json";

const MIB: u64 = 1024 * 1024;

// ============================================================================
// WardenConfig
// ============================================================================

/// warden 통합 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// 상태 디렉토리 (스냅샷 저장 위치)
    pub state_dir: PathBuf,

    /// 스냅샷 파일명
    pub snapshot_file: String,

    /// 복구/크래시 안내 로그를 debug 레벨로 낮춤
    pub silent_recovery: bool,

    /// 시작 후 이 시간 안의 비정상 종료는 startup failure로 분류
    pub crash_grace_ms: u64,

    /// 스냅샷 쓰기 debounce 윈도우
    pub persist_debounce_ms: u64,

    /// 프로세스별 로그 ring 크기
    pub log_ring_size: usize,

    /// 종료된 엔트리를 테이블에서 제거하기까지의 지연
    pub purge_delay_ms: u64,

    /// SIGTERM 후 SIGKILL까지 대기
    pub stop_grace_ms: u64,

    /// restart 시 stop → start 사이 대기
    pub restart_settle_ms: u64,

    /// kill-restart 액션의 force stop → start 사이 대기
    pub kill_restart_settle_ms: u64,

    /// 이전 세션 프로세스 재연결 여부
    pub reattach: bool,

    pub health: HealthSettings,
    pub recovery: RecoverySettings,
    pub test_run: TestRunSettings,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            snapshot_file: SNAPSHOT_FILE.to_string(),
            silent_recovery: false,
            crash_grace_ms: 5000,
            persist_debounce_ms: 200,
            log_ring_size: 100,
            purge_delay_ms: 30_000,
            stop_grace_ms: 2000,
            restart_settle_ms: 1000,
            kill_restart_settle_ms: 1000,
            reattach: true,
            health: HealthSettings::default(),
            recovery: RecoverySettings::default(),
            test_run: TestRunSettings::default(),
        }
    }
}

impl WardenConfig {
    /// 상태 디렉토리 저장소
    pub fn state_store(&self) -> JsonStore {
        JsonStore::new(self.state_dir.clone())
    }

    pub fn crash_grace(&self) -> Duration {
        Duration::from_millis(self.crash_grace_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn purge_delay(&self) -> Duration {
        Duration::from_millis(self.purge_delay_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn kill_restart_settle(&self) -> Duration {
        Duration::from_millis(self.kill_restart_settle_ms)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(crate::storage::WARDEN_DIR))
        .unwrap_or_else(|| PathBuf::from(crate::storage::WARDEN_DIR))
}

// ============================================================================
// 하위 설정
// ============================================================================

/// Health monitor 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub interval_ms: u64,
    /// CPU 사용률 임계값 (%)
    pub cpu_threshold: f32,
    pub memory_threshold_bytes: u64,
    /// 직전 샘플 대비 이 이상 증가하면 누수 의심
    pub memory_leak_delta_bytes: u64,
    pub error_log_threshold: usize,
    pub history_size: usize,
    /// ProcessRegistered 시 자동 모니터링
    pub auto_monitor: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            cpu_threshold: 80.0,
            memory_threshold_bytes: 1024 * MIB,
            memory_leak_delta_bytes: 50 * MIB,
            error_log_threshold: 5,
            history_size: 100,
            auto_monitor: true,
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Recovery engine 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub enabled: bool,
    pub attempt_history_size: usize,
    /// Critical 이벤트 시 emergency kill-restart
    pub emergency_enabled: bool,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            attempt_history_size: 50,
            emergency_enabled: true,
        }
    }
}

/// Test-run orchestrator 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRunSettings {
    pub poll_interval_ms: u64,
}

impl Default for TestRunSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl TestRunSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.snapshot_file, "processes.json");
        assert_eq!(config.crash_grace_ms, 5000);
        assert_eq!(config.log_ring_size, 100);
        assert_eq!(config.health.memory_threshold_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.recovery.attempt_history_size, 50);
        assert_eq!(config.test_run.poll_interval(), Duration::from_secs(1));
        assert!(config.state_dir.ends_with(".warden"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: WardenConfig =
            serde_json::from_str(r#"{"silent_recovery": true, "health": {"interval_ms": 250}}"#)
                .unwrap();
        assert!(config.silent_recovery);
        assert_eq!(config.health.interval_ms, 250);
        assert_eq!(config.health.error_log_threshold, 5);
        assert_eq!(config.stop_grace_ms, 2000);
    }
}
