//! # warden-foundation
//!
//! Foundation layer for warden:
//! - Error: 에러 분류 (`kind()` 문자열 포함)
//! - Event: 타입별 이벤트 버스
//! - Storage: JsonStore (설정, 스냅샷)
//! - Config: WardenConfig + 계층 로더
//! - Telemetry: 로그/메트릭 sink
//! - Debounce / Lifecycle: 스케줄러와 전역 실행 상태
//!
//! ## 아키텍처
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Layer4-cli      (warden 바이너리)                     │
//! │  Layer3-server   (툴 레지스트리, JSON-RPC stdio)       │
//! │  Layer2-supervisor (프로세스/헬스/복구/테스트 실행)    │
//! │  Layer1-foundation (이 크레이트)                       │
//! └───────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod storage;
pub mod telemetry;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    ConfigLoader, HealthSettings, RecoverySettings, TestRunSettings, WardenConfig,
    SETTINGS_FILE, SNAPSHOT_FILE,
};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{Event, EventBus, EventFilter, EventListener, ListenerId};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, WARDEN_DIR};

// ============================================================================
// Telemetry / Scheduling / Lifecycle
// ============================================================================
pub use debounce::{DebouncedAction, Debouncer};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use telemetry::{
    labels, Labels, MemorySink, RecordedMetric, SharedSink, TelemetryLevel, TelemetrySink,
    TracingSink,
};
