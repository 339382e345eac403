//! # warden-supervisor
//!
//! Development process supervision for warden.
//! Spawns, tracks, health-checks and auto-recovers dev servers, test runners
//! and build tools on behalf of a calling agent.
//!
//! ## Features
//!
//! - Process supervisor (singleton reuse, port inference, graceful stop, reattach)
//! - Readiness probes (port / http / log)
//! - Health monitor (periodic scoring, issue detection)
//! - Recovery engine (conditions with sustained duration, cooldown, emergency kill-restart)
//! - Test-run orchestration (backend → frontend → test, teardown / abort)

pub mod events;
pub mod health;
pub mod orchestrator;
pub mod persist;
pub mod process;
pub mod readiness;
pub mod recovery;
pub mod state;
pub mod supervisor;

// Supervisor
pub use supervisor::Supervisor;
pub use process::{
    ExitInfo, ManagedProcess, PortConflict, ProcessRef, ProcessRole, ProcessStatus,
    ReadinessConfig, ReadinessProbe, RestartResult, StartOptions, StartResult, StartSpec,
    StopResult,
};

// Log system
pub use process::{LogEntry, LogLevel, ProcessLogBuffer, ProcessLogManager};

// Events
pub use events::{HealthEvent, LifecycleEvent, RecoveryEvent, UnregisterReason};

// Persistence
pub use persist::{JsonSnapshotStore, ProcessRecord, SharedSnapshotStore, Snapshot, SnapshotStore};

// Health
pub use health::{
    HealthCheckResult, HealthIssue, HealthMonitor, HealthSummary, IssueType, MemoryTrend,
    MetricsSampler, ProcessMetrics, Severity, SysinfoSampler,
};

// Recovery
pub use recovery::{
    ActionType, ConditionType, Operator, RecoveryAction, RecoveryAttempt, RecoveryCondition,
    RecoveryEngine, RecoveryStats, RecoveryStrategy, RecoveryTarget,
};

// Test runs
pub use orchestrator::TestRunOrchestrator;
pub use state::{RunProcessSpec, TestRunConfig, TestRunState, TestRunStatus};
