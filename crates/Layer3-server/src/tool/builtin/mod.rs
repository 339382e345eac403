//! Builtin Tools - 기본 툴 묶음
//!
//! ## 툴 목록
//!
//! ### 프로세스 (process)
//! - `start_process`, `stop_process`, `restart_process`
//! - `list_processes`, `process_status`, `get_logs`
//! - `find_by_port`, `detect_port_conflicts`
//!
//! ### 헬스 (health)
//! - `health_check`, `health_summary`
//!
//! ### 복구 (recovery)
//! - `configure_recovery`, `recovery_stats`
//!
//! ### 테스트 실행 (test_run)
//! - `start_test_run`, `abort_test_run`, `test_run_status`, `list_test_runs`
//!
//! ### 워크스페이스 (workspace)
//! - `list_tasks`, `detect_project`

pub mod health;
pub mod process;
pub mod recovery;
pub mod test_run;
pub mod workspace;

pub use health::{HealthCheckTool, HealthSummaryTool};
pub use process::{
    DetectPortConflictsTool, FindByPortTool, GetLogsTool, ListProcessesTool, ProcessStatusTool,
    RestartProcessTool, StartProcessTool, StopProcessTool,
};
pub use recovery::{ConfigureRecoveryTool, RecoveryStatsTool};
pub use test_run::{AbortTestRunTool, ListTestRunsTool, StartTestRunTool, TestRunStatusTool};
pub use workspace::{DetectProjectTool, ListTasksTool};

use super::Tool;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use warden_supervisor::ProcessRef;

/// 모든 기본 툴 인스턴스
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        // Process
        Arc::new(StartProcessTool) as Arc<dyn Tool>,
        Arc::new(StopProcessTool),
        Arc::new(RestartProcessTool),
        Arc::new(ListProcessesTool),
        Arc::new(ProcessStatusTool),
        Arc::new(FindByPortTool),
        Arc::new(DetectPortConflictsTool),
        Arc::new(GetLogsTool),
        // Health
        Arc::new(HealthCheckTool),
        Arc::new(HealthSummaryTool),
        // Recovery
        Arc::new(ConfigureRecoveryTool),
        Arc::new(RecoveryStatsTool),
        // Test runs
        Arc::new(StartTestRunTool),
        Arc::new(AbortTestRunTool),
        Arc::new(TestRunStatusTool),
        Arc::new(ListTestRunsTool),
        // Workspace
        Arc::new(ListTasksTool),
        Arc::new(DetectProjectTool),
    ]
}

// ============================================================================
// shared input pieces
// ============================================================================

/// pid(정수 또는 숫자 문자열) 또는 이름
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RefArg {
    Pid(u32),
    Name(String),
}

impl From<RefArg> for ProcessRef {
    fn from(arg: RefArg) -> Self {
        match arg {
            RefArg::Pid(pid) => ProcessRef::Pid(pid),
            RefArg::Name(raw) => ProcessRef::parse(&raw),
        }
    }
}

pub(crate) fn ref_schema() -> Value {
    json!({
        "type": ["integer", "string"],
        "description": "Process id or name"
    })
}

pub(crate) fn readiness_schema() -> Value {
    json!({
        "type": "object",
        "description": "Exactly one of port, http, log",
        "properties": {
            "port": {"type": "integer", "minimum": 1},
            "http": {"type": "string"},
            "log": {"type": "string", "description": "Case-insensitive regex matched against output lines"},
            "timeoutMs": {"type": "integer", "minimum": 0},
            "intervalMs": {"type": "integer", "minimum": 1}
        },
        "additionalProperties": false
    })
}

pub(crate) fn string_array() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}
