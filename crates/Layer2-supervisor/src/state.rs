//! Test run state machine
//!
//! `pending → starting → running → completed | failed | aborted`

use crate::process::{ProcessRole, ReadinessConfig, StartOptions, StartSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use warden_foundation::{Error, Result};

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TestRunStatus {
    /// 더 이상 전이하지 않는 상태
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestRunStatus::Completed | TestRunStatus::Failed | TestRunStatus::Aborted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestRunStatus::Pending => "pending",
            TestRunStatus::Starting => "starting",
            TestRunStatus::Running => "running",
            TestRunStatus::Completed => "completed",
            TestRunStatus::Failed => "failed",
            TestRunStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 테스트 실행의 구성 프로세스 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProcessSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessConfig>,
    /// 없으면 backend/frontend 는 true, test 는 false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton: Option<bool>,
    #[serde(default)]
    pub shell: bool,
}

impl RunProcessSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            name: None,
            env: HashMap::new(),
            readiness: None,
            singleton: None,
            shell: false,
        }
    }

    /// supervisor 시작 명세로 변환 (역할과 run 태그 부여)
    pub fn to_start_spec(&self, role: ProcessRole, run_id: &str) -> StartSpec {
        let singleton_default = matches!(role, ProcessRole::Backend | ProcessRole::Frontend);
        StartSpec::new(self.command.clone(), self.args.clone()).with_options(StartOptions {
            name: self.name.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            role: Some(role),
            tags: vec![format!("test-run:{}", run_id)],
            readiness: self.readiness.clone(),
            singleton: self.singleton.unwrap_or(singleton_default),
            shell: self.shell,
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// `start_run` 입력
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunConfig {
    /// 없으면 uuid 생성
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<RunProcessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<RunProcessSpec>,
    pub test: RunProcessSpec,
    /// 테스트가 끝나면 성공/실패와 무관하게 backend/frontend 중지
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_stop: bool,
    /// 성공 후에도 backend/frontend 유지 (abort 시에도)
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_backends: bool,
}

impl TestRunConfig {
    pub fn new(test: RunProcessSpec) -> Self {
        Self {
            run_id: None,
            backend: None,
            frontend: None,
            test,
            auto_stop: false,
            keep_backends: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(&self.run_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::Validation("runId must not be empty".to_string()));
        }
        let components = [
            ("backend", self.backend.as_ref()),
            ("frontend", self.frontend.as_ref()),
            ("test", Some(&self.test)),
        ];
        for (component, spec) in components {
            if let Some(spec) = spec {
                if spec.command.trim().is_empty() {
                    return Err(Error::Validation(format!(
                        "{} command must not be empty",
                        component
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 실행 로그 한 줄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// 테스트 실행 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunState {
    pub run_id: String,
    pub status: TestRunStatus,
    pub config: TestRunConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// append-only
    pub log: Vec<RunLogLine>,
}

impl TestRunState {
    pub fn new(run_id: impl Into<String>, config: TestRunConfig) -> Self {
        let mut state = Self {
            run_id: run_id.into(),
            status: TestRunStatus::Pending,
            config,
            backend_pid: None,
            frontend_pid: None,
            test_pid: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            exit_code: None,
            error: None,
            log: Vec::new(),
        };
        state.push_log("created");
        state
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(RunLogLine {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// 상태 전이. 종료 상태에서는 무시하고 false
    pub fn transition(&mut self, status: TestRunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.push_log(format!("status: {} -> {}", self.status, status));
        self.status = status;
        match status {
            TestRunStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    /// 실패로 종료
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        if !self.transition(TestRunStatus::Failed) {
            return false;
        }
        self.push_log(format!("error: {}", error));
        self.error = Some(error);
        true
    }

    /// 정리 대상 backend/frontend pid
    pub fn backend_pids(&self) -> Vec<u32> {
        self.backend_pid.into_iter().chain(self.frontend_pid).collect()
    }

    /// 완료 후 backend/frontend 를 내릴지
    pub fn should_teardown(&self) -> bool {
        self.config.auto_stop
            || (self.status == TestRunStatus::Completed && !self.config.keep_backends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> TestRunState {
        TestRunState::new("run-1", TestRunConfig::new(RunProcessSpec::new("npm", vec!["test".into()])))
    }

    #[test]
    fn test_transitions_stop_at_terminal() {
        let mut s = state();
        assert!(s.transition(TestRunStatus::Starting));
        assert!(s.transition(TestRunStatus::Running));
        assert!(s.started_at.is_some());
        assert!(s.transition(TestRunStatus::Completed));
        assert!(s.completed_at.is_some());

        assert!(!s.transition(TestRunStatus::Aborted));
        assert!(!s.fail("late"));
        assert_eq!(s.status, TestRunStatus::Completed);
        assert!(s.error.is_none());
        // created + 3 transitions
        assert_eq!(s.log.len(), 4);
    }

    #[test]
    fn test_teardown_rules() {
        let mut s = state();
        s.transition(TestRunStatus::Completed);
        assert!(s.should_teardown());

        s.config.keep_backends = true;
        assert!(!s.should_teardown());

        s.config.auto_stop = true;
        assert!(s.should_teardown());

        let mut failed = state();
        failed.fail("exit code 1");
        assert!(!failed.should_teardown());
    }

    #[test]
    fn test_component_defaults() {
        let spec = RunProcessSpec::new("node", vec!["server.js".into()]);
        let backend = spec.to_start_spec(ProcessRole::Backend, "r1");
        assert!(backend.options.singleton);
        assert_eq!(backend.options.role, Some(ProcessRole::Backend));
        assert_eq!(backend.options.tags, vec!["test-run:r1"]);

        let test = spec.to_start_spec(ProcessRole::Test, "r1");
        assert!(!test.options.singleton);
    }

    #[test]
    fn test_config_wire_format() {
        let config: TestRunConfig = serde_json::from_value(json!({
            "backend": {"command": "node", "args": ["api.js"], "readiness": {"port": 3000}},
            "test": {"command": "npx", "args": ["playwright", "test"], "singleton": false},
            "autoStop": true
        }))
        .unwrap();
        assert!(config.run_id.is_none());
        assert!(config.auto_stop);
        assert!(!config.keep_backends);
        assert!(config.validate().is_ok());

        let bad: TestRunConfig = serde_json::from_value(json!({"runId": " ", "test": {"command": "x"}})).unwrap();
        assert_eq!(bad.validate().unwrap_err().kind(), "validation");
    }
}
