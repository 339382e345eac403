//! Process - 관리 대상 프로세스 모델
//!
//! - `table`: 프로세스 테이블 (supervisor 단독 소유)
//! - `log`: 프로세스별 로그 ring
//! - `ports`: 커맨드라인/로그 기반 포트 추론
//! - `role`: 이름/커맨드 기반 역할 추론
//! - `os`: 시그널, 생존 확인, 프로세스 트리

pub mod log;
pub mod os;
pub mod ports;
pub mod role;
pub mod table;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use warden_foundation::{Error, Result};

pub use log::{LogEntry, LogLevel, ProcessLogBuffer, ProcessLogManager};
pub use table::{ProcessEntry, ProcessTable};

// ============================================================================
// Role
// ============================================================================

/// 프로세스 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRole {
    Frontend,
    Backend,
    Test,
    E2e,
    Utility,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessRole::Frontend => "frontend",
            ProcessRole::Backend => "backend",
            ProcessRole::Test => "test",
            ProcessRole::E2e => "e2e",
            ProcessRole::Utility => "utility",
        }
    }

    /// 끝나는 것이 정상인 역할. 비정상 종료도 크래시로 보지 않고 복구 대상에서 빠진다
    pub fn is_one_shot(&self) -> bool {
        matches!(self, ProcessRole::Test | ProcessRole::E2e)
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// 기본 readiness 타임아웃
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_millis(20_000);
/// port 프로브 기본 간격
pub const DEFAULT_PORT_INTERVAL: Duration = Duration::from_millis(300);
/// http 프로브 기본 간격
pub const DEFAULT_HTTP_INTERVAL: Duration = Duration::from_millis(500);

/// readiness 프로브 종류
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// TCP 연결 성공 시 ready
    Port(u16),
    /// GET 응답 status < 500 이면 ready
    Http(String),
    /// stdout/stderr 라인이 패턴(대소문자 무시 regex)에 매치되면 ready
    Log(String),
}

/// readiness 설정 (port/http/log 중 정확히 하나)
///
/// wire 형식: `{"port": 3000, "timeoutMs": 2000}`, `{"http": "http://..."}`, `{"log": "ready"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawReadiness", into = "RawReadiness")]
pub struct ReadinessConfig {
    pub probe: ReadinessProbe,
    pub timeout_ms: Option<u64>,
    pub interval_ms: Option<u64>,
}

impl ReadinessConfig {
    pub fn port(port: u16) -> Self {
        Self::new(ReadinessProbe::Port(port))
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::new(ReadinessProbe::Http(url.into()))
    }

    pub fn log(pattern: impl Into<String>) -> Self {
        Self::new(ReadinessProbe::Log(pattern.into()))
    }

    fn new(probe: ReadinessProbe) -> Self {
        Self {
            probe,
            timeout_ms: None,
            interval_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = Some(ms);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_READINESS_TIMEOUT)
    }

    pub fn interval(&self) -> Duration {
        match (self.interval_ms, &self.probe) {
            (Some(ms), _) => Duration::from_millis(ms.max(1)),
            (None, ReadinessProbe::Http(_)) => DEFAULT_HTTP_INTERVAL,
            (None, _) => DEFAULT_PORT_INTERVAL,
        }
    }

    /// TCP/HTTP 로 왕복 시간을 잴 수 있는 프로브인지
    pub fn is_network_probe(&self) -> bool {
        matches!(self.probe, ReadinessProbe::Port(_) | ReadinessProbe::Http(_))
    }

    pub fn port_hint(&self) -> Option<u16> {
        match self.probe {
            ReadinessProbe::Port(port) => Some(port),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReadiness {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval_ms: Option<u64>,
}

impl TryFrom<RawReadiness> for ReadinessConfig {
    type Error = String;

    fn try_from(raw: RawReadiness) -> std::result::Result<Self, Self::Error> {
        let probe = match (raw.port, raw.http, raw.log) {
            (Some(port), None, None) => ReadinessProbe::Port(port),
            (None, Some(url), None) => ReadinessProbe::Http(url),
            (None, None, Some(pattern)) => ReadinessProbe::Log(pattern),
            _ => return Err("readiness must specify exactly one of port, http, log".to_string()),
        };
        Ok(Self {
            probe,
            timeout_ms: raw.timeout_ms,
            interval_ms: raw.interval_ms,
        })
    }
}

impl From<ReadinessConfig> for RawReadiness {
    fn from(config: ReadinessConfig) -> Self {
        let mut raw = RawReadiness {
            timeout_ms: config.timeout_ms,
            interval_ms: config.interval_ms,
            ..Default::default()
        };
        match config.probe {
            ReadinessProbe::Port(port) => raw.port = Some(port),
            ReadinessProbe::Http(url) => raw.http = Some(url),
            ReadinessProbe::Log(pattern) => raw.log = Some(pattern),
        }
        raw
    }
}

// ============================================================================
// Start
// ============================================================================

/// `start` 옵션
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartOptions {
    /// 표시 이름 (없으면 커맨드 basename)
    pub name: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// 명시 역할 (없으면 추론)
    pub role: Option<ProcessRole>,
    pub tags: Vec<String>,
    pub readiness: Option<ReadinessConfig>,
    /// 같은 signature 의 살아있는 프로세스가 있으면 재사용
    pub singleton: bool,
    /// `sh -c` 로 실행
    pub shell: bool,
}

/// 프로세스를 다시 띄우는 데 필요한 전체 명세
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(flatten)]
    pub options: StartOptions,
}

impl StartSpec {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            options: StartOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::Validation("command must not be empty".to_string()));
        }
        if let Some(ReadinessConfig {
            probe: ReadinessProbe::Log(pattern),
            ..
        }) = &self.options.readiness
        {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Validation(format!("invalid readiness pattern: {}", e)))?;
        }
        Ok(())
    }
}

// ============================================================================
// ManagedProcess
// ============================================================================

/// 종료 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// 종료 코드 (시그널 종료나 재연결 프로세스는 None)
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

/// 관리 중인 프로세스
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub start_time: DateTime<Utc>,
    pub role: ProcessRole,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessConfig>,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// 추론된 포트 (중복 제거, 정렬)
    pub ports: BTreeSet<u16>,
    #[serde(default)]
    pub reattached: bool,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
}

impl ManagedProcess {
    pub fn uptime(&self) -> Duration {
        let end = self.exited_at.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// 필터 문자열이 name/command/role/tags 중 하나에 포함되는지 (대소문자 무시)
    pub fn matches_filter(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.command.to_lowercase().contains(&needle)
            || self.args.join(" ").to_lowercase().contains(&needle)
            || self.role.as_str().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// `start` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    pub pid: u32,
    pub name: String,
    pub role: ProcessRole,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    pub reused: bool,
    pub ports: BTreeSet<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StartResult {
    pub(crate) fn from_process(process: &ManagedProcess, reused: bool) -> Self {
        Self {
            pid: process.pid,
            name: process.name.clone(),
            role: process.role,
            ready: process.ready,
            ready_at: process.ready_at,
            reused,
            ports: process.ports.clone(),
            last_error: process.last_error.clone(),
        }
    }
}

/// `stop` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub pid: u32,
    pub name: String,
    /// 유예 시간 안에 끝나지 않아 강제 종료했는지
    pub forced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// `restart` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartResult {
    pub old_pid: u32,
    pub new_pid: u32,
    pub name: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// `status` 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    #[serde(flatten)]
    pub process: ManagedProcess,
    pub uptime_ms: u64,
    pub restart_count: u32,
    pub error_count: usize,
    pub recent_logs: Vec<LogEntry>,
}

/// 포트 충돌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConflict {
    pub port: u16,
    pub pids: Vec<u32>,
    pub names: Vec<String>,
}

/// id 또는 이름으로 프로세스 지정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRef {
    Pid(u32),
    Name(String),
}

impl ProcessRef {
    /// 숫자면 pid, 아니면 이름
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(pid) => ProcessRef::Pid(pid),
            Err(_) => ProcessRef::Name(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRef::Pid(pid) => write!(f, "pid {}", pid),
            ProcessRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

impl From<u32> for ProcessRef {
    fn from(pid: u32) -> Self {
        ProcessRef::Pid(pid)
    }
}

impl From<&str> for ProcessRef {
    fn from(raw: &str) -> Self {
        ProcessRef::parse(raw)
    }
}
