//! Error types for warden
//!
//! 모든 에러를 중앙에서 관리. 툴 응답은 `kind()`로 안정적인 분류 문자열을 함께 전달

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// warden 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 프로세스 관리
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailure { command: String, message: String },

    #[error("Readiness timeout: {0}")]
    ReadinessTimeout(String),

    #[error("Process exited before becoming ready: {0}")]
    ReadinessProcessExited(String),

    #[error("Failed to stop process {pid}: {message}")]
    StopFailure { pid: u32, message: String },

    // ========================================================================
    // 복구 관련
    // ========================================================================
    #[error("Recovery action '{action}' failed: {message}")]
    RecoveryActionFailure { action: String, message: String },

    // ========================================================================
    // 입력 검증
    // ========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 툴 에러 페이로드에 쓰이는 분류 문자열
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::SpawnFailure { .. } => "spawn_failure",
            Error::ReadinessTimeout(_) => "readiness_timeout",
            Error::ReadinessProcessExited(_) => "readiness_process_exited",
            Error::StopFailure { .. } => "stop_failure",
            Error::RecoveryActionFailure { .. } => "recovery_action_failure",
            Error::Validation(_) => "validation",
            Error::Config(_) => "config",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }

    /// readiness 실패 여부 (`start`는 이 에러를 호출자에게 전달하지 않음)
    pub fn is_readiness_failure(&self) -> bool {
        matches!(
            self,
            Error::ReadinessTimeout(_) | Error::ReadinessProcessExited(_)
        )
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn spawn_failure(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SpawnFailure {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn stop_failure(pid: u32, message: impl Into<String>) -> Self {
        Error::StopFailure {
            pid,
            message: message.into(),
        }
    }

    pub fn recovery_action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RecoveryActionFailure {
            action: action.into(),
            message: message.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
