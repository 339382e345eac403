//! Tool - 프로토콜에 노출되는 명명된 연산
//!
//! 각 공개 연산은 툴 하나로 노출된다. 입력은 선언한 스키마로 먼저 검사하고
//! 통과한 경우에만 `execute` 가 호출된다.
//!
//! - `registry`: 등록/조회/호출
//! - `schema`: 입력 검사
//! - `builtin`: 기본 툴 묶음

pub mod builtin;
pub mod registry;
pub mod schema;

pub use registry::ToolRegistry;

use crate::runtime::Runtime;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use warden_foundation::{Error, Result};

/// 툴 메타데이터
#[derive(Debug, Clone)]
pub struct ToolMeta {
    /// 고유 이름
    pub name: String,
    pub description: String,
    /// process, health, recovery, test_run, workspace
    pub category: String,
}

impl ToolMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: "general".to_string(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn category(mut self, cat: impl Into<String>) -> Self {
        self.category = cat.into();
        self
    }
}

/// 툴 인터페이스
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn meta(&self) -> ToolMeta;

    /// 입력 JSON 스키마
    fn schema(&self) -> Value;

    /// 검사를 통과한 입력으로 실행
    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value>;
}

/// `tools/call` 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub payload: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    /// `{error: {kind, message}}`
    pub fn failure(error: &Error) -> Self {
        Self {
            payload: json!({
                "error": {
                    "kind": error.kind(),
                    "message": error.to_string(),
                }
            }),
            is_error: true,
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.payload.get("error")?.get("kind")?.as_str()
    }

    /// 프로토콜 응답 형태
    pub fn to_call_result(&self) -> Value {
        let text = serde_json::to_string_pretty(&self.payload).unwrap_or_default();
        json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": self.payload,
            "isError": self.is_error,
        })
    }
}

/// 입력 파싱 (스키마가 못 잡는 형식 오류도 validation 으로)
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| Error::Validation(format!("Invalid input: {}", e)))
}

pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
