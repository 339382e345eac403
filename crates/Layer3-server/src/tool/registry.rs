//! Tool Registry - 툴 등록 및 호출
//!
//! ```ignore
//! let registry = ToolRegistry::with_builtins();
//! let outcome = registry.call("list_processes", json!({}), &runtime).await;
//! ```

use super::{builtin, schema, Tool, ToolOutcome};
use crate::runtime::Runtime;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use warden_foundation::Error;

/// 툴 레지스트리 (이름순 정렬 유지)
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// 기본 툴을 모두 등록한 레지스트리
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_all(builtin::all_tools());
        registry
    }

    /// 같은 이름이 있으면 교체
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replaced existing tool");
        }
    }

    pub fn register_all(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `tools/list` 항목
    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let meta = tool.meta();
                json!({
                    "name": meta.name,
                    "description": meta.description,
                    "inputSchema": tool.schema(),
                })
            })
            .collect()
    }

    /// 검사 후 실행. 모든 실패는 `isError` 결과로 돌아온다
    pub async fn call(&self, name: &str, arguments: Value, runtime: &Runtime) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            return ToolOutcome::failure(&Error::not_found(format!("tool '{}'", name)));
        };

        // 인자 없음은 빈 객체로 취급
        let input = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        if let Err(e) = schema::validate(&tool.schema(), &input) {
            debug!(tool = name, error = %e, "Rejected tool input");
            return ToolOutcome::failure(&e);
        }

        let started = Instant::now();
        let outcome = match tool.execute(input, runtime).await {
            Ok(payload) => ToolOutcome::success(payload),
            Err(e) => {
                debug!(tool = name, kind = e.kind(), error = %e, "Tool failed");
                ToolOutcome::failure(&e)
            }
        };
        debug!(
            tool = name,
            is_error = outcome.is_error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
