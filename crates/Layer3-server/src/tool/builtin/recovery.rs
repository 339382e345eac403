//! Recovery tools

use super::{ref_schema, RefArg};
use crate::runtime::Runtime;
use crate::tool::{parse_input, to_payload, Tool, ToolMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_foundation::{Error, Result};
use warden_supervisor::{ProcessRef, RecoveryStrategy};

const CATEGORY: &str = "recovery";

fn strategy_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "enabled": {"type": "boolean"},
            "conditions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": [
                                "health_score", "cpu", "memory", "memory_mb", "error_count",
                                "restart_count", "uptime", "issue_count", "unresponsive",
                                "zombie", "response_time"
                            ]
                        },
                        "operator": {"type": "string", "enum": ["gt", "lt", "eq", "gte", "lte"]},
                        "value": {"type": "number"},
                        "duration": {"type": "integer", "minimum": 0, "description": "Must hold continuously for this many ms"}
                    },
                    "required": ["type", "operator", "value"],
                    "additionalProperties": false
                }
            },
            "actions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {"type": "string", "enum": ["restart", "kill-restart", "notify", "cleanup", "custom"]},
                        "delay": {"type": "integer", "minimum": 0},
                        "params": {"type": "object"}
                    },
                    "required": ["type"],
                    "additionalProperties": false
                }
            },
            "maxAttempts": {"type": "integer", "minimum": 1},
            "cooldownPeriod": {"type": "integer", "minimum": 0}
        },
        "required": ["name", "conditions", "actions", "maxAttempts", "cooldownPeriod"],
        "additionalProperties": false
    })
}

// ============================================================================
// configure_recovery
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureInput {
    name: String,
    strategies: Vec<RecoveryStrategy>,
}

pub struct ConfigureRecoveryTool;

impl ConfigureRecoveryTool {
    pub const NAME: &'static str = "configure_recovery";
}

#[async_trait]
impl Tool for ConfigureRecoveryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description(
                "Replace the recovery strategies for a process name. An empty list restores the defaults.",
            )
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Process name"},
                "strategies": {"type": "array", "items": strategy_schema()}
            },
            "required": ["name", "strategies"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: ConfigureInput = parse_input(input)?;
        runtime
            .recovery()
            .configure(&input.name, input.strategies)
            .await?;
        let active = runtime.recovery().strategies(&input.name).await;
        Ok(json!({
            "name": input.name,
            "strategies": active,
        }))
    }
}

// ============================================================================
// recovery_stats
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatsInput {
    id_or_name: Option<RefArg>,
}

pub struct RecoveryStatsTool;

impl RecoveryStatsTool {
    pub const NAME: &'static str = "recovery_stats";
}

#[async_trait]
impl Tool for RecoveryStatsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description(
                "Recovery attempt statistics. With idOrName, also that process's attempt history (newest first).",
            )
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "idOrName": ref_schema() },
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: StatsInput = parse_input(input)?;
        let mut payload = to_payload(&runtime.recovery().stats().await)?;

        if let Some(arg) = input.id_or_name {
            // 기록은 이름 기준이라 교체된 프로세스의 이름도 그대로 조회된다
            let name = match ProcessRef::from(arg) {
                ProcessRef::Pid(pid) => runtime
                    .supervisor()
                    .process(pid)
                    .await
                    .map(|p| p.name)
                    .ok_or_else(|| Error::not_found(format!("process pid {}", pid)))?,
                ProcessRef::Name(name) => name,
            };
            let attempts = runtime.recovery().attempts(&name).await;
            payload["name"] = json!(name);
            payload["history"] = to_payload(&attempts)?;
            payload["strategies"] = to_payload(&runtime.recovery().strategies(&name).await)?;
        }
        Ok(payload)
    }
}
