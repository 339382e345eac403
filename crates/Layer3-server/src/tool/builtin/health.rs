//! Health tools

use super::{ref_schema, RefArg};
use crate::runtime::Runtime;
use crate::tool::{parse_input, to_payload, Tool, ToolMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_foundation::Result;
use warden_supervisor::ProcessRef;

const CATEGORY: &str = "health";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckInput {
    id_or_name: RefArg,
}

pub struct HealthCheckTool;

impl HealthCheckTool {
    pub const NAME: &'static str = "health_check";
}

#[async_trait]
impl Tool for HealthCheckTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Run one health check now: score 0-100, issues and sampled metrics")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "idOrName": ref_schema() },
            "required": ["idOrName"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: CheckInput = parse_input(input)?;
        let target: ProcessRef = input.id_or_name.into();
        let pid = runtime.supervisor().status(&target).await?.process.pid;
        let result = runtime.monitor().perform_health_check(pid).await?;
        to_payload(&result)
    }
}

pub struct HealthSummaryTool;

impl HealthSummaryTool {
    pub const NAME: &'static str = "health_summary";
}

#[async_trait]
impl Tool for HealthSummaryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Aggregate of the latest health check per process and recent high/critical issues")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, _input: Value, runtime: &Runtime) -> Result<Value> {
        let summary = runtime.monitor().summary().await;
        to_payload(&summary)
    }
}
