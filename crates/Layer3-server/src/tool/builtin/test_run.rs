//! Test run tools

use super::{readiness_schema, string_array};
use crate::runtime::Runtime;
use crate::tool::{parse_input, to_payload, Tool, ToolMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_foundation::Result;
use warden_supervisor::TestRunConfig;

const CATEGORY: &str = "test_run";

fn component_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "command": {"type": "string"},
            "args": string_array(),
            "cwd": {"type": "string"},
            "name": {"type": "string"},
            "env": {"type": "object"},
            "readiness": readiness_schema(),
            "singleton": {"type": "boolean"},
            "shell": {"type": "boolean"}
        },
        "required": ["command"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunIdInput {
    run_id: String,
}

fn run_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "runId": {"type": "string"} },
        "required": ["runId"],
        "additionalProperties": false
    })
}

// ============================================================================
// start_test_run
// ============================================================================

pub struct StartTestRunTool;

impl StartTestRunTool {
    pub const NAME: &'static str = "start_test_run";
}

#[async_trait]
impl Tool for StartTestRunTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description(
                "Start backend, then frontend (each waiting for readiness), then the test process. \
                 Returns once the test process is running; poll test_run_status for the outcome.",
            )
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "runId": {"type": "string"},
                "backend": component_schema(),
                "frontend": component_schema(),
                "test": component_schema(),
                "autoStop": {"type": "boolean", "description": "Stop backend/frontend when the test exits"},
                "keepBackends": {"type": "boolean", "description": "Keep backend/frontend after success and on abort"}
            },
            "required": ["test"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let config: TestRunConfig = parse_input(input)?;
        let state = runtime.test_runs().start_run(config).await?;
        to_payload(&state)
    }
}

// ============================================================================
// abort_test_run / test_run_status / list_test_runs
// ============================================================================

pub struct AbortTestRunTool;

impl AbortTestRunTool {
    pub const NAME: &'static str = "abort_test_run";
}

#[async_trait]
impl Tool for AbortTestRunTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Abort a test run and stop its processes. Aborting a finished run changes nothing.")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        run_id_schema()
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: RunIdInput = parse_input(input)?;
        let state = runtime.test_runs().abort_run(&input.run_id).await?;
        to_payload(&state)
    }
}

pub struct TestRunStatusTool;

impl TestRunStatusTool {
    pub const NAME: &'static str = "test_run_status";
}

#[async_trait]
impl Tool for TestRunStatusTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Current state of a test run including pids, exit code and its log")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        run_id_schema()
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: RunIdInput = parse_input(input)?;
        let state = runtime.test_runs().status(&input.run_id).await?;
        to_payload(&state)
    }
}

pub struct ListTestRunsTool;

impl ListTestRunsTool {
    pub const NAME: &'static str = "list_test_runs";
}

#[async_trait]
impl Tool for ListTestRunsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("All test runs of this session, oldest first")
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
        let runs = runtime.test_runs().list().await;
        Ok(json!({
            "count": runs.len(),
            "runs": runs,
        }))
    }
}
