//! Process tools - supervisor 연산

use super::{readiness_schema, ref_schema, string_array, RefArg};
use crate::runtime::Runtime;
use crate::tool::{parse_input, to_payload, Tool, ToolMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_foundation::Result;
use warden_supervisor::{ProcessRef, StartSpec};

const CATEGORY: &str = "process";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInput {
    id_or_name: RefArg,
    #[serde(default)]
    force: bool,
}

fn target_schema(with_force: bool) -> Value {
    let mut properties = json!({ "idOrName": ref_schema() });
    if with_force {
        properties["force"] = json!({
            "type": "boolean",
            "description": "Skip the graceful window and kill immediately"
        });
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["idOrName"],
        "additionalProperties": false
    })
}

// ============================================================================
// start_process
// ============================================================================

pub struct StartProcessTool;

impl StartProcessTool {
    pub const NAME: &'static str = "start_process";
}

#[async_trait]
impl Tool for StartProcessTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description(
                "Start a managed process. With singleton=true an identical live process is reused. \
                 Readiness failures are reported as ready=false, not as errors.",
            )
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "args": string_array(),
                "name": {"type": "string"},
                "cwd": {"type": "string"},
                "env": {"type": "object"},
                "role": {"type": "string", "enum": ["frontend", "backend", "test", "e2e", "utility"]},
                "tags": string_array(),
                "readiness": readiness_schema(),
                "singleton": {"type": "boolean"},
                "shell": {"type": "boolean", "description": "Run through sh -c"}
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let spec: StartSpec = parse_input(input)?;
        let result = runtime.supervisor().start(spec).await?;
        to_payload(&result)
    }
}

// ============================================================================
// stop_process / restart_process
// ============================================================================

pub struct StopProcessTool;

impl StopProcessTool {
    pub const NAME: &'static str = "stop_process";
}

#[async_trait]
impl Tool for StopProcessTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Stop a managed process and its children (terminate, then kill after the grace window)")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        target_schema(true)
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: TargetInput = parse_input(input)?;
        let result = runtime
            .supervisor()
            .stop(input.id_or_name.into(), input.force)
            .await?;
        to_payload(&result)
    }
}

pub struct RestartProcessTool;

impl RestartProcessTool {
    pub const NAME: &'static str = "restart_process";
}

#[async_trait]
impl Tool for RestartProcessTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Stop a managed process and start it again with the same command, options and readiness")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        target_schema(true)
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: TargetInput = parse_input(input)?;
        let result = runtime
            .supervisor()
            .restart(input.id_or_name.into(), input.force)
            .await?;
        to_payload(&result)
    }
}

// ============================================================================
// list_processes / process_status
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListInput {
    include_system: bool,
    filter: Option<String>,
}

pub struct ListProcessesTool;

impl ListProcessesTool {
    pub const NAME: &'static str = "list_processes";
}

#[async_trait]
impl Tool for ListProcessesTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("List managed processes, optionally filtered by name, command, role or tag")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "includeSystem": {"type": "boolean"},
                "filter": {"type": "string"}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: ListInput = parse_input(input)?;
        let processes = runtime
            .supervisor()
            .list(input.include_system, input.filter.as_deref())
            .await;
        Ok(json!({
            "count": processes.len(),
            "processes": processes,
        }))
    }
}

pub struct ProcessStatusTool;

impl ProcessStatusTool {
    pub const NAME: &'static str = "process_status";
}

#[async_trait]
impl Tool for ProcessStatusTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Detailed status of one process: uptime, ports, readiness, restart and error counts, recent logs")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        target_schema(false)
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: TargetInput = parse_input(input)?;
        let status = runtime.supervisor().status(&input.id_or_name.into()).await?;
        to_payload(&status)
    }
}

// ============================================================================
// find_by_port / detect_port_conflicts
// ============================================================================

#[derive(Debug, Deserialize)]
struct PortInput {
    port: u16,
}

pub struct FindByPortTool;

impl FindByPortTool {
    pub const NAME: &'static str = "find_by_port";
}

#[async_trait]
impl Tool for FindByPortTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Find managed processes believed to use a port (heuristic, not a kernel query)")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "port": {"type": "integer", "minimum": 1}
            },
            "required": ["port"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: PortInput = parse_input(input)?;
        let processes = runtime.supervisor().find_by_port(input.port).await;
        Ok(json!({
            "port": input.port,
            "processes": processes,
        }))
    }
}

pub struct DetectPortConflictsTool;

impl DetectPortConflictsTool {
    pub const NAME: &'static str = "detect_port_conflicts";
}

#[async_trait]
impl Tool for DetectPortConflictsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Ports claimed by more than one running managed process")
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
        let conflicts = runtime.supervisor().detect_port_conflicts().await;
        Ok(json!({ "conflicts": conflicts }))
    }
}

// ============================================================================
// get_logs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsInput {
    id_or_name: RefArg,
    #[serde(default)]
    tail: Option<usize>,
    #[serde(default)]
    errors_only: bool,
}

pub struct GetLogsTool;

impl GetLogsTool {
    pub const NAME: &'static str = "get_logs";
}

#[async_trait]
impl Tool for GetLogsTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Retained output lines of a process, still available for a while after it exits")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "idOrName": ref_schema(),
                "tail": {"type": "integer", "minimum": 1},
                "errorsOnly": {"type": "boolean"}
            },
            "required": ["idOrName"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: LogsInput = parse_input(input)?;
        let target: ProcessRef = input.id_or_name.into();
        let logs = runtime
            .supervisor()
            .logs(&target, input.tail, input.errors_only)
            .await?;
        Ok(json!({
            "count": logs.len(),
            "logs": logs,
        }))
    }
}
