//! Workspace tools - 읽기 전용 참고 정보

use crate::runtime::Runtime;
use crate::tool::{parse_input, to_payload, Tool, ToolMeta};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_foundation::Result;

const CATEGORY: &str = "workspace";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RootInput {
    root: Option<String>,
}

fn root_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "root": {"type": "string", "description": "Project directory (default: server working directory)"}
        },
        "additionalProperties": false
    })
}

pub struct ListTasksTool;

impl ListTasksTool {
    pub const NAME: &'static str = "list_tasks";
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Tasks declared in .vscode/tasks.json and package.json scripts")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        root_schema()
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: RootInput = parse_input(input)?;
        let root = runtime.resolve_root(input.root.as_deref());
        let tasks = runtime.tasks().list_tasks(&root).await?;
        Ok(json!({
            "root": root,
            "tasks": tasks,
        }))
    }
}

pub struct DetectProjectTool;

impl DetectProjectTool {
    pub const NAME: &'static str = "detect_project";
}

#[async_trait]
impl Tool for DetectProjectTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn meta(&self) -> ToolMeta {
        ToolMeta::new(Self::NAME)
            .description("Guess the project type and frameworks from manifest files and suggest tasks")
            .category(CATEGORY)
    }

    fn schema(&self) -> Value {
        root_schema()
    }

    async fn execute(&self, input: Value, runtime: &Runtime) -> Result<Value> {
        let input: RootInput = parse_input(input)?;
        let root = runtime.resolve_root(input.root.as_deref());
        let info = runtime.detector().detect(&root).await?;
        to_payload(&info)
    }
}
