//! Workspace - 태스크 목록과 프로젝트 감지
//!
//! 둘 다 읽기 전용이며 결과는 참고용이다. 호출자가 골라서 `start_process` 에 넘긴다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use warden_foundation::{Error, Result};

/// 실행 가능한 태스크 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub label: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub shell: bool,
}

impl TaskDefinition {
    fn new(label: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            shell: false,
        }
    }
}

/// 감지 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    /// node, rust, python, go, ruby, unknown
    #[serde(rename = "type")]
    pub project_type: String,
    pub frameworks: Vec<String>,
    pub suggested_tasks: Vec<TaskDefinition>,
}

#[async_trait]
pub trait TaskReader: Send + Sync {
    async fn list_tasks(&self, root: &Path) -> Result<Vec<TaskDefinition>>;
}

#[async_trait]
pub trait ProjectDetector: Send + Sync {
    async fn detect(&self, root: &Path) -> Result<ProjectInfo>;
}

// ============================================================================
// FsTaskReader
// ============================================================================

/// `.vscode/tasks.json` 과 `package.json` scripts 를 읽는다
#[derive(Debug, Default, Clone)]
pub struct FsTaskReader;

#[async_trait]
impl TaskReader for FsTaskReader {
    async fn list_tasks(&self, root: &Path) -> Result<Vec<TaskDefinition>> {
        ensure_dir(root).await?;
        let mut tasks = Vec::new();

        if let Some(doc) = read_json(&root.join(".vscode").join("tasks.json")).await {
            tasks.extend(vscode_tasks(&doc, root));
        }
        if let Some(package) = read_json(&root.join("package.json")).await {
            tasks.extend(npm_scripts(&package));
        }

        debug!(root = %root.display(), count = tasks.len(), "Listed workspace tasks");
        Ok(tasks)
    }
}

fn vscode_tasks(doc: &Value, root: &Path) -> Vec<TaskDefinition> {
    let Some(entries) = doc.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|task| {
            let command = task.get("command")?.as_str()?.to_string();
            let label = task
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or(command.as_str())
                .to_string();
            let args = task
                .get("args")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default();
            let cwd = task
                .pointer("/options/cwd")
                .and_then(Value::as_str)
                .map(|c| PathBuf::from(c.replace("${workspaceFolder}", &root.to_string_lossy())));
            let shell = task.get("type").and_then(Value::as_str) == Some("shell");
            Some(TaskDefinition {
                label,
                command,
                args,
                cwd,
                shell,
            })
        })
        .collect()
}

fn npm_scripts(package: &Value) -> Vec<TaskDefinition> {
    let Some(scripts) = package.get("scripts").and_then(Value::as_object) else {
        return Vec::new();
    };
    scripts
        .keys()
        .map(|name| TaskDefinition::new(format!("npm: {}", name), "npm", &["run", name.as_str()]))
        .collect()
}

// ============================================================================
// FsProjectDetector
// ============================================================================

/// 매니페스트 파일 기반 감지
#[derive(Debug, Default, Clone)]
pub struct FsProjectDetector;

/// (의존성 이름, 프레임워크 이름)
const NODE_FRAMEWORKS: &[(&str, &str)] = &[
    ("next", "next"),
    ("react", "react"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("nuxt", "nuxt"),
    ("@angular/core", "angular"),
    ("vite", "vite"),
    ("express", "express"),
    ("fastify", "fastify"),
    ("@nestjs/core", "nest"),
    ("jest", "jest"),
    ("vitest", "vitest"),
    ("mocha", "mocha"),
    ("@playwright/test", "playwright"),
    ("cypress", "cypress"),
];

const PYTHON_FRAMEWORKS: &[&str] = &["django", "flask", "fastapi", "uvicorn", "pytest"];

#[async_trait]
impl ProjectDetector for FsProjectDetector {
    async fn detect(&self, root: &Path) -> Result<ProjectInfo> {
        ensure_dir(root).await?;

        if let Some(package) = read_json(&root.join("package.json")).await {
            return Ok(detect_node(&package));
        }
        if root.join("Cargo.toml").exists() {
            return Ok(ProjectInfo {
                project_type: "rust".to_string(),
                frameworks: Vec::new(),
                suggested_tasks: vec![
                    TaskDefinition::new("cargo: run", "cargo", &["run"]),
                    TaskDefinition::new("cargo: test", "cargo", &["test"]),
                ],
            });
        }

        let python_manifests = ["pyproject.toml", "requirements.txt", "setup.py"];
        let mut python_text = String::new();
        for manifest in python_manifests {
            if let Ok(text) = tokio::fs::read_to_string(root.join(manifest)).await {
                python_text.push_str(&text.to_lowercase());
                python_text.push('\n');
            }
        }
        if !python_text.is_empty() || root.join("manage.py").exists() {
            return Ok(detect_python(root, &python_text));
        }

        if root.join("go.mod").exists() {
            return Ok(ProjectInfo {
                project_type: "go".to_string(),
                frameworks: Vec::new(),
                suggested_tasks: vec![
                    TaskDefinition::new("go: run", "go", &["run", "."]),
                    TaskDefinition::new("go: test", "go", &["test", "./..."]),
                ],
            });
        }
        if let Ok(gemfile) = tokio::fs::read_to_string(root.join("Gemfile")).await {
            let rails = gemfile.contains("rails");
            return Ok(ProjectInfo {
                project_type: "ruby".to_string(),
                frameworks: if rails { vec!["rails".to_string()] } else { Vec::new() },
                suggested_tasks: if rails {
                    vec![TaskDefinition::new("rails: server", "bin/rails", &["server"])]
                } else {
                    Vec::new()
                },
            });
        }

        Ok(ProjectInfo {
            project_type: "unknown".to_string(),
            frameworks: Vec::new(),
            suggested_tasks: Vec::new(),
        })
    }
}

fn detect_node(package: &Value) -> ProjectInfo {
    let mut deps = BTreeSet::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(entries) = package.get(section).and_then(Value::as_object) {
            deps.extend(entries.keys().cloned());
        }
    }
    let frameworks = NODE_FRAMEWORKS
        .iter()
        .filter(|(dep, _)| deps.contains(*dep))
        .map(|(_, name)| name.to_string())
        .collect();

    // dev/start/test/build 만 제안
    let scripts = package.get("scripts").and_then(Value::as_object);
    let suggested_tasks = ["dev", "start", "test", "build"]
        .iter()
        .filter(|s| scripts.is_some_and(|m| m.contains_key(**s)))
        .map(|s| TaskDefinition::new(format!("npm: {}", s), "npm", &["run", *s]))
        .collect();

    ProjectInfo {
        project_type: "node".to_string(),
        frameworks,
        suggested_tasks,
    }
}

fn detect_python(root: &Path, manifests: &str) -> ProjectInfo {
    let frameworks: Vec<String> = PYTHON_FRAMEWORKS
        .iter()
        .filter(|f| manifests.contains(*f))
        .map(|f| f.to_string())
        .collect();

    let mut suggested_tasks = Vec::new();
    if root.join("manage.py").exists() {
        suggested_tasks.push(TaskDefinition::new(
            "django: runserver",
            "python",
            &["manage.py", "runserver"],
        ));
    }
    if frameworks.iter().any(|f| f == "pytest") {
        suggested_tasks.push(TaskDefinition::new("pytest", "pytest", &[]));
    }

    ProjectInfo {
        project_type: "python".to_string(),
        frameworks,
        suggested_tasks,
    }
}

// ============================================================================
// helpers
// ============================================================================

async fn ensure_dir(root: &Path) -> Result<()> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::Validation(format!(
            "{} is not a directory",
            root.display()
        ))),
        Err(_) => Err(Error::not_found(format!("directory {}", root.display()))),
    }
}

/// 없으면 None, 깨졌으면 경고 후 None. `//` 주석 줄은 건너뛴다
async fn read_json(path: &Path) -> Option<Value> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    let stripped: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");
    match serde_json::from_str(&stripped) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed JSON file");
            None
        }
    }
}
