//! Persistence - 프로세스 테이블 스냅샷
//!
//! 스냅샷은 best-effort 다. 저장/로드 실패는 경고만 남기고 프로세스
//! 관리 작업을 막지 않는다.

use crate::process::{ManagedProcess, ProcessRole, ReadinessConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use warden_foundation::{Error, JsonStore, Result};

/// 스냅샷 포맷 버전
pub const SNAPSHOT_VERSION: u32 = 1;

/// 스냅샷에 기록되는 프로세스 한 개
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub start_time: DateTime<Utc>,
    pub role: ProcessRole,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub readiness: Option<ReadinessConfig>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub ready_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ports: BTreeSet<u16>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl From<&ManagedProcess> for ProcessRecord {
    fn from(p: &ManagedProcess) -> Self {
        Self {
            pid: p.pid,
            name: p.name.clone(),
            command: p.command.clone(),
            args: p.args.clone(),
            cwd: p.cwd.clone(),
            start_time: p.start_time,
            role: p.role,
            tags: p.tags.clone(),
            readiness: p.readiness.clone(),
            ready: p.ready,
            ready_at: p.ready_at,
            ports: p.ports.clone(),
            last_error: p.last_error.clone(),
        }
    }
}

impl ProcessRecord {
    /// 재연결된 프로세스로 복원
    pub fn into_reattached(self) -> ManagedProcess {
        ManagedProcess {
            pid: self.pid,
            name: self.name,
            command: self.command,
            args: self.args,
            cwd: self.cwd,
            start_time: self.start_time,
            role: self.role,
            tags: self.tags,
            readiness: self.readiness,
            ready: self.ready,
            ready_at: self.ready_at,
            last_error: self.last_error,
            ports: self.ports,
            reattached: true,
            running: true,
            exit_code: None,
            exited_at: None,
        }
    }
}

/// 스냅샷 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
}

impl Snapshot {
    pub fn new(processes: Vec<ProcessRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            processes,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// 스냅샷 저장소
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// 저장된 것이 없으면 `Ok(None)`
    async fn load_snapshot(&self) -> Result<Option<Snapshot>>;
}

pub type SharedSnapshotStore = Arc<dyn SnapshotStore>;

/// `JsonStore` 기반 스냅샷 저장소 (`<state_dir>/processes.json`)
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    store: JsonStore,
    filename: String,
}

impl JsonSnapshotStore {
    pub fn new(store: JsonStore, filename: impl Into<String>) -> Self {
        Self {
            store,
            filename: filename.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.store.file_path(&self.filename)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let store = self.store.clone();
        let filename = self.filename.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || store.save(&filename, &snapshot))
            .await
            .map_err(|e| Error::Storage(format!("snapshot writer panicked: {}", e)))?
    }

    async fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        let store = self.store.clone();
        let filename = self.filename.clone();
        let snapshot: Option<Snapshot> =
            tokio::task::spawn_blocking(move || store.load_optional(&filename))
                .await
                .map_err(|e| Error::Storage(format!("snapshot reader panicked: {}", e)))??;

        match snapshot {
            Some(s) if s.version != SNAPSHOT_VERSION => Err(Error::Storage(format!(
                "unsupported snapshot version {}",
                s.version
            ))),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(pid: u32) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: "api".to_string(),
            command: "node".to_string(),
            args: vec!["server.js".to_string()],
            cwd: PathBuf::from("/srv"),
            start_time: Utc::now(),
            role: ProcessRole::Backend,
            tags: vec!["task".to_string()],
            readiness: Some(ReadinessConfig::port(3000)),
            ready: true,
            ready_at: None,
            ports: [3000].into_iter().collect(),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(JsonStore::new(temp.path()), "processes.json");

        assert!(store.load_snapshot().await.unwrap().is_none());

        let snapshot = Snapshot::new(vec![record(100), record(200)]);
        store.save_snapshot(&snapshot).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_wire_layout() {
        let value = serde_json::to_value(Snapshot::new(vec![record(1)])).unwrap();
        assert_eq!(value["version"], json!(1));
        let p = &value["processes"][0];
        assert_eq!(p["startTime"].is_string(), true);
        assert_eq!(p["readiness"], json!({"port": 3000}));
        assert_eq!(p["ports"], json!([3000]));
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let temp = TempDir::new().unwrap();
        let json_store = JsonStore::new(temp.path());
        json_store
            .save("processes.json", &json!({"version": 9, "processes": []}))
            .unwrap();

        let store = JsonSnapshotStore::new(json_store, "processes.json");
        assert_eq!(store.load_snapshot().await.unwrap_err().kind(), "storage");
    }
}
