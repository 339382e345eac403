//! Process Table - 관리 대상 프로세스의 소유 테이블
//!
//! supervisor 만 이 테이블을 변경한다. 다른 컴포넌트는 supervisor 의
//! 조회 메서드를 통해 복사본을 받는다.

use super::{
    ExitInfo, ManagedProcess, PortConflict, ProcessRef, ProcessRole, StartOptions, StartSpec,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::Path;
use tokio::sync::watch;

/// singleton 판정용 signature 해시 (`role|command|cwd|args`)
pub fn signature(role: ProcessRole, command: &str, cwd: &Path, args: &[String]) -> u64 {
    let key = format!(
        "{}|{}|{}|{}",
        role.as_str(),
        command,
        cwd.display(),
        args.join(" ")
    );
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// 테이블 엔트리
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub info: ManagedProcess,
    pub signature: u64,
    /// 재시작에 필요한 원래 env/shell
    pub env: HashMap<String, String>,
    pub shell: bool,
    pub singleton: bool,
    /// 종료 알림 (`Some` 이 되면 종료됨)
    pub exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessEntry {
    pub fn pid(&self) -> u32 {
        self.info.pid
    }

    pub fn is_running(&self) -> bool {
        self.info.running
    }

    /// 같은 프로세스를 다시 띄우기 위한 명세
    pub fn to_spec(&self) -> StartSpec {
        let info = &self.info;
        StartSpec {
            command: info.command.clone(),
            args: info.args.clone(),
            options: StartOptions {
                name: Some(info.name.clone()),
                cwd: Some(info.cwd.clone()),
                env: self.env.clone(),
                role: Some(info.role),
                tags: info.tags.clone(),
                readiness: info.readiness.clone(),
                singleton: self.singleton,
                shell: self.shell,
            },
        }
    }
}

/// pid 기준 프로세스 테이블
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: HashMap<u32, ProcessEntry>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ProcessEntry) -> Option<ProcessEntry> {
        self.entries.insert(entry.pid(), entry)
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessEntry> {
        self.entries.get(&pid)
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut ProcessEntry> {
        self.entries.get_mut(&pid)
    }

    pub fn remove(&mut self, pid: u32) -> Option<ProcessEntry> {
        self.entries.remove(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.entries.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.values()
    }

    /// pid 우선, 다음 정확한 이름 (가장 최근 시작한 것)
    pub fn resolve(&self, target: &ProcessRef) -> Option<&ProcessEntry> {
        match target {
            ProcessRef::Pid(pid) => self.entries.get(pid).or_else(|| {
                // 숫자 이름도 허용
                self.by_name(&pid.to_string())
            }),
            ProcessRef::Name(name) => self.by_name(name),
        }
    }

    fn by_name(&self, name: &str) -> Option<&ProcessEntry> {
        self.entries
            .values()
            .filter(|e| e.info.name == name)
            .max_by(|a, b| {
                // 실행 중인 것을 우선
                (a.info.running, a.info.start_time).cmp(&(b.info.running, b.info.start_time))
            })
    }

    /// 같은 signature 의 살아있는 엔트리
    pub fn find_live_by_signature(&self, signature: u64) -> Option<&ProcessEntry> {
        self.entries
            .values()
            .find(|e| e.signature == signature && e.info.running)
    }

    /// 해당 포트를 주장하는 엔트리 (pid 순)
    pub fn by_port(&self, port: u16) -> Vec<&ProcessEntry> {
        let mut found: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.info.ports.contains(&port))
            .collect();
        found.sort_by_key(|e| e.pid());
        found
    }

    /// 둘 이상의 pid 가 주장하는 포트
    pub fn port_conflicts(&self) -> Vec<PortConflict> {
        let mut claims: BTreeMap<u16, Vec<&ProcessEntry>> = BTreeMap::new();
        for entry in self.entries.values().filter(|e| e.info.running) {
            for port in &entry.info.ports {
                claims.entry(*port).or_default().push(entry);
            }
        }

        claims
            .into_iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(port, mut owners)| {
                owners.sort_by_key(|e| e.pid());
                PortConflict {
                    port,
                    pids: owners.iter().map(|e| e.pid()).collect(),
                    names: owners.iter().map(|e| e.info.name.clone()).collect(),
                }
            })
            .collect()
    }

    /// 스냅샷 대상 (실행 중인 프로세스)
    pub fn running(&self) -> Vec<ManagedProcess> {
        let mut running: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.info.running)
            .map(|e| e.info.clone())
            .collect();
        running.sort_by_key(|p| p.start_time);
        running
    }
}
