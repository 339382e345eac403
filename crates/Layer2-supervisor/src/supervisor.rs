//! Process Supervisor
//!
//! 관리 대상 프로세스 테이블의 유일한 소유자. spawn/stop/restart, singleton
//! 재사용, 포트 추적, 스냅샷 저장과 재연결을 담당하고 lifecycle 이벤트를
//! 발행한다.
//!
//! ## 종료 의도 구분
//!
//! - 전역: `Lifecycle` (`Running` / `ShuttingDown`)
//! - 개별: `shutting_down` pid 집합 (stop 진행 중)
//!
//! 둘 중 하나라도 해당하면 종료는 "의도된 것"이므로 crash 로 취급하지 않는다.

use crate::events::{LifecycleEvent, UnregisterReason};
use crate::persist::{ProcessRecord, SharedSnapshotStore, Snapshot};
use crate::process::os::{self, Signal};
use crate::process::ports::{ports_from_command, ports_from_log_line};
use crate::process::role::infer_role;
use crate::process::table::signature;
use crate::process::{
    ExitInfo, LogEntry, ManagedProcess, PortConflict, ProcessEntry, ProcessLogManager,
    ProcessRef, ProcessStatus, ProcessTable, RestartResult, StartResult, StartSpec, StopResult,
};
use crate::readiness::{await_readiness, ProbeContext};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_foundation::{
    labels, DebouncedAction, Debouncer, Error, EventBus, Lifecycle, Result, SharedSink,
    TelemetryLevel, TracingSink, WardenConfig,
};

/// SIGKILL 후 종료 확인 대기
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// 재연결 프로세스 생존 확인 주기
const LIVENESS_POLL: Duration = Duration::from_secs(1);

/// `status` 에 포함되는 최근 로그 수
const STATUS_LOG_TAIL: usize = 20;

/// 프로세스 supervisor
pub struct Supervisor {
    config: WardenConfig,
    table: Arc<RwLock<ProcessTable>>,
    logs: ProcessLogManager,
    /// stop 진행 중인 pid
    shutting_down: RwLock<HashSet<u32>>,
    /// 이름별 재시작 횟수
    restart_counts: RwLock<HashMap<String, u32>>,
    events: Arc<EventBus<LifecycleEvent>>,
    lifecycle: Lifecycle,
    telemetry: SharedSink,
    snapshot_store: Option<SharedSnapshotStore>,
    persister: Option<Debouncer>,
    /// pid별 종료/생존 감시 태스크
    watchers: Mutex<HashMap<u32, JoinHandle<()>>>,
    /// 지연 purge 등 기타 백그라운드 태스크
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(config: WardenConfig) -> Self {
        let logs = ProcessLogManager::new(config.log_ring_size);
        Self {
            config,
            table: Arc::new(RwLock::new(ProcessTable::new())),
            logs,
            shutting_down: RwLock::new(HashSet::new()),
            restart_counts: RwLock::new(HashMap::new()),
            events: Arc::new(EventBus::new()),
            lifecycle: Lifecycle::new(),
            telemetry: TracingSink::shared(),
            snapshot_store: None,
            persister: None,
            watchers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus<LifecycleEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_telemetry(mut self, telemetry: SharedSink) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// 스냅샷 저장소 연결 (debounce 태스크를 spawn 하므로 런타임 안에서 호출)
    pub fn with_snapshot_store(mut self, store: SharedSnapshotStore) -> Self {
        let table = self.table.clone();
        let writer = store.clone();
        let action: DebouncedAction = Arc::new(move || {
            let table = table.clone();
            let writer = writer.clone();
            Box::pin(async move {
                let records: Vec<ProcessRecord> = table
                    .read()
                    .await
                    .running()
                    .iter()
                    .map(ProcessRecord::from)
                    .collect();
                let count = records.len();
                match writer.save_snapshot(&Snapshot::new(records)).await {
                    Ok(()) => debug!(processes = count, "Saved process snapshot"),
                    Err(e) => warn!(error = %e, "Failed to save process snapshot"),
                }
            })
        });

        self.persister = Some(Debouncer::new(self.config.persist_debounce(), action));
        self.snapshot_store = Some(store);
        self
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus<LifecycleEvent>> {
        &self.events
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn log_manager(&self) -> &ProcessLogManager {
        &self.logs
    }

    // ========================================================================
    // start
    // ========================================================================

    /// 프로세스 시작
    ///
    /// readiness 실패는 에러가 아니다. 결과의 `ready=false` 와 `last_error` 로 전달된다.
    pub async fn start(self: &Arc<Self>, spec: StartSpec) -> Result<StartResult> {
        spec.validate()?;
        if self.lifecycle.is_shutting_down() {
            return Err(Error::Internal("supervisor is shutting down".to_string()));
        }

        let StartSpec {
            command,
            args,
            options,
        } = spec;

        let role = options
            .role
            .unwrap_or_else(|| infer_role(options.name.as_deref(), &command, &args));
        let cwd = match options.cwd.clone() {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| default_name(&command));
        let sig = signature(role, &command, &cwd, &args);

        // singleton 확인부터 등록까지 테이블 락을 유지
        let mut table = self.table.write().await;

        if options.singleton {
            if let Some(existing) = table.find_live_by_signature(sig) {
                debug!(pid = existing.pid(), name = %existing.info.name, "Reusing singleton process");
                return Ok(StartResult::from_process(&existing.info, true));
            }
        }

        let mut cmd = build_command(&command, &args, options.shell);
        cmd.current_dir(&cwd)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failure(&command, e.to_string()))?;
        let pid = child.id().ok_or_else(|| {
            Error::spawn_failure(&command, "process exited before a pid was assigned")
        })?;

        let mut ports = ports_from_command(
            &command,
            &args,
            options.env.get("PORT").map(String::as_str),
        );
        if let Some(port) = options.readiness.as_ref().and_then(|r| r.port_hint()) {
            ports.insert(port);
        }

        let now = Utc::now();
        let has_probe = options.readiness.is_some();
        let process = ManagedProcess {
            pid,
            name: name.clone(),
            command: command.clone(),
            args: args.clone(),
            cwd,
            start_time: now,
            role,
            tags: options.tags.clone(),
            readiness: options.readiness.clone(),
            ready: !has_probe,
            ready_at: (!has_probe).then_some(now),
            last_error: None,
            ports,
            reattached: false,
            running: true,
            exit_code: None,
            exited_at: None,
        };

        let (exit_tx, exit_rx) = watch::channel(None);
        let log_rx = self
            .logs
            .create_buffer(pid, Some(&format!("Starting: {} {}", command, args.join(" "))))
            .await;

        table.insert(ProcessEntry {
            info: process.clone(),
            signature: sig,
            env: options.env.clone(),
            shell: options.shell,
            singleton: options.singleton,
            exit_rx: exit_rx.clone(),
        });
        drop(table);

        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(pid, stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(pid, stderr, true);
        }
        self.spawn_exit_watcher(pid, child, exit_tx).await;

        info!(pid, name = %name, role = %role, "Started process");
        self.telemetry.log(
            TelemetryLevel::Info,
            "process",
            &format!("started {}", name),
            Some(&json!({ "command": command, "args": args, "role": role.as_str() })),
            Some(pid),
        );
        self.telemetry.record_metric(
            "process.spawned",
            1.0,
            Some(&labels([("role", role.as_str().to_string())])),
        );
        self.events
            .publish(LifecycleEvent::ProcessRegistered {
                pid,
                name: name.clone(),
                role,
                reattached: false,
            })
            .await;
        self.persist();

        let Some(readiness) = options.readiness else {
            return Ok(StartResult::from_process(&process, false));
        };

        let outcome = await_readiness(
            &readiness,
            ProbeContext {
                pid,
                exit_rx,
                logs: log_rx,
            },
        )
        .await;

        let process = self.record_readiness(process, outcome).await;
        Ok(StartResult::from_process(&process, false))
    }

    async fn record_readiness(
        &self,
        mut process: ManagedProcess,
        outcome: Result<Duration>,
    ) -> ManagedProcess {
        let pid = process.pid;
        let error = match outcome {
            Ok(elapsed) => {
                process.ready = true;
                process.ready_at = Some(Utc::now());
                self.telemetry.record_metric(
                    "readiness.duration_ms",
                    elapsed.as_millis() as f64,
                    Some(&labels([("name", process.name.clone())])),
                );
                debug!(pid, elapsed_ms = elapsed.as_millis() as u64, "Readiness probe passed");
                None
            }
            Err(e) => {
                warn!(pid, name = %process.name, error = %e, "Readiness probe failed");
                process.ready = false;
                process.last_error = Some(e.to_string());
                self.logs
                    .push_system(pid, format!("Readiness failed: {}", e))
                    .await;
                Some(e.to_string())
            }
        };

        {
            let mut table = self.table.write().await;
            if let Some(entry) = table.get_mut(pid) {
                entry.info.ready = process.ready;
                entry.info.ready_at = process.ready_at;
                if error.is_some() {
                    entry.info.last_error = process.last_error.clone();
                }
                // 프로브 중에 로그로 찾은 포트 반영
                process.ports = entry.info.ports.clone();
            }
        }

        self.events
            .publish(LifecycleEvent::ProcessReady {
                pid,
                name: process.name.clone(),
                ready: process.ready,
                error,
            })
            .await;
        self.persist();
        process
    }

    fn spawn_reader<R>(self: &Arc<Self>, pid: u32, reader: R, is_stderr: bool)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let found = ports_from_log_line(&line);
                if !found.is_empty() {
                    this.add_ports(pid, found).await;
                }
                let entry = if is_stderr {
                    LogEntry::stderr(line)
                } else {
                    LogEntry::stdout(line)
                };
                this.logs.push(pid, entry).await;
            }
        });
    }

    async fn add_ports(&self, pid: u32, found: BTreeSet<u16>) {
        let changed = {
            let mut table = self.table.write().await;
            match table.get_mut(pid) {
                Some(entry) => {
                    let before = entry.info.ports.len();
                    entry.info.ports.extend(found);
                    entry.info.ports.len() != before
                }
                None => false,
            }
        };
        if changed {
            debug!(pid, "Discovered port from output");
            self.persist();
        }
    }

    async fn spawn_exit_watcher(
        self: &Arc<Self>,
        pid: u32,
        mut child: Child,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for process");
                    None
                }
            };
            this.handle_exit(pid, ExitInfo { code }, &exit_tx).await;
        });
        self.watchers.lock().await.insert(pid, handle);
    }

    /// 재연결 프로세스는 자식 핸들이 없으므로 OS 생존 여부를 폴링한다
    async fn spawn_liveness_watcher(
        self: &Arc<Self>,
        pid: u32,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIVENESS_POLL);
            loop {
                ticker.tick().await;
                if !os::is_alive(pid) {
                    break;
                }
            }
            this.handle_exit(pid, ExitInfo { code: None }, &exit_tx).await;
        });
        self.watchers.lock().await.insert(pid, handle);
    }

    async fn handle_exit(
        self: &Arc<Self>,
        pid: u32,
        exit: ExitInfo,
        exit_tx: &watch::Sender<Option<ExitInfo>>,
    ) {
        let intended = self.shutting_down.read().await.contains(&pid);
        let code_text = exit
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let snapshot = {
            let mut table = self.table.write().await;
            table.get_mut(pid).map(|entry| {
                let info = &mut entry.info;
                info.running = false;
                info.exit_code = exit.code;
                info.exited_at = Some(Utc::now());
                if !intended && !exit.is_clean() {
                    let kind = if info.role.is_one_shot() {
                        "failed"
                    } else if info.uptime() >= self.config.crash_grace() {
                        "crashed"
                    } else {
                        "startup failure"
                    };
                    info.last_error = Some(format!("{} (exit code {})", kind, code_text));
                }
                info.clone()
            })
        };

        self.logs
            .push_system(pid, format!("Process exited (code {})", code_text))
            .await;
        self.logs.mark_ended(pid).await;
        exit_tx.send_replace(Some(exit));
        self.watchers.lock().await.remove(&pid);

        let Some(process) = snapshot else {
            return;
        };

        let unexpected = !intended && self.lifecycle.is_running() && !exit.is_clean();
        // test/e2e 의 실패 종료는 결과를 가져가는 호출자 몫
        let crashed = unexpected
            && !process.role.is_one_shot()
            && process.uptime() >= self.config.crash_grace();

        if unexpected {
            let message = process.last_error.clone().unwrap_or_default();
            if self.config.silent_recovery {
                debug!(pid, name = %process.name, "{}", message);
            } else {
                warn!(pid, name = %process.name, "Process {}", message);
            }
            self.telemetry.log(
                TelemetryLevel::Warn,
                "process",
                &message,
                Some(&json!({ "code": exit.code, "crashed": crashed })),
                Some(pid),
            );
        } else {
            debug!(pid, name = %process.name, code = %code_text, "Process exited");
        }

        self.events
            .publish(LifecycleEvent::ProcessExited {
                pid,
                name: process.name.clone(),
                code: exit.code,
                unexpected,
                crashed,
            })
            .await;
        self.persist();

        if !intended {
            self.schedule_purge(pid).await;
        }
    }

    /// 보관 기간 후 테이블 엔트리와 로그 제거
    async fn schedule_purge(self: &Arc<Self>, pid: u32) {
        let this = self.clone();
        let delay = self.config.purge_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.forget(pid).await;
        });
        self.track(handle).await;
    }

    /// stop 이후 로그만 보관 기간 동안 유지
    async fn schedule_log_purge(self: &Arc<Self>, pid: u32) {
        let this = self.clone();
        let delay = self.config.purge_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !this.table.read().await.contains(pid) {
                this.logs.purge(pid).await;
            }
        });
        self.track(handle).await;
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// 종료된 엔트리를 즉시 제거. 실행 중이면 아무것도 하지 않는다
    pub async fn forget(&self, pid: u32) -> bool {
        let removed = {
            let mut table = self.table.write().await;
            match table.get(pid) {
                Some(entry) if !entry.is_running() => table.remove(pid),
                _ => None,
            }
        };

        let Some(entry) = removed else {
            return false;
        };

        self.logs.purge(pid).await;
        self.events
            .publish(LifecycleEvent::ProcessUnregistered {
                pid,
                name: entry.info.name,
                reason: UnregisterReason::Exited,
            })
            .await;
        self.persist();
        true
    }

    // ========================================================================
    // stop / restart
    // ========================================================================

    /// 프로세스 중지
    ///
    /// 정상 경로: SIGTERM → 유예 시간 대기 → SIGKILL. `force` 면 즉시 SIGKILL.
    pub async fn stop(self: &Arc<Self>, target: ProcessRef, force: bool) -> Result<StopResult> {
        let (pid, name, exit_rx, reattached) = {
            let table = self.table.read().await;
            let entry = table
                .resolve(&target)
                .ok_or_else(|| Error::not_found(format!("process {}", target)))?;
            if !entry.is_running() {
                return Err(Error::not_found(format!("process {} is not running", target)));
            }
            (
                entry.pid(),
                entry.info.name.clone(),
                entry.exit_rx.clone(),
                entry.info.reattached,
            )
        };

        self.shutting_down.write().await.insert(pid);
        debug!(pid, name = %name, force, "Stopping process");

        let (forced, exit_code) = match self.terminate(pid, exit_rx, reattached, force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // 이후 복구 패스가 다시 반응할 수 있도록
                self.shutting_down.write().await.remove(&pid);
                warn!(pid, error = %e, "Failed to stop process");
                return Err(e);
            }
        };

        self.table.write().await.remove(pid);
        self.shutting_down.write().await.remove(&pid);
        self.logs
            .push_system(pid, if forced { "Stopped (forced)" } else { "Stopped" })
            .await;
        self.schedule_log_purge(pid).await;

        info!(pid, name = %name, forced, "Stopped process");
        self.telemetry.record_metric(
            "process.stopped",
            1.0,
            Some(&labels([("forced", forced.to_string())])),
        );
        self.events
            .publish(LifecycleEvent::ProcessUnregistered {
                pid,
                name: name.clone(),
                reason: UnregisterReason::Stopped,
            })
            .await;
        self.persist();

        Ok(StopResult {
            pid,
            name,
            forced,
            exit_code,
        })
    }

    async fn terminate(
        &self,
        pid: u32,
        mut exit_rx: watch::Receiver<Option<ExitInfo>>,
        reattached: bool,
        force: bool,
    ) -> Result<(bool, Option<i32>)> {
        let send = |sig: Signal| {
            if reattached {
                os::signal_tree(pid, sig)
            } else {
                os::signal(pid, sig, true)
            }
        };

        if !force {
            send(Signal::Terminate)?;
            if let Ok(exit) =
                tokio::time::timeout(self.config.stop_grace(), wait_exit(&mut exit_rx)).await
            {
                return Ok((false, exit.and_then(|e| e.code)));
            }
            debug!(pid, "Grace period expired, killing");
        }

        send(Signal::Kill)?;
        match tokio::time::timeout(KILL_CONFIRM_TIMEOUT, wait_exit(&mut exit_rx)).await {
            Ok(exit) => Ok((true, exit.and_then(|e| e.code))),
            Err(_) => Err(Error::stop_failure(pid, "process did not exit after SIGKILL")),
        }
    }

    /// 재시작 (stop → settle → start)
    pub async fn restart(self: &Arc<Self>, target: ProcessRef, force: bool) -> Result<RestartResult> {
        let (old_pid, spec, running) = {
            let table = self.table.read().await;
            let entry = table
                .resolve(&target)
                .ok_or_else(|| Error::not_found(format!("process {}", target)))?;
            (entry.pid(), entry.to_spec(), entry.is_running())
        };

        if running {
            self.stop(ProcessRef::Pid(old_pid), force).await?;
        } else {
            self.forget(old_pid).await;
        }

        tokio::time::sleep(self.config.restart_settle()).await;

        let name = spec.options.name.clone().unwrap_or_default();
        let started = self.start(spec).await?;
        self.note_restart(old_pid, started.pid, &name).await;

        Ok(RestartResult {
            old_pid,
            new_pid: started.pid,
            name,
            ready: started.ready,
            last_error: started.last_error,
        })
    }

    /// 재시작 기록 (횟수 증가 + 이벤트)
    pub async fn note_restart(&self, old_pid: u32, new_pid: u32, name: &str) {
        let count = {
            let mut counts = self.restart_counts.write().await;
            let count = counts.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        info!(old_pid, new_pid, name, restarts = count, "Restarted process");
        self.telemetry.record_metric(
            "process.restarted",
            1.0,
            Some(&labels([("name", name.to_string())])),
        );
        self.events
            .publish(LifecycleEvent::ProcessRestarted {
                old_pid,
                new_pid,
                name: name.to_string(),
            })
            .await;
    }

    // ========================================================================
    // queries
    // ========================================================================

    /// 목록 (시작 시각 순)
    ///
    /// `include_system=false` 면 `system` 태그가 붙은 utility 프로세스를 숨긴다.
    pub async fn list(&self, include_system: bool, filter: Option<&str>) -> Vec<ManagedProcess> {
        let table = self.table.read().await;
        let mut processes: Vec<ManagedProcess> = table
            .iter()
            .map(|e| &e.info)
            .filter(|p| include_system || !is_system(p))
            .filter(|p| filter.map_or(true, |f| f.trim().is_empty() || p.matches_filter(f)))
            .cloned()
            .collect();
        processes.sort_by_key(|p| p.start_time);
        processes
    }

    pub async fn status(&self, target: &ProcessRef) -> Result<ProcessStatus> {
        let process = self
            .table
            .read()
            .await
            .resolve(target)
            .map(|e| e.info.clone())
            .ok_or_else(|| Error::not_found(format!("process {}", target)))?;

        let pid = process.pid;
        Ok(ProcessStatus {
            uptime_ms: process.uptime().as_millis() as u64,
            restart_count: self.restart_count(&process.name).await,
            error_count: self.logs.error_count(pid).await,
            recent_logs: self.logs.tail(pid, STATUS_LOG_TAIL).await,
            process,
        })
    }

    pub async fn process(&self, pid: u32) -> Option<ManagedProcess> {
        self.table.read().await.get(pid).map(|e| e.info.clone())
    }

    /// 재시작에 필요한 명세
    pub async fn spec(&self, target: &ProcessRef) -> Result<StartSpec> {
        self.table
            .read()
            .await
            .resolve(target)
            .map(|e| e.to_spec())
            .ok_or_else(|| Error::not_found(format!("process {}", target)))
    }

    pub async fn find_by_port(&self, port: u16) -> Vec<ManagedProcess> {
        self.table
            .read()
            .await
            .by_port(port)
            .into_iter()
            .map(|e| e.info.clone())
            .collect()
    }

    pub async fn detect_port_conflicts(&self) -> Vec<PortConflict> {
        self.table.read().await.port_conflicts()
    }

    /// 로그 조회. stop 된 프로세스도 보관 기간 동안은 pid 로 조회 가능
    pub async fn logs(
        &self,
        target: &ProcessRef,
        tail: Option<usize>,
        errors_only: bool,
    ) -> Result<Vec<LogEntry>> {
        let resolved = self.table.read().await.resolve(target).map(|e| e.pid());
        let pid = match resolved {
            Some(pid) => pid,
            None => match target {
                ProcessRef::Pid(pid) if self.logs.contains(*pid).await => *pid,
                _ => return Err(Error::not_found(format!("process {}", target))),
            },
        };

        let mut entries = if errors_only {
            self.logs.errors(pid).await
        } else {
            self.logs.tail(pid, usize::MAX).await
        };
        if let Some(n) = tail {
            let skip = entries.len().saturating_sub(n);
            entries.drain(..skip);
        }
        Ok(entries)
    }

    pub async fn error_count(&self, pid: u32) -> usize {
        self.logs.error_count(pid).await
    }

    pub async fn restart_count(&self, name: &str) -> u32 {
        self.restart_counts
            .read()
            .await
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// stop 진행 중이거나 전역 종료 중인지
    pub async fn is_shutting_down(&self, pid: u32) -> bool {
        self.lifecycle.is_shutting_down() || self.shutting_down.read().await.contains(&pid)
    }

    // ========================================================================
    // persistence / shutdown
    // ========================================================================

    fn persist(&self) {
        if let Some(persister) = &self.persister {
            persister.schedule();
        }
    }

    /// 이전 세션 스냅샷에서 아직 살아있는 프로세스에 재연결
    ///
    /// 로드 실패는 경고만 남기고 0 을 돌려준다.
    pub async fn reattach(self: &Arc<Self>) -> usize {
        if !self.config.reattach {
            return 0;
        }
        let Some(store) = &self.snapshot_store else {
            return 0;
        };

        let snapshot = match store.load_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to load process snapshot, starting empty");
                return 0;
            }
        };

        let mut reattached = 0;
        for record in snapshot.processes {
            let pid = record.pid;
            if !os::is_alive(pid) {
                debug!(pid, name = %record.name, "Discarding dead process from snapshot");
                continue;
            }
            if self.table.read().await.contains(pid) {
                continue;
            }

            let process = record.into_reattached();
            let (exit_tx, exit_rx) = watch::channel(None);
            let entry = ProcessEntry {
                signature: signature(process.role, &process.command, &process.cwd, &process.args),
                info: process.clone(),
                env: HashMap::new(),
                shell: false,
                singleton: false,
                exit_rx,
            };

            self.logs
                .create_buffer(pid, Some("Reattached from previous session"))
                .await;
            self.table.write().await.insert(entry);
            self.spawn_liveness_watcher(pid, exit_tx).await;

            info!(pid, name = %process.name, "Reattached process");
            self.events
                .publish(LifecycleEvent::ProcessRegistered {
                    pid,
                    name: process.name,
                    role: process.role,
                    reattached: true,
                })
                .await;
            reattached += 1;
        }

        self.persist();
        reattached
    }

    /// 전역 종료: 모든 프로세스 정상 중지 → 스냅샷 flush → 감시 태스크 중단
    pub async fn shutdown(self: &Arc<Self>) {
        if !self.lifecycle.begin_shutdown() {
            debug!("Shutdown already in progress");
        }

        let pids: Vec<u32> = {
            let table = self.table.read().await;
            table
                .iter()
                .filter(|e| e.is_running())
                .map(|e| e.pid())
                .collect()
        };
        info!(processes = pids.len(), "Shutting down supervisor");

        let results = join_all(pids.iter().map(|pid| self.stop(ProcessRef::Pid(*pid), false))).await;
        for (pid, result) in pids.iter().zip(results) {
            if let Err(e) = result {
                warn!(pid, error = %e, "Failed to stop process during shutdown");
            }
        }

        if let Some(persister) = &self.persister {
            persister.schedule();
            persister.flush().await;
        }

        for (_, handle) in self.watchers.lock().await.drain() {
            handle.abort();
        }
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
    }
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    rx.wait_for(|exit| exit.is_some())
        .await
        .ok()
        .and_then(|exit| *exit)
}

fn build_command(command: &str, args: &[String], shell: bool) -> Command {
    if !shell {
        let mut cmd = Command::new(command);
        cmd.args(args);
        return cmd;
    }

    let line = std::iter::once(command.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C");
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.arg("-c");
        c
    };
    cmd.arg(line);
    cmd
}

/// 커맨드의 basename
fn default_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or(command);
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(first)
        .to_string()
}

fn is_system(process: &ManagedProcess) -> bool {
    process.role == crate::process::ProcessRole::Utility && process.has_tag("system")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name() {
        assert_eq!(default_name("/usr/bin/node"), "node");
        assert_eq!(default_name("npm run dev"), "npm");
        assert_eq!(default_name("cargo"), "cargo");
    }

    #[test]
    fn test_shell_command_joins_args() {
        let cmd = build_command("echo", &["hi".to_string()], true);
        let std_cmd = cmd.as_std();
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        #[cfg(not(windows))]
        assert_eq!(args, vec!["-c", "echo hi"]);
        #[cfg(windows)]
        assert_eq!(args, vec!["/C", "echo hi"]);
    }
}
