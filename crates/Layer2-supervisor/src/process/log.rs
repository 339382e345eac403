//! Process Log System - 프로세스별 출력 캡처
//!
//! Provides:
//! - stdout/stderr 라인 단위 bounded ring (기본 100개)
//! - 실시간 구독 (log readiness 프로브용)
//! - 에러 라인 분류 (stderr + 에러 키워드)
//! - 종료 후 보관, 이후 purge

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// 기본 ring 크기
pub const DEFAULT_RING_SIZE: usize = 100;

/// Broadcast channel capacity
const BROADCAST_CAPACITY: usize = 256;

/// 에러 라인 키워드 (단어 단위)
const ERROR_PATTERN: &str = r"(?i)\b(error|exception|fatal|panic|panicked)\b";

fn error_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ERROR_PATTERN).ok()).as_ref()
}

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
    /// supervisor 메시지 (시작, 종료 등)
    System,
    /// 에러 키워드가 포함된 stderr 라인
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Stdout => "stdout",
            LogLevel::Stderr => "stderr",
            LogLevel::System => "system",
            LogLevel::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

/// 로그 한 줄
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub content: String,
    /// 프로세스 출력 기준 줄 번호 (ring 밖으로 밀려난 줄 포함)
    pub line_number: usize,
}

impl LogEntry {
    pub fn new(level: LogLevel, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            content: content.into(),
            line_number: 0,
        }
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new(LogLevel::Stdout, content)
    }

    /// stderr 라인. 에러 키워드가 있으면 Error 로 분류
    pub fn stderr(content: impl Into<String>) -> Self {
        let content = content.into();
        let level = match error_regex() {
            Some(re) if re.is_match(&content) => LogLevel::Error,
            _ => LogLevel::Stderr,
        };
        Self::new(level, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LogLevel::System, content)
    }

    /// 사람이 읽는 한 줄 형식
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str(),
            self.content
        )
    }
}

/// 프로세스 하나의 로그 ring
#[derive(Debug)]
pub struct ProcessLogBuffer {
    pub pid: u32,
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    line_count: usize,
    tx: broadcast::Sender<LogEntry>,
    ended_at: Option<DateTime<Utc>>,
}

impl ProcessLogBuffer {
    pub fn new(pid: u32, max_entries: usize) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let max_entries = max_entries.max(1);
        Self {
            pid,
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            line_count: 0,
            tx,
            ended_at: None,
        }
    }

    /// 로그 추가
    pub fn push(&mut self, mut entry: LogEntry) {
        self.line_count += 1;
        entry.line_number = self.line_count;

        let _ = self.tx.send(entry.clone());

        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn mark_ended(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// 마지막 N개
    pub fn tail(&self, n: usize) -> Vec<&LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// ring 안의 에러 라인
    pub fn errors(&self) -> Vec<&LogEntry> {
        self.entries.iter().filter(|e| e.level.is_error()).collect()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.level.is_error()).count()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// 전체 프로세스 로그 관리자 (pid 기준)
pub struct ProcessLogManager {
    buffers: Arc<RwLock<HashMap<u32, ProcessLogBuffer>>>,
    ring_size: usize,
}

impl ProcessLogManager {
    pub fn new(ring_size: usize) -> Self {
        Self {
            buffers: Arc::new(RwLock::new(HashMap::new())),
            ring_size,
        }
    }

    /// 버퍼 생성. 첫 출력 전에 구독을 돌려준다
    pub async fn create_buffer(&self, pid: u32, banner: Option<&str>) -> broadcast::Receiver<LogEntry> {
        let mut buffer = ProcessLogBuffer::new(pid, self.ring_size);
        let receiver = buffer.subscribe();

        if let Some(text) = banner {
            buffer.push(LogEntry::system(text));
        }

        self.buffers.write().await.insert(pid, buffer);
        debug!(pid, "Created log buffer");
        receiver
    }

    pub async fn push(&self, pid: u32, entry: LogEntry) {
        if let Some(buffer) = self.buffers.write().await.get_mut(&pid) {
            buffer.push(entry);
        }
    }

    pub async fn push_stdout(&self, pid: u32, content: impl Into<String>) {
        self.push(pid, LogEntry::stdout(content)).await;
    }

    pub async fn push_stderr(&self, pid: u32, content: impl Into<String>) {
        self.push(pid, LogEntry::stderr(content)).await;
    }

    pub async fn push_system(&self, pid: u32, content: impl Into<String>) {
        self.push(pid, LogEntry::system(content)).await;
    }

    pub async fn mark_ended(&self, pid: u32) {
        if let Some(buffer) = self.buffers.write().await.get_mut(&pid) {
            buffer.mark_ended();
        }
    }

    pub async fn subscribe(&self, pid: u32) -> Option<broadcast::Receiver<LogEntry>> {
        self.buffers.read().await.get(&pid).map(|b| b.subscribe())
    }

    pub async fn contains(&self, pid: u32) -> bool {
        self.buffers.read().await.contains_key(&pid)
    }

    pub async fn tail(&self, pid: u32, n: usize) -> Vec<LogEntry> {
        self.buffers
            .read()
            .await
            .get(&pid)
            .map(|b| b.tail(n).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn errors(&self, pid: u32) -> Vec<LogEntry> {
        self.buffers
            .read()
            .await
            .get(&pid)
            .map(|b| b.errors().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn error_count(&self, pid: u32) -> usize {
        self.buffers
            .read()
            .await
            .get(&pid)
            .map(|b| b.error_count())
            .unwrap_or(0)
    }

    /// 버퍼 제거 (보관 기간 종료)
    pub async fn purge(&self, pid: u32) -> bool {
        let removed = self.buffers.write().await.remove(&pid).is_some();
        if removed {
            debug!(pid, "Purged log buffer");
        }
        removed
    }

    pub async fn clear(&self) {
        self.buffers.write().await.clear();
    }
}

impl Default for ProcessLogManager {
    fn default() -> Self {
        Self::new(DEFAULT_RING_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_classification() {
        assert_eq!(LogEntry::stderr("Error: EADDRINUSE").level, LogLevel::Error);
        assert_eq!(LogEntry::stderr("thread 'main' panicked at src/main.rs").level, LogLevel::Error);
        assert_eq!(LogEntry::stderr("0 errors, 2 warnings").level, LogLevel::Stderr);
        assert_eq!(LogEntry::stderr("fatalistic banner").level, LogLevel::Stderr);
        assert_eq!(LogEntry::stderr("PANIC: boom").level, LogLevel::Error);
        assert_eq!(LogEntry::stderr("warning: unused").level, LogLevel::Stderr);
        // stdout 은 키워드가 있어도 에러가 아님
        assert_eq!(LogEntry::stdout("0 errors").level, LogLevel::Stdout);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut buffer = ProcessLogBuffer::new(1, 3);
        for i in 0..5 {
            buffer.push(LogEntry::stdout(format!("line {}", i)));
        }

        assert_eq!(buffer.line_count(), 5);
        let tail: Vec<_> = buffer.entries().map(|e| e.content.clone()).collect();
        assert_eq!(tail, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(buffer.tail(2)[0].line_number, 4);
    }

    #[test]
    fn test_error_count_decays_with_ring() {
        let mut buffer = ProcessLogBuffer::new(1, 2);
        buffer.push(LogEntry::stderr("fatal: one"));
        buffer.push(LogEntry::stderr("fatal: two"));
        assert_eq!(buffer.error_count(), 2);

        buffer.push(LogEntry::stdout("ok"));
        buffer.push(LogEntry::stdout("ok"));
        assert_eq!(buffer.error_count(), 0);
    }

    #[tokio::test]
    async fn test_manager_subscribe_and_purge() {
        let manager = ProcessLogManager::new(10);
        let mut rx = manager.create_buffer(42, Some("Starting: node server.js")).await;

        let banner = rx.recv().await.unwrap();
        assert_eq!(banner.level, LogLevel::System);

        manager.push_stdout(42, "listening").await;
        assert_eq!(rx.recv().await.unwrap().content, "listening");

        manager.push_stderr(42, "Error: boom").await;
        assert_eq!(manager.error_count(42).await, 1);
        assert_eq!(manager.tail(42, 10).await.len(), 3);

        assert!(manager.purge(42).await);
        assert!(manager.tail(42, 10).await.is_empty());
    }
}
