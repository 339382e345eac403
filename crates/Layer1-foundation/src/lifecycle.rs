//! Lifecycle - 전역 실행 상태
//!
//! `Running` → `ShuttingDown` 단방향 전이. 모든 반응형 동작(새 모니터링, 복구)은
//! 시작 전에 이 상태를 확인한다.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// 전역 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Running,
    ShuttingDown,
}

/// 공유 lifecycle 핸들 (clone 가능)
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() == LifecycleState::ShuttingDown
    }

    /// ShuttingDown 진입. 처음 전이한 호출만 true
    pub fn begin_shutdown(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    /// 상태 변경 구독
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// ShuttingDown이 될 때까지 대기
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        // sender는 self가 들고 있으므로 Err는 발생하지 않음
        let _ = rx
            .wait_for(|state| *state == LifecycleState::ShuttingDown)
            .await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transition_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_running());
        assert!(lifecycle.begin_shutdown());
        assert!(!lifecycle.begin_shutdown());
        assert!(lifecycle.is_shutting_down());
    }

    #[test]
    fn test_clones_share_state() {
        let a = Lifecycle::new();
        let b = a.clone();
        a.begin_shutdown();
        assert_eq!(b.state(), LifecycleState::ShuttingDown);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let lifecycle = Lifecycle::new();
        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.wait_for_shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        lifecycle.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
