//! Debouncer - "조용해진 뒤 한 번 실행" 스케줄러
//!
//! `schedule()`이 연달아 호출되면 마지막 호출로부터 `window`가 지난 뒤
//! 액션이 한 번만 실행된다. `flush()`는 대기 중인 실행을 즉시 수행한다.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

/// 디바운스 대상 액션
pub type DebouncedAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

enum Command {
    Schedule,
    Flush(oneshot::Sender<()>),
}

/// 디바운서
///
/// tokio 런타임 안에서 생성해야 한다 (백그라운드 태스크를 spawn).
pub struct Debouncer {
    tx: mpsc::UnboundedSender<Command>,
    runs: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl Debouncer {
    pub fn new(window: Duration, action: DebouncedAction) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let runs = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_loop(window, action, rx, runs.clone()));
        Self { tx, runs, task }
    }

    /// 실행 예약 (대기 중이면 타이머 재시작)
    pub fn schedule(&self) {
        let _ = self.tx.send(Command::Schedule);
    }

    /// 대기 중인 실행을 즉시 수행하고 완료까지 대기
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// 지금까지 액션이 실행된 횟수
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_loop(
    window: Duration,
    action: DebouncedAction,
    mut rx: mpsc::UnboundedReceiver<Command>,
    runs: Arc<AtomicU64>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Flush(ack) => {
                // 대기 중인 것이 없음
                let _ = ack.send(());
                continue;
            }
            Command::Schedule => {}
        }

        let mut pending_ack: Option<oneshot::Sender<()>> = None;
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                cmd = rx.recv() => match cmd {
                    Some(Command::Schedule) => {
                        trace!("Debounce window reset");
                        deadline.as_mut().reset(tokio::time::Instant::now() + window);
                    }
                    Some(Command::Flush(ack)) => {
                        pending_ack = Some(ack);
                        break;
                    }
                    None => break,
                },
            }
        }

        action().await;
        runs.fetch_add(1, Ordering::SeqCst);

        if let Some(ack) = pending_ack {
            let _ = ack.send(());
        }
    }
}
