//! Event Bus - 타입별 이벤트 브로드캐스트
//!
//! 서브시스템마다 자기 이벤트 enum 전용 버스를 가진다.
//! 발행자는 구독자를 모르고, 구독자는 버스만 안다.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

// ============================================================================
// Event / EventListener Trait
// ============================================================================

/// 버스로 흐르는 이벤트
pub trait Event: Clone + Debug + Send + Sync + 'static {
    /// 이벤트 타입 이름 (예: "process.started")
    fn event_type(&self) -> &'static str;
}

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
#[async_trait]
pub trait EventListener<E: Event>: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 이벤트 처리
    ///
    /// 발행자는 모든 리스너의 처리를 기다린다. 오래 걸리는 작업은 직접 spawn할 것.
    async fn on_event(&self, event: &E);
}

// ============================================================================
// EventFilter
// ============================================================================

/// 이벤트 타입 prefix 필터
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, types: Vec<String>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn matches<E: Event>(&self, event: &E) -> bool {
        match &self.event_types {
            Some(types) => types.iter().any(|t| event.event_type().starts_with(t)),
            None => true,
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 브로드캐스트 채널 용량
const CHANNEL_CAPACITY: usize = 1024;

/// 기본 이벤트 히스토리 보관 개수
const DEFAULT_HISTORY_SIZE: usize = 100;

struct RegisteredListener<E: Event> {
    listener: Arc<dyn EventListener<E>>,
    filter: Option<EventFilter>,
}

/// 타입별 이벤트 버스
///
/// ```ignore
/// let bus: EventBus<LifecycleEvent> = EventBus::new();
/// let id = bus.subscribe(listener).await;
/// bus.publish(LifecycleEvent::ProcessStarted { .. }).await;
/// bus.unsubscribe(id).await;
/// ```
pub struct EventBus<E: Event> {
    history_size: usize,
    sender: broadcast::Sender<E>,
    listeners: RwLock<HashMap<ListenerId, RegisteredListener<E>>>,
    listener_counter: AtomicU64,
    history: RwLock<VecDeque<E>>,
    event_count: AtomicU64,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self::with_history_size(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(history_size: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            history_size,
            sender,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            event_count: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub async fn subscribe(&self, listener: Arc<dyn EventListener<E>>) -> ListenerId {
        self.subscribe_with_filter(listener, None).await
    }

    /// 필터와 함께 리스너 등록
    pub async fn subscribe_with_filter(
        &self,
        listener: Arc<dyn EventListener<E>>,
        filter: Option<EventFilter>,
    ) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        self.listeners
            .write()
            .await
            .insert(id, RegisteredListener { listener, filter });

        id
    }

    /// 리스너 해제
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().await.remove(&id).is_some();
        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }
        removed
    }

    /// 이벤트 발행
    pub async fn publish(&self, event: E) {
        self.event_count.fetch_add(1, Ordering::SeqCst);

        {
            let mut history = self.history.write().await;
            history.push_back(event.clone());
            while history.len() > self.history_size {
                history.pop_front();
            }
        }

        // 수신자가 없으면 Err - 무시
        let _ = self.sender.send(event.clone());

        // 리스너 목록을 복사해 락을 잡은 채로 콜백하지 않음
        let targets: Vec<Arc<dyn EventListener<E>>> = {
            let listeners = self.listeners.read().await;
            listeners
                .values()
                .filter(|r| r.filter.as_ref().map_or(true, |f| f.matches(&event)))
                .map(|r| r.listener.clone())
                .collect()
        };

        for listener in targets {
            trace!(
                listener_name = listener.name(),
                event_type = event.event_type(),
                "Delivering event to listener"
            );
            listener.on_event(&event).await;
        }
    }

    /// 브로드캐스트 수신자 생성 (스트림 방식)
    pub fn receiver(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// 최근 이벤트 (최신순)
    pub async fn history(&self, limit: Option<usize>) -> Vec<E> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone)]
    enum TestEvent {
        Started(u32),
        Stopped(u32),
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Started(_) => "test.started",
                TestEvent::Stopped(_) => "test.stopped",
            }
        }
    }

    struct CountingListener {
        count: AtomicUsize,
    }

    #[async_trait]
    impl EventListener<TestEvent> for CountingListener {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_event(&self, _event: &TestEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new();
        let listener = Arc::new(CountingListener {
            count: AtomicUsize::new(0),
        });
        let id = bus.subscribe(listener.clone()).await;
        assert_eq!(bus.listener_count().await, 1);

        bus.publish(TestEvent::Started(1)).await;
        assert_eq!(listener.count.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe(id).await);
        bus.publish(TestEvent::Stopped(1)).await;
        assert_eq!(listener.count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.event_count(), 2);
    }

    #[tokio::test]
    async fn test_event_filter() {
        let bus = EventBus::new();
        let listener = Arc::new(CountingListener {
            count: AtomicUsize::new(0),
        });
        let filter = EventFilter::new().with_event_types(vec!["test.stop".to_string()]);
        bus.subscribe_with_filter(listener.clone(), Some(filter)).await;

        bus.publish(TestEvent::Started(1)).await;
        bus.publish(TestEvent::Stopped(1)).await;
        assert_eq!(listener.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_history() {
        let bus = EventBus::with_history_size(5);
        for i in 0..10 {
            bus.publish(TestEvent::Started(i)).await;
        }

        let history = bus.history(None).await;
        assert_eq!(history.len(), 5);
        assert!(matches!(history[0], TestEvent::Started(9)));
    }

    #[tokio::test]
    async fn test_receiver_stream() {
        let bus = EventBus::new();
        let mut rx = bus.receiver();
        bus.publish(TestEvent::Started(3)).await;
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, TestEvent::Started(3)));
    }
}
