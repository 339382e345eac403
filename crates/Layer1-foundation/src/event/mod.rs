//! Event System - 이벤트 발행/구독
//!
//! 각 서브시스템은 자기 이벤트 enum과 전용 `EventBus<E>`를 가진다.
//!
//! ```text
//!   Supervisor ──publish──▶ EventBus<LifecycleEvent> ──▶ HealthMonitor
//!   HealthMonitor ─publish─▶ EventBus<HealthEvent>   ──▶ RecoveryEngine
//!   RecoveryEngine ─publish▶ EventBus<RecoveryEvent> ──▶ (관찰자)
//! ```

pub mod bus;

pub use bus::{Event, EventBus, EventFilter, EventListener, ListenerId};
