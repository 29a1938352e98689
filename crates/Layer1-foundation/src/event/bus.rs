//! Event Bus - 이벤트 브로드캐스트 시스템
//!
//! 비동기 이벤트 발행/구독 시스템을 제공합니다.

use super::types::{CoreEvent, EventCategory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

/// 기본 브로드캐스트 채널 용량
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
///
/// 이벤트를 수신하고 처리하는 수집기가 구현합니다.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 관심 있는 이벤트 카테고리 (None이면 모든 이벤트)
    fn categories(&self) -> Option<Vec<EventCategory>> {
        None
    }

    /// 이벤트 처리
    async fn on_event(&self, event: &CoreEvent);
}

/// 이벤트 버스
///
/// 코어 전체의 관측 이벤트를 브로드캐스트합니다. 수신자가 없거나
/// 리스너가 느려도 발행자는 실패하지 않습니다.
///
/// ## 사용법
///
/// ```ignore
/// use voyage_foundation::event::{EventBus, CoreEvent, EventCategory};
///
/// let bus = EventBus::new();
/// let id = bus.subscribe(my_listener).await;
/// bus.publish(CoreEvent::new("service.started", EventCategory::Service)).await;
/// bus.unsubscribe(id).await;
/// ```
pub struct EventBus {
    /// 브로드캐스트 채널 송신자
    sender: broadcast::Sender<CoreEvent>,

    /// 등록된 리스너
    listeners: RwLock<HashMap<ListenerId, Arc<dyn EventListener>>>,

    /// 리스너 ID 카운터
    listener_counter: AtomicU64,

    /// 발행된 이벤트 수
    event_count: AtomicU64,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// 이벤트 발행
    ///
    /// 모든 리스너에게 전달하고 브로드캐스트 채널로도 송신합니다.
    /// 수신자가 없어도 에러가 아닙니다.
    pub async fn publish(&self, event: CoreEvent) {
        trace!("Publishing event: {} ({})", event.kind, event.source);
        self.event_count.fetch_add(1, Ordering::Relaxed);

        // 브로드캐스트 (수신자 없으면 무시)
        let _ = self.sender.send(event.clone());

        // 등록된 리스너 호출
        let listeners = self.listeners.read().await;
        for listener in listeners.values() {
            if let Some(categories) = listener.categories() {
                if !categories.contains(&event.category) {
                    continue;
                }
            }
            listener.on_event(&event).await;
        }
    }

    /// 리스너 등록
    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().await.insert(id, listener);
        id
    }

    /// 리스너 해제
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.write().await.remove(&id).is_some()
    }

    /// 브로드캐스트 수신 채널 생성
    pub fn receiver(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
