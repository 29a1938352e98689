//! Channel Subscription - 토픽 구독
//!
//! 구독은 등록한 호출자가 소유합니다. 매니저는 토픽 → 구독의 약한
//! 참조만 보관하므로 호출자가 `Arc`를 버리면 구독이 소멸합니다.

use super::types::RealtimeEvent;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// 이벤트 핸들러
pub type EventHandler = Box<dyn Fn(Value) + Send + Sync>;

/// 토픽 구독
pub struct ChannelSubscription {
    /// 토픽 (`{resourceType}:{id}` 형태)
    topic: String,

    /// 구독 시 전달되는 인증 토큰 (검증은 브로드캐스트 서비스 소관)
    auth_token: String,

    /// 이벤트 이름 → 핸들러
    handlers: RwLock<HashMap<String, EventHandler>>,
}

impl ChannelSubscription {
    pub(crate) fn new(topic: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            auth_token: auth_token.into(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// 토픽
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// 이벤트 핸들러 등록 (같은 이름은 교체)
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(Value) + Send + Sync + 'static) {
        self.handlers.write().insert(event.into(), Box::new(handler));
    }

    /// 이벤트 핸들러 해제
    pub fn off(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    /// 수신 이벤트를 해당 핸들러로 전달 (핸들러 없으면 무시)
    pub(crate) fn dispatch(&self, event: &RealtimeEvent) {
        let handlers = self.handlers.read();
        if let Some(handler) = handlers.get(&event.event) {
            handler(event.payload.clone());
        }
    }
}
