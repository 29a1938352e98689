//! Orchestrator Context - 오케스트레이션 진입점
//!
//! 설정에서 레지스트리, 레이트 리미터, (설정된 경우) 채널 매니저를
//! 조립합니다. 전역 싱글턴 대신 명시적으로 생성/해체하는 컨텍스트
//! 객체입니다 — 테스트마다 독립된 컨텍스트를 만드세요.
//!
//! 호출 경로는 입장 판정 → 클라이언트 조회 → 호출 순서이며, 거부된
//! 호출은 서비스에 도달하지 않습니다.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};
use voyage_foundation::{
    CoreEvent, Error, EventBus, EventCategory, EventSeverity, RealtimeConfig, Result, VoyageConfig,
};

use crate::ratelimit::{RateLimitKey, RateLimiter};
use crate::realtime::{ChannelManager, RealtimeTransport};
use crate::service::{ClientRegistry, ToolResult};

/// 오케스트레이터 컨텍스트
pub struct OrchestratorContext {
    registry: Arc<ClientRegistry>,
    limiter: Arc<RateLimiter>,
    channels: Option<Arc<ChannelManager>>,
    events: Arc<EventBus>,
}

impl OrchestratorContext {
    /// 설정으로 컨텍스트 조립
    ///
    /// 실시간 설정이 없으면 채널 매니저 없이 동작합니다.
    pub fn new(config: VoyageConfig, events: Arc<EventBus>) -> Result<Self> {
        let registry = Arc::new(ClientRegistry::new(config.services, Arc::clone(&events))?);
        let limiter = Arc::new(RateLimiter::new(config.ratelimit));
        let channels = config
            .realtime
            .map(|realtime| Arc::new(ChannelManager::new(realtime, Arc::clone(&events))));

        info!(
            "Orchestrator context ready ({} services configured)",
            registry.configured_services().len()
        );
        Ok(Self {
            registry,
            limiter,
            channels,
            events,
        })
    }

    /// 실시간 전송을 지정해 조립 (테스트용)
    pub fn with_channel_transport(
        config: VoyageConfig,
        realtime: RealtimeConfig,
        transport: Arc<dyn RealtimeTransport>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let mut context = Self::new(
            VoyageConfig {
                realtime: None,
                ..config
            },
            Arc::clone(&events),
        )?;
        context.channels = Some(Arc::new(ChannelManager::with_transport(
            realtime, transport, events,
        )));
        Ok(context)
    }

    /// 레이트 리밋을 거쳐 도구 호출
    ///
    /// 입장 거부는 `Error::RateLimited`로 반환되며 서비스 호출 자체가
    /// 일어나지 않습니다. 입장 후의 도구 실패는 에러가 아니라
    /// `ToolResult`의 실패로 전달됩니다.
    pub async fn invoke_tool(
        &self,
        route_id: &str,
        principal: &str,
        service: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolResult> {
        let key = RateLimitKey::new(route_id, principal);
        let admission = self.limiter.admit(&key);
        if !admission.allowed {
            let retry_after_secs = admission.retry_after_secs();
            debug!(
                "Denied '{}' for {} on route '{}' (retry after {}s)",
                tool, principal, route_id, retry_after_secs
            );
            self.events
                .publish(
                    CoreEvent::new("ratelimit.denied", EventCategory::RateLimit)
                        .severity(EventSeverity::Warning)
                        .source(route_id)
                        .detail(json!({
                            "principal": principal,
                            "retry_after_secs": retry_after_secs,
                        })),
                )
                .await;
            return Err(Error::RateLimited { retry_after_secs });
        }

        let client = self.registry.get(service).await?;
        Ok(client.invoke(tool, arguments).await)
    }

    /// 서비스 레지스트리
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// 레이트 리미터
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// 채널 매니저 (실시간 설정이 있을 때만)
    pub fn channels(&self) -> Option<&Arc<ChannelManager>> {
        self.channels.as_ref()
    }

    /// 이벤트 버스
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// 컨텍스트 종료: 채널 매니저와 모든 클라이언트 정리
    pub async fn shutdown(&self) {
        if let Some(channels) = &self.channels {
            channels.shutdown().await;
        }
        self.registry.shutdown_all().await;
        info!("Orchestrator context stopped");
    }
}
