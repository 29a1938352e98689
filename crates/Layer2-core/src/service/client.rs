//! Tool Client - 도구 서비스 클라이언트
//!
//! 서비스 하나당 클라이언트 하나. 전송 계층을 소유하고 프로세스/연결
//! 생명주기를 추적합니다.
//!
//! ## 타임아웃 정책
//!
//! 타임아웃된 stdio 호출은 직렬화 큐 자리를 즉시 반납하고 프로세스를
//! 의심 상태로 표시합니다. 연속 두 번째 타임아웃에서 응답 불능으로
//! 판정하여 클라이언트를 `Failed`로 전환하고 프로세스를 종료합니다.
//! (단발 타임아웃마다 죽이면 프로세스 재기동이 빈발하므로 피합니다.)

use super::transport::{HttpTransport, StdioTransport, ToolTransport};
use super::types::{ToolInvocation, ToolResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use voyage_foundation::{
    CoreEvent, Error, EventBus, EventCategory, EventSeverity, Result, ServiceConfig,
    TransportConfig, TransportErrorKind,
};

/// 클라이언트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// 시작 전
    Stopped,
    /// 프로세스/연결 시작 중
    Starting,
    /// 사용 가능
    Running,
    /// 복구 불가 실패 (레지스트리가 다음 조회에서 축출)
    Failed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

/// 도구 서비스 클라이언트
pub struct ToolClient {
    /// 서비스 설정 (재생성 시 원본 그대로 사용)
    config: ServiceConfig,

    /// 전송 계층 (첫 invoke에서 지연 생성)
    transport: RwLock<Option<Arc<dyn ToolTransport>>>,

    /// 현재 상태
    state: RwLock<ClientState>,

    /// 마지막 에러
    last_error: RwLock<Option<String>>,

    /// 직전 호출이 타임아웃이었는지 (연속 타임아웃 판정용)
    suspect: AtomicBool,

    /// 관측 이벤트 버스
    events: Arc<EventBus>,
}

impl std::fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ToolClient {
    /// 새 클라이언트 생성 (전송은 첫 호출까지 시작하지 않음)
    pub fn new(config: ServiceConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            transport: RwLock::new(None),
            state: RwLock::new(ClientState::Stopped),
            last_error: RwLock::new(None),
            suspect: AtomicBool::new(false),
            events,
        }
    }

    /// 서비스 이름
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// 현재 상태
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// 마지막 에러
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// 상태 전환 및 이벤트 발행
    async fn transition(&self, next: ClientState) {
        let previous = {
            let mut state = self.state.write().await;
            let previous = *state;
            *state = next;
            previous
        };

        if previous != next {
            debug!(
                "Service '{}': {} -> {}",
                self.config.name,
                previous.as_str(),
                next.as_str()
            );
            self.events
                .publish(
                    CoreEvent::new(
                        format!("service.{}", next.as_str()),
                        EventCategory::Service,
                    )
                    .source(&self.config.name)
                    .detail(json!({ "previous": previous.as_str() })),
                )
                .await;
        }
    }

    /// 전송 계층 확보 (지연 생성, 이중 확인)
    async fn ensure_transport(&self) -> Result<Arc<dyn ToolTransport>> {
        {
            let guard = self.transport.read().await;
            if let Some(transport) = guard.as_ref() {
                if transport.is_connected() {
                    return Ok(Arc::clone(transport));
                }
            }
        }

        let mut guard = self.transport.write().await;
        // 쓰기 잠금 획득 사이에 다른 호출자가 시작했을 수 있음
        if let Some(transport) = guard.as_ref() {
            if transport.is_connected() {
                return Ok(Arc::clone(transport));
            }
        }

        self.transition(ClientState::Starting).await;

        let timeout = self.config.timeout();
        let grace = self.config.shutdown_grace();
        let transport: Arc<dyn ToolTransport> = match &self.config.transport {
            TransportConfig::Stdio { command, args, env } => {
                match StdioTransport::spawn(command, args, env, timeout, grace).await {
                    Ok(transport) => Arc::new(transport),
                    Err(e) => {
                        *self.last_error.write().await = Some(e.to_string());
                        self.transition(ClientState::Failed).await;
                        return Err(e);
                    }
                }
            }
            TransportConfig::Http { base_url } => {
                match HttpTransport::connect(base_url, timeout) {
                    Ok(transport) => Arc::new(transport),
                    Err(e) => {
                        *self.last_error.write().await = Some(e.to_string());
                        self.transition(ClientState::Failed).await;
                        return Err(e);
                    }
                }
            }
        };

        *guard = Some(Arc::clone(&transport));
        self.transition(ClientState::Running).await;
        info!("Service '{}' started", self.config.name);

        Ok(transport)
    }

    /// 도구 호출
    ///
    /// 항상 `ToolResult`를 반환하며 전송/프로토콜 에러를 호출자에게
    /// 예외로 전파하지 않습니다. 내부에서 재시도하지 않습니다.
    pub async fn invoke(&self, tool: &str, arguments: Value) -> ToolResult {
        let invocation = ToolInvocation::new(tool, arguments);

        let transport = match self.ensure_transport().await {
            Ok(transport) => transport,
            Err(e) => {
                self.report_failure(&invocation, &e).await;
                return ToolResult::error(e.to_string());
            }
        };

        match transport.send(&invocation.tool, invocation.arguments.clone()).await {
            Ok(payload) => {
                self.suspect.store(false, Ordering::SeqCst);
                ToolResult::ok(payload)
            }
            Err(e) => {
                self.report_failure(&invocation, &e).await;
                self.handle_transport_failure(&e).await;
                ToolResult::error(e.to_string())
            }
        }
    }

    /// 실패 분류에 따른 상태 처리
    async fn handle_transport_failure(&self, error: &Error) {
        let is_stdio = matches!(self.config.transport, TransportConfig::Stdio { .. });

        match error.transport_kind() {
            Some(TransportErrorKind::Timeout) if is_stdio => {
                if self.suspect.swap(true, Ordering::SeqCst) {
                    // 연속 두 번째 타임아웃 → 응답 불능 판정
                    warn!(
                        "Service '{}' unresponsive after consecutive timeouts",
                        self.config.name
                    );
                    self.fail("unresponsive: consecutive timeouts").await;
                }
            }
            Some(
                TransportErrorKind::Write
                | TransportErrorKind::Read
                | TransportErrorKind::Closed
                | TransportErrorKind::Spawn,
            ) => {
                self.fail(error.to_string()).await;
            }
            // HTTP 타임아웃/연결 실패와 프로토콜 에러는 호출 단위 실패로
            // 취급하고 클라이언트는 유지
            _ => {}
        }
    }

    /// 클라이언트를 실패 상태로 전환하고 전송 계층 정리
    async fn fail(&self, detail: impl Into<String>) {
        *self.last_error.write().await = Some(detail.into());
        if let Some(transport) = self.transport.write().await.take() {
            if let Err(e) = transport.close().await {
                warn!("Error closing transport for '{}': {}", self.config.name, e);
            }
        }
        self.transition(ClientState::Failed).await;
    }

    /// 호출 실패 이벤트 발행
    async fn report_failure(&self, invocation: &ToolInvocation, error: &Error) {
        self.events
            .publish(
                CoreEvent::new("service.invoke_failed", EventCategory::Transport)
                    .source(&self.config.name)
                    .severity(EventSeverity::Warning)
                    .detail(json!({
                        "tool": invocation.tool,
                        "request_id": invocation.request_id.to_string(),
                        "error": error.to_string(),
                    })),
            )
            .await;
    }

    /// 정상 종료 (멱등)
    ///
    /// 소유한 프로세스에 종료를 요청하고 유예 기간 내 종료되지 않으면
    /// 강제 종료합니다.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(transport) = self.transport.write().await.take() {
            transport.close().await?;
            info!("Service '{}' stopped", self.config.name);
        }
        self.transition(ClientState::Stopped).await;
        Ok(())
    }
}
