//! voyage-core: Core Runtime for Voyage
//!
//! Layer2 - 외부 서비스 오케스트레이션 레이어
//!
//! # 주요 모듈
//!
//! - `service`: 도구 서비스 연동 (전송 계층, 클라이언트, 레지스트리)
//! - `ratelimit`: 슬라이딩 윈도우 기반 요청 허용 제어
//! - `realtime`: 브로드캐스트 서비스 채널 매니저 (재연결 포함)
//! - `context`: 오케스트레이션 통합 컨텍스트
//!
//! # 사용 예시
//!
//! ```ignore
//! use voyage_core::OrchestratorContext;
//! use voyage_foundation::{ConfigLoader, EventBus};
//! use std::sync::Arc;
//!
//! let config = ConfigLoader::new("voyage.toml").load()?;
//! let events = Arc::new(EventBus::new());
//! let ctx = OrchestratorContext::new(config, events)?;
//!
//! // 허용 제어 → 클라이언트 조회 → 도구 호출
//! let result = ctx
//!     .invoke_tool("trips.read", "user-81", "flight-search", "search", json!({
//!         "origin": "ICN",
//!         "destination": "CDG"
//!     }))
//!     .await?;
//!
//! ctx.shutdown().await;
//! ```

// Core modules
pub mod context;
pub mod ratelimit;
pub mod realtime;
pub mod service;

// Re-exports: Context
pub use context::OrchestratorContext;

// Re-exports: Service
pub use service::{
    ClientRegistry, ClientState, HttpTransport, StdioTransport, ToolClient, ToolResult,
    ToolTransport,
};

// Re-exports: Rate limiting
pub use ratelimit::{Admission, RateLimitKey, RateLimiter};

// Re-exports: Realtime
pub use realtime::{
    ChannelManager, ChannelSubscription, ConnectionState, RealtimeEvent, RealtimeSession,
    RealtimeTransport, SseRealtimeTransport,
};
