//! voyage-foundation: Foundation Layer for Voyage
//!
//! Layer1 - 공용 기반 레이어
//!
//! # 주요 모듈
//!
//! - `error`: 중앙 에러 타입 (전송/프로토콜/제한/연결/설정)
//! - `event`: 구조화 이벤트 버스 (관측 수집기)
//! - `config`: 서비스/정책/실시간 채널 설정 및 로더
//!
//! # 사용 예시
//!
//! ```ignore
//! use voyage_foundation::{ConfigLoader, EventBus, Result};
//!
//! let config = ConfigLoader::new("voyage.toml").load()?;
//! let events = EventBus::new();
//! ```

pub mod config;
pub mod error;
pub mod event;

// Re-exports: Error
pub use error::{Error, Result, TransportErrorKind};

// Re-exports: Event
pub use event::{
    CoreEvent, EventBus, EventCategory, EventId, EventListener, EventSeverity, ListenerId,
};

// Re-exports: Config
pub use config::{
    ConfigLoader, RateLimitConfig, RealtimeConfig, RoutePolicy, ServiceConfig, TransportConfig,
    VoyageConfig,
};
