//! # Configuration System
//!
//! 코어 설정 - 도구 서비스, 속도 제한 정책, 실시간 채널
//!
//! 설정은 시작 시 한 번 로드되며 이후 불변입니다 (핫 리로드 없음).
//!
//! ## 우선순위 (낮은 → 높은)
//!
//! 1. TOML 설정 파일 (`voyage.toml`)
//! 2. 환경 변수 오버라이드 (`VOYAGE_*`)
//!
//! ## 사용 예시
//!
//! ```ignore
//! use voyage_foundation::config::ConfigLoader;
//!
//! let config = ConfigLoader::new("voyage.toml").load()?;
//! for service in &config.services {
//!     // ...
//! }
//! ```

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    RateLimitConfig, RealtimeConfig, RoutePolicy, ServiceConfig, TransportConfig, VoyageConfig,
};
