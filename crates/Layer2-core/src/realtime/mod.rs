//! Realtime - 브로드캐스트 서비스 채널 매니저
//!
//! 이름 붙은 토픽(`{resourceType}:{id}`) 구독을 유지하고 연결 상태를
//! 추적하며 지수 백오프로 재연결을 수행합니다.
//!
//! ## 기능
//! - 연결 상태 머신 (disconnected/connecting/connected/reconnecting/error)
//! - 끊김 시 자동 재연결 (설정 가능한 백오프, 기본 500ms → 8s)
//! - 재연결 후 구독 투명 복구 (호출자 재등록 불필요)
//!
//! 재연결 루프는 요청 처리와 분리된 자체 태스크에서 돌며, 백오프
//! 대기는 호출자를 블로킹하지 않습니다. 이벤트는 `connected` 상태에서만
//! 핸들러로 전달되고 그 외 상태 도중 도착분은 버려집니다.

mod manager;
mod subscription;
mod transport;
mod types;

pub use manager::ChannelManager;
pub use subscription::ChannelSubscription;
pub use transport::{RealtimeSession, RealtimeTransport, SseRealtimeTransport};
pub use types::{ConnectionState, LastError, RealtimeEvent};
