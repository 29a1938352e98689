//! Event System - 관측 이벤트 발행/구독
//!
//! 코어의 생명주기 전환, 호출 실패, 제한 거부, 재연결 시도를
//! 구조화 이벤트로 발행합니다. 수집기가 없어도 코어 동작에는
//! 영향을 주지 않습니다.

mod bus;
mod types;

pub use bus::{EventBus, EventListener, ListenerId};
pub use types::{CoreEvent, EventCategory, EventId, EventSeverity};
