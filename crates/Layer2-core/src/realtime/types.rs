//! Realtime Types - 채널 관련 타입 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 연결 상태
///
/// 논리 연결당 하나이며 매니저 재시작 시에만 초기화됩니다.
/// 전이는 매니저 상태 머신을 통해서만 일어납니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 초기 상태 / 명시적 종료 후
    Disconnected,
    /// 핸드셰이크 진행 중
    Connecting,
    /// 이벤트 수신 가능
    Connected,
    /// 끊김 후 백오프 대기 중
    Reconnecting,
    /// 즉시 재시도 소진 (수동 재연결 필요)
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

/// 브로드캐스트 서비스에서 수신한 이벤트
///
/// `topic`은 `trip:42` 형태의 불투명 문자열입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// 토픽
    pub topic: String,

    /// 이벤트 이름
    pub event: String,

    /// 페이로드
    #[serde(default)]
    pub payload: Value,
}

/// 마지막 연결 에러
#[derive(Debug, Clone)]
pub struct LastError {
    /// 에러 상세
    pub detail: String,

    /// 발생 시각
    pub at: DateTime<Utc>,
}
