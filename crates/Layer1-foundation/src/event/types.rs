//! Event Types - 코어 전체에서 사용되는 이벤트 타입 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// 시스템 이벤트 (시작, 종료)
    System,
    /// 도구 서비스 생명주기 이벤트
    Service,
    /// 전송 계층 실패 이벤트
    Transport,
    /// 속도 제한 거부 이벤트
    RateLimit,
    /// 실시간 채널 이벤트 (연결/재연결)
    Realtime,
}

impl EventCategory {
    /// 카테고리 문자열 반환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Service => "service",
            Self::Transport => "transport",
            Self::RateLimit => "rate_limit",
            Self::Realtime => "realtime",
        }
    }
}

// ============================================================================
// Event Severity
// ============================================================================

/// 이벤트 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    /// 디버그 정보
    Debug,
    /// 일반 정보
    Info,
    /// 경고
    Warning,
    /// 에러
    Error,
}

impl Default for EventSeverity {
    fn default() -> Self {
        Self::Info
    }
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// CoreEvent
// ============================================================================

/// 코어 관측 이벤트
///
/// `kind`는 `service.started`, `ratelimit.denied` 같은 점 표기 문자열,
/// `source`는 서비스 이름 또는 토픽입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEvent {
    /// 이벤트 ID
    pub id: EventId,

    /// 이벤트 종류 (점 표기)
    pub kind: String,

    /// 카테고리
    pub category: EventCategory,

    /// 심각도
    pub severity: EventSeverity,

    /// 발생원 (서비스 이름, 토픽 등)
    pub source: String,

    /// 상세 정보
    #[serde(default)]
    pub detail: Value,

    /// 발생 시각
    pub timestamp: DateTime<Utc>,
}

impl CoreEvent {
    /// 새 이벤트 생성
    pub fn new(kind: impl Into<String>, category: EventCategory) -> Self {
        Self {
            id: EventId::new(),
            kind: kind.into(),
            category,
            severity: EventSeverity::default(),
            source: String::new(),
            detail: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// 발생원 설정
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 심각도 설정
    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// 상세 정보 설정
    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}
