//! Error types for Voyage
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// 전송 계층 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// 프로세스 시작 실패 (명령어 없음, 권한 등)
    Spawn,
    /// 원격 연결 실패
    Connect,
    /// stdin 쓰기 실패 (broken pipe)
    Write,
    /// stdout 읽기 실패 (스트림 종료)
    Read,
    /// 응답 타임아웃
    Timeout,
    /// HTTP 비-2xx 응답
    HttpStatus,
    /// 전송 계층이 이미 닫힘
    Closed,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Connect => "connect",
            Self::Write => "write",
            Self::Read => "read",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Voyage 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 전송 관련
    // ========================================================================
    #[error("Transport error ({kind}): {detail}")]
    Transport {
        kind: TransportErrorKind,
        detail: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // ========================================================================
    // 제한 관련
    // ========================================================================
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ========================================================================
    // 실시간 채널 관련
    // ========================================================================
    #[error("Connection error: {0}")]
    Connection(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 전송 에러 생성 헬퍼
    pub fn transport(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Error::Transport {
            kind,
            detail: detail.into(),
        }
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited { .. } | Error::Connection(_) => true,
            Error::Transport { kind, .. } => {
                matches!(
                    kind,
                    TransportErrorKind::Timeout | TransportErrorKind::Connect
                )
            }
            _ => false,
        }
    }

    /// 전송 에러의 분류 (전송 에러가 아니면 None)
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Error::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
