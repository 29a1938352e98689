//! Config Types - 설정 타입 정의

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 기본 전송 타임아웃 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 기본 종료 유예 기간 (초)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// 도구 서비스 설정
///
/// 시작 시 한 번 로드되며 이후 불변입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 서비스 이름
    pub name: String,

    /// 전송 타입
    pub transport: TransportConfig,

    /// 호출 타임아웃 (초, 기본 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// 종료 유예 기간 (초, 기본 5)
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ServiceConfig {
    /// 호출 타임아웃
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 종료 유예 기간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

/// 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// stdio 전송 (로컬 프로세스)
    Stdio {
        /// 실행 명령어
        command: String,
        /// 인자
        #[serde(default)]
        args: Vec<String>,
        /// 환경 변수
        #[serde(default)]
        env: HashMap<String, String>,
    },

    /// HTTP 전송 (원격 JSON 엔드포인트)
    Http {
        /// 베이스 URL
        #[serde(rename = "base_url")]
        base_url: String,
    },
}

/// 라우트별 속도 제한 정책
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// 윈도우 내 최대 허용 요청 수
    pub max_requests: u32,

    /// 윈도우 폭 (초)
    pub window_secs: u64,
}

impl RoutePolicy {
    /// 분당 N회 정책
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 60,
        }
    }

    /// 윈도우 폭
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// 속도 제한 설정
///
/// 라우트 ID → 정책 테이블. 등록되지 않은 라우트는 기본 정책을
/// 따릅니다. 문서화된 기본 티어: 조회 100/분, 쓰기 50/분, 삭제 30/분.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 라우트별 정책
    #[serde(default)]
    pub routes: HashMap<String, RoutePolicy>,

    /// 미등록 라우트 기본 정책
    #[serde(default = "default_route_policy")]
    pub default_policy: RoutePolicy,
}

fn default_route_policy() -> RoutePolicy {
    RoutePolicy::per_minute(100)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            default_policy: default_route_policy(),
        }
    }
}

impl RateLimitConfig {
    /// 기본 티어가 채워진 설정 생성
    pub fn with_default_tiers() -> Self {
        let mut routes = HashMap::new();
        routes.insert("read".to_string(), RoutePolicy::per_minute(100));
        routes.insert("write".to_string(), RoutePolicy::per_minute(50));
        routes.insert("delete".to_string(), RoutePolicy::per_minute(30));
        Self {
            routes,
            default_policy: default_route_policy(),
        }
    }
}

/// 실시간 채널 설정
///
/// 백오프 값은 설정이며 고정 상수가 아닙니다.
/// 기본값: 초기 500ms, 배수 2, 상한 8s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 브로드캐스트 서비스 URL
    pub url: String,

    /// 초기 백오프 (밀리초)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// 백오프 배수
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// 최대 백오프 (밀리초)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// 최초 연결 시 즉시 재시도 횟수 (소진 시 error 상태)
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_connect_attempts() -> u32 {
    3
}

impl RealtimeConfig {
    /// URL만 지정하고 나머지는 기본값 사용
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            connect_attempts: default_connect_attempts(),
        }
    }

    /// 초기 백오프
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// 최대 백오프
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoyageConfig {
    /// 도구 서비스 목록
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// 속도 제한 설정
    #[serde(default)]
    pub ratelimit: RateLimitConfig,

    /// 실시간 채널 설정 (없으면 채널 매니저 비활성)
    #[serde(default)]
    pub realtime: Option<RealtimeConfig>,
}
