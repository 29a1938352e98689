//! Service - 외부 도구 서비스 연동
//!
//! 특화 도구를 제공하는 외부 서비스를 두 가지 전송으로 호출합니다.
//!
//! ## 기능
//! - 전송 계층 추상화 (stdio / HTTP)
//! - 서비스별 클라이언트와 프로세스 생명주기 관리
//! - 서비스 이름 → 클라이언트 레지스트리 (지연 생성)
//!
//! ## 지원 전송
//! - stdio (로컬 프로세스, JSON 라인)
//! - HTTP (원격 JSON 엔드포인트)

mod client;
mod registry;
mod transport;
mod types;

pub use client::{ClientState, ToolClient};
pub use registry::ClientRegistry;
pub use transport::{HttpTransport, StdioTransport, ToolTransport};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolInvocation, ToolResult};
