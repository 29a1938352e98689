//! Service Types - 도구 호출 관련 타입 정의

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 요청
///
/// stdio 전송의 프레이밍: 요청 한 줄, 응답 한 줄. `id`가 요청과
/// 응답을 연관시킵니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 에러
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// 도구 호출
///
/// 호출마다 생성되며 영속화되지 않습니다. `request_id`는 관측
/// 이벤트에서 요청을 식별하는 데 사용됩니다.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// 도구 이름
    pub tool: String,

    /// 인자
    pub arguments: Value,

    /// 호출 상관 ID
    pub request_id: uuid::Uuid,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            request_id: uuid::Uuid::new_v4(),
        }
    }
}

/// 도구 호출 결과
///
/// 호출자에게 항상 이 타입으로 반환됩니다. 내부에서 재시도하지
/// 않으며 재시도 정책은 호출자 소관입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// 성공 여부
    pub success: bool,

    /// 결과 페이로드 (성공 시)
    #[serde(default)]
    pub payload: Value,

    /// 에러 상세 (실패 시)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// 성공 결과 생성
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    /// 실패 결과 생성
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Value::Null,
            error: Some(detail.into()),
        }
    }
}
