//! 오케스트레이션 통합 테스트
//!
//! 실제 서브프로세스(sed 에코 서버)를 띄워 stdio 호출 경로 전체를
//! 검증합니다: FIFO 응답 상관, 레이트 리밋 입장 판정, 레지스트리
//! 재사용, 종료 처리.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use voyage_core::OrchestratorContext;
use voyage_foundation::{
    Error, EventBus, EventCategory, RateLimitConfig, RoutePolicy, ServiceConfig, TransportConfig,
    VoyageConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("voyage_core=debug")
        .with_test_writer()
        .try_init();
}

/// 요청을 응답으로 되돌리는 에코 서버
///
/// `{"method":"tools/call","params":{...}}`를 `{"result":{...}}`로
/// 치환하면 요청의 인자가 그대로 결과로 돌아옵니다. 응답 id가 요청
/// id와 일치하므로 상관 검증에 사용합니다.
fn echo_service(name: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        transport: TransportConfig::Stdio {
            command: "sed".to_string(),
            args: vec![
                "-u".to_string(),
                r#"s/"method":"tools\/call","params"/"result"/"#.to_string(),
            ],
            env: HashMap::new(),
        },
        timeout_secs: 5,
        shutdown_grace_secs: 1,
    }
}

fn config(services: Vec<ServiceConfig>, routes: Vec<(&str, u32, u64)>) -> VoyageConfig {
    let mut route_policies = HashMap::new();
    for (route, max_requests, window_secs) in routes {
        route_policies.insert(
            route.to_string(),
            RoutePolicy {
                max_requests,
                window_secs,
            },
        );
    }
    VoyageConfig {
        services,
        ratelimit: RateLimitConfig {
            routes: route_policies,
            default_policy: RoutePolicy::per_minute(100),
        },
        realtime: None,
    }
}

#[tokio::test]
async fn test_invoke_round_trip() -> Result<()> {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let context = OrchestratorContext::new(config(vec![echo_service("geo")], vec![]), events)?;

    let result = context
        .invoke_tool("trips.read", "user-1", "geo", "lookup", json!({"city": "Busan"}))
        .await?;

    assert!(result.success);
    assert_eq!(result.payload["arguments"]["city"], "Busan");
    assert_eq!(result.payload["name"], "lookup");

    context.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_invokes_correlate() -> Result<()> {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let context = Arc::new(OrchestratorContext::new(
        config(vec![echo_service("geo")], vec![]),
        events,
    )?);

    // 한 프로세스로 16개 동시 호출: 각 응답이 자기 요청의 인자를
    // 담고 있어야 함 (교차 배달 없음)
    let mut handles = Vec::new();
    for seq in 0..16u64 {
        let context = Arc::clone(&context);
        handles.push(tokio::spawn(async move {
            let result = context
                .invoke_tool("trips.read", "user-1", "geo", "echo", json!({"seq": seq}))
                .await?;
            anyhow::Ok((seq, result))
        }));
    }

    for handle in handles {
        let (seq, result) = handle.await??;
        assert!(result.success, "Call {} failed: {:?}", seq, result.error);
        assert_eq!(result.payload["arguments"]["seq"], seq);
    }

    context.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_denies_and_reports_retry_after() -> Result<()> {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let mut event_rx = events.receiver();
    let context = OrchestratorContext::new(
        config(vec![echo_service("geo")], vec![("trips.write", 2, 10)]),
        events,
    )?;

    for _ in 0..2 {
        let result = context
            .invoke_tool("trips.write", "user-1", "geo", "save", json!({}))
            .await?;
        assert!(result.success);
    }

    let err = context
        .invoke_tool("trips.write", "user-1", "geo", "save", json!({}))
        .await
        .unwrap_err();
    match err {
        Error::RateLimited { retry_after_secs } => {
            assert!(retry_after_secs >= 1 && retry_after_secs <= 10);
        }
        other => panic!("Expected RateLimited, got {:?}", other),
    }

    // 거부는 관측 이벤트로도 보고됨
    let denied = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            let event = event_rx.recv().await.unwrap();
            if event.kind == "ratelimit.denied" {
                return event;
            }
        }
    })
    .await?;
    assert_eq!(denied.category, EventCategory::RateLimit);
    assert_eq!(denied.detail["principal"], "user-1");

    // 다른 호출자는 영향 없음
    let result = context
        .invoke_tool("trips.write", "user-2", "geo", "save", json!({}))
        .await?;
    assert!(result.success);

    context.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_service_is_config_error() -> Result<()> {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let context = OrchestratorContext::new(config(vec![], vec![]), events)?;

    let err = context
        .invoke_tool("trips.read", "user-1", "flight-search", "search", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    context.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_tool_failure_is_result_not_error() -> Result<()> {
    init_tracing();
    // 존재하지 않는 명령: 기동 실패가 ToolResult 실패로 전달됨
    let broken = ServiceConfig {
        name: "broken".to_string(),
        transport: TransportConfig::Stdio {
            command: "voyage-no-such-binary".to_string(),
            args: vec![],
            env: HashMap::new(),
        },
        timeout_secs: 2,
        shutdown_grace_secs: 1,
    };
    let events = Arc::new(EventBus::new());
    let context = OrchestratorContext::new(config(vec![broken], vec![]), events)?;

    let result = context
        .invoke_tool("trips.read", "user-1", "broken", "anything", json!({}))
        .await?;
    assert!(!result.success);
    assert!(result.error.is_some());

    context.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_is_idempotent() -> Result<()> {
    init_tracing();
    let events = Arc::new(EventBus::new());
    let context = OrchestratorContext::new(config(vec![echo_service("geo")], vec![]), events)?;

    let result = context
        .invoke_tool("trips.read", "user-1", "geo", "ping", json!({}))
        .await?;
    assert!(result.success);

    context.shutdown().await;
    context.shutdown().await;
    assert!(context.registry().live_clients().await.is_empty());
    Ok(())
}
