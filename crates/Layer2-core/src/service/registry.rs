//! Client Registry - 서비스 이름 → 클라이언트 매핑
//!
//! 설정에서 클라이언트를 지연 생성하며 서비스 이름당 살아 있는
//! 클라이언트가 정확히 하나임을 보장합니다.

use super::client::{ClientState, ToolClient};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use voyage_foundation::{CoreEvent, Error, EventBus, EventCategory, Result, ServiceConfig};

/// 클라이언트 레지스트리
///
/// 프로세스 전역 상태이지만 명시적으로 생성/해체되는 컨텍스트 객체로
/// 관리합니다 (테스트마다 새 레지스트리).
pub struct ClientRegistry {
    /// 서비스 설정 (시작 시 고정)
    configs: HashMap<String, ServiceConfig>,

    /// 살아 있는 클라이언트
    clients: RwLock<HashMap<String, Arc<ToolClient>>>,

    /// 관측 이벤트 버스
    events: Arc<EventBus>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("configs", &self.configs)
            .finish_non_exhaustive()
    }
}

impl ClientRegistry {
    /// 설정 목록으로 레지스트리 생성
    ///
    /// 중복 서비스 이름은 시작 시점 설정 에러입니다.
    pub fn new(configs: Vec<ServiceConfig>, events: Arc<EventBus>) -> Result<Self> {
        let mut by_name = HashMap::new();
        for config in configs {
            if by_name.insert(config.name.clone(), config).is_some() {
                return Err(Error::Config(
                    "Duplicate service name in registry".to_string(),
                ));
            }
        }

        Ok(Self {
            configs: by_name,
            clients: RwLock::new(HashMap::new()),
            events,
        })
    }

    /// 서비스 클라이언트 조회 (필요 시 생성)
    ///
    /// 동시 최초 접근에서도 생성은 정확히 한 번입니다 (이중 확인).
    /// `Failed` 상태로 관찰된 클라이언트는 축출하고 원본 설정으로
    /// 재생성합니다 — 실패당 최대 한 번 재시작.
    pub async fn get(&self, name: &str) -> Result<Arc<ToolClient>> {
        // 빠른 경로: 읽기 잠금
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(name) {
                if client.state().await != ClientState::Failed {
                    return Ok(Arc::clone(client));
                }
            }
        }

        // 느린 경로: 쓰기 잠금 + 이중 확인
        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(name) {
            if client.state().await != ClientState::Failed {
                return Ok(Arc::clone(client));
            }

            // 실패한 클라이언트 축출
            warn!("Evicting failed client for service '{}'", name);
            let failed = clients.remove(name);
            if let Some(failed) = failed {
                if let Err(e) = failed.shutdown().await {
                    warn!("Error shutting down failed client '{}': {}", name, e);
                }
            }
            self.events
                .publish(
                    CoreEvent::new("service.evicted", EventCategory::Service)
                        .source(name)
                        .detail(json!({ "reason": "failed" })),
                )
                .await;
        }

        let config = self.configs.get(name).ok_or_else(|| {
            Error::Config(format!("No service configured with name '{}'", name))
        })?;

        let client = Arc::new(ToolClient::new(config.clone(), Arc::clone(&self.events)));
        clients.insert(name.to_string(), Arc::clone(&client));
        info!("Registered client for service '{}'", name);

        Ok(client)
    }

    /// 설정된 서비스 이름 목록
    pub fn configured_services(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// 살아 있는 클라이언트 이름 목록
    pub async fn live_clients(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// 서비스별 상태 조회
    pub async fn statuses(&self) -> Vec<(String, ClientState)> {
        let clients = self.clients.read().await;
        let mut statuses = Vec::with_capacity(clients.len());
        for (name, client) in clients.iter() {
            statuses.push((name.clone(), client.state().await));
        }
        statuses
    }

    /// 모든 클라이언트 종료
    pub async fn shutdown_all(&self) {
        let mut clients = self.clients.write().await;
        for (name, client) in clients.drain() {
            if let Err(e) = client.shutdown().await {
                warn!("Error shutting down service '{}': {}", name, e);
            }
        }
        info!("All service clients stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use voyage_foundation::TransportConfig;

    fn cat_config(name: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            transport: TransportConfig::Stdio {
                command: "cat".to_string(),
                args: vec![],
                env: StdHashMap::new(),
            },
            timeout_secs: 5,
            shutdown_grace_secs: 1,
        }
    }

    #[test]
    fn test_unknown_service_is_config_error() {
        let events = Arc::new(EventBus::new());
        let registry = ClientRegistry::new(vec![], events).unwrap();

        let err = tokio_test::block_on(registry.get("flight-search")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_duplicate_config_rejected() {
        let events = Arc::new(EventBus::new());
        let err =
            ClientRegistry::new(vec![cat_config("geo"), cat_config("geo")], events).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_concurrent_first_lookup_single_client() {
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(
            ClientRegistry::new(vec![cat_config("geo")], events).unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get("geo").await.unwrap()
            }));
        }

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }

        // 전부 같은 인스턴스여야 함
        for client in &clients[1..] {
            assert!(Arc::ptr_eq(&clients[0], client));
        }
        assert_eq!(registry.live_clients().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_returns_same_client() {
        let events = Arc::new(EventBus::new());
        let registry = ClientRegistry::new(vec![cat_config("geo")], events).unwrap();

        let first = registry.get("geo").await.unwrap();
        let second = registry.get("geo").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry.shutdown_all().await;
        assert!(registry.live_clients().await.is_empty());
    }
}
