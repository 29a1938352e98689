//! Config Loader - TOML 파일 + 환경 변수 오버라이드

use super::types::VoyageConfig;
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 실시간 채널 URL 오버라이드
const ENV_REALTIME_URL: &str = "VOYAGE_REALTIME_URL";

/// 설정 로더
///
/// 프로세스 수명 동안 한 번만 사용됩니다. 유효하지 않은 설정은
/// 시작 시점에 `Error::Config`로 실패합니다.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// 설정 파일 경로로 로더 생성
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 설정 로드 및 검증
    pub fn load(&self) -> Result<VoyageConfig> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let mut config: VoyageConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Invalid config file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        apply_env_overrides(&mut config);
        validate(&config)?;

        info!(
            "Loaded config: {} services, {} route policies",
            config.services.len(),
            config.ratelimit.routes.len()
        );

        Ok(config)
    }
}

/// 환경 변수 오버라이드 적용
fn apply_env_overrides(config: &mut VoyageConfig) {
    if let Ok(url) = std::env::var(ENV_REALTIME_URL) {
        debug!("Overriding realtime URL from {}", ENV_REALTIME_URL);
        match config.realtime.as_mut() {
            Some(realtime) => realtime.url = url,
            None => config.realtime = Some(super::RealtimeConfig::new(url)),
        }
    }
}

/// 설정 검증
///
/// 서비스 이름은 비어 있을 수 없고 중복될 수 없습니다
/// (서비스당 클라이언트 하나 불변식).
fn validate(config: &VoyageConfig) -> Result<()> {
    let mut names = HashSet::new();
    for service in &config.services {
        if service.name.is_empty() {
            return Err(Error::Config("Service name cannot be empty".to_string()));
        }
        if !names.insert(service.name.as_str()) {
            return Err(Error::Config(format!(
                "Duplicate service name: '{}'",
                service.name
            )));
        }
        if service.timeout_secs == 0 {
            return Err(Error::Config(format!(
                "Service '{}': timeout_secs must be positive",
                service.name
            )));
        }
    }

    for (route, policy) in &config.ratelimit.routes {
        if policy.max_requests == 0 || policy.window_secs == 0 {
            return Err(Error::Config(format!(
                "Route '{}': max_requests and window_secs must be positive",
                route
            )));
        }
    }

    Ok(())
}
