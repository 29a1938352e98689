//! Realtime Transport - SSE 연결 추상화
//!
//! 매니저는 `RealtimeTransport` 트레이트로만 연결을 다루므로 테스트에서
//! 가짜 전송으로 끊김/재연결 시나리오를 재현할 수 있습니다.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::json;
use tracing::{debug, warn};
use voyage_foundation::{Error, Result, TransportErrorKind};

use super::types::RealtimeEvent;

/// 실시간 연결 팩토리
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// 브로드캐스트 서비스에 연결하고 핸드셰이크 완료까지 대기
    async fn connect(&self) -> Result<Box<dyn RealtimeSession>>;
}

/// 살아 있는 실시간 연결 하나
#[async_trait]
pub trait RealtimeSession: Send {
    /// 토픽 구독 등록 (같은 토픽 재등록은 무해)
    async fn join(&mut self, topic: &str, auth_token: &str) -> Result<()>;

    /// 다음 이벤트 수신. `None`이면 연결이 끊긴 것입니다.
    async fn next_event(&mut self) -> Option<RealtimeEvent>;
}

/// SSE 기반 실시간 전송
///
/// 이벤트 스트림은 `{url}` GET(SSE), 구독 등록은 `{base}/join` POST로
/// 처리합니다.
pub struct SseRealtimeTransport {
    url: String,
    client: reqwest::Client,
}

impl SseRealtimeTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// 구독 등록 엔드포인트 (SSE URL과 같은 베이스)
    fn join_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let base = base.strip_suffix("/sse").unwrap_or(base);
        format!("{}/join", base)
    }
}

#[async_trait]
impl RealtimeTransport for SseRealtimeTransport {
    async fn connect(&self) -> Result<Box<dyn RealtimeSession>> {
        let request = self.client.get(&self.url);
        let mut source = EventSource::new(request)
            .map_err(|e| Error::transport(TransportErrorKind::Connect, e.to_string()))?;

        // Open 이벤트까지가 핸드셰이크
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {}
            Some(Err(e)) => {
                return Err(Error::transport(TransportErrorKind::Connect, e.to_string()));
            }
            None => {
                return Err(Error::transport(
                    TransportErrorKind::Connect,
                    "Event stream closed during handshake".to_string(),
                ));
            }
        }

        debug!("SSE stream connected: {}", self.url);
        Ok(Box::new(SseSession {
            source,
            client: self.client.clone(),
            join_url: self.join_url(),
        }))
    }
}

struct SseSession {
    source: EventSource,
    client: reqwest::Client,
    join_url: String,
}

#[async_trait]
impl RealtimeSession for SseSession {
    async fn join(&mut self, topic: &str, auth_token: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.join_url)
            .json(&json!({ "topic": topic, "token": auth_token }))
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Join request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Connection(format!(
                "Join rejected for topic '{}': HTTP {}",
                topic,
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.source.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => {
                    match serde_json::from_str::<RealtimeEvent>(&message.data) {
                        Ok(event) => return Some(event),
                        Err(e) => {
                            // 잘못된 프레임은 버리고 스트림은 유지
                            warn!("Dropping malformed realtime frame: {}", e);
                            continue;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!("SSE stream error, treating as disconnect: {}", e);
                    return None;
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_strips_sse_suffix() {
        let transport = SseRealtimeTransport::new("http://localhost:4000/realtime/sse");
        assert_eq!(transport.join_url(), "http://localhost:4000/realtime/join");

        let transport = SseRealtimeTransport::new("http://localhost:4000/events/");
        assert_eq!(transport.join_url(), "http://localhost:4000/events/join");
    }
}
