//! Channel Manager - 연결 상태 머신과 재연결 루프
//!
//! 매니저 핸들은 명령 채널로 감독 태스크와 통신합니다. 연결, 구독
//! 등록, 재연결, 종료가 모두 명령이며 상태 전이는 감독 태스크
//! 안에서만 일어납니다.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voyage_foundation::{CoreEvent, Error, EventBus, EventCategory, EventSeverity, RealtimeConfig};

use super::subscription::ChannelSubscription;
use super::transport::{RealtimeSession, RealtimeTransport, SseRealtimeTransport};
use super::types::{ConnectionState, LastError};

/// 감독 태스크 명령
enum Command {
    Connect,
    Join(String),
    ReconnectAll,
    Shutdown,
}

/// 채널 매니저
///
/// 논리 연결 하나를 소유합니다. 구독은 `Arc<ChannelSubscription>`으로
/// 반환되며 매니저는 약한 참조만 보관합니다 — 호출자가 핸들을 버리면
/// 구독도 사라집니다.
pub struct ChannelManager {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    subscriptions: Arc<RwLock<HashMap<String, Weak<ChannelSubscription>>>>,
    last_error: Arc<Mutex<Option<LastError>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    /// SSE 전송으로 매니저 생성
    pub fn new(config: RealtimeConfig, events: Arc<EventBus>) -> Self {
        let transport = Arc::new(SseRealtimeTransport::new(config.url.clone()));
        Self::with_transport(config, transport, events)
    }

    /// 지정한 전송으로 매니저 생성 (테스트에서 가짜 전송 주입용)
    pub fn with_transport(
        config: RealtimeConfig,
        transport: Arc<dyn RealtimeTransport>,
        events: Arc<EventBus>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let last_error = Arc::new(Mutex::new(None));

        let supervisor = Supervisor {
            config,
            transport,
            commands: command_rx,
            state_tx,
            subscriptions: Arc::clone(&subscriptions),
            last_error: Arc::clone(&last_error),
            events,
        };
        let handle = tokio::spawn(supervisor.run());

        Self {
            commands: command_tx,
            state_rx,
            subscriptions,
            last_error,
            supervisor: Mutex::new(Some(handle)),
        }
    }

    /// 현재 연결 상태
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// 상태 변화 관찰용 수신기
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 마지막 연결 에러
    pub fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().clone()
    }

    /// 연결 시작 (이미 연결 중이면 무시)
    pub async fn connect(&self) {
        let _ = self.commands.send(Command::Connect).await;
    }

    /// 토픽 구독
    ///
    /// 연결 여부와 무관하게 즉시 반환합니다. 구독 등록은 연결된 뒤
    /// (또는 재연결 때마다) 감독 태스크가 수행합니다.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Arc<ChannelSubscription> {
        let topic = topic.into();
        let subscription = Arc::new(ChannelSubscription::new(topic.clone(), auth_token));
        self.subscriptions
            .write()
            .insert(topic.clone(), Arc::downgrade(&subscription));
        let _ = self.commands.send(Command::Join(topic)).await;
        subscription
    }

    /// 강제 재연결 (`error` 상태 복구 포함, 백오프 초기화)
    pub async fn reconnect_all(&self) {
        let _ = self.commands.send(Command::ReconnectAll).await;
    }

    /// 매니저 종료. 멱등.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// 연결 루프 종료 사유
enum Exit {
    /// 즉시 재시도 소진 → `error` 상태
    Fatal,
    /// 종료 명령 수신
    Shutdown,
}

/// 백오프 대기 결과
enum Waited {
    /// 대기 완료, 다음 시도 진행
    Elapsed,
    /// 재연결 명령으로 대기 중단 (백오프 초기화됨)
    Immediate,
    /// 종료 명령 수신
    Shutdown,
}

struct Supervisor {
    config: RealtimeConfig,
    transport: Arc<dyn RealtimeTransport>,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions: Arc<RwLock<HashMap<String, Weak<ChannelSubscription>>>>,
    last_error: Arc<Mutex<Option<LastError>>>,
    events: Arc<EventBus>,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            // 유휴: disconnected/error 상태에서 명령 대기
            match self.commands.recv().await {
                None | Some(Command::Shutdown) => break,
                Some(Command::Connect) | Some(Command::ReconnectAll) => {
                    match self.drive().await {
                        Exit::Shutdown => break,
                        Exit::Fatal => {
                            self.set_state(ConnectionState::Error).await;
                            // 유휴로 복귀, reconnect_all로만 재개 가능
                        }
                    }
                }
                // 연결 전 구독 등록은 연결 시 일괄 처리됨
                Some(Command::Join(_)) => continue,
            }
        }
        self.set_state(ConnectionState::Disconnected).await;
        info!("Channel manager stopped");
    }

    /// 연결 유지 루프
    ///
    /// 최초 연결은 `connect_attempts`회 즉시 재시도 후 실패하면
    /// `Fatal`입니다. 한 번이라도 연결된 뒤의 끊김은 백오프를 두 배씩
    /// 늘려 가며 (상한까지) 무기한 재시도합니다.
    async fn drive(&mut self) -> Exit {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut reconnecting = false;

        loop {
            self.set_state(ConnectionState::Connecting).await;

            let session = if reconnecting {
                match self.transport.connect().await {
                    Ok(session) => session,
                    Err(e) => {
                        self.record_error(&e).await;
                        match self.wait_backoff(&mut backoff).await {
                            Waited::Elapsed | Waited::Immediate => continue,
                            Waited::Shutdown => return Exit::Shutdown,
                        }
                    }
                }
            } else {
                match self.connect_initial().await {
                    Some(session) => session,
                    None => return Exit::Fatal,
                }
            };

            let mut session = session;
            if let Err(e) = self.rejoin_all(session.as_mut()).await {
                self.record_error(&e).await;
                reconnecting = true;
                match self.wait_backoff(&mut backoff).await {
                    Waited::Elapsed | Waited::Immediate => continue,
                    Waited::Shutdown => return Exit::Shutdown,
                }
            }

            // 연결 성공: 백오프 초기화
            backoff = Duration::from_millis(self.config.initial_backoff_ms);
            reconnecting = true;
            self.set_state(ConnectionState::Connected).await;

            match self.pump(session).await {
                Pump::Shutdown => return Exit::Shutdown,
                Pump::Reconnect => {
                    backoff = Duration::from_millis(self.config.initial_backoff_ms);
                    continue;
                }
                Pump::Closed => match self.wait_backoff(&mut backoff).await {
                    Waited::Elapsed | Waited::Immediate => continue,
                    Waited::Shutdown => return Exit::Shutdown,
                },
            }
        }
    }

    /// 최초 연결: 즉시 재시도 `connect_attempts`회
    async fn connect_initial(&mut self) -> Option<Box<dyn RealtimeSession>> {
        for attempt in 1..=self.config.connect_attempts.max(1) {
            match self.transport.connect().await {
                Ok(session) => return Some(session),
                Err(e) => {
                    warn!(
                        "Realtime connect attempt {}/{} failed: {}",
                        attempt, self.config.connect_attempts, e
                    );
                    self.record_error(&e).await;
                }
            }
        }
        None
    }

    /// 이벤트 펌프: 수신 이벤트 전달과 명령 처리를 병행
    async fn pump(&mut self, mut session: Box<dyn RealtimeSession>) -> Pump {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Pump::Shutdown,
                    Some(Command::ReconnectAll) => return Pump::Reconnect,
                    Some(Command::Connect) => continue,
                    Some(Command::Join(topic)) => {
                        let token = self.auth_token_for(&topic);
                        if let Some(token) = token {
                            if let Err(e) = session.join(&topic, &token).await {
                                warn!("Join failed for topic '{}': {}", topic, e);
                                self.record_error(&e).await;
                            }
                        }
                    }
                },
                event = session.next_event() => match event {
                    Some(event) => self.dispatch(&event),
                    None => {
                        debug!("Realtime stream closed, entering reconnect");
                        return Pump::Closed;
                    }
                },
            }
        }
    }

    /// 백오프 대기. 대기 중에도 종료/재연결 명령에는 즉시 반응.
    async fn wait_backoff(&mut self, backoff: &mut Duration) -> Waited {
        let delay = *backoff;
        let next_ms = (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64;
        *backoff = Duration::from_millis(next_ms.min(self.config.max_backoff_ms));

        self.set_state(ConnectionState::Reconnecting).await;
        self.events
            .publish(
                CoreEvent::new("realtime.reconnecting", EventCategory::Realtime)
                    .severity(EventSeverity::Warning)
                    .detail(json!({ "backoff_ms": delay.as_millis() as u64 })),
            )
            .await;

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Waited::Elapsed,
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Waited::Shutdown,
                    Some(Command::ReconnectAll) => {
                        *backoff = Duration::from_millis(self.config.initial_backoff_ms);
                        return Waited::Immediate;
                    }
                    // 연결되면 일괄 재등록되므로 대기 중 Join은 무시
                    Some(Command::Connect) | Some(Command::Join(_)) => continue,
                },
            }
        }
    }

    /// 살아 있는 구독 전체를 세션에 재등록
    async fn rejoin_all(&mut self, session: &mut dyn RealtimeSession) -> voyage_foundation::Result<()> {
        let topics: Vec<(String, String)> = {
            let mut subscriptions = self.subscriptions.write();
            subscriptions.retain(|_, weak| weak.strong_count() > 0);
            subscriptions
                .values()
                .filter_map(|weak| weak.upgrade())
                .map(|sub| (sub.topic().to_string(), sub.auth_token().to_string()))
                .collect()
        };

        for (topic, token) in topics {
            session.join(&topic, &token).await?;
            debug!("Rejoined topic '{}'", topic);
        }
        Ok(())
    }

    /// 수신 이벤트를 토픽 구독으로 전달 (구독 없으면 버림)
    fn dispatch(&self, event: &super::types::RealtimeEvent) {
        let subscription = {
            let subscriptions = self.subscriptions.read();
            subscriptions.get(&event.topic).and_then(Weak::upgrade)
        };
        match subscription {
            Some(subscription) => subscription.dispatch(event),
            None => {
                // 죽은 구독 정리
                self.subscriptions
                    .write()
                    .retain(|_, weak| weak.strong_count() > 0);
            }
        }
    }

    fn auth_token_for(&self, topic: &str) -> Option<String> {
        self.subscriptions
            .read()
            .get(topic)
            .and_then(Weak::upgrade)
            .map(|sub| sub.auth_token().to_string())
    }

    async fn set_state(&self, state: ConnectionState) {
        let changed = {
            let previous = *self.state_tx.borrow();
            previous != state
        };
        if !changed {
            return;
        }
        let _ = self.state_tx.send(state);
        self.events
            .publish(
                CoreEvent::new(
                    format!("realtime.{}", state.as_str()),
                    EventCategory::Realtime,
                )
                .severity(match state {
                    ConnectionState::Error => EventSeverity::Error,
                    ConnectionState::Reconnecting => EventSeverity::Warning,
                    _ => EventSeverity::Info,
                }),
            )
            .await;
    }

    async fn record_error(&self, error: &Error) {
        *self.last_error.lock() = Some(LastError {
            detail: error.to_string(),
            at: chrono::Utc::now(),
        });
        self.events
            .publish(
                CoreEvent::new("realtime.connect_failed", EventCategory::Realtime)
                    .severity(EventSeverity::Warning)
                    .detail(json!({ "error": error.to_string() })),
            )
            .await;
    }
}

/// 펌프 종료 사유
enum Pump {
    /// 스트림 끊김 → 백오프 재연결
    Closed,
    /// 재연결 명령 → 즉시 재연결
    Reconnect,
    /// 종료 명령
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::types::RealtimeEvent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc as tokio_mpsc;

    /// 시나리오 재현용 가짜 전송: 연결 결과를 스크립트로 소비
    struct ScriptedTransport {
        connects: AtomicUsize,
        fail_first: usize,
        sessions: Mutex<Vec<FakeSession>>,
    }

    struct FakeSession {
        events: tokio_mpsc::UnboundedReceiver<Option<RealtimeEvent>>,
    }

    #[async_trait]
    impl RealtimeTransport for ScriptedTransport {
        async fn connect(&self) -> voyage_foundation::Result<Box<dyn RealtimeSession>> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(Error::Connection("Refused".to_string()));
            }
            let session = self.sessions.lock().pop();
            match session {
                Some(session) => Ok(Box::new(session)),
                None => Err(Error::Connection("No more sessions".to_string())),
            }
        }
    }

    #[async_trait]
    impl RealtimeSession for FakeSession {
        async fn join(&mut self, _topic: &str, _auth_token: &str) -> voyage_foundation::Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> Option<RealtimeEvent> {
            self.events.recv().await.flatten()
        }
    }

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            url: "http://localhost:4000/sse".to_string(),
            initial_backoff_ms: 10,
            backoff_multiplier: 2.0,
            max_backoff_ms: 40,
            connect_attempts: 2,
        }
    }

    fn session_pair() -> (
        FakeSession,
        tokio_mpsc::UnboundedSender<Option<RealtimeEvent>>,
    ) {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        (FakeSession { events: rx }, tx)
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ConnectionState>,
        target: ConnectionState,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *rx.borrow() == target {
                    return;
                }
                if rx.changed().await.is_err() {
                    panic!("State channel closed before reaching {:?}", target);
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {:?}", target));
    }

    #[tokio::test]
    async fn test_connect_and_dispatch() {
        let (session, events_tx) = session_pair();
        let transport = Arc::new(ScriptedTransport {
            connects: AtomicUsize::new(0),
            fail_first: 0,
            sessions: Mutex::new(vec![session]),
        });
        let bus = Arc::new(EventBus::new());
        let manager = ChannelManager::with_transport(config(), transport, bus);

        let received = Arc::new(AtomicUsize::new(0));
        let subscription = manager.subscribe("trip:42", "token").await;
        let counter = Arc::clone(&received);
        subscription.on("updated", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.connect().await;
        let mut state = manager.watch_state();
        wait_for_state(&mut state, ConnectionState::Connected).await;

        events_tx
            .send(Some(RealtimeEvent {
                topic: "trip:42".to_string(),
                event: "updated".to_string(),
                payload: serde_json::json!({}),
            }))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while received.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnects_after_drop_without_reregistration() {
        let (first, first_tx) = session_pair();
        let (second, second_tx) = session_pair();
        let transport = Arc::new(ScriptedTransport {
            connects: AtomicUsize::new(0),
            fail_first: 0,
            // pop()은 뒤에서 꺼내므로 역순으로 쌓음
            sessions: Mutex::new(vec![second, first]),
        });
        let bus = Arc::new(EventBus::new());
        let manager = ChannelManager::with_transport(config(), transport, bus);

        let received = Arc::new(AtomicUsize::new(0));
        let subscription = manager.subscribe("trip:42", "token").await;
        let counter = Arc::clone(&received);
        subscription.on("updated", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.connect().await;
        let mut state = manager.watch_state();
        wait_for_state(&mut state, ConnectionState::Connected).await;

        // 스트림 끊김 → 자동 재연결
        first_tx.send(None).unwrap();
        wait_for_state(&mut state, ConnectionState::Reconnecting).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        // 재등록 없이 기존 핸들러로 이벤트 수신
        second_tx
            .send(Some(RealtimeEvent {
                topic: "trip:42".to_string(),
                event: "updated".to_string(),
                payload: serde_json::json!({}),
            }))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while received.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_exhausted_initial_attempts_enter_error_state() {
        let (session, _events_tx) = session_pair();
        let transport = Arc::new(ScriptedTransport {
            connects: AtomicUsize::new(0),
            fail_first: 2, // connect_attempts와 동일: 최초 연결 전부 실패
            sessions: Mutex::new(vec![session]),
        });
        let bus = Arc::new(EventBus::new());
        let manager = ChannelManager::with_transport(config(), transport.clone(), bus);

        manager.connect().await;
        let mut state = manager.watch_state();
        wait_for_state(&mut state, ConnectionState::Error).await;
        assert!(manager.last_error().is_some());

        // 수동 재연결로 복구
        manager.reconnect_all().await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_backoff_doubles_between_attempts() {
        // 최초 연결 성공 후 끊기고, 이후 연결은 계속 실패
        let (session, events_tx) = session_pair();
        let transport = Arc::new(ScriptedTransport {
            connects: AtomicUsize::new(0),
            fail_first: 0,
            sessions: Mutex::new(vec![session]),
        });
        let bus = Arc::new(EventBus::new());
        let mut event_rx = bus.receiver();
        let manager = ChannelManager::with_transport(config(), transport, bus);

        manager.connect().await;
        let mut state = manager.watch_state();
        wait_for_state(&mut state, ConnectionState::Connected).await;

        events_tx.send(None).unwrap();

        // 백오프 이벤트의 대기 시간이 10 → 20 → 40(상한) ms로 증가
        let mut backoffs = Vec::new();
        while backoffs.len() < 4 {
            let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.kind == "realtime.reconnecting" {
                backoffs.push(event.detail["backoff_ms"].as_u64().unwrap());
            }
        }
        assert_eq!(backoffs, vec![10, 20, 40, 40]);

        manager.shutdown().await;
    }
}
