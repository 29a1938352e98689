//! Service Transport - 전송 계층 구현
//!
//! 도구 서비스와의 통신을 위한 전송 계층
//! - Stdio: 로컬 프로세스와 stdin/stdout 통신 (JSON 라인)
//! - Http: 원격 HTTP JSON 엔드포인트
//!
//! stdio 와이어는 다중화가 없으므로 요청/응답 엄격 교대가 전제입니다.
//! 전송 계층은 mpsc 큐 + 단일 소비자 워커로 이를 강제하며, 큐 도착
//! 순서(FIFO)가 곧 와이어 순서입니다. 전송 계층은 재시도하지 않습니다.

use super::types::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use voyage_foundation::{Error, Result, TransportErrorKind};

/// 요청 큐 용량
const CALL_QUEUE_CAPACITY: usize = 32;

/// Tool Transport trait
///
/// stdio와 HTTP 두 구현으로 닫힌 집합입니다.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// 도구 호출 전송 및 응답 수신
    async fn send(&self, tool: &str, arguments: Value) -> Result<Value>;

    /// 연결 종료 (멱등)
    async fn close(&self) -> Result<()>;

    /// 연결 상태 확인
    fn is_connected(&self) -> bool;
}

/// 큐에 적재되는 호출
struct PendingCall {
    request: JsonRpcRequest,
    reply: oneshot::Sender<Result<Value>>,
}

/// Stdio Transport - 프로세스 기반 통신
///
/// 프로세스의 입출력 스트림은 워커 태스크가 독점 소유합니다.
/// 호출 하나당 쓰기 한 줄, 읽기 한 줄입니다.
pub struct StdioTransport {
    /// 요청 ID 카운터
    request_id: AtomicU64,

    /// 워커로 보내는 호출 큐
    call_tx: mpsc::Sender<PendingCall>,

    /// 자식 프로세스 (종료 시 회수)
    child: Arc<Mutex<Option<Child>>>,

    /// 연결 상태
    connected: Arc<AtomicBool>,

    /// 워커 종료 신호
    shutdown: Arc<Notify>,

    /// 종료 유예 기간
    grace: Duration,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// 새 stdio transport 생성 및 프로세스 시작
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
        grace: Duration,
    ) -> Result<Self> {
        info!("Spawning tool service process: {} {:?}", command, args);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Error::transport(
                TransportErrorKind::Spawn,
                format!("Failed to spawn '{}': {}", command, e),
            )
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::transport(TransportErrorKind::Spawn, "Failed to capture stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::transport(TransportErrorKind::Spawn, "Failed to capture stdout")
        })?;

        let (call_tx, call_rx) = mpsc::channel::<PendingCall>(CALL_QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        let lines = BufReader::new(stdout).lines();
        tokio::spawn(Self::serve(
            stdin,
            lines,
            call_rx,
            Arc::clone(&connected),
            Arc::clone(&shutdown),
            timeout,
        ));

        Ok(Self {
            request_id: AtomicU64::new(1),
            call_tx,
            child: Arc::new(Mutex::new(Some(child))),
            connected,
            shutdown,
            grace,
        })
    }

    /// 단일 소비자 워커 루프
    ///
    /// 큐에서 호출을 하나씩 꺼내 요청 한 줄을 쓰고 응답 한 줄을
    /// 읽습니다. 동시 호출자의 바이트가 와이어에서 섞이지 않는
    /// 근거가 이 루프입니다.
    async fn serve(
        mut stdin: ChildStdin,
        mut lines: Lines<BufReader<ChildStdout>>,
        mut call_rx: mpsc::Receiver<PendingCall>,
        connected: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
        timeout: Duration,
    ) {
        loop {
            let call = tokio::select! {
                _ = shutdown.notified() => break,
                call = call_rx.recv() => match call {
                    Some(call) => call,
                    None => break,
                },
            };

            let line = match serde_json::to_string(&call.request) {
                Ok(line) => line,
                Err(e) => {
                    let _ = call.reply.send(Err(Error::Internal(format!(
                        "Failed to serialize request: {}",
                        e
                    ))));
                    continue;
                }
            };

            debug!("stdio request {}: {}", call.request.id, line);

            if let Err(e) = stdin.write_all(format!("{}\n", line).as_bytes()).await {
                error!("Failed to write to stdin: {}", e);
                connected.store(false, Ordering::SeqCst);
                let _ = call.reply.send(Err(Error::transport(
                    TransportErrorKind::Write,
                    format!("Failed to write request: {}", e),
                )));
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                connected.store(false, Ordering::SeqCst);
                let _ = call.reply.send(Err(Error::transport(
                    TransportErrorKind::Write,
                    format!("Failed to flush request: {}", e),
                )));
                break;
            }

            let reply = Self::read_response(&mut lines, call.request.id, timeout).await;
            let stream_closed = matches!(
                reply.as_ref().err().and_then(|e| e.transport_kind()),
                Some(TransportErrorKind::Read)
            );
            let _ = call.reply.send(reply);

            if stream_closed {
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }

        // 워커 종료 시 stdin이 드롭되어 프로세스에 EOF가 전달됨
        debug!("stdio worker finished");
    }

    /// 현재 요청의 응답이 나올 때까지 읽기
    ///
    /// 타임아웃으로 버려진 이전 호출의 늦은 응답(더 작은 id)만
    /// 건너뜁니다. 엄격 교대 프레이밍에서 다음 줄은 응답이어야
    /// 하므로 파싱 불가 라인은 즉시 프로토콜 에러입니다.
    async fn read_response(
        lines: &mut Lines<BufReader<ChildStdout>>,
        id: u64,
        timeout: Duration,
    ) -> Result<Value> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::transport(
                    TransportErrorKind::Timeout,
                    format!("No response within {:?}", timeout),
                ));
            }

            let line = match tokio::time::timeout(remaining, lines.next_line()).await {
                Err(_) => {
                    return Err(Error::transport(
                        TransportErrorKind::Timeout,
                        format!("No response within {:?}", timeout),
                    ));
                }
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    return Err(Error::transport(
                        TransportErrorKind::Read,
                        "stdout closed",
                    ));
                }
                Ok(Err(e)) => {
                    return Err(Error::transport(
                        TransportErrorKind::Read,
                        format!("Failed to read response: {}", e),
                    ));
                }
            };

            let response = match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) => response,
                Err(e) => {
                    return Err(Error::Protocol(format!(
                        "Malformed response line: {}",
                        e
                    )));
                }
            };

            match response.id {
                Some(rid) if rid == id => {
                    if let Some(error) = response.error {
                        return Err(Error::Internal(format!(
                            "Service error {}: {}",
                            error.code, error.message
                        )));
                    }
                    return Ok(response.result.unwrap_or(Value::Null));
                }
                Some(rid) if rid < id => {
                    debug!("Discarding stale response for request {}", rid);
                    continue;
                }
                _ => {
                    debug!("Ignoring unmatched response line");
                    continue;
                }
            }
        }
    }

    /// 다음 요청 ID 생성
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn send(&self, tool: &str, arguments: Value) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::transport(
                TransportErrorKind::Closed,
                "stdio transport not connected",
            ));
        }

        let id = self.next_id();
        let params = json!({ "name": tool, "arguments": arguments });
        let request = JsonRpcRequest::new(id, "tools/call", Some(params));

        let (tx, rx) = oneshot::channel();
        self.call_tx
            .send(PendingCall { request, reply: tx })
            .await
            .map_err(|_| {
                Error::transport(TransportErrorKind::Closed, "stdio worker stopped")
            })?;

        // 워커가 타임아웃을 강제하므로 여기서는 응답만 기다림
        rx.await.map_err(|_| {
            Error::transport(TransportErrorKind::Closed, "stdio worker dropped the call")
        })?
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            // 유예 기간 내 자발적 종료를 기다린 뒤 강제 종료
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => debug!("stdio process exited: {}", status),
                Ok(Err(e)) => warn!("Failed to wait for stdio process: {}", e),
                Err(_) => {
                    warn!("stdio process did not exit within grace period, killing");
                    let _ = child.kill().await;
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// HTTP Transport - 원격 JSON 엔드포인트 통신
///
/// 호출마다 `{base_url}/tools/{tool}`에 JSON POST 한 번입니다.
/// 독립 연결이므로 동시 호출에 제한이 없습니다.
pub struct HttpTransport {
    /// 베이스 URL (끝 슬래시 제거됨)
    base_url: String,

    /// HTTP 클라이언트
    client: reqwest::Client,

    /// 연결 상태
    connected: AtomicBool,
}

impl HttpTransport {
    /// HTTP transport 생성
    pub fn connect(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::transport(
                    TransportErrorKind::Connect,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn send(&self, tool: &str, arguments: Value) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::transport(
                TransportErrorKind::Closed,
                "http transport closed",
            ));
        }

        let url = format!("{}/tools/{}", self.base_url, tool);
        debug!("HTTP request: POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&arguments)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::transport(
                        TransportErrorKind::Timeout,
                        format!("No response from {} within timeout", url),
                    )
                } else {
                    Error::transport(
                        TransportErrorKind::Connect,
                        format!("Failed to reach {}: {}", url, e),
                    )
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(
                TransportErrorKind::HttpStatus,
                format!("{} returned {}: {}", url, status, body),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Protocol(format!("Invalid JSON response from {}: {}", url, e)))
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_kind() {
        let err = StdioTransport::spawn(
            "voyage-definitely-missing-command",
            &[],
            &HashMap::new(),
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Spawn));
    }

    #[tokio::test]
    async fn test_cat_echo_round_trip() {
        // cat은 요청 라인을 그대로 돌려준다. 요청에는 result/error가
        // 없으므로 Null 성공으로 해석된다.
        let transport = StdioTransport::spawn(
            "cat",
            &[],
            &HashMap::new(),
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
        .await
        .unwrap();

        let result = transport.send("echo", json!({"n": 1})).await.unwrap();
        assert_eq!(result, Value::Null);
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        // 멱등 종료
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_timeout_kind() {
        // sleep은 stdin을 읽지 않고 응답도 쓰지 않음
        let transport = StdioTransport::spawn(
            "sleep",
            &["30".to_string()],
            &HashMap::new(),
            Duration::from_millis(200),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let err = transport.send("noop", Value::Null).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let transport = StdioTransport::spawn(
            "cat",
            &[],
            &HashMap::new(),
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        transport.close().await.unwrap();
        let err = transport.send("echo", Value::Null).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Closed));
    }

    #[tokio::test]
    async fn test_malformed_response_is_protocol_error() {
        // 응답 자리에 JSON이 아닌 라인을 내보내는 서비스
        let transport = StdioTransport::spawn(
            "sed",
            &["-u".to_string(), "s/.*/garbage not json/".to_string()],
            &HashMap::new(),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let err = transport.send("noop", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
        // 타임아웃을 소진하지 않고 즉시 실패해야 함
        assert!(started.elapsed() < Duration::from_secs(2));

        transport.close().await.unwrap();
    }

    /// 단발 HTTP 응답 서버 (테스트용)
    async fn http_server_with_response(response: &'static str) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_error_status_kind() {
        let base = http_server_with_response(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        )
        .await;
        let transport = HttpTransport::connect(&base, Duration::from_secs(2)).unwrap();

        let err = transport.send("search", json!({})).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::HttpStatus));
        // 상태 코드와 본문이 상세에 포함됨
        let detail = err.to_string();
        assert!(detail.contains("500"));
        assert!(detail.contains("boom"));
    }

    #[tokio::test]
    async fn test_http_timeout_kind() {
        use tokio::io::AsyncReadExt;

        // 요청은 받지만 응답하지 않는 서버
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(Duration::from_secs(10)).await;
                drop(socket);
            }
        });

        let transport =
            HttpTransport::connect(&format!("http://{}", addr), Duration::from_millis(300))
                .unwrap();

        let err = transport.send("search", json!({})).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_http_invalid_json_is_protocol_error() {
        let base = http_server_with_response(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nnot json",
        )
        .await;
        let transport = HttpTransport::connect(&base, Duration::from_secs(2)).unwrap();

        let err = transport.send("search", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }
}
