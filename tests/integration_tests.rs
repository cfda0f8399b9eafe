//! Integration tests for the ByteForge client.
//!
//! Each test runs a throwaway HTTP/1.1 server on localhost that answers from
//! a fixed route table and records what it was sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use byteforge::chat::{ChatConfig, ChatSession, Renderer};
use byteforge::{
    ByteForge, CONNECTION_LOST_NOTICE, ClientLogger, ConversationId, DonePayload, MessageRole,
    PAYMENT_REQUIRED_NOTICE, Persona, SendRefusal, StreamFrame, StreamRequest, TurnOutcome,
};

#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

#[derive(Clone)]
enum Reply {
    Json(u16, Value),
    /// An event stream written in these chunks, with a pause between them.
    Stream(Vec<String>),
}

struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    async fn start(routes: Vec<(&str, &str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: HashMap<(String, String), Reply> = routes
            .into_iter()
            .map(|(method, path, reply)| ((method.to_string(), path.to_string()), reply))
            .collect();
        let routes = Arc::new(routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    serve(socket, &routes, &recorded).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}/api/"),
            requests,
        }
    }

    fn client(&self) -> ByteForge {
        ByteForge::with_options(
            Some("test-token".to_string()),
            Some(self.base_url.clone()),
            Some(Duration::from_secs(5)),
        )
        .unwrap()
    }

    fn session(&self) -> ChatSession<ByteForge> {
        ChatSession::new(self.client(), ChatConfig::new().with_model("openai/gpt-4o"))
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: &HashMap<(String, String), Reply>,
    recorded: &Mutex<Vec<Recorded>>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let path = request.path.split('?').next().unwrap_or("").to_string();
    let reply = routes
        .get(&(request.method.clone(), path))
        .cloned()
        .unwrap_or_else(|| Reply::Json(404, json!({"detail": "Not found."})));
    recorded.lock().unwrap().push(request);

    match reply {
        Reply::Json(status, body) => {
            let body = body.to_string();
            let head = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        }
        Reply::Stream(chunks) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                        Connection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for chunk in chunks {
                let _ = socket.write_all(chunk.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(Recorded {
        method,
        path,
        headers,
        body,
    })
}

#[derive(Default)]
struct CapturingRenderer {
    text: String,
    errors: Vec<String>,
}

impl Renderer for CapturingRenderer {
    fn print_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn finish_response(&mut self) {}

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, _: &str) {}
}

fn done_frame(answer: &str, total: i64) -> String {
    let frame = json!({
        "type": "done",
        "user_message": {
            "id": 101,
            "role": "user",
            "content": "Explain recursion",
            "created_at": "2025-01-01T12:00:00Z"
        },
        "assistant_message": {
            "id": 102,
            "role": "assistant",
            "content": answer,
            "created_at": "2025-01-01T12:00:02Z"
        },
        "conversation": {"id": 42, "title": "Recursion"},
        "token_usage": {
            "total_tokens_used": total,
            "token_limit": 20000,
            "remaining_tokens": 20000 - total,
            "usage_percentage": total as f64 / 200.0
        }
    });
    format!("data: {frame}\n\n")
}

#[tokio::test]
async fn streamed_turn_end_to_end() {
    let server = MockServer::start(vec![(
        "POST",
        "/api/chat/stream/",
        Reply::Stream(vec![
            "data: {\"type\":\"token\",\"content\":\"Recu\"}\n\ndata: {\"type\":\"tok".to_string(),
            "en\",\"content\":\"rsion \"}\n\n".to_string(),
            ": keep-alive\n\ndata: {\"type\":\"token\",\"content\":\"is...\"}\n\n".to_string(),
            done_frame("Recursion is...", 37),
        ]),
    )])
    .await;

    let mut session = server.session();
    session.set_persona(Persona::Developer);
    let mut renderer = CapturingRenderer::default();
    let outcome = session
        .send_streaming("Explain recursion", &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            conversation_id: ConversationId::new("42"),
            assistant_message_id: "102".into(),
        }
    );
    assert_eq!(renderer.text, "Recursion is...");
    assert!(renderer.errors.is_empty());

    let messages = session.state().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].id.as_str(), "101");
    assert_eq!(messages[1].content, "Recursion is...");
    assert_eq!(session.state().usage().total_tokens_used, 37);
    assert_eq!(session.state().title(), Some("Recursion"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer test-token")
    );
    assert_eq!(
        request.headers.get("accept").map(String::as_str),
        Some("text/event-stream")
    );
    let body = request.json();
    assert_eq!(body["message"], "Explain recursion");
    assert_eq!(body["model"], "openai/gpt-4o");
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["persona"], "developer");
    assert!(body.get("conversation_id").is_none_or(Value::is_null));
}

#[tokio::test]
async fn payment_required_blocks_the_next_send() {
    let server = MockServer::start(vec![(
        "POST",
        "/api/chat/stream/",
        Reply::Json(
            402,
            json!({
                "message": "Token limit reached",
                "token_usage": {
                    "total_tokens_used": 20000,
                    "token_limit": 20000,
                    "remaining_tokens": 0,
                    "usage_percentage": 100.0
                }
            }),
        ),
    )])
    .await;

    let mut session = server.session();
    let mut renderer = CapturingRenderer::default();
    let cancel = CancellationToken::new();

    let outcome = session.send_streaming("hello", &mut renderer, &cancel).await;
    assert_eq!(
        outcome,
        TurnOutcome::PaymentRequired {
            notice: PAYMENT_REQUIRED_NOTICE.to_string()
        }
    );
    assert_eq!(session.state().usage().remaining_tokens, 0);
    assert!(session.state().messages().is_empty());

    let outcome = session.send_streaming("hello again", &mut renderer, &cancel).await;
    assert_eq!(outcome, TurnOutcome::Refused(SendRefusal::BalanceExhausted));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn server_error_rolls_back_the_turn() {
    let server = MockServer::start(vec![(
        "POST",
        "/api/chat/stream/",
        Reply::Json(500, json!({"error": "Model provider unavailable"})),
    )])
    .await;

    let mut session = server.session();
    let mut renderer = CapturingRenderer::default();
    let outcome = session
        .send_streaming("hello", &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            notice: "Model provider unavailable".to_string(),
            partial_retained: false,
        }
    );
    assert!(session.state().messages().is_empty());
    assert_eq!(renderer.errors, vec!["Model provider unavailable".to_string()]);
}

#[tokio::test]
async fn error_frame_keeps_partial_answer() {
    let server = MockServer::start(vec![(
        "POST",
        "/api/chat/stream/",
        Reply::Stream(vec![
            "data: {\"type\":\"token\",\"content\":\"Half\"}\n\n".to_string(),
            "data: {\"type\":\"error\",\"message\":\"upstream timeout\"}\n\n".to_string(),
        ]),
    )])
    .await;

    let mut session = server.session();
    let mut renderer = CapturingRenderer::default();
    let outcome = session
        .send_streaming("hello", &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            notice: "upstream timeout".to_string(),
            partial_retained: true,
        }
    );
    let messages = session.state().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Half");
    assert!(!messages[1].is_streaming);
}

#[tokio::test]
async fn unreachable_backend_reports_connection_lost() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ByteForge::with_options(
        Some("test-token".to_string()),
        Some(format!("http://{addr}/api/")),
        None,
    )
    .unwrap();
    let mut session = ChatSession::new(client, ChatConfig::new());
    let mut renderer = CapturingRenderer::default();
    let outcome = session
        .send_streaming("hello", &mut renderer, &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            notice: CONNECTION_LOST_NOTICE.to_string(),
            partial_retained: false,
        }
    );
    assert!(session.phase().accepts_send());
}

#[tokio::test]
async fn catalog_and_conversation_endpoints() {
    let server = MockServer::start(vec![
        (
            "GET",
            "/api/chat/models/",
            Reply::Json(
                200,
                json!({"models": [
                    {"id": "qwen/qwen-2.5-72b", "name": "Qwen 2.5"},
                    {"id": "openai/gpt-4o", "name": "GPT-4o", "provider": "openai", "featured": true}
                ]}),
            ),
        ),
        (
            "GET",
            "/api/chat/conversations/",
            Reply::Json(
                200,
                json!({"results": [
                    {"id": 42, "title": "Recursion", "message_count": 2},
                    {"id": "43", "title": null}
                ]}),
            ),
        ),
        (
            "GET",
            "/api/chat/conversations/42/",
            Reply::Json(
                200,
                json!({
                    "success": true,
                    "conversation": {
                        "id": 42,
                        "title": "Recursion",
                        "total_tokens_used": 37,
                        "token_limit": 20000,
                        "remaining_tokens": 19963,
                        "usage_percentage": 0.185,
                        "messages": [
                            {"id": 101, "role": "user", "content": "Explain recursion",
                             "created_at": "2025-01-01T12:00:00Z"},
                            {"id": 102, "role": "assistant", "content": "Recursion is...",
                             "created_at": "2025-01-01T12:00:02Z"}
                        ]
                    }
                }),
            ),
        ),
        (
            "DELETE",
            "/api/chat/conversations/42/",
            Reply::Json(200, json!({"success": true})),
        ),
    ])
    .await;

    let mut session = server.session();
    assert_eq!(session.refresh_models().await, 2);
    let featured = session.models(None);
    assert_eq!(featured[0].id, "openai/gpt-4o");
    assert_eq!(session.models(Some("qwen"))[0].provider, "qwen");

    let conversations = assert_ok!(session.list_conversations().await);
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].id.as_str(), "42");
    assert_eq!(conversations[1].id.as_str(), "43");

    let id = ConversationId::new("42");
    assert_ok!(session.open_conversation(&id).await);
    assert_eq!(session.state().id(), Some(&id));
    assert_eq!(session.state().messages().len(), 2);
    assert_eq!(session.state().usage().remaining_tokens, 19963);

    assert_ok!(session.delete_conversation(&id).await);
    assert!(session.state().id().is_none());
    assert!(session.state().messages().is_empty());

    let err = assert_err!(session.open_conversation(&ConversationId::new("99")).await);
    assert!(err.is_not_found());
    assert_eq!(err.message(), "Not found.");
}

#[tokio::test]
async fn top_up_requires_a_conversation() {
    let server = MockServer::start(vec![]).await;
    let mut session = server.session();
    let err = assert_err!(session.top_up(10.0).await);
    assert!(err.is_validation());
    assert!(server.requests().is_empty());
}

#[derive(Default)]
struct RecordingLogger {
    events: Mutex<Vec<String>>,
}

impl ClientLogger for RecordingLogger {
    fn log_request(&self, request: &StreamRequest) {
        self.events
            .lock()
            .unwrap()
            .push(format!("request {}", request.message));
    }

    fn log_frame(&self, frame: &StreamFrame) {
        let kind = match frame {
            StreamFrame::Token { .. } => "token",
            StreamFrame::Done(_) => "done",
            StreamFrame::Error { .. } => "error",
        };
        self.events.lock().unwrap().push(format!("frame {kind}"));
    }

    fn log_turn_complete(&self, done: &DonePayload) {
        self.events
            .lock()
            .unwrap()
            .push(format!("complete {}", done.conversation.id));
    }
}

#[tokio::test]
async fn logger_observes_the_turn() {
    let server = MockServer::start(vec![(
        "POST",
        "/api/chat/stream/",
        Reply::Stream(vec![
            "data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n".to_string(),
            done_frame("Hi", 3),
        ]),
    )])
    .await;

    let logger = Arc::new(RecordingLogger::default());
    let client = server.client().with_logger(logger.clone());
    let mut session = ChatSession::new(client, ChatConfig::new());
    let mut renderer = CapturingRenderer::default();
    let outcome = session
        .send_streaming("hello", &mut renderer, &CancellationToken::new())
        .await;
    assert!(outcome.is_completed());

    assert_eq!(
        *logger.events.lock().unwrap(),
        vec![
            "request hello".to_string(),
            "frame token".to_string(),
            "frame done".to_string(),
            "complete 42".to_string(),
        ]
    );
}
