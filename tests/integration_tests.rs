//! End-to-end tests of the session controller against a local mock backend.
//! The mock speaks just enough HTTP/1.1 to answer one request per connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use palaver::{
    Completion, Config, ConfigStore, SendOutcome, Sender, SessionController, SessionState,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone)]
enum Reply {
    Respond { status: u16, body: String },
    Delayed { delay: Duration, status: u16, body: String },
    Hang,
}

impl Reply {
    fn content(text: &str) -> Self {
        Reply::Respond {
            status: 200,
            body: completion_body(text),
        }
    }
}

#[derive(Debug)]
struct Recorded {
    request_line: String,
    head: String,
    body: Value,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

struct MockBackend {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl MockBackend {
    async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            let mut replies = replies.into_iter();
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let reply = replies.next().unwrap_or(Reply::Hang);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(serve(stream, reply, recorded));
            }
        });
        Self {
            base_url: format!("http://{addr}/v1"),
            requests,
            task,
        }
    }

    fn requests(&self) -> std::sync::MutexGuard<'_, Vec<Recorded>> {
        self.requests.lock().unwrap()
    }

    fn request_count(&self) -> usize {
        self.requests().len()
    }

    fn user_content(&self, index: usize) -> String {
        self.requests()[index].body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, reply: Reply, recorded: Arc<Mutex<Vec<Recorded>>>) {
    let Some((head, body)) = read_request(&mut stream).await else {
        return;
    };
    let request_line = head.lines().next().unwrap_or_default().to_string();
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    recorded.lock().unwrap().push(Recorded {
        request_line,
        head,
        body,
    });
    let (status, body) = match reply {
        Reply::Respond { status, body } => (status, body),
        Reply::Delayed {
            delay,
            status,
            body,
        } => {
            tokio::time::sleep(delay).await;
            (status, body)
        }
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
    };
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some((head, buf[header_end..header_end + length].to_vec()))
}

fn completion_body(text: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

fn config_for(backend: &MockBackend) -> Config {
    Config::new(&backend.base_url, "k")
        .with_model("gpt-4o-mini")
        .with_system_prompt("sys")
        .with_temperature(0.7)
}

fn session_for(dir: &tempfile::TempDir, backend: &MockBackend) -> SessionController {
    let mut session = SessionController::new(ConfigStore::new(dir.path().join("config.yaml")));
    session.reconfigure(config_for(backend)).unwrap();
    session
}

#[tokio::test]
async fn reply_is_recorded_and_request_is_well_formed() {
    let backend = MockBackend::start(vec![Reply::content("Hi *there*")]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);
    assert_eq!(session.state(), SessionState::Ready);

    let completion = session.send_and_wait("hello").await.unwrap().unwrap();
    let rendered = match completion {
        Completion::Replied(rendered) => rendered,
        other => panic!("expected a reply, got {other:?}"),
    };
    assert_eq!(rendered.message.content(), "Hi *there*");
    assert_eq!(rendered.html, "Hi <b>there</b>");
    assert_eq!(session.state(), SessionState::Ready);

    let messages = session.transcript().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender(), Sender::User);
    assert_eq!(messages[0].content(), "hello");
    assert_eq!(messages[1].sender(), Sender::Assistant);
    assert!(!messages[1].is_error());

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(
        request
            .request_line
            .starts_with("POST /v1/chat/completions "),
        "{}",
        request.request_line
    );
    assert_eq!(request.header("authorization").as_deref(), Some("Bearer k"));
    assert_eq!(
        request.header("content-type").as_deref(),
        Some("application/json")
    );
    assert_eq!(
        request.body,
        json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hello"}
            ],
            "temperature": 0.7
        })
    );
}

#[tokio::test]
async fn backend_failure_is_recorded_as_error_message() {
    let backend = MockBackend::start(vec![
        Reply::Respond {
            status: 500,
            body: r#"{"error":"boom"}"#.to_string(),
        },
        Reply::content("recovered"),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);

    let completion = session.send_and_wait("hello").await.unwrap().unwrap();
    let error = completion.error().expect("failure");
    assert!(error.is_backend());
    assert_eq!(error.status_code(), Some(500));
    let last = session.transcript().last().unwrap();
    assert!(last.is_error());
    assert_eq!(last.sender(), Sender::Assistant);
    assert!(last.content().starts_with("Error: "));
    assert!(last.content().contains("500"));
    assert_eq!(session.state(), SessionState::Ready);

    let completion = session.send_and_wait("again").await.unwrap().unwrap();
    assert!(matches!(completion, Completion::Replied(_)));
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn malformed_reply_is_an_error() {
    let backend = MockBackend::start(vec![Reply::Respond {
        status: 200,
        body: r#"{"choices":[]}"#.to_string(),
    }])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);

    let completion = session.send_and_wait("hello").await.unwrap().unwrap();
    assert!(completion.error().unwrap().is_malformed_response());
    assert!(session.transcript().last().unwrap().is_error());
}

#[tokio::test]
async fn blank_input_issues_no_request() {
    let backend = MockBackend::start(vec![Reply::content("unused")]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);

    assert_eq!(session.send_message("  \n ").unwrap(), SendOutcome::Ignored);
    assert!(session.send_and_wait("").await.unwrap().is_none());
    assert!(session.transcript().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn attachment_is_folded_into_one_message() {
    let backend =
        MockBackend::start(vec![Reply::content("summary"), Reply::content("ok")]).await;
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "line one\nline two").unwrap();
    let mut session = session_for(&dir, &backend);

    let attachment = session.attach_file(&notes).unwrap();
    assert_eq!(attachment.filename(), "notes.txt");
    assert_eq!(attachment.preview(), "line one\nline two");

    let outcome = session.send_message("summarize").unwrap();
    let SendOutcome::Dispatched(rendered) = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(rendered.html, "summarize");
    assert!(session.pending_attachment().is_none());
    session.wait_for_reply().await.unwrap();

    session.send_and_wait("again").await.unwrap().unwrap();

    let expected = "summarize\n\n[Attached File: notes.txt]\nline one\nline two";
    assert_eq!(backend.user_content(0), expected);
    assert_eq!(session.transcript().messages()[0].content(), expected);
    assert_eq!(backend.user_content(1), "again");
}

#[tokio::test]
async fn second_send_while_awaiting_is_rejected() {
    let backend = MockBackend::start(vec![Reply::Hang]).await;
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "kept").unwrap();
    let mut session = session_for(&dir, &backend);

    session.send_message("one").unwrap();
    assert_eq!(session.state(), SessionState::AwaitingResponse);
    session.attach_file(&notes).unwrap();

    let err = session.send_message("two").unwrap_err();
    assert!(err.is_busy());
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(
        session.pending_attachment().map(|a| a.filename()),
        Some("notes.txt")
    );

    let completion = session.cancel().await.unwrap();
    assert!(matches!(completion, Completion::Cancelled));
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn abort_handle_cancels_from_outside() {
    let backend = MockBackend::start(vec![Reply::Hang]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);

    session.send_message("hello").unwrap();
    let abort = session.abort_handle().unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        abort.abort();
    });
    let completion = session.wait_for_reply().await.unwrap();
    assert!(matches!(completion, Completion::Cancelled));
    assert!(session.abort_handle().is_none());
}

#[tokio::test]
async fn slow_backend_times_out() {
    let backend = MockBackend::start(vec![Reply::Hang]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = SessionController::new(ConfigStore::new(dir.path().join("config.yaml")))
        .with_request_timeout(Duration::from_millis(200))
        .unwrap();
    session.reconfigure(config_for(&backend)).unwrap();

    let completion = session.send_and_wait("hello").await.unwrap().unwrap();
    let error = completion.error().unwrap();
    assert!(error.is_transport());
    assert!(error.is_timeout());
    assert!(session.transcript().last().unwrap().is_error());
}

#[tokio::test]
async fn reconfigure_while_awaiting_keeps_request() {
    let backend = MockBackend::start(vec![
        Reply::Delayed {
            delay: Duration::from_millis(200),
            status: 200,
            body: completion_body("first"),
        },
        Reply::content("second"),
    ])
    .await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);

    session.send_message("hello").unwrap();
    let validation = session
        .reconfigure(config_for(&backend).with_temperature(1.2))
        .unwrap();
    assert!(validation.is_clean());
    assert_eq!(session.state(), SessionState::AwaitingResponse);

    let completion = session.wait_for_reply().await.unwrap();
    let rendered = match completion {
        Completion::Replied(rendered) => rendered,
        other => panic!("expected a reply, got {other:?}"),
    };
    assert_eq!(rendered.message.content(), "first");

    session.send_and_wait("next").await.unwrap().unwrap();
    let requests = backend.requests();
    assert_eq!(requests[0].body["temperature"], json!(0.7));
    assert_eq!(requests[1].body["temperature"], json!(1.2));
}

#[tokio::test]
async fn configuration_survives_reopen() {
    let backend = MockBackend::start(vec![Reply::content("hello again")]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    {
        let mut session = SessionController::new(ConfigStore::new(&path));
        let validation = session
            .reconfigure(config_for(&backend).with_model("my-custom-model"))
            .unwrap();
        assert_eq!(validation.warnings.len(), 1);
    }

    let mut session = SessionController::open(ConfigStore::new(&path)).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    let config = session.config().unwrap();
    assert_eq!(config.model, "my-custom-model");
    assert_eq!(config.system_prompt, "sys");

    let completion = session.send_and_wait("hi").await.unwrap().unwrap();
    assert!(matches!(completion, Completion::Replied(_)));
    assert_eq!(backend.requests()[0].body["model"], json!("my-custom-model"));
}

#[tokio::test]
async fn transcript_save_load_and_export() {
    let backend = MockBackend::start(vec![Reply::content("_sure_ & done")]).await;
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_for(&dir, &backend);
    session.send_and_wait("do it").await.unwrap().unwrap();

    let json_path = dir.path().join("chat.json");
    session.save_transcript(&json_path).unwrap();
    let saved: Value = serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(saved["chat_log"][0][0], json!("You"));
    assert_eq!(saved["chat_log"][1][0], json!("AI"));
    assert_eq!(saved["chat_log"][1][1], json!("_sure_ & done"));

    let before = session.transcript().messages().to_vec();
    session.clear();
    assert!(session.transcript().is_empty());
    session.load_transcript(&json_path).unwrap();
    assert_eq!(session.transcript().messages(), before.as_slice());

    let html_path = dir.path().join("chat.html");
    session.export_html(&html_path).unwrap();
    let html = std::fs::read_to_string(&html_path).unwrap();
    assert!(html.contains("<title>Chat Transcript</title>"));
    assert!(html.contains("<b>You:</b>"));
    assert!(html.contains("<i>sure</i> &amp; done"));
}
