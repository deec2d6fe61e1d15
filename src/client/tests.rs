use super::*;
use crate::config::Config;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Request line plus body of every request the stub received.
type Captured = Arc<Mutex<Vec<(String, String)>>>;

async fn read_request(socket: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break Some(pos + 4);
        }
    };
    let Some(header_end) = header_end else {
        return (String::new(), String::new());
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    (request_line, body)
}

async fn start_test_server(
    responses: Vec<(&'static str, &'static str)>,
    captured: Captured,
) -> Option<String> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            // Sandboxes may forbid binding a local port; callers skip then.
            return None;
        }
        Err(e) => panic!("failed to bind test listener: {e}"),
    };

    let addr = listener.local_addr().expect("local_addr");
    let base_url = format!("http://{addr}");

    tokio::spawn(async move {
        for (status_line, body) in responses {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            let request = read_request(&mut socket).await;
            captured.lock().unwrap().push(request);

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {len}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}",
                len = body.len(),
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    Some(base_url)
}

fn api_for(base_url: &str) -> HttpApi {
    let mut config = Config::default();
    config.server.api_url = format!("{base_url}/api");
    config.server.pipeline_url = format!("{base_url}/pipeline");
    config.server.timeout_seconds = 5;
    HttpApi::new(&config).expect("client")
}

#[test]
fn describe_status_prefers_json_error() {
    assert_eq!(
        describe_status(StatusCode::BAD_REQUEST, r#"{"error":"thread not found"}"#),
        "thread not found"
    );
    assert_eq!(describe_status(StatusCode::BAD_GATEWAY, ""), "Bad gateway");
    assert_eq!(
        describe_status(StatusCode::IM_A_TEAPOT, "short and stout"),
        "short and stout"
    );
    assert_eq!(
        describe_status(StatusCode::IM_A_TEAPOT, "<html>nope</html>"),
        "I'm a teapot"
    );
}

#[test]
fn status_error_message_includes_code() {
    let err = ApiError::Status {
        status: 503,
        message: "Service unavailable".into(),
    };
    assert_eq!(err.to_string(), "Request failed: 503 (Service unavailable)");
}

#[tokio::test]
async fn fetch_overall_preserves_key_order() {
    let captured = Captured::default();
    let Some(base_url) = start_test_server(
        vec![("200 OK", r#"{"zeta":1,"insights":["a"],"alpha":"x"}"#)],
        captured.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let report = api_for(&base_url).fetch_overall().await.expect("report");
    let keys: Vec<&str> = report.entries().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["zeta", "insights", "alpha"]);

    let requests = captured.lock().unwrap();
    assert_eq!(requests[0].0, "GET /api/overall HTTP/1.1");
}

#[tokio::test]
async fn fetch_overall_non_success_is_status_error() {
    let captured = Captured::default();
    let Some(base_url) =
        start_test_server(vec![("500 Internal Server Error", "")], captured.clone()).await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let err = api_for(&base_url).fetch_overall().await.unwrap_err();
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Server error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_overall_rejects_malformed_body() {
    let captured = Captured::default();
    let Some(base_url) =
        start_test_server(vec![("200 OK", "not json")], captured.clone()).await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let err = api_for(&base_url).fetch_overall().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn send_chat_posts_message_and_thread() {
    let captured = Captured::default();
    let Some(base_url) = start_test_server(
        vec![(
            "200 OK",
            r#"{"threadId":"thread_9","messages":[{"id":"m1","role":"user","text":"hi","createdAt":"2025-01-01T00:00:00Z"},{"id":"m2","role":"assistant","text":"hello","sources":[{"url":"https://kb.example"}]}]}"#,
        )],
        captured.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let response = api_for(&base_url)
        .send_chat(&ChatRequest {
            message: "hi".into(),
            thread_id: None,
        })
        .await
        .expect("chat");
    assert_eq!(response.thread_id.as_deref(), Some("thread_9"));
    assert_eq!(response.messages.len(), 2);
    assert_eq!(
        response.messages[1].visible_sources()[0].display(),
        "https://kb.example"
    );

    let requests = captured.lock().unwrap();
    assert_eq!(requests[0].0, "POST /api/chat HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
    assert_eq!(body, serde_json::json!({"message": "hi", "threadId": null}));
}

#[tokio::test]
async fn submit_urls_uses_capitalized_field() {
    let captured = Captured::default();
    let Some(base_url) = start_test_server(vec![("200 OK", "")], captured.clone()).await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    api_for(&base_url)
        .submit_urls(&["https://a.example".to_string()])
        .await
        .expect("submit");

    let requests = captured.lock().unwrap();
    assert_eq!(requests[0].0, "POST /api/urls HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
    assert_eq!(body, serde_json::json!({"Urls": ["https://a.example"]}));
}

#[tokio::test]
async fn stage_calls_hit_pipeline_base() {
    let captured = Captured::default();
    let Some(base_url) = start_test_server(
        vec![("200 OK", ""), ("200 OK", "{}"), ("404 Not Found", "")],
        captured.clone(),
    )
    .await
    else {
        eprintln!("Skipping test: unable to bind local HTTP server");
        return;
    };

    let api = api_for(&base_url);
    api.scrape().await.expect("scrape");
    api.create_index().await.expect("create index");
    let err = api.ingest_latest().await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));

    let requests = captured.lock().unwrap();
    let lines: Vec<&str> = requests.iter().map(|(line, _)| line.as_str()).collect();
    assert_eq!(
        lines,
        vec![
            "GET /pipeline/urls/scrape HTTP/1.1",
            "POST /pipeline/search/create-index HTTP/1.1",
            "POST /pipeline/search/ingest-latest HTTP/1.1",
        ]
    );
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let mut config = Config::default();
    config.server.api_url = "http://127.0.0.1:9".to_string();
    config.server.timeout_seconds = 2;
    let api = HttpApi::new(&config).expect("client");

    let err = api.fetch_overall().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
}
