// crates/researchstages/tests/http_test.rs

use researchstages::{
    GenerationError, GenerationRequest, HttpGenerator, HttpGeneratorConfig, TextGenerator, Tool,
    ToolError, WebSearchTool,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve a single canned HTTP response on a random local port.
///
/// Returns the base URL and a handle resolving to the raw request received.
async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        concat!(
            "HTTP/1.1 {}\r\n",
            "Content-Type: application/json\r\n",
            "Content-Length: {}\r\n",
            "Connection: close\r\n\r\n{}"
        ),
        status,
        body.len(),
        body
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{}", addr), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if raw.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}

fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        stage_id: "summarizer".to_string(),
        prompt: prompt.to_string(),
        tools: Vec::new(),
    }
}

#[tokio::test]
async fn test_generator_posts_prompt_and_reads_text() {
    let (url, server) = serve_once("200 OK", r#"{"text":"Qubits are fragile."}"#).await;
    let config = HttpGeneratorConfig::new(format!("{}/generate", url));
    let generator = HttpGenerator::new(config).unwrap();

    let text = generator.generate(request("Summarize quantum")).await.unwrap();
    assert_eq!(text, "Qubits are fragile.");

    let received = server.await.unwrap();
    assert!(received.starts_with("POST /generate "));
    let body = &received[received.find("\r\n\r\n").unwrap() + 4..];
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(
        body,
        json!({ "stage": "summarizer", "prompt": "Summarize quantum", "tools": [] })
    );
}

#[tokio::test]
async fn test_generator_reports_non_success_status() {
    let (url, _server) = serve_once("503 Service Unavailable", r#"{"error":"overloaded"}"#).await;
    let generator = HttpGenerator::new(HttpGeneratorConfig::new(url)).unwrap();

    let err = generator.generate(request("Summarize quantum")).await.unwrap_err();
    match err {
        GenerationError::Status { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_generator_rejects_malformed_body() {
    let (url, _server) = serve_once("200 OK", r#"{"answer":"no text field"}"#).await;
    let generator = HttpGenerator::new(HttpGeneratorConfig::new(url)).unwrap();

    let err = generator.generate(request("Summarize quantum")).await.unwrap_err();
    assert!(matches!(err, GenerationError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_web_search_returns_body_text() {
    let (url, server) = serve_once("200 OK", "Error correction uses surface codes.").await;
    let tool = WebSearchTool::new(format!("{}/search", url));

    let result = tool.call(json!({ "query": "quantum" })).await.unwrap();
    assert_eq!(result, "Error correction uses surface codes.");

    let received = server.await.unwrap();
    assert!(received.starts_with("GET /search?q=quantum "));
}

#[tokio::test]
async fn test_web_search_fails_on_error_status() {
    let (url, _server) = serve_once("500 Internal Server Error", "boom").await;
    let tool = WebSearchTool::new(url);

    let err = tool.call(json!({ "query": "quantum" })).await.unwrap_err();
    assert!(matches!(err, ToolError::Failed(ref msg) if msg.contains("500")));
}
