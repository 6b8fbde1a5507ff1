use std::net::SocketAddr;

use liveload::server::RemoteControl;
use liveload::{Executor, LiveloadError, Orchestrator, Runtime, ScriptEvaluator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn executor() -> Executor {
    let runtime = Runtime::default();
    runtime.modules.register("foo");
    let orchestrator = Orchestrator::new(Box::new(ScriptEvaluator::new()), runtime);
    Executor::spawn(orchestrator).expect("executor thread")
}

async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    content_type: Option<&str>,
    body: &str,
) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let mut head = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Length: {}\r\n",
        body.len()
    );
    if let Some(content_type) = content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).await.expect("write head");
    stream.write_all(body.as_bytes()).await.expect("write body");

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.expect("read response");
    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_owned())
        .unwrap_or_default();
    (status, body)
}

async fn eval(addr: SocketAddr, path: &str, code: &str) -> (u16, String) {
    request(addr, "POST", path, Some("text/plain"), code).await
}

#[tokio::test]
async fn evaluation_results_and_errors_are_plain_text() {
    let executor = executor();
    let remote = RemoteControl::new(executor.handle());
    let addr = remote.start("127.0.0.1", 0).await.unwrap();

    let (status, body) = eval(addr, "/eval", "x = 40").await;
    assert_eq!((status, body.as_str()), (200, "OK"));
    let (status, body) = eval(addr, "/eval", "x + 2").await;
    assert_eq!((status, body.as_str()), (200, "OK\n42"));

    let (status, body) = eval(addr, "/eval", "fn f() { return missing }\nf()").await;
    assert_eq!(status, 200);
    assert!(body.contains("in f (__main__)"), "{body}");
    assert!(body.contains("NameError: name 'missing' is not defined"), "{body}");

    let (status, body) = request(addr, "GET", "/", None, "").await;
    assert_eq!(status, 200);
    assert!(body.starts_with("liveload remote control"));

    assert!(remote.stop().await);
}

#[tokio::test]
async fn non_text_bodies_are_rejected_before_evaluation() {
    let executor = executor();
    let remote = RemoteControl::new(executor.handle());
    let addr = remote.start("127.0.0.1", 0).await.unwrap();

    let (status, _) = request(addr, "POST", "/eval", Some("application/json"), "y = 1").await;
    assert_eq!(status, 400);
    let (status, _) = request(addr, "POST", "/eval", None, "y = 1").await;
    assert_eq!(status, 400);
    let (_, body) = eval(addr, "/eval", "y").await;
    assert!(body.contains("NameError"), "{body}");

    let (status, body) = request(addr, "POST", "/eval", Some("plain/text"), "1 + 1").await;
    assert_eq!((status, body.as_str()), (200, "OK\n2"));

    remote.stop().await;
}

#[tokio::test]
async fn targets_and_switches() {
    let executor = executor();
    let engine = executor.handle();
    let remote = RemoteControl::new(engine.clone());
    let addr = remote.start("127.0.0.1", 0).await.unwrap();

    let (status, _) = eval(addr, "/eval?in-module=nowhere", "1").await;
    assert_eq!(status, 404);

    let (status, body) = eval(addr, "/eval?in-module=foo", "v = 'in foo'").await;
    assert_eq!((status, body.as_str()), (200, "OK"));
    let (_, body) = eval(addr, "/eval?in-module=foo", "v").await;
    assert_eq!(body, "OK\n\"in foo\"");
    // an empty target means the active context
    let (_, body) = eval(addr, "/eval?in-module=", "v").await;
    assert!(body.contains("NameError"), "{body}");

    let (status, body) = request(addr, "POST", "/switch", Some("text/plain"), "foo\n").await;
    assert_eq!((status, body.as_str()), (200, "OK"));
    let (status, body) = request(addr, "GET", "/status", None, "").await;
    assert_eq!(status, 200);
    let status: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["context"], "foo");
    assert_eq!(engine.status().await.unwrap().context, "foo");

    let (status, _) = request(addr, "POST", "/switch", Some("text/plain"), "nowhere").await;
    assert_eq!(status, 404);

    remote.stop().await;
}

#[tokio::test]
async fn starting_twice_keeps_the_running_listener() {
    let executor = executor();
    let remote = RemoteControl::new(executor.handle());
    let addr = remote.start("127.0.0.1", 0).await.unwrap();

    match remote.start("127.0.0.1", 0).await {
        Err(LiveloadError::AlreadyListening(at)) => assert_eq!(at, addr.to_string()),
        other => panic!("expected AlreadyListening, got {other:?}"),
    }
    assert_eq!(remote.local_addr().await, Some(addr));
    let (status, _) = request(addr, "GET", "/", None, "").await;
    assert_eq!(status, 200);

    assert!(remote.stop().await);
    assert!(!remote.stop().await);
    assert_eq!(remote.local_addr().await, None);
}
