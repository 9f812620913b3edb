use std::sync::Arc;
use std::time::Duration;

use kphttp_core::error::ListenError;
use kphttp_core::observer::RequestObserver;
use kphttp_core::protocol::Protocol;
use kphttp_core::server::RestServer;
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Default)]
struct EchoProtocol {
    seen: Mutex<Vec<Value>>,
}

#[async_trait::async_trait]
impl Protocol for EchoProtocol {
    fn name(&self) -> &str {
        "Test"
    }

    fn version(&self) -> &str {
        "1.2.3"
    }

    fn default_port(&self) -> u16 {
        12345
    }

    async fn handle(&self, request: Value) -> Value {
        self.seen.lock().push(request);
        json!("Ho")
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl RequestObserver for Recorder {
    fn on_request(&self, body: &Value) {
        self.events.lock().push(format!("<- {body}"));
    }

    fn on_response(&self, body: &Value) {
        self.events.lock().push(format!("-> {body}"));
    }
}

fn occupy_port() -> std::net::TcpListener {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap()
}

async fn post(port: u16, body: &'static str) -> Value {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/"))
        .header("Content-Type", "application/json")
        .body(body)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn starts_and_stops_listening() {
    let protocol = Arc::new(EchoProtocol::default());
    let server = RestServer::new(protocol.clone());
    assert!(!server.is_listening());
    assert!(server.local_addr().is_none());

    let addr = server.listen(Some(0), None).await.unwrap();
    assert!(server.is_listening());
    assert!(addr.port() > 0);
    assert_eq!(server.local_addr(), Some(addr));

    server.close().await;
    assert!(!server.is_listening());
    assert!(std::net::TcpListener::bind(addr).is_ok());

    server.listen(Some(0), None).await.unwrap();
    assert!(server.is_listening());
    assert!(protocol.seen.lock().is_empty());
    server.close().await;
}

#[tokio::test]
async fn closing_a_stopped_server_is_a_noop() {
    let server = RestServer::new(Arc::new(EchoProtocol::default()));
    server.close().await;
    assert!(!server.is_listening());
}

#[tokio::test]
async fn second_listen_is_rejected() {
    let server = RestServer::new(Arc::new(EchoProtocol::default()));
    let addr = server.listen(Some(0), None).await.unwrap();
    let err = server.listen(Some(0), None).await.unwrap_err();
    assert!(matches!(err, ListenError::AlreadyActive));
    assert_eq!(server.local_addr(), Some(addr));
    server.close().await;
}

#[tokio::test]
async fn retries_while_address_is_in_use() {
    let blocker = occupy_port();
    let port = blocker.local_addr().unwrap().port();
    let server = Arc::new(RestServer::new(Arc::new(EchoProtocol::default())));

    let pending = {
        let server = server.clone();
        tokio::spawn(async move { server.listen(Some(port), Some("127.0.0.1")).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!server.is_listening());
    drop(blocker);

    let addr = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("listen did not complete after the port was freed")
        .unwrap()
        .unwrap();
    assert_eq!(addr.port(), port);
    assert!(server.is_listening());
    server.close().await;
}

#[tokio::test]
async fn close_aborts_pending_listen() {
    let blocker = occupy_port();
    let port = blocker.local_addr().unwrap().port();
    let server = Arc::new(RestServer::new(Arc::new(EchoProtocol::default())));

    let pending = {
        let server = server.clone();
        tokio::spawn(async move { server.listen(Some(port), Some("127.0.0.1")).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    server.close().await;

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("pending listen hung after close")
        .unwrap();
    assert!(matches!(result, Err(ListenError::Cancelled)));

    // Freeing the port afterwards must not bring the listener up.
    drop(blocker);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!server.is_listening());

    // And the server can be started again.
    server.listen(Some(0), None).await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn fails_fast_on_unusable_host() {
    let server = RestServer::new(Arc::new(EchoProtocol::default()));
    let err = server
        .listen(Some(0), Some("99.99.99.99"))
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::Bind(_)));
    assert!(!server.is_listening());
}

#[tokio::test]
async fn forwards_requests_to_the_protocol() {
    let protocol = Arc::new(EchoProtocol::default());
    let recorder = Arc::new(Recorder::default());
    let server = RestServer::new(protocol.clone()).with_observer(recorder.clone());
    let addr = server.listen(Some(0), None).await.unwrap();

    let response = post(addr.port(), "\"Hi\"").await;
    assert_eq!(response, json!("Ho"));
    assert_eq!(protocol.seen.lock().as_slice(), &[json!("Hi")]);
    assert_eq!(
        recorder.events.lock().as_slice(),
        &["<- \"Hi\"".to_string(), "-> \"Ho\"".to_string()]
    );
    server.close().await;
}

#[tokio::test]
async fn non_json_body_reaches_protocol_as_null() {
    let protocol = Arc::new(EchoProtocol::default());
    let server = RestServer::new(protocol.clone());
    let addr = server.listen(Some(0), None).await.unwrap();

    let response = post(addr.port(), "definitely not json").await;
    assert_eq!(response, json!("Ho"));
    assert_eq!(protocol.seen.lock().as_slice(), &[Value::Null]);
    server.close().await;
}
