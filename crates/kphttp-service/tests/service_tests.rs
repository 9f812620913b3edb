use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use kphttp_core::crypto::{create_nonce, create_verifier, decrypt_string, encrypt};
use kphttp_core::RestServer;
use kphttp_service::config::{AssociationPolicy, ServiceConfig};
use kphttp_service::{build_protocol, paths};
use serde_json::{json, Value};

struct Client {
    key: Vec<u8>,
    id: Option<String>,
    port: u16,
    http: reqwest::Client,
}

fn b64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

impl Client {
    fn new(port: u16) -> Self {
        Self {
            key: (0..32u8).map(|b| b.wrapping_mul(7).wrapping_add(3)).collect(),
            id: None,
            port,
            http: reqwest::Client::new(),
        }
    }

    async fn send(&self, request_type: &str, fields: Value) -> (Value, [u8; 16]) {
        let nonce = create_nonce();
        let mut body = json!({
            "RequestType": request_type,
            "Nonce": b64(&nonce),
            "Verifier": b64(&create_verifier(&self.key, &nonce).unwrap()),
        });
        if let Some(id) = &self.id {
            body["Id"] = json!(id);
        }
        let map = body.as_object_mut().unwrap();
        for (k, v) in fields.as_object().unwrap() {
            let plain = v.as_str().unwrap();
            let value = if k == "Key" {
                plain.to_string()
            } else {
                b64(&encrypt(&self.key, &nonce, plain.as_bytes()).unwrap())
            };
            map.insert(k.clone(), json!(value));
        }
        let response = self
            .http
            .post(format!("http://127.0.0.1:{}/", self.port))
            .json(&body)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        (response, nonce)
    }

    fn open(&self, response: &Value, field: &Value) -> String {
        let nonce = general_purpose::STANDARD
            .decode(response["Nonce"].as_str().unwrap())
            .unwrap();
        let ct = general_purpose::STANDARD
            .decode(field.as_str().unwrap())
            .unwrap();
        decrypt_string(&self.key, &nonce, &ct).unwrap()
    }
}

async fn start(config: &ServiceConfig, dir: &std::path::Path) -> RestServer {
    let protocol = build_protocol(config, dir).unwrap();
    RestServer::new(Arc::new(protocol))
}

#[tokio::test]
async fn associate_store_and_look_up_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&ServiceConfig::default(), dir.path()).await;
    let addr = server.listen(Some(0), None).await.unwrap();
    let mut client = Client::new(addr.port());

    let (res, _) = client
        .send("associate", json!({ "Key": b64(&client.key) }))
        .await;
    assert_eq!(res["Success"], json!(true));
    let id = res["Id"].as_str().unwrap().to_string();
    client.id = Some(id.clone());

    let (res, _) = client.send("test-associate", json!({})).await;
    assert_eq!(res["Success"], json!(true));
    assert_eq!(res["Id"], json!(id));

    let (res, _) = client
        .send(
            "set-login",
            json!({
                "Url": "https://example.com/login",
                "Login": "alice",
                "Password": "hunter2",
            }),
        )
        .await;
    assert_eq!(res["Success"], json!(true), "{res}");

    let (res, _) = client
        .send("get-logins", json!({ "Url": "https://EXAMPLE.com/other" }))
        .await;
    assert_eq!(res["Success"], json!(true));
    let entries = res["Entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(client.open(&res, &entries[0]["Login"]), "alice");
    assert_eq!(client.open(&res, &entries[0]["Password"]), "hunter2");
    assert_eq!(client.open(&res, &entries[0]["Name"]), "example.com");

    let (res, _) = client
        .send("get-logins-count", json!({ "Url": "https://nowhere.net/" }))
        .await;
    assert_eq!(res["Count"], json!(0));

    server.close().await;

    assert!(paths::keys_path(dir.path()).exists());
    let stored: Value =
        serde_json::from_slice(&std::fs::read(paths::entries_path(dir.path())).unwrap()).unwrap();
    assert_eq!(stored[0]["login"], json!("alice"));
}

#[tokio::test]
async fn association_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::default();

    let server = start(&config, dir.path()).await;
    let addr = server.listen(Some(0), None).await.unwrap();
    let mut client = Client::new(addr.port());
    let (res, _) = client
        .send("associate", json!({ "Key": b64(&client.key) }))
        .await;
    client.id = Some(res["Id"].as_str().unwrap().to_string());
    server.close().await;

    let server = start(&config, dir.path()).await;
    let addr = server.listen(Some(0), None).await.unwrap();
    client.port = addr.port();
    let (res, _) = client.send("get-all-logins", json!({})).await;
    assert_eq!(res["Success"], json!(true));
    assert_eq!(res["Entries"], json!([]));
    server.close().await;
}

#[tokio::test]
async fn reject_policy_refuses_new_clients() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        association: AssociationPolicy::Reject,
        ..ServiceConfig::default()
    };
    let server = start(&config, dir.path()).await;
    let addr = server.listen(Some(0), None).await.unwrap();
    let client = Client::new(addr.port());

    let (res, _) = client
        .send("associate", json!({ "Key": b64(&client.key) }))
        .await;
    assert_eq!(res["Success"], json!(false));
    assert_eq!(res["Error"], json!("Associate request has been rejected"));
    server.close().await;
}

#[tokio::test]
async fn generated_password_carries_quality() {
    let dir = tempfile::tempdir().unwrap();
    let server = start(&ServiceConfig::default(), dir.path()).await;
    let addr = server.listen(Some(0), None).await.unwrap();
    let mut client = Client::new(addr.port());
    let (res, _) = client
        .send("associate", json!({ "Key": b64(&client.key) }))
        .await;
    client.id = Some(res["Id"].as_str().unwrap().to_string());

    let (res, _) = client.send("generate-password", json!({})).await;
    let entry = &res["Entries"][0];
    let password = client.open(&res, &entry["Password"]);
    let quality: u32 = client.open(&res, &entry["Login"]).parse().unwrap();
    assert_eq!(password.chars().count(), 20);
    assert!(quality > 0);
    server.close().await;
}
