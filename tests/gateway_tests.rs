//! HTTP surface against a real listener.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use common::{FakeDialer, RECV_TIMEOUT, connect_frame, context, password_host};
use shellgate::config::{Host, IdentityConfig, TokenGrant};
use shellgate::gateway::identity::token_digest;
use shellgate::gateway::{self, AppState, OriginPolicy, StaticTokenIdentity};
use shellgate::store::MemoryStore;

const ALLOWED_ORIGIN: &str = "http://localhost:5173";

struct Server {
    addr: SocketAddr,
    host: Host,
    dialer: Arc<FakeDialer>,
}

async fn start() -> Server {
    let host = password_host("web-1");
    let store = Arc::new(MemoryStore::with_hosts([host.clone()]));
    let dialer = Arc::new(FakeDialer::default());

    let identity = StaticTokenIdentity::from_config(&IdentityConfig {
        tokens: vec![
            TokenGrant {
                token_sha256: token_digest("alice-token"),
                user_id: common::OWNER.into(),
                is_admin: false,
            },
            TokenGrant {
                token_sha256: token_digest("root-token"),
                user_id: "root".into(),
                is_admin: true,
            },
        ],
    });

    let state = AppState {
        proxy: Arc::new(context(store, dialer.clone())),
        identity: Arc::new(identity),
        origins: Arc::new(OriginPolicy::new([ALLOWED_ORIGIN])),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            gateway::router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Server { addr, host, dialer }
}

async fn refused_status(addr: SocketAddr, headers: &[(&'static str, &str)]) -> u16 {
    let mut request = format!("ws://{addr}/ws/ssh").into_client_request().unwrap();
    for (name, value) in headers {
        request.headers_mut().insert(*name, value.parse().unwrap());
    }
    let error = tokio_tungstenite::connect_async(request)
        .await
        .err()
        .expect("upgrade should be refused");
    match error {
        WsError::Http(response) => response.status().as_u16(),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn health_is_public() {
    let server = start().await;
    let response = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"status": "ok"}));
}

#[tokio::test]
async fn upgrade_requires_identity_then_origin() {
    let server = start().await;

    assert_eq!(refused_status(server.addr, &[]).await, 401);
    assert_eq!(
        refused_status(server.addr, &[("authorization", "Bearer wrong")]).await,
        401
    );
    assert_eq!(
        refused_status(server.addr, &[("origin", "https://evil.example")]).await,
        401
    );
    assert_eq!(
        refused_status(
            server.addr,
            &[
                ("authorization", "Bearer alice-token"),
                ("origin", "https://evil.example"),
            ]
        )
        .await,
        403
    );
    assert!(server.dialer.attempts().is_empty());
}

#[tokio::test]
async fn admin_listing_is_admin_only() {
    let server = start().await;
    let url = format!("http://{}/api/admin/sessions", server.addr);
    let client = reqwest::Client::new();

    let anonymous = client.get(&url).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let user = client
        .get(&url)
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(user.status(), 403);

    let admin = client
        .get(&url)
        .header("cookie", "access_token=root-token")
        .send()
        .await
        .unwrap();
    assert_eq!(admin.status(), 200);
    assert_eq!(admin.json::<Value>().await.unwrap(), json!([]));
}

#[tokio::test]
async fn terminal_session_over_websocket() {
    let server = start().await;

    let mut request = format!("ws://{}/ws/ssh", server.addr)
        .into_client_request()
        .unwrap();
    let headers = request.headers_mut();
    headers.insert("authorization", "Bearer alice-token".parse().unwrap());
    headers.insert("origin", ALLOWED_ORIGIN.parse().unwrap());
    headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    async fn next_json(
        ws: &mut (impl futures::Stream<Item = Result<Message, WsError>> + Unpin),
    ) -> Value {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, ws.next())
                .await
                .expect("timed out")
                .expect("socket closed")
                .expect("socket error");
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    let connect = connect_frame(&server.host, "hunter2").to_string();
    ws.send(Message::Text(connect.into())).await.unwrap();
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["payload"]["host_name"], "web-1");

    let remote = server.dialer.remote().await;
    remote.output("$ ").await;
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "output", "payload": {"data": "$ "}})
    );

    let disconnect = json!({"type": "disconnect"}).to_string();
    ws.send(Message::Text(disconnect.into())).await.unwrap();
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "closed", "payload": {"reason": "client disconnected"}})
    );

    let sessions: Value = reqwest::Client::new()
        .get(format!("http://{}/api/admin/sessions", server.addr))
        .bearer_auth("root-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let row = &sessions[0];
    assert_eq!(row["id"], connected["payload"]["session_id"]);
    assert_eq!(row["owner_id"], common::OWNER);
    assert_eq!(row["client_addr"], "203.0.113.9");
    assert_eq!(row["host_name"], "web-1");
    assert!(!row["ended_at"].is_null());
}

#[tokio::test]
async fn hosts_api_is_scoped_to_caller() {
    let server = start().await;
    let base = format!("http://{}/api/hosts", server.addr);
    let client = reqwest::Client::new();

    assert_eq!(client.get(&base).send().await.unwrap().status(), 401);

    let seeded: Value = client
        .get(&base)
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(seeded.as_array().unwrap().len(), 1);
    assert_eq!(seeded[0]["id"], server.host.id.to_string());

    let body = json!({
        "name": "db",
        "hostname": "db.internal",
        "username": "postgres",
        "auth_kind": "password",
        "encrypted_credential": "Y2lwaGVy",
        "credential_iv": "AAAAAAAAAAAAAAAA",
    });
    let created = client
        .post(&base)
        .bearer_auth("alice-token")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    assert_eq!(created["owner_id"], common::OWNER);
    assert_eq!(created["port"], 22);
    let url = format!("{base}/{}", created["id"].as_str().unwrap());

    let mut edit = body.clone();
    edit["port"] = json!(2222);
    let foreign_get = client.get(&url).bearer_auth("root-token").send().await.unwrap();
    assert_eq!(foreign_get.status(), 404);
    assert_eq!(
        foreign_get.json::<Value>().await.unwrap(),
        json!({"error": "host not found"})
    );
    let foreign_put = client
        .put(&url)
        .bearer_auth("root-token")
        .json(&edit)
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_put.status(), 404);

    let updated: Value = client
        .put(&url)
        .bearer_auth("alice-token")
        .json(&edit)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["port"], 2222);
    assert_eq!(updated["created_at"], created["created_at"]);

    let incomplete = client
        .post(&base)
        .bearer_auth("alice-token")
        .json(&json!({"name": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(incomplete.status(), 400);
    assert_eq!(
        incomplete.json::<Value>().await.unwrap()["error"],
        "hostname is required"
    );
    let garbled = client
        .post(&base)
        .bearer_auth("alice-token")
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(garbled.status(), 400);
    assert_eq!(
        garbled.json::<Value>().await.unwrap()["error"],
        "invalid request body"
    );

    // Someone else's delete is a silent no-op
    let status = |response: reqwest::Response| response.status().as_u16();
    assert_eq!(status(client.delete(&url).bearer_auth("root-token").send().await.unwrap()), 204);
    assert_eq!(status(client.get(&url).bearer_auth("alice-token").send().await.unwrap()), 200);
    assert_eq!(status(client.delete(&url).bearer_auth("alice-token").send().await.unwrap()), 204);
    assert_eq!(status(client.get(&url).bearer_auth("alice-token").send().await.unwrap()), 404);
}
