use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message as WsMessage};
use tower::ServiceExt;
use uuid::Uuid;

use super::router;
use crate::{
    config::AppConfig, dao::lobby_store::memory::MemoryLobbyStore, state::AppState,
};

async fn app_with(config: AppConfig) -> Router {
    let state = AppState::with_store(config, Arc::new(MemoryLobbyStore::new())).await;
    router(state)
}

async fn app() -> Router {
    app_with(AppConfig::default()).await
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn create_session(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        json_request("POST", "/sessions", json!({ "username": username })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn healthcheck_reports_ok_with_store() {
    let app = app().await;
    let (status, body) = send(&app, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn degraded_backend_answers_503() {
    let app = router(AppState::new(AppConfig::default()));
    let (status, body) = send(&app, json_request("POST", "/sessions", json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().contains("degraded"));
}

#[tokio::test]
async fn session_lifecycle() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let (status, body) = send(&app, get(&format!("/sessions/{id}/exists"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], true);

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/sessions/{id}/join"), json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"], json!(["alice", "bob"]));

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/sessions/{id}/status"),
            json!({ "status": "in_progress" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["users"], json!(["alice", "bob"]));

    let (status, body) = send(&app, get(&format!("/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
}

#[tokio::test]
async fn unknown_session_is_404_and_exists_false() {
    let app = app().await;
    let missing = Uuid::new_v4();

    let (status, _) = send(&app, get(&format!("/sessions/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get(&format!("/sessions/{missing}/exists"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exists"], false);

    let (status, _) = send(&app, get(&format!("/sessions/{missing}/feed"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let (status, body) = send(
        &app,
        json_request("POST", "/sessions", json!({ "username": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Username must not be blank"));

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/sessions/{id}/join"), json!({ "username": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/sessions/{id}/status"),
            json!({ "status": "finished" }),
        ),
    )
    .await;
    assert!(status.is_client_error());
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/messages"),
            json!({ "user_id": "alice", "content": "   " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn malformed_bodies_render_json_errors() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sessions/{id}/join"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let request = Request::builder()
        .method("POST")
        .uri(format!("/sessions/{id}/join"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"username":"bob"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn create_session_without_body_starts_empty() {
    let app = app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/sessions")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["users"], json!([]));
    assert_eq!(body["status"], "waiting");
}

#[tokio::test]
async fn blank_image_url_is_treated_as_absent() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/messages"),
            json!({ "user_id": "alice", "content": "hi", "image_url": "" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["image_url"], Value::Null);
}

#[tokio::test]
async fn long_ai_replies_are_accepted() {
    let app = app().await;
    let id = create_session(&app, "alice").await;
    let reply = "r".repeat(2500);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/messages/ai"),
            json!({ "content": reply }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["text"].as_str().unwrap().len(), 2500);
}

#[tokio::test]
async fn message_flow() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let (status, posted) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/messages"),
            json!({ "user_id": "alice", "content": "I summon a dragon" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posted["sender"], "user");

    let (status, ai) = send(
        &app,
        json_request(
            "POST",
            &format!("/sessions/{id}/messages/ai"),
            json!({ "content": "The dragon roars" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ai["sender"], "ai");
    assert_eq!(ai["user_id"], Value::Null);

    let (_, list) = send(&app, get(&format!("/sessions/{id}/messages"))).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (_, recent) = send(&app, get(&format!("/sessions/{id}/messages/recent?count=1"))).await;
    assert_eq!(recent.as_array().unwrap().len(), 1);

    let (_, stats) = send(&app, get(&format!("/sessions/{id}/messages/stats"))).await;
    assert_eq!(stats["count"], 2);
    assert_eq!(stats["ai_count"], 1);
    assert_eq!(stats["has_ai_messages"], true);

    let message_id = posted["id"].as_str().unwrap();
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/sessions/{id}/messages/{message_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stats) = send(&app, get(&format!("/sessions/{id}/messages/stats"))).await;
    assert_eq!(stats["count"], 1);
}

#[tokio::test]
async fn ai_callback_checks_secret() {
    let mut config = AppConfig::default();
    config.webhook.secret = Some("s3cret".into());
    let app = app_with(config).await;
    let id = create_session(&app, "alice").await;
    let uri = format!("/sessions/{id}/messages/ai");

    let (status, _) = send(&app, json_request("POST", &uri, json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = json_request("POST", &uri, json!({ "content": "hi" }));
    request
        .headers_mut()
        .insert("x-webhook-secret", "s3cret".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn feed_stream_opens_for_existing_session() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(get(&format!("/sessions/{id}/feed")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = app().await;
    let (status, body) = send(&app, get("/api-doc/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/sessions/{id}/join"].is_object());
}

async fn next_text_frame(
    socket: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_feed_relays_events() {
    let app = app().await;
    let id = create_session(&app, "alice").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, served).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/sessions/{id}/ws"))
        .await
        .unwrap();

    let handshake = next_text_frame(&mut socket).await;
    assert_eq!(handshake["type"], "feed.connected");
    assert_eq!(handshake["data"]["session_id"], id);
    assert_eq!(handshake["data"]["degraded"], false);

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/sessions/{id}/join"), json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let update = next_text_frame(&mut socket).await;
    assert_eq!(update["type"], "session.updated");
    assert_eq!(update["data"]["users"], json!(["alice", "bob"]));

    socket
        .send(WsMessage::Text(
            json!({ "type": "message", "user_id": "bob", "content": "roar" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let frame = next_text_frame(&mut socket).await;
        if frame["type"] == "message.created" {
            assert_eq!(frame["data"]["text"], "roar");
        }
        kinds.push(frame["type"].as_str().unwrap().to_string());
    }
    kinds.sort();
    assert_eq!(kinds, ["ack", "message.created"]);
}
