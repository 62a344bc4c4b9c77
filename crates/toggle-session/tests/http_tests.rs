//! HTTP backend and push channel against in-process warp servers

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use toggle_core::{ChatError, ChatRequest, MetricsPoll, PushEvent, RequestId};
use toggle_session::{ChatBackend, Endpoints, HttpBackend, PushChannel, PushConfig};
use warp::Filter;

macro_rules! spawn_server {
    ($routes:expr) => {{
        let (addr, server) = warp::serve($routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }};
}

#[tokio::test]
async fn chat_reply_is_decoded() {
    let routes = warp::post()
        .and(warp::path!("api" / "chat-togglehealth"))
        .and(warp::body::json())
        .map(|body: serde_json::Value| {
            assert_eq!(body["aiConfigKey"], "health_cfg");
            warp::reply::json(&json!({
                "response": "Covered.",
                "requestId": "r-1",
                "agentFlow": null,
                "pendingMetrics": true,
                "internalOnly": 42,
            }))
        });
    let addr: SocketAddr = spawn_server!(routes);
    let backend = HttpBackend::with_endpoints(format!("http://{addr}"), Endpoints::togglehealth())
        .unwrap();

    let reply = backend
        .send_chat(&ChatRequest::new("hi").with_config_key("health_cfg"))
        .await
        .unwrap();

    assert_eq!(reply.answer_text(), "Covered.");
    assert!(reply.agent_flow.is_empty());
    assert_eq!(reply.pending_request().unwrap().as_str(), "r-1");
}

#[tokio::test]
async fn error_body_becomes_upstream_error() {
    let routes = warp::path!("api" / "chat-multiagent").map(|| {
        warp::reply::with_status(
            warp::reply::json(&json!({"error": "upstream timeout"})),
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        )
    });
    let addr: SocketAddr = spawn_server!(routes);
    let backend = HttpBackend::new(format!("http://{addr}")).unwrap();

    let err = backend.send_chat(&ChatRequest::new("hi")).await.unwrap_err();
    assert_eq!(err, ChatError::upstream(500, "upstream timeout"));
    assert_eq!(err.user_message(), "upstream timeout");
}

#[tokio::test]
async fn metrics_poll_sends_request_id() {
    let routes = warp::path!("api" / "chat-metrics")
        .and(warp::query::<std::collections::HashMap<String, String>>())
        .map(|query: std::collections::HashMap<String, String>| {
            let status = if query.get("request_id").map(String::as_str) == Some("abc123") {
                "pending"
            } else {
                "unknown"
            };
            warp::reply::json(&json!({ "status": status }))
        });
    let addr: SocketAddr = spawn_server!(routes);
    let backend = HttpBackend::new(format!("http://{addr}")).unwrap();

    let known = backend
        .poll_metrics(&RequestId::parse("abc123").unwrap())
        .await
        .unwrap();
    let unknown = backend
        .poll_metrics(&RequestId::parse("zzz").unwrap())
        .await
        .unwrap();
    assert_eq!(known, MetricsPoll::Pending);
    assert_eq!(unknown, MetricsPoll::Unknown);
}

#[tokio::test]
async fn push_channel_fans_out_until_normal_close() {
    let routes = warp::path!("ws" / "flag-monitor")
        .and(warp::ws())
        .map(|ws: warp::ws::Ws| {
            ws.on_upgrade(|mut socket| async move {
                let frames = [
                    json!({"type": "initial_flag_value", "current_value": "banking"}),
                    json!({"type": "pong"}),
                    json!({"type": "flag_change", "flag_key": "nt-toggle-rag-demo",
                           "old_value": "banking", "new_value": "health"}),
                ];
                for frame in frames {
                    let _ = socket.send(warp::ws::Message::text(frame.to_string())).await;
                }
                let _ = socket
                    .send(warp::ws::Message::close_with(1000u16, "done"))
                    .await;
                while socket.next().await.is_some() {}
            })
        });
    let addr: SocketAddr = spawn_server!(routes);

    let channel = PushChannel::open(PushConfig::for_backend(&format!("http://{addr}")));
    let mut subscription = channel.subscribe();

    let first = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap();
    assert_eq!(
        first,
        Some(PushEvent::InitialFlagValue {
            current_value: Some("banking".into())
        })
    );
    let second = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap();
    assert!(matches!(second, Some(PushEvent::FlagChange { .. })));

    tokio::time::timeout(Duration::from_secs(5), async {
        while channel.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    channel.close().await;
}
