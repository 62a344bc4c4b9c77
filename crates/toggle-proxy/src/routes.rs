//! warp filters for the chat proxy
//!
//! Every chat route validates its body, forwards it to the same path on the
//! backend and maps the answer through the [`ChatReply`] allow-list. Failures
//! never leak backend bodies verbatim:
//! - Validation: 400 `{error}`
//! - Backend non-2xx: 500 `{error}` carrying the backend's message
//! - Backend unreachable: 500 with the success-shaped fallback reply
//!
//! Metrics routes pass the backend body through and answer failures with
//! `{error, status: "error"}`.

use crate::upstream::{Upstream, UpstreamReply};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use toggle_core::{ChatError, ChatReply, ChatRequest, ErrorBody, Industry, RequestId};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Reply};

/// Message for a metrics call without `request_id`
pub const MISSING_REQUEST_ID: &str = "Missing 'request_id' query parameter";
/// Message for an evaluation id that is not a single path segment
pub const INVALID_REQUEST_ID: &str = "Invalid request id";

/// Shared handler state
#[derive(Clone)]
pub struct ProxyState {
    upstream: Arc<dyn Upstream>,
    industry: Industry,
}

impl ProxyState {
    /// Create state
    #[must_use]
    pub fn new(upstream: Arc<dyn Upstream>, industry: Industry) -> Self {
        Self { upstream, industry }
    }
}

/// All proxy routes
#[must_use]
pub fn routes(state: ProxyState) -> BoxedFilter<(Response,)> {
    chat_route("chat-multiagent", true, state.clone())
        .or(chat_route("chat-togglehealth", true, state.clone()))
        .unify()
        .or(chat_route("chat", false, state.clone()))
        .unify()
        .or(metrics_route("chat-metrics", state.clone()))
        .unify()
        .or(metrics_route("chat-metrics-togglehealth", state.clone()))
        .unify()
        .or(evaluation_route(state.clone()))
        .unify()
        .or(health_route(state))
        .unify()
        .boxed()
}

fn with_state(
    state: ProxyState,
) -> impl Filter<Extract = (ProxyState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn chat_route(
    name: &'static str,
    require_config_key: bool,
    state: ProxyState,
) -> BoxedFilter<(Response,)> {
    warp::post()
        .and(warp::path("api"))
        .and(warp::path(name))
        .and(warp::path::end())
        .and(warp::body::bytes())
        .and(with_state(state))
        .then(move |body: Bytes, state: ProxyState| {
            forward_chat(state, name, require_config_key, body)
        })
        .boxed()
}

fn metrics_route(name: &'static str, state: ProxyState) -> BoxedFilter<(Response,)> {
    warp::get()
        .and(warp::path("api"))
        .and(warp::path(name))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state))
        .then(move |query: HashMap<String, String>, state: ProxyState| {
            forward_metrics(state, name, query)
        })
        .boxed()
}

fn evaluation_route(state: ProxyState) -> BoxedFilter<(Response,)> {
    warp::get()
        .and(warp::path!("api" / "evaluation" / String))
        .and(with_state(state))
        .then(|request_id: String, state: ProxyState| forward_evaluation(state, request_id))
        .boxed()
}

fn health_route(state: ProxyState) -> BoxedFilter<(Response,)> {
    warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(with_state(state))
        .map(|state: ProxyState| {
            record("health", "ok");
            json_reply(
                StatusCode::OK,
                &json!({"status": "ok", "industry": state.industry.as_str()}),
            )
        })
        .boxed()
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn record(route: &'static str, outcome: &'static str) {
    metrics::counter!("toggle_proxy_requests_total", "route" => route, "outcome" => outcome)
        .increment(1);
}

async fn forward_chat(
    state: ProxyState,
    name: &'static str,
    require_config_key: bool,
    body: Bytes,
) -> Response {
    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let request = match ChatRequest::from_json(&value, require_config_key) {
        Ok(request) => request,
        Err(err) => {
            record(name, "invalid");
            return json_reply(StatusCode::BAD_REQUEST, &ErrorBody::new(err.to_string()));
        }
    };
    let forwarded = match serde_json::to_value(&request) {
        Ok(value) => value,
        Err(err) => {
            record(name, "error");
            return json_reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrorBody::new(err.to_string()));
        }
    };

    let path = format!("/api/{name}");
    tracing::info!(route = name, chars = request.user_input.len(), "forwarding chat query");

    match state.upstream.post_json(&path, &forwarded).await {
        Ok(reply) if reply.is_success() => match serde_json::from_slice::<ChatReply>(&reply.body) {
            Ok(chat) => {
                record(name, "ok");
                json_reply(StatusCode::OK, &chat)
            }
            Err(err) => {
                tracing::error!(route = name, error = %err, "backend reply is not a chat reply");
                record(name, "error");
                json_reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrorBody::new(err.to_string()))
            }
        },
        Ok(reply) => {
            let message = backend_message(&reply);
            tracing::error!(
                route = name,
                status = reply.status,
                %message,
                "backend rejected chat query"
            );
            record(name, "upstream_error");
            json_reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrorBody::new(message))
        }
        Err(err @ ChatError::Transport(_)) => {
            tracing::error!(route = name, error = %err, "backend unreachable");
            record(name, "unreachable");
            json_reply(StatusCode::INTERNAL_SERVER_ERROR, &ChatReply::transport_fallback())
        }
        Err(err) => {
            tracing::error!(route = name, error = %err, "chat forwarding failed");
            record(name, "error");
            json_reply(StatusCode::INTERNAL_SERVER_ERROR, &ErrorBody::new(err.user_message()))
        }
    }
}

async fn forward_metrics(
    state: ProxyState,
    name: &'static str,
    query: HashMap<String, String>,
) -> Response {
    let Some(request_id) = query
        .get("request_id")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        record(name, "invalid");
        return json_reply(StatusCode::BAD_REQUEST, &ErrorBody::new(MISSING_REQUEST_ID));
    };

    tracing::debug!(route = name, %request_id, "forwarding metrics poll");
    let path = format!("/api/{name}");
    let result = state
        .upstream
        .get(&path, &[("request_id".to_string(), request_id)])
        .await;
    pass_through(name, result)
}

async fn forward_evaluation(state: ProxyState, request_id: String) -> Response {
    let Some(request_id) = RequestId::parse(&request_id).filter(RequestId::is_path_safe) else {
        tracing::warn!(%request_id, "rejecting evaluation id");
        record("evaluation", "invalid");
        return json_reply(
            StatusCode::BAD_REQUEST,
            &json!({"error": INVALID_REQUEST_ID, "status": "error"}),
        );
    };

    tracing::debug!(%request_id, "forwarding evaluation poll");
    let path = format!("/api/evaluation/{request_id}");
    let result = state.upstream.get(&path, &[]).await;
    pass_through("evaluation", result)
}

/// Relay a JSON body unchanged, or the metrics error shape
fn pass_through(route: &'static str, result: Result<UpstreamReply, ChatError>) -> Response {
    let error = match result {
        Ok(reply) if reply.is_success() => match serde_json::from_slice::<Value>(&reply.body) {
            Ok(body) => {
                record(route, "ok");
                return json_reply(StatusCode::OK, &body);
            }
            Err(err) => err.to_string(),
        },
        Ok(reply) => format!("Backend responded with status: {}", reply.status),
        Err(err) => err.user_message(),
    };

    tracing::error!(route, %error, "metrics forwarding failed");
    record(route, "error");
    json_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({"error": error, "status": "error"}),
    )
}

fn backend_message(reply: &UpstreamReply) -> String {
    ErrorBody::extract(&reply.body)
        .unwrap_or_else(|| format!("Backend responded with status: {}", reply.status))
}
