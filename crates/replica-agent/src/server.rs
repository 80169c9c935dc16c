//! Inbound HTTP listener.
//!
//! Routes:
//! - `POST /message` - controller delivers a message
//! - `POST /directive` - controller sends a lifecycle directive
//! - `POST /timeout` - controller fires a timeout
//! - `/health` - liveness, any method

use crate::agent::AgentInner;
use crate::error::DirectiveError;
use crate::types::{DirectiveRequest, Message, TimeoutFire};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{any, post},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

type Reply = (StatusCode, &'static str);

const BAD_REQUEST: Reply = (StatusCode::BAD_REQUEST, "Not OK!");

pub(crate) fn router(agent: Arc<AgentInner>) -> Router {
    Router::new()
        .route("/message", post(handle_message))
        .route("/directive", post(handle_directive))
        .route("/timeout", post(handle_timeout))
        .route("/health", any(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}

fn decode<T: DeserializeOwned>(route: &str, body: &[u8]) -> Result<T, Reply> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(route, error = %e, "Rejecting malformed request body");
        BAD_REQUEST
    })
}

async fn handle_message(State(agent): State<Arc<AgentInner>>, body: Bytes) -> Reply {
    match decode::<Message>("/message", &body) {
        Ok(message) => {
            agent.deliver(message);
            (StatusCode::OK, "Ok!")
        }
        Err(reply) => reply,
    }
}

async fn handle_directive(State(agent): State<Arc<AgentInner>>, body: Bytes) -> Reply {
    let request = match decode::<DirectiveRequest>("/directive", &body) {
        Ok(request) => request,
        Err(reply) => return reply,
    };

    match agent.handle_directive(&request.action).await {
        Ok(()) => (StatusCode::OK, "Ok"),
        Err(DirectiveError::UnknownAction(action)) => {
            warn!(directive = %action, "Rejected unknown directive");
            BAD_REQUEST
        }
        Err(e) => {
            warn!(directive = %request.action, error = %e, "Directive failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Not Ok!")
        }
    }
}

async fn handle_timeout(State(agent): State<Arc<AgentInner>>, body: Bytes) -> Reply {
    match decode::<TimeoutFire>("/timeout", &body) {
        Ok(fire) => {
            agent.end_timeout(fire);
            (StatusCode::OK, "Ok")
        }
        Err(reply) => reply,
    }
}

async fn handle_health() -> Reply {
    (StatusCode::OK, "Ok!")
}
