//! Loopback HTTP listener that receives the OAuth2 redirect

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

/// A browser callback forwarded to the authorization controller
#[derive(Debug)]
pub struct Callback {
    /// Authorization code, or the provider's error string
    pub outcome: std::result::Result<String, String>,
    /// Whether the exchange succeeded, reported back to the handler
    pub reply: oneshot::Sender<bool>,
}

/// Query parameters of the redirect
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    confirmation_url: Arc<str>,
    callbacks: mpsc::Sender<Callback>,
}

/// Build the callback router serving `path`
///
/// Each accepted callback is sent on `callbacks`; the handler waits for the
/// controller's verdict before answering the browser.
pub fn router(
    path: &str,
    expected_state: &str,
    confirmation_url: &str,
    callbacks: mpsc::Sender<Callback>,
) -> Router {
    let state = CallbackState {
        expected_state: Arc::from(expected_state),
        confirmation_url: Arc::from(confirmation_url),
        callbacks,
    };

    Router::new()
        .route(path, get(handle_callback))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    // Only the browser we sent to the consent page knows the state
    if params.state.as_deref() != Some(&*state.expected_state) {
        tracing::warn!("ignoring callback without matching state");
        return (StatusCode::BAD_REQUEST, "state mismatch").into_response();
    }

    if let Some(error) = params.error {
        tracing::warn!(%error, "authorization callback reported an error");
        let (reply, _) = oneshot::channel();
        let _ = state
            .callbacks
            .send(Callback {
                outcome: Err(error),
                reply,
            })
            .await;
        return (
            StatusCode::FORBIDDEN,
            "Authorization was denied. You can close this window.",
        )
            .into_response();
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing authorization code").into_response();
    };

    let (reply, verdict) = oneshot::channel();
    let forwarded = state
        .callbacks
        .send(Callback {
            outcome: Ok(code),
            reply,
        })
        .await;
    if forwarded.is_err() {
        return (StatusCode::GONE, "authorization already finished").into_response();
    }

    match verdict.await {
        Ok(true) => Redirect::temporary(&state.confirmation_url).into_response(),
        _ => (
            StatusCode::BAD_GATEWAY,
            "Token exchange failed. Check the application log.",
        )
            .into_response(),
    }
}
