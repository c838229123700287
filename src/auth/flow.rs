//! OAuth2 authorization-code flow with a cached, refreshable token
//!
//! ```text
//! Idle ──cached token valid──────────────────────────────────────▶ Done
//!  │
//!  └─▶ AwaitingUserConsent ─▶ AwaitingCallback ─▶ Exchanged ─▶ Done
//!             (any step may end in Failed)
//! ```

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use url::Url;
use uuid::Uuid;

use super::browser::{SystemBrowser, UrlOpener};
use super::callback::{self, Callback};
use super::store::{self, ClientIdentity, Token};
use crate::config::AuthConfig;
use crate::error::AuthorizationError;
use crate::{Error, Result};

/// Progress of the authorization flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing attempted yet
    Idle,
    /// Browser opened, waiting for the user
    AwaitingUserConsent,
    /// Listener running, waiting for the redirect
    AwaitingCallback,
    /// Code received, talking to the token endpoint
    Exchanged,
    /// A usable token is held
    Done,
    /// Last attempt failed
    Failed,
}

/// Tunables for the consent flow
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub scopes: Vec<String>,
    pub callback_timeout: Duration,
    pub shutdown_grace: Duration,
    pub exchange_timeout: Duration,
    pub confirmation_url: String,
}

impl From<&AuthConfig> for FlowSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            scopes: config.scopes.clone(),
            callback_timeout: config.callback_timeout,
            shutdown_grace: config.shutdown_grace,
            exchange_timeout: config.exchange_timeout,
            confirmation_url: config.confirmation_url.clone(),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self.refresh_token,
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }
}

/// Acquires and caches the user's OAuth2 token
///
/// Holds the token for the life of the process; concurrent callers of
/// [`Authorizer::authorize`] are serialized so only one flow runs at a time.
pub struct Authorizer {
    identity: ClientIdentity,
    cache_path: PathBuf,
    settings: FlowSettings,
    http: reqwest::Client,
    opener: Arc<dyn UrlOpener>,
    token: tokio::sync::Mutex<Option<Token>>,
    state: Mutex<AuthState>,
}

impl Authorizer {
    /// Create an authorizer that opens the system browser
    #[must_use]
    pub fn new(
        identity: ClientIdentity,
        cache_path: impl Into<PathBuf>,
        settings: FlowSettings,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(settings.exchange_timeout)
            .connect_timeout(settings.exchange_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            identity,
            cache_path: cache_path.into(),
            settings,
            http,
            opener: Arc::new(SystemBrowser),
            token: tokio::sync::Mutex::new(None),
            state: Mutex::new(AuthState::Idle),
        }
    }

    /// Replace the URL opener
    #[must_use]
    pub fn with_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Current flow state
    #[must_use]
    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Client identity in use
    #[must_use]
    pub const fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    fn transition(&self, next: AuthState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "authorization state");
        *state = next;
    }

    /// Return a usable token, running the consent flow only when needed
    ///
    /// # Errors
    ///
    /// Returns `Error::Authorization` if the listener cannot bind, the callback
    /// never arrives, or the token endpoint rejects the code
    pub async fn authorize(&self) -> Result<Token> {
        let mut held = self.token.lock().await;
        if let Some(token) = held.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.clone());
        }

        self.transition(AuthState::Idle);
        let token = if let Some(token) = self.from_cache().await {
            token
        } else {
            match self.consent_flow().await {
                Ok(token) => token,
                Err(e) => {
                    self.transition(AuthState::Failed);
                    return Err(e);
                }
            }
        };

        self.transition(AuthState::Done);
        tracing::info!("successfully authenticated");
        *held = Some(token.clone());
        Ok(token)
    }

    /// Build the consent URL for a given anti-forgery `state`
    ///
    /// # Errors
    ///
    /// Returns error if the identity's authorization endpoint is not a URL
    pub fn authorization_url(&self, csrf: &str) -> Result<Url> {
        let mut url = Url::parse(&self.identity.authorization_endpoint)
            .map_err(|e| Error::Config(format!("invalid authorization endpoint: {e}")))?;

        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("client_id", self.identity.client_id.as_str())
            .append_pair("redirect_uri", self.identity.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("state", csrf);

        Ok(url)
    }

    /// Cached token, refreshed if it expired and can be
    async fn from_cache(&self) -> Option<Token> {
        let cached = store::load_cached_token(&self.cache_path)?;
        if cached.is_valid() {
            return Some(cached);
        }

        if !cached.is_refreshable() {
            tracing::info!("cached token expired, re-authorizing");
            return None;
        }

        match self.refresh(&cached).await {
            Ok(token) => {
                if let Err(e) = store::save_token(&self.cache_path, &token) {
                    tracing::warn!(error = %e, "failed to cache refreshed token");
                }
                tracing::debug!("refreshed cached token");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, re-authorizing");
                None
            }
        }
    }

    async fn refresh(&self, expired: &Token) -> Result<Token> {
        let refresh_token = expired.refresh_token.as_deref().unwrap_or_default();
        let mut token = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.identity.client_id.as_str()),
                ("client_secret", self.identity.secret()),
            ])
            .await?;

        if token.refresh_token.is_none() {
            token.refresh_token.clone_from(&expired.refresh_token);
        }
        Ok(token)
    }

    async fn consent_flow(&self) -> Result<Token> {
        let csrf = Uuid::new_v4().simple().to_string();
        let url = self.authorization_url(&csrf)?;
        let (addr, path) = callback_binding(&self.identity.redirect_uri)?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthorizationError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        let (callback_tx, callback_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = callback::router(&path, &csrf, &self.settings.confirmation_url, callback_tx);
        let server = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .into_future(),
        );
        tracing::debug!(%addr, %path, "callback listener started");

        self.transition(AuthState::AwaitingUserConsent);
        match self.opener.open(url.as_str()) {
            Ok(()) => tracing::info!(%url, "opened browser for authorization"),
            Err(e) => tracing::warn!(
                error = %e,
                %url,
                "could not open a browser, visit the URL manually"
            ),
        }
        self.transition(AuthState::AwaitingCallback);

        let outcome = self.await_callback(callback_rx).await;

        // Let the browser follow the redirect before the listener goes away
        if outcome.is_ok() && !self.settings.shutdown_grace.is_zero() {
            tokio::time::sleep(self.settings.shutdown_grace).await;
        }
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => tracing::debug!("callback listener stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "callback listener failed"),
            Err(e) => tracing::warn!(error = %e, "callback listener task panicked"),
        }

        outcome
    }

    async fn await_callback(&self, mut callbacks: mpsc::Receiver<Callback>) -> Result<Token> {
        let timeout = self.settings.callback_timeout;
        let Ok(received) = tokio::time::timeout(timeout, callbacks.recv()).await else {
            return Err(AuthorizationError::Timeout(timeout).into());
        };
        let Some(callback) = received else {
            return Err(AuthorizationError::Listener(
                "listener stopped before a callback arrived".to_string(),
            )
            .into());
        };

        let code = match callback.outcome {
            Ok(code) => code,
            Err(reason) => {
                let _ = callback.reply.send(false);
                return Err(AuthorizationError::Denied(reason).into());
            }
        };

        self.transition(AuthState::Exchanged);
        let result = self.exchange_code(&code).await.and_then(|token| {
            store::save_token(&self.cache_path, &token)
                .map_err(|e| AuthorizationError::Persist(e.to_string()))?;
            Ok(token)
        });
        let _ = callback.reply.send(result.is_ok());
        result
    }

    async fn exchange_code(&self, code: &str) -> Result<Token> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.identity.redirect_uri.as_str()),
            ("client_id", self.identity.client_id.as_str()),
            ("client_secret", self.identity.secret()),
        ])
        .await
    }

    /// POST to the token endpoint, bounded by the exchange timeout
    async fn request_token(&self, params: &[(&str, &str)]) -> Result<Token> {
        let limit = self.settings.exchange_timeout;
        tokio::time::timeout(limit, self.post_token(params))
            .await
            .map_err(|_| AuthorizationError::ExchangeTimeout(limit))?
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<Token> {
        let response = self
            .http
            .post(&self.identity.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthorizationError::ExchangeRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let granted: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Ok(granted.into_token())
    }

    fn transport_error(&self, e: &reqwest::Error) -> AuthorizationError {
        if e.is_timeout() {
            AuthorizationError::ExchangeTimeout(self.settings.exchange_timeout)
        } else {
            AuthorizationError::Exchange(e.to_string())
        }
    }
}

/// Split a loopback redirect URI into a bind address and route path
fn callback_binding(redirect_uri: &str) -> Result<(String, String)> {
    let invalid =
        |reason: &str| AuthorizationError::InvalidRedirect(format!("{redirect_uri}: {reason}"));

    let url = Url::parse(redirect_uri).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("only http loopback redirects can be served").into());
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;

    Ok((format!("{host}:{port}"), url.path().to_string()))
}
