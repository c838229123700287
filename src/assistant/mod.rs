//! Conversations with the embedded assistant service
//!
//! ```text
//! Assistant::ask ─▶ Authorizer ─▶ Connector ─▶ Session ─▶ AudioSink
//! ```
//!
//! One [`Assistant`] runs at most one conversation at a time.

mod connection;
mod event;
pub mod proto;
mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub use connection::{AssistChannel, Connector, GrpcConnector, ResponseStream, recv_error};
pub use event::{ResponseEvent, decode};
pub use session::{ConversationRequest, Session, Turn};

use crate::audio::{AudioOutput, AudioSink, CpalOutput};
use crate::auth::{Authorizer, FlowSettings, Token, load_identity};
use crate::config::{AssistantConfig, Config};
use crate::{Error, Result};

/// Text-query client for the assistant service
pub struct Assistant {
    config: AssistantConfig,
    authorizer: Authorizer,
    connector: Arc<dyn Connector>,
    audio: Arc<dyn AudioOutput>,
    session_lock: Mutex<()>,
}

impl Assistant {
    #[must_use]
    pub fn new(
        config: AssistantConfig,
        authorizer: Authorizer,
        connector: Arc<dyn Connector>,
        audio: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            config,
            authorizer,
            connector,
            audio,
            session_lock: Mutex::new(()),
        }
    }

    /// Build the production client: gRPC over TLS, cpal output
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no credential file is configured, or
    /// `Error::CredentialRead` if it cannot be loaded
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = config.assistant.credentials.as_deref().ok_or_else(|| {
            Error::Config(
                "no credential file configured (set PYSPA_ASSISTANT_CREDENTIALS)".to_string(),
            )
        })?;

        let mut identity = load_identity(path)?;
        if let Some(uri) = &config.auth.redirect_uri {
            identity = identity.with_redirect_uri(uri.clone());
        }

        let authorizer = Authorizer::new(
            identity,
            config.auth.token_cache.clone(),
            FlowSettings::from(&config.auth),
        );

        Ok(Self::new(
            config.assistant.clone(),
            authorizer,
            Arc::new(GrpcConnector::new(config.assistant.endpoint.clone())),
            Arc::new(CpalOutput),
        ))
    }

    #[must_use]
    pub const fn config(&self) -> &AssistantConfig {
        &self.config
    }

    #[must_use]
    pub const fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Make sure a usable token exists, running the browser flow if needed
    ///
    /// # Errors
    ///
    /// Returns `Error::Authorization` if the flow fails
    pub async fn authorize(&self) -> Result<Token> {
        self.authorizer.authorize().await
    }

    /// Ask `text` and return the assistant's display text
    ///
    /// With `text_only` false the spoken reply is played before returning.
    ///
    /// # Errors
    ///
    /// Returns error if authorization, connection, or the stream fails
    pub async fn ask(&self, text: &str, text_only: bool) -> Result<String> {
        let turn = self.converse(text, text_only, self.config.deadline).await?;
        Ok(turn.text)
    }

    /// Run one turn bounded by `timeout`
    ///
    /// The budget starts once a token is in hand.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` in audio mode without an output
    /// device, `Error::Connection`, `Error::Send` or `Error::Recv` otherwise
    pub async fn converse(&self, text: &str, text_only: bool, timeout: Duration) -> Result<Turn> {
        let _session = self.session_lock.lock().await;

        let token = self.authorizer.authorize().await?;
        let deadline = Instant::now() + timeout;
        let request = ConversationRequest::new(text, text_only, &self.config);

        let sink = if request.audio_output_enabled() {
            Some(self.open_audio().await?)
        } else {
            None
        };

        let channel = self.connector.connect(&token, deadline).await?;
        let mut session = Session::new(channel, deadline, self.config.fallback_text.clone());
        if let Some(sink) = sink {
            session = session.with_audio(sink);
        }

        let turn = session.run(&request).await?;
        tracing::debug!(
            text_only,
            state_bytes = turn.conversation_state.len(),
            "conversation finished"
        );
        Ok(turn)
    }

    /// Acquire the output device on the blocking pool
    async fn open_audio(&self) -> Result<Box<dyn AudioSink>> {
        let audio = Arc::clone(&self.audio);
        let (rate, frames) = (self.config.sample_rate_hz, self.config.chunk_frames);
        tokio::task::spawn_blocking(move || audio.open(rate, frames))
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("audio open task failed: {e}")))?
    }
}
