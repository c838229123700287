//! One conversation turn over a single stream

use futures::StreamExt;
use tokio::time::Instant;

use super::connection::AssistChannel;
use super::event::{self, ResponseEvent};
use super::proto::{
    AssistConfig, AssistRequest, AudioOutConfig, DebugConfig, DeviceConfig, DialogStateIn,
    assist_config, assist_request, audio_out_config,
};
use crate::Result;
use crate::audio::{AudioSink, decode_pcm16};
use crate::config::AssistantConfig;
use crate::error::RecvError;

/// Everything sent in the single outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRequest {
    pub query_text: String,
    pub language_code: String,
    pub is_new_conversation: bool,
    pub conversation_state: Option<Vec<u8>>,
    pub text_only: bool,
    pub sample_rate_hz: u32,
    pub volume_percent: i32,
    pub device_id: String,
    pub device_model_id: String,
    pub return_debug_info: bool,
}

impl ConversationRequest {
    /// Start a new conversation for `query_text`
    #[must_use]
    pub fn new(query_text: impl Into<String>, text_only: bool, config: &AssistantConfig) -> Self {
        Self {
            query_text: query_text.into(),
            language_code: config.language_code.clone(),
            is_new_conversation: true,
            conversation_state: None,
            text_only,
            sample_rate_hz: config.sample_rate_hz,
            volume_percent: config.volume_percent,
            device_id: config.device_id.clone(),
            device_model_id: config.device_model_id.clone(),
            return_debug_info: config.return_debug_info,
        }
    }

    #[must_use]
    pub const fn audio_output_enabled(&self) -> bool {
        !self.text_only
    }

    /// Build the wire frame
    #[must_use]
    pub fn to_assist_request(&self) -> AssistRequest {
        let config = AssistConfig {
            r#type: Some(assist_config::Type::TextQuery(self.query_text.clone())),
            audio_out_config: Some(AudioOutConfig {
                encoding: audio_out_config::Encoding::Linear16 as i32,
                sample_rate_hertz: i32::try_from(self.sample_rate_hz).unwrap_or(i32::MAX),
                volume_percentage: self.volume_percent,
            }),
            dialog_state_in: Some(DialogStateIn {
                conversation_state: self.conversation_state.clone().unwrap_or_default(),
                language_code: self.language_code.clone(),
                is_new_conversation: self.is_new_conversation,
            }),
            device_config: Some(DeviceConfig {
                device_id: self.device_id.clone(),
                device_model_id: self.device_model_id.clone(),
            }),
            debug_config: Some(DebugConfig {
                return_debug_info: self.return_debug_info,
            }),
        };

        AssistRequest {
            r#type: Some(assist_request::Type::Config(config)),
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Display text, or the fallback phrase
    pub text: String,

    /// Opaque state the service returned for a follow-up turn
    pub conversation_state: Vec<u8>,
}

/// Drives one stream from request to answer
pub struct Session {
    channel: Box<dyn AssistChannel>,
    sink: Option<Box<dyn AudioSink>>,
    deadline: Instant,
    fallback_text: String,
}

impl Session {
    #[must_use]
    pub fn new(
        channel: Box<dyn AssistChannel>,
        deadline: Instant,
        fallback_text: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            sink: None,
            deadline,
            fallback_text: fallback_text.into(),
        }
    }

    /// Render audio chunks to `sink`
    #[must_use]
    pub fn with_audio(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Send the request and consume the response stream
    ///
    /// In text-only mode the first dialog state update ends the turn. Otherwise
    /// the stream is read to the end and queued audio is drained.
    ///
    /// # Errors
    ///
    /// Returns `Error::Send` if the stream cannot be opened, `Error::Recv` if a
    /// receive fails or the deadline passes
    pub async fn run(mut self, request: &ConversationRequest) -> Result<Turn> {
        let mut responses = self.channel.open_stream(request.to_assist_request()).await?;
        tracing::debug!(query = %request.query_text, text_only = request.text_only, "query sent");

        let mut text: Option<String> = None;
        let mut conversation_state = Vec::new();

        loop {
            let Ok(next) = tokio::time::timeout_at(self.deadline, responses.next()).await else {
                tracing::warn!("conversation deadline exceeded");
                return Err(RecvError::DeadlineExceeded.into());
            };
            let Some(response) = next else {
                break;
            };

            for event in event::decode(response?) {
                match event {
                    ResponseEvent::EndOfUtterance => {
                        tracing::debug!("end of user utterance");
                    }
                    ResponseEvent::DialogStateUpdate {
                        display_text,
                        conversation_state: state,
                    } => {
                        if !state.is_empty() {
                            conversation_state = state;
                        }
                        if text.is_none() && !display_text.is_empty() {
                            tracing::info!(text = %display_text, "assistant answered");
                            text = Some(display_text);
                        }
                        if request.text_only {
                            return Ok(self.turn(text, conversation_state));
                        }
                    }
                    ResponseEvent::AudioChunk(bytes) => self.render(&bytes).await?,
                    ResponseEvent::DebugInfo(json) => {
                        tracing::debug!(debug_info = %json, "debug info");
                    }
                }
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.finish().await {
                tracing::warn!(error = %e, "audio drain failed");
            }
        }

        Ok(self.turn(text, conversation_state))
    }

    /// Write one chunk to the sink, if any
    ///
    /// Bad chunks and failed writes are skipped; only the deadline aborts.
    async fn render(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };

        let samples = match decode_pcm16(bytes) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "skipping audio chunk");
                return Ok(());
            }
        };

        match tokio::time::timeout_at(self.deadline, sink.write(&samples)).await {
            Ok(Ok(())) => {
                tracing::trace!(samples = samples.len(), "audio chunk queued");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "audio write failed");
                Ok(())
            }
            Err(_) => Err(RecvError::DeadlineExceeded.into()),
        }
    }

    fn turn(&self, text: Option<String>, conversation_state: Vec<u8>) -> Turn {
        Turn {
            text: text.unwrap_or_else(|| self.fallback_text.clone()),
            conversation_state,
        }
    }
}
