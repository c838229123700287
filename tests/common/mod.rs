//! Shared test utilities

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use secrecy::SecretString;
use tokio::time::Instant;

use pyspa_assistant::assistant::proto::{
    AssistRequest, AssistResponse, AudioOut, DialogStateOut, assist_response,
};
use pyspa_assistant::assistant::{AssistChannel, Connector, ResponseStream};
use pyspa_assistant::auth::{Authorizer, ClientIdentity, FlowSettings, Token, save_token};
use pyspa_assistant::config::AuthConfig;
use pyspa_assistant::{AudioOutput, AudioSink, Error, RecvError, Result};

/// One scripted step of a response stream
#[derive(Clone)]
pub enum Step {
    Respond(AssistResponse),
    Delay(Duration),
    Fail(String),
    /// Never yields again
    Hang,
}

pub fn dialog(text: &str) -> Step {
    Step::Respond(AssistResponse {
        dialog_state_out: Some(DialogStateOut {
            supplemental_display_text: text.to_string(),
            conversation_state: vec![7, 7],
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn audio(bytes: &[u8]) -> Step {
    Step::Respond(AssistResponse {
        audio_out: Some(AudioOut {
            audio_data: bytes.to_vec(),
        }),
        ..Default::default()
    })
}

pub fn end_of_utterance() -> Step {
    Step::Respond(AssistResponse {
        event_type: assist_response::EventType::EndOfUtterance as i32,
        ..Default::default()
    })
}

/// Connector that replays the same script on every stream
#[derive(Default)]
pub struct ScriptedConnector {
    script: Vec<Step>,
    pub connects: AtomicUsize,
    pub sent: Arc<Mutex<Vec<AssistRequest>>>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Default::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<AssistRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _token: &Token, _deadline: Instant) -> Result<Box<dyn AssistChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChannel {
            script: self.script.clone(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct ScriptedChannel {
    script: Vec<Step>,
    sent: Arc<Mutex<Vec<AssistRequest>>>,
}

#[async_trait]
impl AssistChannel for ScriptedChannel {
    async fn open_stream(&mut self, request: AssistRequest) -> Result<ResponseStream> {
        self.sent.lock().unwrap().push(request);

        let steps = std::mem::take(&mut self.script).into_iter();
        let stream = futures::stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.next()? {
                    Step::Respond(response) => return Some((Ok(response), steps)),
                    Step::Fail(reason) => {
                        return Some((Err(Error::Recv(RecvError::Stream(reason))), steps));
                    }
                    Step::Delay(delay) => tokio::time::sleep(delay).await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        });
        Ok(stream.boxed())
    }
}

/// Audio output that records every write
#[derive(Default)]
pub struct RecordingOutput {
    pub unavailable: bool,
    pub opens: AtomicUsize,
    pub writes: Arc<Mutex<Vec<Vec<i16>>>>,
    pub finishes: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl RecordingOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Default::default()
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<Vec<i16>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    /// Sinks dropped so far
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingOutput {
    fn open(&self, _sample_rate_hz: u32, _chunk_frames: usize) -> Result<Box<dyn AudioSink>> {
        if self.unavailable {
            return Err(Error::DeviceUnavailable("no output device available".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSink {
            writes: Arc::clone(&self.writes),
            finishes: Arc::clone(&self.finishes),
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct RecordingSink {
    writes: Arc<Mutex<Vec<Vec<i16>>>>,
    finishes: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.writes.lock().unwrap().push(samples.to_vec());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Client identity pointing at a local token endpoint and redirect port
pub fn identity(token_endpoint: &str, redirect_uri: &str) -> ClientIdentity {
    ClientIdentity {
        client_id: "test-client".to_string(),
        client_secret: SecretString::from("test-secret".to_string()),
        authorization_endpoint: "https://accounts.example.com/o/oauth2/auth".to_string(),
        token_endpoint: token_endpoint.to_string(),
        redirect_uri: redirect_uri.to_string(),
    }
}

/// Flow settings with short timeouts
pub fn settings() -> FlowSettings {
    FlowSettings {
        callback_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(20),
        ..FlowSettings::from(&AuthConfig::default())
    }
}

pub fn valid_token(access_token: &str) -> Token {
    Token {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expiry: Some(Utc::now() + chrono::Duration::hours(1)),
    }
}

pub fn expired_token(access_token: &str, refresh_token: Option<&str>) -> Token {
    Token {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expiry: Some(Utc::now() - chrono::Duration::hours(1)),
    }
}

/// Authorizer whose cache already holds a valid token
pub fn cached_authorizer(dir: &Path) -> Authorizer {
    let cache = dir.join("oauthToken.cache");
    save_token(&cache, &valid_token("cached-access")).unwrap();
    Authorizer::new(
        identity("http://127.0.0.1:9/token", "http://127.0.0.1:9"),
        cache,
        settings(),
    )
}

/// A loopback port that was free a moment ago
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
