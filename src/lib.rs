//! pyspa assistant - text queries to the embedded assistant service
//!
//! This library provides:
//! - OAuth2 user authorization with a cached token and loopback callback
//! - An authenticated gRPC channel to the assistant service
//! - One-shot text conversations returning the assistant's display text
//! - Playback of the spoken reply through the local audio device
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Assistant::ask(text, text_only)        │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  Authorizer (token cache, browser consent)    │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  Connector ─▶ Session ─▶ AudioSink (cpal)     │
//! └──────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod audio;
pub mod auth;
pub mod config;
pub mod error;

pub use assistant::{Assistant, AssistChannel, Connector, GrpcConnector, ResponseEvent, Turn};
pub use audio::{AudioOutput, AudioSink, CpalOutput};
pub use auth::{AuthState, Authorizer, ClientIdentity, Token};
pub use config::Config;
pub use error::{AuthorizationError, Error, RecvError, Result};
