//! Authenticated transport to the assistant service

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::Instant;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Code, Status};

use super::proto::embedded_assistant_client::EmbeddedAssistantClient;
use super::proto::{AssistRequest, AssistResponse};
use crate::auth::Token;
use crate::error::RecvError;
use crate::{Error, Result};

/// Inbound half of one conversation stream
pub type ResponseStream = BoxStream<'static, Result<AssistResponse>>;

/// Produces channels bound to a token and a deadline
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect before `deadline`
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the endpoint is unreachable or the deadline expires
    async fn connect(&self, token: &Token, deadline: Instant) -> Result<Box<dyn AssistChannel>>;
}

/// A connected channel that can open conversation streams
#[async_trait]
pub trait AssistChannel: Send {
    /// Send `request` as the only outbound frame and return the inbound stream
    ///
    /// # Errors
    ///
    /// Returns `Error::Send` if the stream cannot be opened
    async fn open_stream(&mut self, request: AssistRequest) -> Result<ResponseStream>;
}

/// TLS gRPC connector for the production endpoint
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    endpoint: String,
}

impl GrpcConnector {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn endpoint(&self) -> Result<Endpoint> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| Error::Connection(format!("invalid endpoint {}: {e}", self.endpoint)))?;

        if self.endpoint.starts_with("https://") {
            endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| Error::Connection(format!("TLS setup failed: {e}")))
        } else {
            Ok(endpoint)
        }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, token: &Token, deadline: Instant) -> Result<Box<dyn AssistChannel>> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let endpoint = self.endpoint()?.connect_timeout(remaining);

        tracing::debug!(endpoint = %self.endpoint, "connecting");

        let channel = tokio::time::timeout_at(deadline, endpoint.connect())
            .await
            .map_err(|_| Error::Connection("deadline expired while connecting".to_string()))?
            .map_err(|e| Error::Connection(format!("{}: {e}", self.endpoint)))?;

        let bearer: MetadataValue<Ascii> = format!("Bearer {}", token.access_token)
            .parse()
            .map_err(|_| Error::Connection("access token is not a valid header value".to_string()))?;

        Ok(Box::new(GrpcChannel {
            client: EmbeddedAssistantClient::new(channel),
            bearer,
            deadline,
        }))
    }
}

struct GrpcChannel {
    client: EmbeddedAssistantClient,
    bearer: MetadataValue<Ascii>,
    deadline: Instant,
}

#[async_trait]
impl AssistChannel for GrpcChannel {
    async fn open_stream(&mut self, request: AssistRequest) -> Result<ResponseStream> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RecvError::DeadlineExceeded.into());
        }

        let mut request = tonic::Request::new(tokio_stream::once(request));
        request
            .metadata_mut()
            .insert("authorization", self.bearer.clone());
        request.set_timeout(remaining);

        let response = tokio::time::timeout_at(self.deadline, self.client.assist(request))
            .await
            .map_err(|_| RecvError::DeadlineExceeded)?
            .map_err(open_error)?;

        Ok(response
            .into_inner()
            .map(|item| item.map_err(|status| Error::Recv(recv_error(&status))))
            .boxed())
    }
}

fn open_error(status: Status) -> Error {
    if status.code() == Code::DeadlineExceeded {
        Error::Recv(RecvError::DeadlineExceeded)
    } else {
        Error::Send(format!("{:?}: {}", status.code(), status.message()))
    }
}

/// Map a stream status onto the receive error taxonomy
#[must_use]
pub fn recv_error(status: &Status) -> RecvError {
    match status.code() {
        Code::DeadlineExceeded => RecvError::DeadlineExceeded,
        code => RecvError::Stream(format!("{code:?}: {}", status.message())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;

    use super::*;
    use crate::assistant::proto::embedded_assistant_client::ASSIST_PATH;

    fn token(access_token: &str) -> Token {
        Token {
            access_token: access_token.to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// h2c server that records the headers of the `Assist` call
    async fn spawn_recording_server() -> (String, Arc<Mutex<Option<HeaderMap>>>) {
        let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = axum::Router::new().route(
            ASSIST_PATH,
            post(move |headers: HeaderMap| async move {
                *recorder.lock().unwrap() = Some(headers);
                (
                    StatusCode::OK,
                    [("content-type", "application/grpc"), ("grpc-status", "0")],
                )
                    .into_response()
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn stream_carries_bearer_and_deadline() {
        let (endpoint, seen) = spawn_recording_server().await;
        let deadline = Instant::now() + Duration::from_secs(30);

        let mut channel = GrpcConnector::new(endpoint)
            .connect(&token("wire-token"), deadline)
            .await
            .unwrap();
        // Only the outbound headers matter here
        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            channel.open_stream(AssistRequest::default()),
        )
        .await;

        let headers = seen
            .lock()
            .unwrap()
            .take()
            .expect("assist call should reach the server");
        assert_eq!(headers["authorization"], "Bearer wire-token");

        let timeout = headers["grpc-timeout"].to_str().unwrap();
        let (amount, unit) = timeout.split_at(timeout.len() - 1);
        assert!(amount.parse::<u64>().unwrap() > 0);
        assert!(["H", "M", "S", "m", "u", "n"].contains(&unit));
    }

    #[test]
    fn deadline_status_maps_to_deadline() {
        let status = Status::deadline_exceeded("too slow");
        assert!(matches!(recv_error(&status), RecvError::DeadlineExceeded));
        assert!(matches!(
            open_error(status),
            Error::Recv(RecvError::DeadlineExceeded)
        ));
    }

    #[test]
    fn other_status_keeps_message() {
        let status = Status::unauthenticated("bad token");
        let RecvError::Stream(msg) = recv_error(&status) else {
            panic!("expected stream error");
        };
        assert!(msg.contains("bad token"));
        assert!(matches!(open_error(status), Error::Send(_)));
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let connector = GrpcConnector::new("not a uri");
        assert!(matches!(connector.endpoint(), Err(Error::Connection(_))));
    }

    #[test]
    fn plain_http_endpoint_skips_tls() {
        assert!(GrpcConnector::new("http://127.0.0.1:50051").endpoint().is_ok());
    }

    #[tokio::test]
    async fn expired_deadline_fails_to_connect() {
        let connector = GrpcConnector::new("http://127.0.0.1:9");
        let result = connector.connect(&token("t"), Instant::now()).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
