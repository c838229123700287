//! Wire types for `google.assistant.embedded.v1alpha2`
//!
//! Pre-generated prost messages covering the fields this client uses; unknown
//! fields in responses are skipped by the decoder.

/// Client → service frame
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssistRequest {
    #[prost(oneof = "assist_request::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<assist_request::Type>,
}

pub mod assist_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        /// Must be the first frame of a stream
        #[prost(message, tag = "1")]
        Config(super::AssistConfig),
        #[prost(bytes, tag = "2")]
        AudioIn(::prost::alloc::vec::Vec<u8>),
    }
}

/// Service → client frame
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssistResponse {
    #[prost(enumeration = "assist_response::EventType", tag = "1")]
    pub event_type: i32,
    #[prost(message, optional, tag = "3")]
    pub audio_out: ::core::option::Option<AudioOut>,
    #[prost(message, optional, tag = "6")]
    pub device_action: ::core::option::Option<DeviceAction>,
    #[prost(message, repeated, tag = "2")]
    pub speech_results: ::prost::alloc::vec::Vec<SpeechRecognitionResult>,
    #[prost(message, optional, tag = "5")]
    pub dialog_state_out: ::core::option::Option<DialogStateOut>,
    #[prost(message, optional, tag = "8")]
    pub debug_info: ::core::option::Option<DebugInfo>,
}

pub mod assist_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum EventType {
        Unspecified = 0,
        EndOfUtterance = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugInfo {
    #[prost(string, tag = "1")]
    pub aog_agent_to_assistant_json: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssistConfig {
    #[prost(oneof = "assist_config::Type", tags = "1, 6")]
    pub r#type: ::core::option::Option<assist_config::Type>,
    #[prost(message, optional, tag = "2")]
    pub audio_out_config: ::core::option::Option<AudioOutConfig>,
    #[prost(message, optional, tag = "3")]
    pub dialog_state_in: ::core::option::Option<DialogStateIn>,
    #[prost(message, optional, tag = "4")]
    pub device_config: ::core::option::Option<DeviceConfig>,
    #[prost(message, optional, tag = "5")]
    pub debug_config: ::core::option::Option<DebugConfig>,
}

pub mod assist_config {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        AudioInConfig(super::AudioInConfig),
        #[prost(string, tag = "6")]
        TextQuery(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioInConfig {
    #[prost(enumeration = "audio_in_config::Encoding", tag = "1")]
    pub encoding: i32,
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,
}

pub mod audio_in_config {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Encoding {
        Unspecified = 0,
        Linear16 = 1,
        Flac = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioOutConfig {
    #[prost(enumeration = "audio_out_config::Encoding", tag = "1")]
    pub encoding: i32,
    #[prost(int32, tag = "2")]
    pub sample_rate_hertz: i32,
    #[prost(int32, tag = "3")]
    pub volume_percentage: i32,
}

pub mod audio_out_config {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Encoding {
        Unspecified = 0,
        Linear16 = 1,
        Mp3 = 2,
        OpusInOgg = 3,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DialogStateIn {
    #[prost(bytes = "vec", tag = "1")]
    pub conversation_state: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub language_code: ::prost::alloc::string::String,
    #[prost(bool, tag = "7")]
    pub is_new_conversation: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceConfig {
    #[prost(string, tag = "1")]
    pub device_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub device_model_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioOut {
    #[prost(bytes = "vec", tag = "1")]
    pub audio_data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceAction {
    #[prost(string, tag = "1")]
    pub device_request_json: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpeechRecognitionResult {
    #[prost(string, tag = "1")]
    pub transcript: ::prost::alloc::string::String,
    #[prost(float, tag = "2")]
    pub stability: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DialogStateOut {
    #[prost(string, tag = "1")]
    pub supplemental_display_text: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub conversation_state: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "dialog_state_out::MicrophoneMode", tag = "3")]
    pub microphone_mode: i32,
    #[prost(int32, tag = "4")]
    pub volume_percentage: i32,
}

pub mod dialog_state_out {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum MicrophoneMode {
        Unspecified = 0,
        CloseMicrophone = 1,
        DialogFollowOn = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugConfig {
    #[prost(bool, tag = "6")]
    pub return_debug_info: bool,
}

/// Client for the `EmbeddedAssistant` service
pub mod embedded_assistant_client {
    use tonic::codegen::http;
    use tonic::transport::Channel;

    /// gRPC method path of the bidirectional `Assist` call
    pub const ASSIST_PATH: &str = "/google.assistant.embedded.v1alpha2.EmbeddedAssistant/Assist";

    #[derive(Debug, Clone)]
    pub struct EmbeddedAssistantClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl EmbeddedAssistantClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        /// Open the bidirectional conversation stream
        pub async fn assist(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::AssistRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::AssistResponse>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| tonic::Status::unavailable(format!("service was not ready: {e}")))?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(ASSIST_PATH);
            self.inner
                .streaming(request.into_streaming_request(), path, codec)
                .await
        }
    }
}
