//! Inbound response decoding

use super::proto::{AssistResponse, assist_response::EventType};

/// One thing the service told us, in the order it must be handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// The service stopped listening for the query
    EndOfUtterance,
    /// Display text and opaque state for the next turn
    DialogStateUpdate {
        display_text: String,
        conversation_state: Vec<u8>,
    },
    /// Raw PCM16 little-endian bytes
    AudioChunk(Vec<u8>),
    /// Debug JSON from the service
    DebugInfo(String),
}

/// Split one inbound message into events
///
/// A single message may carry several parts; they come out as
/// end-of-utterance, dialog state, audio, debug.
#[must_use]
pub fn decode(response: AssistResponse) -> Vec<ResponseEvent> {
    let mut events = Vec::new();

    if response.event_type() == EventType::EndOfUtterance {
        events.push(ResponseEvent::EndOfUtterance);
    }

    if let Some(dialog) = response.dialog_state_out {
        events.push(ResponseEvent::DialogStateUpdate {
            display_text: dialog.supplemental_display_text,
            conversation_state: dialog.conversation_state,
        });
    }

    if let Some(audio) = response.audio_out.filter(|a| !a.audio_data.is_empty()) {
        events.push(ResponseEvent::AudioChunk(audio.audio_data));
    }

    if let Some(debug) = response
        .debug_info
        .filter(|d| !d.aog_agent_to_assistant_json.is_empty())
    {
        events.push(ResponseEvent::DebugInfo(debug.aog_agent_to_assistant_json));
    }

    events
}
