//! Audio output for spoken replies
//!
//! The conversation hands decoded PCM16 chunks to an [`AudioSink`] obtained
//! from an [`AudioOutput`]. The production backend is cpal; tests plug in
//! recording sinks.

mod pcm;
mod renderer;

use async_trait::async_trait;

pub use pcm::{decode_pcm16, pcm16_to_f32};
pub use renderer::{CpalOutput, CpalRenderer};

use crate::Result;

/// Sample rate of assistant audio (16kHz mono)
pub const SAMPLE_RATE_HZ: u32 = 16000;

/// Frames per device write burst
pub const CHUNK_FRAMES: usize = 400;

/// Opens audio sinks on demand
pub trait AudioOutput: Send + Sync {
    /// Acquire the output device
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if no device exists or the rate is unsupported
    fn open(&self, sample_rate_hz: u32, chunk_frames: usize) -> Result<Box<dyn AudioSink>>;
}

/// An open output device; released when dropped
#[async_trait]
pub trait AudioSink: Send {
    /// Queue one chunk of mono PCM16 samples, waiting for room on the device
    ///
    /// # Errors
    ///
    /// Returns error if the device stopped accepting audio
    async fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Wait for queued audio to finish playing
    ///
    /// # Errors
    ///
    /// Returns error if the device failed while draining
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
