//! Audio playback to speakers via cpal

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::{AudioOutput, AudioSink, pcm16_to_f32};
use crate::{Error, Result};

/// Bursts that may be queued ahead of the device
const QUEUE_BURSTS: usize = 8;

/// Extra time allowed for the device to drain beyond the queued duration
const DRAIN_SLACK: Duration = Duration::from_millis(500);

/// Opens the default output device through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate_hz: u32, chunk_frames: usize) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(CpalRenderer::open(sample_rate_hz, chunk_frames)?))
    }
}

/// Streams PCM16 chunks to the default output device
///
/// The cpal stream lives on its own thread; chunks reach the device callback
/// through a bounded queue, so `write` waits while the device is behind.
pub struct CpalRenderer {
    bursts: Option<mpsc::Sender<Vec<f32>>>,
    pending: Arc<AtomicUsize>,
    stop: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    sample_rate_hz: u32,
    chunk_frames: usize,
}

impl CpalRenderer {
    /// Open the default output device at `sample_rate_hz`
    ///
    /// Blocks until the audio thread reports the device ready; async callers
    /// go through `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if no device exists or the rate is unsupported
    pub fn open(sample_rate_hz: u32, chunk_frames: usize) -> Result<Self> {
        let chunk_frames = chunk_frames.max(1);
        let (burst_tx, burst_rx) = mpsc::channel(QUEUE_BURSTS);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let pending = Arc::new(AtomicUsize::new(0));
        let feed = Feed {
            bursts: burst_rx,
            current: Vec::new(),
            position: 0,
            pending: Arc::clone(&pending),
        };

        let worker = std::thread::Builder::new()
            .name("audio-out".to_string())
            .spawn(move || match build_stream(sample_rate_hz, feed) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Returns on explicit stop or when the renderer is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to start audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                bursts: Some(burst_tx),
                pending,
                stop: Some(stop_tx),
                worker: Some(worker),
                sample_rate_hz,
                chunk_frames,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(Error::DeviceUnavailable(
                    "audio thread exited during setup".to_string(),
                ))
            }
        }
    }

    /// Samples queued but not yet played
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AudioSink for CpalRenderer {
    async fn write(&mut self, samples: &[i16]) -> Result<()> {
        let Some(bursts) = self.bursts.as_ref() else {
            return Err(Error::Audio("audio output closed".to_string()));
        };

        for window in samples.chunks(self.chunk_frames) {
            let burst = pcm16_to_f32(window);
            self.pending.fetch_add(burst.len(), Ordering::AcqRel);
            if bursts.send(burst).await.is_err() {
                self.pending.fetch_sub(window.len(), Ordering::AcqRel);
                return Err(Error::Audio("audio output stopped".to_string()));
            }
        }

        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let queued = u64::try_from(self.pending_samples()).unwrap_or(u64::MAX);
        let budget = Duration::from_millis(
            queued.saturating_mul(1000) / u64::from(self.sample_rate_hz.max(1)),
        ) + DRAIN_SLACK;
        let start = tokio::time::Instant::now();

        while self.pending_samples() > 0 {
            if start.elapsed() > budget {
                tracing::warn!(
                    remaining = self.pending_samples(),
                    "audio drain timed out"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        tracing::debug!(samples = queued, "playback drained");
        Ok(())
    }
}

/// Stops the stream and joins the audio thread. The join waits only for the
/// thread to drop its stream, which returns once the current device callback ends.
impl Drop for CpalRenderer {
    fn drop(&mut self) {
        self.bursts.take();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("audio thread panicked");
            }
        }
        tracing::debug!("audio output released");
    }
}

/// Device-side end of the burst queue
struct Feed {
    bursts: mpsc::Receiver<Vec<f32>>,
    current: Vec<f32>,
    position: usize,
    pending: Arc<AtomicUsize>,
}

impl Feed {
    /// Next queued sample, or silence when the queue is empty
    fn next_sample(&mut self) -> f32 {
        while self.position >= self.current.len() {
            match self.bursts.try_recv() {
                Ok(next) => {
                    self.current = next;
                    self.position = 0;
                }
                Err(_) => return 0.0,
            }
        }

        let sample = self.current[self.position];
        self.position += 1;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        sample
    }
}

fn build_stream(sample_rate_hz: u32, mut feed: Feed) -> Result<Stream> {
    let host = cpal::default_host();
    let rate = SampleRate(sample_rate_hz);

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
        .ok_or_else(|| {
            Error::DeviceUnavailable(format!("no output config supports {sample_rate_hz} Hz"))
        })?;

    let config: StreamConfig = supported_config.with_sample_rate(rate).config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = sample_rate_hz,
        channels = config.channels,
        "audio output opened"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = feed.next_sample();
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio output error");
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> (mpsc::Sender<Vec<f32>>, Feed, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(4);
        let pending = Arc::new(AtomicUsize::new(0));
        let feed = Feed {
            bursts: rx,
            current: Vec::new(),
            position: 0,
            pending: Arc::clone(&pending),
        };
        (tx, feed, pending)
    }

    #[test]
    fn feed_plays_bursts_in_order_then_silence() {
        let (tx, mut feed, pending) = feed();
        pending.store(3, Ordering::Release);
        tx.try_send(vec![0.1, 0.2]).unwrap();
        tx.try_send(vec![]).unwrap();
        tx.try_send(vec![0.3]).unwrap();

        let played: Vec<f32> = (0..5).map(|_| feed.next_sample()).collect();
        assert_eq!(played, vec![0.1, 0.2, 0.3, 0.0, 0.0]);
        assert_eq!(pending.load(Ordering::Acquire), 0);
    }
}
