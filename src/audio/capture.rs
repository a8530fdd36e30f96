//! Microphone capture
//!
//! Owns the input device and emits fixed-duration frames of raw samples
//! into a bounded queue. The cpal callback never blocks; if the consumer
//! falls behind, the oldest frame is dropped.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::audio::codec::{AudioFrame, CAPTURE_SAMPLE_RATE};
use crate::queue::BoundedQueue;
use crate::{Error, Result};

/// Frame duration emitted to the consumer
const FRAME_MS: usize = 100;

/// Frames buffered before the oldest is dropped
const QUEUE_FRAMES: usize = 8;

/// Captures audio from the default input device
pub struct CaptureFeed {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    stream: Option<Stream>,
    frames: Arc<BoundedQueue<AudioFrame>>,
}

impl CaptureFeed {
    /// Acquire the default input device.
    ///
    /// Prefers a mono stream at the 16 kHz uplink rate; if the device
    /// does not support it, captures at the device's default config and
    /// tags frames with the real rate (the caller resamples before
    /// encode).
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no input device exists or its
    /// configs cannot be enumerated, `PermissionDenied` if the backend
    /// refuses access.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))?;

        let preferred = device
            .supported_input_configs()
            .map_err(map_backend_error)?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
            });

        let config = preferred.map_or_else(
            || {
                device
                    .default_input_config()
                    .map(|c| c.config())
                    .map_err(map_backend_error)
            },
            |c| Ok(c.with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE)).config()),
        )?;

        let sample_rate = config.sample_rate.0;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "capture device acquired"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            stream: None,
            frames: Arc::new(BoundedQueue::new(QUEUE_FRAMES)),
        })
    }

    /// Start delivering frames.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` or `DeviceUnavailable` when the stream
    /// cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let frames = Arc::clone(&self.frames);
        let channels = usize::from(self.config.channels);
        let sample_rate = self.sample_rate;
        let frame_len = sample_rate as usize * FRAME_MS / 1000;
        let mut pending: Vec<f32> = Vec::with_capacity(frame_len * 2);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mix_to_mono(&mut pending, data, channels);

                    while pending.len() >= frame_len {
                        let rest = pending.split_off(frame_len);
                        let samples = std::mem::replace(&mut pending, rest);
                        frames.push(AudioFrame {
                            samples,
                            sample_rate,
                        });
                    }
                },
                |err| {
                    tracing::error!(error = %err, "capture stream error");
                },
                None,
            )
            .map_err(map_backend_error)?;

        stream.play().map_err(map_backend_error)?;
        self.stream = Some(stream);

        tracing::debug!("capture started");
        Ok(())
    }

    /// Receive the next frame; `None` after close
    pub async fn next_frame(&self) -> Option<AudioFrame> {
        self.frames.pop().await
    }

    /// Stop delivering frames without releasing the queue.
    ///
    /// Teardown stops frame delivery before the rest of the pipeline
    /// goes away; `close` finishes the job.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture stopped");
        }
    }

    /// Stop capture and release the device.
    ///
    /// Idempotent; also runs on drop so the hardware is relinquished on
    /// every exit path.
    pub fn close(&mut self) {
        self.stop();
        self.frames.close();
    }

    /// Whether the stream is currently running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate frames are tagged with
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames lost to queue overflow so far
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped()
    }
}

impl Drop for CaptureFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Append interleaved input to `pending`, averaging channels to mono
fn mix_to_mono(pending: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        pending.extend_from_slice(data);
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    pending.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Map a cpal backend error onto the capture taxonomy.
///
/// cpal surfaces OS permission refusals as backend-specific strings, so
/// classification is textual.
#[allow(clippy::needless_pass_by_value)]
fn map_backend_error<E: std::fmt::Display>(err: E) -> Error {
    let text = err.to_string();
    let lower = text.to_lowercase();

    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        Error::PermissionDenied(text)
    } else if lower.contains("unavailable") || lower.contains("no longer valid") {
        Error::DeviceUnavailable(text)
    } else {
        Error::Audio(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_to_mono_passthrough() {
        let mut pending = Vec::new();
        mix_to_mono(&mut pending, &[0.1, 0.2, 0.3], 1);
        assert_eq!(pending, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_mix_to_mono_averages_stereo() {
        let mut pending = Vec::new();
        mix_to_mono(&mut pending, &[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(pending, vec![0.5, 0.5]);
    }

    #[test]
    fn test_backend_error_classification() {
        assert!(matches!(
            map_backend_error("Permission denied by the OS"),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(
            map_backend_error("the requested device is no longer valid"),
            Error::DeviceUnavailable(_)
        ));
        assert!(matches!(
            map_backend_error("some other failure"),
            Error::Audio(_)
        ));
    }
}
