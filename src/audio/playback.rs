//! Gapless audio playback
//!
//! Decoded packets are placed on a monotonic frame timeline: each buffer
//! starts no earlier than the previous one ends and no earlier than the
//! device clock, so consecutive packets play back-to-back with neither
//! overlap nor dead air. The scheduling core (`Timeline`) is pure and
//! unit-tested without hardware; the cpal output callback drives it and
//! advances the device clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::audio::codec::{InboundAudioPacket, PLAYBACK_SAMPLE_RATE};
use crate::{Error, Result};

/// Identifies one scheduled buffer, live until it completes or is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

/// One buffer placed on the timeline
struct Scheduled {
    handle: PlaybackHandle,
    /// Absolute frame index the buffer starts at
    start: u64,
    samples: Vec<f32>,
    pos: usize,
}

/// Pure scheduling core.
///
/// All positions are frame indices at the playback rate. Invariants:
/// the cursor never decreases while buffers are live, every start time
/// is >= the clock value observed at schedule time, and scheduled spans
/// never overlap.
pub(crate) struct Timeline {
    cursor: u64,
    queue: VecDeque<Scheduled>,
    next_id: u64,
}

impl Timeline {
    pub(crate) const fn new() -> Self {
        Self {
            cursor: 0,
            queue: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Place a buffer at `max(cursor, now)` and advance the cursor past
    /// its end.
    pub(crate) fn schedule(&mut self, now: u64, samples: Vec<f32>) -> (PlaybackHandle, u64) {
        let start = self.cursor.max(now);
        let handle = PlaybackHandle(self.next_id);
        self.next_id += 1;
        self.cursor = start + samples.len() as u64;
        self.queue.push_back(Scheduled {
            handle,
            start,
            samples,
            pos: 0,
        });
        (handle, start)
    }

    /// Fill `out` with mono frames starting at absolute frame `now`,
    /// silence outside scheduled spans. Buffers that play to their end
    /// are removed and their handles returned.
    pub(crate) fn render(&mut self, now: u64, out: &mut [f32]) -> Vec<PlaybackHandle> {
        let mut completed = Vec::new();

        for (i, slot) in out.iter_mut().enumerate() {
            let t = now + i as u64;
            *slot = 0.0;

            while let Some(front) = self.queue.front_mut() {
                if front.start > t {
                    break;
                }
                if front.pos < front.samples.len() {
                    *slot = front.samples[front.pos];
                    front.pos += 1;
                    if front.pos == front.samples.len() {
                        completed.push(front.handle);
                        self.queue.pop_front();
                    }
                    break;
                }
                // zero-length buffer completes the moment it is reached
                completed.push(front.handle);
                self.queue.pop_front();
            }
        }

        completed
    }

    /// Drop every live buffer and rewind the cursor to `now`
    pub(crate) fn stop_all(&mut self, now: u64) -> usize {
        let stopped = self.queue.len();
        self.queue.clear();
        self.cursor = now;
        stopped
    }

    pub(crate) fn live_count(&self) -> usize {
        self.queue.len()
    }

    pub(crate) const fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Schedules decoded packets on the default output device
pub struct PlaybackScheduler {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    timeline: Arc<Mutex<Timeline>>,
    /// Frames rendered since the stream started; the device clock
    clock: Arc<AtomicU64>,
}

impl PlaybackScheduler {
    /// Acquire the default output device at the 24 kHz downlink rate.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no output device exists or none of
    /// its configs can carry 24 kHz mono or stereo.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: stereo, duplicating the mono signal
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable output config found".to_string())
            })?;

        let config = supported
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "output device acquired"
        );

        Ok(Self {
            device,
            config,
            stream: None,
            timeline: Arc::new(Mutex::new(Timeline::new())),
            clock: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Start the output stream.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let timeline = Arc::clone(&self.timeline);
        let clock = Arc::clone(&self.clock);
        let channels = usize::from(self.config.channels);
        let mut scratch: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.resize(frames, 0.0);

                    let now = clock.load(Ordering::Acquire);
                    let completed = timeline
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .render(now, &mut scratch);

                    for (frame, &sample) in data.chunks_mut(channels).zip(&scratch) {
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }

                    clock.fetch_add(frames as u64, Ordering::Release);

                    if !completed.is_empty() {
                        tracing::trace!(count = completed.len(), "buffers completed");
                    }
                },
                |err| {
                    tracing::error!(error = %err, "playback stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("playback started");
        Ok(())
    }

    /// Schedule a decoded packet for gapless playback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the packet's rate does not match the
    /// output rate; uplink and downlink rates are independent and never
    /// assumed equal.
    pub fn enqueue(&self, packet: InboundAudioPacket) -> Result<PlaybackHandle> {
        if packet.sample_rate != self.config.sample_rate.0 {
            return Err(Error::Audio(format!(
                "packet rate {} does not match output rate {}",
                packet.sample_rate, self.config.sample_rate.0
            )));
        }

        let now = self.clock.load(Ordering::Acquire);
        let (handle, start) = self
            .timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .schedule(now, packet.samples);

        tracing::trace!(?handle, start, now, "packet scheduled");
        Ok(handle)
    }

    /// Force-stop every live buffer and rewind the cursor to the device
    /// clock. Takes effect on the next hardware buffer.
    pub fn stop_all(&self) {
        let now = self.clock.load(Ordering::Acquire);
        let stopped = self
            .timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_all(now);
        if stopped > 0 {
            tracing::debug!(stopped, "playback cut off");
        }
    }

    /// Buffers currently playing or pending
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live_count()
    }

    /// Frames rendered since the stream started
    #[must_use]
    pub fn device_clock(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Stop playback and release the device; idempotent
    pub fn close(&mut self) {
        self.stop_all();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("playback stopped");
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 100 ms of samples at the playback rate
    const HUNDRED_MS: usize = PLAYBACK_SAMPLE_RATE as usize / 10;

    #[test]
    fn test_back_to_back_scheduling() {
        let mut timeline = Timeline::new();

        let (_, s1) = timeline.schedule(0, vec![0.0; HUNDRED_MS]);
        let (_, s2) = timeline.schedule(0, vec![0.0; HUNDRED_MS]);
        let (_, s3) = timeline.schedule(0, vec![0.0; HUNDRED_MS]);

        assert_eq!(s1, 0);
        assert_eq!(s2, HUNDRED_MS as u64);
        assert_eq!(s3, 2 * HUNDRED_MS as u64);
        assert_eq!(timeline.cursor(), 3 * HUNDRED_MS as u64);
    }

    #[test]
    fn test_start_clamped_to_clock_after_pause() {
        let mut timeline = Timeline::new();

        timeline.schedule(0, vec![0.0; 100]);
        // Clock has moved past the cursor (a lull in delivery)
        let (_, start) = timeline.schedule(5000, vec![0.0; 100]);

        assert_eq!(start, 5000);
        assert_eq!(timeline.cursor(), 5100);
    }

    #[test]
    fn test_no_overlap_and_monotonic_starts() {
        let mut timeline = Timeline::new();
        let mut previous_end = 0;

        for now in [0_u64, 10, 500, 499, 2000] {
            let len = 250;
            let (_, start) = timeline.schedule(now, vec![0.0; len]);
            assert!(start >= previous_end, "start {start} overlaps {previous_end}");
            assert!(start >= now);
            previous_end = start + len as u64;
        }
    }

    #[test]
    fn test_render_plays_samples_then_silence() {
        let mut timeline = Timeline::new();
        let (handle, _) = timeline.schedule(0, vec![0.5; 4]);

        let mut out = [1.0_f32; 8];
        let completed = timeline.render(0, &mut out);

        assert_eq!(&out[..4], &[0.5; 4]);
        assert_eq!(&out[4..], &[0.0; 4]);
        assert_eq!(completed, vec![handle]);
        assert_eq!(timeline.live_count(), 0);
    }

    #[test]
    fn test_render_partial_does_not_complete() {
        let mut timeline = Timeline::new();
        let (handle, _) = timeline.schedule(0, vec![0.5; 4]);

        let mut out = [0.0_f32; 2];
        assert!(timeline.render(0, &mut out).is_empty());
        assert_eq!(timeline.live_count(), 1);

        let completed = timeline.render(2, &mut out);
        assert_eq!(completed, vec![handle]);
    }

    #[test]
    fn test_render_waits_for_future_start() {
        let mut timeline = Timeline::new();
        // Cursor already ahead: buffer starts at frame 4
        timeline.schedule(0, vec![0.1; 4]);
        timeline.schedule(0, vec![0.9; 2]);

        let mut out = [0.0_f32; 8];
        timeline.render(0, &mut out);

        assert_eq!(&out[..4], &[0.1; 4]);
        assert_eq!(&out[4..6], &[0.9; 2]);
        assert_eq!(&out[6..], &[0.0; 2]);
    }

    #[test]
    fn test_consecutive_buffers_have_zero_gap() {
        let mut timeline = Timeline::new();
        let (_, s1) = timeline.schedule(0, vec![0.0; 240]);
        let (_, s2) = timeline.schedule(100, vec![0.0; 240]);

        // Cursor stayed ahead of the clock, so B starts exactly at A's end
        assert_eq!(s2, s1 + 240);
    }

    #[test]
    fn test_stop_all_clears_live_set_and_rewinds_cursor() {
        let mut timeline = Timeline::new();
        timeline.schedule(0, vec![0.0; 1000]);
        timeline.schedule(0, vec![0.0; 1000]);
        assert_eq!(timeline.live_count(), 2);

        let stopped = timeline.stop_all(300);
        assert_eq!(stopped, 2);
        assert_eq!(timeline.live_count(), 0);
        assert_eq!(timeline.cursor(), 300);

        // Next buffer starts from the clock, not the pre-stop cursor
        let (_, start) = timeline.schedule(300, vec![0.0; 100]);
        assert_eq!(start, 300);
    }

    #[test]
    fn test_handles_are_unique() {
        let mut timeline = Timeline::new();
        let (a, _) = timeline.schedule(0, vec![0.0; 1]);
        let (b, _) = timeline.schedule(0, vec![0.0; 1]);
        assert_ne!(a, b);
    }
}
