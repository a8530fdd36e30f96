//! Sample-rate conversion for capture frames
//!
//! The uplink contract is 16 kHz mono. Capture devices that cannot open
//! at 16 kHz deliver frames at their native rate; this converter brings
//! them to the uplink rate before encoding, buffering partial FFT chunks
//! across frames so no samples are silently discarded.

use rubato::{FftFixedIn, Resampler as _};

use crate::{Error, Result};

/// Input frames consumed per FFT pass
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT pass
const SUB_CHUNKS: usize = 2;

/// Streaming resampler between two fixed rates
pub struct Resampler {
    inner: Option<FftFixedIn<f64>>,
    pending: Vec<f64>,
}

impl Resampler {
    /// Create a converter from `from_rate` to `to_rate`.
    ///
    /// Equal rates construct a pass-through.
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be initialized for the
    /// given rate pair.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = if from_rate == to_rate {
            None
        } else {
            Some(
                FftFixedIn::<f64>::new(
                    from_rate as usize,
                    to_rate as usize,
                    CHUNK_SIZE,
                    SUB_CHUNKS,
                    1,
                )
                .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?,
            )
        };

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Convert a frame of samples, returning whatever full output is
    /// available. Input that does not fill an FFT chunk is held until
    /// the next call.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying FFT pass fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend(samples.iter().map(|&s| f64::from(s)));

        let mut output = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let rest = self.pending.split_off(CHUNK_SIZE);
            let chunk = std::mem::replace(&mut self.pending, rest);

            let result = inner
                .process(&[chunk], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            output.extend(result[0].iter().map(|&s| s as f32));
        }

        Ok(output)
    }

    /// Whether this converter actually changes the rate
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.inner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_when_rates_match() {
        let mut resampler = Resampler::new(16000, 16000).unwrap();
        let input = vec![0.1_f32, -0.2, 0.3];

        assert!(!resampler.is_active());
        assert_eq!(resampler.process(&input).unwrap(), input);
    }

    #[test]
    fn test_downsample_ratio() {
        let mut resampler = Resampler::new(48000, 16000).unwrap();

        // Two full FFT chunks of a quiet sine
        let input: Vec<f32> = (0..CHUNK_SIZE * 2)
            .map(|i| (i as f32 * 0.01).sin() * 0.2)
            .collect();
        let output = resampler.process(&input).unwrap();

        let expected = input.len() / 3;
        assert!(!output.is_empty());
        assert!(
            output.len() >= expected / 2 && output.len() <= expected * 2,
            "unexpected output length {} for input {}",
            output.len(),
            input.len()
        );
    }

    #[test]
    fn test_partial_chunk_is_buffered() {
        let mut resampler = Resampler::new(48000, 16000).unwrap();

        // Less than one chunk: nothing to emit yet, nothing lost
        let output = resampler.process(&vec![0.0_f32; CHUNK_SIZE / 2]).unwrap();
        assert!(output.is_empty());

        // Completing the chunk releases it
        let output = resampler.process(&vec![0.0_f32; CHUNK_SIZE / 2]).unwrap();
        assert!(!output.is_empty());
    }
}
