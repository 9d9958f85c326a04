//! WAV container helpers for raw microphone captures.

use std::io::Cursor;

use crate::{Error, Result};

/// Layout of interleaved PCM16 samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// PCM sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Number of interleaved audio channels.
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
        }
    }
}

impl PcmFormat {
    fn validate(self) -> Result<Self> {
        if self.sample_rate_hz == 0 {
            return Err(Error::InvalidInput(
                "PCM sample rate must be greater than zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(Error::InvalidInput(
                "PCM channel count must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Decode little-endian PCM16 fragments into samples.
///
/// A trailing odd byte is dropped.
pub fn samples_from_le_fragments(fragments: &[Vec<u8>]) -> Vec<i16> {
    let bytes: Vec<u8> = fragments.concat();
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Wrap interleaved PCM16 samples in a WAV container.
pub fn encode_wav(samples: &[i16], format: PcmFormat) -> Result<Vec<u8>> {
    let format = format.validate()?;

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|error| Error::InvalidInput(format!("Failed to start WAV writer: {error}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|error| Error::InvalidInput(format!("Failed to write sample: {error}")))?;
        }
        writer
            .finalize()
            .map_err(|error| Error::InvalidInput(format!("Failed to finalize WAV: {error}")))?;
    }

    Ok(cursor.into_inner())
}

/// Approximate clip length in milliseconds.
pub fn duration_ms(sample_count: usize, format: PcmFormat) -> Result<u64> {
    let format = format.validate()?;
    let frames = sample_count / usize::from(format.channels);
    let millis = (frames as u128)
        .saturating_mul(1_000)
        .saturating_div(u128::from(format.sample_rate_hz));
    Ok(u64::try_from(millis).unwrap_or(u64::MAX))
}
