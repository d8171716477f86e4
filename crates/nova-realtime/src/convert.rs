//! External audio-conversion collaborator interface.
//!
//! The session manager moves raw bytes; sample-rate conversion, channel
//! mixing and container framing belong to whoever implements this trait.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported audio format: {0}")]
    Unsupported(String),
    #[error("audio conversion failed: {0}")]
    Failed(String),
}

/// Playback-ready audio plus a best-estimate clip duration, available
/// before playback commits.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableAudio {
    pub data: Vec<u8>,
    pub duration_secs: f64,
}

pub trait AudioConverter: Send + Sync {
    /// Converts captured PCM into the wire input format (16 kHz, 16-bit,
    /// mono).
    fn to_wire_format(
        &self,
        raw: &[u8],
        source_rate: u32,
        channels: u16,
    ) -> Result<Vec<u8>, ConvertError>;

    /// Converts assembled wire output (24 kHz, 16-bit, mono) into
    /// playable bytes.
    fn from_wire_format(&self, raw: &[u8]) -> Result<PlayableAudio, ConvertError>;
}

/// Identity converter for callers whose capture and playback paths
/// already speak the wire formats. Rejects anything that would need
/// actual resampling or mixing.
#[derive(Debug, Clone)]
pub struct LpcmPassthrough {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub bytes_per_sample: u32,
}

impl Default for LpcmPassthrough {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            bytes_per_sample: 2,
        }
    }
}

impl AudioConverter for LpcmPassthrough {
    fn to_wire_format(
        &self,
        raw: &[u8],
        source_rate: u32,
        channels: u16,
    ) -> Result<Vec<u8>, ConvertError> {
        if channels != 1 {
            return Err(ConvertError::Unsupported(format!(
                "{channels}-channel capture needs downmixing"
            )));
        }
        if source_rate != self.input_sample_rate {
            return Err(ConvertError::Unsupported(format!(
                "resampling {source_rate} Hz to {} Hz",
                self.input_sample_rate
            )));
        }
        Ok(raw.to_vec())
    }

    fn from_wire_format(&self, raw: &[u8]) -> Result<PlayableAudio, ConvertError> {
        let bytes_per_second = (self.output_sample_rate * self.bytes_per_sample) as f64;
        Ok(PlayableAudio {
            data: raw.to_vec(),
            duration_secs: raw.len() as f64 / bytes_per_second,
        })
    }
}
