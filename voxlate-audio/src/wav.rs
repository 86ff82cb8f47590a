use std::io::Cursor;

use crate::resample::resample_mono_f32;
use crate::traits::{AudioEncoder, EncoderError, EncoderFactory};

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Sample rate the translation pipeline prefers for speech.
pub const SPEECH_SAMPLE_RATE_HZ: u32 = 16_000;

/// Buffers mono samples and emits a single 16-bit PCM WAV file on `finish`.
#[derive(Debug)]
pub struct WavEncoder {
    input_sample_rate_hz: u32,
    output_sample_rate_hz: u32,
    samples: Vec<f32>,
    finished: bool,
}

impl WavEncoder {
    pub fn new(input_sample_rate_hz: u32, output_sample_rate_hz: u32) -> Self {
        Self {
            input_sample_rate_hz,
            output_sample_rate_hz,
            samples: Vec::new(),
            finished: false,
        }
    }
}

impl AudioEncoder for WavEncoder {
    fn mime_type(&self) -> &str {
        WAV_MIME_TYPE
    }

    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, EncoderError> {
        if self.finished {
            return Err(EncoderError::Encode("encoder already finished".into()));
        }
        self.samples.extend_from_slice(samples);
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderError> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.finished = true;

        let samples = std::mem::take(&mut self.samples);
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let samples = resample_mono_f32(
            &samples,
            self.input_sample_rate_hz,
            self.output_sample_rate_hz,
        )
        .map_err(|e| EncoderError::Encode(format!("{e:#}")))?;

        write_pcm16(&samples, self.output_sample_rate_hz)
    }
}

fn write_pcm16(samples: &[f32], sample_rate_hz: u32) -> Result<Vec<u8>, EncoderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut out = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut out), spec)
        .map_err(|e| EncoderError::Encode(e.to_string()))?;
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(v)
            .map_err(|e| EncoderError::Encode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| EncoderError::Encode(e.to_string()))?;

    Ok(out)
}

/// Encoder factory for backends that only produce WAV.
#[derive(Debug, Clone)]
pub struct WavEncoderFactory {
    output_sample_rate_hz: u32,
}

impl WavEncoderFactory {
    pub fn new(output_sample_rate_hz: u32) -> Self {
        Self {
            output_sample_rate_hz,
        }
    }
}

impl Default for WavEncoderFactory {
    fn default() -> Self {
        Self::new(SPEECH_SAMPLE_RATE_HZ)
    }
}

impl EncoderFactory for WavEncoderFactory {
    fn create(
        &self,
        mime_type: Option<&str>,
        sample_rate_hz: u32,
    ) -> Result<Box<dyn AudioEncoder>, EncoderError> {
        match mime_type {
            None | Some("audio/wav") | Some("audio/wave") | Some("audio/x-wav") => Ok(Box::new(
                WavEncoder::new(sample_rate_hz, self.output_sample_rate_hz),
            )),
            Some(other) => Err(EncoderError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_only_accepts_wav_and_default() {
        let f = WavEncoderFactory::default();
        assert!(f.create(None, 48_000).is_ok());
        assert!(f.create(Some("audio/wav"), 48_000).is_ok());
        assert_eq!(
            f.create(Some("audio/webm;codecs=opus"), 48_000).err(),
            Some(EncoderError::Unsupported("audio/webm;codecs=opus".into()))
        );
    }

    #[test]
    fn empty_recording_produces_no_bytes() {
        let mut enc = WavEncoder::new(16_000, 16_000);
        assert!(enc.encode(&[]).unwrap().is_empty());
        assert!(enc.finish().unwrap().is_empty());
    }

    #[test]
    fn finish_writes_a_riff_header_and_pcm16_payload() {
        let mut enc = WavEncoder::new(16_000, 16_000);
        assert!(enc.encode(&[0.0, 0.5, -0.5, 1.0]).unwrap().is_empty());
        let bytes = enc.finish().unwrap();

        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut enc = WavEncoder::new(16_000, 16_000);
        enc.encode(&[0.1; 8]).unwrap();
        assert!(!enc.finish().unwrap().is_empty());
        assert!(enc.finish().unwrap().is_empty());
        assert!(enc.encode(&[0.1]).is_err());
    }

    #[test]
    fn input_is_resampled_to_output_rate() {
        let mut enc = WavEncoder::new(48_000, 16_000);
        enc.encode(&vec![0.0; 4_800]).unwrap();
        let bytes = enc.finish().unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 1_600);
    }
}
