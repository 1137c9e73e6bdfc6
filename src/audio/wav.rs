//! PCM conversion and WAV container handling.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::Result;

/// Samples produced by a speech model, in whichever format it emits.
#[derive(Debug, Clone)]
pub enum Samples {
    /// Floating point samples nominally in `[-1.0, 1.0]`.
    Float(Vec<f32>),
    /// 16-bit PCM samples.
    Int16(Vec<i16>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Float(s) => s.len(),
            Samples::Int16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to 16-bit PCM. Float samples are clamped and scaled by 32767.
    pub fn into_i16(self) -> Vec<i16> {
        match self {
            Samples::Int16(s) => s,
            Samples::Float(s) => s
                .into_iter()
                .map(|v| {
                    let v = if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
                    (v * 32767.0) as i16
                })
                .collect(),
        }
    }
}

/// Duration in seconds of `n_samples` mono samples.
pub fn duration_secs(n_samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    n_samples as f64 / sample_rate as f64
}

/// Encode mono 16-bit PCM into an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut buffer, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(buffer.into_inner())
}

/// Read a WAV file as mono `f32` samples, averaging channels.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)?;
    decode_mono(reader)
}

/// Decode WAV bytes as mono `f32` samples, averaging channels.
pub fn decode_wav_mono(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    decode_mono(reader)
}

fn decode_mono<R: std::io::Read>(mut reader: WavReader<R>) -> Result<(Vec<f32>, u32)> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(2) as u32;
            let max_val = ((1i64 << (bits - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f32 / max_val).clamp(-1.0, 1.0)))
                .collect::<std::result::Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}
