//! Speech inference adapter.
//!
//! Two mutually exclusive paths, both ending in a mono 16-bit WAV:
//! - voice cloning through a loaded [`SpeechModel`], conditioned on the
//!   configured reference clip
//! - the synthetic fallback tone from [`crate::audio::fallback`]

use std::path::PathBuf;

use tracing::{debug, info};

use crate::audio::fallback::{generate_fallback_audio, FALLBACK_SAMPLE_RATE};
use crate::audio::wav::{duration_secs, encode_wav};
use crate::error::{Result, ServeError};
use crate::inference::model::{SpeechModel, VoiceCloneRequest};

/// Reference voice used to condition cloning.
#[derive(Debug, Clone)]
pub struct ReferenceVoice {
    /// Reference clip (WAV).
    pub audio: PathBuf,

    /// Transcript of the reference clip.
    pub text: String,
}

impl ReferenceVoice {
    /// The clip and transcript, or `None` for both if the clip is missing.
    pub fn available(&self) -> (Option<&std::path::Path>, Option<&str>) {
        if self.audio.exists() {
            (Some(self.audio.as_path()), Some(self.text.as_str()))
        } else {
            (None, None)
        }
    }
}

/// A synthesized clip ready to ship.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Complete WAV file bytes.
    pub wav: Vec<u8>,

    pub sample_rate: u32,

    pub duration_secs: f64,

    /// True if a real model produced the audio.
    pub real_model: bool,
}

/// Generate speech with a loaded model. Blocks the calling thread.
pub fn synthesize_with_model(
    model: &dyn SpeechModel,
    text: &str,
    reference: &ReferenceVoice,
) -> Result<SynthesizedAudio> {
    let preview: String = text.chars().take(50).collect();
    info!(text = %preview, "Generating speech");

    let (ref_audio, ref_text) = reference.available();
    if ref_audio.is_none() {
        debug!(path = %reference.audio.display(), "Reference audio missing, generating without cloning");
    }

    let speech = model.generate_voice_clone(&VoiceCloneRequest {
        text,
        ref_audio,
        ref_text,
        language: "auto",
    })?;

    if speech.sample_rate == 0 {
        return Err(ServeError::Inference("model returned sample rate 0".to_string()));
    }

    let pcm = speech.samples.into_i16();
    let duration = duration_secs(pcm.len(), speech.sample_rate);
    let wav = encode_wav(&pcm, speech.sample_rate)?;

    info!(duration_secs = format!("{duration:.2}"), "Generated audio");

    Ok(SynthesizedAudio {
        wav,
        sample_rate: speech.sample_rate,
        duration_secs: duration,
        real_model: true,
    })
}

/// Render the fallback tone for `text`.
pub fn synthesize_fallback(text: &str, speed: f64) -> Result<SynthesizedAudio> {
    let audio = generate_fallback_audio(text, speed, FALLBACK_SAMPLE_RATE);
    let wav = encode_wav(&audio.samples, audio.sample_rate)?;

    debug!(
        duration_secs = audio.duration_secs,
        speed, "Generated fallback audio"
    );

    Ok(SynthesizedAudio {
        wav,
        sample_rate: audio.sample_rate,
        duration_secs: audio.duration_secs,
        real_model: false,
    })
}

/// Round to two decimals for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::{decode_wav_mono, encode_wav, Samples};
    use crate::device::Device;
    use crate::inference::model::GeneratedSpeech;
    use std::sync::Mutex;

    /// Records whether a reference clip was passed.
    struct RecordingModel {
        saw_reference: Mutex<Option<bool>>,
    }

    impl SpeechModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn generate_voice_clone(&self, request: &VoiceCloneRequest<'_>) -> Result<GeneratedSpeech> {
            assert_eq!(request.ref_audio.is_some(), request.ref_text.is_some());
            *self.saw_reference.lock().unwrap() = Some(request.ref_audio.is_some());
            Ok(GeneratedSpeech {
                samples: Samples::Float(vec![0.5; 16_000]),
                sample_rate: 16_000,
            })
        }
    }

    #[test]
    fn test_model_path_without_reference() {
        let model = RecordingModel {
            saw_reference: Mutex::new(None),
        };
        let reference = ReferenceVoice {
            audio: PathBuf::from("/nonexistent/reference.wav"),
            text: "hello".to_string(),
        };

        let out = synthesize_with_model(&model, "Hi there", &reference).unwrap();
        assert!(out.real_model);
        assert_eq!(out.sample_rate, 16_000);
        assert_eq!(out.duration_secs, 1.0);
        assert_eq!(*model.saw_reference.lock().unwrap(), Some(false));

        let (samples, rate) = decode_wav_mono(&out.wav).unwrap();
        assert_eq!(rate, 16_000);
        assert!((samples[0] - 16383.0 / 32767.0).abs() < 1e-4);
    }

    #[test]
    fn test_model_path_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("reference.wav");
        std::fs::write(&clip, encode_wav(&[0; 100], 24_000).unwrap()).unwrap();

        let model = RecordingModel {
            saw_reference: Mutex::new(None),
        };
        let reference = ReferenceVoice {
            audio: clip,
            text: "your power is sufficient i said".to_string(),
        };
        synthesize_with_model(&model, "Hi", &reference).unwrap();
        assert_eq!(*model.saw_reference.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_fallback_path() {
        let out = synthesize_fallback("Hello, this is a fallback test.", 1.0).unwrap();
        assert!(!out.real_model);
        assert_eq!(out.sample_rate, FALLBACK_SAMPLE_RATE);
        assert_eq!(round2(out.duration_secs), 6.2);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(2.0), 2.0);
    }
}
