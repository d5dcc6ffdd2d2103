use crate::config::AudioSettings;
use crate::media::codec_error::CodecError;

/// Fixed PCM framing shared by the codec and the jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one frame.
    pub frame_size_samples: usize,
}

impl CodecParams {
    /// 16 kHz mono, 20 ms frames.
    pub const VOICE: Self = Self {
        sample_rate: 16_000,
        channels: 1,
        frame_size_samples: 320,
    };

    #[must_use]
    pub fn from_settings(audio: &AudioSettings) -> Self {
        let frame_size_samples = (audio.sample_rate as usize * audio.frame_ms as usize) / 1_000;
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels.max(1),
            frame_size_samples: frame_size_samples.max(1),
        }
    }

    /// Interleaved i16 samples in one frame.
    #[must_use]
    pub fn frame_samples_total(&self) -> usize {
        self.frame_size_samples * self.channels as usize
    }

    /// `frame_size_samples * channels * 2`.
    #[must_use]
    pub fn frame_size_bytes(&self) -> usize {
        self.frame_samples_total() * 2
    }

    #[must_use]
    pub fn frame_duration_ms(&self) -> u32 {
        let ms = self.frame_size_samples as u64 * 1_000 / u64::from(self.sample_rate.max(1));
        u32::try_from(ms).unwrap_or(u32::MAX)
    }
}

impl Default for CodecParams {
    fn default() -> Self {
        Self::VOICE
    }
}

/// A speech codec operating on whole frames of interleaved i16 samples.
pub trait SpeechBackend: Send {
    fn name(&self) -> &'static str;

    /// Compress exactly one frame into `out` (cleared first).
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decode one packet into `out`; returns interleaved samples written.
    fn decode(&mut self, packet: &[u8], out: &mut [i16]) -> Result<usize, CodecError>;

    /// Synthesize a replacement frame for a lost packet from decoder state.
    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError>;

    /// Drop all encoder and decoder history.
    fn reset(&mut self) -> Result<(), CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_params_match_20ms_at_16k() {
        let p = CodecParams::from_settings(&AudioSettings::default());
        assert_eq!(p, CodecParams::VOICE);
        assert_eq!(p.frame_size_bytes(), 640);
        assert_eq!(p.frame_duration_ms(), 20);
    }

    #[test]
    fn stereo_frame_doubles_byte_length() {
        let p = CodecParams::from_settings(&AudioSettings {
            sample_rate: 48_000,
            channels: 2,
            frame_ms: 10,
            jitter_target_ms: 40,
        });
        assert_eq!(p.frame_size_samples, 480);
        assert_eq!(p.frame_size_bytes(), 1_920);
        assert_eq!(p.frame_duration_ms(), 10);
    }
}
