//! G.711 µ-law speech backend.
//!
//! One byte per sample, no state beyond the last decoded frame, which is
//! what concealment replays: attenuated by half on each consecutive lost
//! frame, then silence once `MAX_CONCEALED_FRAMES` have been synthesized.

use crate::media::{
    codec_error::CodecError,
    speech_backend::{CodecParams, SpeechBackend},
};

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;
const MAX_CONCEALED_FRAMES: u32 = 4;

pub struct G711Backend {
    frame_samples: usize,
    last_frame: Vec<i16>,
    concealed_run: u32,
}

impl G711Backend {
    #[must_use]
    pub fn new(params: CodecParams) -> Self {
        Self {
            frame_samples: params.frame_samples_total(),
            last_frame: Vec::new(),
            concealed_run: 0,
        }
    }
}

impl SpeechBackend for G711Backend {
    fn name(&self) -> &'static str {
        "pcmu"
    }

    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), CodecError> {
        if pcm.len() != self.frame_samples {
            return Err(CodecError::FrameSize {
                got: pcm.len() * 2,
                expected: self.frame_samples * 2,
            });
        }
        out.clear();
        out.extend(pcm.iter().map(|&s| linear_to_ulaw(s)));
        Ok(())
    }

    fn decode(&mut self, packet: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
        if packet.is_empty() {
            return self.conceal(out);
        }
        if packet.len() != self.frame_samples || packet.len() > out.len() {
            return Err(CodecError::Decode(format!(
                "packet of {} samples, frame is {}",
                packet.len(),
                self.frame_samples
            )));
        }
        for (dst, &b) in out.iter_mut().zip(packet) {
            *dst = ulaw_to_linear(b);
        }
        self.last_frame.clear();
        self.last_frame.extend_from_slice(&out[..packet.len()]);
        self.concealed_run = 0;
        Ok(packet.len())
    }

    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError> {
        let n = self.frame_samples.min(out.len());
        self.concealed_run = self.concealed_run.saturating_add(1);

        if self.concealed_run > MAX_CONCEALED_FRAMES || self.last_frame.is_empty() {
            out[..n].fill(0);
            return Ok(n);
        }

        let shift = self.concealed_run;
        for (i, dst) in out[..n].iter_mut().enumerate() {
            let src = self.last_frame.get(i).copied().unwrap_or(0);
            *dst = src >> shift;
        }
        Ok(n)
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.last_frame.clear();
        self.concealed_run = 0;
        Ok(())
    }
}

fn linear_to_ulaw(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0 };
    let mut s = i32::from(sample).abs().min(CLIP);
    s += BIAS;

    let mut mask = 0x4000;
    let mut exp: u8 = 7;
    while (s & mask) == 0 && exp > 0 {
        mask >>= 1;
        exp -= 1;
    }

    let mantissa = ((s >> (exp + 3)) & 0x0F) as u8;
    !(sign | (exp << 4) | mantissa)
}

fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let magnitude = (((i32::from(mantissa) << 3) + BIAS) << exponent) - BIAS;
    let sample = if sign != 0 { -magnitude } else { magnitude };
    sample as i16
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn backend() -> G711Backend {
        G711Backend::new(CodecParams {
            sample_rate: 8_000,
            channels: 1,
            frame_size_samples: 4,
        })
    }

    #[test]
    fn silence_survives_companding() {
        assert_eq!(ulaw_to_linear(linear_to_ulaw(0)), 0);
    }

    #[test]
    fn companding_error_is_small() {
        for s in [16_384i16, -16_384, 1_000, -1_000, 32_767, -32_768] {
            let back = ulaw_to_linear(linear_to_ulaw(s));
            let err = (i32::from(s) - i32::from(back)).abs();
            assert!(err <= i32::from(s).abs() / 16 + 140, "{s} -> {back}");
        }
    }

    #[test]
    fn encode_rejects_wrong_frame_size() {
        let mut b = backend();
        let mut out = Vec::new();
        assert_eq!(
            b.encode(&[0; 3], &mut out),
            Err(CodecError::FrameSize { got: 6, expected: 8 })
        );
        b.encode(&[0; 4], &mut out).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn concealment_decays_to_silence() {
        let mut b = backend();
        let mut out = [0i16; 4];
        let mut packet = Vec::new();
        b.encode(&[8_000; 4], &mut packet).unwrap();
        b.decode(&packet, &mut out).unwrap();
        let level = out[0];
        assert!(level > 7_000);

        b.conceal(&mut out).unwrap();
        assert_eq!(out[0], level >> 1);
        b.conceal(&mut out).unwrap();
        assert_eq!(out[0], level >> 2);
        for _ in 0..MAX_CONCEALED_FRAMES {
            b.conceal(&mut out).unwrap();
        }
        assert_eq!(out, [0; 4]);

        // a real packet restarts the run
        b.decode(&packet, &mut out).unwrap();
        b.conceal(&mut out).unwrap();
        assert_eq!(out[0], level >> 1);
    }

    #[test]
    fn short_packet_leaves_history_untouched() {
        let mut b = backend();
        let mut out = [0i16; 4];
        let mut packet = Vec::new();
        b.encode(&[8_000; 4], &mut packet).unwrap();
        b.decode(&packet, &mut out).unwrap();
        let level = out[0];

        assert!(matches!(b.decode(&packet[..2], &mut out), Err(CodecError::Decode(_))));
        b.conceal(&mut out).unwrap();
        assert_eq!(out, [level >> 1; 4]);
    }

    #[test]
    fn conceal_without_history_is_silence() {
        let mut b = backend();
        let mut out = [7i16; 4];
        assert_eq!(b.conceal(&mut out).unwrap(), 4);
        assert_eq!(out, [0; 4]);
    }
}
