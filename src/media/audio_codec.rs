use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::log::log_sink::LogSink;
use crate::media::{
    codec_error::CodecError,
    g711_backend::G711Backend,
    jitter_buffer::Concealer,
    speech_backend::{CodecParams, SpeechBackend},
};
use crate::{sink_debug, sink_warn};

/// Frame-oriented speech codec over little-endian 16-bit PCM bytes.
///
/// Every operation that fails returns an empty buffer after logging; callers
/// treat empty as "no frame this round" and carry on with the next one.
pub struct AudioCodec {
    params: CodecParams,
    backend: Box<dyn SpeechBackend>,
    /// Partial frame carried between `encode_buffer` calls.
    pending: Vec<u8>,
    pcm: Vec<i16>,
    packet: Vec<u8>,
    log: Arc<dyn LogSink>,
}

impl AudioCodec {
    pub fn new(params: CodecParams, backend: Box<dyn SpeechBackend>, log: Arc<dyn LogSink>) -> Self {
        Self {
            params,
            backend,
            pending: Vec::with_capacity(params.frame_size_bytes()),
            pcm: vec![0; params.frame_samples_total()],
            packet: Vec::new(),
            log,
        }
    }

    /// G.711 µ-law, always available.
    pub fn pcmu(params: CodecParams, log: Arc<dyn LogSink>) -> Self {
        Self::new(params, Box::new(G711Backend::new(params)), log)
    }

    /// # Errors
    /// Propagates backend construction failure.
    #[cfg(feature = "opus")]
    pub fn opus(
        params: CodecParams,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, CodecError> {
        let backend = crate::media::opus_backend::OpusBackend::new(params)?;
        Ok(Self::new(params, Box::new(backend), log))
    }

    /// Opus when compiled in and constructible, otherwise G.711.
    pub fn preferred(params: CodecParams, log: Arc<dyn LogSink>) -> Self {
        #[cfg(feature = "opus")]
        match Self::opus(params, log.clone()) {
            Ok(codec) => return codec,
            Err(e) => sink_warn!(log, "[AudioCodec] opus unavailable ({}), using pcmu", e),
        }
        Self::pcmu(params, log)
    }

    #[must_use]
    pub fn params(&self) -> CodecParams {
        self.params
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn frame_size_bytes(&self) -> usize {
        self.params.frame_size_bytes()
    }

    /// Bytes waiting for the next `encode_buffer` call to complete a frame.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Encode exactly one PCM frame.
    pub fn encode(&mut self, frame: &[u8]) -> Vec<u8> {
        let expected = self.frame_size_bytes();
        if frame.len() != expected {
            sink_warn!(
                self.log,
                "[AudioCodec] encode: frame is {} bytes, expected {}",
                frame.len(),
                expected
            );
            return Vec::new();
        }
        LittleEndian::read_i16_into(frame, &mut self.pcm);
        match self.backend.encode(&self.pcm, &mut self.packet) {
            Ok(()) => self.packet.clone(),
            Err(e) => {
                sink_warn!(self.log, "[AudioCodec] {}", e);
                Vec::new()
            }
        }
    }

    /// Decode one packet into a PCM frame.
    pub fn decode(&mut self, packet: &[u8]) -> Vec<u8> {
        if packet.is_empty() {
            return Vec::new();
        }
        let result = self.backend.decode(packet, &mut self.pcm);
        self.pcm_bytes(result)
    }

    /// Loss-concealment frame synthesized from decoder history.
    pub fn conceal(&mut self) -> Vec<u8> {
        let result = self.backend.conceal(&mut self.pcm);
        self.pcm_bytes(result)
    }

    /// Accept PCM of any length; emit one packet per completed frame and keep
    /// the remainder for the next call.
    pub fn encode_buffer(&mut self, pcm: &[u8]) -> Vec<Vec<u8>> {
        let frame_bytes = self.frame_size_bytes();
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(pcm);

        let mut packets = Vec::new();
        let chunks = pending.chunks_exact(frame_bytes);
        let remainder = chunks.remainder().to_vec();
        for frame in chunks {
            let packet = self.encode(frame);
            if !packet.is_empty() {
                packets.push(packet);
            }
        }

        pending.clear();
        pending.extend_from_slice(&remainder);
        self.pending = pending;
        packets
    }

    /// Drop the partial frame and the backend's history (session restart).
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Err(e) = self.backend.reset() {
            sink_warn!(self.log, "[AudioCodec] reset failed: {}", e);
        }
        sink_debug!(self.log, "[AudioCodec] reset ({})", self.backend.name());
    }

    fn pcm_bytes(&mut self, result: Result<usize, CodecError>) -> Vec<u8> {
        match result {
            Ok(n) if n == self.pcm.len() => {
                let mut bytes = vec![0u8; n * 2];
                LittleEndian::write_i16_into(&self.pcm, &mut bytes);
                bytes
            }
            Ok(n) => {
                sink_warn!(
                    self.log,
                    "[AudioCodec] decoded {} samples, expected {}; frame dropped",
                    n,
                    self.pcm.len()
                );
                Vec::new()
            }
            Err(e) => {
                sink_warn!(self.log, "[AudioCodec] {}", e);
                Vec::new()
            }
        }
    }
}

impl Concealer for AudioCodec {
    fn conceal_frame(&mut self) -> Vec<u8> {
        self.conceal()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    #[cfg(feature = "log-warn")]
    use crate::log::LogLevel;
    use crate::log::{CaptureLogSink, NoopLogSink};

    fn tone_frame(params: CodecParams, amplitude: i16) -> Vec<u8> {
        let samples: Vec<i16> = (0..params.frame_samples_total())
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        let mut bytes = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(&samples, &mut bytes);
        bytes
    }

    fn codec() -> AudioCodec {
        AudioCodec::pcmu(CodecParams::VOICE, Arc::new(NoopLogSink))
    }

    #[test]
    fn one_frame_roundtrips_to_same_byte_length() {
        let mut c = codec();
        let frame = tone_frame(c.params(), 4_000);
        let packet = c.encode(&frame);
        assert_eq!(packet.len(), 320);

        let pcm = c.decode(&packet);
        assert_eq!(pcm.len(), 640);
        let first = LittleEndian::read_i16(&pcm[..2]);
        assert!((i32::from(first) - 4_000).abs() < 200, "{first}");
    }

    #[test]
    fn wrong_frame_size_yields_empty_and_logs() {
        let log = Arc::new(CaptureLogSink::new());
        let mut c = AudioCodec::pcmu(CodecParams::VOICE, log.clone());
        assert!(c.encode(&[0u8; 100]).is_empty());
        #[cfg(feature = "log-warn")]
        assert!(log.contains(LogLevel::Warn, "expected 640"));
    }

    #[test]
    fn truncated_packet_is_not_a_frame() {
        let log = Arc::new(CaptureLogSink::new());
        let mut c = AudioCodec::pcmu(CodecParams::VOICE, log.clone());
        assert!(c.decode(&[0xFF; 10]).is_empty());
        #[cfg(feature = "log-warn")]
        assert!(log.contains(LogLevel::Warn, "packet of 10 samples, frame is 320"));
    }

    #[test]
    fn empty_packet_decodes_to_nothing() {
        assert!(codec().decode(&[]).is_empty());
    }

    #[test]
    fn encode_buffer_splits_and_keeps_remainder() {
        let mut c = codec();
        let frame = tone_frame(c.params(), 1_000);

        assert!(c.encode_buffer(&frame[..600]).is_empty());
        assert_eq!(c.buffered_bytes(), 600);

        let mut more = frame[600..].to_vec();
        more.extend_from_slice(&frame);
        more.extend_from_slice(&frame[..10]);
        let packets = c.encode_buffer(&more);
        assert_eq!(packets.len(), 2);
        assert_eq!(c.buffered_bytes(), 10);

        c.reset();
        assert_eq!(c.buffered_bytes(), 0);
    }

    #[test]
    fn conceal_emits_full_frame() {
        let mut c = codec();
        let frame = tone_frame(c.params(), 2_000);
        let packet = c.encode(&frame);
        c.decode(&packet);
        assert_eq!(c.conceal().len(), c.frame_size_bytes());
        assert_eq!(c.conceal_frame().len(), c.frame_size_bytes());
    }
}
