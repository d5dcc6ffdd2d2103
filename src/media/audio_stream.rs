use std::sync::Arc;

use crate::config::AudioSettings;
use crate::log::log_sink::LogSink;
use crate::media::{
    audio_codec::AudioCodec,
    jitter_buffer::{Concealer, JitterBuffer},
    speech_backend::CodecParams,
};
use crate::{sink_debug, sink_info};

/// One call's audio path: captured PCM → packets on the way out, received
/// packets → jitter buffer → playout frames on the way in.
pub struct AudioStream {
    codec: AudioCodec,
    jitter: JitterBuffer,
    capturing: bool,
    playing: bool,
    muted: bool,
    log: Arc<dyn LogSink>,
}

impl AudioStream {
    pub fn new(codec: AudioCodec, jitter_target_ms: u32, log: Arc<dyn LogSink>) -> Self {
        let jitter = JitterBuffer::new(&codec.params(), jitter_target_ms);
        Self {
            codec,
            jitter,
            capturing: false,
            playing: false,
            muted: false,
            log,
        }
    }

    /// Preferred backend for the configured rate and framing.
    pub fn from_settings(audio: &AudioSettings, log: Arc<dyn LogSink>) -> Self {
        let codec = AudioCodec::preferred(CodecParams::from_settings(audio), log.clone());
        Self::new(codec, audio.jitter_target_ms, log)
    }

    pub fn start_capture(&mut self) {
        if self.capturing {
            return;
        }
        self.codec.reset();
        self.capturing = true;
        sink_info!(self.log, "[AudioStream] capture started ({})", self.codec.backend_name());
    }

    pub fn stop_capture(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;
        sink_info!(self.log, "[AudioStream] capture stopped");
    }

    pub fn start_playback(&mut self) {
        if self.playing {
            return;
        }
        self.jitter.start();
        self.playing = true;
        sink_info!(
            self.log,
            "[AudioStream] playback started (target {} frames)",
            self.jitter.target_depth_frames()
        );
    }

    pub fn stop_playback(&mut self) {
        if !self.playing {
            return;
        }
        self.jitter.stop();
        self.playing = false;
        sink_info!(
            self.log,
            "[AudioStream] playback stopped ({} underruns)",
            self.jitter.underrun_count()
        );
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Encode captured PCM. Nothing is produced while muted or not capturing.
    pub fn on_captured_pcm(&mut self, pcm: &[u8]) -> Vec<Vec<u8>> {
        if !self.capturing || self.muted || pcm.is_empty() {
            return Vec::new();
        }
        self.codec.encode_buffer(pcm)
    }

    /// Decode a received packet into the jitter buffer.
    pub fn on_packet_received(&mut self, packet: &[u8]) {
        if !self.playing {
            return;
        }
        let frame = self.codec.decode(packet);
        if frame.is_empty() {
            return;
        }
        if self.jitter.push(frame) {
            sink_debug!(self.log, "[AudioStream] prebuffer filled, playout running");
        }
    }

    /// Next frame for the sound device, on the jitter buffer's cadence.
    pub fn playout_tick(&mut self) -> Option<Vec<u8>> {
        if !self.playing {
            return None;
        }
        let plc: &mut dyn Concealer = &mut self.codec;
        self.jitter.tick(Some(plc))
    }

    #[must_use]
    pub fn jitter(&self) -> &JitterBuffer {
        &self.jitter
    }

    #[must_use]
    pub fn codec(&self) -> &AudioCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoopLogSink;

    fn stream() -> AudioStream {
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        AudioStream::new(AudioCodec::pcmu(CodecParams::VOICE, log.clone()), 40, log)
    }

    #[test]
    fn capture_encodes_only_when_started_and_unmuted() {
        let mut s = stream();
        let frame = vec![0u8; 640];
        assert!(s.on_captured_pcm(&frame).is_empty());

        s.start_capture();
        assert_eq!(s.on_captured_pcm(&frame).len(), 1);

        s.set_muted(true);
        assert!(s.on_captured_pcm(&frame).is_empty());
        s.set_muted(false);
        s.stop_capture();
        assert!(s.on_captured_pcm(&frame).is_empty());
    }

    #[test]
    fn received_packets_play_out_after_prebuffer() {
        let mut tx = stream();
        tx.start_capture();
        let packets = tx.on_captured_pcm(&vec![0u8; 640 * 3]);
        assert_eq!(packets.len(), 3);

        let mut rx = stream();
        rx.start_playback();
        rx.on_packet_received(&packets[0]);
        assert_eq!(rx.playout_tick(), None);
        rx.on_packet_received(&packets[1]);
        assert!(rx.jitter().is_running());
        assert_eq!(rx.playout_tick().map(|f| f.len()), Some(640));
        assert_eq!(rx.playout_tick().map(|f| f.len()), Some(640));
        // Underrun: concealment keeps the cadence.
        assert_eq!(rx.playout_tick().map(|f| f.len()), Some(640));
        assert_eq!(rx.jitter().underrun_count(), 1);

        rx.stop_playback();
        assert_eq!(rx.playout_tick(), None);
        assert_eq!(rx.jitter().current_depth(), 0);
    }

    #[test]
    fn truncated_packets_never_reach_playout() {
        let mut tx = stream();
        tx.start_capture();
        let packets = tx.on_captured_pcm(&vec![0u8; 640 * 2]);

        let mut rx = stream();
        rx.start_playback();
        rx.on_packet_received(&[0xFF; 10]);
        rx.on_packet_received(&[0xFF; 10]);
        assert_eq!(rx.jitter().current_depth(), 0);
        assert_eq!(rx.playout_tick(), None);

        rx.on_packet_received(&packets[0]);
        rx.on_packet_received(&packets[1][..10]);
        rx.on_packet_received(&packets[1]);
        assert!(rx.jitter().is_running());
        for _ in 0..3 {
            assert_eq!(rx.playout_tick().map(|f| f.len()), Some(640));
        }
    }
}
