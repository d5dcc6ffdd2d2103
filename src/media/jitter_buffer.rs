use std::collections::VecDeque;

use crate::media::speech_backend::CodecParams;

/// Floor for the prebuffer target.
pub const MIN_TARGET_FRAMES: usize = 2;
/// Queue cap as a multiple of the target; beyond it the oldest frame goes.
const MAX_DEPTH_FACTOR: usize = 8;

/// Source of loss-concealment frames used on underrun.
pub trait Concealer {
    /// One synthesized frame, or empty if none can be produced.
    fn conceal_frame(&mut self) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterState {
    Stopped,
    /// Accepting pushes, playout not yet ticking.
    Prebuffering,
    Running,
}

/// FIFO playout queue of decoded PCM frames.
///
/// Playout begins inside the `push` that brings the depth up to the target,
/// after which the caller's fixed-interval clock drives [`JitterBuffer::tick`].
#[derive(Debug)]
pub struct JitterBuffer {
    queue: VecDeque<Vec<u8>>,
    state: JitterState,
    frame_interval_ms: u32,
    frame_size_bytes: usize,
    target_depth_frames: usize,
    max_depth_frames: usize,
    underruns: u64,
    overflow_drops: u64,
}

impl JitterBuffer {
    #[must_use]
    pub fn new(params: &CodecParams, target_depth_ms: u32) -> Self {
        let frame_interval_ms = params.frame_duration_ms().max(1);
        let target_depth_frames =
            ((target_depth_ms / frame_interval_ms) as usize).max(MIN_TARGET_FRAMES);
        Self {
            queue: VecDeque::with_capacity(target_depth_frames * 2),
            state: JitterState::Stopped,
            frame_interval_ms,
            frame_size_bytes: params.frame_size_bytes(),
            target_depth_frames,
            max_depth_frames: target_depth_frames * MAX_DEPTH_FACTOR,
            underruns: 0,
            overflow_drops: 0,
        }
    }

    /// Enter prebuffering. No-op while already started.
    pub fn start(&mut self) {
        if self.state == JitterState::Stopped {
            self.state = JitterState::Prebuffering;
        }
    }

    /// Halt playout and discard buffered frames. The underrun count survives.
    pub fn stop(&mut self) {
        self.queue.clear();
        self.state = JitterState::Stopped;
    }

    /// `stop` plus zeroing the counters.
    pub fn reset(&mut self) {
        self.stop();
        self.underruns = 0;
        self.overflow_drops = 0;
    }

    /// Queue one decoded frame. Returns `true` when this push started playout.
    ///
    /// Frames pushed while stopped are discarded.
    pub fn push(&mut self, frame: Vec<u8>) -> bool {
        if self.state == JitterState::Stopped {
            return false;
        }
        if self.queue.len() >= self.max_depth_frames {
            self.queue.pop_front();
            self.overflow_drops += 1;
        }
        self.queue.push_back(frame);

        if self.state == JitterState::Prebuffering && self.queue.len() >= self.target_depth_frames {
            self.state = JitterState::Running;
            return true;
        }
        false
    }

    /// One playout tick. `None` unless running; otherwise always exactly one
    /// frame: the oldest queued one, a concealment frame, or silence.
    pub fn tick(&mut self, concealer: Option<&mut dyn Concealer>) -> Option<Vec<u8>> {
        if self.state != JitterState::Running {
            return None;
        }
        if let Some(frame) = self.queue.pop_front() {
            return Some(frame);
        }

        self.underruns += 1;
        let concealed = concealer.map(|c| c.conceal_frame()).unwrap_or_default();
        if concealed.is_empty() {
            Some(vec![0u8; self.frame_size_bytes])
        } else {
            Some(concealed)
        }
    }

    #[must_use]
    pub fn state(&self) -> JitterState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == JitterState::Running
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn underrun_count(&self) -> u64 {
        self.underruns
    }

    #[must_use]
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops
    }

    #[must_use]
    pub fn target_depth_frames(&self) -> usize {
        self.target_depth_frames
    }

    /// Playout clock period.
    #[must_use]
    pub fn frame_interval_ms(&self) -> u32 {
        self.frame_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u8>);

    impl Concealer for Fixed {
        fn conceal_frame(&mut self) -> Vec<u8> {
            self.0.clone()
        }
    }

    fn frame(tag: u8) -> Vec<u8> {
        vec![tag; CodecParams::VOICE.frame_size_bytes()]
    }

    fn started(target_ms: u32) -> JitterBuffer {
        let mut jb = JitterBuffer::new(&CodecParams::VOICE, target_ms);
        jb.start();
        jb
    }

    #[test]
    fn target_is_derived_from_frame_duration_with_floor() {
        assert_eq!(JitterBuffer::new(&CodecParams::VOICE, 60).target_depth_frames(), 3);
        assert_eq!(JitterBuffer::new(&CodecParams::VOICE, 100).target_depth_frames(), 5);
        assert_eq!(JitterBuffer::new(&CodecParams::VOICE, 20).target_depth_frames(), 2);
        assert_eq!(JitterBuffer::new(&CodecParams::VOICE, 0).target_depth_frames(), 2);
        assert_eq!(JitterBuffer::new(&CodecParams::VOICE, 0).frame_interval_ms(), 20);
    }

    #[test]
    fn runs_on_the_push_that_reaches_target() {
        let mut jb = started(60);
        assert_eq!(jb.state(), JitterState::Prebuffering);
        assert!(!jb.push(frame(1)));
        assert!(!jb.push(frame(2)));
        assert_eq!(jb.tick(None), None, "no playout while prebuffering");
        assert!(jb.push(frame(3)));
        assert!(jb.is_running());
        assert!(!jb.push(frame(4)), "only the first crossing reports");
    }

    #[test]
    fn playout_is_fifo() {
        let mut jb = started(40);
        jb.push(frame(1));
        jb.push(frame(2));
        jb.push(frame(3));
        assert_eq!(jb.tick(None), Some(frame(1)));
        assert_eq!(jb.tick(None), Some(frame(2)));
        assert_eq!(jb.current_depth(), 1);
    }

    #[test]
    fn underrun_emits_silence_without_concealer() {
        let mut jb = started(40);
        jb.push(frame(1));
        jb.push(frame(2));
        jb.tick(None);
        jb.tick(None);
        assert_eq!(jb.underrun_count(), 0);
        assert_eq!(jb.tick(None), Some(vec![0u8; 640]));
        assert_eq!(jb.underrun_count(), 1);
    }

    #[test]
    fn underrun_prefers_concealment() {
        let mut jb = started(40);
        jb.push(frame(1));
        jb.push(frame(2));
        jb.tick(None);
        jb.tick(None);

        let mut plc = Fixed(frame(9));
        assert_eq!(jb.tick(Some(&mut plc)), Some(frame(9)));
        assert_eq!(jb.underrun_count(), 1);

        let mut empty = Fixed(Vec::new());
        assert_eq!(jb.tick(Some(&mut empty)), Some(vec![0u8; 640]));
        assert_eq!(jb.underrun_count(), 2);
    }

    #[test]
    fn stop_discards_and_reset_zeroes_underruns() {
        let mut jb = started(40);
        jb.push(frame(1));
        jb.push(frame(2));
        jb.tick(None);
        jb.tick(None);
        jb.tick(None);
        jb.stop();
        assert_eq!(jb.state(), JitterState::Stopped);
        assert_eq!(jb.current_depth(), 0);
        assert_eq!(jb.underrun_count(), 1);
        assert!(!jb.push(frame(5)), "stopped buffer ignores pushes");
        assert_eq!(jb.current_depth(), 0);

        jb.start();
        assert_eq!(jb.state(), JitterState::Prebuffering);
        jb.reset();
        assert_eq!(jb.underrun_count(), 0);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut jb = started(40);
        for i in 0..(2 * MAX_DEPTH_FACTOR as u8 + 1) {
            jb.push(frame(i));
        }
        assert_eq!(jb.current_depth(), 2 * MAX_DEPTH_FACTOR);
        assert_eq!(jb.overflow_drops(), 1);
        assert_eq!(jb.tick(None), Some(frame(1)));
    }
}
