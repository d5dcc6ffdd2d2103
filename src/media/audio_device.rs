//! Default sound devices through cpal (feature `audio-device`).
//!
//! Capture delivers little-endian i16 PCM in whole codec frames; playback
//! consumes the frames produced by [`AudioStream::playout_tick`].
//!
//! [`AudioStream::playout_tick`]: crate::media::audio_stream::AudioStream::playout_tick

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use byteorder::{ByteOrder, LittleEndian};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::log::log_sink::LogSink;
use crate::media::speech_backend::CodecParams;
use crate::{sink_debug, sink_error, sink_info, sink_trace, sink_warn};

/// Half a second of output at most; older samples are dropped to catch up.
const MAX_PLAYBACK_MS: usize = 500;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn stream_config(params: CodecParams) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: params.channels,
        sample_rate: cpal::SampleRate(params.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Spawn the microphone thread. Frames arrive on the returned receiver until
/// `running` is cleared.
pub fn spawn_capture_device(
    params: CodecParams,
    logger: Arc<dyn LogSink>,
    running: Arc<AtomicBool>,
) -> (Receiver<Vec<u8>>, Option<JoinHandle<()>>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("lanpeer-audio-capture".into())
        .spawn(move || run_capture(params, &logger, tx, &running))
        .ok();
    (rx, handle)
}

fn run_capture(
    params: CodecParams,
    logger: &Arc<dyn LogSink>,
    tx: Sender<Vec<u8>>,
    running: &AtomicBool,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        sink_error!(logger, "[AudioCapture] no default input device");
        return;
    };
    sink_info!(
        logger,
        "[AudioCapture] using input device: {}",
        device.name().unwrap_or_default()
    );

    let frame_samples = params.frame_samples_total();
    let pending: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::with_capacity(frame_samples * 2)));
    let pending_cb = pending.clone();
    let logger_cb = logger.clone();

    let stream = device.build_input_stream(
        &stream_config(params),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mut buf = lock(&pending_cb);
            buf.extend(data.iter().map(|&f| (f.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16));
            while buf.len() >= frame_samples {
                let mut bytes = vec![0u8; frame_samples * 2];
                LittleEndian::write_i16_into(&buf[..frame_samples], &mut bytes);
                buf.drain(..frame_samples);
                if tx.send(bytes).is_err() {
                    return;
                }
            }
        },
        move |err| {
            sink_warn!(logger_cb, "[AudioCapture] stream error: {}", err);
        },
        None,
    );
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            sink_error!(logger, "[AudioCapture] failed to build input stream: {}", e);
            return;
        }
    };
    if let Err(e) = stream.play() {
        sink_error!(logger, "[AudioCapture] failed to start input stream: {}", e);
        return;
    }

    sink_debug!(logger, "[AudioCapture] started");
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
    sink_debug!(logger, "[AudioCapture] stopped");
}

/// Spawn the speaker thread fed with PCM frames over `frames`.
pub fn spawn_playback_device(
    params: CodecParams,
    logger: Arc<dyn LogSink>,
    frames: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    thread::Builder::new()
        .name("lanpeer-audio-playback".into())
        .spawn(move || run_playback(params, &logger, &frames, &running))
        .ok()
}

fn run_playback(
    params: CodecParams,
    logger: &Arc<dyn LogSink>,
    frames: &Receiver<Vec<u8>>,
    running: &AtomicBool,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        sink_error!(logger, "[AudioPlayback] no default output device");
        return;
    };
    sink_info!(
        logger,
        "[AudioPlayback] using output device: {}",
        device.name().unwrap_or_default()
    );

    let max_samples = params.sample_rate as usize * params.channels as usize * MAX_PLAYBACK_MS / 1_000;
    let buffer: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::with_capacity(max_samples)));
    let buffer_cb = buffer.clone();
    let logger_cb = logger.clone();

    let stream = device.build_output_stream(
        &stream_config(params),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut buf = lock(&buffer_cb);
            for sample in data.iter_mut() {
                *sample = buf.pop_front().unwrap_or(0.0);
            }
        },
        move |err| {
            sink_warn!(logger_cb, "[AudioPlayback] stream error: {}", err);
        },
        None,
    );
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            sink_error!(logger, "[AudioPlayback] failed to build output stream: {}", e);
            return;
        }
    };
    if let Err(e) = stream.play() {
        sink_error!(logger, "[AudioPlayback] failed to start output stream: {}", e);
        return;
    }

    sink_debug!(logger, "[AudioPlayback] started");
    while running.load(Ordering::Relaxed) {
        match frames.recv_timeout(Duration::from_millis(100)) {
            Ok(pcm) => {
                let mut samples = vec![0i16; pcm.len() / 2];
                LittleEndian::read_i16_into(&pcm[..samples.len() * 2], &mut samples);

                let mut buf = lock(&buffer);
                let overflow = (buf.len() + samples.len()).saturating_sub(max_samples);
                if overflow > 0 {
                    let to_drop = overflow.min(buf.len());
                    sink_trace!(logger, "[AudioPlayback] dropping {} samples to catch up", to_drop);
                    buf.drain(..to_drop);
                }
                buf.extend(samples.iter().map(|&s| f32::from(s) / f32::from(i16::MAX)));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    sink_debug!(logger, "[AudioPlayback] stopped");
}
