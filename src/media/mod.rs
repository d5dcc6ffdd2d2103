pub mod audio_codec;
#[cfg(feature = "audio-device")]
pub mod audio_device;
pub mod audio_stream;
pub mod codec_error;
pub mod frame_error;
pub mod g711_backend;
pub mod jitter_buffer;
pub mod media_frame;
pub mod media_kind;
#[cfg(feature = "opus")]
pub mod opus_backend;
pub mod sequence_counter;
pub mod speech_backend;

pub use audio_codec::AudioCodec;
pub use audio_stream::AudioStream;
pub use codec_error::CodecError;
pub use frame_error::FrameError;
pub use jitter_buffer::{JitterBuffer, JitterState};
pub use media_frame::MediaFrame;
pub use media_kind::MediaKind;
pub use speech_backend::CodecParams;
