use opus::{Application, Bitrate, Channels, Decoder, Encoder};

use crate::media::{
    codec_error::CodecError,
    speech_backend::{CodecParams, SpeechBackend},
};

pub const VOICE_BITRATE: i32 = 24_000;
/// Upper bound for one encoded packet.
const MAX_PACKET: usize = 4_000;

/// Opus in VoIP mode with in-band FEC enabled.
pub struct OpusBackend {
    encoder: Encoder,
    decoder: Decoder,
    channels: usize,
    scratch: Vec<u8>,
}

impl OpusBackend {
    /// # Errors
    /// [`CodecError::Create`] if libopus rejects the rate/channel layout.
    pub fn new(params: CodecParams) -> Result<Self, CodecError> {
        let channels = match params.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => return Err(CodecError::Create(format!("unsupported channel count {n}"))),
        };
        let create = |e: opus::Error| CodecError::Create(e.to_string());

        let mut encoder = Encoder::new(params.sample_rate, channels, Application::Voip).map_err(create)?;
        encoder.set_bitrate(Bitrate::Bits(VOICE_BITRATE)).map_err(create)?;
        encoder.set_inband_fec(true).map_err(create)?;
        let decoder = Decoder::new(params.sample_rate, channels).map_err(create)?;

        Ok(Self {
            encoder,
            decoder,
            channels: params.channels as usize,
            scratch: vec![0u8; MAX_PACKET],
        })
    }
}

impl SpeechBackend for OpusBackend {
    fn name(&self) -> &'static str {
        "opus"
    }

    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let n = self
            .encoder
            .encode(pcm, &mut self.scratch)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        out.clear();
        out.extend_from_slice(&self.scratch[..n]);
        Ok(())
    }

    fn decode(&mut self, packet: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
        let per_channel = self
            .decoder
            .decode(packet, out, false)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(per_channel * self.channels)
    }

    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError> {
        // An empty packet asks libopus for packet-loss concealment.
        self.decode(&[], out)
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.encoder
            .reset_state()
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}
