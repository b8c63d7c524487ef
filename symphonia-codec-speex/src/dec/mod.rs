mod inband;
mod nb;

use std::sync::Arc;

use log::warn;
use symphonia_core::audio::{
    AsAudioBufferRef, AudioBuffer, AudioBufferRef, Channels, Signal, SignalSpec,
};
use symphonia_core::codecs::{
    decl_codec_type, CodecDescriptor, CodecParameters, CodecType, Decoder as D, DecoderOptions,
    FinalizeResult,
};
use symphonia_core::errors::{unsupported_error, Result};
use symphonia_core::formats::Packet;
use symphonia_core::support_codec;

pub use inband::{IgnoreInband, InbandHandler, InbandRegistry, UserInbandHandler};
pub use nb::{DecodeStatus, NbDecoder};

use crate::bits::BitReader;
use crate::errors::Error;
use crate::modes::NbMode;

pub const CODEC_TYPE_SPEEX: CodecType = decl_codec_type(b"speex");

/// Frames decoded from a single packet at most.
const MAX_FRAMES_PER_PACKET: usize = 16;

fn saturate(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub struct Decoder {
    decoded_data: AudioBuffer<i16>,
    params: CodecParameters,
    raw: NbDecoder,
    frame: Vec<f32>,
}

impl Decoder {
    pub fn with_mode(params: &CodecParameters, mode: Arc<NbMode>) -> Result<Self> {
        let sample_rate = mode.params().sample_rate;
        match params.sample_rate {
            Some(sr) if sr != sample_rate => return unsupported_error("speex: unsupported sample rate"),
            _ => {}
        }
        let frame_size = mode.frame_size();
        Ok(Self {
            decoded_data: AudioBuffer::new(
                (frame_size * MAX_FRAMES_PER_PACKET) as u64,
                SignalSpec::new(sample_rate, Channels::FRONT_CENTRE),
            ),
            params: params.clone(),
            raw: NbDecoder::new(mode),
            frame: vec![0.0; frame_size],
        })
    }

    pub fn inner(&self) -> &NbDecoder {
        &self.raw
    }

    pub fn inner_mut(&mut self) -> &mut NbDecoder {
        &mut self.raw
    }

    /// Decode the frames of `data` into `pcm`. An empty packet is a lost
    /// frame, a corrupted one is concealed and ends the packet.
    fn decode_frames(&mut self, data: &[u8], pcm: &mut Vec<i16>) -> Result<()> {
        if data.is_empty() {
            self.raw.decode(None, &mut self.frame)?;
            pcm.extend(self.frame.iter().map(|x| saturate(*x)));
            return Ok(());
        }

        let mut bits = BitReader::new(data);
        for _ in 0..MAX_FRAMES_PER_PACKET {
            match self.raw.decode(Some(&mut bits), &mut self.frame) {
                Ok(DecodeStatus::EndOfStream) => return Ok(()),
                Ok(DecodeStatus::Decoded | DecodeStatus::Concealed) => {}
                Err(Error::CorruptedPayload(reason)) => {
                    warn!("speex: concealing corrupted frame: {}", reason);
                    self.raw.decode(None, &mut self.frame)?;
                    pcm.extend(self.frame.iter().map(|x| saturate(*x)));
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            pcm.extend(self.frame.iter().map(|x| saturate(*x)));
        }
        if bits.remaining() >= crate::consts::FRAME_HEADER_BITS {
            warn!("speex: dropping the frames after the first {} of a packet", MAX_FRAMES_PER_PACKET);
        }
        Ok(())
    }
}

impl D for Decoder {
    fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> Result<Self>
    where
        Self: Sized,
    {
        Self::with_mode(params, NbMode::narrowband())
    }

    fn reset(&mut self) {
        self.raw.reset();
        self.decoded_data.clear();
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        &[support_codec!(CODEC_TYPE_SPEEX, "speex", "Speex narrowband")]
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> Result<AudioBufferRef> {
        let mut pcm = Vec::with_capacity(self.frame.len());
        self.decode_frames(&packet.data, &mut pcm)?;

        self.decoded_data.clear();
        self.decoded_data.render_reserved(Some(pcm.len()));
        self.decoded_data.chan_mut(0).copy_from_slice(&pcm);

        Ok(self.decoded_data.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        Default::default()
    }

    fn last_decoded(&self) -> AudioBufferRef {
        self.decoded_data.as_audio_buffer_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitWriter;
    use crate::enc::NbEncoder;

    fn packet(data: Vec<u8>) -> Packet {
        Packet::new_from_boxed_slice(0, 0, 0, data.into_boxed_slice())
    }

    #[test]
    fn decodes_every_frame_of_a_packet() {
        let mode = NbMode::narrowband();
        let mut enc = NbEncoder::new(mode.clone());
        let mut bits = BitWriter::new();
        for f in 0..3 {
            let input: Vec<f32> = (0..160).map(|n| (((f * 160 + n) as f32) * 0.05).sin() * 3000.0).collect();
            enc.encode(&input, &mut bits).unwrap();
        }
        bits.insert_terminator();

        let params = CodecParameters::new().for_codec(CODEC_TYPE_SPEEX).with_sample_rate(8000).clone();
        let mut dec = Decoder::try_new(&params, &DecoderOptions::default()).unwrap();
        let buf = dec.decode(&packet(bits.into_bytes())).unwrap();
        assert_eq!(buf.frames(), 480);

        let buf = dec.decode(&packet(Vec::new())).unwrap();
        assert_eq!(buf.frames(), 160);
        assert_eq!(dec.inner().lost_count(), 1);
    }

    #[test]
    fn corrupted_frames_are_concealed() {
        let params = CodecParameters::new().for_codec(CODEC_TYPE_SPEEX).clone();
        let mut dec = Decoder::try_new(&params, &DecoderOptions::default()).unwrap();
        let buf = dec.decode(&packet(vec![0x48, 0, 0, 0])).unwrap();
        assert_eq!(buf.frames(), 160);
        assert_eq!(dec.inner().lost_count(), 1);
    }

    #[test]
    fn rejects_other_sample_rates() {
        let params = CodecParameters::new().for_codec(CODEC_TYPE_SPEEX).with_sample_rate(16000).clone();
        assert!(Decoder::try_new(&params, &DecoderOptions::default()).is_err());
    }

    #[test]
    fn saturates() {
        assert_eq!(saturate(40000.0), i16::MAX);
        assert_eq!(saturate(-40000.0), i16::MIN);
        assert_eq!(saturate(1.6), 2);
    }
}
