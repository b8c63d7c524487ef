//! Narrowband CELP decoder, including packet loss concealment.

use std::sync::Arc;

use log::{debug, trace};
use num_traits::FromPrimitive;

use crate::bits::BitReader;
use crate::buffer::FrameBuffer;
use crate::consts::{
    ReservedId, FRAME_HEADER_BITS, OL_GAIN_BITS, OL_PITCH_BITS, OL_PITCH_COEF_BITS, SUBMODE_BITS,
    WIDEBAND_FLAG_BITS,
};
use crate::ctl::{Request, Response};
use crate::errors::{Error, Result};
use crate::filters::{bw_lpc, deemphasis, energy, filter_mem2_inplace, iir_mem2, pi_gain};
use crate::lsp::{flat_lsp, subframe_lpc};
use crate::ltp::{adaptive_vector, forced_gain, PitchChoice, PitchRange};
use crate::modes::NbMode;
use crate::submodes::{frame_gain, subframe_gain, Submode};

use super::inband::InbandRegistry;

/// Upper bound of the pitch gain replayed by concealment.
const PLC_PITCH_GAIN_MAX: f32 = 0.95;
/// Synthesis memory damping on the first good frame after a loss.
const RECOVERY_DAMPING: f32 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A frame was read from the stream.
    Decoded,
    /// No frame was available, one was synthesized.
    Concealed,
    /// Terminator or end of data. The output is left untouched.
    EndOfStream,
}

#[derive(Debug)]
struct SubframeParams {
    pitch: PitchChoice,
    ener: f32,
    /// Unit-gain innovation.
    innov: Vec<f32>,
}

/// Everything read for one coded frame, before any state is touched.
#[derive(Debug)]
struct CodedFrame {
    qlsp: Vec<f32>,
    ol_gain: f32,
    subframes: Vec<SubframeParams>,
}

/// Deterministic noise for concealment.
#[derive(Clone, Copy, Debug)]
struct Lcg(u32);

impl Lcg {
    /// Uniform sample of unit variance.
    fn sample(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let u = (self.0 >> 8) as f32 / (1u32 << 24) as f32;
        (2.0 * u - 1.0) * 3.0f32.sqrt()
    }
}

pub struct NbDecoder {
    mode: Arc<NbMode>,
    exc: FrameBuffer,
    old_qlsp: Vec<f32>,
    interp_qlpc: Vec<f32>,
    pi_gain: Vec<f32>,
    mem_sp: Vec<f32>,
    enh_mem: Vec<f32>,
    deemph_mem: f32,
    first: bool,
    submode_id: usize,
    /// Enhancer factors of the last coded frame.
    enh_factors: Option<(f32, f32)>,
    enhancer: bool,
    count_lost: u32,
    last_pitch: usize,
    last_pitch_gain: f32,
    pitch_gain_history: [f32; 3],
    last_ol_gain: f32,
    last_innov_rms: f32,
    last_energy: f32,
    noise: Lcg,
    sampling_rate: u32,
    inband: InbandRegistry,
}

impl std::fmt::Debug for NbDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NbDecoder")
            .field("submode_id", &self.submode_id)
            .field("count_lost", &self.count_lost)
            .field("last_pitch", &self.last_pitch)
            .field("last_pitch_gain", &self.last_pitch_gain)
            .field("enhancer", &self.enhancer)
            .finish()
    }
}

impl NbDecoder {
    pub fn new(mode: Arc<NbMode>) -> Self {
        let p = mode.params();
        let layout = *mode.layout();
        let mut interp_qlpc = vec![0.0f32; layout.order + 1];
        interp_qlpc[0] = 1.0;
        Self {
            exc: FrameBuffer::new(layout.pitch_max + 2, layout.frame_size),
            old_qlsp: flat_lsp(layout.order),
            interp_qlpc,
            pi_gain: vec![0.0; layout.nb_subframes],
            mem_sp: vec![0.0; layout.order],
            enh_mem: vec![0.0; layout.order],
            deemph_mem: 0.0,
            first: true,
            submode_id: p.default_submode,
            enh_factors: None,
            enhancer: true,
            count_lost: 0,
            last_pitch: layout.pitch_min,
            last_pitch_gain: 0.0,
            pitch_gain_history: [0.0; 3],
            last_ol_gain: 0.0,
            last_innov_rms: 0.0,
            last_energy: 0.0,
            noise: Lcg(1000),
            sampling_rate: p.sample_rate,
            inband: InbandRegistry::default(),
            mode,
        }
    }

    pub fn mode(&self) -> &Arc<NbMode> {
        &self.mode
    }

    pub fn frame_size(&self) -> usize {
        self.mode.frame_size()
    }

    pub fn inband_mut(&mut self) -> &mut InbandRegistry {
        &mut self.inband
    }

    pub fn set_enhancer(&mut self, enabled: bool) {
        self.enhancer = enabled;
    }

    pub fn submode(&self) -> usize {
        self.submode_id
    }

    pub fn last_pitch(&self) -> usize {
        self.last_pitch
    }

    pub fn last_pitch_gain(&self) -> f32 {
        self.last_pitch_gain
    }

    pub fn lost_count(&self) -> u32 {
        self.count_lost
    }

    /// Back to the freshly created state. Inband handlers and settings are
    /// kept.
    pub fn reset(&mut self) {
        debug!("speex: decoder reset");
        let inband = std::mem::take(&mut self.inband);
        let enhancer = self.enhancer;
        let sampling_rate = self.sampling_rate;
        *self = Self::new(self.mode.clone());
        self.inband = inband;
        self.enhancer = enhancer;
        self.sampling_rate = sampling_rate;
    }

    /// Decode the next frame of `bits` into `out`, or conceal one when `bits`
    /// is `None`.
    ///
    /// A corrupted frame leaves the signal state as it was, the caller may
    /// conceal it by calling again with `None`.
    pub fn decode(&mut self, bits: Option<&mut BitReader>, out: &mut [f32]) -> Result<DecodeStatus> {
        let frame_size = self.mode.frame_size();
        if out.len() != frame_size {
            return Err(Error::InvalidFrameSize {
                expected: frame_size,
                actual: out.len(),
            });
        }

        let Some(bits) = bits else {
            self.conceal(out);
            return Ok(DecodeStatus::Concealed);
        };

        let id = loop {
            if bits.remaining() < FRAME_HEADER_BITS {
                return Ok(DecodeStatus::EndOfStream);
            }
            if bits.read(WIDEBAND_FLAG_BITS)? != 0 {
                return Err(Error::CorruptedPayload("Wideband layer is not supported"));
            }
            let id = bits.read(SUBMODE_BITS)?;
            match ReservedId::from_u32(id) {
                Some(ReservedId::Terminator) => return Ok(DecodeStatus::EndOfStream),
                Some(ReservedId::Inband) => self.inband.dispatch(bits)?,
                Some(ReservedId::UserInband) => self.inband.dispatch_user(bits)?,
                None => break id as usize,
            }
        };

        let mode = self.mode.clone();
        let submode = match mode.submode(id) {
            Ok(submode) => submode.cloned(),
            Err(_) => return Err(Error::CorruptedPayload("Unknown submode")),
        };
        if id != self.submode_id {
            debug!("speex: stream switched to submode {}", id);
        }

        match submode {
            None => {
                self.submode_id = id;
                self.silence(out);
            }
            Some(submode) => {
                let frame = self.parse(submode.as_ref(), bits)?;
                self.submode_id = id;
                self.synthesize(submode.as_ref(), &frame, out)?;
            }
        }
        Ok(DecodeStatus::Decoded)
    }

    fn parse(&self, submode: &dyn Submode, bits: &mut BitReader) -> Result<CodedFrame> {
        let layout = self.mode.layout();
        let mut qlsp = vec![0.0f32; layout.order];
        submode.lsp_unquant(&mut qlsp, bits)?;

        let lbr = submode.lbr_pitch();
        let ol_pitch = match lbr {
            Some(_) => layout.pitch_min + bits.read(OL_PITCH_BITS)? as usize,
            None => layout.pitch_min,
        };
        if ol_pitch > layout.pitch_max {
            return Err(Error::CorruptedPayload("Open-loop pitch outside of the range"));
        }
        let ol_pitch_gain = if submode.forced_pitch_gain() {
            forced_gain(bits.read(OL_PITCH_COEF_BITS)?)
        } else {
            0.0
        };
        let ol_gain = frame_gain(bits.read(OL_GAIN_BITS)?);

        let gain_bits = submode.subframe_gain_bits();
        let mut subframes = Vec::with_capacity(layout.nb_subframes);
        for _ in 0..layout.nb_subframes {
            let range = PitchRange::for_subframe(lbr, ol_pitch, layout.pitch_min, layout.pitch_max);
            let pitch = submode.ltp_unquant(bits, range, ol_pitch, ol_pitch_gain)?;
            if pitch.lag == 0 || pitch.lag > self.exc.history() {
                return Err(Error::CorruptedPayload("Pitch lag outside of the excitation history"));
            }
            let ener = subframe_gain(gain_bits, bits.read(gain_bits)?) * ol_gain;
            let mut innov = vec![0.0f32; layout.subframe_size];
            submode.innovation_unquant(&mut innov, bits)?;
            subframes.push(SubframeParams { pitch, ener, innov });
        }

        Ok(CodedFrame {
            qlsp,
            ol_gain,
            subframes,
        })
    }

    fn synthesize(&mut self, submode: &dyn Submode, frame: &CodedFrame, out: &mut [f32]) -> Result<()> {
        let mode = self.mode.clone();
        let p = mode.params();
        let layout = *mode.layout();
        let nsf = layout.subframe_size;

        self.exc.shift();

        let mut pitch_scale = 1.0;
        if self.count_lost > 0 {
            let dist: f32 = self.old_qlsp.iter().zip(&frame.qlsp).map(|(a, b)| (a - b).abs()).sum();
            let damp = RECOVERY_DAMPING * (-0.2 * dist).exp();
            for m in self.mem_sp.iter_mut() {
                *m *= damp;
            }
            if frame.ol_gain < self.last_ol_gain && self.last_ol_gain > 0.0 {
                pitch_scale = frame.ol_gain / self.last_ol_gain;
            }
            trace!("speex: recovering after {} lost frames", self.count_lost);
            self.old_qlsp.copy_from_slice(&frame.qlsp);
        }
        if self.first {
            self.old_qlsp.copy_from_slice(&frame.qlsp);
        }
        self.enh_factors = Some(submode.enhancer());

        let mut v = vec![0.0f32; nsf];
        let mut innov_energy = 0.0f32;
        for (sub, params) in frame.subframes.iter().enumerate() {
            let offset = sub * nsf;
            subframe_lpc(&self.old_qlsp, &frame.qlsp, sub, layout.nb_subframes, p.lsp_margin, &mut self.interp_qlpc);
            self.pi_gain[sub] = pi_gain(&self.interp_qlpc);

            adaptive_vector(&self.exc, offset, params.pitch.lag, &mut v)?;
            let exc = self.exc.subframe_mut(offset, nsf);
            for ((e, x), i) in exc.iter_mut().zip(&v).zip(&params.innov) {
                let mut pitch = params.pitch.gain * x;
                if pitch_scale != 1.0 {
                    pitch *= pitch_scale;
                }
                let innov = i * params.ener;
                innov_energy += innov * innov;
                *e = pitch + innov;
            }

            self.filter_subframe(offset, &mut out[offset..offset + nsf]);
        }
        deemphasis(out, p.preemph, &mut self.deemph_mem);

        let last = frame.subframes.last();
        self.last_pitch = last.map_or(self.last_pitch, |s| s.pitch.lag);
        self.last_pitch_gain = last.map_or(0.0, |s| s.pitch.gain);
        self.pitch_gain_history.rotate_left(1);
        self.pitch_gain_history[2] = self.last_pitch_gain;
        self.last_ol_gain = frame.ol_gain;
        self.last_innov_rms = (innov_energy / layout.frame_size as f32).sqrt();
        self.last_energy = energy(out);
        self.old_qlsp.copy_from_slice(&frame.qlsp);
        self.first = false;
        self.count_lost = 0;
        Ok(())
    }

    /// Synthesis (and enhancement) of the excitation at `offset` into `out`.
    fn filter_subframe(&mut self, offset: usize, out: &mut [f32]) {
        iir_mem2(self.exc.subframe(offset, out.len()), &self.interp_qlpc, out, &mut self.mem_sp);
        if let (true, Some((k1, k2))) = (self.enhancer, self.enh_factors) {
            let order = self.interp_qlpc.len();
            let mut awk1 = vec![0.0f32; order];
            let mut awk2 = vec![0.0f32; order];
            bw_lpc(k1, &self.interp_qlpc, &mut awk1);
            bw_lpc(k2, &self.interp_qlpc, &mut awk2);
            let before = energy(out);
            filter_mem2_inplace(out, &awk2, &awk1, &mut self.enh_mem);
            let after = energy(out);
            let g = ((before + 1.0) / (after + 1.0)).sqrt();
            for y in out.iter_mut() {
                *y *= g;
            }
        }
    }

    fn silence(&mut self, out: &mut [f32]) {
        let p = self.mode.params();
        self.exc.shift();
        self.exc.frame_mut().fill(0.0);
        iir_mem2(self.exc.frame(), &self.interp_qlpc, out, &mut self.mem_sp);
        deemphasis(out, p.preemph, &mut self.deemph_mem);

        self.last_pitch_gain = 0.0;
        self.pitch_gain_history.rotate_left(1);
        self.pitch_gain_history[2] = 0.0;
        self.last_innov_rms = 0.0;
        self.last_energy = energy(out);
        self.first = true;
        self.count_lost = 0;
    }

    fn conceal(&mut self, out: &mut [f32]) {
        let mode = self.mode.clone();
        let p = mode.params();
        let layout = *mode.layout();
        let nsf = layout.subframe_size;

        let mut history = self.pitch_gain_history;
        history.sort_by(f32::total_cmp);
        let fade = p.plc_decay.powi(self.count_lost as i32 + 1);
        let g = history[1].min(self.last_pitch_gain).min(PLC_PITCH_GAIN_MAX).max(0.0) * fade;
        let noise_gain = self.last_innov_rms * fade * (1.0 - g * g).max(0.0).sqrt();
        trace!("speex: concealing frame {} with pitch {} gain {:.3}", self.count_lost + 1, self.last_pitch, g);

        self.exc.shift();
        let lag = self.last_pitch;
        if let Some((past, current)) = self.exc.split_at_lag(0, lag) {
            for n in 0..current.len() {
                let prev = if n < lag { past[n] } else { current[n - lag] };
                current[n] = g * prev;
            }
        } else {
            self.exc.frame_mut().fill(0.0);
        }
        for e in self.exc.frame_mut() {
            *e += noise_gain * self.noise.sample();
        }

        for sub in 0..layout.nb_subframes {
            let offset = sub * nsf;
            self.filter_subframe(offset, &mut out[offset..offset + nsf]);
        }
        deemphasis(out, p.preemph, &mut self.deemph_mem);

        let ceiling = self.last_energy * p.plc_decay * p.plc_decay;
        let e = energy(out);
        if e > ceiling {
            let s = if e > 0.0 { (ceiling / e).sqrt() } else { 0.0 };
            out.iter_mut().for_each(|y| *y *= s);
            self.exc.frame_mut().iter_mut().for_each(|x| *x *= s);
            self.mem_sp.iter_mut().for_each(|m| *m *= s);
            self.enh_mem.iter_mut().for_each(|m| *m *= s);
            self.deemph_mem *= s;
        }
        self.last_energy = energy(out);
        self.count_lost += 1;
    }

    /// Bit-rate of the last decoded submode at the configured sampling rate.
    fn bitrate(&self) -> Result<u32> {
        let bits = self.mode.bits_per_frame(self.submode_id)? as u64;
        Ok((bits * self.sampling_rate as u64 / self.mode.frame_size() as u64) as u32)
    }

    /// Typed control surface. Out-of-range values leave the decoder untouched.
    pub fn ctl(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::SetEnhancer(enabled) => {
                self.enhancer = enabled;
                Ok(Response::Done)
            }
            Request::GetEnhancer => Ok(Response::Bool(self.enhancer)),
            Request::GetFrameSize => Ok(Response::Int(self.mode.frame_size() as i32)),
            Request::GetMode | Request::GetLowMode => Ok(Response::Int(self.submode_id as i32)),
            Request::GetBitrate => Ok(Response::Int(self.bitrate()? as i32)),
            Request::SetSamplingRate(rate) => {
                if rate <= 0 {
                    return Err(Error::InvalidArgument("sampling rate must be positive"));
                }
                self.sampling_rate = rate as u32;
                Ok(Response::Done)
            }
            Request::GetSamplingRate => Ok(Response::Int(self.sampling_rate as i32)),
            Request::ResetState => {
                self.reset();
                Ok(Response::Done)
            }
            Request::GetLookahead => Ok(Response::Int(self.mode.lookahead() as i32)),
            Request::GetPitchRange => {
                let l = self.mode.layout();
                Ok(Response::Range(l.pitch_min as i32, l.pitch_max as i32))
            }
            Request::GetPiGain => Ok(Response::Samples(self.pi_gain.clone())),
            Request::GetExc => Ok(Response::Samples(self.exc.frame().to_vec())),
            Request::GetLastPitch => Ok(Response::Int(self.last_pitch as i32)),
            Request::GetLastPitchGain => Ok(Response::Float(self.last_pitch_gain)),
            Request::GetLostCount => Ok(Response::Int(self.count_lost as i32)),
            Request::SetQuality(_)
            | Request::SetMode(_)
            | Request::SetLowMode(_)
            | Request::SetHighMode(_)
            | Request::GetHighMode
            | Request::SetVbr(_)
            | Request::GetVbr
            | Request::SetVbrQuality(_)
            | Request::GetVbrQuality
            | Request::SetComplexity(_)
            | Request::GetComplexity
            | Request::SetBitrate(_)
            | Request::GetRelativeQuality
            | Request::SetDtx(_)
            | Request::GetDtx
            | Request::GetInnov => Err(Error::UnsupportedControl(request.name())),
        }
    }
}
