//! Narrowband CELP encoder.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::bits::BitWriter;
use crate::buffer::FrameBuffer;
use crate::consts::{
    inband_payload_bits, ReservedId, OL_PITCH_BITS, OL_PITCH_COEF_BITS, OL_GAIN_BITS, SUBMODE_BITS,
    WIDEBAND_FLAG_BITS,
};
use crate::ctl::{Request, Response};
use crate::errors::{Error, Result};
use crate::filters::{
    bw_lpc, deemphasis, energy, filter_mem2, filter_mem2_inplace, fir_mem2, iir_mem2, pi_gain,
    preemphasis, residue_percep_zero, syn_percep_zero,
};
use crate::lpc::{autocorr, levinson};
use crate::lsp::{flat_lsp, lpc_to_lsp, lsp_enforce_margin, lsp_is_ordered, lsp_to_lpc, subframe_lpc};
use crate::ltp::{
    forced_gain, open_loop_nbest, pick_open_loop_pitch, quantize_forced_gain, LtpSearch, PitchRange,
    OL_PITCH_CANDIDATES,
};
use crate::modes::NbMode;
use crate::submodes::{frame_gain, quantize_frame_gain, quantize_subframe_gain, subframe_gain};
use crate::vbr::{Dtx, FrameStats, RateController, SpeechVbr};

/// Coarse and fine steps of the LSP root search.
const LSP_DELTA1: f32 = 0.2;
const LSP_DELTA2: f32 = 0.05;
const LSP_BISECTIONS: usize = 15;

/// Signal state carried from frame to frame. Kept apart from the settings so
/// a failed frame can be rolled back by restoring a copy.
#[derive(Clone, Debug)]
struct EncoderMemory {
    /// Pre-emphasized input, with enough history for the analysis window.
    input: FrameBuffer,
    /// Excitation, the adaptive codebook reads its history.
    exc: FrameBuffer,
    /// Perceptually weighted signal.
    sw: FrameBuffer,
    /// Local reconstruction of the current frame.
    synth: Vec<f32>,
    /// Reconstruction after de-emphasis, what a decoder outputs.
    reconstruction: Vec<f32>,
    innov: Vec<f32>,
    pi_gain: Vec<f32>,
    old_lsp: Vec<f32>,
    old_qlsp: Vec<f32>,
    /// Quantized filter of the last subframe.
    interp_qlpc: Vec<f32>,
    mem_sp: Vec<f32>,
    mem_sw: Vec<f32>,
    mem_sw_whole: Vec<f32>,
    mem_exc: Vec<f32>,
    pre_mem: f32,
    deemph_mem: f32,
    first: bool,
    bounded_pitch: bool,
}

impl EncoderMemory {
    fn new(mode: &NbMode) -> Self {
        let p = mode.params();
        let order = p.lpc_order;
        let history = p.pitch_max + 2;
        let mut interp_qlpc = vec![0.0f32; order + 1];
        interp_qlpc[0] = 1.0;
        Self {
            input: FrameBuffer::new(p.window_size - p.frame_size, p.frame_size),
            exc: FrameBuffer::new(history, p.frame_size),
            sw: FrameBuffer::new(history, p.frame_size),
            synth: vec![0.0; p.frame_size],
            reconstruction: vec![0.0; p.frame_size],
            innov: vec![0.0; p.frame_size],
            pi_gain: vec![0.0; mode.layout().nb_subframes],
            old_lsp: flat_lsp(order),
            old_qlsp: flat_lsp(order),
            interp_qlpc,
            mem_sp: vec![0.0; order],
            mem_sw: vec![0.0; order],
            mem_sw_whole: vec![0.0; order],
            mem_exc: vec![0.0; order],
            pre_mem: 0.0,
            deemph_mem: 0.0,
            first: true,
            bounded_pitch: true,
        }
    }
}

/// Open-loop analysis of a whole frame.
struct FrameAnalysis {
    lsp: Vec<f32>,
    lsp_dist: f32,
    ol_pitch: usize,
    ol_pitch_coef: f32,
    ol_gain: f32,
}

pub struct NbEncoder {
    mode: Arc<NbMode>,
    mem: EncoderMemory,
    submode_id: usize,
    submode_select: usize,
    complexity: u32,
    vbr: Box<dyn RateController>,
    vbr_enabled: bool,
    vbr_quality: f32,
    relative_quality: f32,
    dtx: Dtx,
    dtx_enabled: bool,
    sampling_rate: u32,
}

impl std::fmt::Debug for NbEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NbEncoder")
            .field("submode_id", &self.submode_id)
            .field("complexity", &self.complexity)
            .field("vbr_enabled", &self.vbr_enabled)
            .field("first", &self.mem.first)
            .finish()
    }
}

impl NbEncoder {
    pub fn new(mode: Arc<NbMode>) -> Self {
        Self::with_rate_controller(mode, Box::new(SpeechVbr::new()))
    }

    pub fn with_rate_controller(mode: Arc<NbMode>, vbr: Box<dyn RateController>) -> Self {
        let submode = mode.params().default_submode;
        let sampling_rate = mode.params().sample_rate;
        Self {
            mem: EncoderMemory::new(&mode),
            mode,
            submode_id: submode,
            submode_select: submode,
            complexity: 2,
            vbr,
            vbr_enabled: false,
            vbr_quality: 8.0,
            relative_quality: 0.0,
            dtx: Dtx::default(),
            dtx_enabled: false,
            sampling_rate,
        }
    }

    pub fn mode(&self) -> &Arc<NbMode> {
        &self.mode
    }

    pub fn frame_size(&self) -> usize {
        self.mode.frame_size()
    }

    /// Submode of the last encoded frame.
    pub fn submode(&self) -> usize {
        self.submode_id
    }

    /// What a decoder reconstructs from the last frame, with no loss and the
    /// enhancer off.
    pub fn reconstruction(&self) -> &[f32] {
        &self.mem.reconstruction
    }

    pub fn reset(&mut self) {
        debug!("speex: encoder reset");
        self.mem = EncoderMemory::new(&self.mode);
        self.vbr.reset();
        self.dtx.reset();
        self.relative_quality = 0.0;
        self.submode_id = self.submode_select;
    }

    /// Append an inband request to the stream, to be sent before a frame.
    pub fn write_inband_request(&self, code: u8, payload: u64, bits: &mut BitWriter) -> Result<()> {
        if code > 15 {
            return Err(Error::InvalidArgument("inband code must fit 4 bits"));
        }
        let width = inband_payload_bits(code);
        if width < 64 && payload >> width != 0 {
            return Err(Error::InvalidArgument("inband payload wider than its code allows"));
        }
        bits.write(0, WIDEBAND_FLAG_BITS);
        bits.write(ReservedId::Inband as u32, SUBMODE_BITS);
        bits.write(code as u32, 4);
        bits.write_u64(payload, width);
        Ok(())
    }

    /// Append user inband data, at most 15 bytes.
    pub fn write_user_inband(&self, data: &[u8], bits: &mut BitWriter) -> Result<()> {
        if data.len() > 15 {
            return Err(Error::InvalidArgument("user inband data is limited to 15 bytes"));
        }
        bits.write(0, WIDEBAND_FLAG_BITS);
        bits.write(ReservedId::UserInband as u32, SUBMODE_BITS);
        bits.write(data.len() as u32, 4);
        for b in data {
            bits.write(*b as u32, 8);
        }
        Ok(())
    }

    /// Encode one frame of samples in the 16-bit range. On error nothing is
    /// appended to `bits` and the encoder state is left as it was.
    pub fn encode(&mut self, input: &[f32], bits: &mut BitWriter) -> Result<()> {
        let frame_size = self.mode.frame_size();
        if input.len() != frame_size {
            return Err(Error::InvalidFrameSize {
                expected: frame_size,
                actual: input.len(),
            });
        }

        let snapshot = self.mem.clone();
        let submode_id = self.submode_id;
        let mark = bits.len();
        let res = self.encode_frame(input, bits);
        if res.is_err() {
            self.mem = snapshot;
            self.submode_id = submode_id;
            bits.truncate(mark);
        }
        res
    }

    fn analyse(&mut self, input: &[f32]) -> FrameAnalysis {
        let mode = self.mode.clone();
        let p = mode.params();
        let layout = mode.layout();
        let order = layout.order;
        let m = &mut self.mem;

        m.input.shift();
        m.exc.shift();
        m.sw.shift();
        preemphasis(input, p.preemph, m.input.frame_mut(), &mut m.pre_mem);

        // Windowed autocorrelation with lag window and noise floor
        let mut ac = vec![0.0f32; order + 1];
        if let Some(span) = m.input.tail(p.window_size) {
            let windowed: Vec<f32> = span.iter().zip(mode.window()).map(|(x, w)| x * w).collect();
            autocorr(&windowed, &mut ac);
        }
        ac[0] += 10.0;
        ac[0] *= p.lpc_floor;
        for (r, w) in ac.iter_mut().zip(mode.lag_window()) {
            *r *= w;
        }
        let mut lpc = vec![0.0f32; order + 1];
        let mut rc = vec![0.0f32; order];
        levinson(&ac, &mut lpc, &mut rc);

        let mut lsp = vec![0.0f32; order];
        let mut roots = lpc_to_lsp(&lpc, &mut lsp, LSP_BISECTIONS, LSP_DELTA1);
        if roots != order && self.complexity > 1 {
            roots = lpc_to_lsp(&lpc, &mut lsp, LSP_BISECTIONS, LSP_DELTA2);
        }
        if roots != order {
            warn!("speex: found {} of {} LSP roots, reusing the previous spectrum", roots, order);
            lsp.copy_from_slice(&m.old_lsp);
        }

        let lsp_dist: f32 = m.old_lsp.iter().zip(&lsp).map(|(a, b)| (a - b).abs()).sum();
        if m.first {
            m.old_lsp.copy_from_slice(&lsp);
        }

        // Whole-frame filter, between the previous and the current spectrum
        let mut interp_lsp: Vec<f32> = m.old_lsp.iter().zip(&lsp).map(|(o, n)| 0.375 * o + 0.625 * n).collect();
        lsp_enforce_margin(&mut interp_lsp, p.lsp_margin);
        let mut interp_lpc = vec![0.0f32; order + 1];
        lsp_to_lpc(&interp_lsp, &mut interp_lpc);

        let mut bw1 = vec![0.0f32; order + 1];
        let mut bw2 = vec![0.0f32; order + 1];
        bw_lpc(p.gamma1, &interp_lpc, &mut bw1);
        bw_lpc(p.gamma2, &interp_lpc, &mut bw2);
        filter_mem2(m.input.frame(), &bw1, &bw2, m.sw.frame_mut(), &mut m.mem_sw_whole);

        let candidates = open_loop_nbest(&m.sw, 0, layout.frame_size, layout.pitch_min, layout.pitch_max, OL_PITCH_CANDIDATES);
        let (ol_pitch, ol_pitch_coef) = match pick_open_loop_pitch(&candidates) {
            Some(c) => (c.lag, c.gain),
            None => (layout.pitch_min, 0.0),
        };
        trace!("speex: open-loop pitch {} ({:.3})", ol_pitch, ol_pitch_coef);

        let mut res = vec![0.0f32; layout.frame_size];
        fir_mem2(m.input.frame(), &interp_lpc, &mut res, &mut m.mem_exc);
        let ol_gain = (0.1 + energy(&res) / layout.frame_size as f32).sqrt();

        FrameAnalysis {
            lsp,
            lsp_dist,
            ol_pitch,
            ol_pitch_coef,
            ol_gain,
        }
    }

    fn select_submode(&mut self, input: &[f32], analysis: &FrameAnalysis) -> usize {
        if !self.vbr_enabled {
            return self.submode_select;
        }
        let stats = FrameStats {
            frame: input,
            ol_pitch: analysis.ol_pitch,
            ol_pitch_coef: analysis.ol_pitch_coef,
            lsp_dist: analysis.lsp_dist,
        };
        let thresholds = &self.mode.params().vbr_thresholds;
        let chosen = self.vbr.select(self.vbr_quality, self.complexity, &stats, thresholds);
        self.relative_quality = self.vbr.relative_quality();
        let lowest_coded = (1..self.mode.nb_submodes())
            .find(|id| matches!(self.mode.submode(*id), Ok(Some(_))))
            .unwrap_or(self.submode_select);
        let id = self.dtx.apply(chosen, self.dtx_enabled, analysis.lsp_dist, lowest_coded);
        trace!("speex: vbr quality {:.2} selects submode {}", self.relative_quality, id);
        id
    }

    fn encode_frame(&mut self, input: &[f32], bits: &mut BitWriter) -> Result<()> {
        let analysis = self.analyse(input);
        let id = self.select_submode(input, &analysis);

        let mode = self.mode.clone();
        let p = mode.params();
        let layout = *mode.layout();
        let order = layout.order;
        let nsf = layout.subframe_size;

        let submode = mode.submode(id)?;
        if id != self.submode_id {
            debug!("speex: switching to submode {}", id);
        }
        self.submode_id = id;

        bits.write(0, WIDEBAND_FLAG_BITS);
        bits.write(id as u32, SUBMODE_BITS);

        let m = &mut self.mem;
        let Some(submode) = submode else {
            // Silence: zero excitation through the last filter
            m.exc.frame_mut().fill(0.0);
            m.sw.frame_mut().fill(0.0);
            m.innov.fill(0.0);
            m.mem_sw.fill(0.0);
            let zeros = vec![0.0f32; layout.frame_size];
            iir_mem2(&zeros, &m.interp_qlpc, &mut m.synth, &mut m.mem_sp);
            m.reconstruction.copy_from_slice(&m.synth);
            deemphasis(&mut m.reconstruction, p.preemph, &mut m.deemph_mem);
            m.old_lsp.copy_from_slice(&analysis.lsp);
            m.first = true;
            m.bounded_pitch = true;
            return Ok(());
        };

        let lsp = &analysis.lsp;
        let mut qlsp = vec![0.0f32; order];
        submode.lsp_quant(lsp, &mut qlsp, bits)?;
        if !lsp_is_ordered(&qlsp) {
            return Err(Error::UnstableSpectrum);
        }
        if m.first {
            m.old_qlsp.copy_from_slice(&qlsp);
        }

        let ol_pitch = analysis.ol_pitch.clamp(layout.pitch_min, layout.pitch_max);
        if submode.lbr_pitch().is_some() {
            bits.write((ol_pitch - layout.pitch_min) as u32, OL_PITCH_BITS);
        }
        let mut ol_pitch_gain = 0.0;
        if submode.forced_pitch_gain() {
            let q = quantize_forced_gain(analysis.ol_pitch_coef);
            bits.write(q, OL_PITCH_COEF_BITS);
            ol_pitch_gain = forced_gain(q);
        }
        let qe = quantize_frame_gain(analysis.ol_gain);
        bits.write(qe, OL_GAIN_BITS);
        let ol_gain = frame_gain(qe);

        let mut interp_lpc = vec![0.0f32; order + 1];
        let mut bw1 = vec![0.0f32; order + 1];
        let mut bw2 = vec![0.0f32; order + 1];
        let mut impulse = vec![0.0f32; nsf];
        let mut delta = vec![0.0f32; nsf];
        delta[0] = 1.0;
        let zeros = vec![0.0f32; nsf];
        let mut ringing = vec![0.0f32; nsf];
        let mut target = vec![0.0f32; nsf];
        let mut pitch_exc = vec![0.0f32; nsf];
        let mut residue = vec![0.0f32; nsf];
        let mut innov = vec![0.0f32; nsf];

        for sub in 0..layout.nb_subframes {
            let offset = sub * nsf;

            subframe_lpc(&m.old_lsp, lsp, sub, layout.nb_subframes, p.lsp_margin, &mut interp_lpc);
            subframe_lpc(&m.old_qlsp, &qlsp, sub, layout.nb_subframes, p.lsp_margin, &mut m.interp_qlpc);
            m.pi_gain[sub] = pi_gain(&m.interp_qlpc);
            bw_lpc(p.gamma1, &interp_lpc, &mut bw1);
            bw_lpc(p.gamma2, &interp_lpc, &mut bw2);

            syn_percep_zero(&delta, &m.interp_qlpc, &bw1, &bw2, &mut impulse);

            // Zero-input response of the weighted synthesis filter
            let mut mem = m.mem_sp.clone();
            iir_mem2(&zeros, &m.interp_qlpc, &mut ringing, &mut mem);
            let mut mem = m.mem_sw.clone();
            filter_mem2_inplace(&mut ringing, &bw1, &bw2, &mut mem);

            // Weighted input, replaced by the weighted synthesis below
            let mut mem = m.mem_sw.clone();
            filter_mem2(m.input.subframe(offset, nsf), &bw1, &bw2, m.sw.subframe_mut(offset, nsf), &mut mem);
            for ((t, s), r) in target.iter_mut().zip(m.sw.subframe(offset, nsf)).zip(&ringing) {
                *t = s - r;
            }

            let mut range = PitchRange::for_subframe(submode.lbr_pitch(), ol_pitch, layout.pitch_min, layout.pitch_max);
            if m.bounded_pitch {
                range = range.bounded(offset);
            }
            submode.ltp_quant(
                LtpSearch {
                    target: &mut target,
                    sw: &m.sw,
                    exc: &m.exc,
                    impulse: &impulse,
                    offset,
                    range,
                    ol_pitch,
                    ol_pitch_gain,
                    complexity: self.complexity,
                },
                &mut pitch_exc,
                bits,
            )?;
            m.exc.subframe_mut(offset, nsf).copy_from_slice(&pitch_exc);

            // Innovation gain relative to the frame gain
            residue_percep_zero(&target, &m.interp_qlpc, &bw1, &bw2, &mut residue);
            let ener = (0.1 + energy(&residue) / nsf as f32).sqrt() / ol_gain;
            let gain_bits = submode.subframe_gain_bits();
            let gain_idx = quantize_subframe_gain(gain_bits, ener);
            bits.write(gain_idx, gain_bits);
            let ener = subframe_gain(gain_bits, gain_idx) * ol_gain;

            for t in target.iter_mut() {
                *t /= ener;
            }
            innov.fill(0.0);
            submode.innovation_quant(&target, &impulse, self.complexity, &mut innov, bits);
            for v in innov.iter_mut() {
                *v *= ener;
            }
            for (e, i) in m.exc.subframe_mut(offset, nsf).iter_mut().zip(&innov) {
                *e += i;
            }
            m.innov[offset..offset + nsf].copy_from_slice(&innov);

            let synth = &mut m.synth[offset..offset + nsf];
            iir_mem2(m.exc.subframe(offset, nsf), &m.interp_qlpc, synth, &mut m.mem_sp);
            filter_mem2(synth, &bw1, &bw2, m.sw.subframe_mut(offset, nsf), &mut m.mem_sw);
        }

        m.reconstruction.copy_from_slice(&m.synth);
        deemphasis(&mut m.reconstruction, p.preemph, &mut m.deemph_mem);

        m.old_lsp.copy_from_slice(lsp);
        m.old_qlsp.copy_from_slice(&qlsp);
        m.first = false;
        m.bounded_pitch = false;
        Ok(())
    }

    /// Typed control surface. Out-of-range values leave the encoder untouched.
    pub fn ctl(&mut self, request: Request) -> Result<Response> {
        let mode = self.mode.clone();
        match request {
            Request::GetFrameSize => Ok(Response::Int(mode.frame_size() as i32)),
            Request::SetQuality(quality) => {
                let id = usize::try_from(quality)
                    .ok()
                    .and_then(|q| mode.params().quality_map.get(q))
                    .copied()
                    .ok_or(Error::InvalidArgument("quality must lie in 0..=10"))?;
                self.submode_select = id;
                self.submode_id = id;
                Ok(Response::Done)
            }
            Request::SetMode(id) | Request::SetLowMode(id) => {
                let id = usize::try_from(id)
                    .ok()
                    .filter(|id| *id < mode.nb_submodes())
                    .ok_or(Error::InvalidArgument("no such submode"))?;
                self.submode_select = id;
                self.submode_id = id;
                Ok(Response::Done)
            }
            Request::GetMode | Request::GetLowMode => Ok(Response::Int(self.submode_id as i32)),
            Request::SetVbr(enabled) => {
                self.vbr_enabled = enabled;
                Ok(Response::Done)
            }
            Request::GetVbr => Ok(Response::Bool(self.vbr_enabled)),
            Request::SetVbrQuality(quality) => {
                if !(0.0..=10.0).contains(&quality) {
                    return Err(Error::InvalidArgument("VBR quality must lie in [0, 10]"));
                }
                self.vbr_quality = quality;
                Ok(Response::Done)
            }
            Request::GetVbrQuality => Ok(Response::Float(self.vbr_quality)),
            Request::SetComplexity(complexity) => {
                if !(0..=10).contains(&complexity) {
                    return Err(Error::InvalidArgument("complexity must lie in 0..=10"));
                }
                self.complexity = complexity as u32;
                Ok(Response::Done)
            }
            Request::GetComplexity => Ok(Response::Int(self.complexity as i32)),
            Request::SetBitrate(rate) => {
                if rate <= 0 {
                    return Err(Error::InvalidArgument("bit-rate must be positive"));
                }
                let map = &mode.params().quality_map;
                let mut id = map[0];
                for q in (0..map.len()).rev() {
                    if mode.bitrate(map[q])? as i32 <= rate {
                        id = map[q];
                        break;
                    }
                }
                self.submode_select = id;
                self.submode_id = id;
                Ok(Response::Done)
            }
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
            Request::GetRelativeQuality => Ok(Response::Float(self.relative_quality)),
            Request::SetDtx(enabled) => {
                self.dtx_enabled = enabled;
                Ok(Response::Done)
            }
            Request::GetDtx => Ok(Response::Bool(self.dtx_enabled)),
            Request::GetLookahead => Ok(Response::Int(mode.lookahead() as i32)),
            Request::GetPitchRange => {
                let l = mode.layout();
                Ok(Response::Range(l.pitch_min as i32, l.pitch_max as i32))
            }
            Request::GetPiGain => Ok(Response::Samples(self.mem.pi_gain.clone())),
            Request::GetExc => Ok(Response::Samples(self.mem.exc.frame().to_vec())),
            Request::GetInnov => Ok(Response::Samples(self.mem.innov.clone())),
            Request::SetEnhancer(_)
            | Request::GetEnhancer
            | Request::SetHighMode(_)
            | Request::GetHighMode
            | Request::GetLastPitch
            | Request::GetLastPitchGain
            | Request::GetLostCount => Err(Error::UnsupportedControl(request.name())),
        }
    }

    /// Bit-rate of the current submode at the configured sampling rate.
    fn bitrate(&self) -> Result<u32> {
        let bits = self.mode.bits_per_frame(self.submode_id)? as u64;
        Ok((bits * self.sampling_rate as u64 / self.mode.frame_size() as u64) as u32)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitReader;

    fn tone(frame: usize, len: usize) -> Vec<f32> {
        (0..len).map(|n| ((frame * len + n) as f32 * 0.07).sin() * 6000.0).collect()
    }

    #[test]
    fn frame_sizes_match_submodes() {
        let mode = NbMode::narrowband();
        for id in 1..mode.nb_submodes() {
            let mut enc = NbEncoder::new(mode.clone());
            enc.ctl(Request::SetMode(id as i32)).unwrap();
            let mut bits = BitWriter::new();
            for f in 0..3 {
                enc.encode(&tone(f, 160), &mut bits).unwrap();
            }
            assert_eq!(bits.len() as u32, 3 * mode.bits_per_frame(id).unwrap(), "submode {}", id);
        }
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let mut enc = NbEncoder::new(NbMode::narrowband());
        let mut bits = BitWriter::new();
        let res = enc.encode(&[0.0; 100], &mut bits);
        assert!(matches!(res, Err(Error::InvalidFrameSize { expected: 160, actual: 100 })));
        assert!(bits.is_empty());
    }

    #[test]
    fn silence_frame_is_header_only() {
        let mut enc = NbEncoder::new(NbMode::narrowband());
        enc.ctl(Request::SetMode(0)).unwrap();
        let mut bits = BitWriter::new();
        enc.encode(&tone(0, 160), &mut bits).unwrap();
        assert_eq!(bits.len(), 5);
        assert!(enc.reconstruction().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn inband_requests() {
        let enc = NbEncoder::new(NbMode::narrowband());
        let mut bits = BitWriter::new();
        enc.write_inband_request(2, 5, &mut bits).unwrap();
        assert_eq!(bits.len(), 5 + 4 + 4);
        assert!(enc.write_inband_request(2, 16, &mut bits).is_err());
        enc.write_user_inband(b"hi", &mut bits).unwrap();
        assert!(enc.write_user_inband(&[0; 16], &mut bits).is_err());

        let bytes = bits.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(5).unwrap(), 14);
        assert_eq!(r.read(4).unwrap(), 2);
        assert_eq!(r.read(4).unwrap(), 5);
        assert_eq!(r.read(5).unwrap(), 13);
        assert_eq!(r.read(4).unwrap(), 2);
        assert_eq!(r.read(8).unwrap(), b'h' as u32);
    }

    #[test]
    fn controls_validate_arguments() {
        let mut enc = NbEncoder::new(NbMode::narrowband());
        assert!(matches!(enc.ctl(Request::SetComplexity(11)), Err(Error::InvalidArgument(_))));
        assert_eq!(enc.ctl(Request::GetComplexity).unwrap(), Response::Int(2));
        assert!(matches!(enc.ctl(Request::SetQuality(-1)), Err(Error::InvalidArgument(_))));
        assert!(matches!(enc.ctl(Request::GetLostCount), Err(Error::UnsupportedControl(_))));

        enc.ctl(Request::SetQuality(10)).unwrap();
        assert_eq!(enc.ctl(Request::GetMode).unwrap(), Response::Int(6));
        enc.ctl(Request::SetBitrate(9000)).unwrap();
        assert_eq!(enc.ctl(Request::GetBitrate).unwrap(), Response::Int(8900));
        enc.ctl(Request::SetBitrate(1)).unwrap();
        assert_eq!(enc.ctl(Request::GetMode).unwrap(), Response::Int(1));
        assert_eq!(enc.ctl(Request::GetLookahead).unwrap(), Response::Int(80));
        assert_eq!(enc.ctl(Request::GetPitchRange).unwrap(), Response::Range(17, 144));
    }
}
