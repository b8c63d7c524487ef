//! Submodes: the per-bit-rate quantization profiles a frame can be coded with.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::bits::{BitReader, BitWriter};
use crate::cb_search::PulseCodebook;
use crate::consts::{FRAME_HEADER_BITS, OL_GAIN_BITS, OL_PITCH_BITS, OL_PITCH_COEF_BITS};
use crate::errors::{Error, Result};
use crate::ltp::{forced_pitch, index_bits, pitch_gain, LtpSearch, PitchChoice, PitchRange, SingleTapLtp};
use crate::modes::FrameLayout;
use crate::quant_lsp::LspQuantizer;

/// Subframe gain corrections, relative to the frame excitation gain.
pub const SUBFRAME_GAIN_3BIT: [f32; 8] =
    [0.061130, 0.163546, 0.320700, 0.504308, 0.723356, 1.002377, 1.442595, 2.106049];
pub const SUBFRAME_GAIN_1BIT: [f32; 2] = [0.70469, 1.05127];

fn gain_table(bits: u32) -> &'static [f32] {
    match bits {
        1 => &SUBFRAME_GAIN_1BIT,
        3 => &SUBFRAME_GAIN_3BIT,
        _ => &[],
    }
}

/// Index of the nearest entry of the `bits` wide subframe gain table.
pub fn quantize_subframe_gain(bits: u32, gain: f32) -> u32 {
    let table = gain_table(bits);
    table
        .windows(2)
        .take_while(|pair| gain > 0.5 * (pair[0] + pair[1]))
        .count() as u32
}

/// Subframe gain correction, 1 when the submode sends none.
pub fn subframe_gain(bits: u32, index: u32) -> f32 {
    gain_table(bits).get(index as usize).copied().unwrap_or(1.0)
}

/// Index of the frame excitation gain, `round(3.5 ln(gain))` on 5 bits.
pub fn quantize_frame_gain(gain: f32) -> u32 {
    (0.5 + 3.5 * gain.ln()).floor().clamp(0.0, 31.0) as u32
}

pub fn frame_gain(index: u32) -> f32 {
    (index as f32 / 3.5).exp()
}

/// Quantizer/dequantizer capability of one submode. The pipelines own the
/// frame structure and only delegate the parameter coding.
pub trait Submode: Send + Sync + Debug {
    fn lsp_quant(&self, lsp: &[f32], qlsp: &mut [f32], bits: &mut BitWriter) -> Result<()>;

    fn lsp_unquant(&self, qlsp: &mut [f32], bits: &mut BitReader) -> Result<()>;

    /// `None` for a full pitch search in every subframe, `Some(margin)` to
    /// search around a transmitted open-loop pitch (`Some(0)` pins it).
    fn lbr_pitch(&self) -> Option<u32>;

    /// The open-loop pitch gain is sent once per frame and reused by every
    /// subframe.
    fn forced_pitch_gain(&self) -> bool;

    /// Width of the subframe gain correction, 0, 1 or 3.
    fn subframe_gain_bits(&self) -> u32;

    /// Pitch search for one subframe, returning the chosen lag and gain. The
    /// unfiltered pitch contribution is left in `out`.
    fn ltp_quant(&self, search: LtpSearch<'_>, out: &mut [f32], bits: &mut BitWriter) -> Result<PitchChoice>;

    /// Read the lag and gain of one subframe.
    fn ltp_unquant(
        &self,
        bits: &mut BitReader,
        range: PitchRange,
        ol_pitch: usize,
        ol_pitch_gain: f32,
    ) -> Result<PitchChoice>;

    fn innovation_quant(
        &self,
        target: &[f32],
        impulse: &[f32],
        complexity: u32,
        innov: &mut [f32],
        bits: &mut BitWriter,
    );

    fn innovation_unquant(&self, innov: &mut [f32], bits: &mut BitReader) -> Result<()>;

    /// Enhancer bandwidth factors `(k1, k2)` of the postfilter
    /// `A(z/k2) / A(z/k1)`.
    fn enhancer(&self) -> (f32, f32);

    /// Size of a frame coded with this submode, header included.
    fn bits_per_frame(&self, layout: &FrameLayout) -> u32;
}

/// Serializable description of a [`CelpSubmode`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmodeParams {
    pub lsp_bits: u32,
    pub lbr_pitch: Option<u32>,
    #[serde(default)]
    pub forced_pitch_gain: bool,
    #[serde(default)]
    pub pitch_gain_bits: u32,
    #[serde(default)]
    pub subframe_gain_bits: u32,
    pub pulse_tracks: usize,
    pub pulses_per_track: usize,
    pub lpc_enh_k1: f32,
    pub lpc_enh_k2: f32,
}

impl SubmodeParams {
    pub fn validate(&self, layout: &FrameLayout) -> Result<()> {
        let fail = |what: &str| -> Result<()> { Err(Error::InvalidConfig(what.to_string())) };
        if !(1..=8).contains(&self.lsp_bits) {
            return fail("LSP quantizer needs 1 to 8 bits per coefficient");
        }
        if self.forced_pitch_gain && self.lbr_pitch != Some(0) {
            return fail("a forced pitch gain needs a pinned open-loop pitch");
        }
        if !self.forced_pitch_gain && !(1..=8).contains(&self.pitch_gain_bits) {
            return fail("pitch gain needs 1 to 8 bits");
        }
        if !matches!(self.subframe_gain_bits, 0 | 1 | 3) {
            return fail("subframe gain is sent on 0, 1 or 3 bits");
        }
        if self.pulse_tracks == 0
            || self.pulses_per_track == 0
            || layout.subframe_size % self.pulse_tracks != 0
        {
            return fail("pulse tracks must split the subframe evenly");
        }
        if self.lbr_pitch.is_some() && layout.pitch_max - layout.pitch_min >= 1 << OL_PITCH_BITS {
            return fail("pitch range does not fit the open-loop pitch field");
        }
        if !(0.0..1.0).contains(&self.lpc_enh_k2) || !(0.0..1.0).contains(&self.lpc_enh_k1) {
            return fail("enhancer factors must lie in [0, 1)");
        }
        Ok(())
    }
}

/// Submode made of the codec's building blocks: differential LSP
/// quantizer, single-tap pitch predictor and signed-pulse codebook.
#[derive(Clone, Debug)]
pub struct CelpSubmode {
    params: SubmodeParams,
    lsp: LspQuantizer,
    ltp: SingleTapLtp,
    innovation: PulseCodebook,
}

impl CelpSubmode {
    pub fn new(params: SubmodeParams) -> Self {
        Self {
            lsp: LspQuantizer::new(params.lsp_bits),
            ltp: SingleTapLtp { gain_bits: params.pitch_gain_bits },
            innovation: PulseCodebook::new(params.pulse_tracks, params.pulses_per_track),
            params,
        }
    }

    pub fn params(&self) -> &SubmodeParams {
        &self.params
    }

    fn pitch_bits(&self, layout: &FrameLayout) -> u32 {
        if self.params.forced_pitch_gain {
            return 0;
        }
        let lag_bits = match self.params.lbr_pitch {
            None => index_bits(layout.pitch_max - layout.pitch_min + 1),
            Some(margin) => index_bits(2 * margin as usize),
        };
        lag_bits + self.params.pitch_gain_bits
    }
}

impl Submode for CelpSubmode {
    fn lsp_quant(&self, lsp: &[f32], qlsp: &mut [f32], bits: &mut BitWriter) -> Result<()> {
        self.lsp.quantize(lsp, qlsp, bits)
    }

    fn lsp_unquant(&self, qlsp: &mut [f32], bits: &mut BitReader) -> Result<()> {
        self.lsp.unquantize(qlsp, bits)
    }

    fn lbr_pitch(&self) -> Option<u32> {
        self.params.lbr_pitch
    }

    fn forced_pitch_gain(&self) -> bool {
        self.params.forced_pitch_gain
    }

    fn subframe_gain_bits(&self) -> u32 {
        self.params.subframe_gain_bits
    }

    fn ltp_quant(&self, search: LtpSearch<'_>, out: &mut [f32], bits: &mut BitWriter) -> Result<PitchChoice> {
        if self.params.forced_pitch_gain {
            forced_pitch(search, out)
        } else {
            self.ltp.quantize(search, out, bits)
        }
    }

    fn ltp_unquant(
        &self,
        bits: &mut BitReader,
        range: PitchRange,
        ol_pitch: usize,
        ol_pitch_gain: f32,
    ) -> Result<PitchChoice> {
        if self.params.forced_pitch_gain {
            return Ok(PitchChoice { lag: ol_pitch, gain: ol_pitch_gain });
        }
        let (lag, idx) = self.ltp.unquantize(bits, range)?;
        Ok(PitchChoice {
            lag,
            gain: pitch_gain(idx, self.params.pitch_gain_bits),
        })
    }

    fn innovation_quant(
        &self,
        target: &[f32],
        impulse: &[f32],
        complexity: u32,
        innov: &mut [f32],
        bits: &mut BitWriter,
    ) {
        self.innovation.quantize(target, impulse, complexity, innov, bits)
    }

    fn innovation_unquant(&self, innov: &mut [f32], bits: &mut BitReader) -> Result<()> {
        self.innovation.unquantize(innov, bits)
    }

    fn enhancer(&self) -> (f32, f32) {
        (self.params.lpc_enh_k1, self.params.lpc_enh_k2)
    }

    fn bits_per_frame(&self, layout: &FrameLayout) -> u32 {
        let mut total = FRAME_HEADER_BITS as u32 + self.params.lsp_bits * layout.order as u32;
        if self.params.lbr_pitch.is_some() {
            total += OL_PITCH_BITS;
        }
        if self.params.forced_pitch_gain {
            total += OL_PITCH_COEF_BITS;
        }
        total += OL_GAIN_BITS;
        let per_subframe = self.pitch_bits(layout)
            + self.params.subframe_gain_bits
            + self.innovation.bits(layout.subframe_size);
        total + per_subframe * layout.nb_subframes as u32
    }
}

/// The six coded submodes of the narrowband mode, from 5 to 22 kbps.
pub fn default_submodes() -> Vec<Option<SubmodeParams>> {
    let celp = |lsp_bits, lbr_pitch, pitch_gain_bits, subframe_gain_bits, pulse_tracks, pulses_per_track, k2| {
        Some(SubmodeParams {
            lsp_bits,
            lbr_pitch,
            forced_pitch_gain: false,
            pitch_gain_bits,
            subframe_gain_bits,
            pulse_tracks,
            pulses_per_track,
            lpc_enh_k1: 0.7,
            lpc_enh_k2: k2,
        })
    };
    vec![
        None,
        Some(SubmodeParams {
            lsp_bits: 3,
            lbr_pitch: Some(0),
            forced_pitch_gain: true,
            pitch_gain_bits: 0,
            subframe_gain_bits: 0,
            pulse_tracks: 2,
            pulses_per_track: 1,
            lpc_enh_k1: 0.7,
            lpc_enh_k2: 0.5,
        }),
        celp(3, Some(4), 3, 1, 4, 1, 0.5),
        celp(4, None, 4, 1, 5, 1, 0.55),
        celp(4, None, 4, 3, 5, 2, 0.6),
        celp(5, None, 5, 3, 5, 3, 0.65),
        celp(5, None, 5, 3, 5, 4, 0.65),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    fn layout() -> FrameLayout {
        FrameLayout {
            frame_size: 160,
            subframe_size: 40,
            nb_subframes: 4,
            order: 10,
            pitch_min: 17,
            pitch_max: 144,
        }
    }

    #[test]
    fn default_frame_sizes() {
        let bits: Vec<u32> = default_submodes()
            .into_iter()
            .flatten()
            .map(|p| CelpSubmode::new(p).bits_per_frame(&layout()))
            .collect();
        assert_eq!(bits, vec![99, 155, 178, 266, 360, 440]);
    }

    #[test]
    fn default_submodes_are_valid() {
        for params in default_submodes().into_iter().flatten() {
            params.validate(&layout()).unwrap();
        }
    }

    #[test]
    fn subframe_gain_tables() {
        assert_eq!(quantize_subframe_gain(1, 0.8), 0);
        assert_eq!(quantize_subframe_gain(1, 0.9), 1);
        assert_eq!(quantize_subframe_gain(3, 0.0), 0);
        assert_eq!(quantize_subframe_gain(3, 1.0), 5);
        assert_eq!(quantize_subframe_gain(3, 100.0), 7);
        assert_eq!(subframe_gain(0, 0), 1.0);
        assert_eq!(subframe_gain(3, 7), 2.106049);

        assert_eq!(quantize_frame_gain(0.3), 0);
        assert_eq!(quantize_frame_gain(1.0e6), 31);
        let idx = quantize_frame_gain(100.0);
        assert!((frame_gain(idx) / 100.0).ln().abs() <= 0.5 / 3.5 + 1e-4);
    }

    #[test]
    fn rejects_inconsistent_params() {
        let mut params = default_submodes()[3].clone().unwrap();
        params.pulse_tracks = 3;
        assert!(matches!(params.validate(&layout()), Err(Error::InvalidConfig(_))));

        let mut params = default_submodes()[3].clone().unwrap();
        params.forced_pitch_gain = true;
        assert!(params.validate(&layout()).is_err());
    }
}
