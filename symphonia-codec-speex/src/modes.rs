//! Mode configuration: frame geometry, analysis constants and submode table.

use std::f32::consts::PI;
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::lpc::{analysis_window, lag_window};
use crate::submodes::{default_submodes, CelpSubmode, Submode, SubmodeParams};

/// VBR thresholds of the default narrowband submodes, one row per submode,
/// one column per integer VBR quality.
const NB_VBR_THRESHOLDS: [[f32; 11]; 7] = [
    [-1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0],
    [4.0, 2.5, 2.0, 1.2, 0.5, 0.0, -0.5, -0.7, -0.8, -0.9, -1.0],
    [10.0, 6.5, 5.2, 4.5, 3.9, 3.5, 3.0, 2.5, 2.3, 1.8, 1.0],
    [11.0, 8.8, 7.5, 6.5, 5.0, 3.9, 3.9, 3.9, 3.5, 3.0, 1.0],
    [11.0, 11.0, 9.9, 8.5, 7.0, 6.0, 4.5, 4.0, 4.0, 4.0, 2.0],
    [11.0, 11.0, 11.0, 11.0, 9.5, 8.5, 8.0, 7.0, 6.0, 5.0, 3.0],
    [11.0, 11.0, 11.0, 11.0, 11.0, 11.0, 9.5, 8.5, 7.0, 6.0, 5.0],
];

/// Frame geometry shared by the pipelines and the submodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub frame_size: usize,
    pub subframe_size: usize,
    pub nb_subframes: usize,
    pub order: usize,
    pub pitch_min: usize,
    pub pitch_max: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NbModeParams {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub subframe_size: usize,
    pub lpc_order: usize,
    pub window_size: usize,
    pub pitch_min: usize,
    pub pitch_max: usize,
    pub gamma1: f32,
    pub gamma2: f32,
    pub lag_factor: f32,
    pub lpc_floor: f32,
    pub preemph: f32,
    pub lsp_margin: f32,
    /// Per-frame attenuation of concealed frames.
    pub plc_decay: f32,
    pub default_submode: usize,
    /// Submode of each quality level 0..=10.
    pub quality_map: Vec<usize>,
    pub vbr_thresholds: Vec<[f32; 11]>,
    /// `None` entries are silence submodes.
    pub submodes: Vec<Option<SubmodeParams>>,
}

impl Default for NbModeParams {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            frame_size: 160,
            subframe_size: 40,
            lpc_order: 10,
            window_size: 240,
            pitch_min: 17,
            pitch_max: 144,
            gamma1: 0.9,
            gamma2: 0.6,
            lag_factor: 0.012,
            lpc_floor: 1.0001,
            preemph: 0.0,
            lsp_margin: 0.002,
            plc_decay: 0.8,
            default_submode: 3,
            quality_map: vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6],
            vbr_thresholds: NB_VBR_THRESHOLDS.to_vec(),
            submodes: default_submodes(),
        }
    }
}

impl NbModeParams {
    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            frame_size: self.frame_size,
            subframe_size: self.subframe_size,
            nb_subframes: if self.subframe_size == 0 { 0 } else { self.frame_size / self.subframe_size },
            order: self.lpc_order,
            pitch_min: self.pitch_min,
            pitch_max: self.pitch_max,
        }
    }

    /// Geometry and filter constants, checked before anything is derived
    /// from them.
    pub fn validate(&self) -> Result<()> {
        let p = self;
        let fail = |what: &str| -> Result<()> { Err(Error::InvalidConfig(what.to_string())) };
        if p.sample_rate == 0 {
            return fail("sample rate must be positive");
        }
        if p.frame_size == 0 || p.subframe_size == 0 || p.subframe_size > p.frame_size {
            return fail("frame and subframe sizes must be positive, subframes no longer than a frame");
        }
        if p.frame_size % p.subframe_size != 0 {
            return fail("frame size must be a multiple of the subframe size");
        }
        if p.lpc_order < 2 || p.lpc_order % 2 != 0 {
            return fail("LPC order must be even and at least 2");
        }
        if p.window_size < p.frame_size {
            return fail("analysis window shorter than a frame");
        }
        if p.pitch_min == 0 || p.pitch_max < p.pitch_min {
            return fail("empty pitch range");
        }
        if !(0.0..1.0).contains(&p.gamma1) || !(0.0..1.0).contains(&p.gamma2) {
            return fail("weighting factors must lie in [0, 1)");
        }
        if !(0.0..1.0).contains(&p.preemph) {
            return fail("pre-emphasis must lie in [0, 1)");
        }
        if p.lsp_margin <= 0.0 || p.lsp_margin * (p.lpc_order + 1) as f32 >= PI {
            return fail("LSP margin does not fit the order");
        }
        if !(p.plc_decay > 0.0 && p.plc_decay <= 1.0) {
            return fail("concealment decay must lie in (0, 1]");
        }
        if p.lpc_floor < 1.0 {
            return fail("LPC noise floor must be at least 1");
        }
        Ok(())
    }
}

/// A validated, immutable mode. Encoders and decoders share it through an
/// `Arc`.
#[derive(Debug)]
pub struct NbMode {
    params: NbModeParams,
    layout: FrameLayout,
    submodes: Vec<Option<Arc<dyn Submode>>>,
    window: Vec<f32>,
    lag_window: Vec<f32>,
}

impl NbMode {
    fn build(params: NbModeParams, submodes: Vec<Option<Arc<dyn Submode>>>) -> Self {
        let layout = params.layout();
        let window = analysis_window(params.window_size, params.frame_size, params.subframe_size);
        let lag_window = lag_window(params.lpc_order, params.lag_factor);
        Self {
            params,
            layout,
            submodes,
            window,
            lag_window,
        }
    }

    fn celp_submodes(params: &NbModeParams) -> Vec<Option<Arc<dyn Submode>>> {
        params
            .submodes
            .iter()
            .map(|s| s.clone().map(|p| Arc::new(CelpSubmode::new(p)) as Arc<dyn Submode>))
            .collect()
    }

    /// The built-in 8 kHz mode: 20 ms frames of four subframes, order 10,
    /// pitch in [17, 144].
    pub fn narrowband() -> Arc<Self> {
        let params = NbModeParams::default();
        let submodes = Self::celp_submodes(&params);
        Arc::new(Self::build(params, submodes))
    }

    pub fn new(params: NbModeParams) -> Result<Arc<Self>> {
        params.validate()?;
        for s in params.submodes.iter().flatten() {
            s.validate(&params.layout())?;
        }
        let submodes = Self::celp_submodes(&params);
        Self::with_submodes(params, submodes)
    }

    /// A mode whose submodes are provided by the caller. The `submodes`
    /// entries of `params` are ignored, the table replaces them.
    pub fn with_submodes(params: NbModeParams, submodes: Vec<Option<Arc<dyn Submode>>>) -> Result<Arc<Self>> {
        params.validate()?;
        let mode = Self::build(params, submodes);
        mode.validate()?;
        Ok(Arc::new(mode))
    }

    pub fn from_yaml<R: Read>(reader: R) -> Result<Arc<Self>> {
        let params: NbModeParams = serde_yaml::from_reader(reader)?;
        Self::new(params)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        let fail = |what: &str| -> Result<()> { Err(Error::InvalidConfig(what.to_string())) };
        p.validate()?;

        let coded = |id: usize| matches!(self.submodes.get(id), Some(Some(_)));
        if self.submodes.len() > 13 {
            return fail("at most 13 submodes fit the frame header");
        }
        if !self.submodes.iter().any(|s| s.is_some()) {
            return fail("no coded submode");
        }
        if !coded(p.default_submode) {
            return fail("default submode is not a coded submode");
        }
        if p.quality_map.len() != 11 || !p.quality_map.iter().all(|id| coded(*id)) {
            return fail("quality map needs 11 coded submodes");
        }
        if p.vbr_thresholds.len() != self.submodes.len() {
            return fail("one VBR threshold row per submode");
        }
        Ok(())
    }

    pub fn params(&self) -> &NbModeParams {
        &self.params
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn frame_size(&self) -> usize {
        self.layout.frame_size
    }

    pub fn nb_submodes(&self) -> usize {
        self.submodes.len()
    }

    /// `Ok(None)` for a silence submode.
    pub fn submode(&self, id: usize) -> Result<Option<&Arc<dyn Submode>>> {
        match self.submodes.get(id) {
            Some(s) => Ok(s.as_ref()),
            None => Err(Error::UnknownSubmode(id)),
        }
    }

    pub fn bits_per_frame(&self, id: usize) -> Result<u32> {
        Ok(match self.submode(id)? {
            Some(s) => s.bits_per_frame(&self.layout),
            None => crate::consts::FRAME_HEADER_BITS as u32,
        })
    }

    /// Bit-rate in bits per second of a stream coded with submode `id`.
    pub fn bitrate(&self, id: usize) -> Result<u32> {
        let bits = self.bits_per_frame(id)? as u64;
        Ok((bits * self.params.sample_rate as u64 / self.layout.frame_size as u64) as u32)
    }

    /// Input samples the analysis window reaches before the current frame.
    pub fn lookahead(&self) -> usize {
        self.params.window_size - self.params.frame_size
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn lag_window(&self) -> &[f32] {
        &self.lag_window
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn narrowband_is_valid() {
        let mode = NbMode::narrowband();
        mode.validate().unwrap();
        assert_eq!(mode.layout().nb_subframes, 4);
        assert_eq!(mode.nb_submodes(), 7);
        assert!(mode.submode(0).unwrap().is_none());
        assert!(matches!(mode.submode(7), Err(Error::UnknownSubmode(7))));
        assert_eq!(mode.bitrate(3).unwrap(), 8900);
        assert_eq!(mode.bitrate(0).unwrap(), 250);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = "frameSize: 160\nsubframeSize: 20\nplcDecay: 0.5\n";
        let mode = NbMode::from_yaml(yaml.as_bytes()).unwrap();
        assert_eq!(mode.layout().nb_subframes, 8);
        assert_eq!(mode.params().plc_decay, 0.5);
        assert_eq!(mode.params().pitch_max, 144);
    }

    #[test]
    fn rejects_inconsistent_geometry() {
        let params = NbModeParams {
            subframe_size: 30,
            ..Default::default()
        };
        assert!(matches!(NbMode::new(params), Err(Error::InvalidConfig(_))));

        let params = NbModeParams {
            quality_map: vec![0; 11],
            ..Default::default()
        };
        assert!(NbMode::new(params).is_err());

        assert!(matches!(NbMode::from_yaml("frameSize: [1]".as_bytes()), Err(Error::Config(_))));
    }

    #[test]
    fn malformed_geometry_is_rejected() {
        for yaml in ["frameSize: 0\n", "subframeSize: 0\n", "frameSize: 10\nsubframeSize: 40\n"] {
            assert!(
                matches!(NbMode::from_yaml(yaml.as_bytes()), Err(Error::InvalidConfig(_))),
                "{:?}",
                yaml
            );
        }

        let short_frame = || NbModeParams {
            frame_size: 10,
            subframe_size: 40,
            ..Default::default()
        };
        assert!(matches!(NbMode::new(short_frame()), Err(Error::InvalidConfig(_))));
        assert!(matches!(NbMode::with_submodes(short_frame(), vec![None]), Err(Error::InvalidConfig(_))));

        let inverted_pitch = NbModeParams {
            pitch_min: 144,
            pitch_max: 17,
            ..Default::default()
        };
        assert!(matches!(NbMode::new(inverted_pitch), Err(Error::InvalidConfig(_))));
    }
}
