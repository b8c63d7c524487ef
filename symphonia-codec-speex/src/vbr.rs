//! Variable bit-rate control.

use std::fmt::Debug;

const VBR_MEMORY_SIZE: usize = 5;
const MIN_ENERGY: f32 = 6000.0;
const NOISE_POW: f32 = 0.3;

/// Longest run of silence frames sent in DTX before a coded frame refreshes
/// the decoder.
pub const MAX_DTX_RUN: u32 = 20;
/// Largest spectral change (sum of absolute LSP differences) that still
/// allows a DTX silence frame.
pub const DTX_LSP_DIST: f32 = 0.05;

/// Signal statistics of the frame being encoded.
#[derive(Clone, Copy, Debug)]
pub struct FrameStats<'a> {
    /// Input frame, in the 16-bit sample range.
    pub frame: &'a [f32],
    pub ol_pitch: usize,
    /// Normalized correlation at the open-loop pitch.
    pub ol_pitch_coef: f32,
    /// Sum of absolute differences to the previous frame's LSPs.
    pub lsp_dist: f32,
}

/// Picks the submode of each frame when VBR is enabled.
pub trait RateController: Send + Debug {
    /// Submode for the frame described by `stats`. `thresholds` holds one row
    /// per submode of the active mode.
    fn select(&mut self, quality: f32, complexity: u32, stats: &FrameStats<'_>, thresholds: &[[f32; 11]]) -> usize;

    /// Quality estimate of the last analysed frame.
    fn relative_quality(&self) -> f32;

    fn reset(&mut self);
}

/// Energy, stationarity and voicing driven controller.
#[derive(Clone, Debug)]
pub struct SpeechVbr {
    energy_alpha: f32,
    average_energy: f32,
    last_energy: f32,
    last_log_energy: [f32; VBR_MEMORY_SIZE],
    noise_accum: f32,
    noise_accum_count: f32,
    noise_level: f32,
    consec_noise: u32,
    soft_pitch: f32,
    last_quality: f32,
    relative_quality: f32,
}

impl Default for SpeechVbr {
    fn default() -> Self {
        let noise_accum = 0.05 * MIN_ENERGY.powf(NOISE_POW);
        Self {
            energy_alpha: 0.1,
            average_energy: 0.0,
            last_energy: 1.0,
            last_log_energy: [MIN_ENERGY.ln(); VBR_MEMORY_SIZE],
            noise_accum,
            noise_accum_count: 0.05,
            noise_level: noise_accum / 0.05,
            consec_noise: 0,
            soft_pitch: 0.0,
            last_quality: 0.0,
            relative_quality: 0.0,
        }
    }
}

impl SpeechVbr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative quality the frame needs, roughly on the 0..=10 quality scale.
    pub fn analyse(&mut self, stats: &FrameStats<'_>) -> f32 {
        let sig = stats.frame;
        let half = sig.len() / 2;
        let ener1: f32 = sig[..half].iter().map(|x| x * x).sum();
        let ener2: f32 = sig[half..].iter().map(|x| x * x).sum();
        let ener = ener1 + ener2;
        let pitch_coef = stats.ol_pitch_coef;

        let log_energy = (ener + MIN_ENERGY).ln();
        let non_st = (self
            .last_log_energy
            .iter()
            .map(|l| (log_energy - l) * (log_energy - l))
            .sum::<f32>()
            / (30.0 * VBR_MEMORY_SIZE as f32))
            .min(1.0);

        let voicing = 3.0 * (pitch_coef - 0.4) * (pitch_coef - 0.4).abs();
        self.average_energy = (1.0 - self.energy_alpha) * self.average_energy + self.energy_alpha * ener;
        self.noise_level = self.noise_accum / self.noise_accum_count;
        let pow_ener = ener.powf(NOISE_POW);
        if self.noise_accum_count < 0.06 && ener > MIN_ENERGY {
            self.noise_accum = 0.05 * pow_ener;
        }

        let noisy = (voicing < 0.3 && non_st < 0.2 && pow_ener < 1.2 * self.noise_level)
            || (voicing < 0.3 && non_st < 0.05 && pow_ener < 1.5 * self.noise_level)
            || (voicing < 0.4 && non_st < 0.05 && pow_ener < 1.2 * self.noise_level)
            || (voicing < 0.0 && non_st < 0.05);
        if noisy {
            self.consec_noise += 1;
            let tmp = pow_ener.min(3.0 * self.noise_level);
            if self.consec_noise >= 4 {
                self.noise_accum = 0.95 * self.noise_accum + 0.05 * tmp;
                self.noise_accum_count = 0.95 * self.noise_accum_count + 0.05;
            }
        } else {
            self.consec_noise = 0;
        }

        if pow_ener < self.noise_level && ener > MIN_ENERGY {
            self.noise_accum = 0.95 * self.noise_accum + 0.05 * pow_ener;
            self.noise_accum_count = 0.95 * self.noise_accum_count + 0.05;
        }

        let mut qual = 7.0f32;
        if ener < 30000.0 {
            qual -= 0.7;
            if ener < 10000.0 {
                qual -= 0.7;
            }
            if ener < 3000.0 {
                qual -= 0.7;
            }
        } else {
            let short_diff = ((ener + 1.0) / (1.0 + self.last_energy)).ln();
            let long_diff = ((ener + 1.0) / (1.0 + self.average_energy)).ln().clamp(-5.0, 2.0);
            if long_diff > 0.0 {
                qual += 0.6 * long_diff;
            } else {
                qual += 0.5 * long_diff;
            }
            if short_diff > 0.0 {
                qual += 0.5 * short_diff.min(5.0);
            }
            if ener2 > 1.6 * ener1 {
                qual += 0.5;
            }
        }
        self.last_energy = ener;
        self.soft_pitch = 0.8 * self.soft_pitch + 0.2 * pitch_coef;
        qual += 2.2 * ((pitch_coef - 0.4) + (self.soft_pitch - 0.4));

        if qual < self.last_quality {
            qual = 0.5 * qual + 0.5 * self.last_quality;
        }
        qual = qual.clamp(4.0, 10.0);

        let noise_penalty = ((3.0 + self.consec_noise as f32).ln() - 3.0f32.ln()).max(0.0);
        if self.consec_noise >= 3 {
            qual = 4.0;
        }
        if self.consec_noise > 0 {
            qual -= noise_penalty;
        }
        qual = qual.max(0.0);

        if ener < 1_600_000.0 {
            if self.consec_noise > 2 {
                qual -= 0.5 * noise_penalty;
            }
            if ener < 10000.0 && self.consec_noise > 2 {
                qual -= 0.5 * noise_penalty;
            }
            qual = qual.max(0.0);
            qual += 0.3 * (0.0001 + ener / 1_600_000.0).ln();
        }
        qual = qual.max(-1.0);

        self.last_quality = qual;
        self.last_log_energy.rotate_right(1);
        self.last_log_energy[0] = log_energy;
        self.relative_quality = qual;
        qual
    }
}

/// Threshold of a submode row at a fractional VBR quality.
pub fn threshold(row: &[f32; 11], quality: f32) -> f32 {
    let quality = quality.clamp(0.0, 10.0);
    let v1 = quality.floor() as usize;
    if v1 >= 10 {
        row[10]
    } else {
        let frac = quality - v1 as f32;
        frac * row[v1 + 1] + (1.0 - frac) * row[v1]
    }
}

impl RateController for SpeechVbr {
    fn select(&mut self, quality: f32, _complexity: u32, stats: &FrameStats<'_>, thresholds: &[[f32; 11]]) -> usize {
        let relative = self.analyse(stats);
        (1..thresholds.len())
            .rev()
            .find(|id| relative > threshold(&thresholds[*id], quality))
            .unwrap_or(0)
    }

    fn relative_quality(&self) -> f32 {
        self.relative_quality
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Discontinuous transmission: turns runs of stationary silence-class
/// frames into silence frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dtx {
    count: u32,
}

impl Dtx {
    /// Final submode for a frame the controller mapped to `submode`.
    /// `lowest_coded` replaces silence whenever a coded frame is needed.
    pub fn apply(&mut self, submode: usize, enabled: bool, lsp_dist: f32, lowest_coded: usize) -> usize {
        if submode != 0 {
            self.count = 0;
            return submode;
        }
        if !enabled || self.count == 0 || lsp_dist > DTX_LSP_DIST || self.count > MAX_DTX_RUN {
            self.count = 1;
            lowest_coded
        } else {
            self.count += 1;
            0
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modes::NbModeParams;

    fn stats(frame: &[f32]) -> FrameStats<'_> {
        FrameStats {
            frame,
            ol_pitch: 40,
            ol_pitch_coef: 0.0,
            lsp_dist: 0.0,
        }
    }

    #[test]
    fn loud_voiced_speech_gets_more_bits() {
        let thresholds = NbModeParams::default().vbr_thresholds;
        let loud: Vec<f32> = (0..160).map(|n| (n as f32 * 0.3).sin() * 8000.0).collect();
        let quiet = vec![1.0f32; 160];

        let mut vbr = SpeechVbr::new();
        let voiced = FrameStats {
            ol_pitch_coef: 0.9,
            ..stats(&loud)
        };
        let mut loud_mode = 0;
        for _ in 0..5 {
            loud_mode = vbr.select(8.0, 2, &voiced, &thresholds);
        }

        let mut vbr = SpeechVbr::new();
        let mut quiet_mode = 0;
        for _ in 0..5 {
            quiet_mode = vbr.select(8.0, 2, &stats(&quiet), &thresholds);
        }
        assert!(loud_mode > quiet_mode, "{} vs {}", loud_mode, quiet_mode);
        assert!(vbr.relative_quality() < 4.0);
    }

    #[test]
    fn thresholds_interpolate() {
        let row = [10.0, 6.5, 5.2, 4.5, 3.9, 3.5, 3.0, 2.5, 2.3, 1.8, 1.0];
        assert_eq!(threshold(&row, 0.0), 10.0);
        assert!((threshold(&row, 0.5) - 8.25).abs() < 1e-6);
        assert_eq!(threshold(&row, 10.0), 1.0);
        assert_eq!(threshold(&row, 42.0), 1.0);
    }

    #[test]
    fn dtx_runs_are_bounded() {
        let mut dtx = Dtx::default();
        assert_eq!(dtx.apply(0, true, 0.0, 1), 1);
        let sent: Vec<usize> = (0..25).map(|_| dtx.apply(0, true, 0.0, 1)).collect();
        assert_eq!(sent.iter().filter(|id| **id == 1).count(), 1);
        assert_eq!(dtx.apply(0, true, 1.0, 1), 1);
        assert_eq!(dtx.apply(0, false, 0.0, 1), 1);
        assert_eq!(dtx.apply(0, false, 0.0, 1), 1);
        assert_eq!(dtx.apply(3, true, 0.0, 1), 3);
    }
}
