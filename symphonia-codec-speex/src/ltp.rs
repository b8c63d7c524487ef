//! Long-term (pitch) prediction.

use crate::bits::{BitReader, BitWriter};
use crate::buffer::FrameBuffer;
use crate::errors::{Error, Result};
use crate::filters::{convolve, energy, inner_prod};

/// Largest quantized pitch gain.
pub const PITCH_GAIN_MAX: f32 = 1.2;

/// Number of open-loop candidates considered when picking the frame pitch.
pub const OL_PITCH_CANDIDATES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchCandidate {
    pub lag: usize,
    /// Normalized correlation, 0 for anti-correlated lags.
    pub gain: f32,
}

/// Lags searched for one subframe. `max < min` means no lag is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PitchRange {
    pub min: usize,
    pub max: usize,
    /// Width of the transmitted `lag - min` index.
    pub bits: u32,
}

impl PitchRange {
    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    /// Range for a subframe. `lbr_margin` restricts the search around the
    /// frame's open-loop pitch, `Some(0)` pins it.
    pub fn for_subframe(lbr_margin: Option<u32>, ol_pitch: usize, pitch_min: usize, pitch_max: usize) -> Self {
        match lbr_margin {
            None => Self {
                min: pitch_min,
                max: pitch_max,
                bits: index_bits(pitch_max - pitch_min + 1),
            },
            Some(0) => Self {
                min: ol_pitch,
                max: ol_pitch,
                bits: 0,
            },
            Some(margin) => {
                let margin = margin as usize;
                Self {
                    min: (ol_pitch + 1).saturating_sub(margin).max(pitch_min),
                    max: (ol_pitch + margin).min(pitch_max),
                    bits: index_bits(2 * margin),
                }
            }
        }
    }

    /// Same range with the upper bound capped, the transmitted index keeps
    /// its width.
    pub fn bounded(self, limit: usize) -> Self {
        Self {
            max: self.max.min(limit),
            ..self
        }
    }
}

/// Bits needed to index `count` values.
pub fn index_bits(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

/// The `n` lags in `[start, end]` whose delayed copy of `buf` best predicts
/// the `len` samples at frame position `offset`, best first. Only positively
/// correlated lags are ranked; ties go to the smaller lag.
pub fn open_loop_nbest(
    buf: &FrameBuffer,
    offset: usize,
    len: usize,
    start: usize,
    end: usize,
    n: usize,
) -> Vec<PitchCandidate> {
    let x = buf.subframe(offset, len);
    let e0 = energy(x);

    let mut best: Vec<(usize, f32, f32)> = Vec::with_capacity(n + 1);
    for lag in start..=end {
        let Some(y) = buf.lagged(offset, lag, len) else {
            break;
        };
        let corr = inner_prod(x, y);
        if corr <= 0.0 {
            continue;
        }
        let e = energy(y);
        let score = corr * corr / (e + 1.0);
        let gain = corr / (10.0 + (e0 * e).sqrt());
        let pos = best.iter().position(|c| score > c.1).unwrap_or(best.len());
        if pos < n {
            best.insert(pos, (lag, score, gain));
            best.truncate(n);
        }
    }

    best.into_iter()
        .map(|(lag, _, gain)| PitchCandidate { lag, gain: gain.max(0.0) })
        .collect()
}

/// Frame pitch from the ranked candidates: a sub-multiple of the best lag
/// is preferred when it predicts nearly as well.
pub fn pick_open_loop_pitch(candidates: &[PitchCandidate]) -> Option<PitchCandidate> {
    let mut best = *candidates.first()?;
    let reference = best;
    for c in &candidates[1..] {
        if c.gain <= 0.85 * reference.gain {
            continue;
        }
        let lag = c.lag as i64;
        let target = reference.lag as i64;
        let multiple = (2..=5).any(|k| (k * lag - target).abs() <= k);
        if multiple && c.lag < best.lag {
            best = *c;
        }
    }
    Some(best)
}

/// Adaptive codebook vector for `lag` at frame position `offset`: the past
/// excitation, repeated with period `lag` when the lag is shorter than the
/// subframe.
pub fn adaptive_vector(exc: &FrameBuffer, offset: usize, lag: usize, out: &mut [f32]) -> Result<()> {
    if lag == 0 {
        return Err(Error::CorruptedPayload("Zero pitch lag"));
    }
    let head = out.len().min(lag);
    let past = exc
        .lagged(offset, lag, head)
        .ok_or(Error::CorruptedPayload("Pitch lag reaches past the excitation history"))?;
    out[..head].copy_from_slice(past);
    for n in head..out.len() {
        out[n] = out[n - lag];
    }
    Ok(())
}

/// Quantized pitch gain of level `index`.
pub fn pitch_gain(index: u32, bits: u32) -> f32 {
    if bits == 0 {
        return 0.0;
    }
    PITCH_GAIN_MAX * index as f32 / ((1u32 << bits) - 1) as f32
}

/// Quantized forced pitch gain, `round(15 coef)` on 4 bits.
pub fn quantize_forced_gain(coef: f32) -> u32 {
    (15.0 * coef + 0.5).floor().clamp(0.0, 15.0) as u32
}

pub fn forced_gain(index: u32) -> f32 {
    index as f32 / 15.0
}

/// Outcome of a pitch search for one subframe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchChoice {
    pub lag: usize,
    pub gain: f32,
}

/// Everything the closed-loop pitch search reads.
pub struct LtpSearch<'a> {
    /// Weighted target, the pitch contribution's filtered response is
    /// subtracted from it.
    pub target: &'a mut [f32],
    /// Weighted signal used to preselect candidate lags.
    pub sw: &'a FrameBuffer,
    /// Past excitation.
    pub exc: &'a FrameBuffer,
    /// Impulse response of the weighted synthesis filter.
    pub impulse: &'a [f32],
    pub offset: usize,
    pub range: PitchRange,
    pub ol_pitch: usize,
    pub ol_pitch_gain: f32,
    pub complexity: u32,
}

/// Single-tap pitch predictor with a uniform gain quantizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SingleTapLtp {
    pub gain_bits: u32,
}

impl SingleTapLtp {
    /// Closed-loop search. Writes the lag index and gain index and leaves the
    /// unfiltered pitch contribution in `out`.
    pub fn quantize(&self, search: LtpSearch<'_>, out: &mut [f32], bits: &mut BitWriter) -> Result<PitchChoice> {
        let nsf = out.len();
        let range = search.range;
        out.fill(0.0);
        if range.is_empty() {
            bits.write(0, range.bits);
            bits.write(0, self.gain_bits);
            return Ok(PitchChoice { lag: range.min, gain: 0.0 });
        }

        let nbest = search.complexity.clamp(1, 10) as usize;
        let mut candidates: Vec<usize> =
            open_loop_nbest(search.sw, search.offset, nsf, range.min, range.max, nbest)
                .into_iter()
                .map(|c| c.lag)
                .collect();
        if candidates.is_empty() {
            candidates.push(range.min);
        }

        let levels = (1u32 << self.gain_bits) - 1;
        let step = PITCH_GAIN_MAX / levels as f32;
        let t_energy = energy(search.target);
        let mut v = vec![0.0f32; nsf];
        let mut y = vec![0.0f32; nsf];
        let mut filtered = vec![0.0f32; nsf];
        let mut best_err = f32::INFINITY;
        let mut lag = candidates[0];
        let mut idx = 0;
        for &cand in &candidates {
            adaptive_vector(search.exc, search.offset, cand, &mut v)?;
            convolve(&v, search.impulse, &mut y);
            let corr = inner_prod(search.target, &y);
            let en = energy(&y);
            let cand_idx = if corr <= 0.0 || en <= 0.0 {
                0
            } else {
                (corr / en / step + 0.5).floor().clamp(0.0, levels as f32) as u32
            };
            let g = pitch_gain(cand_idx, self.gain_bits);
            let err = t_energy - 2.0 * g * corr + g * g * en;
            if err < best_err {
                best_err = err;
                lag = cand;
                idx = cand_idx;
                filtered.copy_from_slice(&y);
            }
        }

        let gain = pitch_gain(idx, self.gain_bits);
        adaptive_vector(search.exc, search.offset, lag, &mut v)?;
        for (o, x) in out.iter_mut().zip(&v) {
            *o = gain * x;
        }
        for (t, f) in search.target.iter_mut().zip(&filtered) {
            *t -= gain * f;
        }

        bits.write((lag - range.min) as u32, range.bits);
        bits.write(idx, self.gain_bits);
        Ok(PitchChoice { lag, gain })
    }

    pub fn unquantize(
        &self,
        bits: &mut BitReader,
        range: PitchRange,
    ) -> Result<(usize, u32)> {
        let lag = range.min + bits.read(range.bits)? as usize;
        let idx = bits.read(self.gain_bits)?;
        if lag > range.max {
            return Err(Error::CorruptedPayload("Pitch lag outside of the range"));
        }
        Ok((lag, idx))
    }
}

/// Pitch contribution with lag and gain fixed by the frame header. The
/// range is ignored, there is nothing to search.
pub fn forced_pitch(search: LtpSearch<'_>, out: &mut [f32]) -> Result<PitchChoice> {
    let nsf = out.len();
    let lag = search.ol_pitch;
    let gain = search.ol_pitch_gain;
    let mut v = vec![0.0f32; nsf];
    adaptive_vector(search.exc, search.offset, lag, &mut v)?;
    let mut y = vec![0.0f32; nsf];
    convolve(&v, search.impulse, &mut y);
    for ((o, x), (t, f)) in out.iter_mut().zip(&v).zip(search.target.iter_mut().zip(&y)) {
        *o = gain * x;
        *t -= gain * f;
    }
    Ok(PitchChoice { lag, gain })
}

#[cfg(test)]
mod test {
    use super::*;

    fn periodic(period: usize, history: usize, frame: usize) -> FrameBuffer {
        let mut buf = FrameBuffer::new(history, frame);
        let (past, current) = buf.split_at_lag(0, history).unwrap();
        for (n, v) in past.iter_mut().chain(current.iter_mut()).enumerate() {
            *v = if n % period == 0 { 1000.0 } else { ((n % period) as f32).sin() * 50.0 };
        }
        buf
    }

    #[test]
    fn index_widths() {
        assert_eq!(index_bits(128), 7);
        assert_eq!(index_bits(8), 3);
        assert_eq!(index_bits(10), 4);
        assert_eq!(index_bits(1), 0);
    }

    #[test]
    fn subframe_ranges() {
        let full = PitchRange::for_subframe(None, 60, 17, 144);
        assert_eq!((full.min, full.max, full.bits), (17, 144, 7));
        let lbr = PitchRange::for_subframe(Some(4), 18, 17, 144);
        assert_eq!((lbr.min, lbr.max, lbr.bits), (17, 22, 3));
        let pinned = PitchRange::for_subframe(Some(0), 50, 17, 144);
        assert_eq!((pinned.min, pinned.max, pinned.bits), (50, 50, 0));
        assert!(full.bounded(10).is_empty());
    }

    #[test]
    fn open_loop_finds_period() {
        let buf = periodic(50, 146, 160);
        let best = open_loop_nbest(&buf, 0, 160, 17, 144, 6);
        assert_eq!(best[0].lag, 50);
        assert!(best[0].gain > 0.9);
        assert!(best.windows(2).all(|w| w[0].lag != w[1].lag));
    }

    #[test]
    fn search_stays_inside_history() {
        let buf = periodic(50, 146, 160);
        // The largest lag at offset 0 reads the oldest samples
        assert!(open_loop_nbest(&buf, 0, 40, 17, 146, 3).len() <= 3);
        assert!(buf.lagged(0, 147, 40).is_none());
    }

    #[test]
    fn prefers_sub_multiples() {
        let c = [
            PitchCandidate { lag: 100, gain: 0.9 },
            PitchCandidate { lag: 51, gain: 0.85 },
            PitchCandidate { lag: 73, gain: 0.89 },
        ];
        assert_eq!(pick_open_loop_pitch(&c).unwrap().lag, 51);
        let c = [PitchCandidate { lag: 100, gain: 0.9 }, PitchCandidate { lag: 50, gain: 0.5 }];
        assert_eq!(pick_open_loop_pitch(&c).unwrap().lag, 100);
    }

    #[test]
    fn short_lags_repeat() {
        let mut exc = FrameBuffer::new(10, 8);
        let hist: Vec<f32> = (0..10).map(|i| i as f32).collect();
        exc.split_at_lag(0, 10).unwrap().0.copy_from_slice(&hist);
        let mut out = [0.0f32; 8];
        adaptive_vector(&exc, 0, 3, &mut out).unwrap();
        assert_eq!(out, [7.0, 8.0, 9.0, 7.0, 8.0, 9.0, 7.0, 8.0]);
        assert!(adaptive_vector(&exc, 0, 11, &mut out).is_err());
    }

    #[test]
    fn gain_levels() {
        assert_eq!(pitch_gain(0, 3), 0.0);
        assert!((pitch_gain(7, 3) - PITCH_GAIN_MAX).abs() < 1e-6);
        assert_eq!(quantize_forced_gain(0.5), 8);
        assert_eq!(quantize_forced_gain(2.0), 15);
        assert!((forced_gain(15) - 1.0).abs() < 1e-6);
    }
}
