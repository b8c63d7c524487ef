//! Differential LSP quantizer.
//!
//! Each LSP is sent as the gap to the previous quantized LSP (the first one
//! as its distance from 0), on a uniform grid of `2^bits` gap levels between
//! [`LSP_GAP_MIN`] and [`LSP_GAP_MAX`]. Quantizing against the previously
//! quantized value keeps the error from accumulating along the vector.

use std::f32::consts::PI;

use crate::bits::{BitReader, BitWriter};
use crate::errors::{Error, Result};
use crate::lsp::lsp_is_ordered;

pub const LSP_GAP_MIN: f32 = 0.02;
pub const LSP_GAP_MAX: f32 = 0.72;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LspQuantizer {
    bits: u32,
}

impl LspQuantizer {
    pub fn new(bits: u32) -> Self {
        Self { bits }
    }

    fn levels(&self) -> u32 {
        1 << self.bits
    }

    fn gap(&self, index: u32) -> f32 {
        let step = (LSP_GAP_MAX - LSP_GAP_MIN) / (self.levels() - 1) as f32;
        LSP_GAP_MIN + index as f32 * step
    }

    fn index_of(&self, gap: f32) -> u32 {
        let step = (LSP_GAP_MAX - LSP_GAP_MIN) / (self.levels() - 1) as f32;
        let idx = ((gap - LSP_GAP_MIN) / step + 0.5).floor();
        idx.clamp(0.0, (self.levels() - 1) as f32) as u32
    }

    /// Quantize `lsp` into `qlsp` and write one index per coefficient. The
    /// chosen gaps always leave room for the remaining coefficients below pi.
    pub fn quantize(&self, lsp: &[f32], qlsp: &mut [f32], bits: &mut BitWriter) -> Result<()> {
        let order = lsp.len();
        let mut prev = 0.0f32;
        for i in 0..order {
            let headroom = PI - (order - i) as f32 * LSP_GAP_MIN;
            let mut idx = self.index_of(lsp[i] - prev);
            while idx > 0 && prev + self.gap(idx) >= headroom {
                idx -= 1;
            }
            let q = prev + self.gap(idx);
            if q >= PI {
                return Err(Error::UnstableSpectrum);
            }
            qlsp[i] = q;
            prev = q;
            bits.write(idx, self.bits);
        }
        Ok(())
    }

    pub fn unquantize(&self, qlsp: &mut [f32], bits: &mut BitReader) -> Result<()> {
        let mut prev = 0.0f32;
        for q in qlsp.iter_mut() {
            let idx = bits.read(self.bits)?;
            prev += self.gap(idx);
            *q = prev;
        }
        if !lsp_is_ordered(qlsp) {
            return Err(Error::CorruptedPayload("LSP indices leave (0, pi)"));
        }
        Ok(())
    }
}
