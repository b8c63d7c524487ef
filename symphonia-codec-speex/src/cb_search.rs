//! Signed-pulse innovation codebook.
//!
//! A subframe is split into interleaved tracks, track `t` owning positions
//! `t, t + tracks, t + 2 tracks, ...`. Every track carries the same number of
//! unit pulses, each sent as a position index and a sign bit.

use crate::bits::{BitReader, BitWriter};
use crate::errors::{Error, Result};
use crate::ltp::index_bits;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseCodebook {
    pub tracks: usize,
    pub pulses_per_track: usize,
}

#[derive(Clone, Copy, Debug)]
struct Pulse {
    track: usize,
    pos: usize,
}

impl PulseCodebook {
    pub fn new(tracks: usize, pulses_per_track: usize) -> Self {
        Self { tracks, pulses_per_track }
    }

    pub fn pulses(&self) -> usize {
        self.tracks * self.pulses_per_track
    }

    fn positions(&self, nsf: usize) -> usize {
        nsf / self.tracks
    }

    pub fn bits_per_pulse(&self, nsf: usize) -> u32 {
        index_bits(self.positions(nsf)) + 1
    }

    pub fn bits(&self, nsf: usize) -> u32 {
        self.pulses() as u32 * self.bits_per_pulse(nsf)
    }

    /// Amplitude of a pulse, giving the codevector unit power when no two
    /// pulses share a position.
    pub fn amplitude(&self, nsf: usize) -> f32 {
        (nsf as f32 / self.pulses() as f32).sqrt()
    }

    /// Search the codevector whose filtered version best matches `target`.
    /// `impulse` is the impulse response of the weighted synthesis filter.
    /// The codevector is added to `innov`.
    pub fn quantize(
        &self,
        target: &[f32],
        impulse: &[f32],
        complexity: u32,
        innov: &mut [f32],
        bits: &mut BitWriter,
    ) {
        let nsf = target.len();
        let positions = self.positions(nsf);

        // Backward filtered target
        let d: Vec<f32> = (0..nsf)
            .map(|n| (n..nsf).map(|k| target[k] * impulse[k - n]).sum())
            .collect();
        let sign: Vec<f32> = d.iter().map(|v| if *v < 0.0 { -1.0 } else { 1.0 }).collect();
        let dabs: Vec<f32> = d.iter().map(|v| v.abs()).collect();

        // Signed correlation of the filtered unit pulses
        let mut phi = vec![0.0f32; nsf * nsf];
        for i in 0..nsf {
            for j in i..nsf {
                let c: f32 = (j..nsf).map(|k| impulse[k - i] * impulse[k - j]).sum();
                let c = c * sign[i] * sign[j];
                phi[i * nsf + j] = c;
                phi[j * nsf + i] = c;
            }
        }

        let mut pulses: Vec<Pulse> = Vec::with_capacity(self.pulses());
        // rr[n] = sum over chosen pulses m of phi(n, m)
        let mut rr = vec![0.0f32; nsf];
        let mut corr = 0.0f32;
        let mut en = 0.0f32;

        let best_in_track = |track: usize, corr: f32, en: f32, rr: &[f32]| -> usize {
            let mut best_pos = 0;
            let mut best_score = f32::NEG_INFINITY;
            for p in 0..positions {
                let n = track + p * self.tracks;
                let c = corr + dabs[n];
                let e = en + phi[n * nsf + n] + 2.0 * rr[n];
                let score = c * c / (e + 1e-6);
                if score > best_score {
                    best_score = score;
                    best_pos = p;
                }
            }
            best_pos
        };

        for _ in 0..self.pulses_per_track {
            for track in 0..self.tracks {
                let pos = best_in_track(track, corr, en, &rr);
                let n = track + pos * self.tracks;
                corr += dabs[n];
                en += phi[n * nsf + n] + 2.0 * rr[n];
                for (m, r) in rr.iter_mut().enumerate() {
                    *r += phi[m * nsf + n];
                }
                pulses.push(Pulse { track, pos });
            }
        }

        for _ in 0..complexity / 4 {
            for i in 0..pulses.len() {
                let Pulse { track, pos } = pulses[i];
                let n = track + pos * self.tracks;
                for (m, r) in rr.iter_mut().enumerate() {
                    *r -= phi[m * nsf + n];
                }
                corr -= dabs[n];
                en -= phi[n * nsf + n] + 2.0 * rr[n];

                let pos = best_in_track(track, corr, en, &rr);
                let n = track + pos * self.tracks;
                corr += dabs[n];
                en += phi[n * nsf + n] + 2.0 * rr[n];
                for (m, r) in rr.iter_mut().enumerate() {
                    *r += phi[m * nsf + n];
                }
                pulses[i].pos = pos;
            }
        }

        let pos_bits = index_bits(positions);
        let amp = self.amplitude(nsf);
        for p in &pulses {
            let n = p.track + p.pos * self.tracks;
            let negative = sign[n] < 0.0;
            bits.write(p.pos as u32, pos_bits);
            bits.write(negative as u32, 1);
            innov[n] += if negative { -amp } else { amp };
        }
    }

    /// Read a codevector and add it to `innov`.
    pub fn unquantize(&self, innov: &mut [f32], bits: &mut BitReader) -> Result<()> {
        let (pulses, amp) = self.read(innov.len(), bits)?;
        for (n, negative) in pulses {
            innov[n] += if negative { -amp } else { amp };
        }
        Ok(())
    }

    /// Parse the pulses of one subframe as (position, negative).
    pub fn read(&self, nsf: usize, bits: &mut BitReader) -> Result<(Vec<(usize, bool)>, f32)> {
        let positions = self.positions(nsf);
        let pos_bits = index_bits(positions);
        let mut pulses = Vec::with_capacity(self.pulses());
        for _ in 0..self.pulses_per_track {
            for track in 0..self.tracks {
                let pos = bits.read(pos_bits)? as usize;
                let negative = bits.read(1)? == 1;
                if pos >= positions {
                    return Err(Error::CorruptedPayload("Pulse position outside of its track"));
                }
                pulses.push((track + pos * self.tracks, negative));
            }
        }
        Ok((pulses, self.amplitude(nsf)))
    }
}
