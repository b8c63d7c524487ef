#![allow(dead_code)]

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use symphonia_codec_speex::{BitReader, BitWriter, DecodeStatus, NbDecoder, NbEncoder};

pub const FRAME: usize = 160;

/// Sum of the first harmonics of a `period` samples long fundamental, with
/// decreasing amplitudes.
pub fn harmonic(period: usize, len: usize) -> Vec<f32> {
    let f0 = 1.0 / period as f32;
    (0..len)
        .map(|n| {
            (1..=6)
                .map(|k| (2.0 * PI * f0 * k as f32 * n as f32).sin() * 4000.0 / k as f32)
                .sum()
        })
        .collect()
}

pub fn noise(seed: u64, len: usize, amplitude: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

pub fn energy(x: &[f32]) -> f32 {
    x.iter().map(|v| v * v).sum()
}

pub fn rms(x: &[f32]) -> f32 {
    (energy(x) / x.len() as f32).sqrt()
}

/// Encode `signal` with one packet per frame, returning the packets and the
/// encoder's reconstruction of every frame.
pub fn encode(enc: &mut NbEncoder, signal: &[f32]) -> (Vec<Vec<u8>>, Vec<Vec<f32>>) {
    let mut packets = Vec::new();
    let mut recon = Vec::new();
    for frame in signal.chunks_exact(enc.frame_size()) {
        let mut bits = BitWriter::new();
        enc.encode(frame, &mut bits).unwrap();
        bits.insert_terminator();
        packets.push(bits.into_bytes());
        recon.push(enc.reconstruction().to_vec());
    }
    (packets, recon)
}

/// Decode one frame per packet, concealing the packets listed in `lost`.
pub fn decode(dec: &mut NbDecoder, packets: &[Vec<u8>], lost: &[usize]) -> Vec<Vec<f32>> {
    let mut frames = Vec::new();
    for (i, packet) in packets.iter().enumerate() {
        let mut out = vec![0.0f32; dec.frame_size()];
        if lost.contains(&i) {
            assert_eq!(dec.decode(None, &mut out).unwrap(), DecodeStatus::Concealed);
        } else {
            let mut bits = BitReader::new(packet);
            assert_eq!(dec.decode(Some(&mut bits), &mut out).unwrap(), DecodeStatus::Decoded);
        }
        frames.push(out);
    }
    frames
}
