//! Filters shared by the encoder and the decoder.
//!
//! LPC polynomials are stored with the leading 1, `a[0] == 1.0`, so an order
//! `p` filter has `p + 1` coefficients and a memory of `p` samples. Memories
//! hold the transposed direct form II state and carry over between calls.

/// `A(z/gamma)`: scale coefficient `i` by `gamma^i`.
pub fn bw_lpc(gamma: f32, lpc_in: &[f32], lpc_out: &mut [f32]) {
    let mut tmp = 1.0f32;
    for (o, i) in lpc_out.iter_mut().zip(lpc_in) {
        *o = tmp * i;
        tmp *= gamma;
    }
}

/// Pole-zero filter `num(z)/den(z)`. `x` and `y` may not alias, use
/// [`filter_mem2_inplace`] for that.
pub fn filter_mem2(x: &[f32], num: &[f32], den: &[f32], y: &mut [f32], mem: &mut [f32]) {
    let ord = mem.len();
    for (xi, yo) in x.iter().zip(y.iter_mut()) {
        let xi = *xi;
        let yi = num[0] * xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] + num[j + 1] * xi - den[j + 1] * yi;
        }
        mem[ord - 1] = num[ord] * xi - den[ord] * yi;
        *yo = yi;
    }
}

pub fn filter_mem2_inplace(x: &mut [f32], num: &[f32], den: &[f32], mem: &mut [f32]) {
    let ord = mem.len();
    for v in x.iter_mut() {
        let xi = *v;
        let yi = num[0] * xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] + num[j + 1] * xi - den[j + 1] * yi;
        }
        mem[ord - 1] = num[ord] * xi - den[ord] * yi;
        *v = yi;
    }
}

/// All-pole synthesis filter `1/den(z)`.
pub fn iir_mem2(x: &[f32], den: &[f32], y: &mut [f32], mem: &mut [f32]) {
    let ord = mem.len();
    for (xi, yo) in x.iter().zip(y.iter_mut()) {
        let yi = xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] - den[j + 1] * yi;
        }
        mem[ord - 1] = -den[ord] * yi;
        *yo = yi;
    }
}

pub fn iir_mem2_inplace(x: &mut [f32], den: &[f32], mem: &mut [f32]) {
    let ord = mem.len();
    for v in x.iter_mut() {
        let yi = *v + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] - den[j + 1] * yi;
        }
        mem[ord - 1] = -den[ord] * yi;
        *v = yi;
    }
}

/// All-zero analysis filter `num(z)`.
pub fn fir_mem2(x: &[f32], num: &[f32], y: &mut [f32], mem: &mut [f32]) {
    let ord = mem.len();
    for (xi, yo) in x.iter().zip(y.iter_mut()) {
        let xi = *xi;
        let yi = num[0] * xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] + num[j + 1] * xi;
        }
        mem[ord - 1] = num[ord] * xi;
        *yo = yi;
    }
}

/// Zero-state response of the weighted synthesis filter
/// `A(z/g1) / (A(z) A(z/g2))`.
pub fn syn_percep_zero(x: &[f32], ak: &[f32], awk1: &[f32], awk2: &[f32], y: &mut [f32]) {
    let mut mem = vec![0.0f32; ak.len() - 1];
    filter_mem2(x, awk1, ak, y, &mut mem);
    mem.fill(0.0);
    iir_mem2_inplace(y, awk2, &mut mem);
}

/// Zero-state response of the inverse weighted filter
/// `A(z) A(z/g2) / A(z/g1)`.
pub fn residue_percep_zero(x: &[f32], ak: &[f32], awk1: &[f32], awk2: &[f32], y: &mut [f32]) {
    let mut mem = vec![0.0f32; ak.len() - 1];
    filter_mem2(x, ak, awk1, y, &mut mem);
    mem.fill(0.0);
    let tmp = y.to_vec();
    fir_mem2(&tmp, awk2, y, &mut mem);
}

/// Convolve `x` with the causal impulse response `h`, truncated to `y.len()`.
pub fn convolve(x: &[f32], h: &[f32], y: &mut [f32]) {
    for (n, yo) in y.iter_mut().enumerate() {
        *yo = (0..=n).map(|k| h[k] * x[n - k]).sum();
    }
}

/// Pre-emphasis `1 - a z^-1`, `mem` holds the last input sample.
pub fn preemphasis(x: &[f32], a: f32, y: &mut [f32], mem: &mut f32) {
    for (xi, yo) in x.iter().zip(y.iter_mut()) {
        *yo = xi - a * *mem;
        *mem = *xi;
    }
}

/// De-emphasis `1 / (1 - a z^-1)`, `mem` holds the last output sample.
pub fn deemphasis(x: &mut [f32], a: f32, mem: &mut f32) {
    for v in x.iter_mut() {
        *v += a * *mem;
        *mem = *v;
    }
}

/// Response of the analysis filter at half the sampling rate.
pub fn pi_gain(lpc: &[f32]) -> f32 {
    lpc.iter()
        .enumerate()
        .map(|(i, a)| if i % 2 == 0 { *a } else { -*a })
        .sum()
}

pub fn inner_prod(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

pub fn energy(x: &[f32]) -> f32 {
    inner_prod(x, x)
}
