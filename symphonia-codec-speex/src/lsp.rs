//! Line spectral pair conversions.
//!
//! LSPs are kept as angular frequencies in `(0, pi)`. Even-indexed LSPs are
//! the roots of the symmetric polynomial `P(z) = A(z) + z^-(p+1) A(1/z)`,
//! odd-indexed ones the roots of the antisymmetric `Q(z)`.

use std::f32::consts::PI;

/// Evaluate the Chebyshev series of a half-order polynomial at `x = cos(w)`.
fn cheb_poly_eva(coef: &[f32], x: f32) -> f32 {
    let m2 = coef.len() - 1;
    let mut sum = coef[m2];
    let (mut t0, mut t1) = (1.0f32, x);
    for i in 1..=m2 {
        if i > 1 {
            let t2 = 2.0 * x * t1 - t0;
            t0 = t1;
            t1 = t2;
        }
        sum += coef[m2 - i] * t1;
    }
    sum
}

/// Find the LSPs of `lpc` (order `p`, `lpc[0] == 1`) by scanning `cos(w)`
/// from 1 down to -1 with a step of roughly `delta` and refining each sign
/// change with `nb` bisections.
///
/// Returns the number of roots found, `lsp` is only meaningful when that
/// equals the order.
pub fn lpc_to_lsp(lpc: &[f32], lsp: &mut [f32], nb: usize, delta: f32) -> usize {
    let order = lpc.len() - 1;
    let m = order / 2;

    let mut p = vec![0.0f32; m + 1];
    let mut q = vec![0.0f32; m + 1];
    p[0] = 1.0;
    q[0] = 1.0;
    for i in 1..=m {
        p[i] = lpc[i] + lpc[order + 1 - i] - p[i - 1];
        q[i] = lpc[i] - lpc[order + 1 - i] + q[i - 1];
    }
    for i in 0..m {
        p[i] *= 2.0;
        q[i] *= 2.0;
    }

    let mut roots = 0;
    let mut xl = 1.0f32;
    let mut xr = 0.0f32;
    let mut xm = 0.0f32;
    for (j, out) in lsp.iter_mut().enumerate().take(order) {
        let poly = if j % 2 == 1 { &q } else { &p };
        let mut psuml = cheb_poly_eva(poly, xl);
        let mut found = false;
        while !found && xr >= -1.0 {
            let mut dd = delta * (1.0 - 0.9 * xl * xl);
            if psuml.abs() < 0.2 {
                dd *= 0.5;
            }
            xr = xl - dd;
            let psumr = cheb_poly_eva(poly, xr);
            if psumr * psuml < 0.0 {
                roots += 1;
                let mut lo = xl;
                let mut hi = xr;
                let mut plo = psuml;
                for _ in 0..=nb {
                    xm = 0.5 * (lo + hi);
                    let pm = cheb_poly_eva(poly, xm);
                    if pm * plo > 0.0 {
                        plo = pm;
                        lo = xm;
                    } else {
                        hi = xm;
                    }
                }
                *out = xm.clamp(-1.0, 1.0).acos();
                xl = xm;
                found = true;
            } else {
                psuml = psumr;
                xl = xr;
            }
        }
    }
    roots
}

/// Multiply `poly` in place by `1 - 2 cos(w) z^-1 + z^-2`, growing its
/// degree by two.
fn mul_section(poly: &mut Vec<f64>, w: f32) {
    let c = -2.0 * f64::from(w).cos();
    poly.extend_from_slice(&[0.0, 0.0]);
    for i in (0..poly.len()).rev() {
        let mut v = poly[i];
        if i >= 1 {
            v += c * poly[i - 1];
        }
        if i >= 2 {
            v += poly[i - 2];
        }
        poly[i] = v;
    }
}

/// Rebuild `A(z) = (P(z) + Q(z)) / 2` from the LSPs.
pub fn lsp_to_lpc(lsp: &[f32], lpc: &mut [f32]) {
    let order = lsp.len();
    let mut p = vec![1.0f64];
    let mut q = vec![1.0f64];
    for (i, w) in lsp.iter().enumerate() {
        if i % 2 == 0 {
            mul_section(&mut p, *w);
        } else {
            mul_section(&mut q, *w);
        }
    }
    lpc[0] = 1.0;
    for i in 1..=order {
        // P(z) (1 + z^-1) and Q(z) (1 - z^-1)
        let pi = p.get(i).copied().unwrap_or(0.0) + p.get(i - 1).copied().unwrap_or(0.0);
        let qi = q.get(i).copied().unwrap_or(0.0) - q.get(i - 1).copied().unwrap_or(0.0);
        lpc[i] = (0.5 * (pi + qi)) as f32;
    }
}

/// Linear interpolation for subframe `sub` of `nb_subframes`, reaching the
/// current frame's LSPs on the last subframe.
pub fn lsp_interpolate(old: &[f32], new: &[f32], interp: &mut [f32], sub: usize, nb_subframes: usize) {
    let tmp = (1.0 + sub as f32) / nb_subframes as f32;
    for ((o, a), b) in interp.iter_mut().zip(old).zip(new) {
        *o = (1.0 - tmp) * a + tmp * b;
    }
}

/// LPC of subframe `sub`: the interpolated LSPs, kept `margin` apart,
/// converted back to a filter.
pub fn subframe_lpc(old: &[f32], new: &[f32], sub: usize, nb_subframes: usize, margin: f32, lpc: &mut [f32]) {
    let mut interp = vec![0.0f32; new.len()];
    lsp_interpolate(old, new, &mut interp, sub, nb_subframes);
    lsp_enforce_margin(&mut interp, margin);
    lsp_to_lpc(&interp, lpc);
}

/// Push LSPs apart so that consecutive values, and the ends of `(0, pi)`,
/// are at least `margin` away from each other.
pub fn lsp_enforce_margin(lsp: &mut [f32], margin: f32) {
    let len = lsp.len();
    if len == 0 {
        return;
    }
    lsp[0] = lsp[0].max(margin);
    for i in 1..len {
        lsp[i] = lsp[i].max(lsp[i - 1] + margin);
    }
    lsp[len - 1] = lsp[len - 1].min(PI - margin);
    for i in (0..len - 1).rev() {
        lsp[i] = lsp[i].min(lsp[i + 1] - margin);
    }
}

/// Strictly increasing and inside `(0, pi)`, which is what a stable
/// synthesis filter needs.
pub fn lsp_is_ordered(lsp: &[f32]) -> bool {
    lsp.iter().all(|w| w.is_finite() && *w > 0.0 && *w < PI)
        && lsp.windows(2).all(|pair| pair[0] < pair[1])
}

/// Evenly spread LSPs, the spectrum of a flat filter.
pub fn flat_lsp(order: usize) -> Vec<f32> {
    (0..order)
        .map(|i| PI * (i + 1) as f32 / (order + 1) as f32)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn speech_like_lpc() -> Vec<f32> {
        // Five damped resonances at 8 kHz
        let mut a = vec![1.0f64];
        for (f, r) in [(500.0f64, 0.9f64), (1500.0, 0.85), (2500.0, 0.8), (3200.0, 0.75), (1000.0, 0.7)] {
            let w = 2.0 * std::f64::consts::PI * f / 8000.0;
            let sec = [1.0, -2.0 * r * w.cos(), r * r];
            let mut out = vec![0.0; a.len() + 2];
            for (i, ai) in a.iter().enumerate() {
                for (k, s) in sec.iter().enumerate() {
                    out[i + k] += ai * s;
                }
            }
            a = out;
        }
        a.into_iter().map(|v| v as f32).collect()
    }

    #[test]
    fn lpc_lsp_round_trip() {
        let lpc = speech_like_lpc();
        let mut lsp = [0.0f32; 10];
        let roots = lpc_to_lsp(&lpc, &mut lsp, 15, 0.2);
        assert_eq!(roots, 10);
        assert!(lsp_is_ordered(&lsp), "{:?}", lsp);

        let mut back = [0.0f32; 11];
        lsp_to_lpc(&lsp, &mut back);
        for (a, b) in lpc.iter().zip(&back) {
            assert!((a - b).abs() < 2e-3, "{:?} vs {:?}", lpc, back);
        }
    }

    #[test]
    fn flat_filter_has_flat_lsp() {
        let mut lpc = [0.0f32; 11];
        lsp_to_lpc(&flat_lsp(10), &mut lpc);
        assert!((lpc[0] - 1.0).abs() < 1e-6);
        assert!(lpc[1..].iter().all(|a| a.abs() < 1e-4), "{:?}", lpc);
    }

    #[test]
    fn margin_restores_order() {
        let mut lsp = [0.5, 0.4, 0.41, 1.0, 3.2];
        assert!(!lsp_is_ordered(&lsp));
        lsp_enforce_margin(&mut lsp, 0.002);
        assert!(lsp_is_ordered(&lsp), "{:?}", lsp);
    }

    #[test]
    fn interpolation_reaches_new_frame() {
        let old = [0.2, 0.4];
        let new = [0.6, 0.8];
        let mut out = [0.0; 2];
        lsp_interpolate(&old, &new, &mut out, 3, 4);
        assert_eq!(out, new);
        lsp_interpolate(&old, &new, &mut out, 1, 4);
        assert!((out[0] - 0.4).abs() < 1e-6);
    }
}
