//! Linear prediction analysis.

use std::f32::consts::PI;

/// Asymmetric analysis window: a rising Hamming half over
/// `frame - subframe/2` samples followed by a falling half over the rest.
pub fn analysis_window(window_size: usize, frame_size: usize, subframe_size: usize) -> Vec<f32> {
    let part1 = (frame_size - subframe_size / 2).min(window_size);
    let part2 = window_size - part1;
    let mut w = Vec::with_capacity(window_size);
    w.extend((0..part1).map(|i| 0.54 - 0.46 * (PI * i as f32 / part1 as f32).cos()));
    w.extend((0..part2).map(|i| 0.54 + 0.46 * (PI * i as f32 / part2 as f32).cos()));
    w
}

/// Gaussian lag window applied to the autocorrelation.
pub fn lag_window(order: usize, lag_factor: f32) -> Vec<f32> {
    (0..=order)
        .map(|i| {
            let x = 2.0 * PI * lag_factor * i as f32;
            (-0.5 * x * x).exp()
        })
        .collect()
}

pub fn autocorr(x: &[f32], ac: &mut [f32]) {
    for (lag, r) in ac.iter_mut().enumerate() {
        *r = x.iter().zip(&x[lag.min(x.len())..]).map(|(a, b)| a * b).sum();
    }
}

/// Levinson-Durbin recursion. Fills `lpc[1..]` (with `lpc[0] = 1`) and the
/// reflection coefficients, returns the prediction error.
pub fn levinson(ac: &[f32], lpc: &mut [f32], rc: &mut [f32]) -> f32 {
    let p = lpc.len() - 1;
    debug_assert!(ac.len() > p && rc.len() >= p);
    lpc.fill(0.0);
    lpc[0] = 1.0;
    rc.fill(0.0);

    let mut error = ac[0];
    if ac[0] <= 0.0 {
        return 0.0;
    }

    for i in 0..p {
        let mut rr = -ac[i + 1];
        for j in 0..i {
            rr -= lpc[j + 1] * ac[i - j];
        }
        let r = rr / error;
        rc[i] = r;
        lpc[i + 1] = r;

        for j in 0..i / 2 {
            let tmp = lpc[j + 1];
            lpc[j + 1] += r * lpc[i - j];
            lpc[i - j] += r * tmp;
        }
        if i % 2 == 1 {
            let mid = i / 2 + 1;
            lpc[mid] += lpc[mid] * r;
        }

        error -= r * r * error;
        if error <= 0.0 {
            break;
        }
    }
    error
}
