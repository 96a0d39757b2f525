//! Optional Savitzky-Golay smoothing (spec §4.C step 3).
//!
//! Coefficients are derived on the fly from a local polynomial least-squares
//! fit rather than looked up from a table, so any odd `window`/`order` pair
//! is supported.

/// Smooth `flux` in place with a Savitzky-Golay filter of the given
/// `window` (must be odd, >= 3) and polynomial `order` (< window). No-op
/// for invalid parameters. The first and last `window/2` samples are left
/// untouched (no one-sided filter is applied at the edges).
pub fn savgol_smooth(flux: &mut [f32], window: usize, order: usize) {
    if window < 3 || window % 2 == 0 || order >= window || flux.len() < window {
        return;
    }
    let coeffs = savgol_coefficients(window, order);
    let half = window / 2;
    let n = flux.len();
    let original = flux.to_vec();
    for i in half..n - half {
        let mut acc = 0.0f32;
        for (k, c) in coeffs.iter().enumerate() {
            acc += c * original[i - half + k];
        }
        flux[i] = acc;
    }
}

/// Coefficients `c` such that `smoothed[center] = sum_k c[k] * window[k]`,
/// the least-squares polynomial fit of `order` evaluated at its center.
fn savgol_coefficients(window: usize, order: usize) -> Vec<f32> {
    let half = window as isize / 2;
    let m = order + 1;

    let mut design = vec![vec![0.0f64; m]; window];
    for (i, row) in design.iter_mut().enumerate() {
        let x = (i as isize - half) as f64;
        let mut power = 1.0;
        for slot in row.iter_mut() {
            *slot = power;
            power *= x;
        }
    }

    let mut gram = vec![vec![0.0f64; m]; m];
    for (a, gram_row) in gram.iter_mut().enumerate() {
        for (b, slot) in gram_row.iter_mut().enumerate() {
            *slot = design.iter().map(|row| row[a] * row[b]).sum();
        }
    }
    let gram_inv = invert_matrix(&gram);

    (0..window)
        .map(|k| {
            let mut s = 0.0f64;
            for (j, coef) in gram_inv[0].iter().enumerate() {
                s += coef * design[k][j];
            }
            s as f32
        })
        .collect()
}

/// Gauss-Jordan inversion of a small square matrix with partial pivoting.
fn invert_matrix(mat: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = mat.len();
    let mut a: Vec<Vec<f64>> = mat.to_vec();
    let mut inv = vec![vec![0.0f64; n]; n];
    for (i, row) in inv.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        let mut best = a[col][col].abs();
        for (r, row) in a.iter().enumerate().skip(col + 1) {
            if row[col].abs() > best {
                best = row[col].abs();
                pivot_row = r;
            }
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        if pivot.abs() < 1e-15 {
            continue;
        }
        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[r][j] -= factor * a[col][j];
                inv[r][j] -= factor * inv[col][j];
            }
        }
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_signal_unchanged() {
        let mut flux = vec![5.0f32; 41];
        savgol_smooth(&mut flux, 9, 3);
        for v in &flux {
            assert!((v - 5.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_linear_ramp_preserved_by_interior() {
        let mut flux: Vec<f32> = (0..41).map(|i| i as f32 * 2.0).collect();
        let original = flux.clone();
        savgol_smooth(&mut flux, 9, 3);
        for i in 10..31 {
            assert!((flux[i] - original[i]).abs() < 1e-2, "index {}: {} vs {}", i, flux[i], original[i]);
        }
    }

    #[test]
    fn test_reduces_noise_amplitude() {
        let base: Vec<f32> = (0..101).map(|i| (i as f32 * 0.2).sin()).collect();
        let mut flux = base.clone();
        for (i, v) in flux.iter_mut().enumerate() {
            *v += if i % 2 == 0 { 0.3 } else { -0.3 };
        }
        savgol_smooth(&mut flux, 11, 3);
        let noisy_err: f32 = base
            .iter()
            .zip(&flux)
            .skip(10)
            .take(80)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(noisy_err < 40.0, "smoothed signal should track the base signal, err={}", noisy_err);
    }

    #[test]
    fn test_invalid_params_are_noop() {
        let mut flux = vec![1.0, 2.0, 3.0];
        let before = flux.clone();
        savgol_smooth(&mut flux, 4, 2); // even window
        assert_eq!(flux, before);
        savgol_smooth(&mut flux, 3, 3); // order >= window
        assert_eq!(flux, before);
    }
}
