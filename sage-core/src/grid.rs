//! The shared log-wavelength grid and FFT/windowing primitives (spec §4.A).
//!
//! Every processed spectrum and every template lives on one grid `G`: `n`
//! points, uniformly spaced in `ln(lambda)`. A shift of `k` grid points
//! corresponds to the multiplicative redshift factor `exp(k * dln_wave)`,
//! i.e. `1 + z = exp(k * dln_wave)`.

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// The shared log-wavelength grid `G`.
///
/// # Example
/// ```
/// use sage_core::grid::Grid;
///
/// let g = Grid::default_grid();
/// assert_eq!(g.log_wavelength_at(0), g.log_wave0);
/// assert!((g.wavelength_at(0) - g.log_wave0.exp()).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    /// Number of grid points. Must be a power of two.
    pub n: usize,
    /// `ln(lambda)` at index 0.
    pub log_wave0: f64,
    /// Spacing in `ln(lambda)` between consecutive grid points.
    pub dln_wave: f64,
}

impl Grid {
    /// Create a grid with the given size and spacing.
    pub fn new(n: usize, log_wave0: f64, dln_wave: f64) -> Self {
        Self { n, log_wave0, dln_wave }
    }

    /// The library's default grid (spec §3 constants).
    pub fn default_grid() -> Self {
        Self::new(
            crate::constants::DEFAULT_GRID_N,
            crate::constants::DEFAULT_LOG_WAVE0,
            crate::constants::DEFAULT_DLN_WAVE,
        )
    }

    /// `ln(lambda)` at grid index `i`.
    #[inline]
    pub fn log_wavelength_at(&self, i: usize) -> f64 {
        self.log_wave0 + i as f64 * self.dln_wave
    }

    /// Wavelength in Angstrom at grid index `i`.
    #[inline]
    pub fn wavelength_at(&self, i: usize) -> f64 {
        self.log_wavelength_at(i).exp()
    }

    /// The grid index (fractional) whose wavelength is closest to `wave`.
    pub fn index_for_wavelength(&self, wave: f64) -> f64 {
        (wave.ln() - self.log_wave0) / self.dln_wave
    }

    /// Redshift implied by a shift of `k` grid points: `1 + z = exp(k * dln_wave)`.
    #[inline]
    pub fn redshift_for_lag(&self, k: f64) -> f64 {
        (k * self.dln_wave).exp() - 1.0
    }

    /// Inverse of [`Grid::redshift_for_lag`]: the (fractional) lag in grid
    /// points that would produce redshift `z`.
    #[inline]
    pub fn lag_for_redshift(&self, z: f64) -> f64 {
        (1.0 + z).ln() / self.dln_wave
    }

    /// The FFT length used internally: the next power of two at or above
    /// `2*n`, to avoid circular wrap in the cross-correlation (spec §4.A).
    pub fn padded_len(&self) -> usize {
        next_pow_two(2 * self.n)
    }
}

fn next_pow_two(mut x: usize) -> usize {
    if x <= 1 {
        return 1;
    }
    x -= 1;
    let mut p = 1usize;
    while p <= x {
        p <<= 1;
    }
    p
}

/// Multiply the outermost `percent`% of `[left, right]` on each side by a
/// half-cosine taper rising from 0 at the edge to 1 at the interior boundary
/// of the tapered region. Samples outside `[left, right]` are untouched.
pub fn taper(flux: &mut [f32], left: usize, right: usize, percent: f32) {
    if right < left || right >= flux.len() || percent <= 0.0 {
        return;
    }
    let region_len = right - left + 1;
    let taper_len = ((region_len as f32 * percent / 100.0).round() as usize)
        .clamp(1, region_len.div_ceil(2));

    for j in 0..taper_len {
        let w = 0.5 * (1.0 - (std::f32::consts::PI * j as f32 / taper_len as f32).cos());
        flux[left + j] *= w;
        flux[right - j] *= w;
    }
}

/// L2 norm of `flux` over the half-open-at-construction, closed index range
/// `[left, right]`.
pub fn l2_norm(flux: &[f32], left: usize, right: usize) -> f32 {
    if right < left || left >= flux.len() {
        return 0.0;
    }
    let right = right.min(flux.len() - 1);
    flux[left..=right]
        .iter()
        .map(|v| v * v)
        .sum::<f32>()
        .sqrt()
}

/// A cached real-to-complex FFT pair for a fixed padded length.
///
/// Built once per worker thread and reused across every template that
/// worker scores (spec §5 memory model: "O(N) per live FFT buffer per
/// worker, reusable scratch").
pub struct FftEngine {
    len: usize,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

impl FftEngine {
    /// Build an engine for complex FFTs of length `padded_len`.
    pub fn new(padded_len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(padded_len);
        let inv = planner.plan_fft_inverse(padded_len);
        Self { len: padded_len, fwd, inv }
    }

    /// The padded length this engine was built for.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Forward FFT of a real signal, zero-padded to `self.len()`.
    pub fn forward(&self, real: &[f32]) -> Vec<Complex32> {
        let mut buf = vec![Complex32::new(0.0, 0.0); self.len];
        for (slot, &v) in buf.iter_mut().zip(real.iter()) {
            *slot = Complex32::new(v, 0.0);
        }
        self.fwd.process(&mut buf);
        buf
    }

    /// Inverse FFT, returning only the real part, normalized by `1/len`.
    pub fn inverse(&self, spectrum: &[Complex32]) -> Vec<f32> {
        let mut buf = spectrum.to_vec();
        self.inv.process(&mut buf);
        let norm = 1.0 / self.len as f32;
        buf.into_iter().map(|c| c.re * norm).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_invariant() {
        let g = Grid::new(8, 1.0, 0.1);
        for i in 0..8 {
            assert!((g.log_wavelength_at(i) - (1.0 + i as f64 * 0.1)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_redshift_round_trip() {
        let g = Grid::default_grid();
        let z = g.redshift_for_lag(20.0);
        let k = g.lag_for_redshift(z);
        assert!((k - 20.0).abs() < 1e-9, "lag round-trip, got {}", k);
    }

    #[test]
    fn test_padded_len_avoids_wrap() {
        let g = Grid::new(1024, 0.0, 1.0);
        let padded = g.padded_len();
        assert!(padded >= 2 * g.n);
        assert_eq!(padded & (padded - 1), 0, "padded length must be a power of two");
    }

    #[test]
    fn test_taper_monotone_and_bounded() {
        let mut flux = vec![1.0f32; 100];
        taper(&mut flux, 10, 89, 20.0);
        // Edges are attenuated, interior untouched.
        assert!(flux[10] < 1.0);
        assert!((flux[50] - 1.0).abs() < 1e-6);
        // Monotone non-decreasing from edge to interior on the left side.
        let taper_len = ((80.0f64 * 0.20).round() as usize).max(1);
        for j in 1..taper_len {
            assert!(flux[10 + j] >= flux[10 + j - 1] - 1e-6);
        }
        for v in &flux {
            assert!(*v >= 0.0 && *v <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_taper_zero_outside_region_stays_zero() {
        let mut flux = vec![0.0f32; 20];
        for v in flux[5..=14].iter_mut() {
            *v = 2.0;
        }
        taper(&mut flux, 5, 14, 50.0);
        assert_eq!(flux[0], 0.0);
        assert_eq!(flux[19], 0.0);
    }

    #[test]
    fn test_l2_norm_of_constant() {
        let flux = vec![2.0f32; 4];
        let n = l2_norm(&flux, 0, 3);
        assert!((n - 4.0).abs() < 1e-6, "sqrt(4*4) = 4, got {}", n);
    }

    #[test]
    fn test_fft_engine_round_trip() {
        let engine = FftEngine::new(16);
        let signal: Vec<f32> = (0..16).map(|i| (i as f32 * 0.3).sin()).collect();
        let spectrum = engine.forward(&signal);
        let back = engine.inverse(&spectrum);
        for (a, b) in signal.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-4, "fft round trip: {} vs {}", a, b);
        }
    }
}
