//! The correlator (spec §4.E): FFT cross-correlation of one preprocessed
//! input against one template, with peak detection and the RLAP/LAP/CCC
//! quality metrics.

use crate::grid::{l2_norm, FftEngine, Grid};
use crate::library::Template;
use crate::preproc::ProcessedSpectrum;
use crate::score::ScoringConfig;
use num_complex::Complex32;

/// The outcome of correlating one input against one template.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationResult {
    pub z_best: f32,
    pub z_err: f32,
    pub lag_pixels: f32,
    pub rlap: f32,
    pub lap: f32,
    pub ccc: Option<f32>,
    pub rlap_ccc: f32,
    pub corr_peak: f32,
    pub corr_sigma: f32,
    pub accepted: bool,
}

/// Cross-correlate `input.tapered_flux` against `template`, in Tonry &
/// Davis normalized form (the raw FFT cross-correlation divided by the
/// product of the two active-region norms, so amplitude scaling of the
/// input cancels out of every downstream ratio).
pub fn correlate(
    input: &ProcessedSpectrum,
    template: &Template,
    grid: &Grid,
    fft: &FftEngine,
    cfg: &ScoringConfig,
) -> CorrelationResult {
    let padded_len = fft.len();
    let input_fft = fft.forward(&input.tapered_flux);
    let template_fft = template.fft();

    let mut product = vec![Complex32::new(0.0, 0.0); padded_len];
    for (p, (a, b)) in product.iter_mut().zip(input_fft.iter().zip(template_fft.iter())) {
        *p = a * b.conj();
    }
    let raw_corr = fft.inverse(&product);

    let norm_input = l2_norm(&input.tapered_flux, input.left_edge, input.right_edge);
    let norm_template = template.norm;
    let scale = if norm_input > 0.0 && norm_template > 0.0 {
        1.0 / (norm_input * norm_template)
    } else {
        0.0
    };

    let corr = corr_by_lag(&raw_corr, padded_len, scale);
    let half = (padded_len / 2) as isize;

    let (k_star, refined_k) = if let Some(z) = cfg.forced_redshift {
        let k = grid.lag_for_redshift(z as f64).round() as isize;
        (k.clamp(-half, half - 1), grid.lag_for_redshift(z as f64) as f32)
    } else {
        let (k_lo, k_hi) = search_bounds(grid, cfg, half);
        let k_star = argmax_in_range(&corr, half, k_lo, k_hi);
        let refined = parabolic_refine(&corr, half, k_star);
        (k_star, refined)
    };

    let corr_peak = lookup(&corr, half, k_star);
    let corr_sigma = running_sigma(&corr, half, k_star, cfg.peak_window_size);

    let z_best = (grid.dln_wave * refined_k as f64).exp() as f32 - 1.0;
    let z_err = z_err_from_halfwidth(&corr, half, k_star, corr_peak, corr_sigma, cfg.peak_window_size, grid);

    let rlap = corr_peak / corr_sigma;
    let lap = fractional_overlap(input, template, k_star);

    let ccc = if cfg.use_ccc {
        Some(cosine_similarity(input, template, k_star))
    } else {
        None
    };
    let rlap_ccc = match ccc {
        Some(c) => rlap * c.max(0.0),
        None => rlap,
    };

    let accepted = lap >= cfg.lapmin && rlap >= cfg.rlapmin;

    CorrelationResult {
        z_best,
        z_err,
        lag_pixels: refined_k,
        rlap,
        lap,
        ccc,
        rlap_ccc,
        corr_peak,
        corr_sigma,
        accepted,
    }
}

/// Reindex the circular IFFT output into a dense array over signed lag
/// `k in (-half, half]`, scaled by `scale`.
fn corr_by_lag(raw: &[f32], padded_len: usize, scale: f32) -> Vec<f32> {
    // out[j] holds C[k] for k = j - half, j in [0, padded_len)
    let mut out = vec![0.0f32; padded_len];
    let half = (padded_len / 2) as isize;
    for j in 0..padded_len {
        let k = j as isize - half;
        let raw_idx = k.rem_euclid(padded_len as isize) as usize;
        out[j] = raw[raw_idx] * scale;
    }
    out
}

#[inline]
fn lookup(corr: &[f32], half: isize, k: isize) -> f32 {
    let len = corr.len() as isize;
    let j = (k + half).clamp(0, len - 1);
    corr[j as usize]
}

fn search_bounds(grid: &Grid, cfg: &ScoringConfig, half: isize) -> (isize, isize) {
    let k_lo = grid.lag_for_redshift(cfg.zmin as f64).floor() as isize;
    let k_hi = grid.lag_for_redshift(cfg.zmax as f64).ceil() as isize;
    (k_lo.max(-half + 1), k_hi.min(half - 1))
}

fn argmax_in_range(corr: &[f32], half: isize, k_lo: isize, k_hi: isize) -> isize {
    let mut best_k = k_lo;
    let mut best_v = f32::NEG_INFINITY;
    for k in k_lo..=k_hi {
        let v = lookup(corr, half, k);
        if v > best_v {
            best_v = v;
            best_k = k;
        }
    }
    best_k
}

/// Parabolic sub-pixel interpolation around the three samples nearest the
/// peak (spec §4.E).
fn parabolic_refine(corr: &[f32], half: isize, k_star: isize) -> f32 {
    let y0 = lookup(corr, half, k_star - 1);
    let y1 = lookup(corr, half, k_star);
    let y2 = lookup(corr, half, k_star + 1);
    let denom = y0 - 2.0 * y1 + y2;
    if denom.abs() < 1e-12 {
        return k_star as f32;
    }
    let delta = 0.5 * (y0 - y2) / denom;
    k_star as f32 + delta.clamp(-1.0, 1.0)
}

/// Standard deviation of `corr` over the search range, excluding a window
/// of `+- window` samples around the peak (an "off-peak region").
fn running_sigma(corr: &[f32], half: isize, k_star: isize, window: usize) -> f32 {
    let len = corr.len() as isize;
    let window = window as isize;
    let off_peak: Vec<f32> = (0..len)
        .filter(|&j| (j - half - k_star).abs() > window)
        .map(|j| corr[j as usize])
        .collect();
    let sample = if off_peak.len() >= 8 { &off_peak[..] } else { corr };
    let mean: f32 = sample.iter().sum::<f32>() / sample.len() as f32;
    let var: f32 = sample.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / sample.len() as f32;
    // A clean, noiseless signal can have an exactly-zero off-peak region;
    // floor sigma so rlap stays a large finite number instead of blowing up.
    var.sqrt().max(1e-6)
}

/// Half-width (in grid units) from the peak to where `corr` first drops
/// below `corr_peak - corr_sigma`, scanning outward up to `peak_window`
/// samples on each side.
fn z_err_from_halfwidth(
    corr: &[f32],
    half: isize,
    k_star: isize,
    corr_peak: f32,
    corr_sigma: f32,
    peak_window: usize,
    grid: &Grid,
) -> f32 {
    let threshold = corr_peak - corr_sigma;
    let mut halfwidth = peak_window as isize;
    for j in 1..=peak_window as isize {
        if lookup(corr, half, k_star + j) < threshold {
            halfwidth = j;
            break;
        }
    }
    let k_hi = grid.redshift_for_lag((k_star + halfwidth) as f64);
    let k_lo = grid.redshift_for_lag(k_star as f64);
    ((k_hi - k_lo).abs() as f32).max(0.0)
}

/// Fractional overlap of the input's and the redshift-shifted template's
/// non-zero supports, as a Jaccard ratio of the two active-region spans.
fn fractional_overlap(input: &ProcessedSpectrum, template: &Template, k: isize) -> f32 {
    let shifted_left = template.left_edge as isize + k;
    let shifted_right = template.right_edge as isize + k;
    let in_left = input.left_edge as isize;
    let in_right = input.right_edge as isize;

    let overlap_lo = in_left.max(shifted_left);
    let overlap_hi = in_right.min(shifted_right);
    if overlap_hi < overlap_lo {
        return 0.0;
    }
    let overlap = (overlap_hi - overlap_lo + 1) as f32;
    let union_lo = in_left.min(shifted_left);
    let union_hi = in_right.max(shifted_right);
    let union = (union_hi - union_lo + 1) as f32;
    if union <= 0.0 {
        0.0
    } else {
        (overlap / union).clamp(0.0, 1.0)
    }
}

/// Cosine similarity between `input.tapered_flux` and the redshift-shifted
/// `template.flat_flux`, over their overlapping indices only.
fn cosine_similarity(input: &ProcessedSpectrum, template: &Template, k: isize) -> f32 {
    let n = input.tapered_flux.len() as isize;
    let lo = input.left_edge.max((template.left_edge as isize + k).max(0) as usize);
    let hi = (input.right_edge as isize).min(template.right_edge as isize + k).min(n - 1);
    if (hi as isize) < lo as isize {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_in = 0.0f64;
    let mut norm_tmpl = 0.0f64;
    for i in lo..=hi as usize {
        let tmpl_idx = i as isize - k;
        if tmpl_idx < 0 || tmpl_idx as usize >= template.flat_flux.len() {
            continue;
        }
        let a = input.tapered_flux[i] as f64;
        let b = template.flat_flux[tmpl_idx as usize] as f64;
        dot += a * b;
        norm_in += a * a;
        norm_tmpl += b * b;
    }
    if norm_in <= 0.0 || norm_tmpl <= 0.0 {
        0.0
    } else {
        (dot / (norm_in.sqrt() * norm_tmpl.sqrt())) as f32
    }
}
