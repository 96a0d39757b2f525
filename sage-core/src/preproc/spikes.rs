//! Single-pixel spike removal (spec §4.C step 1).
//!
//! A running-median baseline absorbs the smooth part of the spectrum; a
//! point is a spike when its residual against that baseline is both a
//! large multiple of the residual scatter and sharply peaked relative to
//! its immediate neighbors (telluric and noise spikes are rarely both).

use super::PreprocConfig;

/// Replace detected spikes in `flux` with their running-median baseline
/// value, in place. Returns the number of points replaced.
pub fn remove_spikes(flux: &mut [f32], cfg: &PreprocConfig) -> usize {
    let n = flux.len();
    if n < 3 {
        return 0;
    }
    let window = (cfg.spike_baseline_window.max(3)) | 1;
    let baseline = running_median(flux, window);
    let residuals: Vec<f32> = flux.iter().zip(&baseline).map(|(f, b)| f - b).collect();
    let sigma = robust_sigma(&residuals);
    if sigma <= 0.0 {
        return 0;
    }

    let mut removed = 0;
    let mut last_removed: Option<usize> = None;
    for i in 1..n - 1 {
        let r = residuals[i].abs();
        if r / sigma <= cfg.spike_floor_z {
            continue;
        }
        let sharper_than_neighbors = r > cfg.spike_rel_edge_ratio * residuals[i - 1].abs()
            && r > cfg.spike_rel_edge_ratio * residuals[i + 1].abs();
        if !sharper_than_neighbors {
            continue;
        }
        if cfg.spike_min_abs_residual > 0.0 && r < cfg.spike_min_abs_residual {
            continue;
        }
        if let Some(last) = last_removed {
            if i - last < cfg.spike_min_separation {
                continue;
            }
        }
        flux[i] = baseline[i];
        last_removed = Some(i);
        removed += 1;
    }
    removed
}

fn running_median(data: &[f32], window: usize) -> Vec<f32> {
    let n = data.len();
    let half = window / 2;
    let mut out = vec![0.0f32; n];
    let mut scratch = Vec::with_capacity(window);
    for (i, slot) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);
        scratch.clear();
        scratch.extend_from_slice(&data[lo..=hi]);
        scratch.sort_by(|a, b| a.partial_cmp(b).unwrap());
        *slot = scratch[scratch.len() / 2];
    }
    out
}

/// Median absolute deviation scaled to a normal-equivalent sigma.
fn robust_sigma(residuals: &[f32]) -> f32 {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted[sorted.len() / 2];
    let mut abs_dev: Vec<f32> = residuals.iter().map(|r| (r - median).abs()).collect();
    abs_dev.sort_by(|a, b| a.partial_cmp(b).unwrap());
    abs_dev[abs_dev.len() / 2] * 1.4826
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PreprocConfig {
        PreprocConfig {
            spike_masking: true,
            spike_floor_z: 8.0,
            spike_baseline_window: 15,
            ..PreprocConfig::default()
        }
    }

    #[test]
    fn test_single_spike_is_removed() {
        let mut flux: Vec<f32> = (0..60).map(|i| (i as f32 * 0.1).sin()).collect();
        flux[30] += 50.0;
        let removed = remove_spikes(&mut flux, &cfg());
        assert_eq!(removed, 1);
        assert!(flux[30] < 5.0, "spike should be pulled back toward baseline, got {}", flux[30]);
    }

    #[test]
    fn test_smooth_signal_untouched() {
        let mut flux: Vec<f32> = (0..60).map(|i| (i as f32 * 0.1).sin()).collect();
        let before = flux.clone();
        let removed = remove_spikes(&mut flux, &cfg());
        assert_eq!(removed, 0);
        assert_eq!(flux, before);
    }

    #[test]
    fn test_min_separation_limits_consecutive_removals() {
        let mut flux: Vec<f32> = vec![0.0; 60];
        flux[20] = 50.0;
        flux[21] = 50.0;
        let mut c = cfg();
        c.spike_min_separation = 10;
        let removed = remove_spikes(&mut flux, &c);
        assert!(removed <= 1, "min separation should suppress the second spike, got {}", removed);
    }
}
