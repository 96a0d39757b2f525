//! Continuum fit and flattening (spec §4.C steps 6-7).
//!
//! The continuum is a heavily iterated boxcar smooth of the active region.
//! If that collapses to a non-finite or non-positive curve the fit is
//! degenerate; rather than propagate a `BadContinuum` error, we fall back
//! to a straight line across the active region and let the caller record
//! the recovery as a trace warning.

/// Result of [`fit_continuum`]: a continuum curve covering the whole grid
/// (identically `1.0` outside the active region) and whether the linear
/// fallback had to be used.
pub struct ContinuumResult {
    pub continuum: Vec<f32>,
    pub degenerate: bool,
}

/// Fit a continuum to `log_flux[left..=right]`. Indices outside the active
/// region are set to `1.0` (a neutral value; [`flatten`] never reads them).
pub fn fit_continuum(log_flux: &[f32], left: usize, right: usize) -> ContinuumResult {
    let n = log_flux.len();
    let mut continuum = vec![1.0f32; n];
    if right <= left || right >= n {
        return ContinuumResult { continuum, degenerate: true };
    }

    let region = &log_flux[left..=right];
    let mut work = region.to_vec();
    let window = ((region.len() / 8).max(5)) | 1;
    for _ in 0..5 {
        work = boxcar_smooth(&work, window);
    }

    let floor = region
        .iter()
        .fold(0.0f32, |acc, v| acc.max(v.abs()))
        .max(1e-6)
        * 0.01;
    let degenerate = work.iter().any(|v| !v.is_finite() || *v <= 0.0);

    if degenerate {
        let y0 = *region.first().unwrap_or(&1.0);
        let y1 = *region.last().unwrap_or(&1.0);
        let span = (region.len() - 1).max(1) as f32;
        for (i, slot) in work.iter_mut().enumerate() {
            let t = i as f32 / span;
            *slot = (y0 + t * (y1 - y0)).max(floor);
        }
    } else {
        for v in work.iter_mut() {
            *v = v.max(floor);
        }
    }

    continuum[left..=right].copy_from_slice(&work);
    ContinuumResult { continuum, degenerate }
}

fn boxcar_smooth(data: &[f32], window: usize) -> Vec<f32> {
    let n = data.len();
    let half = window / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let slice = &data[lo..=hi];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

/// Divide `log_flux` by `continuum` and subtract 1, zero-mean over the
/// active region, zero everywhere outside it.
pub fn flatten(log_flux: &[f32], continuum: &[f32], left: usize, right: usize) -> Vec<f32> {
    let n = log_flux.len();
    let mut flat = vec![0.0f32; n];
    if right < left || right >= n {
        return flat;
    }
    for i in left..=right {
        flat[i] = log_flux[i] / continuum[i] - 1.0;
    }
    let count = (right - left + 1) as f32;
    let mean: f32 = flat[left..=right].iter().sum::<f32>() / count;
    for v in flat[left..=right].iter_mut() {
        *v -= mean;
    }
    flat
}
