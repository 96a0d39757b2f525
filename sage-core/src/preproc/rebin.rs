//! Flux-conserving rebin onto the shared log-wavelength grid (spec §4.C
//! step 4): each input sample is treated as a small flat-topped pixel
//! spanning the midpoints to its neighbors, and each output pixel receives
//! the overlap-weighted average of every input pixel it intersects.

use crate::grid::Grid;

/// Resample `(wave, flux)` onto `grid`, conserving integrated flux. Output
/// pixels with no overlapping input coverage are left at `0.0`.
pub fn log_rebin(wave: &[f32], flux: &[f32], grid: &Grid) -> Vec<f32> {
    let mut out = vec![0.0f32; grid.n];
    if wave.len() < 2 {
        return out;
    }
    let input_edges = pixel_edges(wave);
    let output_edges = grid_pixel_edges(grid);

    let mut j = 0usize;
    for (i, slot) in out.iter_mut().enumerate() {
        let lo = output_edges[i];
        let hi = output_edges[i + 1];
        if hi <= lo {
            continue;
        }
        while j + 1 < input_edges.len() && input_edges[j + 1] <= lo {
            j += 1;
        }
        let mut acc = 0.0f64;
        let mut k = j;
        while k < flux.len() && input_edges[k] < hi {
            let seg_lo = lo.max(input_edges[k]);
            let seg_hi = hi.min(input_edges[k + 1]);
            if seg_hi > seg_lo {
                acc += flux[k] as f64 * (seg_hi - seg_lo) as f64;
            }
            if input_edges[k + 1] >= hi {
                break;
            }
            k += 1;
        }
        let width = (hi - lo) as f64;
        *slot = if width > 0.0 { (acc / width) as f32 } else { 0.0 };
    }
    out
}

/// Pixel edges for `wave`: midpoints between neighbors, with the first and
/// last edges extrapolated by the adjacent pixel's half-width.
fn pixel_edges(wave: &[f32]) -> Vec<f32> {
    let n = wave.len();
    let mut edges = vec![0.0f32; n + 1];
    for i in 1..n {
        edges[i] = 0.5 * (wave[i - 1] + wave[i]);
    }
    edges[0] = wave[0] - (edges[1] - wave[0]);
    edges[n] = wave[n - 1] + (wave[n - 1] - edges[n - 1]);
    edges
}

/// Pixel edges (in wavelength) for the grid, centered on each grid point's
/// `log_wavelength_at(i)` in log space.
fn grid_pixel_edges(grid: &Grid) -> Vec<f32> {
    (0..=grid.n)
        .map(|i| (grid.log_wave0 + (i as f64 - 0.5) * grid.dln_wave).exp() as f32)
        .collect()
}
