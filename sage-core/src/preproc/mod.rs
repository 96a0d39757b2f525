//! The preprocessor (spec §4.C): turns a raw [`crate::io::Spectrum`] into a
//! [`ProcessedSpectrum`] living on the shared [`Grid`] — spike-cleaned,
//! masked, optionally smoothed, flux-conserving rebinned, continuum-flattened
//! and apodized, with every optional step gated by [`PreprocConfig`].

pub mod continuum;
pub mod masking;
pub mod rebin;
pub mod savgol;
pub mod spikes;

use crate::error::{Error, Result};
use crate::grid::{taper, Grid};
use crate::io::Spectrum;
use crate::trace::Trace;

/// Knobs for every optional preprocessing step (spec §6).
#[derive(Debug, Clone)]
pub struct PreprocConfig {
    /// Enable running-median spike removal (step 1).
    pub spike_masking: bool,
    /// Minimum residual-to-sigma ratio for a point to be flagged a spike.
    pub spike_floor_z: f32,
    /// Window (samples) of the running-median baseline. Forced odd.
    pub spike_baseline_window: usize,
    /// A flagged point's residual must exceed this multiple of each
    /// neighbor's residual, so broad features are never mistaken for spikes.
    pub spike_rel_edge_ratio: f32,
    /// Absolute residual floor below which a point is never flagged, even
    /// if its z-score passes. `0.0` disables this guard.
    pub spike_min_abs_residual: f32,
    /// Minimum index gap enforced between two consecutive removals.
    pub spike_min_separation: usize,
    /// Savitzky-Golay window (samples). `0` disables smoothing (step 3).
    pub savgol_window: usize,
    /// Savitzky-Golay polynomial order.
    pub savgol_order: usize,
    /// Zero the telluric A-band (step 2).
    pub aband_remove: bool,
    /// Zero a fixed set of strong night-sky emission lines (step 2).
    pub skyclip: bool,
    /// Redshift at which to clip common emission lines. Negative disables.
    pub emclip_z: f32,
    /// Half-width, in Angstrom, used when clipping emission lines.
    pub emwidth_a: f32,
    /// Explicit `(min, max)` wavelength windows to zero out (step 2).
    pub wavelength_masks: Vec<(f32, f32)>,
    /// Percent of the active region apodized on each side (step 8).
    pub apodize_percent: f32,
}

impl Default for PreprocConfig {
    fn default() -> Self {
        Self {
            spike_masking: false,
            spike_floor_z: 50.0,
            spike_baseline_window: 501,
            spike_rel_edge_ratio: 1.3,
            spike_min_abs_residual: 0.0,
            spike_min_separation: 5,
            savgol_window: 0,
            savgol_order: 3,
            aband_remove: false,
            skyclip: false,
            emclip_z: -1.0,
            emwidth_a: 40.0,
            wavelength_masks: Vec::new(),
            apodize_percent: 10.0,
        }
    }
}

/// A spectrum on the shared grid, ready for correlation against the
/// template library (spec §3).
#[derive(Debug, Clone)]
pub struct ProcessedSpectrum {
    pub log_wave: Vec<f64>,
    pub log_flux: Vec<f32>,
    pub flat_flux: Vec<f32>,
    pub continuum: Vec<f32>,
    pub tapered_flux: Vec<f32>,
    pub left_edge: usize,
    pub right_edge: usize,
    pub nonzero_mask: Vec<bool>,
}

/// Run the full preprocessing pipeline on `raw`, producing a
/// [`ProcessedSpectrum`] on `grid`.
pub fn preprocess(
    raw: &Spectrum,
    grid: &Grid,
    cfg: &PreprocConfig,
    trace: &mut Trace,
) -> Result<ProcessedSpectrum> {
    let start = std::time::Instant::now();
    let mut wave = raw.wave.clone();
    let mut flux = raw.flux.clone();

    if cfg.spike_masking {
        let removed = spikes::remove_spikes(&mut flux, cfg);
        if removed > 0 {
            trace.push_info("preproc.spikes", format!("removed {} spikes", removed));
        }
    }

    masking::apply_masks(&wave, &mut flux, cfg);

    if cfg.savgol_window >= 3 {
        savgol::savgol_smooth(&mut flux, cfg.savgol_window, cfg.savgol_order);
    }

    let log_flux = rebin::log_rebin(&wave, &flux, grid);

    let (left_edge, right_edge) = match find_edges(&log_flux) {
        (Some(l), Some(r)) if r > l => (l, r),
        _ => {
            return Err(Error::EmptySpectrum(
                "no active region survived masking and rebinning".into(),
            ))
        }
    };

    let cont = continuum::fit_continuum(&log_flux, left_edge, right_edge);
    if cont.degenerate {
        trace.push_warning(
            "preproc.continuum",
            "continuum fit was degenerate, used a linear fallback",
        );
    }
    let flat_flux = continuum::flatten(&log_flux, &cont.continuum, left_edge, right_edge);

    let mut tapered_flux = flat_flux.clone();
    taper(&mut tapered_flux, left_edge, right_edge, cfg.apodize_percent);

    let nonzero_mask: Vec<bool> = log_flux.iter().map(|&v| v != 0.0).collect();
    let log_wave: Vec<f64> = (0..grid.n).map(|i| grid.log_wavelength_at(i)).collect();

    trace.record_timing("preproc", start.elapsed());

    Ok(ProcessedSpectrum {
        log_wave,
        log_flux,
        flat_flux,
        continuum: cont.continuum,
        tapered_flux,
        left_edge,
        right_edge,
        nonzero_mask,
    })
}

fn find_edges(log_flux: &[f32]) -> (Option<usize>, Option<usize>) {
    (
        log_flux.iter().position(|&v| v != 0.0),
        log_flux.iter().rposition(|&v| v != 0.0),
    )
}
