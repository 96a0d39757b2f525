//! The top-level entry point (spec §6 "Core API"): wires I/O,
//! preprocessing, scoring, clustering and result assembly into one call.

use crate::cluster::{self, ClusteringConfig};
use crate::error::{Error, Result};
use crate::grid::{FftEngine, Grid};
use crate::io::{self, Spectrum};
use crate::library::TemplateLibrary;
use crate::preproc::{self, PreprocConfig};
use crate::result::{self, AnalysisResult, DEFAULT_TOP_K};
use crate::score::{self, CancelToken, ProgressSink, ScoringConfig};
use crate::trace::Trace;
use std::path::{Path, PathBuf};

/// Where the input spectrum comes from: already in memory, or a path the
/// core loads itself (spec §6 `input: Spectrum | Path`).
#[derive(Debug, Clone)]
pub enum SpectrumSource {
    Owned(Spectrum),
    Path(PathBuf),
}

impl From<Spectrum> for SpectrumSource {
    fn from(s: Spectrum) -> Self {
        Self::Owned(s)
    }
}

impl From<PathBuf> for SpectrumSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for SpectrumSource {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

/// Run one complete analysis: load (if needed), preprocess, score against
/// every eligible template in `library`, cluster the accepted matches, and
/// assemble the final result (spec §6).
pub fn analyze(
    input: SpectrumSource,
    library: &TemplateLibrary,
    grid: &Grid,
    preproc_cfg: &PreprocConfig,
    scoring_cfg: &ScoringConfig,
    clustering_cfg: &ClusteringConfig,
    cancel: &CancelToken,
    progress: Option<ProgressSink>,
) -> Result<AnalysisResult> {
    let mut trace = Trace::new();

    let raw = match input {
        SpectrumSource::Owned(s) => s,
        SpectrumSource::Path(path) => io::load_spectrum(&path)?,
    };

    let processed = preproc::preprocess(&raw, grid, preproc_cfg, &mut trace)?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled { completed: 0, total: 0, trace: std::mem::take(&mut trace) });
    }

    let matches = score::score_library(&processed, library, grid, scoring_cfg, cancel, progress, &mut trace)?;

    let (winner, type_fractions, subtype_fractions) = cluster::select_cluster(&matches, clustering_cfg, &mut trace);

    Ok(result::assemble(&matches, winner, type_fractions, subtype_fractions, DEFAULT_TOP_K, trace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::l2_norm;
    use crate::library::{Template, TypeName};

    fn grid() -> Grid {
        Grid::new(256, 8.0, 0.002)
    }

    fn library_with_gaussian_bump(grid: &Grid) -> TemplateLibrary {
        let engine = FftEngine::new(grid.padded_len());
        let mut flux = vec![0.0f32; grid.n];
        let start = grid.n / 4;
        for j in 0..40 {
            let x = (j as f32 - 20.0) / 6.0;
            flux[start + j] = (-(x * x)).exp();
        }
        let template = Template::from_flat_flux(
            "sn1999ee".into(),
            TypeName::new("Ia"),
            Some("91T".into()),
            3.0,
            0.0,
            1.0,
            flux,
            &engine,
        );
        TemplateLibrary::from_templates(vec![template])
    }

    #[test]
    fn test_analyze_end_to_end_on_synthetic_spectrum() {
        let grid = grid();
        let library = library_with_gaussian_bump(&grid);

        let wave: Vec<f32> = (0..grid.n).map(|i| grid.wavelength_at(i) as f32).collect();
        let mut flux = vec![1.0f32; grid.n];
        let start = grid.n / 4;
        for j in 0..40 {
            let x = (j as f32 - 20.0) / 6.0;
            flux[start + j] += (-(x * x)).exp();
        }
        let raw = Spectrum { wave, flux };

        let preproc_cfg = PreprocConfig::default();
        let scoring_cfg = ScoringConfig { zmin: -0.01, zmax: 0.05, ..ScoringConfig::default() };
        let clustering_cfg = ClusteringConfig { min_cluster_size: 1, ..ClusteringConfig::default() };

        let result = analyze(
            SpectrumSource::Owned(raw),
            &library,
            &grid,
            &preproc_cfg,
            &scoring_cfg,
            &clustering_cfg,
            &CancelToken::new(),
            None,
        )
        .expect("analysis should succeed on a clean synthetic spectrum");

        assert!(result.success);
        assert!(!result.filtered_matches.is_empty());
        let _ = l2_norm(&[1.0, 2.0], 0, 1);
    }

    #[test]
    fn test_analyze_propagates_no_eligible_templates() {
        let grid = grid();
        let library = library_with_gaussian_bump(&grid);
        let wave: Vec<f32> = (0..grid.n).map(|i| grid.wavelength_at(i) as f32).collect();
        let flux = vec![1.0f32; grid.n];
        let raw = Spectrum { wave, flux };

        let preproc_cfg = PreprocConfig::default();
        let scoring_cfg = ScoringConfig { type_filter: Some(vec![TypeName::new("II")]), ..ScoringConfig::default() };
        let clustering_cfg = ClusteringConfig::default();

        let err = analyze(
            SpectrumSource::Owned(raw),
            &library,
            &grid,
            &preproc_cfg,
            &scoring_cfg,
            &clustering_cfg,
            &CancelToken::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoEligibleTemplates(_)));
    }

    #[test]
    fn test_analyze_respects_cancellation_before_scoring() {
        let grid = grid();
        let library = library_with_gaussian_bump(&grid);
        let wave: Vec<f32> = (0..grid.n).map(|i| grid.wavelength_at(i) as f32).collect();
        let flux = vec![1.0f32; grid.n];
        let raw = Spectrum { wave, flux };

        let cancel = CancelToken::new();
        cancel.cancel();

        let err = analyze(
            SpectrumSource::Owned(raw),
            &library,
            &grid,
            &PreprocConfig::default(),
            &ScoringConfig::default(),
            &ClusteringConfig::default(),
            &cancel,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled { completed: 0, total: 0, .. }));
    }
}
