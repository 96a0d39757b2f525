//! # sage-core -- spectrum classification engine
//!
//! A library for classifying astronomical spectra against a reference
//! template library: preprocessing onto a shared log-wavelength grid,
//! FFT-based cross-correlation, and type-aware clustering of the resulting
//! matches into a single consensus classification.
//!
//! ## Quick start
//!
//! ```no_run
//! use sage_core::prelude::*;
//! use std::path::PathBuf;
//!
//! let grid = Grid::default_grid();
//! let library = TemplateLibrary::load(&PathBuf::from("templates/base"), None, &grid)?;
//!
//! let result = analyze(
//!     SpectrumSource::Path(PathBuf::from("spectrum.fits")),
//!     &library,
//!     &grid,
//!     &PreprocConfig::default(),
//!     &ScoringConfig::default(),
//!     &ClusteringConfig::default(),
//!     &CancelToken::new(),
//!     None,
//! )?;
//!
//! println!("{}: z = {:.4} +/- {:.4}", result.best_type, result.z, result.z_err);
//! # Ok::<(), sage_core::error::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`io`] -- Spectrum adapters: two-column text, CSV, a minimal FITS flavor
//! - [`grid`] -- The shared log-wavelength grid, FFT engine, taper and L2 norm primitives
//! - [`preproc`] -- Spike removal, masking, smoothing, flux-conserving rebinning, continuum flattening, apodization
//! - [`library`] -- The read-only template store: on-disk codec, type buckets, filtered queries
//! - [`correlate`] -- FFT cross-correlation of one spectrum against one template, producing `rlap`/`lap`/`ccc`
//! - [`score`] -- Parallel scoring of a spectrum against every eligible library template
//! - [`cluster`] -- GMM-based grouping of accepted matches into a winning consensus cluster
//! - [`result`] -- Assembly of the owned, lifetime-free [`AnalysisResult`](result::AnalysisResult)
//! - [`analyze`] -- The top-level entry point wiring every stage together
//! - [`trace`] -- The structured diagnostic record threaded through one analysis
//! - [`error`] -- The error taxonomy surfaced to callers
//! - [`constants`] -- Grid defaults and well-known telluric/sky-line wavelengths

pub mod analyze;
pub mod cluster;
pub mod constants;
pub mod correlate;
pub mod error;
pub mod grid;
pub mod io;
pub mod library;
pub mod preproc;
pub mod result;
pub mod score;
pub mod trace;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::analyze::{analyze, SpectrumSource};
    pub use crate::cluster::{Cluster, ClusteringConfig};
    pub use crate::error::{Error, Result};
    pub use crate::grid::Grid;
    pub use crate::io::Spectrum;
    pub use crate::library::{Template, TemplateLibrary, TypeName};
    pub use crate::preproc::PreprocConfig;
    pub use crate::result::AnalysisResult;
    pub use crate::score::{CancelToken, Match, ProgressEvent, ScoringConfig};
}
