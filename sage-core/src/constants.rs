//! Fixed parameters of the shared grid and well-known physical constants
//! used by the preprocessor and correlator.

// ============================================================================
// Shared log-wavelength grid (spec §3)
// ============================================================================

/// Default grid size. A power of two, as required by the FFT primitives.
pub const DEFAULT_GRID_N: usize = 1024;

/// Default grid origin: ln(lambda0), lambda0 in Angstrom.
pub const DEFAULT_LOG_WAVE0: f64 = 8.283_8; // ~3950 A, a typical SN blue cutoff.

/// Default grid spacing in ln(lambda) per pixel.
pub const DEFAULT_DLN_WAVE: f64 = 0.002_3;

/// Minimum number of finite samples a raw spectrum must retain after
/// trimming (spec §4.B `EmptySpectrum`).
pub const MIN_VALID_SAMPLES: usize = 16;

// ============================================================================
// Telluric and sky-line masking (spec §4.C step 2)
// ============================================================================

/// Telluric A-band window, in Angstrom.
pub const ABAND_RANGE: (f32, f32) = (7575.0, 7675.0);

/// Well-known strong night-sky emission lines, in Angstrom.
pub const SKY_EMISSION_LINES: &[f32] = &[5577.0, 6300.0, 6364.0, 5890.0, 5896.0];

/// Half-width used when clipping narrow sky emission lines, in Angstrom.
pub const SKYLINE_HALF_WIDTH: f32 = 6.0;
