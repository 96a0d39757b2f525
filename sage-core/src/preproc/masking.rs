//! Wavelength-window masking: explicit ranges, telluric A-band, sky
//! emission lines, and redshifted host/SN emission lines (spec §4.C step 2).

use super::PreprocConfig;

/// Rest-frame wavelengths (Angstrom) of common narrow emission features
/// worth clipping once a redshift is known.
const EMISSION_LINES_REST: &[f32] = &[6562.8, 4861.3, 5006.8, 4958.9, 3727.0, 5890.0, 5896.0];

/// Zero out `flux` everywhere `wave` falls inside a masked window, in place.
pub fn apply_masks(wave: &[f32], flux: &mut [f32], cfg: &PreprocConfig) {
    for &(wmin, wmax) in &cfg.wavelength_masks {
        zero_range(wave, flux, wmin, wmax);
    }
    if cfg.aband_remove {
        let (wmin, wmax) = crate::constants::ABAND_RANGE;
        zero_range(wave, flux, wmin, wmax);
    }
    if cfg.skyclip {
        for &line in crate::constants::SKY_EMISSION_LINES {
            zero_range(
                wave,
                flux,
                line - crate::constants::SKYLINE_HALF_WIDTH,
                line + crate::constants::SKYLINE_HALF_WIDTH,
            );
        }
    }
    if cfg.emclip_z >= 0.0 {
        for &rest in EMISSION_LINES_REST {
            let observed = rest * (1.0 + cfg.emclip_z);
            zero_range(wave, flux, observed - cfg.emwidth_a, observed + cfg.emwidth_a);
        }
    }
}

fn zero_range(wave: &[f32], flux: &mut [f32], wmin: f32, wmax: f32) {
    for (w, f) in wave.iter().zip(flux.iter_mut()) {
        if *w >= wmin && *w <= wmax {
            *f = 0.0;
        }
    }
}
