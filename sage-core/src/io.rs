//! Spectrum I/O adapter (spec §4.B).
//!
//! Normalizes whatever file the caller hands us into a `Spectrum { wave,
//! flux }` with wave strictly increasing, in Angstrom. Recognizes simple
//! two-column text, a minimal single-HDU FITS flavor, and header-delimited
//! CSV. Deliberately does not attempt multi-extension FITS or clever format
//! sniffing — that is out of scope (spec §1, §4.B).

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// A raw, unprocessed spectrum: `(wave[], flux[])` in Angstrom and
/// arbitrary flux units. Invariant: `wave` is strictly increasing, lengths
/// are equal, and neither array contains NaN or infinities.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wave: Vec<f32>,
    pub flux: Vec<f32>,
}

/// Load a spectrum from `path`, dispatching on extension first and falling
/// back to content sniffing when the extension is absent or unrecognized.
pub fn load_spectrum(path: &Path) -> Result<Spectrum> {
    let bytes = std::fs::read(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase());

    match ext.as_deref() {
        Some("fits") | Some("fit") => load_minimal_fits(&bytes),
        Some("csv") => load_csv(&String::from_utf8_lossy(&bytes)),
        _ => sniff_and_load(&bytes),
    }
}

fn sniff_and_load(bytes: &[u8]) -> Result<Spectrum> {
    if bytes.len() >= 6 && &bytes[0..6] == b"SIMPLE" {
        return load_minimal_fits(bytes);
    }
    let text = String::from_utf8_lossy(bytes);
    let first_data_line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    if first_data_line.contains(',') {
        load_csv(&text)
    } else {
        load_two_column(&text)
    }
}

/// Parse simple whitespace- or comma-delimited two-column text: wavelength
/// then flux, one sample per line. Lines that are blank or start with `#`
/// are skipped.
pub fn load_two_column(text: &str) -> Result<Spectrum> {
    let mut wave = Vec::new();
    let mut flux = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();
        if fields.len() < 2 {
            continue;
        }
        let (w, f) = match (fields[0].parse::<f32>(), fields[1].parse::<f32>()) {
            (Ok(w), Ok(f)) => (w, f),
            _ => continue,
        };
        wave.push(w);
        flux.push(f);
    }

    finalize(wave, flux)
}

/// Parse a CSV with an optional header row. If the header names a column
/// starting with "wave" or "flux" (case-insensitive), those columns are
/// used; otherwise the first two columns are assumed to be wave, flux.
pub fn load_csv(text: &str) -> Result<Spectrum> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let first = lines.next().ok_or_else(|| Error::BadInput("empty CSV".into()))?;
    let first_fields: Vec<&str> = first.split(',').map(str::trim).collect();

    let (wave_idx, flux_idx, header_consumed) = if first_fields.iter().any(|f| f.parse::<f32>().is_err()) {
        let lower: Vec<String> = first_fields.iter().map(|f| f.to_ascii_lowercase()).collect();
        let wave_idx = lower
            .iter()
            .position(|f| f.starts_with("wave") || f.starts_with("lambda"))
            .unwrap_or(0);
        let flux_idx = lower
            .iter()
            .position(|f| f.starts_with("flux") || f.starts_with("intensity"))
            .unwrap_or(1);
        (wave_idx, flux_idx, true)
    } else {
        (0, 1, false)
    };

    let mut wave = Vec::new();
    let mut flux = Vec::new();

    let rows = if header_consumed {
        lines.collect::<Vec<_>>()
    } else {
        std::iter::once(first).chain(lines).collect::<Vec<_>>()
    };

    for row in rows {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        if fields.len() <= wave_idx.max(flux_idx) {
            continue;
        }
        let (w, f) = match (fields[wave_idx].parse::<f32>(), fields[flux_idx].parse::<f32>()) {
            (Ok(w), Ok(f)) => (w, f),
            _ => continue,
        };
        wave.push(w);
        flux.push(f);
    }

    finalize(wave, flux)
}

/// Parse a minimal single-HDU FITS file: an 80-byte-card ASCII header
/// (padded to 2880-byte blocks) describing a linear wavelength solution via
/// `CRVAL1`/`CDELT1` (or `CD1_1`) and `CRPIX1`, followed by one row of
/// `NAXIS1` flux samples at the declared `BITPIX`.
pub fn load_minimal_fits(bytes: &[u8]) -> Result<Spectrum> {
    const CARD: usize = 80;
    const BLOCK: usize = 2880;

    if bytes.len() < BLOCK {
        return Err(Error::BadInput("file too short to be FITS".into()));
    }

    let mut cards = HashMap::new();
    let mut header_blocks = 0usize;
    'blocks: loop {
        let block_start = header_blocks * BLOCK;
        if block_start + BLOCK > bytes.len() {
            return Err(Error::BadInput("FITS header missing END card".into()));
        }
        let block = &bytes[block_start..block_start + BLOCK];
        for chunk in block.chunks(CARD) {
            let card = String::from_utf8_lossy(chunk);
            let key = card[..8.min(card.len())].trim();
            if key == "END" {
                header_blocks += 1;
                break 'blocks;
            }
            if let Some(eq) = card.find('=') {
                let value = card[eq + 1..].split('/').next().unwrap_or("").trim();
                let value = value.trim_matches('\'').trim();
                if !key.is_empty() {
                    cards.insert(key.to_string(), value.to_string());
                }
            }
        }
        header_blocks += 1;
    }

    let naxis1: usize = cards
        .get("NAXIS1")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::BadInput("FITS missing NAXIS1".into()))?;
    let bitpix: i32 = cards
        .get("BITPIX")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::BadInput("FITS missing BITPIX".into()))?;
    let crval1: f64 = cards.get("CRVAL1").and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let cdelt1: f64 = cards
        .get("CDELT1")
        .or_else(|| cards.get("CD1_1"))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::BadInput("FITS missing wavelength solution (CDELT1/CD1_1)".into()))?;
    let crpix1: f64 = cards.get("CRPIX1").and_then(|v| v.parse().ok()).unwrap_or(1.0);

    let data_start = header_blocks * BLOCK;
    let bytes_per_sample = (bitpix.unsigned_abs() as usize) / 8;
    let needed = data_start + naxis1 * bytes_per_sample;
    if bytes.len() < needed {
        return Err(Error::BadInput("FITS data block truncated".into()));
    }

    let mut wave = Vec::with_capacity(naxis1);
    let mut flux = Vec::with_capacity(naxis1);
    for i in 0..naxis1 {
        let offset = data_start + i * bytes_per_sample;
        let sample = &bytes[offset..offset + bytes_per_sample];
        let value = match bitpix {
            8 => sample[0] as f32,
            16 => i16::from_be_bytes([sample[0], sample[1]]) as f32,
            32 => i32::from_be_bytes([sample[0], sample[1], sample[2], sample[3]]) as f32,
            -32 => f32::from_be_bytes([sample[0], sample[1], sample[2], sample[3]]),
            -64 => f64::from_be_bytes(sample.try_into().unwrap()) as f32,
            other => return Err(Error::BadInput(format!("unsupported BITPIX {other}"))),
        };
        let w = crval1 + (i as f64 + 1.0 - crpix1) * cdelt1;
        wave.push(w as f32);
        flux.push(value);
    }

    finalize(wave, flux)
}

fn finalize(wave: Vec<f32>, flux: Vec<f32>) -> Result<Spectrum> {
    if wave.len() != flux.len() {
        return Err(Error::BadInput("wave/flux length mismatch".into()));
    }

    let mut pairs: Vec<(f32, f32)> = wave
        .into_iter()
        .zip(flux)
        .filter(|(w, f)| w.is_finite() && f.is_finite())
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    pairs.dedup_by(|a, b| a.0 == b.0);

    if pairs.len() < crate::constants::MIN_VALID_SAMPLES {
        return Err(Error::EmptySpectrum(format!(
            "only {} valid samples, need at least {}",
            pairs.len(),
            crate::constants::MIN_VALID_SAMPLES
        )));
    }

    for w in pairs.windows(2) {
        if w[1].0 <= w[0].0 {
            return Err(Error::BadInput("wavelength array is not strictly increasing".into()));
        }
    }

    let (wave, flux): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();
    Ok(Spectrum { wave, flux })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_column_basic() {
        let text = "# comment\n4000.0 1.0\n4001.0 1.1\n4002.0 1.2\n4003.0 1.3\n4004.0 1.4\n4005.0 1.5\n4006.0 1.6\n4007.0 1.7\n4008.0 1.8\n4009.0 1.9\n4010.0 2.0\n4011.0 2.1\n4012.0 2.2\n4013.0 2.3\n4014.0 2.4\n4015.0 2.5\n";
        let spec = load_two_column(text).unwrap();
        assert_eq!(spec.wave.len(), 16);
        assert_eq!(spec.wave[0], 4000.0);
    }

    #[test]
    fn test_two_column_rejects_empty() {
        let err = load_two_column("4000.0 1.0\n").unwrap_err();
        assert!(matches!(err, Error::EmptySpectrum(_)));
    }

    #[test]
    fn test_two_column_rejects_non_monotonic() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("{} {}\n", 5000.0 - i as f32, 1.0));
        }
        let err = load_two_column(&text).unwrap_err();
        assert!(matches!(err, Error::BadInput(_)));
    }

    #[test]
    fn test_csv_with_header() {
        let mut text = String::from("wavelength,flux\n");
        for i in 0..20 {
            text.push_str(&format!("{},{}\n", 4000.0 + i as f32, 1.0 + i as f32 * 0.1));
        }
        let spec = load_csv(&text).unwrap();
        assert_eq!(spec.wave.len(), 20);
    }

    #[test]
    fn test_csv_without_header() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("{},{}\n", 4000.0 + i as f32, 1.0));
        }
        let spec = load_csv(&text).unwrap();
        assert_eq!(spec.wave.len(), 20);
    }

    #[test]
    fn test_finalize_drops_non_finite() {
        let wave: Vec<f32> = (0..20).map(|i| 4000.0 + i as f32).collect();
        let mut flux: Vec<f32> = vec![1.0; 20];
        flux[3] = f32::NAN;
        flux[7] = f32::INFINITY;
        let spec = finalize(wave, flux).unwrap();
        assert_eq!(spec.wave.len(), 18);
    }

    fn build_minimal_fits(naxis1: usize, crval1: f64, cdelt1: f64) -> Vec<u8> {
        let mut header = String::new();
        let push_card = |header: &mut String, card: String| {
            let mut c = card;
            c.truncate(80);
            while c.len() < 80 {
                c.push(' ');
            }
            header.push_str(&c);
        };
        push_card(&mut header, "SIMPLE  =                    T".to_string());
        push_card(&mut header, "BITPIX  =                  -32".to_string());
        push_card(&mut header, "NAXIS   =                    1".to_string());
        push_card(&mut header, format!("NAXIS1  = {:20}", naxis1));
        push_card(&mut header, format!("CRVAL1  = {:20}", crval1));
        push_card(&mut header, format!("CDELT1  = {:20}", cdelt1));
        push_card(&mut header, "CRPIX1  =                  1.0".to_string());
        push_card(&mut header, "END".to_string());
        let mut bytes = header.into_bytes();
        while bytes.len() % 2880 != 0 {
            bytes.push(b' ');
        }
        for i in 0..naxis1 {
            let v = 1.0f32 + i as f32 * 0.01;
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        while bytes.len() % 2880 != 0 {
            bytes.push(0);
        }
        bytes
    }

    #[test]
    fn test_minimal_fits_round_trip() {
        let bytes = build_minimal_fits(32, 4000.0, 2.0);
        let spec = load_minimal_fits(&bytes).unwrap();
        assert_eq!(spec.wave.len(), 32);
        assert!((spec.wave[0] - 4000.0).abs() < 1e-3);
        assert!((spec.wave[1] - 4002.0).abs() < 1e-3);
    }
}
