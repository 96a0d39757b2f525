//! Command-line front-end for the spectrum classifier: a thin wrapper over
//! `sage_core::analyze`, responsible only for argument parsing, I/O, and
//! exit codes.

use clap::Parser;
use sage_core::cluster::ClusteringConfig;
use sage_core::error::Error;
use sage_core::grid::Grid;
use sage_core::library::{TemplateLibrary, TypeName};
use sage_core::preproc::PreprocConfig;
use sage_core::score::{CancelToken, ProgressEvent, ScoringConfig};
use sage_core::analyze::{analyze, SpectrumSource};
use std::path::PathBuf;
use std::process::ExitCode;

/// Classify one astronomical spectrum against a reference template library.
#[derive(Parser, Debug)]
#[command(name = "sage", version, about = "Spectrum classification engine")]
struct Args {
    /// Path to the input spectrum (two-column text, CSV, or minimal FITS).
    spectrum: PathBuf,

    /// Directory to write the classification record and flux dumps into.
    #[arg(long = "output-dir", value_name = "D")]
    output_dir: Option<PathBuf>,

    /// Base template library directory.
    #[arg(long = "library-dir", value_name = "D", default_value = "templates/base")]
    library_dir: PathBuf,

    /// Optional user template library directory, overriding base buckets by type.
    #[arg(long = "user-library-dir", value_name = "D")]
    user_library_dir: Option<PathBuf>,

    /// Skip the redshift search and score every template at this fixed z.
    #[arg(long = "forced-redshift", value_name = "Z")]
    forced_redshift: Option<f32>,

    #[arg(long = "zmin", value_name = "X", default_value_t = -0.01)]
    zmin: f32,

    #[arg(long = "zmax", value_name = "Y", default_value_t = 1.0)]
    zmax: f32,

    #[arg(long = "rlapmin", value_name = "R", default_value_t = 4.0)]
    rlapmin: f32,

    #[arg(long = "lapmin", value_name = "L", default_value_t = 0.3)]
    lapmin: f32,

    /// Restrict scoring to these template types. May be repeated.
    #[arg(long = "type-filter", value_name = "T")]
    type_filter: Vec<String>,

    #[arg(long = "age-min", value_name = "A")]
    age_min: Option<f32>,

    #[arg(long = "age-max", value_name = "B")]
    age_max: Option<f32>,

    /// Savitzky-Golay window, in samples. 0 disables smoothing.
    #[arg(long = "savgol-window", value_name = "W", default_value_t = 0)]
    savgol_window: usize,

    #[arg(long = "savgol-order", value_name = "O", default_value_t = 3)]
    savgol_order: usize,

    /// Zero the telluric A-band before correlating.
    #[arg(long = "aband-remove")]
    aband_remove: bool,

    /// Clip a fixed set of strong night-sky emission lines.
    #[arg(long = "skyclip")]
    skyclip: bool,

    /// Zero additional wavelength ranges, each as `WMIN:WMAX` (Angstrom).
    #[arg(long = "wavelength-masks", value_name = "WMIN:WMAX")]
    wavelength_masks: Vec<String>,

    #[arg(long = "apodize-percent", value_name = "P", default_value_t = 10.0)]
    apodize_percent: f32,

    /// Also write the fluxed and flattened processed-spectrum dumps.
    #[arg(long = "complete")]
    complete: bool,

    /// Suppress the top-matches table; print only the classification summary.
    #[arg(long = "minimal")]
    minimal: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            tracing::error!(target: "sage_cli", %err, "analysis failed");
            match err {
                Error::BadInput(_) | Error::EmptySpectrum(_) | Error::NoEligibleTemplates(_) => ExitCode::from(2),
                Error::Cancelled { .. } => ExitCode::from(3),
                Error::Internal(_) | Error::Io(_) => ExitCode::from(1),
            }
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    let grid = Grid::default_grid();
    let library = TemplateLibrary::load(&args.library_dir, args.user_library_dir.as_deref(), &grid)?;

    let wavelength_masks = parse_wavelength_masks(&args.wavelength_masks)?;

    let preproc_cfg = PreprocConfig {
        aband_remove: args.aband_remove,
        skyclip: args.skyclip,
        wavelength_masks,
        savgol_window: args.savgol_window,
        savgol_order: args.savgol_order,
        apodize_percent: args.apodize_percent,
        ..PreprocConfig::default()
    };

    let scoring_cfg = ScoringConfig {
        zmin: args.zmin,
        zmax: args.zmax,
        rlapmin: args.rlapmin,
        lapmin: args.lapmin,
        age_min: args.age_min,
        age_max: args.age_max,
        type_filter: if args.type_filter.is_empty() {
            None
        } else {
            Some(args.type_filter.iter().map(|t| TypeName::new(t.clone())).collect())
        },
        forced_redshift: args.forced_redshift,
        ..ScoringConfig::default()
    };

    let clustering_cfg = ClusteringConfig::default();

    let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let cancel = CancelToken::new();
    let progress_thread = std::thread::spawn(move || {
        for event in rx.iter() {
            tracing::debug!(target: "sage_cli.progress", completed = event.completed, total = event.total, phase = event.phase);
        }
    });

    let result = analyze(
        SpectrumSource::Path(args.spectrum.clone()),
        &library,
        &grid,
        &preproc_cfg,
        &scoring_cfg,
        &clustering_cfg,
        &cancel,
        Some(tx),
    )?;
    let _ = progress_thread.join();

    print_summary(&result, args.minimal);

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
        write_record(dir, &args.spectrum, &result)?;
        if args.complete {
            write_flux_dumps(dir, &args.spectrum, &grid)?;
        }
    }

    Ok(())
}

fn parse_wavelength_masks(raw: &[String]) -> Result<Vec<(f32, f32)>, Error> {
    raw.iter()
        .map(|spec| {
            let (lo, hi) = spec
                .split_once(':')
                .ok_or_else(|| Error::BadInput(format!("malformed --wavelength-masks entry '{spec}', expected WMIN:WMAX")))?;
            let lo: f32 = lo.parse().map_err(|_| Error::BadInput(format!("bad wavelength '{lo}'")))?;
            let hi: f32 = hi.parse().map_err(|_| Error::BadInput(format!("bad wavelength '{hi}'")))?;
            Ok((lo, hi))
        })
        .collect()
}

fn print_summary(result: &sage_core::result::AnalysisResult, minimal: bool) {
    println!(
        "type={} subtype={} z={:.5}+/-{:.5} age={:.1}+/-{:.1} rlap={:.2}",
        result.best_type,
        result.best_subtype.as_deref().unwrap_or("-"),
        result.z,
        result.z_err,
        result.age,
        result.age_err,
        result.rlap_best,
    );
    if minimal {
        return;
    }
    for m in &result.top_matches {
        println!(
            "  {:<24} {:<8} z={:.5} rlap_ccc={:.2} accepted={}",
            m.template_name, m.type_name, m.z_best, m.rlap_ccc, m.accepted
        );
    }
}

fn write_record(dir: &std::path::Path, spectrum_path: &std::path::Path, result: &sage_core::result::AnalysisResult) -> Result<(), Error> {
    let stem = spectrum_path.file_stem().and_then(|s| s.to_str()).unwrap_or("spectrum");
    let mut out = format!(
        "type={} subtype={} z={:.5} z_err={:.5} age={:.2} age_err={:.2} rlap_best={:.3}\n",
        result.best_type,
        result.best_subtype.as_deref().unwrap_or("-"),
        result.z,
        result.z_err,
        result.age,
        result.age_err,
        result.rlap_best,
    );
    for m in &result.top_matches {
        out.push_str(&format!(
            "{} {} {:.5} {:.3} {:.3} {}\n",
            m.template_name, m.type_name, m.z_best, m.rlap_ccc, m.lap, m.accepted
        ));
    }
    std::fs::write(dir.join(format!("{stem}.sage_result.txt")), out)?;
    Ok(())
}

fn write_flux_dumps(dir: &std::path::Path, spectrum_path: &std::path::Path, grid: &Grid) -> Result<(), Error> {
    let stem = spectrum_path.file_stem().and_then(|s| s.to_str()).unwrap_or("spectrum");
    let raw = sage_core::io::load_spectrum(spectrum_path)?;
    let cfg = PreprocConfig::default();
    let mut trace = sage_core::trace::Trace::new();
    let processed = sage_core::preproc::preprocess(&raw, grid, &cfg, &mut trace)?;

    let fluxed: String = processed
        .log_wave
        .iter()
        .zip(processed.log_flux.iter())
        .map(|(w, f)| format!("{:.6} {:.6}\n", w.exp(), f))
        .collect();
    std::fs::write(dir.join(format!("{stem}.fluxed.txt")), fluxed)?;

    let flattened: String = processed
        .log_wave
        .iter()
        .zip(processed.flat_flux.iter())
        .map(|(w, f)| format!("{:.6} {:.6}\n", w.exp(), f))
        .collect();
    std::fs::write(dir.join(format!("{stem}.flattened.txt")), flattened)?;

    Ok(())
}
