//! The scoring engine (spec §4.F): drives the correlator over every
//! eligible template in parallel, with cooperative cancellation and
//! advisory progress reporting.

use crate::correlate::{correlate, CorrelationResult};
use crate::error::{Error, Result};
use crate::grid::{FftEngine, Grid};
use crate::library::{Template, TemplateLibrary, TypeName};
use crate::preproc::ProcessedSpectrum;
use crate::trace::Trace;
use rayon::prelude::*;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A cheap, `Clone + Send + Sync` handle the caller uses to request
/// cancellation of an in-flight [`score_library`] call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One advisory progress update.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub phase: &'static str,
}

/// The caller-provided channel progress updates are posted to. Writers
/// tolerate a full or disconnected channel silently (spec §5).
pub type ProgressSink = crossbeam_channel::Sender<ProgressEvent>;

/// Knobs for one scoring pass (spec §6).
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub zmin: f32,
    pub zmax: f32,
    pub rlapmin: f32,
    pub lapmin: f32,
    pub age_min: Option<f32>,
    pub age_max: Option<f32>,
    pub type_filter: Option<Vec<TypeName>>,
    pub template_filter: Option<Vec<String>>,
    pub exclude_templates: Vec<String>,
    pub forced_redshift: Option<f32>,
    pub peak_window_size: usize,
    pub use_ccc: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            zmin: -0.01,
            zmax: 1.0,
            rlapmin: 4.0,
            lapmin: 0.3,
            age_min: None,
            age_max: None,
            type_filter: None,
            template_filter: None,
            exclude_templates: Vec::new(),
            forced_redshift: None,
            peak_window_size: 10,
            use_ccc: true,
        }
    }
}

/// A per-template correlation result, borrowing its template from the
/// library for the duration of one analysis (spec §3 "Match").
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub template: &'a Template,
    pub z_best: f32,
    pub z_err: f32,
    pub lag_pixels: f32,
    pub rlap: f32,
    pub lap: f32,
    pub ccc: Option<f32>,
    pub rlap_ccc: f32,
    pub corr_peak: f32,
    pub corr_sigma: f32,
    pub accepted: bool,
}

impl<'a> Match<'a> {
    fn from_correlation(template: &'a Template, r: CorrelationResult) -> Self {
        Self {
            template,
            z_best: r.z_best,
            z_err: r.z_err,
            lag_pixels: r.lag_pixels,
            rlap: r.rlap,
            lap: r.lap,
            ccc: r.ccc,
            rlap_ccc: r.rlap_ccc,
            corr_peak: r.corr_peak,
            corr_sigma: r.corr_sigma,
            accepted: r.accepted,
        }
    }
}

thread_local! {
    static THREAD_FFT: RefCell<Option<FftEngine>> = RefCell::new(None);
}

/// Run `f` with an `FftEngine` cached for this worker thread, rebuilding
/// it only if `padded_len` changes (spec §5 "O(N) per live FFT buffer per
/// worker, reusable scratch").
fn with_thread_fft<R>(padded_len: usize, f: impl FnOnce(&FftEngine) -> R) -> R {
    THREAD_FFT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let rebuild = !matches!(&*slot, Some(engine) if engine.len() == padded_len);
        if rebuild {
            *slot = Some(FftEngine::new(padded_len));
        }
        f(slot.as_ref().expect("just populated"))
    })
}

/// Score `input` against every template in `library` surviving the
/// filters in `cfg`, in parallel, returning matches sorted by
/// `(-rlap_ccc, template_name)` (spec §4.F).
pub fn score_library<'a>(
    input: &ProcessedSpectrum,
    library: &'a TemplateLibrary,
    grid: &Grid,
    cfg: &ScoringConfig,
    cancel: &CancelToken,
    progress: Option<ProgressSink>,
    trace: &mut Trace,
) -> Result<Vec<Match<'a>>> {
    let start = std::time::Instant::now();

    let mut query = library.query();
    if let Some(types) = &cfg.type_filter {
        query = query.type_filter(types.iter().cloned());
    }
    if let Some(names) = &cfg.template_filter {
        query = query.template_filter(names.iter().cloned());
    }
    if !cfg.exclude_templates.is_empty() {
        query = query.exclude_templates(cfg.exclude_templates.iter().cloned());
    }
    if cfg.age_min.is_some() || cfg.age_max.is_some() {
        query = query.age_range(cfg.age_min, cfg.age_max);
    }

    let candidates: Vec<&'a Template> = query.iter().collect();
    if candidates.is_empty() {
        return Err(Error::NoEligibleTemplates(
            "no templates survived the configured filters".into(),
        ));
    }

    let total = candidates.len();
    let completed = AtomicUsize::new(0);
    let padded_len = grid.padded_len();

    let results: Vec<Option<Match<'a>>> = candidates
        .par_iter()
        .map(|&template| {
            if cancel.is_cancelled() {
                return None;
            }
            let correlation = with_thread_fft(padded_len, |fft| correlate(input, template, grid, fft, cfg));
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(sink) = &progress {
                let _ = sink.try_send(ProgressEvent { completed: done, total, phase: "scoring" });
            }
            Some(Match::from_correlation(template, correlation))
        })
        .collect();

    trace.record_timing("score", start.elapsed());

    let mut matches: Vec<Match<'a>> = results.into_iter().flatten().collect();

    if cancel.is_cancelled() {
        for m in &matches {
            trace.push_info(
                "score",
                format!(
                    "partial match before cancellation: {} z={:.5} rlap_ccc={:.3} accepted={}",
                    m.template.name, m.z_best, m.rlap_ccc, m.accepted
                ),
            );
        }
        return Err(Error::Cancelled {
            completed: matches.len(),
            total,
            trace: std::mem::take(trace),
        });
    }

    trace.push_info("score", format!("scored {} of {} candidate templates", matches.len(), total));

    matches.sort_by(|a, b| {
        b.rlap_ccc
            .partial_cmp(&a.rlap_ccc)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.template.name.cmp(&b.template.name))
    });
    Ok(matches)
}
