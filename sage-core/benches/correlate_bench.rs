use criterion::{criterion_group, criterion_main, Criterion};
use sage_core::correlate::correlate;
use sage_core::grid::{FftEngine, Grid};
use sage_core::io::Spectrum;
use sage_core::library::{Template, TypeName};
use sage_core::preproc::{preprocess, PreprocConfig};
use sage_core::score::ScoringConfig;
use sage_core::trace::Trace;

fn gaussian_bump(n: usize, center_frac: f32, width: f32, amplitude: f32) -> Vec<f32> {
    let mut flux = vec![0.0f32; n];
    let center = (n as f32 * center_frac) as usize;
    let half = (width * 4.0) as usize;
    for j in center.saturating_sub(half)..(center + half).min(n) {
        let x = (j as f32 - center as f32) / width;
        flux[j] = amplitude * (-(x * x)).exp();
    }
    flux
}

fn bench_correlate(c: &mut Criterion) {
    let grid = Grid::new(2048, 8.0, 0.0015);
    let engine = FftEngine::new(grid.padded_len());

    let template_flux = gaussian_bump(grid.n, 0.4, 12.0, 1.0);
    let template = Template::from_flat_flux(
        "bench-template".to_string(),
        TypeName::new("Ia"),
        Some("normal".into()),
        0.0,
        0.0,
        1.0,
        template_flux,
        &engine,
    );

    let wave: Vec<f32> = (0..grid.n).map(|i| grid.wavelength_at(i) as f32).collect();
    let flux: Vec<f32> = gaussian_bump(grid.n, 0.42, 12.0, 1.0).into_iter().map(|f| f + 1.0).collect();
    let spectrum = Spectrum { wave, flux };

    let mut trace = Trace::new();
    let processed = preprocess(&spectrum, &grid, &PreprocConfig::default(), &mut trace).unwrap();
    let cfg = ScoringConfig::default();

    c.bench_function("correlate_single_template", |b| {
        b.iter(|| correlate(&processed, &template, &grid, &engine, &cfg))
    });
}

criterion_group!(benches, bench_correlate);
criterion_main!(benches);
