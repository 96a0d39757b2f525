//! A from-scratch 2-D Gaussian Mixture Model: full 2x2 covariance via
//! `glam::DMat2`, deterministic farthest-point initialization (no RNG, so
//! a pre-sorted point set always seeds the same way), and BIC-based model
//! selection over a range of component counts (spec §4.G step 2).

use glam::{DMat2, DVec2};

const MAX_EM_ITERS: usize = 50;
const COV_REGULARIZATION: f64 = 1e-6;

/// One fitted mixture component.
#[derive(Debug, Clone, Copy)]
pub struct GmmComponent {
    pub weight: f64,
    pub mean: DVec2,
    pub cov: DMat2,
}

/// The result of fitting one value of `K`.
#[derive(Debug, Clone)]
pub struct GmmFit {
    pub components: Vec<GmmComponent>,
    /// Hard assignment (argmax responsibility) for each input point.
    pub assignments: Vec<usize>,
    pub log_likelihood: f64,
    pub bic: f64,
}

/// Fit a `k`-component mixture to `points`, weighted by `weights`.
/// `points` must already be in the caller's canonical order: seeding is
/// a deterministic function of that order, not of any RNG.
pub fn fit_gmm(points: &[DVec2], weights: &[f64], k: usize) -> GmmFit {
    let n = points.len();
    let k = k.clamp(1, n.max(1));

    let init_var = initial_variance(points);
    let mut components: Vec<GmmComponent> = init_centroids(points, k)
        .into_iter()
        .map(|mean| GmmComponent {
            weight: 1.0 / k as f64,
            mean,
            cov: DMat2::from_diagonal(DVec2::splat(init_var)),
        })
        .collect();

    let total_weight: f64 = weights.iter().sum::<f64>().max(1e-12);
    let mut responsibilities = vec![vec![0.0f64; k]; n];

    for _ in 0..MAX_EM_ITERS {
        for i in 0..n {
            let mut denom = 0.0;
            for (c, comp) in components.iter().enumerate() {
                let p = gaussian_density(points[i], comp.mean, comp.cov) * comp.weight;
                responsibilities[i][c] = p;
                denom += p;
            }
            if denom <= 0.0 {
                responsibilities[i].iter_mut().for_each(|v| *v = 1.0 / k as f64);
            } else {
                responsibilities[i].iter_mut().for_each(|v| *v /= denom);
            }
        }

        for c in 0..k {
            let mut w_sum = 0.0f64;
            let mut mean = DVec2::ZERO;
            for i in 0..n {
                let w = responsibilities[i][c] * weights[i];
                w_sum += w;
                mean += w * points[i];
            }
            if w_sum <= 1e-9 {
                continue;
            }
            mean /= w_sum;

            let mut cov = DMat2::ZERO;
            for i in 0..n {
                let w = responsibilities[i][c] * weights[i];
                let d = points[i] - mean;
                cov += outer_product(d) * w;
            }
            cov *= 1.0 / w_sum;
            cov += DMat2::from_diagonal(DVec2::splat(COV_REGULARIZATION));

            components[c].mean = mean;
            components[c].cov = cov;
            components[c].weight = w_sum / total_weight;
        }
    }

    let assignments = (0..n)
        .map(|i| {
            (0..k)
                .max_by(|&a, &b| responsibilities[i][a].partial_cmp(&responsibilities[i][b]).unwrap())
                .unwrap_or(0)
        })
        .collect();

    let log_likelihood = log_likelihood(points, weights, &components);
    let free_params = (k as f64) * 6.0 - 1.0; // mean(2)+cov(3) per component, weights sum to 1
    let bic = -2.0 * log_likelihood + free_params * (n.max(1) as f64).ln();

    GmmFit { components, assignments, log_likelihood, bic }
}

/// Fit every `k` in `1..=k_max` (capped at `points.len()`) and keep the
/// lowest-BIC result.
pub fn select_k(points: &[DVec2], weights: &[f64], k_max: usize) -> GmmFit {
    let max_k = k_max.clamp(1, points.len().max(1));
    (1..=max_k)
        .map(|k| fit_gmm(points, weights, k))
        .min_by(|a, b| a.bic.partial_cmp(&b.bic).unwrap())
        .expect("max_k >= 1 guarantees at least one candidate fit")
}

fn outer_product(d: DVec2) -> DMat2 {
    DMat2::from_cols(DVec2::new(d.x * d.x, d.x * d.y), DVec2::new(d.x * d.y, d.y * d.y))
}

fn gaussian_density(x: DVec2, mean: DVec2, cov: DMat2) -> f64 {
    let det = cov.determinant();
    if det <= 1e-12 {
        return 0.0;
    }
    let d = x - mean;
    let exponent = -0.5 * d.dot(cov.inverse() * d);
    let norm = 1.0 / (2.0 * std::f64::consts::PI * det.sqrt());
    norm * exponent.exp()
}

fn log_likelihood(points: &[DVec2], weights: &[f64], components: &[GmmComponent]) -> f64 {
    points
        .iter()
        .zip(weights)
        .map(|(&p, &w)| {
            let mix: f64 = components.iter().map(|c| gaussian_density(p, c.mean, c.cov) * c.weight).sum();
            w * mix.max(1e-300).ln()
        })
        .sum()
}

fn initial_variance(points: &[DVec2]) -> f64 {
    if points.is_empty() {
        return 1.0;
    }
    let n = points.len() as f64;
    let mean = points.iter().fold(DVec2::ZERO, |acc, &p| acc + p) / n;
    let var = points.iter().map(|p| (*p - mean).length_squared()).sum::<f64>() / n;
    var.max(1e-6)
}

/// Deterministic farthest-point seeding: first centroid is `points[0]`,
/// each subsequent centroid is the point farthest (by squared distance)
/// from every centroid chosen so far.
fn init_centroids(points: &[DVec2], k: usize) -> Vec<DVec2> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut centroids = vec![points[0]];
    while centroids.len() < k && centroids.len() < points.len() {
        let next = *points
            .iter()
            .max_by(|a, b| {
                let da = min_dist_sq(a, &centroids);
                let db = min_dist_sq(b, &centroids);
                da.partial_cmp(&db).unwrap()
            })
            .unwrap();
        centroids.push(next);
    }
    centroids
}

fn min_dist_sq(point: &DVec2, centroids: &[DVec2]) -> f64 {
    centroids.iter().map(|c| (*point - *c).length_squared()).fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (Vec<DVec2>, Vec<f64>) {
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(DVec2::new(i as f64 * 0.01, 0.0));
        }
        for i in 0..10 {
            points.push(DVec2::new(5.0 + i as f64 * 0.01, 0.0));
        }
        let weights = vec![1.0; points.len()];
        (points, weights)
    }

    #[test]
    fn test_bic_prefers_two_components_for_two_blobs() {
        let (points, weights) = two_blobs();
        let fit = select_k(&points, &weights, 4);
        assert_eq!(fit.components.len(), 2, "BIC should select 2 components for two well-separated blobs");
    }

    #[test]
    fn test_assignments_match_blob_membership() {
        let (points, weights) = two_blobs();
        let fit = fit_gmm(&points, &weights, 2);
        let first_blob_label = fit.assignments[0];
        for &a in &fit.assignments[0..10] {
            assert_eq!(a, first_blob_label);
        }
        let second_blob_label = fit.assignments[10];
        assert_ne!(first_blob_label, second_blob_label);
        for &a in &fit.assignments[10..20] {
            assert_eq!(a, second_blob_label);
        }
    }

    #[test]
    fn test_deterministic_seeding_is_order_independent_of_shuffling_inputs_given_same_sorted_order() {
        let (points, weights) = two_blobs();
        let fit_a = fit_gmm(&points, &weights, 2);
        let fit_b = fit_gmm(&points, &weights, 2);
        for (a, b) in fit_a.assignments.iter().zip(fit_b.assignments.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_single_component_fits_one_blob() {
        let points: Vec<DVec2> = (0..20).map(|i| DVec2::new(i as f64 * 0.001, 0.0)).collect();
        let weights = vec![1.0; points.len()];
        let fit = select_k(&points, &weights, 3);
        assert_eq!(fit.components.len(), 1);
    }
}
