//! The cluster selector (spec §4.G): type-aware GMM clustering of accepted
//! matches in `(z, log(rlap_ccc))` space, winner selection, and consensus
//! redshift/age/subtype estimates.

pub mod gmm;

use crate::library::TypeName;
use crate::score::Match;
use crate::trace::Trace;
use glam::DVec2;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Knobs for clustering (spec §6).
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub rlap_ccc_threshold: f32,
    pub k_max: usize,
    pub min_cluster_size: usize,
    pub alpha_z: f32,
    pub alpha_age: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            rlap_ccc_threshold: 1.8,
            k_max: 5,
            min_cluster_size: 3,
            alpha_z: 50.0,
            alpha_age: 0.05,
        }
    }
}

/// A group of mutually consistent matches of one type (spec §3 "Cluster").
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    pub type_name: TypeName,
    pub members: Vec<Match<'a>>,
    pub z_mean: f32,
    pub z_sigma: f32,
    pub age_mean: f32,
    pub age_sigma: f32,
    pub top_subtype: Option<String>,
    pub quality_score: f32,
}

/// Partition accepted matches by type, fit a GMM per eligible type, score
/// every resulting cluster candidate, and return the global winner plus
/// the type/subtype fractions computed over its members.
pub fn select_cluster<'a>(
    matches: &[Match<'a>],
    cfg: &ClusteringConfig,
    trace: &mut Trace,
) -> (Option<Cluster<'a>>, HashMap<TypeName, f32>, HashMap<String, f32>) {
    let start = std::time::Instant::now();

    let mut by_type: HashMap<TypeName, Vec<Match<'a>>> = HashMap::new();
    for m in matches.iter().filter(|m| m.accepted) {
        by_type.entry(m.template.type_name.clone()).or_default().push(*m);
    }

    let mut candidates: Vec<Cluster<'a>> = Vec::new();
    let mut type_names: Vec<TypeName> = by_type.keys().cloned().collect();
    type_names.sort();

    for type_name in type_names {
        let mut members = by_type.remove(&type_name).unwrap();
        if members.len() < cfg.min_cluster_size {
            continue;
        }
        // Deterministic order for k-means++ seeding (spec §8 property 8):
        // the same match set always produces the same initial centroids
        // regardless of the library's internal iteration order.
        members.sort_by(|a, b| {
            a.template
                .name
                .cmp(&b.template.name)
                .then_with(|| a.template.age_days.partial_cmp(&b.template.age_days).unwrap())
        });

        let points: Vec<DVec2> = members
            .iter()
            .map(|m| DVec2::new(m.z_best as f64, (m.rlap_ccc.max(1e-6) as f64).ln()))
            .collect();
        let weights: Vec<f64> = members.iter().map(|m| m.rlap_ccc as f64).collect();

        let fit = gmm::select_k(&points, &weights, cfg.k_max);
        trace.push_info(
            "cluster",
            format!("type {}: selected {} GMM component(s) by BIC", type_name, fit.components.len()),
        );

        for component in 0..fit.components.len() {
            let component_members: Vec<Match<'a>> = fit
                .assignments
                .iter()
                .enumerate()
                .filter(|&(_, &assigned)| assigned == component)
                .map(|(i, _)| members[i])
                .collect();
            if component_members.len() < cfg.min_cluster_size {
                continue;
            }
            if let Some(cluster) = build_cluster(type_name.clone(), component_members, cfg) {
                candidates.push(cluster);
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.members.len().cmp(&a.members.len()))
            .then_with(|| a.type_name.cmp(&b.type_name))
    });

    trace.record_timing("cluster", start.elapsed());

    match candidates.into_iter().next() {
        Some(winner) => {
            let type_fractions = weighted_fraction_map(&winner.members, |m| Some(m.template.type_name.clone()));
            let subtype_fractions = weighted_fraction_map(&winner.members, |m| m.template.subtype.clone());
            (Some(winner), type_fractions, subtype_fractions)
        }
        None => {
            trace.push_info("cluster", "no candidate cluster met the quality threshold");
            (None, HashMap::new(), HashMap::new())
        }
    }
}

fn build_cluster<'a>(type_name: TypeName, members: Vec<Match<'a>>, cfg: &ClusteringConfig) -> Option<Cluster<'a>> {
    let score: f32 = members.iter().map(|m| m.rlap_ccc).sum();
    if score < cfg.rlap_ccc_threshold {
        return None;
    }

    let (z_mean, z_sigma) = weighted_mean_std(members.iter().map(|m| (m.z_best, m.rlap_ccc)));
    let (age_mean, age_sigma) = weighted_mean_std(members.iter().map(|m| (m.template.age_days, m.rlap_ccc)));
    let tightness = 1.0 / (1.0 + z_sigma * cfg.alpha_z + age_sigma * cfg.alpha_age);
    let quality_score = score * tightness;
    let top_subtype = best_subtype(&members);

    Some(Cluster { type_name, members, z_mean, z_sigma, age_mean, age_sigma, top_subtype, quality_score })
}

fn weighted_mean_std(pairs: impl Iterator<Item = (f32, f32)> + Clone) -> (f32, f32) {
    let total_w: f32 = pairs.clone().map(|(_, w)| w).sum();
    if total_w <= 0.0 {
        return (0.0, 0.0);
    }
    let mean: f32 = pairs.clone().map(|(v, w)| v * w).sum::<f32>() / total_w;
    let var: f32 = pairs.map(|(v, w)| w * (v - mean).powi(2)).sum::<f32>() / total_w;
    (mean, var.sqrt())
}

fn best_subtype(members: &[Match<'_>]) -> Option<String> {
    let mut sums: HashMap<String, (f32, usize)> = HashMap::new();
    for m in members {
        if let Some(sub) = &m.template.subtype {
            let entry = sums.entry(sub.clone()).or_insert((0.0, 0));
            entry.0 += m.rlap_ccc;
            entry.1 += 1;
        }
    }
    let mut entries: Vec<(String, f32, usize)> = sums.into_iter().map(|(k, (s, c))| (k, s, c)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.into_iter().next().map(|(name, _, _)| name)
}

/// Fraction of total `rlap_ccc` weight attributable to each key returned
/// by `key_of`, over `members`. Members whose key is `None` are excluded
/// from both the numerator and denominator.
fn weighted_fraction_map<K, F>(members: &[Match<'_>], key_of: F) -> HashMap<K, f32>
where
    K: std::hash::Hash + Eq,
    F: Fn(&Match<'_>) -> Option<K>,
{
    let mut sums: HashMap<K, f32> = HashMap::new();
    let mut total = 0.0f32;
    for m in members {
        if let Some(key) = key_of(m) {
            *sums.entry(key).or_insert(0.0) += m.rlap_ccc;
            total += m.rlap_ccc;
        }
    }
    if total > 0.0 {
        for v in sums.values_mut() {
            *v /= total;
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{FftEngine, Grid};
    use crate::library::Template;

    fn make_template(grid: &Grid, name: &str, type_name: &str, subtype: Option<&str>, age: f32) -> Template {
        let engine = FftEngine::new(grid.padded_len());
        Template::from_flat_flux(
            name.into(),
            TypeName::new(type_name),
            subtype.map(String::from),
            age,
            0.0,
            1.0,
            vec![0.0; grid.n],
            &engine,
        )
    }

    fn synthetic_match<'a>(template: &'a Template, z: f32, rlap_ccc: f32, accepted: bool) -> Match<'a> {
        Match {
            template,
            z_best: z,
            z_err: 0.001,
            lag_pixels: 0.0,
            rlap: rlap_ccc,
            lap: 0.9,
            ccc: Some(1.0),
            rlap_ccc,
            corr_peak: rlap_ccc,
            corr_sigma: 1.0,
            accepted,
        }
    }

    #[test]
    fn test_no_cluster_below_min_size() {
        let grid = Grid::default_grid();
        let templates: Vec<Template> = (0..2).map(|i| make_template(&grid, &format!("t{}", i), "Ia", None, 0.0)).collect();
        let matches: Vec<Match> = templates.iter().map(|t| synthetic_match(t, 0.01, 5.0, true)).collect();
        let cfg = ClusteringConfig::default();
        let mut trace = Trace::new();
        let (winner, _, _) = select_cluster(&matches, &cfg, &mut trace);
        assert!(winner.is_none());
    }

    #[test]
    fn test_no_cluster_below_quality_threshold() {
        let grid = Grid::default_grid();
        let templates: Vec<Template> = (0..5).map(|i| make_template(&grid, &format!("t{}", i), "Ia", None, 0.0)).collect();
        let matches: Vec<Match> = templates.iter().map(|t| synthetic_match(t, 0.01, 0.1, true)).collect();
        let cfg = ClusteringConfig::default();
        let mut trace = Trace::new();
        let (winner, type_fractions, subtype_fractions) = select_cluster(&matches, &cfg, &mut trace);
        assert!(winner.is_none());
        assert!(type_fractions.is_empty());
        assert!(subtype_fractions.is_empty());
    }

    #[test]
    fn test_tight_cluster_wins_with_fractions() {
        let grid = Grid::default_grid();
        let templates: Vec<Template> = (0..6)
            .map(|i| make_template(&grid, &format!("t{}", i), "Ia", Some("91T"), i as f32))
            .collect();
        let matches: Vec<Match> = templates.iter().map(|t| synthetic_match(t, 0.02, 3.0, true)).collect();
        let cfg = ClusteringConfig::default();
        let mut trace = Trace::new();
        let (winner, type_fractions, subtype_fractions) = select_cluster(&matches, &cfg, &mut trace);
        let winner = winner.expect("six tightly-agreeing matches should form a cluster");
        assert_eq!(winner.type_name, TypeName::new("Ia"));
        assert!((winner.z_mean - 0.02).abs() < 1e-3);
        assert_eq!(winner.top_subtype.as_deref(), Some("91T"));
        assert!((type_fractions[&TypeName::new("Ia")] - 1.0).abs() < 1e-6);
        assert!((subtype_fractions["91T"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejected_matches_are_excluded() {
        let grid = Grid::default_grid();
        let templates: Vec<Template> = (0..6).map(|i| make_template(&grid, &format!("t{}", i), "Ia", None, 0.0)).collect();
        let matches: Vec<Match> = templates
            .iter()
            .enumerate()
            .map(|(i, t)| synthetic_match(t, 0.02, 3.0, i < 3))
            .collect();
        let cfg = ClusteringConfig::default();
        let mut trace = Trace::new();
        let (winner, _, _) = select_cluster(&matches, &cfg, &mut trace);
        // Only 3 accepted matches survive; exactly at min_cluster_size, should still cluster.
        assert!(winner.is_some());
        assert_eq!(winner.unwrap().members.len(), 3);
    }
}
