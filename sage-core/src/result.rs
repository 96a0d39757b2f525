//! Result assembly (spec §4.H): converts the borrowed, lifetime-bound
//! [`crate::score::Match`]/[`crate::cluster::Cluster`] values produced by
//! one analysis into an owned, lifetime-free [`AnalysisResult`].

use crate::cluster::Cluster;
use crate::library::TypeName;
use crate::score::Match;
use crate::trace::Trace;
use std::collections::HashMap;

/// Default cap on [`AnalysisResult::top_matches`] (spec §4.H).
pub const DEFAULT_TOP_K: usize = 10;

/// An owned summary of one match: name and scalar metadata only, never the
/// underlying flux arrays (spec §3 "AnalysisResult owns copies of the data
/// needed to describe its top matches").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchSummary {
    pub template_name: String,
    pub type_name: TypeName,
    pub subtype: Option<String>,
    pub age_days: f32,
    pub z_best: f32,
    pub z_err: f32,
    pub rlap: f32,
    pub lap: f32,
    pub ccc: Option<f32>,
    pub rlap_ccc: f32,
    pub accepted: bool,
}

impl<'a> From<&Match<'a>> for MatchSummary {
    fn from(m: &Match<'a>) -> Self {
        Self {
            template_name: m.template.name.clone(),
            type_name: m.template.type_name.clone(),
            subtype: m.template.subtype.clone(),
            age_days: m.template.age_days,
            z_best: m.z_best,
            z_err: m.z_err,
            rlap: m.rlap,
            lap: m.lap,
            ccc: m.ccc,
            rlap_ccc: m.rlap_ccc,
            accepted: m.accepted,
        }
    }
}

/// An owned summary of the winning cluster (spec §4.G).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterSummary {
    pub type_name: TypeName,
    pub member_count: usize,
    pub z_mean: f32,
    pub z_sigma: f32,
    pub age_mean: f32,
    pub age_sigma: f32,
    pub top_subtype: Option<String>,
    pub quality_score: f32,
    pub members: Vec<MatchSummary>,
}

impl<'a> From<&Cluster<'a>> for ClusterSummary {
    fn from(c: &Cluster<'a>) -> Self {
        Self {
            type_name: c.type_name.clone(),
            member_count: c.members.len(),
            z_mean: c.z_mean,
            z_sigma: c.z_sigma,
            age_mean: c.age_mean,
            age_sigma: c.age_sigma,
            top_subtype: c.top_subtype.clone(),
            quality_score: c.quality_score,
            members: c.members.iter().map(MatchSummary::from).collect(),
        }
    }
}

/// The final, owned outcome of one `analyze()` call (spec §3, §4.H).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisResult {
    /// Always `true` unless the core itself failed (in which case
    /// `analyze()` returns `Err`, not a `success = false` result).
    pub success: bool,
    pub best_type: TypeName,
    pub best_subtype: Option<String>,
    pub best_template_name: Option<String>,
    pub z: f32,
    pub z_err: f32,
    pub age: f32,
    pub age_err: f32,
    pub rlap_best: f32,
    pub top_matches: Vec<MatchSummary>,
    pub filtered_matches: Vec<MatchSummary>,
    pub winning_cluster: Option<ClusterSummary>,
    pub type_fractions: HashMap<TypeName, f32>,
    pub subtype_fractions: HashMap<String, f32>,
    pub trace: Trace,
}

/// Assemble the final result from the scored matches and the selected
/// cluster (spec §4.H). `top_k` caps `top_matches`; `filtered_matches`
/// always carries every match the caller's filters admitted, whether or
/// not it was accepted.
pub fn assemble(
    matches: &[Match<'_>],
    winner: Option<Cluster<'_>>,
    type_fractions: HashMap<TypeName, f32>,
    subtype_fractions: HashMap<String, f32>,
    top_k: usize,
    trace: Trace,
) -> AnalysisResult {
    let filtered_matches: Vec<MatchSummary> = matches.iter().map(MatchSummary::from).collect();

    let mut accepted: Vec<&Match<'_>> = matches.iter().filter(|m| m.accepted).collect();
    accepted.sort_by(|a, b| {
        b.rlap_ccc
            .partial_cmp(&a.rlap_ccc)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.template.name.cmp(&b.template.name))
    });
    let top_matches: Vec<MatchSummary> = accepted.iter().take(top_k).map(|m| MatchSummary::from(*m)).collect();

    let rlap_best = accepted.first().map(|m| m.rlap_ccc).unwrap_or(0.0);

    match winner {
        Some(cluster) => {
            let best_template_name = cluster
                .members
                .iter()
                .max_by(|a, b| a.rlap_ccc.partial_cmp(&b.rlap_ccc).unwrap_or(std::cmp::Ordering::Equal))
                .map(|m| m.template.name.clone());
            AnalysisResult {
                success: true,
                best_type: cluster.type_name.clone(),
                best_subtype: cluster.top_subtype.clone(),
                best_template_name,
                z: cluster.z_mean,
                z_err: cluster.z_sigma,
                age: cluster.age_mean,
                age_err: cluster.age_sigma,
                rlap_best,
                top_matches,
                filtered_matches,
                winning_cluster: Some(ClusterSummary::from(&cluster)),
                type_fractions,
                subtype_fractions,
                trace,
            }
        }
        None => AnalysisResult {
            success: true,
            best_type: TypeName::unknown(),
            best_subtype: None,
            best_template_name: None,
            z: 0.0,
            z_err: 0.0,
            age: 0.0,
            age_err: 0.0,
            rlap_best,
            top_matches,
            filtered_matches,
            winning_cluster: None,
            type_fractions,
            subtype_fractions,
            trace,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{FftEngine, Grid};
    use crate::library::Template;

    fn template(name: &str) -> Template {
        let grid = Grid::default_grid();
        let engine = FftEngine::new(grid.padded_len());
        Template::from_flat_flux(name.to_string(), TypeName::new("Ia"), None, 0.0, 0.0, 1.0, vec![0.0; grid.n], &engine)
    }

    fn synthetic_match(template: &Template, rlap_ccc: f32, accepted: bool) -> Match<'_> {
        Match {
            template,
            z_best: 0.01,
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
    fn test_no_winner_yields_unknown_type() {
        let t = template("t0");
        let matches = vec![synthetic_match(&t, 5.0, true)];
        let trace = Trace::new();
        let result = assemble(&matches, None, HashMap::new(), HashMap::new(), DEFAULT_TOP_K, trace);
        assert!(result.success);
        assert_eq!(result.best_type, TypeName::unknown());
        assert!(result.winning_cluster.is_none());
        assert_eq!(result.rlap_best, 5.0);
    }

    #[test]
    fn test_top_matches_capped_and_filtered_matches_complete() {
        let templates: Vec<Template> = (0..15).map(|i| template(&format!("t{}", i))).collect();
        let matches: Vec<Match> = templates.iter().enumerate().map(|(i, t)| synthetic_match(t, i as f32, true)).collect();
        let trace = Trace::new();
        let result = assemble(&matches, None, HashMap::new(), HashMap::new(), 10, trace);
        assert_eq!(result.top_matches.len(), 10);
        assert_eq!(result.filtered_matches.len(), 15);
        assert_eq!(result.top_matches[0].template_name, "t14");
    }

    #[test]
    fn test_winner_populates_consensus_fields() {
        let t0 = template("t0");
        let t1 = template("t1");
        let members = vec![synthetic_match(&t0, 4.0, true), synthetic_match(&t1, 6.0, true)];
        let cluster = Cluster {
            type_name: TypeName::new("Ia"),
            members: members.clone(),
            z_mean: 0.02,
            z_sigma: 0.001,
            age_mean: 3.0,
            age_sigma: 1.0,
            top_subtype: Some("91T".to_string()),
            quality_score: 9.0,
        };
        let trace = Trace::new();
        let result = assemble(&members, Some(cluster), HashMap::new(), HashMap::new(), DEFAULT_TOP_K, trace);
        assert_eq!(result.best_type, TypeName::new("Ia"));
        assert_eq!(result.best_subtype.as_deref(), Some("91T"));
        assert_eq!(result.best_template_name.as_deref(), Some("t1"));
        assert!((result.z - 0.02).abs() < 1e-6);
    }
}
