//! The template store (spec §4.D): a read-only, process-wide library of
//! pre-flattened, pre-FFT'd templates grouped by type, with a merged
//! base/user index and a query builder for filtered scoring.

mod codec;
mod index;

pub use index::{LibraryIndex, TypeBucketSource};

use crate::error::{Error, Result};
use crate::grid::{l2_norm, FftEngine, Grid};
use num_complex::Complex32;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A template type label (`"Ia"`, `"II"`, ...). A reserved `"unknown"`
/// sentinel is used by the cluster selector when no cluster wins; the set
/// of real type names is otherwise defined entirely by the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == "unknown"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One reference spectrum, pre-flattened and pre-FFT'd on the shared grid
/// at library build time. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub type_name: TypeName,
    pub subtype: Option<String>,
    pub age_days: f32,
    pub redshift_at_rest: f32,
    pub quality_score: f32,
    pub flat_flux: Vec<f32>,
    pub left_edge: usize,
    pub right_edge: usize,
    pub norm: f32,
    fft: Vec<Complex32>,
}

impl Template {
    /// Build a template from its flattened flux, computing its active
    /// region, L2 norm and cached FFT against `fft_engine`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_flat_flux(
        name: String,
        type_name: TypeName,
        subtype: Option<String>,
        age_days: f32,
        redshift_at_rest: f32,
        quality_score: f32,
        flat_flux: Vec<f32>,
        fft_engine: &FftEngine,
    ) -> Self {
        let left_edge = flat_flux.iter().position(|&v| v != 0.0).unwrap_or(0);
        let right_edge = flat_flux.iter().rposition(|&v| v != 0.0).unwrap_or(0);
        let norm = l2_norm(&flat_flux, left_edge, right_edge);
        let fft = fft_engine.forward(&flat_flux);
        Self {
            name,
            type_name,
            subtype,
            age_days,
            redshift_at_rest,
            quality_score,
            flat_flux,
            left_edge,
            right_edge,
            norm,
            fft,
        }
    }

    /// The precomputed FFT of `flat_flux`, zero-padded to the engine's
    /// length at construction time. Private: only the correlator needs it,
    /// and only via [`Template::fft`].
    pub(crate) fn fft(&self) -> &[Complex32] {
        &self.fft
    }
}

/// A read-only, process-wide library of templates grouped by type.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    buckets: HashMap<TypeName, Vec<Template>>,
}

impl TemplateLibrary {
    /// Load a library from `base_dir`, optionally overridden by
    /// `user_dir`. For any type bucket the user index declares, the base
    /// bucket of that type is not loaded at all (spec §4.D "exactly one
    /// source for X").
    pub fn load(base_dir: &Path, user_dir: Option<&Path>, grid: &Grid) -> Result<Self> {
        let base_index = LibraryIndex::read(base_dir)?;
        let user_index = user_dir.map(LibraryIndex::read).transpose()?;
        let fft_engine = FftEngine::new(grid.padded_len());

        let mut buckets: HashMap<TypeName, Vec<Template>> = HashMap::new();

        for (type_name, source) in &base_index.types {
            if let Some(ui) = &user_index {
                if ui.types.contains_key(type_name) {
                    continue;
                }
            }
            buckets.insert(type_name.clone(), load_bucket(&source.path, &fft_engine)?);
        }
        if let Some(ui) = &user_index {
            for (type_name, source) in &ui.types {
                buckets.insert(type_name.clone(), load_bucket(&source.path, &fft_engine)?);
            }
        }

        validate_uniqueness(&buckets)?;
        Ok(Self { buckets })
    }

    /// Build a library directly from in-memory templates, grouped by
    /// their own `type_name`. Used by tests and by hosts that construct
    /// synthetic libraries without touching disk.
    #[cfg(any(test, feature = "test-support"))]
    pub fn from_templates(templates: Vec<Template>) -> Self {
        let mut buckets: HashMap<TypeName, Vec<Template>> = HashMap::new();
        for t in templates {
            buckets.entry(t.type_name.clone()).or_default().push(t);
        }
        Self { buckets }
    }

    pub fn query(&self) -> TemplateQuery<'_> {
        TemplateQuery {
            library: self,
            type_filter: None,
            template_filter: None,
            exclude_templates: HashSet::new(),
            age_min: None,
            age_max: None,
        }
    }

    pub fn type_names(&self) -> impl Iterator<Item = &TypeName> {
        self.buckets.keys()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_bucket(path: &Path, fft_engine: &FftEngine) -> Result<Vec<Template>> {
    let bytes = std::fs::read(path)?;
    let decoded = codec::decode_bucket(&bytes)?;
    let type_name_from_path = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(TypeName::new)
        .ok_or_else(|| Error::BadInput(format!("unreadable bucket path {}", path.display())))?;

    Ok(decoded
        .records
        .into_iter()
        .map(|rec| {
            let type_name = if rec.type_name.is_empty() {
                type_name_from_path.clone()
            } else {
                TypeName::new(rec.type_name)
            };
            Template::from_flat_flux(
                rec.name,
                type_name,
                rec.subtype,
                rec.age_days,
                0.0,
                rec.quality_score,
                rec.flat_flux,
                fft_engine,
            )
        })
        .collect())
}

/// Spec §4.D: across the whole library, `(name, age_days)` must be unique.
fn validate_uniqueness(buckets: &HashMap<TypeName, Vec<Template>>) -> Result<()> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    for templates in buckets.values() {
        let mut names_in_bucket: HashSet<&str> = HashSet::new();
        for t in templates {
            if !names_in_bucket.insert(&t.name) {
                return Err(Error::BadInput(format!(
                    "duplicate template name '{}' within type bucket",
                    t.name
                )));
            }
            let key = (t.name.clone(), t.age_days.to_bits());
            if !seen.insert(key) {
                return Err(Error::BadInput(format!(
                    "duplicate (name, age_days) across library: '{}' at {} days",
                    t.name, t.age_days
                )));
            }
        }
    }
    Ok(())
}

/// A filter builder over [`TemplateLibrary::query`] (spec §4.D).
pub struct TemplateQuery<'a> {
    library: &'a TemplateLibrary,
    type_filter: Option<HashSet<TypeName>>,
    template_filter: Option<HashSet<String>>,
    exclude_templates: HashSet<String>,
    age_min: Option<f32>,
    age_max: Option<f32>,
}

impl<'a> TemplateQuery<'a> {
    pub fn type_filter(mut self, types: impl IntoIterator<Item = TypeName>) -> Self {
        self.type_filter = Some(types.into_iter().collect());
        self
    }

    pub fn template_filter(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.template_filter = Some(names.into_iter().collect());
        self
    }

    pub fn exclude_templates(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude_templates = names.into_iter().collect();
        self
    }

    pub fn age_range(mut self, age_min: Option<f32>, age_max: Option<f32>) -> Self {
        self.age_min = age_min;
        self.age_max = age_max;
        self
    }

    /// Iterate every template matching every configured filter.
    pub fn iter(&self) -> impl Iterator<Item = &'a Template> + '_ {
        let type_filter = self.type_filter.clone();
        let template_filter = self.template_filter.clone();
        self.library
            .buckets
            .iter()
            .filter(move |(type_name, _)| {
                type_filter.as_ref().map_or(true, |f| f.contains(type_name))
            })
            .flat_map(|(_, templates)| templates.iter())
            .filter(move |t| template_filter.as_ref().map_or(true, |f| f.contains(&t.name)))
            .filter(move |t| !self.exclude_templates.contains(&t.name))
            .filter(move |t| self.age_min.map_or(true, |min| t.age_days >= min))
            .filter(move |t| self.age_max.map_or(true, |max| t.age_days <= max))
    }
}
