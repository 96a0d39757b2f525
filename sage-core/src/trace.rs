//! The diagnostic record threaded through one analysis (spec §4.H).
//!
//! `Trace` is returned to the caller as part of [`crate::result::AnalysisResult`].
//! It is distinct from the `tracing` crate's live spans/events (emitted as the
//! analysis runs, for a host's log sink) — `Trace` is the structured,
//! serializable summary of what happened, keyed by component.

use std::collections::HashMap;
use std::time::Duration;

/// Severity of one recorded decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceLevel {
    Info,
    Warning,
}

/// One recorded decision point or warning, attributed to a component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEvent {
    pub component: String,
    pub level: TraceLevel,
    pub message: String,
}

/// The accumulated diagnostics for one `analyze()` call.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trace {
    pub events: Vec<TraceEvent>,
    #[cfg_attr(feature = "serde", serde(with = "duration_map"))]
    pub timings: HashMap<String, Duration>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_info(&mut self, component: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "sage_core::trace", component, %message);
        self.events.push(TraceEvent {
            component: component.to_string(),
            level: TraceLevel::Info,
            message,
        });
    }

    pub fn push_warning(&mut self, component: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "sage_core::trace", component, %message);
        self.events.push(TraceEvent {
            component: component.to_string(),
            level: TraceLevel::Warning,
            message,
        });
    }

    pub fn record_timing(&mut self, component: &str, elapsed: Duration) {
        self.timings.insert(component.to_string(), elapsed);
    }

    /// All warning-level events, in recording order.
    pub fn warnings(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(|e| e.level == TraceLevel::Warning)
    }
}

#[cfg(feature = "serde")]
mod duration_map {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(map: &HashMap<String, Duration>, s: S) -> Result<S::Ok, S::Error> {
        let as_millis: HashMap<&String, u128> = map.iter().map(|(k, v)| (k, v.as_millis())).collect();
        as_millis.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<String, Duration>, D::Error> {
        let as_millis: HashMap<String, u64> = HashMap::deserialize(d)?;
        Ok(as_millis
            .into_iter()
            .map(|(k, v)| (k, Duration::from_millis(v)))
            .collect())
    }
}
