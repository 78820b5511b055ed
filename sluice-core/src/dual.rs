//! Dual-representation responses and the response merger.
//!
//! One logical entity can be read through two API surfaces: the primary
//! (standard, always available, authoritative) and the secondary (enhanced,
//! only available with extra configuration, carries fields the primary
//! lacks). [`merge`] reconciles the two into one view:
//!
//! - `merged` starts as a copy of `primary` (or `secondary` when there is no
//!   primary);
//! - a fixed allowlist of secondary-only fields is copied across, but only
//!   where the merged view has nothing yet;
//! - fields present on both are always taken from `primary`.

use crate::Dataflow;
use serde::{Deserialize, Serialize};

/// Records that can absorb the secondary-only fields of another instance.
pub trait Mergeable: Clone {
    /// Copy every allowlisted secondary-only field from `secondary` that is
    /// still unset on `self`. Returns the names of the fields copied.
    fn absorb_exclusive(&mut self, secondary: &Self) -> Vec<&'static str>;
}

impl Mergeable for Dataflow {
    fn absorb_exclusive(&mut self, secondary: &Self) -> Vec<&'static str> {
        let mut copied = Vec::new();

        if self.trigger_settings.is_none() && secondary.trigger_settings.is_some() {
            self.trigger_settings = secondary.trigger_settings.clone();
            copied.push("trigger_settings");
        }
        if self.engine_properties.is_empty() && !secondary.engine_properties.is_empty() {
            self.engine_properties = secondary.engine_properties.clone();
            copied.push("engine_properties");
        }
        if self.graph.is_none() && secondary.graph.is_some() {
            self.graph = secondary.graph.clone();
            copied.push("graph");
        }
        if self.actions.is_empty() && !secondary.actions.is_empty() {
            self.actions = secondary.actions.clone();
            copied.push("actions");
        }

        copied
    }
}

/// One logical entity as seen through both API representations.
///
/// `merged` is derived by [`merge`] and is never mutated on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualResponse<T> {
    pub primary: Option<T>,
    pub secondary: Option<T>,
    pub merged: Option<T>,
    /// Fields of `merged` that came from `secondary`.
    #[serde(default)]
    pub enhanced_fields: Vec<String>,
}

impl<T> Default for DualResponse<T> {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            merged: None,
            enhanced_fields: Vec::new(),
        }
    }
}

/// Reconcile a primary and a secondary representation.
pub fn merge<T: Mergeable>(primary: Option<T>, secondary: Option<T>) -> DualResponse<T> {
    let (merged, enhanced_fields) = match (&primary, &secondary) {
        (Some(p), Some(s)) => {
            let mut merged = p.clone();
            let copied = merged.absorb_exclusive(s);
            (Some(merged), copied.into_iter().map(str::to_string).collect())
        }
        (Some(p), None) => (Some(p.clone()), Vec::new()),
        (None, Some(s)) => (Some(s.clone()), Vec::new()),
        (None, None) => (None, Vec::new()),
    };

    DualResponse {
        primary,
        secondary,
        merged,
        enhanced_fields,
    }
}

impl<T> DualResponse<T> {
    /// Best available view: merged, then primary, then secondary.
    pub fn best_data(&self) -> Option<&T> {
        self.merged
            .as_ref()
            .or(self.primary.as_ref())
            .or(self.secondary.as_ref())
    }

    /// Consuming variant of [`best_data`](Self::best_data).
    pub fn into_best_data(self) -> Option<T> {
        self.merged.or(self.primary).or(self.secondary)
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Where the data came from, in words.
    pub fn provenance_note(&self) -> String {
        match (self.primary.is_some(), self.secondary.is_some()) {
            (true, true) if self.enhanced_fields.is_empty() => {
                "merged: primary fields; enhanced representation added nothing".to_string()
            }
            (true, true) => format!(
                "merged: primary fields with enhanced-only fields from secondary ({})",
                self.enhanced_fields.join(", ")
            ),
            (true, false) => "primary only: enhanced representation unavailable".to_string(),
            (false, true) => "secondary only: primary representation unavailable".to_string(),
            (false, false) => "no data".to_string(),
        }
    }

    /// Serialization-ready view exposing all three representations.
    pub fn format_for_output(&self) -> FormattedDual<'_, T> {
        FormattedDual {
            primary: self.primary.as_ref(),
            secondary: self.secondary.as_ref(),
            merged: self.merged.as_ref(),
            note: self.provenance_note(),
        }
    }
}

/// Output shape of [`DualResponse::format_for_output`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedDual<'a, T> {
    pub primary: Option<&'a T>,
    pub secondary: Option<&'a T>,
    pub merged: Option<&'a T>,
    pub note: String,
}

// =============================================================================
// TESTS
// =============================================================================
