//! Decoding of the rule document into [`RuleSet`].
use serde::Deserialize;

use crate::{
    rules::{Feature, RuleSet, Treatment},
    Result,
};

/// Turns a fetched body into a [`RuleSet`].
///
/// Implementations must not have side effects; the rule store only applies the result if
/// decoding succeeds.
pub trait Decoder: Send + Sync {
    /// Decode `body` into a new rule set.
    fn decode(&self, body: &str) -> Result<RuleSet>;
}

/// Decoder for the JSON rule document:
///
/// ```json
/// {
///   "features": [
///     {
///       "name": "Boolean",
///       "treatments": [
///         { "name": "Enabled", "includedDifferentiators": ["N", "O"] },
///         { "name": "Disabled", "includedDifferentiators": ["P", "Q"] }
///       ]
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, body: &str) -> Result<RuleSet> {
        let document: RuleDocument = serde_json::from_str(body)?;
        Ok(document.into_rule_set())
    }
}

/// Wire representation of the rule document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDocument {
    features: Vec<FeatureDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureDocument {
    name: String,
    #[serde(default)]
    treatments: Vec<TreatmentDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreatmentDocument {
    name: String,
    #[serde(default)]
    included_differentiators: Vec<String>,
}

impl RuleDocument {
    fn into_rule_set(self) -> RuleSet {
        RuleSet::new(self.features.into_iter().map(|feature| {
            Feature::new(
                feature.name,
                feature.treatments.into_iter().map(|treatment| {
                    Treatment::new(treatment.name, treatment.included_differentiators)
                }),
            )
        }))
    }
}
