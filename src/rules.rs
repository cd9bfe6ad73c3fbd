//! Immutable rule document model: features, their treatments and the differentiators each
//! treatment applies to.
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
};

use crate::ArcStr;

/// A named variant of a feature together with the differentiators it applies to.
///
/// Both the treatment name and the differentiators are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Treatment {
    name: ArcStr,
    /// Case-folded differentiators.
    included_differentiators: HashSet<String>,
}

impl Treatment {
    /// Create a treatment applying to `included_differentiators`.
    pub fn new<I, S>(name: impl Into<ArcStr>, included_differentiators: I) -> Treatment
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Treatment {
            name: name.into(),
            included_differentiators: included_differentiators
                .into_iter()
                .map(|d| fold_case(d.as_ref()).into_owned())
                .collect(),
        }
    }

    /// Treatment name as declared in the rule document.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Return `true` if `differentiator` is listed under this treatment, ignoring case.
    pub fn includes(&self, differentiator: &str) -> bool {
        self.includes_folded(&fold_case(differentiator))
    }

    fn includes_folded(&self, folded_differentiator: &str) -> bool {
        self.included_differentiators
            .contains(folded_differentiator)
    }

    fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || fold_case(&self.name) == fold_case(name)
    }
}

/// A togglable behavior composed of treatments kept in document declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    name: ArcStr,
    treatments: Vec<Treatment>,
}

impl Feature {
    /// Create a feature from treatments in declaration order.
    ///
    /// Treatment names are unique ignoring case. If a name repeats, the later treatment replaces
    /// the earlier one but keeps its position.
    pub fn new(name: impl Into<ArcStr>, treatments: impl IntoIterator<Item = Treatment>) -> Feature {
        let mut unique: Vec<Treatment> = Vec::new();
        for treatment in treatments {
            match unique.iter_mut().find(|t| t.has_name(&treatment.name)) {
                Some(existing) => *existing = treatment,
                None => unique.push(treatment),
            }
        }

        Feature {
            name: name.into(),
            treatments: unique,
        }
    }

    /// Feature name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Treatments in declaration order.
    pub fn treatments(&self) -> &[Treatment] {
        &self.treatments
    }

    /// Find a treatment by name, ignoring case.
    pub fn treatment(&self, name: &str) -> Option<&Treatment> {
        self.treatments.iter().find(|t| t.has_name(name))
    }

    /// Return the first treatment (in declaration order) that includes `differentiator`.
    pub fn find_treatment(&self, differentiator: &str) -> Option<&Treatment> {
        let folded = fold_case(differentiator);
        self.treatments
            .iter()
            .find(|treatment| treatment.includes_folded(&folded))
    }
}

/// Complete snapshot of all features at a point in time.
///
/// `RuleSet` is never mutated after construction. Feature names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    features: HashMap<ArcStr, Feature>,
}

impl RuleSet {
    /// Create a rule set. If a feature name repeats, the last one wins.
    pub fn new(features: impl IntoIterator<Item = Feature>) -> RuleSet {
        RuleSet {
            features: features
                .into_iter()
                .map(|feature| (feature.name.clone(), feature))
                .collect(),
        }
    }

    /// Create a rule set without features.
    pub fn empty() -> RuleSet {
        RuleSet::default()
    }

    /// Get feature by its exact name.
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    /// Iterate over all feature names.
    pub fn feature_names(&self) -> impl Iterator<Item = &ArcStr> {
        self.features.keys()
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Return `true` if there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Name of the first treatment of `feature_name` that includes `differentiator`, if any.
    pub fn find_treatment(&self, feature_name: &str, differentiator: &str) -> Option<&ArcStr> {
        self.feature(feature_name)?
            .find_treatment(differentiator)
            .map(Treatment::name)
    }
}

/// Fold `s` for case-insensitive comparison, borrowing when it is already folded.
///
/// Every character is lowercased on its own, so the result doesn't depend on its neighbours
/// (unlike `str::to_lowercase`, which maps a final capital sigma to `ς`).
pub(crate) fn fold_case(s: &str) -> Cow<'_, str> {
    if s.bytes().all(|b| !b.is_ascii_uppercase() && b.is_ascii()) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().flat_map(char::to_lowercase).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Feature, RuleSet, Treatment};

    fn boolean_feature() -> Feature {
        Feature::new(
            "Boolean",
            [
                Treatment::new("Enabled", ["N", "O"]),
                Treatment::new("Disabled", ["P", "Q"]),
            ],
        )
    }

    #[test]
    fn differentiators_are_case_insensitive() {
        let treatment = Treatment::new("Enabled", ["Andres", "cristian"]);

        assert!(treatment.includes("andres"));
        assert!(treatment.includes("ANDRES"));
        assert!(treatment.includes("Cristian"));
        assert!(!treatment.includes("Mauro"));
    }

    #[test]
    fn folding_ignores_context_and_titlecase() {
        let treatment = Treatment::new("Enabled", ["ΟΣ", "ǅ"]);

        assert!(treatment.includes("οσ"));
        assert!(treatment.includes("Οσ"));
        assert!(treatment.includes("Ǆ"));
        assert!(treatment.includes("ǆ"));

        let feature = Feature::new("Feature", [Treatment::new("ΝΑΙ_ΟΣ", ["A"])]);
        assert!(feature.treatment("ναι_οσ").is_some());
    }

    #[test]
    fn first_declared_treatment_wins() {
        let feature = Feature::new(
            "Feature",
            [
                Treatment::new("First", ["A", "B"]),
                Treatment::new("Second", ["b", "C"]),
            ],
        );

        assert_eq!(feature.find_treatment("B").unwrap().name(), "First");
        assert_eq!(feature.find_treatment("c").unwrap().name(), "Second");
        assert!(feature.find_treatment("D").is_none());
    }

    #[test]
    fn repeated_treatment_name_keeps_position_and_last_differentiators() {
        let feature = Feature::new(
            "Feature",
            [
                Treatment::new("Enabled", ["A"]),
                Treatment::new("Disabled", ["B"]),
                Treatment::new("ENABLED", ["B", "C"]),
            ],
        );

        assert_eq!(feature.treatments().len(), 2);
        assert_eq!(feature.treatments()[0].name(), "ENABLED");
        assert!(!feature.treatments()[0].includes("A"));
        assert_eq!(feature.find_treatment("B").unwrap().name(), "ENABLED");
        assert!(feature.treatment("enabled").is_some());
    }

    #[test]
    fn feature_names_are_case_sensitive() {
        let rules = RuleSet::new([boolean_feature()]);

        assert_eq!(rules.find_treatment("Boolean", "n").unwrap(), "Enabled");
        assert!(rules.find_treatment("boolean", "n").is_none());
        assert!(rules.find_treatment("Boolean", "unknown").is_none());
    }

    #[test]
    fn repeated_feature_name_last_wins() {
        let rules = RuleSet::new([
            boolean_feature(),
            Feature::new("Boolean", [Treatment::new("Enabled", ["Z"])]),
        ]);

        assert_eq!(rules.len(), 1);
        assert!(rules.find_treatment("Boolean", "N").is_none());
        assert_eq!(rules.find_treatment("Boolean", "Z").unwrap(), "Enabled");
    }

    #[test]
    fn empty_rule_set_finds_nothing() {
        let rules = RuleSet::empty();

        assert!(rules.is_empty());
        assert!(rules.find_treatment("Boolean", "N").is_none());
    }
}
