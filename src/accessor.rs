//! Typed accessors mapping resolved treatments to behaviors.
use std::{collections::HashMap, sync::Arc};

use crate::{rule_store::TreatmentResolver, rules::fold_case, ArcStr, Error, Result};

/// Function-valued behavior taking `Args` (use a tuple for several arguments).
pub type Function<Args, R> = Arc<dyn Fn(Args) -> R + Send + Sync>;

type Behavior<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Accessor resolving the behavior of a feature for a differentiator.
///
/// Create one with [`FeatureToggleAccessorBuilder`] or
/// [`RuleStore::create_feature`](crate::RuleStore::create_feature).
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use doppler_toggle::RuleStore;
/// let store = Arc::new(RuleStore::from_url("https://example.com/features.json"));
/// let accessor = store
///     .create_feature::<bool>("Boolean")
///     .add_value("Enabled", true)
///     .add_value("Disabled", false)
///     .set_default_treatment("Disabled")
///     .build()
///     .unwrap();
///
/// // Nothing has been fetched yet, so the default treatment applies.
/// assert_eq!(accessor.get("user-id").unwrap(), false);
/// ```
pub struct FeatureToggleAccessor<T> {
    resolver: Arc<dyn TreatmentResolver>,
    feature_name: ArcStr,
    default_treatment: ArcStr,
    forced_treatment: Option<ArcStr>,
    /// Keyed by case-folded treatment name.
    behaviors: Arc<HashMap<String, Behavior<T>>>,
}

impl<T> Clone for FeatureToggleAccessor<T> {
    fn clone(&self) -> Self {
        FeatureToggleAccessor {
            resolver: Arc::clone(&self.resolver),
            feature_name: self.feature_name.clone(),
            default_treatment: self.default_treatment.clone(),
            forced_treatment: self.forced_treatment.clone(),
            behaviors: Arc::clone(&self.behaviors),
        }
    }
}

impl<T> FeatureToggleAccessor<T> {
    /// Feature this accessor resolves.
    pub fn feature_name(&self) -> &ArcStr {
        &self.feature_name
    }

    /// Treatment used when no rule applies.
    pub fn default_treatment(&self) -> &ArcStr {
        &self.default_treatment
    }

    /// Treatment that overrides rule resolution, if any.
    pub fn forced_treatment(&self) -> Option<&ArcStr> {
        self.forced_treatment.as_ref()
    }

    /// Resolve the feature behavior for `differentiator`.
    ///
    /// A forced treatment wins without consulting the resolver. Otherwise the treatment comes
    /// from the resolver, falling back to the default treatment.
    ///
    /// # Errors
    ///
    /// - [`Error::UnregisteredTreatment`] if the rules resolved a treatment with no registered
    ///   behavior. The rule document references a treatment this code doesn't know about; this
    ///   is a deployment mismatch and is never replaced with the default.
    pub fn get(&self, differentiator: &str) -> Result<T> {
        let treatment = match &self.forced_treatment {
            Some(forced) => forced.clone(),
            None => self.resolver.resolve_treatment(
                &self.feature_name,
                differentiator,
                self.default_treatment.clone(),
            ),
        };

        match self.behaviors.get(&*fold_case(&treatment)) {
            Some(behavior) => Ok(behavior()),
            None => {
                log::error!(target: "doppler_toggle",
                            feature_name:display = self.feature_name,
                            treatment:display = treatment,
                            differentiator;
                            "no behavior registered for treatment");
                Err(Error::UnregisteredTreatment {
                    feature: self.feature_name.clone(),
                    treatment,
                    differentiator: differentiator.to_owned(),
                })
            }
        }
    }
}

impl<Args, R> FeatureToggleAccessor<Function<Args, R>> {
    /// Resolve the function for `differentiator` and apply it to `args`.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use doppler_toggle::{Function, RuleStore};
    /// let store = Arc::new(RuleStore::from_url("https://example.com/features.json"));
    /// let greeting = store
    ///     .create_feature::<Function<(&str, &str), String>>("Greeting")
    ///     .add_function("English", |(first, last): (&str, &str)| format!("Hello {first} {last}"))
    ///     .add_function("Spanish", |(first, last): (&str, &str)| format!("Hola {first} {last}"))
    ///     .set_default_treatment("English")
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(greeting.call("user-id", ("Ada", "Lovelace")).unwrap(), "Hello Ada Lovelace");
    /// ```
    pub fn call(&self, differentiator: &str, args: Args) -> Result<R> {
        let function = self.get(differentiator)?;
        Ok(function(args))
    }
}

/// Builder for [`FeatureToggleAccessor`].
///
/// Treatment names are matched ignoring case. Registering the same treatment twice replaces the
/// previous behavior.
pub struct FeatureToggleAccessorBuilder<T> {
    resolver: Arc<dyn TreatmentResolver>,
    feature_name: ArcStr,
    behaviors: HashMap<String, Behavior<T>>,
    default_treatment: Option<ArcStr>,
    forced_treatment: Option<ArcStr>,
}

impl<T> FeatureToggleAccessorBuilder<T> {
    /// Start building an accessor for `feature_name` resolved through `resolver`.
    pub fn new(
        resolver: Arc<dyn TreatmentResolver>,
        feature_name: impl Into<ArcStr>,
    ) -> FeatureToggleAccessorBuilder<T> {
        FeatureToggleAccessorBuilder {
            resolver,
            feature_name: feature_name.into(),
            behaviors: HashMap::new(),
            default_treatment: None,
            forced_treatment: None,
        }
    }

    /// Register a behavior producing the value for `treatment`.
    pub fn add_behavior(
        mut self,
        treatment: &str,
        behavior: impl Fn() -> T + Send + Sync + 'static,
    ) -> FeatureToggleAccessorBuilder<T> {
        self.behaviors
            .insert(fold_case(treatment).into_owned(), Arc::new(behavior));
        self
    }

    /// Register a fixed value for `treatment`.
    pub fn add_value(self, treatment: &str, value: T) -> FeatureToggleAccessorBuilder<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.add_behavior(treatment, move || value.clone())
    }

    /// Set the treatment used when no rule applies. Required.
    pub fn set_default_treatment(
        mut self,
        treatment: impl Into<ArcStr>,
    ) -> FeatureToggleAccessorBuilder<T> {
        self.default_treatment = Some(treatment.into());
        self
    }

    /// Force `treatment` for every differentiator, bypassing the rules. `None` or an empty name
    /// leaves the treatment unforced.
    pub fn force_treatment_if_some(
        mut self,
        treatment: Option<&str>,
    ) -> FeatureToggleAccessorBuilder<T> {
        self.forced_treatment = treatment.filter(|t| !t.is_empty()).map(ArcStr::from);
        self
    }

    /// Validate the configuration and build the accessor.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingDefaultTreatment`] if no default treatment was set.
    /// - [`Error::DefaultTreatmentMismatch`] if the default treatment has no behavior.
    /// - [`Error::ForcedTreatmentMismatch`] if the forced treatment has no behavior.
    pub fn build(self) -> Result<FeatureToggleAccessor<T>> {
        let default_treatment = self
            .default_treatment
            .ok_or(Error::MissingDefaultTreatment)?;

        if !self
            .behaviors
            .contains_key(&*fold_case(&default_treatment))
        {
            return Err(Error::DefaultTreatmentMismatch);
        }

        if let Some(forced) = &self.forced_treatment {
            if !self.behaviors.contains_key(&*fold_case(forced)) {
                return Err(Error::ForcedTreatmentMismatch);
            }
        }

        Ok(FeatureToggleAccessor {
            resolver: self.resolver,
            feature_name: self.feature_name,
            default_treatment,
            forced_treatment: self.forced_treatment,
            behaviors: Arc::new(self.behaviors),
        })
    }
}

impl<Args: 'static, R: 'static> FeatureToggleAccessorBuilder<Function<Args, R>> {
    /// Register a function-valued behavior for `treatment`.
    pub fn add_function(
        self,
        treatment: &str,
        function: impl Fn(Args) -> R + Send + Sync + 'static,
    ) -> FeatureToggleAccessorBuilder<Function<Args, R>> {
        let function: Function<Args, R> = Arc::new(function);
        self.add_behavior(treatment, move || Arc::clone(&function))
    }
}
