//! The provider interface.
//!
//! A provider owns a family of resource types, named by prefix: the
//! `local` provider implements `local_file`, the `null` provider
//! implements `null_resource`. The engine talks to providers only through
//! the [`Provider`] trait, passing attribute objects as [`Value`] maps.

pub mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod null;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use mantle_common::diagnostics::Diagnostics;
use mantle_common::value::Value;

use crate::error::ProviderError;

/// Providers available to a command, keyed by provider name.
pub type ProviderMap = BTreeMap<String, Arc<dyn Provider>>;

/// Flags describing one attribute of a resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeSchema {
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider when the object is created.
    pub computed: bool,
    /// Hidden in human output.
    pub sensitive: bool,
    /// Changing the value replaces the object.
    pub force_new: bool,
}

impl AttributeSchema {
    /// A required argument.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            required: true,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
        }
    }

    /// An optional argument.
    #[must_use]
    pub const fn optional() -> Self {
        Self {
            required: false,
            optional: true,
            computed: false,
            sensitive: false,
            force_new: false,
        }
    }

    /// An attribute decided by the provider.
    #[must_use]
    pub const fn computed() -> Self {
        Self {
            required: false,
            optional: false,
            computed: true,
            sensitive: false,
            force_new: false,
        }
    }

    /// Marks the attribute as replacing the object when changed.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Marks the attribute as sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Returns true if configuration may set the attribute.
    pub const fn is_configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// Attributes of one resource or data source type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Attributes by name.
    pub attributes: BTreeMap<String, AttributeSchema>,
}

impl Schema {
    /// Builds a schema from `(name, attribute)` pairs.
    pub fn new<'a>(attributes: impl IntoIterator<Item = (&'a str, AttributeSchema)>) -> Self {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(name, attr)| (name.to_string(), attr))
                .collect(),
        }
    }

    /// Names of sensitive attributes.
    pub fn sensitive_attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.sensitive)
            .map(|(name, _)| name.as_str())
    }
}

/// Every type a provider implements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSchema {
    /// Managed resource types.
    pub resources: BTreeMap<String, Schema>,
    /// Data source types.
    pub data_sources: BTreeMap<String, Schema>,
}

/// Input to [`Provider::plan_resource_change`].
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    /// Resource type.
    pub type_name: &'a str,
    /// Current attributes, or `None` when the object does not exist yet.
    pub prior: Option<&'a Value>,
    /// Evaluated configuration. May contain unknowns.
    pub config: &'a Value,
}

/// Output of [`Provider::plan_resource_change`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    /// Predicted attributes after apply. Computed values not yet decided
    /// are [`Value::Unknown`].
    pub planned: Value,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<String>,
}

/// Input to [`Provider::apply_resource_change`].
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    /// Resource type.
    pub type_name: &'a str,
    /// Current attributes, or `None` to create.
    pub prior: Option<&'a Value>,
    /// Desired attributes, or `None` to delete.
    pub planned: Option<&'a Value>,
}

/// A plugin that manages resources of some types.
///
/// Implementations must be usable from several apply threads at once.
pub trait Provider: Send + Sync {
    /// Provider name, the prefix of its resource types.
    fn name(&self) -> &str;

    /// Provider version, recorded by `init`.
    fn version(&self) -> &str;

    /// Types and attributes the provider implements.
    fn schema(&self) -> ProviderSchema;

    /// Checks an evaluated configuration beyond what the schema expresses.
    fn validate_resource_config(&self, _type_name: &str, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    /// Predicts the result of applying `config` on top of `prior`.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown or the change is invalid.
    fn plan_resource_change(&self, req: PlanRequest<'_>) -> Result<PlannedChange, ProviderError> {
        let schema = self.schema();
        let Some(resource) = schema.resources.get(req.type_name) else {
            return Err(unsupported(self.name(), req.type_name));
        };
        Ok(plan_with_schema(resource, req.prior, req.config))
    }

    /// Creates, updates, or deletes an object.
    ///
    /// Returns the new attributes, or `None` once the object is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote operation fails.
    fn apply_resource_change(&self, req: ApplyRequest<'_>) -> Result<Option<Value>, ProviderError>;

    /// Reads the current attributes of an object.
    ///
    /// Returns `None` if the object no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be read.
    fn read_resource(&self, type_name: &str, current: &Value) -> Result<Option<Value>, ProviderError>;

    /// Reads an existing object by ID so it can be brought under management.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be imported.
    fn import_resource(&self, type_name: &str, id: &str) -> Result<Value, ProviderError>;

    /// Reads a data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_data_source(&self, type_name: &str, config: &Value) -> Result<Value, ProviderError>;
}

/// Plans a change from schema flags alone.
///
/// Configured attributes take their configured values. Computed attributes
/// keep their prior values, or become unknown when the object is new or
/// being replaced. A changed `force_new` attribute requires replacement.
pub fn plan_with_schema(schema: &Schema, prior: Option<&Value>, config: &Value) -> PlannedChange {
    let configured = |name: &str| config.get_attr(name).filter(|v| !v.is_null());
    let prior_attr = |name: &str| prior.and_then(|p| p.get_attr(name));

    let requires_replace: Vec<String> = match prior {
        Some(_) => schema
            .attributes
            .iter()
            .filter(|(_, a)| a.force_new && a.is_configurable())
            .filter(|(name, _)| {
                configured(name).unwrap_or(Value::Null) != prior_attr(name).unwrap_or(Value::Null)
            })
            .map(|(name, _)| name.clone())
            .collect(),
        None => Vec::new(),
    };
    let fresh = prior.is_none() || !requires_replace.is_empty();

    let mut planned = BTreeMap::new();
    for (name, attr) in &schema.attributes {
        let value = match configured(name) {
            Some(v) => v,
            None if attr.computed && fresh => Value::Unknown,
            None if attr.computed => prior_attr(name).unwrap_or(Value::Null),
            None => Value::Null,
        };
        let _ = planned.insert(name.clone(), value);
    }
    PlannedChange {
        planned: Value::Map(planned),
        requires_replace,
    }
}

/// Error for a type the provider does not implement.
pub fn unsupported(provider: &str, type_name: &str) -> ProviderError {
    ProviderError::UnsupportedType {
        provider: provider.to_string(),
        type_name: type_name.to_string(),
    }
}

/// The providers compiled into Mantle. Relative paths used by the `local`
/// provider are resolved against `base_dir`.
pub fn builtin_providers(base_dir: &Path) -> ProviderMap {
    let mut map = ProviderMap::new();
    let null: Arc<dyn Provider> = Arc::new(null::NullProvider::new());
    let local: Arc<dyn Provider> = Arc::new(local::LocalProvider::new(base_dir));
    let _ = map.insert(null.name().to_string(), null);
    let _ = map.insert(local.name().to_string(), local);
    map
}
