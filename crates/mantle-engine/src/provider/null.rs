//! The `null` provider: resources that manage nothing.
//!
//! `null_resource` exists only in state and is replaced whenever its
//! `triggers` change. `null_data_source` echoes its `inputs` as `outputs`.

use std::collections::BTreeMap;

use mantle_common::value::Value;

use super::{ApplyRequest, AttributeSchema, Provider, ProviderSchema, Schema, unsupported};
use crate::error::ProviderError;

const RESOURCE: &str = "null_resource";
const DATA_SOURCE: &str = "null_data_source";

/// The built-in `null` provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl NullProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Provider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    fn version(&self) -> &str {
        "3.2.0"
    }

    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::default();
        let _ = schema.resources.insert(
            RESOURCE.into(),
            Schema::new([
                ("id", AttributeSchema::computed()),
                ("triggers", AttributeSchema::optional().force_new()),
            ]),
        );
        let _ = schema.data_sources.insert(
            DATA_SOURCE.into(),
            Schema::new([
                ("id", AttributeSchema::computed()),
                ("inputs", AttributeSchema::optional()),
                ("outputs", AttributeSchema::computed()),
            ]),
        );
        schema
    }

    fn apply_resource_change(&self, req: ApplyRequest<'_>) -> Result<Option<Value>, ProviderError> {
        if req.type_name != RESOURCE {
            return Err(unsupported(self.name(), req.type_name));
        }
        let Some(planned) = req.planned else {
            return Ok(None);
        };
        let id = req
            .prior
            .and_then(|p| p.get_attr("id"))
            .filter(Value::is_known)
            .unwrap_or_else(random_id);
        Ok(Some(with_attr(planned, "id", id)))
    }

    fn read_resource(&self, type_name: &str, current: &Value) -> Result<Option<Value>, ProviderError> {
        if type_name != RESOURCE {
            return Err(unsupported(self.name(), type_name));
        }
        Ok(Some(current.clone()))
    }

    fn import_resource(&self, type_name: &str, id: &str) -> Result<Value, ProviderError> {
        if type_name != RESOURCE {
            return Err(unsupported(self.name(), type_name));
        }
        Ok(Value::Map(BTreeMap::from([
            ("id".to_string(), Value::String(id.to_string())),
            ("triggers".to_string(), Value::Null),
        ])))
    }

    fn read_data_source(&self, type_name: &str, config: &Value) -> Result<Value, ProviderError> {
        if type_name != DATA_SOURCE {
            return Err(unsupported(self.name(), type_name));
        }
        let inputs = config.get_attr("inputs").unwrap_or(Value::Null);
        Ok(Value::Map(BTreeMap::from([
            ("id".to_string(), Value::String("static".into())),
            ("inputs".to_string(), inputs.clone()),
            ("outputs".to_string(), inputs),
        ])))
    }
}

fn random_id() -> Value {
    Value::String(uuid::Uuid::new_v4().as_u64_pair().0.to_string())
}

/// Returns `obj` with one attribute set.
pub(crate) fn with_attr(obj: &Value, name: &str, value: Value) -> Value {
    let mut map = obj.as_map().cloned().unwrap_or_default();
    let _ = map.insert(name.to_string(), value);
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{PlanRequest, plan_with_schema};

    #[test]
    fn create_assigns_numeric_id() {
        let provider = NullProvider::new();
        let config = Value::Map(BTreeMap::new());
        let schema = provider.schema();
        let planned = plan_with_schema(&schema.resources[RESOURCE], None, &config).planned;
        let state = provider
            .apply_resource_change(ApplyRequest {
                type_name: RESOURCE,
                prior: None,
                planned: Some(&planned),
            })
            .expect("apply")
            .expect("created");
        let id = state.get_attr("id").expect("id");
        assert!(id.as_str().expect("string").chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn changed_triggers_force_replacement() {
        let provider = NullProvider::new();
        let prior = Value::Map(BTreeMap::from([
            ("id".to_string(), Value::String("1".into())),
            ("triggers".to_string(), Value::Map(BTreeMap::from([("v".to_string(), Value::Number(1.0))]))),
        ]));
        let config = Value::Map(BTreeMap::from([(
            "triggers".to_string(),
            Value::Map(BTreeMap::from([("v".to_string(), Value::Number(2.0))])),
        )]));
        let change = provider
            .plan_resource_change(PlanRequest {
                type_name: RESOURCE,
                prior: Some(&prior),
                config: &config,
            })
            .expect("plan");
        assert_eq!(change.requires_replace, vec!["triggers".to_string()]);
    }

    #[test]
    fn data_source_echoes_inputs() {
        let config = Value::Map(BTreeMap::from([(
            "inputs".to_string(),
            Value::Map(BTreeMap::from([("k".to_string(), Value::String("v".into()))])),
        )]));
        let out = NullProvider::new().read_data_source(DATA_SOURCE, &config).expect("read");
        assert_eq!(
            out.get_attr("outputs").and_then(|o| o.get_attr("k")),
            Some(Value::String("v".into()))
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(
            NullProvider::new().import_resource("null_thing", "1"),
            Err(ProviderError::UnsupportedType { .. })
        ));
    }
}
