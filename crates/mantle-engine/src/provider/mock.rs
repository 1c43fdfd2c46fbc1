//! A scriptable provider for tests.
//!
//! `MockProvider` implements the `test` provider with a `test_instance`
//! resource and a `test_data_source` data source. It records every call
//! and can be told to fail applies, report drift, or answer imports.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mantle_common::diagnostics::{Diagnostic, Diagnostics};
use mantle_common::value::Value;

use super::null::with_attr;
use super::{ApplyRequest, AttributeSchema, PlanRequest, PlannedChange, Provider, ProviderSchema, Schema, unsupported};
use crate::error::ProviderError;

/// Managed type implemented by the mock.
pub const MOCK_RESOURCE: &str = "test_instance";
/// Data source implemented by the mock.
pub const MOCK_DATA_SOURCE: &str = "test_data_source";

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `validate_resource_config`.
    Validate(String),
    /// `plan_resource_change`.
    Plan(String),
    /// `apply_resource_change` with `create`, `update` or `delete`.
    Apply(String, &'static str),
    /// `read_resource`.
    Read(String),
    /// `import_resource` with the requested ID.
    Import(String, String),
    /// `read_data_source`.
    ReadData(String),
}

/// A provider whose behaviour is scripted by the test.
#[derive(Debug, Default)]
pub struct MockProvider {
    calls: Mutex<Vec<MockCall>>,
    next_id: AtomicU64,
    fail_values: Mutex<BTreeSet<String>>,
    invalid_values: Mutex<BTreeSet<String>>,
    read_responses: Mutex<BTreeMap<String, Option<Value>>>,
    import_responses: Mutex<BTreeMap<String, Value>>,
    apply_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    /// Creates a mock with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes applies fail when the planned `value` attribute equals `value`.
    pub fn fail_apply_when_value(&self, value: &str) {
        let _ = guard(&self.fail_values).insert(value.to_string());
    }

    /// Makes validation fail when the configured `value` equals `value`.
    pub fn reject_value(&self, value: &str) {
        let _ = guard(&self.invalid_values).insert(value.to_string());
    }

    /// Scripts the result of reading the object with `id`. `None` means
    /// the object is gone.
    pub fn set_read_response(&self, id: &str, response: Option<Value>) {
        let _ = guard(&self.read_responses).insert(id.to_string(), response);
    }

    /// Scripts the object returned when importing `id`.
    pub fn set_import_response(&self, id: &str, object: Value) {
        let _ = guard(&self.import_responses).insert(id.to_string(), object);
    }

    /// Makes every apply take at least `delay`.
    pub fn set_apply_delay(&self, delay: Duration) {
        *guard(&self.apply_delay) = delay;
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        guard(&self.calls).clone()
    }

    /// Number of applies of the given kind (`create`, `update`, `delete`).
    pub fn apply_count(&self, kind: &str) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| matches!(c, MockCall::Apply(_, k) if *k == kind))
            .count()
    }

    /// Largest number of applies that ran at the same time.
    pub fn max_concurrent_applies(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        guard(&self.calls).push(call);
    }

    fn check_type(&self, type_name: &str, expected: &str) -> Result<(), ProviderError> {
        if type_name == expected {
            Ok(())
        } else {
            Err(unsupported(self.name(), type_name))
        }
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "test"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::default();
        let _ = schema.resources.insert(
            MOCK_RESOURCE.into(),
            Schema::new([
                ("ami", AttributeSchema::optional()),
                ("id", AttributeSchema::computed()),
                ("password", AttributeSchema::optional().sensitive()),
                ("replace_me", AttributeSchema::optional().force_new()),
                ("value", AttributeSchema::optional()),
            ]),
        );
        let _ = schema.data_sources.insert(
            MOCK_DATA_SOURCE.into(),
            Schema::new([
                ("id", AttributeSchema::computed()),
                ("input", AttributeSchema::optional()),
                ("output", AttributeSchema::computed()),
            ]),
        );
        schema
    }

    fn validate_resource_config(&self, type_name: &str, config: &Value) -> Diagnostics {
        self.record(MockCall::Validate(type_name.to_string()));
        let mut diags = Diagnostics::new();
        if let Some(value) = config.get_attr("value").and_then(|v| v.as_str().map(str::to_string)) {
            if guard(&self.invalid_values).contains(&value) {
                diags.push(Diagnostic::error(
                    "Invalid value",
                    format!("The value {value:?} is rejected by the test provider."),
                ));
            }
        }
        diags
    }

    fn plan_resource_change(&self, req: PlanRequest<'_>) -> Result<PlannedChange, ProviderError> {
        self.record(MockCall::Plan(req.type_name.to_string()));
        self.check_type(req.type_name, MOCK_RESOURCE)?;
        let schema = self.schema();
        Ok(super::plan_with_schema(&schema.resources[MOCK_RESOURCE], req.prior, req.config))
    }

    fn apply_resource_change(&self, req: ApplyRequest<'_>) -> Result<Option<Value>, ProviderError> {
        let kind = match (req.prior, req.planned) {
            (_, None) => "delete",
            (None, Some(_)) => "create",
            (Some(_), Some(_)) => "update",
        };
        self.record(MockCall::Apply(req.type_name.to_string(), kind));
        self.check_type(req.type_name, MOCK_RESOURCE)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *guard(&self.apply_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(planned) = req.planned else {
            return Ok(None);
        };
        if let Some(value) = planned.get_attr("value").and_then(|v| v.as_str().map(str::to_string)) {
            if guard(&self.fail_values).contains(&value) {
                return Err(ProviderError::failed(
                    "Test failure",
                    format!("The test provider was told to fail for value {value:?}."),
                ));
            }
        }
        let id = match req.prior.and_then(|p| p.get_attr("id")) {
            Some(id) if id.is_known() && !id.is_null() => id,
            _ => Value::String(format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)),
        };
        Ok(Some(with_attr(planned, "id", id)))
    }

    fn read_resource(&self, type_name: &str, current: &Value) -> Result<Option<Value>, ProviderError> {
        self.record(MockCall::Read(type_name.to_string()));
        self.check_type(type_name, MOCK_RESOURCE)?;
        let id = current.get_attr("id").and_then(|v| v.as_str().map(str::to_string));
        if let Some(response) = id.and_then(|id| guard(&self.read_responses).get(&id).cloned()) {
            return Ok(response);
        }
        Ok(Some(current.clone()))
    }

    fn import_resource(&self, type_name: &str, id: &str) -> Result<Value, ProviderError> {
        self.record(MockCall::Import(type_name.to_string(), id.to_string()));
        self.check_type(type_name, MOCK_RESOURCE)?;
        guard(&self.import_responses).get(id).cloned().ok_or_else(|| {
            ProviderError::failed(
                "Cannot import non-existent remote object",
                format!("The test provider has no object with ID {id:?}."),
            )
        })
    }

    fn read_data_source(&self, type_name: &str, config: &Value) -> Result<Value, ProviderError> {
        self.record(MockCall::ReadData(type_name.to_string()));
        self.check_type(type_name, MOCK_DATA_SOURCE)?;
        let input = config.get_attr("input").unwrap_or(Value::Null);
        Ok(Value::Map(BTreeMap::from([
            ("id".to_string(), Value::String("data".into())),
            ("input".to_string(), input.clone()),
            ("output".to_string(), input),
        ])))
    }
}
