//! The evaluation scope shared by planning, apply, `output` and `console`.

use std::collections::{BTreeMap, BTreeSet};

use mantle_common::diagnostics::Diagnostics;
use mantle_common::types::ResourceAddr;
use mantle_common::value::Value;
use mantle_config::Config;
use mantle_config::expr::{self, Scope};
use mantle_config::parser::ast::Expr;
use mantle_state::State;

/// Variable values and resource objects visible to expressions.
///
/// A resource that is declared but has no known object yet evaluates to
/// [`Value::Unknown`].
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    variables: BTreeMap<String, Value>,
    resources: BTreeMap<ResourceAddr, Value>,
    declared: BTreeSet<ResourceAddr>,
}

impl EvalScope {
    /// Creates a scope with variables and no resources.
    pub const fn new(variables: BTreeMap<String, Value>) -> Self {
        Self {
            variables,
            resources: BTreeMap::new(),
            declared: BTreeSet::new(),
        }
    }

    /// Creates a scope where configured resources take their values from
    /// `state`.
    pub fn from_state(config: &Config, state: Option<&State>, variables: &BTreeMap<String, Value>) -> Self {
        let mut scope = Self::new(variables.clone());
        for resource in &config.resources {
            scope.declare(resource.addr.clone());
        }
        for resource in state.map(|s| s.resources.as_slice()).unwrap_or_default() {
            scope.set_resource(resource.addr(), resource.value());
        }
        scope
    }

    /// Declares a resource without a value.
    pub fn declare(&mut self, addr: ResourceAddr) {
        let _ = self.declared.insert(addr);
    }

    /// Sets the object value of a resource, declaring it.
    pub fn set_resource(&mut self, addr: ResourceAddr, value: Value) {
        let _ = self.declared.insert(addr.clone());
        let _ = self.resources.insert(addr, value);
    }

    /// Evaluates an expression in this scope.
    ///
    /// # Errors
    ///
    /// Returns diagnostics for invalid references or values.
    pub fn evaluate(&self, expr: &Expr) -> Result<Value, Diagnostics> {
        expr::evaluate(expr, self)
    }
}

impl Scope for EvalScope {
    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn resource(&self, addr: &ResourceAddr) -> Option<Value> {
        match self.resources.get(addr) {
            Some(value) => Some(value.clone()),
            None if self.declared.contains(addr) => Some(Value::Unknown),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use mantle_config::load_sources;
    use mantle_config::parser::parse_expression;
    use mantle_state::ResourceState;

    use super::*;

    #[test]
    fn declared_resource_without_state_is_unknown() {
        let (config, diags) = load_sources(
            Path::new("."),
            BTreeMap::from([("main.mtl".to_string(), "resource \"null_resource\" \"a\" {}\n".to_string())]),
        );
        assert!(!diags.has_errors());
        let scope = EvalScope::from_state(&config, None, &BTreeMap::new());
        let expr = parse_expression("<console>", "null_resource.a.id").expect("parse");
        assert_eq!(scope.evaluate(&expr).expect("eval"), Value::Unknown);
        let missing = parse_expression("<console>", "null_resource.b.id").expect("parse");
        assert!(scope.evaluate(&missing).is_err());
    }

    #[test]
    fn state_values_and_variables_resolve() {
        let config = Config::default();
        let mut state = State::new();
        state.set_resource(ResourceState::new(
            &ResourceAddr::managed("local_file", "f"),
            serde_json::json!({"id": "abc", "filename": "f.txt"}),
        ));
        let vars = BTreeMap::from([("name".to_string(), Value::String("world".into()))]);
        let scope = EvalScope::from_state(&config, Some(&state), &vars);
        let expr = parse_expression("<console>", "\"${var.name}-${local_file.f.id}\"").expect("parse");
        assert_eq!(scope.evaluate(&expr).expect("eval"), Value::String("world-abc".into()));
    }
}
