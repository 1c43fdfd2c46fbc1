//! Runtime values produced by evaluating configuration expressions.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A configuration value.
///
/// `Unknown` stands for a value that will only be known after apply, such as
/// a computed attribute of a resource that has not been created yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. Integers are kept exactly up to 2^53.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered list.
    List(Vec<Value>),
    /// An object with string keys.
    Map(BTreeMap<String, Value>),
    /// A value not known until apply.
    Unknown,
}

impl Value {
    /// Converts a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to JSON, or `None` if any part of the value is unknown.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Option<Vec<_>>>()?,
            ),
            Self::Map(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    let _ = out.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(out)
            }
            Self::Unknown => return None,
        })
    }

    /// Converts to JSON, replacing unknown parts with `null`.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        match self {
            Self::Unknown => serde_json::Value::Null,
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json_lossy).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                    .collect(),
            ),
            other => other.to_json().unwrap_or(serde_json::Value::Null),
        }
    }

    /// Returns true if no part of the value is unknown.
    pub fn is_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) => items.iter().all(Self::is_known),
            Self::Map(map) => map.values().all(Self::is_known),
            _ => true,
        }
    }

    /// Returns true for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the value's type, for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "object",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the string contents of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the entries of a `Map` value.
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up an attribute of a `Map` value.
    ///
    /// Attributes of an unknown value are themselves unknown.
    pub fn get_attr(&self, name: &str) -> Option<Self> {
        match self {
            Self::Map(m) => m.get(name).cloned(),
            Self::Unknown => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Renders the value as it would be written in configuration.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::String(s) => {
                let _ = write!(out, "{s:?}");
            }
            Self::Unknown => out.push_str("(known after apply)"),
            Self::List(items) if items.is_empty() => out.push_str("[]"),
            Self::List(items) => {
                out.push_str("[\n");
                for item in items {
                    push_indent(out, indent + 1);
                    item.render_into(out, indent + 1);
                    out.push_str(",\n");
                }
                push_indent(out, indent);
                out.push(']');
            }
            Self::Map(map) if map.is_empty() => out.push_str("{}"),
            Self::Map(map) => {
                out.push_str("{\n");
                let width = map.keys().map(String::len).max().unwrap_or(0);
                for (k, v) in map {
                    push_indent(out, indent + 1);
                    let _ = write!(out, "{k:<width$} = ");
                    v.render_into(out, indent + 1);
                    out.push('\n');
                }
                push_indent(out, indent);
                out.push('}');
            }
        }
    }

    /// Renders a primitive value for string interpolation.
    ///
    /// Returns `None` for collections, which cannot be interpolated.
    pub fn interpolate(&self) -> Option<String> {
        match self {
            Self::Null => Some(String::new()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(format_number(*n)),
            Self::String(s) => Some(s.clone()),
            Self::List(_) | Self::Map(_) | Self::Unknown => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

/// Formats a number without a trailing `.0` for integral values.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_conversion_keeps_integers() {
        let v = Value::from_json(&serde_json::json!({"count": 3, "ratio": 0.5, "tags": ["a"]}));
        let back = v.to_json().expect("known value");
        assert_eq!(back, serde_json::json!({"count": 3, "ratio": 0.5, "tags": ["a"]}));
    }

    #[test]
    fn unknown_parts_block_json_conversion() {
        let mut m = BTreeMap::new();
        let _ = m.insert("id".to_string(), Value::Unknown);
        let v = Value::Map(m);
        assert!(!v.is_known());
        assert!(v.to_json().is_none());
        assert_eq!(v.to_json_lossy(), serde_json::json!({"id": null}));
    }

    #[test]
    fn render_nested_map() {
        let mut m = BTreeMap::new();
        let _ = m.insert("a".to_string(), Value::Number(1.0));
        let _ = m.insert("long".to_string(), Value::from("x"));
        assert_eq!(Value::Map(m).render(), "{\n  a    = 1\n  long = \"x\"\n}");
    }

    #[test]
    fn interpolate_primitives_only() {
        assert_eq!(Value::Number(2.5).interpolate().as_deref(), Some("2.5"));
        assert_eq!(Value::Bool(true).interpolate().as_deref(), Some("true"));
        assert!(Value::List(vec![]).interpolate().is_none());
    }

    #[test]
    fn attributes_of_unknown_are_unknown() {
        assert_eq!(Value::Unknown.get_attr("id"), Some(Value::Unknown));
        assert_eq!(Value::Null.get_attr("id"), None);
    }
}
