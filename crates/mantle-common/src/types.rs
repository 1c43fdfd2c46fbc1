//! Domain primitive types used across the Mantle workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MantleError, Result};

/// Whether a resource is managed by Mantle or only read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// A `resource` block: created, updated and destroyed by Mantle.
    Managed,
    /// A `data` block: read-only lookups.
    Data,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Address of a resource, e.g. `local_file.motd` or `data.local_file.seed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAddr {
    /// Managed or data.
    pub mode: ResourceMode,
    /// Resource type, e.g. `local_file`.
    pub type_name: String,
    /// Resource name from the configuration.
    pub name: String,
}

impl ResourceAddr {
    /// Creates a managed resource address.
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Creates a data resource address.
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Name of the provider responsible for this resource type.
    pub fn provider(&self) -> &str {
        provider_for_type(&self.type_name)
    }

    /// Returns true for managed resources.
    pub fn is_managed(&self) -> bool {
        self.mode == ResourceMode::Managed
    }

    /// Parses an address from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `type.name` or
    /// `data.type.name` with valid identifiers.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |message: &str| MantleError::InvalidAddress {
            input: input.to_string(),
            message: message.to_string(),
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("an address is required"));
        }
        let parts: Vec<&str> = trimmed.split('.').collect();
        let (mode, type_name, name) = match parts.as_slice() {
            ["data", t, n] => (ResourceMode::Data, *t, *n),
            ["data", _] => return Err(invalid("a data resource address requires a type and a name")),
            [t, n] => (ResourceMode::Managed, *t, *n),
            [_] => return Err(invalid("resource address must have a type and a name")),
            _ => return Err(invalid("too many address segments")),
        };
        if type_name == "var" || type_name == "output" {
            return Err(invalid("only resource addresses are allowed here"));
        }
        if !is_valid_identifier(type_name) || !is_valid_identifier(name) {
            return Err(invalid("address segments must be valid identifiers"));
        }
        Ok(Self {
            mode,
            type_name: type_name.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

impl FromStr for ResourceAddr {
    type Err = MantleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Returns the provider name implied by a resource type.
///
/// The provider is the prefix before the first underscore, or the whole
/// type when it has none.
pub fn provider_for_type(type_name: &str) -> &str {
    type_name.split('_').next().unwrap_or(type_name)
}

/// Returns true if `s` is a valid configuration identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Returns true if `name` may be used as a workspace name.
///
/// Workspace names become directory names, so only URL-safe characters
/// without path separators are allowed.
pub fn is_valid_workspace_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_managed_address() {
        let addr = ResourceAddr::parse("local_file.motd").expect("should parse");
        assert_eq!(addr, ResourceAddr::managed("local_file", "motd"));
        assert_eq!(addr.to_string(), "local_file.motd");
        assert_eq!(addr.provider(), "local");
    }

    #[test]
    fn parse_data_address() {
        let addr: ResourceAddr = "data.local_file.seed".parse().expect("should parse");
        assert_eq!(addr.mode, ResourceMode::Data);
        assert_eq!(addr.to_string(), "data.local_file.seed");
    }

    #[test]
    fn parse_rejects_malformed() {
        for input in ["", "justone", "a.b.c.d", "var.region", "1bad.name", "ok.na me"] {
            assert!(ResourceAddr::parse(input).is_err(), "{input} should fail");
        }
    }

    #[test]
    fn provider_without_underscore_is_type() {
        assert_eq!(provider_for_type("thing"), "thing");
        assert_eq!(provider_for_type("null_resource"), "null");
    }

    #[test]
    fn workspace_names() {
        assert!(is_valid_workspace_name("staging-2"));
        assert!(!is_valid_workspace_name("a/b"));
        assert!(!is_valid_workspace_name(".."));
        assert!(!is_valid_workspace_name("with space"));
        assert!(!is_valid_workspace_name(""));
    }
}
