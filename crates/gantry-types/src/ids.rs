//! Strongly-typed identifiers for Gantry resources
//!
//! Resource names are caller-chosen string keys, wrapped in a newtype for
//! type safety. Remote-assigned IDs stay plain strings: they are opaque to
//! Gantry and never participate in desired/remote matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a declared resource, unique per resource kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ResourceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_bare_name() {
        let name = ResourceName::new("orders-api");
        assert_eq!(name.to_string(), "orders-api");
        assert_eq!(name.as_str(), "orders-api");
    }
}
