use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, named `<area>.<entity>.<action>`
/// (e.g. `"restaurant.tables.status"`).
///
/// A granted permission may be the full wildcard `"*"` or a prefix wildcard
/// such as `"treasury.*"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix('*') {
            Some(prefix) if prefix.ends_with('.') => required.as_str().starts_with(prefix),
            _ => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
