//! Physical table naming
//!
//! Physical table name = prefix + logical name + suffix. Both parts are
//! configurable and may be empty. Trimming only succeeds for names that carry
//! both the prefix and the suffix, so tables that belong to someone else are
//! never mistaken for declared ones.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNaming {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl TableNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Physical name for a logical table name
    pub fn decorate(&self, logical: &str) -> String {
        let mut name = String::with_capacity(self.prefix.len() + logical.len() + self.suffix.len());
        name.push_str(&self.prefix);
        name.push_str(logical);
        name.push_str(&self.suffix);
        name
    }

    /// Logical name for a physical table name, or `None` when the name is
    /// not decorated with this prefix and suffix.
    pub fn trim<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical
            .strip_suffix(self.suffix.as_str())?
            .strip_prefix(self.prefix.as_str())
    }
}
