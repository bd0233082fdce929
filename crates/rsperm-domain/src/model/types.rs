//! Core type definitions for permission evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of operation being authorized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionCategory {
    Read,
    Create,
    Update,
    Delete,
    /// A user-defined category, stored upper-cased.
    Custom(String),
}

impl PermissionCategory {
    /// Creates a user-defined category.
    pub fn custom(name: impl AsRef<str>) -> Self {
        Self::Custom(name.as_ref().to_uppercase())
    }

    /// Returns the upper-case name used in diagnostics.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "READ",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionCategory {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("permission category cannot be empty");
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "read" => Self::Read,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::custom(trimmed),
        })
    }
}

/// Stable identity of a resource within one request.
///
/// Persisted resources are identified by type and id. Resources without an id
/// (not yet created) are identified by their instance handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceIdentity {
    Persisted { type_name: String, id: String },
    Transient { type_name: String, instance: Uuid },
}

/// Handle to the data resource a permission is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    type_name: String,
    id: Option<String>,
    #[serde(default = "Uuid::new_v4")]
    instance: Uuid,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl Resource {
    /// Creates a resource handle that has not been assigned an id yet.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: None,
            instance: Uuid::new_v4(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a handle for a persisted resource.
    pub fn with_id(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(type_name)
        }
    }

    /// Adds an attribute checks may inspect.
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Returns the identity used to key cached check results.
    pub fn identity(&self) -> ResourceIdentity {
        match &self.id {
            Some(id) => ResourceIdentity::Persisted {
                type_name: self.type_name.clone(),
                id: id.clone(),
            },
            None => ResourceIdentity::Transient {
                type_name: self.type_name.clone(),
                instance: self.instance,
            },
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PersistentResource {{ type={}, id={} }}",
            self.type_name,
            self.id.as_deref().unwrap_or("null")
        )
    }
}

/// Description of a single field change staged on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSpec {
    pub resource: Resource,
    pub field: String,
    pub original: serde_json::Value,
    pub modified: serde_json::Value,
}

impl ChangeSpec {
    pub fn new(
        resource: Resource,
        field: impl Into<String>,
        original: serde_json::Value,
        modified: serde_json::Value,
    ) -> Self {
        Self {
            resource,
            field: field.into(),
            original,
            modified,
        }
    }

    /// Returns the hashable form of this change used in cache keys.
    pub fn key(&self) -> ChangeKey {
        ChangeKey {
            field: self.field.clone(),
            original: self.original.to_string(),
            modified: self.modified.to_string(),
        }
    }
}

impl fmt::Display for ChangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChangeSpec {{ resource={}, field={}, original={}, modified={}}}",
            self.resource,
            self.field,
            ValueDisplay(&self.original),
            ValueDisplay(&self.modified)
        )
    }
}

/// Hashable projection of a [`ChangeSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeKey {
    pub field: String,
    pub original: String,
    pub modified: String,
}

/// Renders JSON values the way diagnostics expect: strings unquoted.
struct ValueDisplay<'a>(&'a serde_json::Value);

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// The principal a request is evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl User {
    /// Returns a user with no name and no roles.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
