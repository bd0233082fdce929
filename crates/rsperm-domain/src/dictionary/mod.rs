//! Permission metadata: which rule text is declared where, and which check
//! implementation each check name is bound to.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::check::Check;
use crate::model::PermissionCategory;

/// Read access to declared permission rules and check bindings.
pub trait PermissionDictionary: Send + Sync {
    /// Returns whether the type is known to the dictionary.
    fn is_bound(&self, type_name: &str) -> bool;

    /// Entity-level rule text for a category.
    fn rule_text(&self, type_name: &str, category: &PermissionCategory) -> Option<String>;

    /// Field-level rule text for a category.
    fn field_rule_text(
        &self,
        type_name: &str,
        field: &str,
        category: &PermissionCategory,
    ) -> Option<String>;

    /// Fields of the type that declare their own rule for the category,
    /// in a stable order.
    fn fields_declaring_rule(&self, type_name: &str, category: &PermissionCategory)
        -> Vec<String>;

    /// Check implementation bound to a name.
    fn check(&self, name: &str) -> Option<Arc<dyn Check>>;
}

/// Declared rules for one type.
#[derive(Debug, Clone, Default)]
pub struct EntityBinding {
    type_name: String,
    permissions: HashMap<PermissionCategory, String>,
    fields: BTreeMap<String, HashMap<PermissionCategory, String>>,
}

impl EntityBinding {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Declares the entity-level rule for a category.
    pub fn permission(mut self, category: PermissionCategory, rule: impl Into<String>) -> Self {
        self.permissions.insert(category, rule.into());
        self
    }

    /// Declares a field. Fields without rules still count as declared.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.entry(field.into()).or_default();
        self
    }

    /// Declares a field-level rule for a category.
    pub fn field_permission(
        mut self,
        field: impl Into<String>,
        category: PermissionCategory,
        rule: impl Into<String>,
    ) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(category, rule.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// In-memory [`PermissionDictionary`].
#[derive(Debug, Clone, Default)]
pub struct EntityDictionary {
    entities: HashMap<String, EntityBinding>,
    checks: HashMap<String, Arc<dyn Check>>,
}

impl EntityDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a check implementation to a name.
    pub fn with_check(mut self, name: impl Into<String>, check: impl Check + 'static) -> Self {
        self.add_check(name, Arc::new(check));
        self
    }

    pub fn add_check(&mut self, name: impl Into<String>, check: Arc<dyn Check>) {
        self.checks.insert(normalize_name(&name.into()), check);
    }

    pub fn bind_entity(mut self, binding: EntityBinding) -> Self {
        self.add_entity(binding);
        self
    }

    pub fn add_entity(&mut self, binding: EntityBinding) {
        self.entities.insert(binding.type_name.clone(), binding);
    }

    /// Returns every bound check name.
    pub fn check_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Check names are matched with internal whitespace collapsed.
fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PermissionDictionary for EntityDictionary {
    fn is_bound(&self, type_name: &str) -> bool {
        self.entities.contains_key(type_name)
    }

    fn rule_text(&self, type_name: &str, category: &PermissionCategory) -> Option<String> {
        self.entities
            .get(type_name)?
            .permissions
            .get(category)
            .cloned()
    }

    fn field_rule_text(
        &self,
        type_name: &str,
        field: &str,
        category: &PermissionCategory,
    ) -> Option<String> {
        self.entities
            .get(type_name)?
            .fields
            .get(field)?
            .get(category)
            .cloned()
    }

    fn fields_declaring_rule(
        &self,
        type_name: &str,
        category: &PermissionCategory,
    ) -> Vec<String> {
        self.entities
            .get(type_name)
            .map(|binding| {
                binding
                    .fields
                    .iter()
                    .filter(|(_, rules)| rules.contains_key(category))
                    .map(|(field, _)| field.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check(&self, name: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(&normalize_name(name)).cloned()
    }
}
