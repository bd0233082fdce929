//! Builds the permission dictionary from configuration.

use rsperm_domain::check::Role;
use rsperm_domain::model::parse_rule;
use rsperm_domain::{EntityBinding, EntityDictionary, PermissionCategory};

use crate::config::{CheckSettings, ConfigLoadError, PolicySettings};

/// Binds every configured check and entity into an [`EntityDictionary`].
///
/// Every rule is parsed once here so that malformed rules and rules naming
/// unconfigured checks fail at load time. The dictionary stores the text as
/// written; it is compiled again when a decision first needs it.
pub fn dictionary_from_settings(policy: &PolicySettings) -> Result<EntityDictionary, ConfigLoadError> {
    let mut dictionary = EntityDictionary::new();

    for (name, check) in &policy.checks {
        let role = match check {
            CheckSettings::Allow => Role::all(),
            CheckSettings::Deny => Role::none(),
            CheckSettings::Role { role } => Role::has(role.clone()),
        };
        dictionary = dictionary.with_check(name.clone(), role);
    }

    for entity in &policy.entities {
        let mut binding = EntityBinding::new(entity.name.clone());
        for (category, rule) in &entity.permissions {
            binding = binding.permission(parse_category(&entity.name, category)?, rule.clone());
        }
        for (field, rules) in &entity.fields {
            binding = binding.field(field.clone());
            for (category, rule) in rules {
                binding = binding.field_permission(
                    field.clone(),
                    parse_category(&entity.name, category)?,
                    rule.clone(),
                );
            }
        }
        dictionary.add_entity(binding);
    }

    validate_rules(policy, &dictionary)?;
    Ok(dictionary)
}

fn validate_rules(policy: &PolicySettings, dictionary: &EntityDictionary) -> Result<(), ConfigLoadError> {
    let known = dictionary.check_names();

    for entity in &policy.entities {
        let entity_rules = entity
            .permissions
            .iter()
            .map(|(category, rule)| (format!("permissions.{category}"), rule));
        let field_rules = entity.fields.iter().flat_map(|(field, rules)| {
            rules
                .iter()
                .map(move |(category, rule)| (format!("fields.{field}.{category}"), rule))
        });

        for (location, text) in entity_rules.chain(field_rules) {
            let location = format!("policy.entities.{}.{location}", entity.name);
            let rule = parse_rule(text).map_err(|err| ConfigLoadError::Invalid {
                message: format!("{location}: {err}"),
            })?;
            if let Some(unknown) = rule.check_names().into_iter().find(|name| !known.contains(name)) {
                return Err(ConfigLoadError::Invalid {
                    message: format!(
                        "{location}: unknown check '{unknown}' (configured checks: {})",
                        known.join(", ")
                    ),
                });
            }
        }
    }

    Ok(())
}

fn parse_category(entity: &str, category: &str) -> Result<PermissionCategory, ConfigLoadError> {
    category
        .parse::<PermissionCategory>()
        .map_err(|err| ConfigLoadError::Invalid {
            message: format!("policy.entities.{entity}: {err}"),
        })
}
