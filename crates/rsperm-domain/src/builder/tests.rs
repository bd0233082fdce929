use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::check::{operation_check, user_check, Role};
use crate::dictionary::{EntityBinding, EntityDictionary};
use crate::expression::EvaluationStatus;

fn base_dictionary() -> EntityDictionary {
    EntityDictionary::new()
        .with_check("user has all access", Role::all())
        .with_check("user has no access", Role::none())
}

fn builder(dictionary: EntityDictionary) -> PermissionExpressionBuilder {
    PermissionExpressionBuilder::new(
        Arc::new(ExpressionResultCache::default()),
        Arc::new(dictionary),
    )
}

#[test]
fn test_any_field_expression_text() {
    let builder = builder(base_dictionary().bind_entity(
        EntityBinding::new("model").permission(
            PermissionCategory::Read,
            "user has all access AND user has no access",
        ),
    ));
    let resource = Resource::new("model");

    let expressions = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Read, None)
        .unwrap();

    assert_eq!(
        expressions.commit_expression().to_string(),
        "READ PERMISSION WAS INVOKED ON PersistentResource { type=model, id=null }  \
         FOR EXPRESSION [FIELDS(FAILURE) OR ENTITY(((user has all access WAS UNEVALUATED)) \
         AND ((user has no access WAS UNEVALUATED)))]"
    );

    assert!(!expressions.commit_expression().evaluate().unwrap());

    assert_eq!(
        expressions.commit_expression().to_string(),
        "READ PERMISSION WAS INVOKED ON PersistentResource { type=model, id=null }  \
         FOR EXPRESSION [FIELDS(FAILURE) OR ENTITY(((user has all access PASSED)) \
         AND ((user has no access FAILED)))]"
    );
}

#[test]
fn test_specific_field_expression_text() {
    let builder = builder(
        base_dictionary().bind_entity(
            EntityBinding::new("model")
                .permission(PermissionCategory::Update, "user has no access")
                .field_permission(
                    "foo",
                    PermissionCategory::Update,
                    "user has all access OR user has no access",
                ),
        ),
    );
    let resource = Resource::new("model");
    let change = ChangeSpec::new(resource.clone(), "foo", json!(1), json!(2));

    let expressions = builder
        .build_specific_field_expressions(
            &resource,
            &PermissionCategory::Update,
            "foo",
            Some(&change),
        )
        .unwrap();

    assert_eq!(
        expressions.commit_expression().to_string(),
        "UPDATE PERMISSION WAS INVOKED ON PersistentResource { type=model, id=null } WITH CHANGES ChangeSpec \
         { resource=PersistentResource { type=model, id=null }, field=foo, original=1, \
         modified=2} FOR EXPRESSION [FIELD(((user has all access WAS UNEVALUATED)) OR ((user has no \
         access WAS UNEVALUATED)))]"
    );

    assert!(expressions.commit_expression().evaluate().unwrap());

    assert_eq!(
        expressions.commit_expression().to_string(),
        "UPDATE PERMISSION WAS INVOKED ON PersistentResource { type=model, id=null } WITH CHANGES ChangeSpec \
         { resource=PersistentResource { type=model, id=null }, field=foo, original=1, modified=2} \
         FOR EXPRESSION [FIELD(((user has all access PASSED)) OR ((user has no \
         access WAS UNEVALUATED)))]"
    );
}

#[test]
fn test_any_field_ors_field_rules_with_entity_rule() {
    let builder = builder(
        base_dictionary().bind_entity(
            EntityBinding::new("book")
                .permission(PermissionCategory::Read, "user has no access")
                .field_permission("title", PermissionCategory::Read, "user has no access")
                .field_permission("author", PermissionCategory::Read, "user has all access")
                .field_permission("isbn", PermissionCategory::Update, "user has no access"),
        ),
    );
    let resource = Resource::with_id("book", "1");

    let expressions = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Read, None)
        .unwrap();
    let commit = expressions.commit_expression();

    assert!(commit.evaluate().unwrap());
    // Fields aggregate in name order: author first, so title and the entity
    // rule are never reached.
    assert!(commit.to_string().ends_with(
        "FOR EXPRESSION [FIELDS(((user has all access PASSED)) OR ((user has no access WAS UNEVALUATED))) \
         OR ENTITY((user has no access WAS UNEVALUATED))]"
    ));
}

#[test]
fn test_any_field_without_entity_rule_passes() {
    let builder = builder(base_dictionary().bind_entity(EntityBinding::new("model")));
    let resource = Resource::new("model");

    let expressions = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Delete, None)
        .unwrap();
    assert!(expressions.pre_commit_expression().evaluate().unwrap());
    assert!(expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .ends_with("[FIELDS(FAILURE) OR ENTITY(SUCCESS)]"));
}

#[test]
fn test_specific_field_without_field_rule_uses_entity_rule() {
    let builder = builder(base_dictionary().bind_entity(
        EntityBinding::new("model").permission(PermissionCategory::Update, "user has no access"),
    ));
    let resource = Resource::new("model");

    let expressions = builder
        .build_specific_field_expressions(&resource, &PermissionCategory::Update, "foo", None)
        .unwrap();
    assert!(!expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .ends_with("[ENTITY((user has no access FAILED))]"));
}

#[test]
fn test_specific_field_without_any_rule_passes() {
    let builder = builder(base_dictionary().bind_entity(EntityBinding::new("model").field("foo")));
    let resource = Resource::new("model");

    let expressions = builder
        .build_specific_field_expressions(&resource, &PermissionCategory::Update, "foo", None)
        .unwrap();
    assert!(expressions.pre_commit_expression().evaluate().unwrap());
    assert!(expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .ends_with("[SUCCESS]"));
}

#[test]
fn test_pre_commit_defers_operation_checks() {
    let builder = builder(
        base_dictionary()
            .with_check(
                "value increases",
                operation_check(|ctx| {
                    Ok(ctx
                        .change
                        .map(|change| change.modified.as_i64() > change.original.as_i64())
                        .unwrap_or(false))
                }),
            )
            .bind_entity(EntityBinding::new("model").field_permission(
                "foo",
                PermissionCategory::Update,
                "user has all access AND value increases",
            )),
    );
    let resource = Resource::new("model");
    let change = ChangeSpec::new(resource.clone(), "foo", json!(1), json!(2));

    let expressions = builder
        .build_specific_field_expressions(
            &resource,
            &PermissionCategory::Update,
            "foo",
            Some(&change),
        )
        .unwrap();

    let pre_commit = expressions.pre_commit_expression();
    assert!(pre_commit.evaluate().unwrap());
    assert!(pre_commit
        .to_string()
        .contains("((user has all access PASSED)) AND ((value increases DEFERRED))"));

    let commit = expressions.commit_expression();
    assert!(commit.evaluate().unwrap());
    assert!(commit
        .to_string()
        .contains("((user has all access PASSED)) AND ((value increases PASSED))"));
}

#[test]
fn test_negated_operation_check_does_not_deny_pre_commit() {
    let builder = builder(
        base_dictionary()
            .with_check(
                "is locked",
                operation_check(|ctx| {
                    Ok(ctx
                        .change
                        .map(|change| change.original == json!("locked"))
                        .unwrap_or(false))
                }),
            )
            .bind_entity(EntityBinding::new("model").field_permission(
                "foo",
                PermissionCategory::Update,
                "NOT is locked",
            )),
    );
    let resource = Resource::new("model");

    let open = ChangeSpec::new(resource.clone(), "foo", json!("open"), json!("closed"));
    let expressions = builder
        .build_specific_field_expressions(&resource, &PermissionCategory::Update, "foo", Some(&open))
        .unwrap();
    let pre_commit = expressions.pre_commit_expression();
    assert!(pre_commit.evaluate().unwrap());
    assert_eq!(pre_commit.status(), EvaluationStatus::Deferred);
    assert!(pre_commit
        .to_string()
        .ends_with("[FIELD(NOT ((is locked DEFERRED)))]"));
    assert!(expressions.commit_expression().evaluate().unwrap());

    let locked = ChangeSpec::new(resource.clone(), "foo", json!("locked"), json!("open"));
    let expressions = builder
        .build_specific_field_expressions(&resource, &PermissionCategory::Update, "foo", Some(&locked))
        .unwrap();
    assert!(expressions.pre_commit_expression().evaluate().unwrap());
    assert!(!expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .ends_with("[FIELD(NOT ((is locked PASSED)))]"));
}

#[test]
fn test_pre_commit_still_fails_on_failing_user_check() {
    let builder = builder(
        base_dictionary()
            .with_check("is locked", operation_check(|_| Ok(false)))
            .bind_entity(EntityBinding::new("model").permission(
                PermissionCategory::Update,
                "user has no access AND NOT is locked",
            )),
    );
    let resource = Resource::new("model");

    let expressions = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Update, None)
        .unwrap();
    let pre_commit = expressions.pre_commit_expression();
    assert!(!pre_commit.evaluate().unwrap());
    assert_eq!(pre_commit.status(), EvaluationStatus::Failed);
}

#[test]
fn test_names_bound_to_one_check_share_its_result() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let member: Arc<dyn Check> = Arc::new(user_check(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }));

    let mut dictionary = base_dictionary().bind_entity(
        EntityBinding::new("model")
            .permission(PermissionCategory::Read, "is member AND is participant"),
    );
    dictionary.add_check("is member", Arc::clone(&member));
    dictionary.add_check("is participant", member);
    let builder = builder(dictionary);

    let expressions = builder
        .build_any_field_expressions(&Resource::new("model"), &PermissionCategory::Read, None)
        .unwrap();
    assert!(expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .contains("((is member PASSED)) AND ((is participant PASSED))"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_user_check_runs_once_across_trees() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&runs);
    let builder = builder(
        base_dictionary()
            .with_check(
                "is counted",
                user_check(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }),
            )
            .bind_entity(
                EntityBinding::new("model")
                    .permission(PermissionCategory::Update, "is counted")
                    .field_permission("foo", PermissionCategory::Update, "is counted")
                    .field_permission("bar", PermissionCategory::Update, "is counted"),
            ),
    );
    let resource = Resource::with_id("model", "7");
    let change = ChangeSpec::new(resource.clone(), "foo", json!("a"), json!("b"));

    let any = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Update, None)
        .unwrap();
    let specific = builder
        .build_specific_field_expressions(
            &resource,
            &PermissionCategory::Update,
            "foo",
            Some(&change),
        )
        .unwrap();

    assert!(any.pre_commit_expression().evaluate().unwrap());
    assert!(any.commit_expression().evaluate().unwrap());
    assert!(specific.pre_commit_expression().evaluate().unwrap());
    assert!(specific.commit_expression().evaluate().unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_operation_check_keyed_by_change() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&runs);
    let builder = builder(
        base_dictionary()
            .with_check(
                "change allowed",
                operation_check(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }),
            )
            .bind_entity(EntityBinding::new("model").field_permission(
                "foo",
                PermissionCategory::Update,
                "change allowed",
            )),
    );
    let resource = Resource::with_id("model", "7");
    let first = ChangeSpec::new(resource.clone(), "foo", json!(1), json!(2));
    let second = ChangeSpec::new(resource.clone(), "foo", json!(2), json!(3));

    for change in [&first, &first, &second] {
        let expressions = builder
            .build_specific_field_expressions(
                &resource,
                &PermissionCategory::Update,
                "foo",
                Some(change),
            )
            .unwrap();
        assert!(expressions.commit_expression().evaluate().unwrap());
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unknown_check_fails_compilation() {
    let builder = builder(base_dictionary().bind_entity(
        EntityBinding::new("model").field_permission(
            "foo",
            PermissionCategory::Read,
            "user has all access OR is owner",
        ),
    ));
    let resource = Resource::new("model");

    let err = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Read, None)
        .unwrap_err();
    match err {
        DomainError::InvalidPermissionExpression {
            type_name,
            field,
            category,
            expression,
            source,
        } => {
            assert_eq!(type_name, "model");
            assert_eq!(field.as_deref(), Some("foo"));
            assert_eq!(category, "READ");
            assert_eq!(expression, "user has all access OR is owner");
            assert_eq!(source.message, "unknown check 'is owner'");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_malformed_entity_rule_fails_specific_field_build() {
    let builder = builder(
        base_dictionary().bind_entity(
            EntityBinding::new("model")
                .permission(PermissionCategory::Update, "(user has all access")
                .field_permission("foo", PermissionCategory::Update, "user has all access"),
        ),
    );
    let resource = Resource::new("model");

    let err = builder
        .build_specific_field_expressions(&resource, &PermissionCategory::Update, "foo", None)
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::InvalidPermissionExpression { field: None, .. }
    ));
}

#[test]
fn test_unbound_type_is_rejected() {
    let builder = builder(base_dictionary());
    let err = builder
        .build_any_field_expressions(&Resource::new("ghost"), &PermissionCategory::Read, None)
        .unwrap_err();
    assert!(matches!(err, DomainError::TypeNotFound { type_name } if type_name == "ghost"));
}

#[test]
fn test_custom_category_uses_its_own_rules() {
    let share = PermissionCategory::custom("share");
    let builder = builder(base_dictionary().bind_entity(
        EntityBinding::new("model").permission(share.clone(), "user has all access"),
    ));
    let resource = Resource::new("model");

    let expressions = builder
        .build_any_field_expressions(&resource, &share, None)
        .unwrap();
    assert!(expressions.commit_expression().evaluate().unwrap());
    assert!(expressions
        .commit_expression()
        .to_string()
        .starts_with("SHARE PERMISSION WAS INVOKED ON"));
}

#[test]
fn test_role_check_uses_builder_user() {
    let builder = builder(
        base_dictionary()
            .with_check("is admin", Role::has("admin"))
            .bind_entity(
                EntityBinding::new("model").permission(PermissionCategory::Delete, "is admin"),
            ),
    )
    .with_user(User::named("alice").with_role("admin"));
    let resource = Resource::with_id("model", "1");

    let expressions = builder
        .build_any_field_expressions(&resource, &PermissionCategory::Delete, None)
        .unwrap();
    let commit = expressions.commit_expression();
    assert!(commit.evaluate().unwrap());
    assert_eq!(commit.status(), EvaluationStatus::Passed);
}
