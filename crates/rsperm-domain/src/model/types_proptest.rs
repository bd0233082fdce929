//! Property-based tests for model types and rule parsing.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{parse_rule, PermissionCategory, Resource, RuleExpr};

    /// Strategy to generate multi-word check names in lower case
    fn check_name_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z]{1,8}", 1..4).prop_map(|words| words.join(" "))
    }

    proptest! {
        #[test]
        fn test_check_name_parses_to_single_check(name in check_name_strategy()) {
            let rule = parse_rule(&name);
            prop_assert!(rule.is_ok(), "Failed for name: {}", name);
            prop_assert_eq!(rule.unwrap(), RuleExpr::Check(name));
        }

        #[test]
        fn test_and_over_or_precedence_holds_for_any_names(
            a in check_name_strategy(),
            b in check_name_strategy(),
            c in check_name_strategy()
        ) {
            let text = format!("{a} OR {b} AND {c}");
            let expected = RuleExpr::or(
                RuleExpr::check(a.clone()),
                RuleExpr::and(RuleExpr::check(b.clone()), RuleExpr::check(c.clone())),
            );
            prop_assert_eq!(parse_rule(&text).unwrap(), expected);
        }

        #[test]
        fn test_canonical_text_reparses_to_same_tree(
            a in check_name_strategy(),
            b in check_name_strategy()
        ) {
            let rule = parse_rule(&format!("NOT {a} AND ({b} OR {a})")).unwrap();
            prop_assert_eq!(parse_rule(&rule.to_string()).unwrap(), rule);
        }

        #[test]
        fn test_resource_display_uses_id(
            type_name in "[a-z]{1,10}",
            id in "[a-z0-9]{1,10}"
        ) {
            let resource = Resource::with_id(&type_name, &id);
            prop_assert_eq!(
                resource.to_string(),
                format!("PersistentResource {{ type={type_name}, id={id} }}")
            );
        }

        #[test]
        fn test_custom_category_is_upper_cased(name in "[a-z]{7,12}") {
            let category: PermissionCategory = name.parse().unwrap();
            prop_assert_eq!(category.to_string(), name.to_uppercase());
        }
    }
}
