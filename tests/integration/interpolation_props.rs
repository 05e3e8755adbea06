//! Property tests for `{{name}}` interpolation.

use proptest::prelude::*;
use rest_workbench::variables::{interpolate, VariableScope, VariableStore};

fn store_with(pairs: &[(&str, &str)]) -> VariableStore {
    let mut store = VariableStore::new();
    for (name, value) in pairs {
        store.set(VariableScope::Global, *name, *value, "").unwrap();
    }
    store
}

proptest! {
    #[test]
    fn test_text_without_markers_is_unchanged(text in "[^{}]{0,80}") {
        let store = store_with(&[("a", "1")]);
        prop_assert_eq!(interpolate(&text, &store), text);
    }

    #[test]
    fn test_defined_variable_is_substituted(
        prefix in "[a-z/:.]{0,20}",
        name in "[a-zA-Z][a-zA-Z0-9_]{0,15}",
        value in "[a-zA-Z0-9 ._-]{0,30}",
        suffix in "[a-z/?=&]{0,20}",
    ) {
        let store = store_with(&[(name.as_str(), value.as_str())]);
        let template = format!("{}{{{{{}}}}}{}", prefix, name, suffix);
        prop_assert_eq!(interpolate(&template, &store), format!("{}{}{}", prefix, value, suffix));
    }

    #[test]
    fn test_undefined_marker_is_kept(name in "[a-zA-Z][a-zA-Z0-9_]{0,15}") {
        let store = VariableStore::new();
        let template = format!("https://host/{{{{{}}}}}/x", name);
        prop_assert_eq!(interpolate(&template, &store), template);
    }

    #[test]
    fn test_substituted_values_are_not_rescanned(inner in "[a-z]{1,10}") {
        prop_assume!(inner != "outer");
        let marker = format!("{{{{{}}}}}", inner);
        let store = store_with(&[("outer", marker.as_str()), (inner.as_str(), "resolved")]);
        let result = interpolate("{{outer}}", &store);
        prop_assert_eq!(result, marker);
    }
}
