//! Selection of the extras subset a build actually installs

use std::collections::BTreeSet;

/// Extras names installed by default when a project declares them
pub const DOC_EXTRA_NAMES: &[&str] = &["dev", "docs"];

/// Intersect discovered extras with the doc-relevant set plus any
/// extras the operator explicitly configured for the repository.
/// Matching against the default set is case-insensitive; the names
/// returned keep the manifest's spelling. Output is sorted.
pub fn select_install_extras(
    discovered: &BTreeSet<String>,
    operator_extras: &[String],
) -> Vec<String> {
    let wanted: BTreeSet<String> = DOC_EXTRA_NAMES
        .iter()
        .map(|n| n.to_string())
        .chain(operator_extras.iter().map(|n| n.to_lowercase()))
        .collect();

    discovered
        .iter()
        .filter(|name| wanted.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn default_set_matches_case_insensitively() {
        let discovered = set(&["Docs", "DEV", "test", "lint"]);
        assert_eq!(select_install_extras(&discovered, &[]), vec!["DEV", "Docs"]);
    }

    #[test]
    fn operator_extras_widen_the_selection() {
        let discovered = set(&["docs", "typing", "bench"]);
        let extras = select_install_extras(&discovered, &["typing".to_string()]);
        assert_eq!(extras, vec!["docs", "typing"]);
    }

    #[test]
    fn undeclared_operator_extras_are_ignored() {
        let discovered = set(&["docs"]);
        let extras = select_install_extras(&discovered, &["missing".to_string()]);
        assert_eq!(extras, vec!["docs"]);
    }

    #[test]
    fn empty_discovery_selects_nothing() {
        assert!(select_install_extras(&BTreeSet::new(), &["docs".to_string()]).is_empty());
    }
}
