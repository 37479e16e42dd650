//! Scope parsing and validation.
//!
//! Scopes arrive as a space-delimited string of URIs. Matching is exact:
//! no partial credit, no wildcards, no prefix matching.

use std::collections::BTreeSet;

/// Set of granted scope URIs.
pub type ScopeSet = BTreeSet<String>;

/// Splits a provider scope string on whitespace into a set.
pub fn parse_scopes(scope: &str) -> ScopeSet {
    scope.split_whitespace().map(str::to_string).collect()
}

/// True iff every required scope is a member of `granted`.
///
/// An empty requirement is trivially satisfied.
pub fn has_scopes<S: AsRef<str>>(granted: &ScopeSet, required: &[S]) -> bool {
    required.iter().all(|scope| granted.contains(scope.as_ref()))
}

/// Parses a comma or whitespace separated list from a query parameter.
pub fn parse_scope_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
