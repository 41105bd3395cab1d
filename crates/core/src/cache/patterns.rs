//! Glob matching for cache keys and namespaces.
//!
//! Patterns support `*` as a wildcard matching any sequence of characters.

use super::keys::namespace_of;

/// Checks if a cache key matches a glob pattern.
///
/// # Examples
///
/// ```
/// use mapro_core::cache::pattern_matches;
///
/// assert!(pattern_matches("count_citizens", "count_citizens"));
/// assert!(pattern_matches("user_roles:*", "user_roles:7f1c0000-0000-0000-0000-000000000000"));
/// assert!(pattern_matches("*_citizens", "all_citizens"));
/// assert!(!pattern_matches("user_roles:*", "system_permissions:42"));
/// ```
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    // Handle edge cases
    if pattern.is_empty() {
        return key.is_empty();
    }

    if pattern == "*" {
        return true;
    }

    // Split pattern by '*' to get segments
    let segments: Vec<&str> = pattern.split('*').collect();

    // If no wildcards, require exact match
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut remaining = key;
    let starts_with_wildcard = pattern.starts_with('*');
    let ends_with_wildcard = pattern.ends_with('*');

    for (i, segment) in segments.iter().enumerate() {
        // Skip empty segments (from adjacent wildcards or leading/trailing *)
        if segment.is_empty() {
            continue;
        }

        let is_first = i == 0;
        let is_last = i == segments.len() - 1;

        if is_first && !starts_with_wildcard {
            // First segment must be at the start of the key
            if !remaining.starts_with(segment) {
                return false;
            }
            remaining = &remaining[segment.len()..];
        } else if is_last && !ends_with_wildcard {
            // Last segment must be at the end of the key
            if !remaining.ends_with(segment) {
                return false;
            }
            // No need to update remaining, we're done
        } else {
            // Middle segment (or first with leading *, or last with trailing *)
            // Just needs to be found somewhere in remaining
            match remaining.find(segment) {
                Some(pos) => {
                    remaining = &remaining[pos + segment.len()..];
                }
                None => return false,
            }
        }
    }

    true
}

/// Returns true if some key in `namespace` could match `pattern`.
///
/// Used to decide which generation counters a pattern deletion must bump.
/// The answer errs on the side of `true`: bumping a namespace that had no
/// matching key only costs an extra recompute.
///
/// # Examples
///
/// ```
/// use mapro_core::cache::pattern_touches_namespace;
///
/// assert!(pattern_touches_namespace("user_roles:*", "user_roles"));
/// assert!(pattern_touches_namespace("count_*", "count_citizens"));
/// assert!(!pattern_touches_namespace("user_roles:*", "system_permissions"));
/// ```
pub fn pattern_touches_namespace(pattern: &str, namespace: &str) -> bool {
    if !pattern.contains('*') {
        return namespace_of(pattern) == namespace;
    }

    // Literal text before the first wildcard
    let literal = pattern.split('*').next().unwrap_or_default();
    match literal.split_once(':') {
        Some((pattern_namespace, _)) => pattern_namespace == namespace,
        None => namespace.starts_with(literal),
    }
}
