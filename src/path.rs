//! Dot-path helpers. Prefixes carry their trailing dot (`"aBar."`), so an
//! empty prefix needs no special casing anywhere.

/// Join a prefix with a field name: `prefixed("a.", "x")` → `"a.x"`.
pub fn prefixed(prefix: &str, field: &str) -> String {
    format!("{}{}", prefix, field)
}

/// `$`-reference to a prefixed field: `field_ref("a.", "x")` → `"$a.x"`.
pub fn field_ref(prefix: &str, field: &str) -> String {
    format!("${}{}", prefix, field)
}

/// Extend a prefix by one segment: `child_prefix("a.", "b")` → `"a.b."`.
pub fn child_prefix(prefix: &str, segment: &str) -> String {
    format!("{}{}.", prefix, segment)
}
