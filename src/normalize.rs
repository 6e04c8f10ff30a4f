//! Normalized keys for nested score-modifier fields.
//!
//! The index addresses modifier values as `<field>.<key>`, so the key derived
//! from a product name at build time must be byte-identical to the key
//! derived from a query at search time. Both sides call [`normalize`].

/// Replace every char outside `[A-Za-z0-9_]` with `_`, then lowercase.
///
/// Each disallowed char (including any non-ASCII char) becomes exactly one
/// underscore; runs are not collapsed.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
