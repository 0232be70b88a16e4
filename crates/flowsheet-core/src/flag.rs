//! Boolean attribute flags and their schema defaults.
//!
//! Fragment attributes are plain strings. Flags such as `enabled`, `extend`
//! or `impute` accept the XML schema boolean spellings plus a few common
//! synonyms. When a flag is absent (or unreadable) the schema default for the
//! element type applies.

use crate::element::{Tag, attr};

/// Schema version assumed when a `Model` does not declare one.
pub const DEFAULT_SCHEMA_VERSION: &str = "4.0.0.a";

/// Parse a boolean flag value.
///
/// Accepts `true`/`false`, `1`/`0` and `yes`/`no`, case-insensitively and
/// ignoring surrounding whitespace. Returns `None` for anything else.
///
/// # Examples
///
/// ```
/// use flowsheet_core::flag::parse_flag;
///
/// assert_eq!(parse_flag("true"), Some(true));
/// assert_eq!(parse_flag(" 0 "), Some(false));
/// assert_eq!(parse_flag("maybe"), None);
/// ```
pub fn parse_flag(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") || value == "1" || value.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false")
        || value == "0"
        || value.eq_ignore_ascii_case("no")
    {
        Some(false)
    } else {
        None
    }
}

/// Returns the schema default of the flag `name` on elements tagged `tag`.
///
/// | Element         | Flag                              | Default |
/// |-----------------|-----------------------------------|---------|
/// | `Field`         | `enabled` / `extend`              | true / false |
/// | `Process`       | `enabled` / `extend`              | true / false |
/// | `Process`       | `impute-start` / `cycle-start`    | false   |
/// | `Stream`        | `impute`                          | true    |
/// | `Group`         | `regex`                           | false   |
/// | `Aggregator`    | `enabled`                         | true    |
/// | `ProcessChoice` | `extend`                          | false   |
///
/// Elements not listed are enabled by default and never extend or delete.
pub fn default_flag(tag: &Tag, name: &str) -> bool {
    matches!(
        (tag, name),
        (_, attr::ENABLED) | (Tag::Stream, attr::IMPUTE)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_spellings() {
        for truthy in ["true", "TRUE", "True", "1", "yes", "Yes"] {
            assert_eq!(parse_flag(truthy), Some(true), "{truthy}");
        }
        for falsy in ["false", "FALSE", "0", "no", " no "] {
            assert_eq!(parse_flag(falsy), Some(false), "{falsy}");
        }
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("2"), None);
    }

    #[test]
    fn test_schema_defaults() {
        assert!(default_flag(&Tag::Field, attr::ENABLED));
        assert!(!default_flag(&Tag::Field, attr::EXTEND));
        assert!(default_flag(&Tag::Process, attr::ENABLED));
        assert!(!default_flag(&Tag::Process, attr::EXTEND));
        assert!(!default_flag(&Tag::Process, attr::IMPUTE_START));
        assert!(!default_flag(&Tag::Process, attr::CYCLE_START));
        assert!(default_flag(&Tag::Stream, attr::IMPUTE));
        assert!(!default_flag(&Tag::Group, attr::REGEX));
        assert!(default_flag(&Tag::Aggregator, attr::ENABLED));
        assert!(!default_flag(&Tag::ProcessChoice, attr::EXTEND));
    }
}
