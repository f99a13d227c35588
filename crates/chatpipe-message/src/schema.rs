//! Schema version gate for the message record.
//!
//! Semantic-version rules: removals or enum narrowing bump major, additive
//! optional fields or enum values bump minor, documentation-only changes
//! bump patch. Readers reject unknown majors.

use crate::error::MessageError;

/// Current message schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

pub(crate) fn current_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn parse(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Check that data written with `version` can be read by this build.
///
/// Accepts the same major with minor at least `required_minor`; anything
/// else is a loud failure.
///
/// # Errors
///
/// Returns [`MessageError::SchemaVersion`] for malformed or incompatible
/// versions.
pub fn check_schema_compat(version: &str, required_minor: u64) -> Result<(), MessageError> {
    let (cur_major, _, _) = parse(SCHEMA_VERSION).expect("SCHEMA_VERSION is well-formed");
    let Some((major, minor, _)) = parse(version) else {
        return Err(MessageError::SchemaVersion {
            found: version.to_string(),
            expected: SCHEMA_VERSION.to_string(),
        });
    };
    if major != cur_major || minor < required_minor {
        return Err(MessageError::SchemaVersion {
            found: version.to_string(),
            expected: SCHEMA_VERSION.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_major_is_compatible() {
        check_schema_compat("1.0.0", 0).unwrap();
        check_schema_compat("1.7.3", 0).unwrap();
    }

    #[test]
    fn different_major_is_rejected() {
        assert!(check_schema_compat("2.0.0", 0).is_err());
        assert!(check_schema_compat("0.9.0", 0).is_err());
    }

    #[test]
    fn minor_floor_is_enforced() {
        assert!(check_schema_compat("1.0.0", 1).is_err());
        check_schema_compat("1.1.0", 1).unwrap();
    }

    #[test]
    fn malformed_versions_are_rejected() {
        assert!(check_schema_compat("1.0", 0).is_err());
        assert!(check_schema_compat("one.zero.zero", 0).is_err());
        assert!(check_schema_compat("1.0.0.0", 0).is_err());
    }
}
