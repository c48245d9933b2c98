//! Version Validator - Parses and matches semantic versions
//!
//! Manifest versions and dependency requirements go through this module so
//! that version equality is always structural, never a string comparison.
//!
//! # Example
//!
//! ```
//! use publish_crates::validation::VersionValidator;
//!
//! let validator = VersionValidator::new();
//! let version = validator.parse_version("1.2.3").unwrap();
//! let req = validator.parse_requirement("1.2").unwrap();
//!
//! assert!(validator.satisfies(&version, &req));
//! ```

use semver::{Version, VersionReq};

/// Validator for semantic versioning
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionValidator;

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Parse a manifest `version` field
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use publish_crates::validation::VersionValidator;
    ///
    /// let validator = VersionValidator::new();
    /// assert!(validator.parse_version(" 1.0.0 ").is_ok());
    /// assert!(validator.parse_version("1.0").is_err());
    /// ```
    pub fn parse_version(&self, raw: &str) -> Result<Version, semver::Error> {
        Version::parse(raw.trim())
    }

    /// Parse a dependency requirement using Cargo's rules
    ///
    /// A bare version (`"1.2"`) is a caret requirement (`"^1.2"`).
    pub fn parse_requirement(&self, raw: &str) -> Result<VersionReq, semver::Error> {
        VersionReq::parse(raw.trim())
    }

    /// Check if a version satisfies a requirement
    ///
    /// # Examples
    ///
    /// ```
    /// use publish_crates::validation::VersionValidator;
    /// use semver::{Version, VersionReq};
    ///
    /// let validator = VersionValidator::new();
    /// let req = VersionReq::parse("^1.2.0").unwrap();
    ///
    /// assert!(validator.satisfies(&Version::parse("1.2.5").unwrap(), &req));
    /// assert!(!validator.satisfies(&Version::parse("2.0.0").unwrap(), &req));
    /// ```
    pub fn satisfies(&self, version: &Version, req: &VersionReq) -> bool {
        req.matches(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn req(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    #[test]
    fn test_parse_version_structural_equality() {
        let validator = VersionValidator::new();

        assert_eq!(
            validator.parse_version("1.0.0").unwrap(),
            validator.parse_version("\t1.0.0\n").unwrap()
        );
        assert_eq!(
            validator.parse_version("1.0.0+build.5").unwrap().build.as_str(),
            "build.5"
        );
    }

    #[test]
    fn test_parse_version_invalid() {
        let validator = VersionValidator::new();

        assert!(validator.parse_version("invalid").is_err());
        assert!(validator.parse_version("").is_err());
    }

    #[test]
    fn test_bare_requirement_is_caret() {
        let validator = VersionValidator::new();
        let bare = validator.parse_requirement("1.2").unwrap();

        assert!(validator.satisfies(&v("1.9.0"), &bare));
        assert!(!validator.satisfies(&v("2.0.0"), &bare));
    }

    #[test]
    fn test_satisfies_tilde() {
        let validator = VersionValidator::new();
        assert!(validator.satisfies(&v("1.2.5"), &req("~1.2.0")));
        assert!(!validator.satisfies(&v("1.3.0"), &req("~1.2.0")));
    }

    #[test]
    fn test_satisfies_exact() {
        let validator = VersionValidator::new();
        assert!(validator.satisfies(&v("1.2.3"), &req("=1.2.3")));
        assert!(!validator.satisfies(&v("1.2.4"), &req("=1.2.3")));
    }

    #[test]
    fn test_prerelease_needs_matching_comparator() {
        let validator = VersionValidator::new();

        assert!(!validator.satisfies(&v("1.1.0-alpha.1"), &req("^1.0.0")));
        assert!(validator.satisfies(&v("1.1.0-alpha.1"), &req("=1.1.0-alpha.1")));
    }

    #[test]
    fn test_invalid_requirement() {
        let validator = VersionValidator::new();
        assert!(validator.parse_requirement("not a req").is_err());
    }
}
