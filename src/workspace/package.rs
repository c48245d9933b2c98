//! Package model
//!
//! A [`Package`] is an immutable snapshot taken during one discovery pass.
//! Updating what is known about a package (for example its published state)
//! produces a new snapshot instead of mutating the old one.

use semver::{Version, VersionReq};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Section a dependency was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Normal,
    Build,
    Dev,
}

/// A declared dependency of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    /// Real package name (after resolving `package = "..."` renames)
    pub name: String,
    pub kind: DependencyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req: Option<VersionReq>,
    /// Resolved local path, if declared with `path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            req: None,
            path: None,
            git: None,
        }
    }

    pub fn with_req(mut self, req: VersionReq) -> Self {
        self.req = Some(req);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = Some(git.into());
        self
    }

    /// Check if this dependency constrains publish order
    ///
    /// Dev-dependencies are stripped by `cargo publish` and never order.
    pub fn affects_order(&self) -> bool {
        self.kind != DependencyKind::Dev
    }
}

/// Whether the package's exact version already exists in the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishedState {
    #[default]
    Unknown,
    Unpublished,
    Published,
}

/// A discovered package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    name: String,
    version: Version,
    manifest_dir: PathBuf,
    dependencies: Vec<Dependency>,
    published: PublishedState,
}

impl Package {
    pub fn new(name: impl Into<String>, version: Version, manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version,
            manifest_dir: manifest_dir.into(),
            dependencies: Vec::new(),
            published: PublishedState::Unknown,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Fresh snapshot with a different published state
    pub fn with_published(&self, published: PublishedState) -> Self {
        Self {
            published,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Directory containing `Cargo.toml`
    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn published(&self) -> PublishedState {
        self.published
    }

    pub fn is_published(&self) -> bool {
        self.published == PublishedState::Published
    }

    /// `name@version`
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Discovered packages, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PackageSet {
    packages: Vec<Package>,
}

impl PackageSet {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Package> {
        self.packages.iter()
    }

    /// First package with the given name
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Discovery index of the first package with the given name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn into_vec(self) -> Vec<Package> {
        self.packages
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a Package;
    type IntoIter = std::slice::Iter<'a, Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}

impl FromIterator<Package> for PackageSet {
    fn from_iter<I: IntoIterator<Item = Package>>(iter: I) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_published_is_a_new_snapshot() {
        let original = Package::new("core", Version::new(1, 0, 0), "/ws/core");
        let checked = original.with_published(PublishedState::Published);

        assert_eq!(original.published(), PublishedState::Unknown);
        assert!(checked.is_published());
        assert_eq!(checked.name(), "core");
        assert_eq!(checked.id(), "core@1.0.0");
    }

    #[test]
    fn test_version_equality_is_structural() {
        let a = Package::new("core", Version::parse("1.0.0").unwrap(), "/a");
        let b = Package::new("core", Version::parse(" 1.0.0 ".trim()).unwrap(), "/a");

        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn test_dev_dependencies_do_not_order() {
        assert!(!Dependency::new("fixtures", DependencyKind::Dev).affects_order());
        assert!(Dependency::new("core", DependencyKind::Build).affects_order());
        assert!(Dependency::new("core", DependencyKind::Normal).affects_order());
    }

    #[test]
    fn test_package_set_lookup_keeps_discovery_order() {
        let set: PackageSet = vec![
            Package::new("b", Version::new(0, 1, 0), "/ws/b"),
            Package::new("a", Version::new(0, 1, 0), "/ws/a"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.names(), vec!["b", "a"]);
        assert_eq!(set.index_of("a"), Some(1));
        assert!(set.contains("b"));
        assert!(set.get("c").is_none());
    }
}
