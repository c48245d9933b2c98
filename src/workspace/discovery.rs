//! Package discovery from a Cargo workspace tree
//!
//! Reads `Cargo.toml` manifests under a root directory and produces the
//! publishable packages in discovery order:
//!
//! 1. the root manifest's own package,
//! 2. workspace members in the order they are listed (glob members expanded
//!    in sorted path order),
//!
//! or, when the root has no manifest, every manifest found by a sorted walk.

use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::package::{Dependency, DependencyKind, Package, PackageSet};
use crate::core::error::DiscoveryError;
use crate::validation::version_validator::VersionValidator;

const MANIFEST_FILE: &str = "Cargo.toml";

type DependencyTable = BTreeMap<String, DependencySpec>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Manifest {
    package: Option<ManifestPackage>,
    workspace: Option<ManifestWorkspace>,
    #[serde(default)]
    dependencies: DependencyTable,
    #[serde(default, alias = "dev_dependencies")]
    dev_dependencies: DependencyTable,
    #[serde(default, alias = "build_dependencies")]
    build_dependencies: DependencyTable,
    #[serde(default)]
    target: BTreeMap<String, TargetDependencies>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TargetDependencies {
    #[serde(default)]
    dependencies: DependencyTable,
    #[serde(default, alias = "dev_dependencies")]
    dev_dependencies: DependencyTable,
    #[serde(default, alias = "build_dependencies")]
    build_dependencies: DependencyTable,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: Option<String>,
    version: Option<Inheritable<String>>,
    publish: Option<Inheritable<PublishField>>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestWorkspace {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    package: Option<WorkspacePackage>,
    #[serde(default)]
    dependencies: DependencyTable,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspacePackage {
    version: Option<String>,
    publish: Option<PublishField>,
}

/// A field that may be `{ workspace = true }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inheritable<T> {
    Value(T),
    Workspace { workspace: bool },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PublishField {
    Flag(bool),
    Registries(Vec<String>),
}

impl PublishField {
    fn allows_publishing(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Registries(registries) => !registries.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencySpec {
    Simple(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Default, Deserialize)]
struct DetailedDependency {
    version: Option<String>,
    path: Option<String>,
    git: Option<String>,
    package: Option<String>,
    #[serde(default)]
    workspace: bool,
}

struct LoadedManifest {
    path: PathBuf,
    dir: PathBuf,
    manifest: Manifest,
}

#[derive(Clone, Copy)]
struct WorkspaceContext<'a> {
    dir: &'a Path,
    workspace: &'a ManifestWorkspace,
}

/// Discover publishable packages under `root`
///
/// # Errors
///
/// Returns `DiscoveryError::NoPackages` if nothing publishable is found, or
/// the first manifest error encountered.
pub fn discover(root: &Path) -> Result<PackageSet, DiscoveryError> {
    let root_manifest = root.join(MANIFEST_FILE);
    let manifests = if root_manifest.is_file() {
        let loaded = load_manifest(&root_manifest)?;
        workspace_manifests(root, loaded)?
    } else {
        debug!(
            "no {} in {}, walking the directory tree",
            MANIFEST_FILE,
            root.display()
        );
        walk_manifests(root)?
    };

    let validator = VersionValidator::new();
    let mut packages = Vec::new();
    for loaded in &manifests {
        let Some(package) = &loaded.manifest.package else {
            continue;
        };
        let workspace = workspace_for(&manifests, loaded);
        if let Some(package) = build_package(loaded, package, workspace, &validator)? {
            debug!(
                "discovered {} in {}",
                package.id(),
                package.manifest_dir().display()
            );
            packages.push(package);
        }
    }

    if packages.is_empty() {
        return Err(DiscoveryError::NoPackages {
            root: root.to_path_buf(),
        });
    }

    info!(
        "found {} publishable package(s) under {}",
        packages.len(),
        root.display()
    );
    Ok(PackageSet::new(packages))
}

fn load_manifest(path: &Path) -> Result<LoadedManifest, DiscoveryError> {
    let content = std::fs::read_to_string(path).map_err(|source| DiscoveryError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: Manifest =
        toml::from_str(&content).map_err(|source| DiscoveryError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(LoadedManifest {
        path: path.to_path_buf(),
        dir: normalize_path(&dir),
        manifest,
    })
}

/// Root manifest followed by its workspace members
fn workspace_manifests(
    root: &Path,
    root_manifest: LoadedManifest,
) -> Result<Vec<LoadedManifest>, DiscoveryError> {
    let (members, exclude) = match &root_manifest.manifest.workspace {
        Some(workspace) => (workspace.members.clone(), workspace.exclude.clone()),
        None => (Vec::new(), Vec::new()),
    };

    let excluded: Vec<PathBuf> = exclude
        .iter()
        .map(|e| normalize_path(&root.join(e)))
        .collect();
    let mut seen: HashSet<PathBuf> = HashSet::from([root_manifest.dir.clone()]);
    let mut manifests = vec![root_manifest];

    for dir in expand_members(root, &members)? {
        let dir = normalize_path(&dir);
        if excluded.iter().any(|e| dir.starts_with(e)) {
            debug!("{} is excluded from the workspace", dir.display());
            continue;
        }
        if !seen.insert(dir.clone()) {
            continue;
        }
        manifests.push(load_manifest(&dir.join(MANIFEST_FILE))?);
    }

    Ok(manifests)
}

/// Expand `workspace.members`, keeping the listed order
fn expand_members(root: &Path, members: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut dirs = Vec::new();

    for member in members {
        let member = member.trim_start_matches("./").trim_end_matches('/');
        if !is_glob(member) {
            dirs.push(root.join(member));
            continue;
        }

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&root.to_string_lossy()),
            member
        );
        let paths = glob::glob(&pattern).map_err(|e| DiscoveryError::Workspace {
            message: format!("invalid member pattern {}: {}", member, e),
        })?;

        let mut matched = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_dir() && path.join(MANIFEST_FILE).is_file() => {
                    matched.push(path)
                }
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable path while expanding {}: {}", member, e),
            }
        }
        matched.sort();
        dirs.extend(matched);
    }

    Ok(dirs)
}

/// Every manifest under `root`, skipping `target/` and hidden directories
fn walk_manifests(root: &Path) -> Result<Vec<LoadedManifest>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NoPackages {
            root: root.to_path_buf(),
        });
    }

    let mut manifests = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| DiscoveryError::Workspace {
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
            manifests.push(load_manifest(entry.path())?);
        }
    }

    Ok(manifests)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "target" || name.starts_with('.'))
}

/// Nearest enclosing manifest with a `[workspace]` section
fn workspace_for<'a>(
    manifests: &'a [LoadedManifest],
    loaded: &LoadedManifest,
) -> Option<WorkspaceContext<'a>> {
    manifests
        .iter()
        .filter(|candidate| loaded.dir.starts_with(&candidate.dir))
        .filter_map(|candidate| {
            candidate
                .manifest
                .workspace
                .as_ref()
                .map(|workspace| WorkspaceContext {
                    dir: &candidate.dir,
                    workspace,
                })
        })
        .max_by_key(|context| context.dir.components().count())
}

fn build_package(
    loaded: &LoadedManifest,
    package: &ManifestPackage,
    workspace: Option<WorkspaceContext<'_>>,
    validator: &VersionValidator,
) -> Result<Option<Package>, DiscoveryError> {
    let name = package
        .name
        .clone()
        .ok_or_else(|| missing_field(&loaded.path, "package.name"))?;

    let publish = match &package.publish {
        None => None,
        Some(Inheritable::Value(publish)) => Some(publish.clone()),
        Some(Inheritable::Workspace { workspace: inherit }) => {
            let inherited = workspace
                .filter(|_| *inherit)
                .and_then(|ws| ws.workspace.package.as_ref())
                .and_then(|p| p.publish.clone());
            Some(inherited.ok_or_else(|| missing_field(&loaded.path, "workspace.package.publish"))?)
        }
    };
    if publish.is_some_and(|p| !p.allows_publishing()) {
        info!("skipping {}: publish is disabled", name);
        return Ok(None);
    }

    let raw_version = match &package.version {
        None => {
            info!("skipping {}: no version (not publishable)", name);
            return Ok(None);
        }
        Some(Inheritable::Value(version)) => version.clone(),
        Some(Inheritable::Workspace { workspace: inherit }) => workspace
            .filter(|_| *inherit)
            .and_then(|ws| ws.workspace.package.as_ref())
            .and_then(|p| p.version.clone())
            .ok_or_else(|| missing_field(&loaded.path, "workspace.package.version"))?,
    };
    let version =
        validator
            .parse_version(&raw_version)
            .map_err(|source| DiscoveryError::InvalidVersion {
                path: loaded.path.clone(),
                version: raw_version.clone(),
                source,
            })?;

    let manifest = &loaded.manifest;
    let mut tables: Vec<(&DependencyTable, DependencyKind)> = vec![
        (&manifest.dependencies, DependencyKind::Normal),
        (&manifest.build_dependencies, DependencyKind::Build),
        (&manifest.dev_dependencies, DependencyKind::Dev),
    ];
    for target in manifest.target.values() {
        tables.push((&target.dependencies, DependencyKind::Normal));
        tables.push((&target.build_dependencies, DependencyKind::Build));
        tables.push((&target.dev_dependencies, DependencyKind::Dev));
    }

    let mut dependencies = Vec::new();
    for (table, kind) in tables {
        for (key, spec) in table {
            dependencies.push(resolve_dependency(
                loaded, key, spec, kind, workspace, validator,
            )?);
        }
    }

    Ok(Some(
        Package::new(name, version, loaded.dir.clone()).with_dependencies(dependencies),
    ))
}

struct DependencyFields<'a> {
    version: Option<&'a str>,
    path: Option<&'a str>,
    git: Option<&'a str>,
    package: Option<&'a str>,
}

impl DependencySpec {
    fn fields(&self) -> DependencyFields<'_> {
        match self {
            Self::Simple(version) => DependencyFields {
                version: Some(version),
                path: None,
                git: None,
                package: None,
            },
            Self::Detailed(detail) => DependencyFields {
                version: detail.version.as_deref(),
                path: detail.path.as_deref(),
                git: detail.git.as_deref(),
                package: detail.package.as_deref(),
            },
        }
    }
}

fn resolve_dependency(
    loaded: &LoadedManifest,
    key: &str,
    spec: &DependencySpec,
    kind: DependencyKind,
    workspace: Option<WorkspaceContext<'_>>,
    validator: &VersionValidator,
) -> Result<Dependency, DiscoveryError> {
    let (fields, base_dir) = match spec {
        DependencySpec::Detailed(detail) if detail.workspace => {
            let context = workspace
                .ok_or_else(|| missing_field(&loaded.path, &format!("workspace.dependencies.{}", key)))?;
            let inherited = context.workspace.dependencies.get(key).ok_or_else(|| {
                missing_field(&loaded.path, &format!("workspace.dependencies.{}", key))
            })?;
            let mut fields = inherited.fields();
            if let Some(package) = detail.package.as_deref() {
                fields.package = Some(package);
            }
            (fields, context.dir)
        }
        _ => (spec.fields(), loaded.dir.as_path()),
    };

    let name = fields.package.unwrap_or(key);
    let mut dependency = Dependency::new(name, kind);

    if let Some(requirement) = fields.version {
        let req = validator.parse_requirement(requirement).map_err(|source| {
            DiscoveryError::InvalidRequirement {
                path: loaded.path.clone(),
                dependency: key.to_string(),
                requirement: requirement.to_string(),
                source,
            }
        })?;
        dependency = dependency.with_req(req);
    }
    if let Some(path) = fields.path {
        dependency = dependency.with_path(normalize_path(&base_dir.join(path)));
    }
    if let Some(git) = fields.git {
        dependency = dependency.with_git(git);
    }

    Ok(dependency)
}

fn missing_field(path: &Path, field: &str) -> DiscoveryError {
    DiscoveryError::MissingField {
        path: path.to_path_buf(),
        field: field.to_string(),
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
