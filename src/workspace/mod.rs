//! Workspace discovery and the package model

pub mod discovery;
pub mod package;

pub use discovery::discover;
pub use package::{Dependency, DependencyKind, Package, PackageSet, PublishedState};
