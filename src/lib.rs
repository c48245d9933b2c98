//! Publish the crates of a Cargo workspace in dependency order
//!
//! The pipeline is discovery ([`workspace`]) → consistency check and sort
//! ([`validation`]) → publish and confirm ([`orchestration`]), with the
//! registry reached through the oracles in [`registry`] and `cargo publish`
//! run through [`security`].

pub mod core;
pub mod orchestration;
pub mod registry;
pub mod security;
pub mod validation;
pub mod workspace;

pub use self::core::*;
pub use orchestration::{CargoPublisher, CheckReport, RunReport, WorkspacePublisher};
pub use registry::load_oracle;
pub use security::{CommandError, SafeCommandExecutor, SecureTokenManager};
