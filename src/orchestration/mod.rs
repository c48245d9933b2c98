//! Orchestration layer for workspace publishing
//!
//! The publish loop itself, the `cargo publish` adapter it calls, and the
//! pipeline tying discovery, checking and sorting to the loop.

pub mod cargo_publisher;
pub mod publish_orchestrator;
pub mod workspace_publisher;

#[cfg(test)]
pub(crate) mod test_support;

pub use cargo_publisher::CargoPublisher;
pub use publish_orchestrator::{PackageReport, PublishOrchestrator, RunReport};
pub use workspace_publisher::{CheckReport, WorkspacePublisher};
