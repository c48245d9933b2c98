pub mod consistency_checker;
pub mod dependency_sorter;
pub mod version_validator;

pub use consistency_checker::{check, ConsistencyChecker, ConsistencyReport, ConsistencyWarning};
pub use dependency_sorter::{sort, PublishPlan};
pub use version_validator::VersionValidator;
