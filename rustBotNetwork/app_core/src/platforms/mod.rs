pub mod base;
pub mod dry_run;
pub mod factory;
pub mod meta;

pub use base::{
    AdPlatformAdapter, AdSetSpec, ExecutionPlan, ExecutionResult, Platform, ValidationIssue,
    ValidationSeverity,
};
pub use factory::get_platform_adapter;
