pub mod base;
pub mod budget_reallocation;
pub mod cpa_spike;
pub mod creative_fatigue;

pub use base::{ChannelData, CampaignConfig, MethodContext, MethodEvaluation, MethodRegistry, OptimizationMethodImpl};

/// Registry pre-populated with the three built-in methods, in the order the
/// engine processes evaluations (insertion order, per spec ordering rule).
pub fn build_default_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register(Box::new(cpa_spike::CpaSpikeMethod));
    registry.register(Box::new(budget_reallocation::BudgetReallocationMethod));
    registry.register(Box::new(creative_fatigue::CreativeFatigueMethod));
    registry
}
