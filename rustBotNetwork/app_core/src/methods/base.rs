use std::collections::HashMap;

use serde_json::Value;

use crate::data_models::entities::{KpiName, TrendIndicator};

/// Per-channel view handed to methods: the channel's own KPI map (including
/// the context-only `efficiency_index` the engine injects alongside the
/// persisted KPI names) plus its raw totals.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub channel: String,
    pub kpis: HashMap<String, f64>,
    pub totals: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignConfig {
    pub objective: String,
    pub target_cac: Option<f64>,
}

/// Immutable snapshot passed to every method. Built entirely by the engine;
/// methods must not perform I/O.
///
/// `raw_metrics` is intentionally populated from exactly one arbitrary
/// channel (the first one encountered while building `channel_data`), not
/// every channel — this mirrors the original implementation's
/// `next(iter(channel_raw), {})` and is preserved for fidelity even though
/// no built-in method currently reads it. `channel_data` is the complete,
/// per-channel view methods should use instead.
#[derive(Debug, Clone, Default)]
pub struct MethodContext {
    pub campaign_id: String,
    pub kpis: HashMap<KpiName, f64>,
    pub trends: Vec<TrendIndicator>,
    pub raw_metrics: HashMap<String, f64>,
    pub channel_data: Vec<ChannelData>,
    pub current_allocations: HashMap<String, f64>,
    pub campaign_config: CampaignConfig,
}

/// A method's verdict for one evaluation. `should_fire = false` is
/// equivalent to "no fire" (the original's `nil` return).
#[derive(Debug, Clone)]
pub struct MethodEvaluation {
    pub should_fire: bool,
    pub confidence: f64,
    pub priority: i32,
    pub action_type: String,
    pub action_payload: Value,
    pub reasoning: String,
    pub trigger_data: Value,
}

impl MethodEvaluation {
    pub fn no_fire() -> Self {
        Self {
            should_fire: false,
            confidence: 0.0,
            priority: 0,
            action_type: String::new(),
            action_payload: Value::Null,
            reasoning: String::new(),
            trigger_data: Value::Null,
        }
    }
}

/// One optimization method. `check_preconditions` runs before `evaluate`
/// and short-circuits evaluation (not I/O, purely a predicate over `ctx`).
pub trait OptimizationMethodImpl: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn cooldown_minutes(&self) -> i64;
    fn check_preconditions(&self, ctx: &MethodContext) -> bool;
    fn evaluate(&self, ctx: &MethodContext) -> MethodEvaluation;
}

/// `register`, `get`, `list`, `evaluate_all`. Methods run independently —
/// one method failing (panicking) must not prevent others; the engine is
/// responsible for trapping, not the registry itself.
#[derive(Default)]
pub struct MethodRegistry {
    methods: Vec<Box<dyn OptimizationMethodImpl>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self { methods: Vec::new() }
    }

    pub fn register(&mut self, method: Box<dyn OptimizationMethodImpl>) {
        self.methods.push(method);
    }

    pub fn get(&self, name: &str) -> Option<&dyn OptimizationMethodImpl> {
        self.methods
            .iter()
            .map(|m| m.as_ref())
            .find(|m| m.name() == name)
    }

    pub fn list_methods(&self) -> Vec<&dyn OptimizationMethodImpl> {
        self.methods.iter().map(|m| m.as_ref()).collect()
    }

    /// Runs every registered method in registration order, dropping those
    /// whose preconditions fail. Returns only evaluations with
    /// `should_fire = true`.
    pub fn evaluate_all(&self, ctx: &MethodContext) -> Vec<MethodEvaluation> {
        self.methods
            .iter()
            .filter(|m| m.check_preconditions(ctx))
            .map(|m| m.evaluate(ctx))
            .filter(|e| e.should_fire)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFires;
    impl OptimizationMethodImpl for AlwaysFires {
        fn name(&self) -> &'static str {
            "always_fires"
        }
        fn description(&self) -> &'static str {
            "test method"
        }
        fn priority(&self) -> i32 {
            5
        }
        fn cooldown_minutes(&self) -> i64 {
            60
        }
        fn check_preconditions(&self, _ctx: &MethodContext) -> bool {
            true
        }
        fn evaluate(&self, _ctx: &MethodContext) -> MethodEvaluation {
            MethodEvaluation {
                should_fire: true,
                confidence: 0.7,
                priority: 5,
                action_type: "test_action".to_string(),
                action_payload: Value::Null,
                reasoning: "always fires".to_string(),
                trigger_data: Value::Null,
            }
        }
    }

    struct NeverQualifies;
    impl OptimizationMethodImpl for NeverQualifies {
        fn name(&self) -> &'static str {
            "never_qualifies"
        }
        fn description(&self) -> &'static str {
            "test method"
        }
        fn priority(&self) -> i32 {
            1
        }
        fn cooldown_minutes(&self) -> i64 {
            60
        }
        fn check_preconditions(&self, _ctx: &MethodContext) -> bool {
            false
        }
        fn evaluate(&self, _ctx: &MethodContext) -> MethodEvaluation {
            MethodEvaluation::no_fire()
        }
    }

    #[test]
    fn evaluate_all_drops_failed_preconditions_and_non_firing() {
        let mut registry = MethodRegistry::new();
        registry.register(Box::new(AlwaysFires));
        registry.register(Box::new(NeverQualifies));

        let ctx = MethodContext::default();
        let evaluations = registry.evaluate_all(&ctx);
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].action_type, "test_action");
    }
}
