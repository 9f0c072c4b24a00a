use std::collections::HashMap;

use crate::methods::base::{MethodContext, MethodEvaluation, OptimizationMethodImpl};

const MIN_CHANNELS: usize = 2;
const EFFICIENCY_SPREAD_THRESHOLD: f64 = 0.20;
const MAX_MOVE_PCT: f64 = 0.10;

/// Proactive method: shifts budget from the bottom efficiency-index tier to
/// the top tier when the spread between best and worst channel exceeds the
/// threshold.
pub struct BudgetReallocationMethod;

impl OptimizationMethodImpl for BudgetReallocationMethod {
    fn name(&self) -> &'static str {
        "budget_reallocation"
    }

    fn description(&self) -> &'static str {
        "Shifts budget from underperforming to top-performing channels by efficiency index."
    }

    fn priority(&self) -> i32 {
        5
    }

    fn cooldown_minutes(&self) -> i64 {
        60
    }

    fn check_preconditions(&self, ctx: &MethodContext) -> bool {
        ctx.channel_data.len() >= MIN_CHANNELS && !ctx.current_allocations.is_empty()
    }

    fn evaluate(&self, ctx: &MethodContext) -> MethodEvaluation {
        let mut scored: Vec<(String, f64)> = ctx
            .channel_data
            .iter()
            .filter_map(|ch| {
                ch.kpis
                    .get("efficiency_index")
                    .map(|efficiency| (ch.channel.clone(), *efficiency))
            })
            .collect();

        if scored.len() < MIN_CHANNELS {
            return MethodEvaluation::no_fire();
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let best = scored.first().expect("scored has at least MIN_CHANNELS entries");
        let worst = scored.last().expect("scored has at least MIN_CHANNELS entries");
        let spread = best.1 - worst.1;
        let relative_spread = if best.1 > 0.0 { spread / best.1 } else { 0.0 };

        if relative_spread < EFFICIENCY_SPREAD_THRESHOLD {
            return MethodEvaluation::no_fire();
        }

        let tier_size = (scored.len() / 4).max(1);
        let top_tier: Vec<String> = scored[..tier_size].iter().map(|(ch, _)| ch.clone()).collect();
        let bottom_tier: Vec<String> = scored[scored.len() - tier_size..]
            .iter()
            .map(|(ch, _)| ch.clone())
            .collect();

        let total_budget: f64 = ctx.current_allocations.values().sum();
        if total_budget <= 0.0 {
            return MethodEvaluation::no_fire();
        }

        let move_amount = round2(total_budget * MAX_MOVE_PCT);
        let reduction_per_channel = if bottom_tier.is_empty() {
            0.0
        } else {
            round2(move_amount / bottom_tier.len() as f64)
        };
        let increase_per_channel = if top_tier.is_empty() {
            0.0
        } else {
            round2(move_amount / top_tier.len() as f64)
        };

        let mut new_allocations: HashMap<String, f64> = ctx.current_allocations.clone();
        for channel in &bottom_tier {
            let current = *new_allocations.get(channel).unwrap_or(&0.0);
            new_allocations.insert(channel.clone(), round2((current - reduction_per_channel).max(0.0)));
        }
        for channel in &top_tier {
            let current = *new_allocations.get(channel).unwrap_or(&0.0);
            new_allocations.insert(channel.clone(), round2(current + increase_per_channel));
        }

        let confidence = (0.5 + relative_spread).min(0.90);
        let reasoning = format!(
            "Efficiency spread of {:.0}% between top and bottom channels; moving {:.2} from {} bottom-tier channel(s) to {} top-tier channel(s).",
            relative_spread * 100.0,
            move_amount,
            bottom_tier.len(),
            top_tier.len()
        );

        MethodEvaluation {
            should_fire: true,
            confidence,
            priority: self.priority(),
            action_type: "budget_reallocation".to_string(),
            action_payload: serde_json::json!({
                "new_allocations": new_allocations,
                "top_tier": top_tier,
                "bottom_tier": bottom_tier,
                "move_amount": move_amount,
            }),
            reasoning,
            trigger_data: serde_json::json!({
                "relative_spread": relative_spread,
                "best_channel": best.0,
                "worst_channel": worst.0,
            }),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
