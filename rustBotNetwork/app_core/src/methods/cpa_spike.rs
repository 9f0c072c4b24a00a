use crate::data_models::entities::{KpiName, TrendDirection};
use crate::methods::base::{MethodContext, MethodEvaluation, OptimizationMethodImpl};

const MIN_CHANNEL_SPEND: f64 = 100.0;
const SPIKE_THRESHOLD: f64 = 0.30;
const BUDGET_REDUCTION_PCT: f64 = 0.20;

/// Reactive method: reacts to a sudden per-channel CPA spike by proposing a
/// budget cut on the affected channels.
pub struct CpaSpikeMethod;

impl OptimizationMethodImpl for CpaSpikeMethod {
    fn name(&self) -> &'static str {
        "cpa_spike"
    }

    fn description(&self) -> &'static str {
        "Reduces budget on channels whose CPA has spiked relative to its recent trend."
    }

    fn priority(&self) -> i32 {
        2
    }

    fn cooldown_minutes(&self) -> i64 {
        60
    }

    fn check_preconditions(&self, ctx: &MethodContext) -> bool {
        !ctx.channel_data.is_empty() && ctx.kpis.contains_key(&KpiName::Cpa)
    }

    fn evaluate(&self, ctx: &MethodContext) -> MethodEvaluation {
        let campaign_cpa = *ctx.kpis.get(&KpiName::Cpa).unwrap_or(&0.0);

        let mut reductions = serde_json::Map::new();
        let mut affected_channels = Vec::new();
        let mut max_pct_change = 0.0f64;

        for channel in &ctx.channel_data {
            let spend = *channel.totals.get("spend").unwrap_or(&0.0);
            if spend < MIN_CHANNEL_SPEND {
                continue;
            }
            let Some(&current_cpa) = channel.kpis.get("cpa") else {
                continue;
            };

            let previous_cpa = ctx
                .trends
                .iter()
                .find(|t| {
                    t.channel.as_deref() == Some(channel.channel.as_str())
                        && t.kpi_name == KpiName::Cpa
                })
                .map(|t| t.previous_value)
                .unwrap_or(campaign_cpa);

            if previous_cpa <= 0.0 {
                continue;
            }

            let pct_change = (current_cpa - previous_cpa) / previous_cpa;
            if pct_change < SPIKE_THRESHOLD {
                continue;
            }

            let current_allocation = *ctx.current_allocations.get(&channel.channel).unwrap_or(&0.0);
            if current_allocation <= 0.0 {
                continue;
            }

            let new_allocation = (current_allocation * BUDGET_REDUCTION_PCT * 100.0).round() / 100.0;
            reductions.insert(
                channel.channel.clone(),
                serde_json::json!(new_allocation),
            );
            affected_channels.push(channel.channel.clone());
            max_pct_change = max_pct_change.max(pct_change);
        }

        if affected_channels.is_empty() {
            return MethodEvaluation::no_fire();
        }

        let confidence = (0.6 + max_pct_change).min(0.95);
        let reasoning = format!(
            "CPA spiked by at least {:.0}% on {} channel(s); cutting budget to {:.0}% of prior allocation.",
            max_pct_change * 100.0,
            affected_channels.len(),
            BUDGET_REDUCTION_PCT * 100.0
        );

        MethodEvaluation {
            should_fire: true,
            confidence,
            priority: self.priority(),
            action_type: "budget_reallocation".to_string(),
            action_payload: serde_json::json!({
                "reductions": reductions,
                "affected_channels": affected_channels,
                "reduction_pct": BUDGET_REDUCTION_PCT,
            }),
            reasoning,
            trigger_data: serde_json::json!({
                "campaign_cpa": campaign_cpa,
                "max_pct_change": max_pct_change,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::entities::TrendIndicator;
    use crate::methods::base::ChannelData;
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_ctx(spend: f64, current_cpa: f64, previous_cpa: f64, allocation: f64) -> MethodContext {
        let mut channel_kpis = HashMap::new();
        channel_kpis.insert("cpa".to_string(), current_cpa);
        let mut channel_totals = HashMap::new();
        channel_totals.insert("spend".to_string(), spend);

        let mut campaign_kpis = HashMap::new();
        campaign_kpis.insert(KpiName::Cpa, current_cpa);

        let mut current_allocations = HashMap::new();
        current_allocations.insert("meta".to_string(), allocation);

        MethodContext {
            campaign_id: "c1".to_string(),
            kpis: campaign_kpis,
            trends: vec![TrendIndicator {
                id: "t1".to_string(),
                campaign_id: "c1".to_string(),
                channel: Some("meta".to_string()),
                kpi_name: KpiName::Cpa,
                direction: TrendDirection::Declining,
                magnitude: 0.4,
                period_days: 7,
                current_value: current_cpa,
                previous_value: previous_cpa,
                confidence: 0.8,
                computed_at: Utc::now(),
            }],
            raw_metrics: HashMap::new(),
            channel_data: vec![ChannelData {
                channel: "meta".to_string(),
                kpis: channel_kpis,
                totals: channel_totals,
            }],
            current_allocations,
            campaign_config: Default::default(),
        }
    }

    #[test]
    fn fires_when_cpa_spikes_above_threshold() {
        let ctx = make_ctx(500.0, 130.0, 100.0, 1000.0);
        let method = CpaSpikeMethod;
        let eval = method.evaluate(&ctx);
        assert!(eval.should_fire);
        assert_eq!(eval.action_type, "budget_reallocation");
    }

    #[test]
    fn abstains_below_min_channel_spend() {
        let ctx = make_ctx(50.0, 130.0, 100.0, 1000.0);
        let method = CpaSpikeMethod;
        let eval = method.evaluate(&ctx);
        assert!(!eval.should_fire);
    }

    #[test]
    fn abstains_when_spike_below_threshold() {
        let ctx = make_ctx(500.0, 110.0, 100.0, 1000.0);
        let method = CpaSpikeMethod;
        let eval = method.evaluate(&ctx);
        assert!(!eval.should_fire);
    }
}
