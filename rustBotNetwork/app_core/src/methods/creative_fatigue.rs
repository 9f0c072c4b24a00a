use crate::data_models::entities::{KpiName, TrendDirection};
use crate::methods::base::{MethodContext, MethodEvaluation, OptimizationMethodImpl};

const CTR_DECLINE_THRESHOLD: f64 = 0.15;
const MIN_IMPRESSIONS: f64 = 10_000.0;

/// Proactive, advisory-only method: flags channels whose CTR is declining
/// while impressions stay high, suggesting the audience has tired of the
/// current creative. Never touches budget.
pub struct CreativeFatigueMethod;

impl OptimizationMethodImpl for CreativeFatigueMethod {
    fn name(&self) -> &'static str {
        "creative_fatigue"
    }

    fn description(&self) -> &'static str {
        "Detects creative fatigue from declining CTR and flags channels for creative rotation."
    }

    fn priority(&self) -> i32 {
        6
    }

    fn cooldown_minutes(&self) -> i64 {
        60
    }

    fn check_preconditions(&self, ctx: &MethodContext) -> bool {
        !ctx.trends.is_empty() && !ctx.channel_data.is_empty()
    }

    fn evaluate(&self, ctx: &MethodContext) -> MethodEvaluation {
        let mut fatigued = Vec::new();

        for trend in &ctx.trends {
            if trend.kpi_name != KpiName::Ctr || trend.direction != TrendDirection::Declining {
                continue;
            }
            let magnitude = trend.magnitude.abs();
            if magnitude < CTR_DECLINE_THRESHOLD {
                continue;
            }
            let Some(channel_name) = trend.channel.as_deref() else {
                continue;
            };
            let impressions = channel_impressions(ctx, channel_name);
            if impressions < MIN_IMPRESSIONS {
                continue;
            }

            fatigued.push(serde_json::json!({
                "channel": channel_name,
                "ctr_decline": round4(magnitude),
                "current_ctr": trend.current_value,
                "previous_ctr": trend.previous_value,
                "impressions": impressions,
                "period_days": trend.period_days,
            }));
        }

        if fatigued.is_empty() {
            return MethodEvaluation::no_fire();
        }

        let max_decline = fatigued
            .iter()
            .filter_map(|v| v.get("ctr_decline").and_then(|v| v.as_f64()))
            .fold(0.0f64, f64::max);
        let confidence = (0.4 + max_decline).min(0.85);

        let channel_names: Vec<String> = fatigued
            .iter()
            .filter_map(|v| v.get("channel").and_then(|v| v.as_str()).map(String::from))
            .collect();

        let period_days = fatigued[0]
            .get("period_days")
            .and_then(|v| v.as_i64())
            .unwrap_or(7);

        let reasoning = format!(
            "Creative fatigue detected on {} channel(s). CTR declining up to {:.0}% over {} days with sufficient impressions. Recommend creative rotation.",
            fatigued.len(),
            max_decline * 100.0,
            period_days
        );

        MethodEvaluation {
            should_fire: true,
            confidence,
            priority: self.priority(),
            action_type: "creative_refresh".to_string(),
            action_payload: serde_json::json!({
                "channels": channel_names,
                "fatigued_channels": fatigued,
            }),
            reasoning,
            trigger_data: serde_json::json!({ "fatigued_channels": fatigued }),
        }
    }
}

fn channel_impressions(ctx: &MethodContext, channel: &str) -> f64 {
    ctx.channel_data
        .iter()
        .find(|ch| ch.channel == channel)
        .and_then(|ch| ch.totals.get("impressions"))
        .copied()
        .unwrap_or(0.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::base::ChannelData;
    use crate::data_models::entities::TrendIndicator;
    use chrono::Utc;
    use std::collections::HashMap;

    fn ctx_with_decline(magnitude: f64, impressions: f64) -> MethodContext {
        let mut totals = HashMap::new();
        totals.insert("impressions".to_string(), impressions);

        MethodContext {
            trends: vec![TrendIndicator {
                id: "t1".to_string(),
                campaign_id: "c1".to_string(),
                channel: Some("meta".to_string()),
                kpi_name: KpiName::Ctr,
                direction: TrendDirection::Declining,
                magnitude,
                period_days: 7,
                current_value: 0.01,
                previous_value: 0.02,
                confidence: 0.8,
                computed_at: Utc::now(),
            }],
            channel_data: vec![ChannelData {
                channel: "meta".to_string(),
                kpis: HashMap::new(),
                totals,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn fires_on_sufficient_decline_and_impressions() {
        let ctx = ctx_with_decline(0.20, 15_000.0);
        let method = CreativeFatigueMethod;
        let eval = method.evaluate(&ctx);
        assert!(eval.should_fire);
        assert_eq!(eval.action_type, "creative_refresh");
    }

    #[test]
    fn abstains_below_min_impressions() {
        let ctx = ctx_with_decline(0.20, 500.0);
        let method = CreativeFatigueMethod;
        let eval = method.evaluate(&ctx);
        assert!(!eval.should_fire);
    }
}
