use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Outcome of a single guardrail check. All four checks below are pure
/// functions of their arguments — no I/O, no store access.
#[derive(Debug, Clone)]
pub struct GuardrailCheckResult {
    pub passed: bool,
    pub rule_name: &'static str,
    pub message: String,
    pub details: Value,
}

impl GuardrailCheckResult {
    fn passed(rule_name: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: true,
            rule_name,
            message: message.into(),
            details,
        }
    }

    fn failed(rule_name: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            passed: false,
            rule_name,
            message: message.into(),
            details,
        }
    }
}

/// (a) No single channel's budget may change by more than `max_change_pct`.
/// Passes trivially when no allocation changes accompany the evaluation.
pub fn check_budget_change_limit(
    current_allocations: &HashMap<String, f64>,
    proposed_allocations: Option<&HashMap<String, f64>>,
    max_change_pct: f64,
) -> GuardrailCheckResult {
    let Some(proposed_allocations) = proposed_allocations else {
        return GuardrailCheckResult::passed(
            "budget_change_limit",
            "No allocation changes proposed",
            Value::Null,
        );
    };

    let mut violations = Vec::new();
    for (channel, &current) in current_allocations {
        if current == 0.0 {
            continue;
        }
        let proposed = *proposed_allocations.get(channel).unwrap_or(&current);
        let change_pct = (proposed - current).abs() / current;
        if change_pct > max_change_pct {
            violations.push(serde_json::json!({
                "channel": channel,
                "current": current,
                "proposed": proposed,
                "change_pct": round4(change_pct),
            }));
        }
    }

    if !violations.is_empty() {
        return GuardrailCheckResult::failed(
            "budget_change_limit",
            format!(
                "Budget change exceeds {:.0}% limit on {} channel(s)",
                max_change_pct * 100.0,
                violations.len()
            ),
            serde_json::json!({ "violations": violations, "max_change_pct": max_change_pct }),
        );
    }

    GuardrailCheckResult::passed(
        "budget_change_limit",
        "All budget changes within limit",
        Value::Null,
    )
}

/// (b) No channel may drop below `min_floor_pct` of the proposed total.
/// Channels proposed at exactly 0 are considered intentionally paused and
/// never violate the floor.
pub fn check_minimum_channel_floor(
    proposed_allocations: Option<&HashMap<String, f64>>,
    min_floor_pct: f64,
) -> GuardrailCheckResult {
    let Some(proposed_allocations) = proposed_allocations else {
        return GuardrailCheckResult::passed(
            "minimum_channel_floor",
            "No allocation changes proposed",
            Value::Null,
        );
    };

    let total: f64 = proposed_allocations.values().sum();
    if total <= 0.0 {
        return GuardrailCheckResult::passed(
            "minimum_channel_floor",
            "Total budget is zero",
            Value::Null,
        );
    }

    let mut violations = Vec::new();
    for (channel, &amount) in proposed_allocations {
        if amount <= 0.0 {
            continue;
        }
        let share = amount / total;
        if share < min_floor_pct {
            violations.push(serde_json::json!({
                "channel": channel,
                "amount": amount,
                "share": round4(share),
            }));
        }
    }

    if !violations.is_empty() {
        return GuardrailCheckResult::failed(
            "minimum_channel_floor",
            format!(
                "{} channel(s) below {:.0}% floor",
                violations.len(),
                min_floor_pct * 100.0
            ),
            serde_json::json!({ "violations": violations, "min_floor_pct": min_floor_pct }),
        );
    }

    GuardrailCheckResult::passed(
        "minimum_channel_floor",
        "All channels above minimum floor",
        Value::Null,
    )
}

/// (c) At most `max_per_hour` proposals per campaign per hour. The caller
/// passes every recent proposal timestamp; filtering to the sliding 1h
/// window is this function's job.
pub fn check_rate_limit(
    recent_proposal_times: &[DateTime<Utc>],
    max_per_hour: u32,
) -> GuardrailCheckResult {
    let one_hour_ago = Utc::now() - Duration::hours(1);
    let recent_count = recent_proposal_times
        .iter()
        .filter(|&&t| t >= one_hour_ago)
        .count();

    if recent_count as u32 >= max_per_hour {
        return GuardrailCheckResult::failed(
            "rate_limit",
            format!(
                "Rate limit reached: {} proposals in the last hour (max {})",
                recent_count, max_per_hour
            ),
            serde_json::json!({ "recent_count": recent_count, "max_per_hour": max_per_hour }),
        );
    }

    GuardrailCheckResult::passed(
        "rate_limit",
        format!("{}/{} proposals in last hour", recent_count, max_per_hour),
        serde_json::json!({ "recent_count": recent_count, "max_per_hour": max_per_hour }),
    )
}

/// (d) A method (keyed by `action_type`) cannot fire again within its
/// cooldown window. Timezone-naive timestamps anywhere in the system are
/// assumed UTC.
pub fn check_cooldown(
    action_type: &str,
    last_fired_at: Option<DateTime<Utc>>,
    cooldown_minutes: i64,
) -> GuardrailCheckResult {
    let Some(last_fired_at) = last_fired_at else {
        return GuardrailCheckResult::passed(
            "cooldown",
            format!("Method '{}' has not fired before", action_type),
            Value::Null,
        );
    };

    let now = Utc::now();
    let elapsed = now - last_fired_at;
    let cooldown = Duration::minutes(cooldown_minutes);

    if elapsed < cooldown {
        let remaining = cooldown - elapsed;
        return GuardrailCheckResult::failed(
            "cooldown",
            format!(
                "Method '{}' is in cooldown. {:.0} minutes remaining.",
                action_type,
                remaining.num_seconds() as f64 / 60.0
            ),
            serde_json::json!({
                "action_type": action_type,
                "last_fired_at": last_fired_at.to_rfc3339(),
                "cooldown_minutes": cooldown_minutes,
                "remaining_seconds": remaining.num_seconds(),
            }),
        );
    }

    GuardrailCheckResult::passed(
        "cooldown",
        format!("Method '{}' cooldown has elapsed", action_type),
        serde_json::json!({
            "action_type": action_type,
            "cooldown_minutes": cooldown_minutes,
            "elapsed_minutes": round1(elapsed.num_seconds() as f64 / 60.0),
        }),
    )
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_change_passes_without_proposal() {
        let current = HashMap::new();
        let result = check_budget_change_limit(&current, None, 0.20);
        assert!(result.passed);
    }

    #[test]
    fn budget_change_flags_large_swing() {
        let mut current = HashMap::new();
        current.insert("meta".to_string(), 1000.0);
        let mut proposed = HashMap::new();
        proposed.insert("meta".to_string(), 500.0);

        let result = check_budget_change_limit(&current, Some(&proposed), 0.20);
        assert!(!result.passed);
    }

    #[test]
    fn floor_ignores_intentionally_paused_channel() {
        let mut proposed = HashMap::new();
        proposed.insert("meta".to_string(), 0.0);
        proposed.insert("google".to_string(), 1000.0);

        let result = check_minimum_channel_floor(Some(&proposed), 0.05);
        assert!(result.passed);
    }

    #[test]
    fn rate_limit_fails_at_cap() {
        let now = Utc::now();
        let times = vec![now, now, now];
        let result = check_rate_limit(&times, 3);
        assert!(!result.passed);
    }

    #[test]
    fn cooldown_passes_when_never_fired() {
        let result = check_cooldown("budget_reallocation", None, 60);
        assert!(result.passed);
    }

    #[test]
    fn cooldown_fails_within_window() {
        let result = check_cooldown("budget_reallocation", Some(Utc::now()), 60);
        assert!(!result.passed);
    }
}
