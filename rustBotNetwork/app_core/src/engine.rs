use std::collections::HashMap;

use chrono::{Duration, Utc};
use log::{info, warn};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::config::OptimizerSettings;
use crate::data_models::entities::{KpiName, MetricName, MethodType, OptimizationProposal, ProposalStatus};
use crate::guardrails::{
    check_budget_change_limit, check_cooldown, check_minimum_channel_floor, check_rate_limit,
    GuardrailCheckResult,
};
use crate::invariants::{ensure_non_empty_trimmed, ensure_range_i32, ensure_unit_interval};
use crate::methods::base::{CampaignConfig, ChannelData, MethodContext, MethodEvaluation, MethodRegistry};
use crate::metrics::{KpiCalculator, MetricsCollector, TrendAnalyzer};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;
use crate::utils::logger::with_campaign_context;

/// Outcome of a single engine run. Never wrapped in `Result` — `success`
/// and `errors` carry the failure mode, since a run that trips a
/// precondition is an expected, not exceptional, outcome.
#[derive(Debug, Clone, Default)]
pub struct EngineResult {
    pub success: bool,
    pub campaign_id: String,
    pub proposals_created: usize,
    pub proposals_auto_approved: usize,
    pub proposals_queued: usize,
    pub guardrail_rejections: usize,
    pub method_evaluations: usize,
    pub errors: Vec<String>,
    pub details: Value,
}

impl EngineResult {
    fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            ..Default::default()
        }
    }
}

/// Runs the 8-step optimization pipeline for a campaign: preconditions,
/// data collection, method evaluation, guardrails, proposal creation,
/// confidence adjustment, execution decision, commit.
pub struct DecisionEngine<'a> {
    store: &'a OptimizerStore,
    registry: &'a MethodRegistry,
    settings: &'a OptimizerSettings,
}

const TREND_PERIOD_DAYS: i64 = 7;

impl<'a> DecisionEngine<'a> {
    pub fn new(
        store: &'a OptimizerStore,
        registry: &'a MethodRegistry,
        settings: &'a OptimizerSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub fn run(&self, campaign_id: &str) -> EngineResult {
        with_campaign_context(campaign_id, || self.run_inner(campaign_id))
    }

    fn run_inner(&self, campaign_id: &str) -> EngineResult {
        info!(target: "engine", "starting decision engine run");
        let mut result = EngineResult::new(campaign_id);

        // Step 1: preconditions
        let Some(campaign) = self.store.get_campaign(campaign_id) else {
            warn!(target: "engine", "campaign not found, aborting run");
            result.errors.push(format!("Campaign {} not found", campaign_id));
            return result;
        };

        let snapshot_count = self.store.list_snapshots_by_campaign(campaign_id).len();
        if snapshot_count == 0 {
            warn!(target: "engine", "no channel snapshots, aborting run");
            result
                .errors
                .push("No channel snapshots available for this campaign".to_string());
            return result;
        }

        // Step 2: data collection
        let raw_metrics = MetricsCollector::new(self.store).collect(campaign_id, None, None);
        let kpi_rows =
            KpiCalculator::new(self.store).compute(campaign_id, Some(raw_metrics.clone()), None, None);
        let trends = TrendAnalyzer::new(self.store).analyze(campaign_id, TREND_PERIOD_DAYS);

        let ctx = build_context(&campaign, &raw_metrics, &kpi_rows, trends);
        let current_allocations = ctx.current_allocations.clone();

        // Step 3: method evaluation
        let evaluations = self.registry.evaluate_all(&ctx);
        result.method_evaluations = evaluations.len();

        if evaluations.is_empty() {
            info!(target: "engine", "no method fired, nothing to propose");
            result.success = true;
            result.details = serde_json::json!({ "message": "No optimizations triggered" });
            return result;
        }

        // Step 4: guardrails
        let one_hour_ago = Utc::now() - Duration::hours(1);
        let recent_times: Vec<_> = self
            .store
            .list_proposals_by_campaign(campaign_id)
            .into_iter()
            .filter(|p| p.created_at >= one_hour_ago)
            .map(|p| p.created_at)
            .collect();

        let mut passing: Vec<(MethodEvaluation, Vec<GuardrailCheckResult>)> = Vec::new();
        for evaluation in evaluations {
            let mut checks = Vec::new();

            checks.push(check_rate_limit(&recent_times, self.settings.max_proposals_per_hour));

            let last_fired = self
                .store
                .last_proposal_for_action(campaign_id, &evaluation.action_type)
                .map(|p| p.created_at);
            checks.push(check_cooldown(
                &evaluation.action_type,
                last_fired,
                self.settings.default_cooldown_minutes,
            ));

            if evaluation.action_type == "budget_reallocation" {
                let proposed = extract_allocations(&evaluation.action_payload, "new_allocations");
                checks.push(check_budget_change_limit(
                    &current_allocations,
                    proposed.as_ref(),
                    self.settings.max_budget_change_pct,
                ));
                checks.push(check_minimum_channel_floor(
                    proposed.as_ref(),
                    self.settings.min_channel_floor_pct,
                ));
            }

            if checks.iter().all(|c| c.passed) {
                passing.push((evaluation, checks));
            } else {
                warn!(target: "engine", "guardrail rejected proposal for action_type={}", evaluation.action_type);
                result.guardrail_rejections += 1;
            }
        }

        // Step 5: proposal creation
        let now = Utc::now();
        let mut proposals = Vec::new();
        for (evaluation, checks) in &passing {
            if let Err(err) = ensure_non_empty_trimmed(&evaluation.action_type, "action_type") {
                warn!(target: "engine", "dropping proposal with empty action_type: {}", err.message);
                result.errors.push(err.message);
                continue;
            }
            if let Err(err) = ensure_unit_interval(evaluation.confidence, "confidence") {
                warn!(target: "engine", "dropping proposal with out-of-range confidence: {}", err.message);
                result.errors.push(err.message);
                continue;
            }
            if let Err(err) = ensure_range_i32(evaluation.priority, 1, 10, "priority") {
                warn!(target: "engine", "dropping proposal with out-of-range priority: {}", err.message);
                result.errors.push(err.message);
                continue;
            }

            let method = self.store.get_or_create_method(
                &evaluation.action_type,
                &format!("Auto-registered method for {}", evaluation.action_type),
                MethodType::Reactive,
                self.settings.default_cooldown_minutes,
            );

            proposals.push(OptimizationProposal {
                id: new_id(),
                campaign_id: campaign_id.to_string(),
                method_id: method.id,
                status: ProposalStatus::Pending,
                confidence: evaluation.confidence,
                priority: evaluation.priority,
                action_type: evaluation.action_type.clone(),
                action_payload: evaluation.action_payload.clone(),
                reasoning: evaluation.reasoning.clone(),
                trigger_data: evaluation.trigger_data.clone(),
                guardrail_checks: serde_json::json!({
                    "checks": checks
                        .iter()
                        .map(|c| serde_json::json!({
                            "rule_name": c.rule_name,
                            "passed": c.passed,
                            "message": c.message,
                        }))
                        .collect::<Vec<_>>(),
                }),
                execution_result: None,
                approved_by: None,
                approved_at: None,
                executed_at: None,
                expires_at: now + Duration::hours(24),
                created_at: now,
            });
        }
        result.proposals_created = proposals.len();

        // Step 6: confidence adjustment
        for proposal in &mut proposals {
            proposal.confidence =
                adjust_confidence(proposal.confidence, snapshot_count, raw_metrics.len());
        }

        // Step 7: execution decision
        for proposal in &mut proposals {
            if proposal.confidence >= self.settings.auto_approve_threshold {
                proposal.status = ProposalStatus::AutoApproved;
                proposal.approved_by = Some("engine".to_string());
                proposal.approved_at = Some(Utc::now());
                result.proposals_auto_approved += 1;
            } else {
                proposal.status = ProposalStatus::Pending;
                result.proposals_queued += 1;
            }
        }

        // Step 8: commit
        for proposal in proposals {
            self.store.insert_proposal(proposal);
        }

        result.success = true;
        result.details = serde_json::json!({
            "message": format!(
                "Created {} proposal(s): {} auto-approved, {} queued",
                result.proposals_created, result.proposals_auto_approved, result.proposals_queued
            ),
        });
        info!(
            target: "engine",
            "run complete: {} created, {} auto-approved, {} queued, {} guardrail rejections",
            result.proposals_created,
            result.proposals_auto_approved,
            result.proposals_queued,
            result.guardrail_rejections,
        );
        result
    }
}

/// Builds the immutable `MethodContext` methods evaluate against.
///
/// `channel_raw` intentionally uses overwrite (last-value-wins) semantics
/// per (channel, metric name), not summation — distinct from
/// `ChannelTotals` in `metrics::kpi`, which sums for persisted KPI rows.
/// This mirrors the original pipeline's dict-assignment construction of
/// `current_allocations` from the latest per-channel spend as a proxy for
/// live budget.
fn build_context(
    campaign: &crate::data_models::entities::Campaign,
    raw_metrics: &[crate::data_models::entities::RawMetric],
    kpi_rows: &[crate::data_models::entities::DerivedKpi],
    trends: Vec<crate::data_models::entities::TrendIndicator>,
) -> MethodContext {
    let mut campaign_kpis: HashMap<KpiName, f64> = HashMap::new();
    for kpi in kpi_rows {
        if kpi.channel.is_none() {
            campaign_kpis.insert(kpi.kpi_name, kpi.kpi_value);
        }
    }

    let mut channel_kpis: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for kpi in kpi_rows {
        if let Some(channel) = &kpi.channel {
            channel_kpis
                .entry(channel.clone())
                .or_default()
                .insert(kpi_name_key(kpi.kpi_name), kpi.kpi_value);
        }
    }

    let mut channel_raw: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for metric in raw_metrics {
        channel_raw
            .entry(metric.channel.clone())
            .or_default()
            .insert(metric_name_key(metric.metric_name), metric.metric_value);
    }

    let total_spend: f64 = channel_raw
        .values()
        .map(|r| r.get("spend").copied().unwrap_or(0.0))
        .sum();
    let total_conversions: f64 = channel_raw
        .values()
        .map(|r| r.get("conversions").copied().unwrap_or(0.0))
        .sum();

    let mut channel_data = Vec::new();
    for (channel_name, kpis) in &channel_kpis {
        let raw = channel_raw.get(channel_name).cloned().unwrap_or_default();
        let mut kpis = kpis.clone();

        if let Some(efficiency) = efficiency_index(&raw, total_spend, total_conversions) {
            kpis.insert("efficiency_index".to_string(), efficiency);
        }

        channel_data.push(ChannelData {
            channel: channel_name.clone(),
            kpis,
            totals: raw,
        });
    }

    let current_allocations: HashMap<String, f64> = channel_kpis
        .keys()
        .map(|channel| {
            let spend = channel_raw
                .get(channel)
                .and_then(|r| r.get("spend"))
                .copied()
                .unwrap_or(0.0);
            (channel.clone(), spend)
        })
        .collect();

    // Preserved for fidelity: only one arbitrary channel's raw totals ever
    // reach `raw_metrics`, matching the original `next(iter(...), {})`.
    let raw_metrics_single_channel = channel_raw
        .iter()
        .next()
        .map(|(_, values)| values.clone())
        .unwrap_or_default();

    MethodContext {
        campaign_id: campaign.id.clone(),
        kpis: campaign_kpis,
        trends,
        raw_metrics: raw_metrics_single_channel,
        channel_data,
        current_allocations,
        campaign_config: CampaignConfig {
            objective: campaign.objective.clone(),
            target_cac: campaign.target_cac.and_then(|d| d.to_f64()),
        },
    }
}

/// `conversion_share / spend_share` for one channel. `None` whenever either
/// share is undefined (zero campaign-wide total) or spend_share is zero,
/// matching the measurement service this is ported from.
fn efficiency_index(raw: &HashMap<String, f64>, total_spend: f64, total_conversions: f64) -> Option<f64> {
    if total_spend == 0.0 || total_conversions == 0.0 {
        return None;
    }
    let spend = raw.get("spend").copied().unwrap_or(0.0);
    let conversions = raw.get("conversions").copied().unwrap_or(0.0);
    let spend_share = spend / total_spend;
    if spend_share == 0.0 {
        return None;
    }
    let conv_share = conversions / total_conversions;
    Some(conv_share / spend_share)
}

fn kpi_name_key(name: KpiName) -> String {
    enum_key(&name)
}

fn metric_name_key(name: MetricName) -> String {
    enum_key(&name)
}

fn enum_key<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default()
}

/// Reads a `{channel: amount}` map out of an action payload field, used to
/// recover `new_allocations` without assuming the method that produced it.
fn extract_allocations(payload: &Value, field: &str) -> Option<HashMap<String, f64>> {
    payload.get(field)?.as_object().map(|obj| {
        obj.iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
            .collect()
    })
}

/// Lowers confidence when data is sparse: snapshot count first, then raw
/// metric count independently on top of that.
fn adjust_confidence(confidence: f64, snapshot_count: usize, raw_metric_count: usize) -> f64 {
    let mut confidence = confidence;
    if snapshot_count < 5 {
        confidence *= 0.8;
    } else if snapshot_count < 10 {
        confidence *= 0.9;
    }
    if raw_metric_count < 10 {
        confidence *= 0.85;
    }
    (confidence.min(1.0).max(0.0) * 10_000.0).round() / 10_000.0
}
