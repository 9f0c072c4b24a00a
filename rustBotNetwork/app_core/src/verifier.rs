use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde_json::Value;

use crate::data_models::entities::{
    KpiName, MethodStats, OptimizationLearning, OptimizationProposal, ProposalStatus,
    VerificationStatus,
};
use crate::metrics::{KpiCalculator, MetricsCollector};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;

/// Outcome of verifying a single executed proposal. `error = Some("pending")`
/// marks the "too soon to verify" case, distinct from a genuine failure.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub success: bool,
    pub proposal_id: String,
    pub learning_id: Option<String>,
    pub accuracy_score: Option<f64>,
    pub error: Option<String>,
    pub details: Value,
}

impl VerificationResult {
    fn failure(proposal_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            proposal_id: proposal_id.into(),
            learning_id: None,
            accuracy_score: None,
            error: Some(error.into()),
            details: Value::Null,
        }
    }

    fn pending(proposal_id: impl Into<String>, details: Value) -> Self {
        Self {
            success: false,
            proposal_id: proposal_id.into(),
            learning_id: None,
            accuracy_score: None,
            error: Some("pending".to_string()),
            details,
        }
    }
}

/// Aggregated result of verifying multiple proposals.
#[derive(Debug, Clone, Default)]
pub struct BatchVerificationResult {
    pub total: usize,
    pub verified: usize,
    pub pending: usize,
    pub failed: usize,
    pub records: Vec<VerificationResult>,
}

/// Compares predicted outcomes (from a proposal's `action_payload`)
/// against actual KPI changes measured after execution, scores accuracy,
/// and updates the owning method's running stats.
pub struct OutcomeVerifier<'a> {
    store: &'a OptimizerStore,
}

impl<'a> OutcomeVerifier<'a> {
    pub fn new(store: &'a OptimizerStore) -> Self {
        Self { store }
    }

    pub fn verify_proposal(
        &self,
        proposal_id: &str,
        verification_window_hours: i64,
    ) -> VerificationResult {
        let Some(proposal) = self.store.get_proposal(proposal_id) else {
            return VerificationResult::failure(proposal_id, "Proposal not found");
        };

        let Some(executed_at) = proposal.executed_at else {
            return VerificationResult::failure(
                proposal_id,
                format!(
                    "Proposal must be executed to verify (status: {:?})",
                    proposal.status
                ),
            );
        };
        if proposal.status != ProposalStatus::Executed {
            return VerificationResult::failure(
                proposal_id,
                format!(
                    "Proposal must be executed to verify (status: {:?})",
                    proposal.status
                ),
            );
        }

        let now = Utc::now();
        let window = Duration::hours(verification_window_hours);
        let elapsed = now - executed_at;
        if elapsed < window {
            let remaining = window - elapsed;
            let earliest = executed_at + window;
            return VerificationResult::pending(
                proposal_id,
                serde_json::json!({
                    "status": "pending",
                    "message": format!("Verification window not reached. {}s remaining.", remaining.num_seconds()),
                    "executed_at": executed_at.to_rfc3339(),
                    "earliest_verification": earliest.to_rfc3339(),
                }),
            );
        }

        if let Some(existing) = self.store.verified_learning_for_proposal(proposal_id) {
            return VerificationResult {
                success: true,
                proposal_id: proposal_id.to_string(),
                learning_id: Some(existing.id),
                accuracy_score: existing.accuracy_score,
                error: None,
                details: serde_json::json!({ "idempotent": true, "already_verified": true }),
            };
        }

        let predicted_impact = extract_predicted_impact(&proposal);
        let actual_impact = self.collect_actual_impact(&proposal.campaign_id);
        let accuracy = compute_accuracy_score(&predicted_impact, &actual_impact);

        let learning = OptimizationLearning {
            id: new_id(),
            campaign_id: proposal.campaign_id.clone(),
            proposal_id: proposal.id.clone(),
            method_id: proposal.method_id.clone(),
            predicted_impact: predicted_impact.clone(),
            actual_impact: Some(actual_impact.clone()),
            accuracy_score: Some(accuracy),
            verification_status: VerificationStatus::Verified,
            verified_at: Some(now),
            details: serde_json::json!({
                "action_type": proposal.action_type,
                "confidence": proposal.confidence,
                "verification_window_hours": verification_window_hours,
            }),
            created_at: now,
        };
        if let Err(err) = self.store.insert_learning(learning.clone()) {
            return VerificationResult::failure(proposal_id, err.message);
        }

        if let Some(method) = self.store.get_method(&proposal.method_id) {
            let success = accuracy >= 0.5;
            let stats = update_method_stats(&method.stats, accuracy, success);
            self.store.update_method_stats(&method.id, stats);
        }

        info!(target: "verifier", "verified proposal {} with accuracy {:.4}", proposal.id, accuracy);
        VerificationResult {
            success: true,
            proposal_id: proposal_id.to_string(),
            learning_id: Some(learning.id),
            accuracy_score: Some(accuracy),
            error: None,
            details: serde_json::json!({
                "predicted_impact": predicted_impact,
                "actual_impact": actual_impact,
            }),
        }
    }

    pub fn verify_batch(&self, campaign_id: &str, max_age_hours: i64) -> BatchVerificationResult {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let proposals: Vec<OptimizationProposal> = self
            .store
            .list_proposals_by_campaign(campaign_id)
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Executed && p.executed_at.is_some())
            .collect();

        let mut result = BatchVerificationResult {
            total: proposals.len(),
            ..Default::default()
        };

        for proposal in proposals {
            let Some(executed_at) = proposal.executed_at else {
                continue;
            };
            if executed_at < cutoff {
                continue;
            }

            let vr = self.verify_proposal(&proposal.id, default_verification_window_hours());
            if vr.error.as_deref() == Some("pending") {
                result.pending += 1;
            } else if vr.success {
                result.verified += 1;
            } else {
                result.failed += 1;
            }
            result.records.push(vr);
        }

        info!(
            target: "verifier",
            "batch verification complete: {} verified, {} pending, {} failed of {}",
            result.verified, result.pending, result.failed, result.total,
        );
        result
    }

    fn collect_actual_impact(&self, campaign_id: &str) -> Value {
        let snapshot_count = self.store.list_snapshots_by_campaign(campaign_id).len();
        if snapshot_count == 0 {
            warn!(target: "verifier", "no snapshots available for campaign {}", campaign_id);
            return serde_json::json!({ "error": "no_snapshots", "message": "No snapshot data available" });
        }

        let raw_metrics = MetricsCollector::new(self.store).collect(campaign_id, None, None);
        let kpi_rows =
            KpiCalculator::new(self.store).compute(campaign_id, Some(raw_metrics.clone()), None, None);

        let mut campaign_kpis = serde_json::Map::new();
        let mut channel_kpis: std::collections::HashMap<String, serde_json::Map<String, Value>> =
            std::collections::HashMap::new();
        for kpi in &kpi_rows {
            let key = kpi_name_key(kpi.kpi_name);
            match &kpi.channel {
                None => {
                    campaign_kpis.insert(key, serde_json::json!(kpi.kpi_value));
                }
                Some(channel) => {
                    channel_kpis
                        .entry(channel.clone())
                        .or_default()
                        .insert(key, serde_json::json!(kpi.kpi_value));
                }
            }
        }

        serde_json::json!({
            "snapshot_count": snapshot_count,
            "raw_metrics_count": raw_metrics.len(),
            "campaign_kpis": campaign_kpis,
            "channel_kpis": channel_kpis,
        })
    }
}

/// Matches `OptimizerSettings::default().verification_delay_hours` without
/// requiring a settings reference, for the batch path which (like the
/// original) always uses the default window.
fn default_verification_window_hours() -> i64 {
    24
}

fn extract_predicted_impact(proposal: &OptimizationProposal) -> Value {
    let payload = &proposal.action_payload;
    match proposal.action_type.as_str() {
        "budget_reallocation" => serde_json::json!({
            "action_type": proposal.action_type,
            "new_allocations": payload.get("new_allocations").cloned().unwrap_or_else(|| serde_json::json!({})),
            "reductions": payload.get("reductions").cloned().unwrap_or_else(|| serde_json::json!({})),
            "expected_improvement": payload.get("expected_improvement").cloned().unwrap_or_else(|| serde_json::json!("efficiency")),
        }),
        "creative_refresh" => serde_json::json!({
            "action_type": proposal.action_type,
            "channels": payload.get("channels").cloned().unwrap_or_else(|| serde_json::json!([])),
            "fatigued_channels": payload.get("fatigued_channels").cloned().unwrap_or_else(|| serde_json::json!([])),
            "expected_improvement": "ctr",
        }),
        _ => serde_json::json!({
            "action_type": proposal.action_type,
            "payload": payload,
        }),
    }
}

/// Scores predicted vs. actual impact. `budget_reallocation` is judged on
/// whether ROAS (preferred) or CPA improved; `creative_refresh` on CTR.
/// Falls back to a neutral 0.5 when there isn't enough signal to compare.
fn compute_accuracy_score(predicted: &Value, actual: &Value) -> f64 {
    if actual.get("error").is_some() {
        return 0.5;
    }

    let campaign_kpis = actual.get("campaign_kpis");
    let action_type = predicted.get("action_type").and_then(|v| v.as_str()).unwrap_or("");

    if action_type == "budget_reallocation" {
        let roas = campaign_kpis.and_then(|k| k.get("roas")).and_then(|v| v.as_f64());
        let cpa = campaign_kpis.and_then(|k| k.get("cpa")).and_then(|v| v.as_f64());

        if let Some(roas) = roas {
            if roas > 0.0 {
                return round4((roas / 3.0).min(1.0).max(0.0));
            }
        }
        if let Some(cpa) = cpa {
            if cpa > 0.0 {
                return round4((30.0 / cpa.max(1.0)).min(1.0).max(0.0));
            }
        }
    } else if action_type == "creative_refresh" {
        let ctr = campaign_kpis.and_then(|k| k.get("ctr")).and_then(|v| v.as_f64());
        if let Some(ctr) = ctr {
            if ctr > 0.0 {
                return round4((ctr / 0.02).min(1.0).max(0.0));
            }
        }
    }

    0.5
}

/// Running-average update of a method's accuracy stats.
fn update_method_stats(stats: &MethodStats, accuracy: f64, success: bool) -> MethodStats {
    let total = stats.total_executions + 1;
    let successful = stats.successful_executions + if success { 1 } else { 0 };
    let new_avg = ((stats.avg_accuracy * (total - 1) as f64) + accuracy) / total as f64;

    MethodStats {
        total_executions: total,
        successful_executions: successful,
        avg_accuracy: round4(new_avg),
        last_verified_at: Some(Utc::now()),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn kpi_name_key(name: KpiName) -> String {
    serde_json::to_value(name)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default()
}
