use log::{info, warn};
use serde_json::Value;

use crate::config::OptimizerSettings;
use crate::data_models::entities::{MonitorRun, MonitorRunStatus, ProposalStatus};
use crate::engine::{DecisionEngine, EngineResult};
use crate::executor::{ActionExecutor, BatchExecutionResult};
use crate::methods::{build_default_registry, MethodRegistry};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;
use crate::verifier::{BatchVerificationResult, OutcomeVerifier};

const VERIFICATION_BATCH_MAX_AGE_HOURS: i64 = 48;

/// Outcome of a full monitor cycle: one run of observe → act → verify.
#[derive(Debug, Clone)]
pub struct MonitorRunResult {
    pub campaign_id: String,
    pub monitor_run_id: Option<String>,
    pub engine_result: Option<EngineResult>,
    pub execution_result: Option<BatchExecutionResult>,
    pub verification_result: Option<BatchVerificationResult>,
    pub success: bool,
    pub errors: Vec<String>,
}

impl MonitorRunResult {
    fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            monitor_run_id: None,
            engine_result: None,
            execution_result: None,
            verification_result: None,
            success: true,
            errors: Vec::new(),
        }
    }
}

/// Orchestrates the full optimization lifecycle for a campaign in one call:
///
/// 1. OBSERVE & DECIDE — `DecisionEngine::run` collects metrics, evaluates
///    methods, and creates proposals.
/// 2. ACT — executes auto-approved proposals not yet executed.
/// 3. VERIFY — verifies recently executed proposals past their window.
///
/// Each phase runs independently of the others' failures; this is purely
/// sequential orchestration of components that don't themselves throw.
pub struct OptimizationMonitor {
    registry: MethodRegistry,
    executor: ActionExecutor,
    settings: OptimizerSettings,
}

impl OptimizationMonitor {
    pub fn new(dry_run: bool, settings: OptimizerSettings) -> Self {
        Self {
            registry: build_default_registry(),
            executor: ActionExecutor::new(dry_run),
            settings,
        }
    }

    pub async fn run_cycle(&self, store: &OptimizerStore, campaign_id: &str) -> MonitorRunResult {
        crate::utils::logger::set_current_campaign_id(campaign_id.to_string());
        info!(target: "monitor", "starting monitor cycle");
        let mut result = MonitorRunResult::new(campaign_id);

        // Phase 1: OBSERVE & DECIDE
        let engine = DecisionEngine::new(store, &self.registry, &self.settings);
        let engine_result = engine.run(campaign_id);
        if !engine_result.success && !engine_result.errors.is_empty() {
            result.success = false;
        }
        result.engine_result = Some(engine_result.clone());

        // Phase 2: ACT
        let auto_approved_ids: Vec<String> = store
            .list_proposals_by_campaign_and_status(campaign_id, ProposalStatus::AutoApproved)
            .into_iter()
            .filter(|p| p.executed_at.is_none())
            .map(|p| p.id)
            .collect();

        if !auto_approved_ids.is_empty() {
            let batch_result = self.executor.execute_batch(store, &auto_approved_ids).await;
            if batch_result.failed > 0 {
                warn!(target: "monitor", "{}/{} executions failed this cycle", batch_result.failed, batch_result.total);
                result.errors.push(format!(
                    "Execution phase: {}/{} failed",
                    batch_result.failed, batch_result.total
                ));
            }
            result.execution_result = Some(batch_result);
        }

        // Phase 3: VERIFY
        let verifier = OutcomeVerifier::new(store);
        let verification_result = verifier.verify_batch(campaign_id, VERIFICATION_BATCH_MAX_AGE_HOURS);
        result.verification_result = Some(verification_result);

        // MonitorRun record
        let status = if result.errors.is_empty() {
            MonitorRunStatus::Completed
        } else if result.engine_result.as_ref().is_some_and(|er| er.success) {
            MonitorRunStatus::Partial
        } else {
            MonitorRunStatus::Failed
        };

        let engine_summary = result
            .engine_result
            .as_ref()
            .map(engine_summary_json)
            .unwrap_or(Value::Null);
        let execution_summary = result
            .execution_result
            .as_ref()
            .map(execution_summary_json)
            .unwrap_or(Value::Null);
        let verification_summary = result
            .verification_result
            .as_ref()
            .map(verification_summary_json)
            .unwrap_or(Value::Null);

        let monitor_run = MonitorRun {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            status,
            engine_summary,
            execution_summary,
            verification_summary,
            created_at: chrono::Utc::now(),
        };

        match store.insert_monitor_run(monitor_run.clone()) {
            Ok(()) => {
                result.monitor_run_id = Some(monitor_run.id);
            }
            Err(err) => {
                warn!(target: "monitor", "failed to record monitor run: {}", err.message);
                result.errors.push(format!("Failed to record monitor run: {}", err.message));
                result.success = false;
            }
        }

        info!(target: "monitor", "monitor cycle complete with status {:?}", status);
        crate::utils::logger::clear_current_campaign_id();
        result
    }
}

fn engine_summary_json(er: &EngineResult) -> Value {
    serde_json::json!({
        "success": er.success,
        "proposals_created": er.proposals_created,
        "proposals_auto_approved": er.proposals_auto_approved,
        "proposals_queued": er.proposals_queued,
        "guardrail_rejections": er.guardrail_rejections,
        "method_evaluations": er.method_evaluations,
    })
}

fn execution_summary_json(bx: &BatchExecutionResult) -> Value {
    serde_json::json!({
        "total": bx.total,
        "succeeded": bx.succeeded,
        "failed": bx.failed,
    })
}

fn verification_summary_json(bv: &BatchVerificationResult) -> Value {
    serde_json::json!({
        "total": bv.total,
        "verified": bv.verified,
        "pending": bv.pending,
        "failed": bv.failed,
    })
}
