use std::collections::HashMap;

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;

use crate::data_models::entities::{
    Execution, ExecutionAction, ExecutionActionStatus, ExecutionActionType, ExecutionStatus,
    OptimizationProposal, ProposalStatus,
};
use crate::platforms::{get_platform_adapter, AdPlatformAdapter, ExecutionResult, Platform};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;

const PLATFORM_ACTIONS: [&str; 3] = ["budget_reallocation", "pause_channel", "resume_channel"];
const ADVISORY_ACTIONS: [&str; 1] = ["creative_refresh"];

/// Outcome of executing a single proposal.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub success: bool,
    pub proposal_id: String,
    pub execution_id: Option<String>,
    pub error: Option<String>,
    pub platform_result: Option<Value>,
}

impl ExecutionRecord {
    fn failure(proposal_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            proposal_id: proposal_id.into(),
            execution_id: None,
            error: Some(error.into()),
            platform_result: None,
        }
    }
}

/// Aggregated result of executing multiple proposals.
#[derive(Debug, Clone, Default)]
pub struct BatchExecutionResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: Vec<ExecutionRecord>,
}

/// Bridges approved proposals to platform execution. Maps
/// `budget_reallocation`/`pause_channel`/`resume_channel` to concrete
/// adapter calls and `creative_refresh` to an advisory-only record, writing
/// `Execution`/`ExecutionAction` audit rows and updating proposal status.
pub struct ActionExecutor {
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub async fn execute_proposal(
        &self,
        store: &OptimizerStore,
        proposal_id: &str,
        force: bool,
    ) -> ExecutionRecord {
        let Some(mut proposal) = store.get_proposal(proposal_id) else {
            warn!(target: "executor", "proposal {} not found", proposal_id);
            return ExecutionRecord::failure(proposal_id, "Proposal not found");
        };

        crate::utils::logger::set_current_campaign_id(proposal.campaign_id.clone());
        info!(target: "executor", "executing proposal {} (action_type={})", proposal.id, proposal.action_type);

        if !force
            && proposal.status != ProposalStatus::Approved
            && proposal.status != ProposalStatus::AutoApproved
        {
            crate::utils::logger::clear_current_campaign_id();
            return ExecutionRecord::failure(
                proposal_id,
                format!(
                    "Proposal status must be approved or auto_approved, got '{:?}'",
                    proposal.status
                ),
            );
        }

        let idempotency_key = format!("opt-proposal-{}", proposal.id);
        if let Some(existing) = store.get_execution_by_idempotency_key(&idempotency_key) {
            info!(target: "executor", "replaying existing execution {} via idempotency key", existing.id);
            crate::utils::logger::clear_current_campaign_id();
            return ExecutionRecord {
                success: true,
                proposal_id: proposal_id.to_string(),
                execution_id: Some(existing.id),
                error: None,
                platform_result: Some(existing.execution_plan),
            };
        }

        let record = if ADVISORY_ACTIONS.contains(&proposal.action_type.as_str()) {
            self.execute_advisory(store, &mut proposal, &idempotency_key)
        } else if PLATFORM_ACTIONS.contains(&proposal.action_type.as_str()) {
            self.execute_platform_action(store, &mut proposal, &idempotency_key).await
        } else {
            let error = format!("Unknown action_type: {}", proposal.action_type);
            proposal.status = ProposalStatus::Failed;
            proposal.execution_result = Some(serde_json::json!({ "error": error }));
            store.update_proposal(proposal.clone());
            warn!(target: "executor", "{}", error);
            ExecutionRecord::failure(proposal_id, error)
        };

        crate::utils::logger::clear_current_campaign_id();
        record
    }

    pub async fn execute_batch(
        &self,
        store: &OptimizerStore,
        proposal_ids: &[String],
    ) -> BatchExecutionResult {
        let mut result = BatchExecutionResult {
            total: proposal_ids.len(),
            ..Default::default()
        };
        for proposal_id in proposal_ids {
            let record = self.execute_proposal(store, proposal_id, false).await;
            if record.success {
                result.succeeded += 1;
            } else {
                result.failed += 1;
            }
            result.records.push(record);
        }
        info!(target: "executor", "batch complete: {}/{} succeeded", result.succeeded, result.total);
        result
    }

    fn execute_advisory(
        &self,
        store: &OptimizerStore,
        proposal: &mut OptimizationProposal,
        idempotency_key: &str,
    ) -> ExecutionRecord {
        let now = Utc::now();
        let execution_plan = serde_json::json!({
            "action_type": proposal.action_type,
            "advisory": true,
            "reasoning": proposal.reasoning,
            "payload": proposal.action_payload,
        });

        let execution = Execution {
            id: new_id(),
            campaign_id: proposal.campaign_id.clone(),
            platform: "advisory".to_string(),
            status: ExecutionStatus::Completed,
            execution_plan: execution_plan.clone(),
            external_campaign_id: None,
            external_ids: serde_json::json!({}),
            links: serde_json::json!({}),
            idempotency_key: idempotency_key.to_string(),
            error_message: None,
        };
        if let Err(err) = store.insert_execution(execution.clone()) {
            return ExecutionRecord::failure(proposal.id.clone(), err.message);
        }

        store.insert_execution_action(ExecutionAction {
            id: new_id(),
            execution_id: execution.id.clone(),
            action_type: ExecutionActionType::Advisory,
            idempotency_key: format!("{}-advisory", idempotency_key),
            request: serde_json::json!({ "advisory": true, "payload": proposal.action_payload }),
            response: serde_json::json!({ "status": "noted", "message": "Advisory action recorded" }),
            status: ExecutionActionStatus::Completed,
            duration_ms: 0,
            error_message: None,
        });

        proposal.status = ProposalStatus::Executed;
        proposal.executed_at = Some(now);
        proposal.execution_result = Some(serde_json::json!({
            "advisory": true,
            "execution_id": execution.id,
            "message": "Advisory action recorded — no platform changes made",
        }));
        store.update_proposal(proposal.clone());

        ExecutionRecord {
            success: true,
            proposal_id: proposal.id.clone(),
            execution_id: Some(execution.id),
            error: None,
            platform_result: Some(execution_plan),
        }
    }

    async fn execute_platform_action(
        &self,
        store: &OptimizerStore,
        proposal: &mut OptimizationProposal,
        idempotency_key: &str,
    ) -> ExecutionRecord {
        let now = Utc::now();
        let payload = proposal.action_payload.clone();

        let platform_str = payload.get("platform").and_then(|v| v.as_str()).unwrap_or("meta");
        let platform: Platform = serde_json::from_value(Value::String(platform_str.to_string()))
            .unwrap_or(Platform::Meta);

        let adapter = get_platform_adapter(platform, self.dry_run);

        let execution_plan = serde_json::json!({
            "action_type": proposal.action_type,
            "platform": platform.as_str(),
            "payload": payload,
        });

        let execution = Execution {
            id: new_id(),
            campaign_id: proposal.campaign_id.clone(),
            platform: platform.as_str().to_string(),
            status: ExecutionStatus::Running,
            execution_plan: execution_plan.clone(),
            external_campaign_id: None,
            external_ids: serde_json::json!({}),
            links: serde_json::json!({}),
            idempotency_key: idempotency_key.to_string(),
            error_message: None,
        };
        if let Err(err) = store.insert_execution(execution.clone()) {
            return ExecutionRecord::failure(proposal.id.clone(), err.message);
        }

        let (results, actions, overall_success) = match proposal.action_type.as_str() {
            "budget_reallocation" => {
                execute_budget_reallocation(adapter.as_ref(), platform, &execution, &payload).await
            }
            "pause_channel" => execute_pause(adapter.as_ref(), platform, &execution, &payload).await,
            "resume_channel" => execute_resume(adapter.as_ref(), platform, &execution, &payload).await,
            _ => (Vec::new(), Vec::new(), true),
        };

        for action in actions {
            store.insert_execution_action(action);
        }

        let mut execution = execution;
        execution.status = if overall_success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        store.update_execution(execution.clone());

        proposal.status = if overall_success {
            ProposalStatus::Executed
        } else {
            ProposalStatus::Failed
        };
        proposal.executed_at = Some(now);
        proposal.execution_result = Some(serde_json::json!({
            "execution_id": execution.id,
            "success": overall_success,
            "results": results,
        }));
        store.update_proposal(proposal.clone());

        ExecutionRecord {
            success: overall_success,
            proposal_id: proposal.id.clone(),
            execution_id: Some(execution.id),
            error: if overall_success {
                None
            } else {
                Some("One or more platform operations failed".to_string())
            },
            platform_result: Some(serde_json::json!({ "results": results })),
        }
    }
}

async fn execute_budget_reallocation(
    adapter: &dyn AdPlatformAdapter,
    platform: Platform,
    execution: &Execution,
    payload: &Value,
) -> (Vec<Value>, Vec<ExecutionAction>, bool) {
    let new_allocations: HashMap<String, f64> = payload
        .get("new_allocations")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default();

    let mut results = Vec::new();
    let mut actions = Vec::new();
    let mut overall_success = true;

    for (channel, new_budget) in &new_allocations {
        let ext_id = external_campaign_id(payload, channel);
        let platform_result = adapter.update_budget(&ext_id, *new_budget, platform).await;
        let success = platform_result.success;
        if !success {
            overall_success = false;
        }

        let response = result_to_value(&platform_result);
        results.push(merge_channel_result(channel, success, &response));

        actions.push(ExecutionAction {
            id: new_id(),
            execution_id: execution.id.clone(),
            action_type: ExecutionActionType::UpdateBudget,
            idempotency_key: format!("{}-budget-{}", execution.idempotency_key, channel),
            request: serde_json::json!({
                "channel": channel,
                "external_campaign_id": ext_id,
                "new_budget": new_budget,
            }),
            response,
            status: if success {
                ExecutionActionStatus::Completed
            } else {
                ExecutionActionStatus::Failed
            },
            duration_ms: 0,
            error_message: platform_result.error.clone(),
        });
    }

    (results, actions, overall_success)
}

async fn execute_pause(
    adapter: &dyn AdPlatformAdapter,
    platform: Platform,
    execution: &Execution,
    payload: &Value,
) -> (Vec<Value>, Vec<ExecutionAction>, bool) {
    let mut results = Vec::new();
    let mut actions = Vec::new();
    let mut overall_success = true;

    for channel in affected_channels(payload) {
        let ext_id = external_campaign_id(payload, &channel);
        let platform_result = adapter.pause_campaign(&ext_id, platform).await;
        let success = platform_result.success;
        if !success {
            overall_success = false;
        }
        let response = result_to_value(&platform_result);
        results.push(merge_channel_result(&channel, success, &response));
        actions.push(ExecutionAction {
            id: new_id(),
            execution_id: execution.id.clone(),
            action_type: ExecutionActionType::PauseCampaign,
            idempotency_key: format!("{}-pause-{}", execution.idempotency_key, channel),
            request: serde_json::json!({ "channel": channel, "external_campaign_id": ext_id }),
            response,
            status: if success {
                ExecutionActionStatus::Completed
            } else {
                ExecutionActionStatus::Failed
            },
            duration_ms: 0,
            error_message: platform_result.error.clone(),
        });
    }

    (results, actions, overall_success)
}

async fn execute_resume(
    adapter: &dyn AdPlatformAdapter,
    platform: Platform,
    execution: &Execution,
    payload: &Value,
) -> (Vec<Value>, Vec<ExecutionAction>, bool) {
    let mut results = Vec::new();
    let mut actions = Vec::new();
    let mut overall_success = true;

    for channel in affected_channels(payload) {
        let ext_id = external_campaign_id(payload, &channel);
        let platform_result = adapter.resume_campaign(&ext_id, platform).await;
        let success = platform_result.success;
        if !success {
            overall_success = false;
        }
        let response = result_to_value(&platform_result);
        results.push(merge_channel_result(&channel, success, &response));
        actions.push(ExecutionAction {
            id: new_id(),
            execution_id: execution.id.clone(),
            action_type: ExecutionActionType::ResumeCampaign,
            idempotency_key: format!("{}-resume-{}", execution.idempotency_key, channel),
            request: serde_json::json!({ "channel": channel, "external_campaign_id": ext_id }),
            response,
            status: if success {
                ExecutionActionStatus::Completed
            } else {
                ExecutionActionStatus::Failed
            },
            duration_ms: 0,
            error_message: platform_result.error.clone(),
        });
    }

    (results, actions, overall_success)
}

fn affected_channels(payload: &Value) -> Vec<String> {
    payload
        .get("affected_channels")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn external_campaign_id(payload: &Value, channel: &str) -> String {
    payload
        .get("external_campaign_ids")
        .and_then(|v| v.get(channel))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("campaign-{}", channel))
}

fn result_to_value(result: &ExecutionResult) -> Value {
    serde_json::json!({
        "success": result.success,
        "platform": result.platform.as_str(),
        "external_campaign_id": result.external_campaign_id,
        "external_ids": result.external_ids,
        "links": result.links,
        "error": result.error,
        "raw_response": result.raw_response,
    })
}

fn merge_channel_result(channel: &str, success: bool, response: &Value) -> Value {
    let mut merged = serde_json::json!({ "channel": channel, "success": success });
    if let (Some(merged_obj), Some(response_obj)) = (merged.as_object_mut(), response.as_object()) {
        for (key, value) in response_obj {
            merged_obj.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    merged
}
