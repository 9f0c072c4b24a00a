use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::platforms::base::{
    AdPlatformAdapter, ExecutionPlan, ExecutionResult, Platform, ValidationIssue,
    ValidationSeverity,
};
use crate::utils::ids::new_id;

/// Simulates platform API calls with realistic fake responses. Used for
/// development and as the default adapter (`USE_DRY_RUN_EXECUTION=true`)
/// before any real platform credentials are wired up.
pub struct DryRunExecutor {
    created: RwLock<HashMap<String, ExecutionPlan>>,
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self {
            created: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AdPlatformAdapter for DryRunExecutor {
    async fn validate_plan(&self, plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if plan.total_budget <= 0.0 {
            issues.push(ValidationIssue {
                field: "total_budget".to_string(),
                message: "Budget must be positive".to_string(),
                severity: ValidationSeverity::Error,
            });
        }
        if plan.campaign_name.trim().is_empty() {
            issues.push(ValidationIssue {
                field: "campaign_name".to_string(),
                message: "Campaign name is required".to_string(),
                severity: ValidationSeverity::Error,
            });
        }
        if plan.ad_sets.is_empty() {
            issues.push(ValidationIssue {
                field: "ad_sets".to_string(),
                message: "At least one ad set is required".to_string(),
                severity: ValidationSeverity::Warning,
            });
        }
        issues
    }

    async fn create_campaign(&self, plan: &ExecutionPlan, idempotency_key: &str) -> ExecutionResult {
        if self
            .created
            .read()
            .expect("created lock poisoned")
            .contains_key(idempotency_key)
        {
            let ext_id = format!("dry-run-{}", &idempotency_key[..idempotency_key.len().min(8)]);
            let mut result = ExecutionResult::success(plan.platform);
            result.external_campaign_id = Some(ext_id.clone());
            result.external_ids.insert("campaign".to_string(), ext_id);
            result.raw_response = serde_json::json!({ "note": "idempotent_replay" });
            return result;
        }

        let issues = self.validate_plan(plan).await;
        let has_errors = issues.iter().any(|i| i.severity == ValidationSeverity::Error);
        if has_errors {
            let mut result = ExecutionResult::failure(plan.platform, "Validation failed");
            result.validation_issues = issues;
            return result;
        }

        let ext_id = format!("dry-run-{}", &new_id()[..8]);
        self.created
            .write()
            .expect("created lock poisoned")
            .insert(idempotency_key.to_string(), plan.clone());

        let mut external_ids = HashMap::new();
        external_ids.insert("campaign".to_string(), ext_id.clone());
        for ad_set in &plan.ad_sets {
            external_ids.insert(ad_set.name.clone(), format!("dry-run-adset-{}", &new_id()[..6]));
        }

        let mut links = HashMap::new();
        links.insert(
            "campaign_url".to_string(),
            format!("https://dry-run.example.com/campaigns/{}", ext_id),
        );

        let mut result = ExecutionResult::success(plan.platform);
        result.external_campaign_id = Some(ext_id);
        result.external_ids = external_ids;
        result.links = links;
        result.raw_response = serde_json::json!({
            "dry_run": true,
            "plan_summary": {
                "name": plan.campaign_name,
                "budget": plan.total_budget,
                "ad_sets": plan.ad_sets.len(),
            },
        });
        result
    }

    async fn pause_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult {
        let mut result = ExecutionResult::success(platform);
        result.external_campaign_id = Some(external_campaign_id.to_string());
        result.raw_response = serde_json::json!({ "status": "paused", "dry_run": true });
        result
    }

    async fn resume_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult {
        let mut result = ExecutionResult::success(platform);
        result.external_campaign_id = Some(external_campaign_id.to_string());
        result.raw_response = serde_json::json!({ "status": "active", "dry_run": true });
        result
    }

    async fn update_budget(
        &self,
        external_campaign_id: &str,
        new_budget: f64,
        platform: Platform,
    ) -> ExecutionResult {
        if new_budget <= 0.0 {
            let mut result = ExecutionResult::failure(platform, "Budget must be positive");
            result.external_campaign_id = Some(external_campaign_id.to_string());
            return result;
        }
        let mut result = ExecutionResult::success(platform);
        result.external_campaign_id = Some(external_campaign_id.to_string());
        result.raw_response = serde_json::json!({
            "new_budget": new_budget,
            "status": "budget_updated",
            "dry_run": true,
        });
        result
    }
}
