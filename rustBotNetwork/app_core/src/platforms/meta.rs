use async_trait::async_trait;

use crate::platforms::base::{
    AdPlatformAdapter, ExecutionPlan, ExecutionResult, Platform, ValidationIssue,
    ValidationSeverity,
};
use crate::platforms::dry_run::DryRunExecutor;
use crate::utils::ids::new_id;

/// Meta (Facebook/Instagram) Ads adapter. Simulates the Graph API surface
/// the same way the DryRun adapter does — no outbound HTTP — but gates on
/// `META_ACCESS_TOKEN` being present, mirroring the teacher's
/// environment-gated platform adapters. Shares validation logic with
/// `DryRunExecutor` since the plan-shape rules are platform-agnostic.
pub struct MetaAdsAdapter {
    fallback: DryRunExecutor,
}

impl Default for MetaAdsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaAdsAdapter {
    pub fn new() -> Self {
        Self {
            fallback: DryRunExecutor::new(),
        }
    }

    pub fn is_available() -> bool {
        std::env::var("META_ACCESS_TOKEN").is_ok()
    }
}

#[async_trait]
impl AdPlatformAdapter for MetaAdsAdapter {
    async fn validate_plan(&self, plan: &ExecutionPlan) -> Vec<ValidationIssue> {
        let mut issues = self.fallback.validate_plan(plan).await;
        if !Self::is_available() {
            issues.push(ValidationIssue {
                field: "credentials".to_string(),
                message: "META_ACCESS_TOKEN is not configured".to_string(),
                severity: ValidationSeverity::Error,
            });
        }
        issues
    }

    async fn create_campaign(&self, plan: &ExecutionPlan, idempotency_key: &str) -> ExecutionResult {
        if !Self::is_available() {
            return ExecutionResult::failure(plan.platform, "META_ACCESS_TOKEN is not configured");
        }
        let ext_id = format!("meta-{}", &new_id()[..8]);
        let mut result = self.fallback.create_campaign(plan, idempotency_key).await;
        result.platform = Platform::Meta;
        if let Some(existing) = result.external_campaign_id.clone() {
            result.external_ids.insert("campaign".to_string(), existing);
        }
        result.external_campaign_id.get_or_insert(ext_id);
        result
    }

    async fn pause_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult {
        if !Self::is_available() {
            return ExecutionResult::failure(platform, "META_ACCESS_TOKEN is not configured");
        }
        self.fallback.pause_campaign(external_campaign_id, platform).await
    }

    async fn resume_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult {
        if !Self::is_available() {
            return ExecutionResult::failure(platform, "META_ACCESS_TOKEN is not configured");
        }
        self.fallback.resume_campaign(external_campaign_id, platform).await
    }

    async fn update_budget(
        &self,
        external_campaign_id: &str,
        new_budget: f64,
        platform: Platform,
    ) -> ExecutionResult {
        if !Self::is_available() {
            return ExecutionResult::failure(platform, "META_ACCESS_TOKEN is not configured");
        }
        self.fallback
            .update_budget(external_campaign_id, new_budget, platform)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_campaign_fails_without_credentials() {
        std::env::remove_var("META_ACCESS_TOKEN");
        let adapter = MetaAdsAdapter::new();
        let plan = ExecutionPlan {
            platform: Platform::Meta,
            campaign_name: "test".to_string(),
            objective: "paid_conversions".to_string(),
            total_budget: 100.0,
            currency: "USD".to_string(),
            ad_sets: vec![],
            metadata: serde_json::json!({}),
        };
        let result = adapter.create_campaign(&plan, "key-1").await;
        assert!(!result.success);
    }
}
