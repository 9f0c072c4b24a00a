use crate::platforms::base::AdPlatformAdapter;
use crate::platforms::dry_run::DryRunExecutor;
use crate::platforms::meta::MetaAdsAdapter;
use crate::platforms::base::Platform;

/// Returns the adapter for `platform`. When `dry_run` is true (the
/// `USE_DRY_RUN_EXECUTION` default), every platform routes through
/// `DryRunExecutor` regardless of which one was requested. Only Meta has a
/// non-dry-run adapter in this core; Google and LinkedIn are recognized
/// identifiers but have no live integration yet.
pub fn get_platform_adapter(platform: Platform, dry_run: bool) -> Box<dyn AdPlatformAdapter> {
    if dry_run {
        return Box::new(DryRunExecutor::new());
    }

    match platform {
        Platform::Meta => Box::new(MetaAdsAdapter::new()),
        Platform::Google | Platform::LinkedIn => Box::new(DryRunExecutor::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_flag_always_returns_dry_run_adapter() {
        let adapter = get_platform_adapter(Platform::Google, true);
        let plan = crate::platforms::base::ExecutionPlan {
            platform: Platform::Google,
            campaign_name: "x".to_string(),
            objective: "leads".to_string(),
            total_budget: 50.0,
            currency: "USD".to_string(),
            ad_sets: vec![],
            metadata: serde_json::json!({}),
        };
        let issues = adapter.validate_plan(&plan).await;
        assert!(issues.is_empty());
    }
}
