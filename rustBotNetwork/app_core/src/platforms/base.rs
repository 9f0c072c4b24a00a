use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Meta,
    Google,
    LinkedIn,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
            Platform::LinkedIn => "linkedin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: ValidationSeverity,
}

#[derive(Debug, Clone, Default)]
pub struct AdSetSpec {
    pub name: String,
    pub daily_budget: f64,
    pub targeting: Value,
    pub creative: Value,
    pub bid_strategy: String,
}

/// Normalised execution payload — what gets sent to a platform adapter.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub platform: Platform,
    pub campaign_name: String,
    pub objective: String,
    pub total_budget: f64,
    pub currency: String,
    pub ad_sets: Vec<AdSetSpec>,
    pub metadata: Value,
}

/// Standardised result returned after any platform interaction.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub platform: Platform,
    pub external_campaign_id: Option<String>,
    pub external_ids: HashMap<String, String>,
    pub links: HashMap<String, String>,
    pub validation_issues: Vec<ValidationIssue>,
    pub error: Option<String>,
    pub raw_response: Value,
}

impl ExecutionResult {
    pub fn success(platform: Platform) -> Self {
        Self {
            success: true,
            platform,
            external_campaign_id: None,
            external_ids: HashMap::new(),
            links: HashMap::new(),
            validation_issues: Vec::new(),
            error: None,
            raw_response: Value::Null,
        }
    }

    pub fn failure(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            success: false,
            platform,
            external_campaign_id: None,
            external_ids: HashMap::new(),
            links: HashMap::new(),
            validation_issues: Vec::new(),
            error: Some(error.into()),
            raw_response: Value::Null,
        }
    }
}

/// Base contract for all advertising platform integrations. The Action
/// Executor calls through this trait without knowing which platform is
/// behind it. Implementors may internally block on network I/O but must
/// not hold cross-call state beyond an idempotency cache and (optionally)
/// an image-hash-to-upload-handle cache.
#[async_trait]
pub trait AdPlatformAdapter: Send + Sync {
    async fn validate_plan(&self, plan: &ExecutionPlan) -> Vec<ValidationIssue>;

    async fn create_campaign(&self, plan: &ExecutionPlan, idempotency_key: &str) -> ExecutionResult;

    async fn pause_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult;

    async fn resume_campaign(&self, external_campaign_id: &str, platform: Platform) -> ExecutionResult;

    async fn update_budget(
        &self,
        external_campaign_id: &str,
        new_budget: f64,
        platform: Platform,
    ) -> ExecutionResult;
}
