use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// External entity: created/deleted outside the optimization core, only
/// referenced by it. Timezone-naive timestamps anywhere in the system are
/// assumed UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub objective: String,
    pub target_cac: Option<Decimal>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

/// Immutable, insert-only. The only input data the core trusts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSnapshot {
    pub id: String,
    pub campaign_id: String,
    pub channel: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub spend: Decimal,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub revenue: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Spend,
    Impressions,
    Clicks,
    Conversions,
    Revenue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Count,
    Currency,
}

/// Produced by the Metrics Collector; immutable. `source` is always
/// `"snapshot"` for the current ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawMetric {
    pub id: String,
    pub campaign_id: String,
    pub channel: String,
    pub metric_name: MetricName,
    pub metric_value: f64,
    pub metric_unit: MetricUnit,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KpiName {
    Ctr,
    Cvr,
    Cpc,
    Cpm,
    Cpa,
    Roas,
}

/// `channel = None` denotes a campaign-level KPI. If `kpi_value` is
/// recorded, its denominator was non-zero — callers never see a KPI for an
/// undefined ratio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DerivedKpi {
    pub id: String,
    pub campaign_id: String,
    pub channel: Option<String>,
    pub kpi_name: KpiName,
    pub kpi_value: f64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub input_metrics: Value,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// `direction = Stable` iff `|change| <= 0.02`. The Trend Analyzer stores
/// the raw signed ratio in `previous_value`/`current_value`; callers
/// (methods) interpret whether a given KPI's improvement is an increase or
/// a decrease.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendIndicator {
    pub id: String,
    pub campaign_id: String,
    pub channel: Option<String>,
    pub kpi_name: KpiName,
    pub direction: TrendDirection,
    pub magnitude: f64,
    pub period_days: i64,
    pub current_value: f64,
    pub previous_value: f64,
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    Reactive,
    Proactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MethodStats {
    pub total_executions: i64,
    pub successful_executions: i64,
    pub avg_accuracy: f64,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// A row is created lazily the first time a method emits a proposal, keyed
/// by `action_type` (not by the Rust-level method identifier).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationMethod {
    pub id: String,
    pub name: String,
    pub description: String,
    pub method_type: MethodType,
    pub trigger_conditions: Value,
    pub config: Value,
    pub is_active: bool,
    pub cooldown_minutes: i64,
    pub stats: MethodStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    AutoApproved,
    Approved,
    Rejected,
    Executed,
    Failed,
    Expired,
}

/// Lifecycle (see module docs in `engine` and `executor`):
///
/// ```text
/// pending --approve--> approved --execute--> executed --verify--> (learning)
///   |                                            |
///   |                                            +--fail--> failed
///   +--auto (conf >= threshold)--> auto_approved --execute--> executed
///   +--reject--> rejected
///   +--time--> expired (observed, not actively swept)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationProposal {
    pub id: String,
    pub campaign_id: String,
    pub method_id: String,
    pub status: ProposalStatus,
    pub confidence: f64,
    pub priority: i32,
    pub action_type: String,
    pub action_payload: Value,
    pub reasoning: String,
    pub trigger_data: Value,
    pub guardrail_checks: Value,
    pub execution_result: Option<Value>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

/// One per proposal (idempotency key `opt-proposal-{proposal.id}`) or per
/// direct agent request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub campaign_id: String,
    pub platform: String,
    pub status: ExecutionStatus,
    pub execution_plan: Value,
    pub external_campaign_id: Option<String>,
    pub external_ids: Value,
    pub links: Value,
    pub idempotency_key: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionActionType {
    CreateCampaign,
    UpdateBudget,
    PauseCampaign,
    ResumeCampaign,
    /// Advisory-only sub-action (e.g. `creative_refresh`) that records
    /// intent without a platform call. The original free-text
    /// `action_type` column is narrowed to this one variant here since no
    /// advisory action currently carries platform-specific shape.
    Advisory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionActionStatus {
    Pending,
    Completed,
    Failed,
}

/// One per sub-operation against the platform. `idempotency_key` is unique
/// only within its owning execution, not globally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionAction {
    pub id: String,
    pub execution_id: String,
    pub action_type: ExecutionActionType,
    pub idempotency_key: String,
    pub request: Value,
    pub response: Value,
    pub status: ExecutionActionStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

/// At most one `Verified` row per `proposal_id`, enforced by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationLearning {
    pub id: String,
    pub campaign_id: String,
    pub proposal_id: String,
    pub method_id: String,
    pub predicted_impact: Value,
    pub actual_impact: Option<Value>,
    pub accuracy_score: Option<f64>,
    pub verification_status: VerificationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorRunStatus {
    Completed,
    Partial,
    Failed,
}

/// Created exactly once per `run_cycle` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorRun {
    pub id: String,
    pub campaign_id: String,
    pub status: MonitorRunStatus,
    pub engine_summary: Value,
    pub execution_summary: Value,
    pub verification_summary: Value,
    pub created_at: DateTime<Utc>,
}
