use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;

use crate::data_models::entities::{
    Campaign, ChannelSnapshot, DerivedKpi, Execution, ExecutionAction, MethodStats, MonitorRun,
    OptimizationLearning, OptimizationMethod, OptimizationProposal, ProposalStatus, RawMetric,
    TrendIndicator, VerificationStatus,
};
use crate::errors::OptimizerError;
use crate::utils::ids::new_id;

const DEFAULT_MONITOR_RUN_AUDIT_PATH: &str = "data/optimization_runs/monitor_runs.jsonl";

/// In-process repository standing in for the relational schema in spec.md
/// §3/§6. One `RwLock`-guarded map per entity plus hand-maintained secondary
/// indexes, grounded on the teacher's file-backed `AnalyticsRunStore`
/// (`subsystems/marketing_data_analysis/persistence.rs`) pattern applied to
/// an in-memory store — `MonitorRun` additionally gets a JSONL audit trail
/// the same way that store appends runs.
pub struct OptimizerStore {
    campaigns: RwLock<HashMap<String, Campaign>>,

    snapshots: RwLock<HashMap<String, ChannelSnapshot>>,
    snapshots_by_campaign: RwLock<HashMap<String, Vec<String>>>,

    raw_metrics: RwLock<HashMap<String, RawMetric>>,
    raw_metrics_by_campaign: RwLock<HashMap<String, Vec<String>>>,

    derived_kpis: RwLock<HashMap<String, DerivedKpi>>,
    derived_kpis_by_campaign: RwLock<HashMap<String, Vec<String>>>,

    trend_indicators: RwLock<HashMap<String, TrendIndicator>>,
    trend_indicators_by_campaign: RwLock<HashMap<String, Vec<String>>>,

    methods: RwLock<HashMap<String, OptimizationMethod>>,
    methods_by_name: RwLock<HashMap<String, String>>,

    proposals: RwLock<HashMap<String, OptimizationProposal>>,
    proposals_by_campaign: RwLock<HashMap<String, Vec<String>>>,

    executions: RwLock<HashMap<String, Execution>>,
    executions_by_idempotency_key: RwLock<HashMap<String, String>>,

    execution_actions: RwLock<HashMap<String, ExecutionAction>>,
    execution_actions_by_execution: RwLock<HashMap<String, Vec<String>>>,

    learnings: RwLock<HashMap<String, OptimizationLearning>>,
    learnings_by_proposal: RwLock<HashMap<String, Vec<String>>>,

    monitor_runs: RwLock<HashMap<String, MonitorRun>>,
    monitor_runs_by_campaign: RwLock<HashMap<String, Vec<String>>>,
    monitor_run_audit_path: Option<PathBuf>,
}

impl Default for OptimizerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerStore {
    pub fn new() -> Self {
        Self {
            campaigns: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            snapshots_by_campaign: RwLock::new(HashMap::new()),
            raw_metrics: RwLock::new(HashMap::new()),
            raw_metrics_by_campaign: RwLock::new(HashMap::new()),
            derived_kpis: RwLock::new(HashMap::new()),
            derived_kpis_by_campaign: RwLock::new(HashMap::new()),
            trend_indicators: RwLock::new(HashMap::new()),
            trend_indicators_by_campaign: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
            methods_by_name: RwLock::new(HashMap::new()),
            proposals: RwLock::new(HashMap::new()),
            proposals_by_campaign: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            executions_by_idempotency_key: RwLock::new(HashMap::new()),
            execution_actions: RwLock::new(HashMap::new()),
            execution_actions_by_execution: RwLock::new(HashMap::new()),
            learnings: RwLock::new(HashMap::new()),
            learnings_by_proposal: RwLock::new(HashMap::new()),
            monitor_runs: RwLock::new(HashMap::new()),
            monitor_runs_by_campaign: RwLock::new(HashMap::new()),
            monitor_run_audit_path: Some(Self::default_monitor_run_audit_path()),
        }
    }

    /// Disables the JSONL audit trail, keeping `MonitorRun` rows in memory
    /// only. Used by tests that don't want filesystem side effects.
    pub fn without_audit_trail(mut self) -> Self {
        self.monitor_run_audit_path = None;
        self
    }

    pub fn with_audit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.monitor_run_audit_path = Some(path.into());
        self
    }

    fn default_monitor_run_audit_path() -> PathBuf {
        std::env::var("OPTIMIZATION_RUN_AUDIT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MONITOR_RUN_AUDIT_PATH))
    }

    // --- Campaign ---

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns
            .write()
            .expect("campaigns lock poisoned")
            .insert(campaign.id.clone(), campaign);
    }

    pub fn get_campaign(&self, campaign_id: &str) -> Option<Campaign> {
        self.campaigns
            .read()
            .expect("campaigns lock poisoned")
            .get(campaign_id)
            .cloned()
    }

    /// Cascade-deletes every per-campaign row except `Execution`, whose
    /// rows survive proposal deletion for audit (spec: ownership by
    /// `idempotency_key`, not a foreign key).
    pub fn delete_campaign(&self, campaign_id: &str) {
        self.campaigns
            .write()
            .expect("campaigns lock poisoned")
            .remove(campaign_id);

        for id in self.take_index(&self.snapshots_by_campaign, campaign_id) {
            self.snapshots.write().expect("snapshots lock poisoned").remove(&id);
        }
        for id in self.take_index(&self.raw_metrics_by_campaign, campaign_id) {
            self.raw_metrics
                .write()
                .expect("raw_metrics lock poisoned")
                .remove(&id);
        }
        for id in self.take_index(&self.derived_kpis_by_campaign, campaign_id) {
            self.derived_kpis
                .write()
                .expect("derived_kpis lock poisoned")
                .remove(&id);
        }
        for id in self.take_index(&self.trend_indicators_by_campaign, campaign_id) {
            self.trend_indicators
                .write()
                .expect("trend_indicators lock poisoned")
                .remove(&id);
        }
        for id in self.take_index(&self.proposals_by_campaign, campaign_id) {
            self.proposals.write().expect("proposals lock poisoned").remove(&id);
        }
    }

    fn take_index(&self, index: &RwLock<HashMap<String, Vec<String>>>, key: &str) -> Vec<String> {
        index
            .write()
            .expect("index lock poisoned")
            .remove(key)
            .unwrap_or_default()
    }

    // --- ChannelSnapshot ---

    pub fn insert_snapshot(&self, snapshot: ChannelSnapshot) {
        self.snapshots_by_campaign
            .write()
            .expect("snapshots_by_campaign lock poisoned")
            .entry(snapshot.campaign_id.clone())
            .or_default()
            .push(snapshot.id.clone());
        self.snapshots
            .write()
            .expect("snapshots lock poisoned")
            .insert(snapshot.id.clone(), snapshot);
    }

    pub fn list_snapshots_by_campaign(&self, campaign_id: &str) -> Vec<ChannelSnapshot> {
        self.list_indexed(&self.snapshots_by_campaign, &self.snapshots, campaign_id)
    }

    // --- RawMetric ---

    pub fn insert_raw_metric(&self, metric: RawMetric) {
        self.raw_metrics_by_campaign
            .write()
            .expect("raw_metrics_by_campaign lock poisoned")
            .entry(metric.campaign_id.clone())
            .or_default()
            .push(metric.id.clone());
        self.raw_metrics
            .write()
            .expect("raw_metrics lock poisoned")
            .insert(metric.id.clone(), metric);
    }

    pub fn list_raw_metrics_by_campaign(&self, campaign_id: &str) -> Vec<RawMetric> {
        self.list_indexed(&self.raw_metrics_by_campaign, &self.raw_metrics, campaign_id)
    }

    // --- DerivedKpi ---

    pub fn insert_derived_kpi(&self, kpi: DerivedKpi) {
        self.derived_kpis_by_campaign
            .write()
            .expect("derived_kpis_by_campaign lock poisoned")
            .entry(kpi.campaign_id.clone())
            .or_default()
            .push(kpi.id.clone());
        self.derived_kpis
            .write()
            .expect("derived_kpis lock poisoned")
            .insert(kpi.id.clone(), kpi);
    }

    pub fn list_derived_kpis_by_campaign(&self, campaign_id: &str) -> Vec<DerivedKpi> {
        self.list_indexed(&self.derived_kpis_by_campaign, &self.derived_kpis, campaign_id)
    }

    // --- TrendIndicator ---

    pub fn insert_trend_indicator(&self, trend: TrendIndicator) {
        self.trend_indicators_by_campaign
            .write()
            .expect("trend_indicators_by_campaign lock poisoned")
            .entry(trend.campaign_id.clone())
            .or_default()
            .push(trend.id.clone());
        self.trend_indicators
            .write()
            .expect("trend_indicators lock poisoned")
            .insert(trend.id.clone(), trend);
    }

    fn list_indexed<T: Clone>(
        &self,
        index: &RwLock<HashMap<String, Vec<String>>>,
        table: &RwLock<HashMap<String, T>>,
        key: &str,
    ) -> Vec<T> {
        let ids = index
            .read()
            .expect("index lock poisoned")
            .get(key)
            .cloned()
            .unwrap_or_default();
        let table = table.read().expect("table lock poisoned");
        ids.iter().filter_map(|id| table.get(id).cloned()).collect()
    }

    // --- OptimizationMethod ---

    /// Returns the method row for `action_type`, creating one with sensible
    /// defaults on first use. `name` doubles as the unique lookup key, since
    /// the engine keys methods by `action_type` rather than by a Rust-level
    /// method identifier.
    pub fn get_or_create_method(
        &self,
        name: &str,
        description: &str,
        method_type: crate::data_models::entities::MethodType,
        cooldown_minutes: i64,
    ) -> OptimizationMethod {
        if let Some(id) = self
            .methods_by_name
            .read()
            .expect("methods_by_name lock poisoned")
            .get(name)
            .cloned()
        {
            return self
                .methods
                .read()
                .expect("methods lock poisoned")
                .get(&id)
                .cloned()
                .expect("method index must reference an existing row");
        }

        let method = OptimizationMethod {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            method_type,
            trigger_conditions: serde_json::json!({}),
            config: serde_json::json!({}),
            is_active: true,
            cooldown_minutes,
            stats: MethodStats::default(),
        };
        self.methods_by_name
            .write()
            .expect("methods_by_name lock poisoned")
            .insert(name.to_string(), method.id.clone());
        self.methods
            .write()
            .expect("methods lock poisoned")
            .insert(method.id.clone(), method.clone());
        method
    }

    pub fn get_method(&self, method_id: &str) -> Option<OptimizationMethod> {
        self.methods
            .read()
            .expect("methods lock poisoned")
            .get(method_id)
            .cloned()
    }

    pub fn update_method_stats(&self, method_id: &str, stats: MethodStats) {
        if let Some(method) = self
            .methods
            .write()
            .expect("methods lock poisoned")
            .get_mut(method_id)
        {
            method.stats = stats;
        }
    }

    // --- OptimizationProposal ---

    pub fn insert_proposal(&self, proposal: OptimizationProposal) {
        self.proposals_by_campaign
            .write()
            .expect("proposals_by_campaign lock poisoned")
            .entry(proposal.campaign_id.clone())
            .or_default()
            .push(proposal.id.clone());
        self.proposals
            .write()
            .expect("proposals lock poisoned")
            .insert(proposal.id.clone(), proposal);
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Option<OptimizationProposal> {
        self.proposals
            .read()
            .expect("proposals lock poisoned")
            .get(proposal_id)
            .cloned()
    }

    pub fn update_proposal(&self, proposal: OptimizationProposal) {
        self.proposals
            .write()
            .expect("proposals lock poisoned")
            .insert(proposal.id.clone(), proposal);
    }

    pub fn list_proposals_by_campaign(&self, campaign_id: &str) -> Vec<OptimizationProposal> {
        self.list_indexed(&self.proposals_by_campaign, &self.proposals, campaign_id)
    }

    pub fn list_proposals_by_campaign_and_status(
        &self,
        campaign_id: &str,
        status: ProposalStatus,
    ) -> Vec<OptimizationProposal> {
        self.list_proposals_by_campaign(campaign_id)
            .into_iter()
            .filter(|p| p.status == status)
            .collect()
    }

    /// Most recent proposal for `campaign_id` carrying `action_type`, used
    /// by the cooldown guardrail (keyed by action type, not method name).
    pub fn last_proposal_for_action(
        &self,
        campaign_id: &str,
        action_type: &str,
    ) -> Option<OptimizationProposal> {
        self.list_proposals_by_campaign(campaign_id)
            .into_iter()
            .filter(|p| p.action_type == action_type)
            .max_by_key(|p| p.created_at)
    }

    // --- Execution ---

    pub fn insert_execution(&self, execution: Execution) -> Result<(), OptimizerError> {
        let mut by_key = self
            .executions_by_idempotency_key
            .write()
            .expect("executions_by_idempotency_key lock poisoned");
        if by_key.contains_key(&execution.idempotency_key) {
            return Err(OptimizerError::persistence(format!(
                "idempotency_key '{}' already exists",
                execution.idempotency_key
            )));
        }
        by_key.insert(execution.idempotency_key.clone(), execution.id.clone());
        drop(by_key);

        self.executions
            .write()
            .expect("executions lock poisoned")
            .insert(execution.id.clone(), execution);
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.executions
            .read()
            .expect("executions lock poisoned")
            .get(execution_id)
            .cloned()
    }

    pub fn get_execution_by_idempotency_key(&self, idempotency_key: &str) -> Option<Execution> {
        let id = self
            .executions_by_idempotency_key
            .read()
            .expect("executions_by_idempotency_key lock poisoned")
            .get(idempotency_key)
            .cloned()?;
        self.get_execution(&id)
    }

    pub fn update_execution(&self, execution: Execution) {
        self.executions
            .write()
            .expect("executions lock poisoned")
            .insert(execution.id.clone(), execution);
    }

    // --- ExecutionAction ---

    pub fn insert_execution_action(&self, action: ExecutionAction) {
        self.execution_actions_by_execution
            .write()
            .expect("execution_actions_by_execution lock poisoned")
            .entry(action.execution_id.clone())
            .or_default()
            .push(action.id.clone());
        self.execution_actions
            .write()
            .expect("execution_actions lock poisoned")
            .insert(action.id.clone(), action);
    }

    pub fn list_actions_by_execution(&self, execution_id: &str) -> Vec<ExecutionAction> {
        self.list_indexed(
            &self.execution_actions_by_execution,
            &self.execution_actions,
            execution_id,
        )
    }

    // --- OptimizationLearning ---

    /// Inserts a learning row, enforcing "at most one verified row per
    /// proposal_id". Non-verified rows (pending/failed) are unconstrained.
    pub fn insert_learning(
        &self,
        learning: OptimizationLearning,
    ) -> Result<(), OptimizerError> {
        if learning.verification_status == VerificationStatus::Verified
            && self
                .verified_learning_for_proposal(&learning.proposal_id)
                .is_some()
        {
            return Err(OptimizerError::persistence(format!(
                "proposal '{}' already has a verified learning row",
                learning.proposal_id
            )));
        }

        self.learnings_by_proposal
            .write()
            .expect("learnings_by_proposal lock poisoned")
            .entry(learning.proposal_id.clone())
            .or_default()
            .push(learning.id.clone());
        self.learnings
            .write()
            .expect("learnings lock poisoned")
            .insert(learning.id.clone(), learning);
        Ok(())
    }

    pub fn verified_learning_for_proposal(
        &self,
        proposal_id: &str,
    ) -> Option<OptimizationLearning> {
        self.list_learnings_by_proposal(proposal_id)
            .into_iter()
            .find(|l| l.verification_status == VerificationStatus::Verified)
    }

    pub fn list_learnings_by_proposal(&self, proposal_id: &str) -> Vec<OptimizationLearning> {
        self.list_indexed(&self.learnings_by_proposal, &self.learnings, proposal_id)
    }

    // --- MonitorRun ---

    pub fn insert_monitor_run(&self, run: MonitorRun) -> Result<(), OptimizerError> {
        if let Some(path) = &self.monitor_run_audit_path {
            append_jsonl(path, &run)?;
        }
        self.monitor_runs_by_campaign
            .write()
            .expect("monitor_runs_by_campaign lock poisoned")
            .entry(run.campaign_id.clone())
            .or_default()
            .push(run.id.clone());
        self.monitor_runs
            .write()
            .expect("monitor_runs lock poisoned")
            .insert(run.id.clone(), run);
        Ok(())
    }

    pub fn list_monitor_runs_by_campaign(&self, campaign_id: &str) -> Vec<MonitorRun> {
        self.list_indexed(&self.monitor_runs_by_campaign, &self.monitor_runs, campaign_id)
    }
}

fn append_jsonl(path: &Path, run: &MonitorRun) -> Result<(), OptimizerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| {
                OptimizerError::persistence(format!(
                    "failed to create monitor run audit directory: {err}"
                ))
            })?;
        }
    }
    let line = serde_json::to_string(run).map_err(|err| {
        OptimizerError::persistence(format!("failed to serialize monitor run: {err}"))
    })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| {
            OptimizerError::persistence(format!("failed to open monitor run audit log: {err}"))
        })?;
    file.write_all(line.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .map_err(|err| {
            OptimizerError::persistence(format!("failed to append monitor run: {err}"))
        })
}
