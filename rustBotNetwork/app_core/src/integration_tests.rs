//! End-to-end scenarios exercising the full observe/decide/act/verify
//! pipeline through the public `OptimizerStore` + engine/executor/verifier
//! API, as opposed to the unit tests colocated with each module.

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::config::OptimizerSettings;
    use crate::data_models::entities::{
        Campaign, ChannelSnapshot, DerivedKpi, KpiName, OptimizationProposal, ProposalStatus,
    };
    use crate::engine::DecisionEngine;
    use crate::executor::ActionExecutor;
    use crate::methods::build_default_registry;
    use crate::monitor::OptimizationMonitor;
    use crate::store::OptimizerStore;
    use crate::utils::ids::new_id;
    use crate::verifier::OutcomeVerifier;

    fn campaign(id: &str) -> Campaign {
        Campaign {
            id: id.to_string(),
            name: "integration test campaign".to_string(),
            objective: "paid_conversions".to_string(),
            target_cac: None,
            window_start: None,
            window_end: None,
        }
    }

    fn snapshot(campaign_id: &str, channel: &str, spend: f64, conversions: i64) -> ChannelSnapshot {
        ChannelSnapshot {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: channel.to_string(),
            window_start: Utc::now() - Duration::days(1),
            window_end: Utc::now(),
            spend: Decimal::try_from(spend).expect("finite spend"),
            impressions: 100_000,
            clicks: 2_000,
            conversions,
            revenue: Decimal::try_from(spend * 2.0).expect("finite revenue"),
            created_at: Utc::now(),
        }
    }

    /// Seeds a stable (non-spiking) CPA trend for `channel` so `cpa_spike`
    /// judges the channel against `cpa_value` rather than falling back to
    /// the campaign-wide average.
    fn seed_stable_cpa_trend(store: &OptimizerStore, campaign_id: &str, channel: &str, cpa_value: f64) {
        let now = Utc::now();
        store.insert_derived_kpi(DerivedKpi {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: Some(channel.to_string()),
            kpi_name: KpiName::Cpa,
            kpi_value: cpa_value,
            window_start: Some(now - Duration::days(6)),
            window_end: Some(now - Duration::days(1)),
            input_metrics: serde_json::json!({}),
            computed_at: now,
        });
        store.insert_derived_kpi(DerivedKpi {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: Some(channel.to_string()),
            kpi_name: KpiName::Cpa,
            kpi_value: cpa_value,
            window_start: Some(now - Duration::days(13)),
            window_end: Some(now - Duration::days(8)),
            input_metrics: serde_json::json!({}),
            computed_at: now,
        });
    }

    /// Seeds a declining CPA trend (spike) for `channel`: previous vs. current.
    fn seed_cpa_spike_trend(store: &OptimizerStore, campaign_id: &str, channel: &str, previous: f64, current: f64) {
        let now = Utc::now();
        store.insert_derived_kpi(DerivedKpi {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: Some(channel.to_string()),
            kpi_name: KpiName::Cpa,
            kpi_value: current,
            window_start: Some(now - Duration::days(6)),
            window_end: Some(now - Duration::days(1)),
            input_metrics: serde_json::json!({}),
            computed_at: now,
        });
        store.insert_derived_kpi(DerivedKpi {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: Some(channel.to_string()),
            kpi_name: KpiName::Cpa,
            kpi_value: previous,
            window_start: Some(now - Duration::days(13)),
            window_end: Some(now - Duration::days(8)),
            input_metrics: serde_json::json!({}),
            computed_at: now,
        });
    }

    // --- Scenario 1: CPA spike detected on one channel ---

    #[test]
    fn cpa_spike_on_one_channel_proposes_a_budget_cut() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        store.insert_snapshot(snapshot("c1", "meta", 3000.0, 60));
        store.insert_snapshot(snapshot("c1", "google", 2000.0, 133));
        seed_cpa_spike_trend(&store, "c1", "meta", 25.0, 50.0);
        seed_stable_cpa_trend(&store, "c1", "google", 2000.0 / 133.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        let result = engine.run("c1");

        assert!(result.success);
        let proposals = store.list_proposals_by_campaign("c1");
        let cpa_proposal = proposals
            .iter()
            .find(|p| p.action_payload.get("reductions").is_some())
            .expect("cpa_spike proposal created");

        assert_eq!(cpa_proposal.action_type, "budget_reallocation");
        assert_eq!(cpa_proposal.priority, 2);
        let reduction = cpa_proposal.action_payload["reductions"]["meta"]
            .as_f64()
            .expect("meta reduction present");
        assert_abs_diff_eq!(reduction, 3000.0 * 0.20, epsilon = 1.0);

        let checks = cpa_proposal.guardrail_checks["checks"].as_array().unwrap();
        assert!(checks.iter().all(|c| c["passed"].as_bool().unwrap()));
    }

    // --- Scenario 2: Budget reallocation fires on efficiency spread ---

    #[test]
    fn efficiency_spread_triggers_budget_reallocation() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        // Equal spend shares (50/50) with efficiency 1.5 / 0.5 keeps the
        // proposed move exactly at the default 20% guardrail boundary.
        store.insert_snapshot(snapshot("c1", "meta", 5000.0, 750));
        store.insert_snapshot(snapshot("c1", "google", 5000.0, 250));
        seed_stable_cpa_trend(&store, "c1", "meta", 5000.0 / 750.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        let result = engine.run("c1");

        assert!(result.success);
        let proposals = store.list_proposals_by_campaign("c1");
        let reallocation = proposals
            .iter()
            .find(|p| p.action_payload.get("top_tier").is_some())
            .expect("budget_reallocation method proposal created");

        assert_eq!(
            reallocation.action_payload["top_tier"],
            serde_json::json!(["meta"])
        );
        assert_eq!(
            reallocation.action_payload["bottom_tier"],
            serde_json::json!(["google"])
        );
        let move_amount = reallocation.action_payload["move_amount"].as_f64().unwrap();
        assert_abs_diff_eq!(move_amount, 1000.0, epsilon = 1.0);
    }

    // --- Scenario 3: Guardrail blocks an over-large move ---

    #[test]
    fn oversized_reallocation_is_blocked_by_the_budget_change_guardrail() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        // Same efficiency spread idea as scenario 2 but with a lopsided
        // spend split (2:1), so the bottom channel's proposed cut exceeds
        // the 20% change limit.
        store.insert_snapshot(snapshot("c1", "meta", 2000.0, 80));
        store.insert_snapshot(snapshot("c1", "google", 1000.0, 20));
        seed_stable_cpa_trend(&store, "c1", "meta", 2000.0 / 80.0);
        seed_stable_cpa_trend(&store, "c1", "google", 1000.0 / 20.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        let result = engine.run("c1");

        assert!(result.success);
        assert!(result.guardrail_rejections >= 1);
        let proposals = store.list_proposals_by_campaign("c1");
        assert!(proposals.iter().all(|p| p.action_payload.get("top_tier").is_none()));
    }

    // --- Scenario 4: Auto-approve threshold crossing ---

    #[test]
    fn strong_spread_over_many_snapshots_auto_approves() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        for _ in 0..5 {
            store.insert_snapshot(snapshot("c1", "meta", 1000.0, 150));
        }
        for _ in 0..5 {
            store.insert_snapshot(snapshot("c1", "google", 1000.0, 50));
        }
        seed_stable_cpa_trend(&store, "c1", "meta", 1000.0 / 150.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        let result = engine.run("c1");

        assert!(result.success);
        let proposals = store.list_proposals_by_campaign("c1");
        let reallocation = proposals
            .iter()
            .find(|p| p.action_payload.get("top_tier").is_some())
            .expect("budget_reallocation proposal created");

        assert_eq!(reallocation.status, ProposalStatus::AutoApproved);
        assert_eq!(reallocation.approved_by.as_deref(), Some("engine"));
        assert!(reallocation.approved_at.is_some());
        assert!(reallocation.confidence >= settings.auto_approve_threshold);
    }

    // --- Scenario 5: Execute an approved proposal end-to-end ---

    #[tokio::test]
    async fn executing_an_approved_reallocation_creates_execution_rows_and_marks_executed() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        let proposal_id = new_id();
        store.insert_proposal(OptimizationProposal {
            id: proposal_id.clone(),
            campaign_id: "c1".to_string(),
            method_id: "m1".to_string(),
            status: ProposalStatus::Approved,
            confidence: 0.9,
            priority: 5,
            action_type: "budget_reallocation".to_string(),
            action_payload: serde_json::json!({
                "new_allocations": { "meta": 3500.0, "google": 1500.0 },
            }),
            reasoning: "rebalance toward meta".to_string(),
            trigger_data: serde_json::json!({}),
            guardrail_checks: serde_json::json!({}),
            execution_result: None,
            approved_by: Some("operator".to_string()),
            approved_at: Some(Utc::now()),
            executed_at: None,
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now(),
        });

        let executor = ActionExecutor::new(true);
        let record = executor.execute_proposal(&store, &proposal_id, false).await;
        assert!(record.success);

        let execution = store
            .get_execution_by_idempotency_key(&format!("opt-proposal-{}", proposal_id))
            .expect("one execution row keyed by the proposal's idempotency key");
        assert_eq!(store.list_actions_by_execution(&execution.id).len(), 2);

        let proposal = store.get_proposal(&proposal_id).expect("proposal exists");
        assert_eq!(proposal.status, ProposalStatus::Executed);
        assert!(proposal.executed_at.is_some());
    }

    // --- Scenario 6: Verify after the window elapses ---

    #[test]
    fn verification_after_window_scores_perfect_roas_and_updates_method_stats() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        store.insert_snapshot(ChannelSnapshot {
            id: new_id(),
            campaign_id: "c1".to_string(),
            channel: "meta".to_string(),
            window_start: Utc::now() - Duration::hours(1),
            window_end: Utc::now(),
            spend: Decimal::new(10000, 2),
            impressions: 1000,
            clicks: 50,
            conversions: 5,
            revenue: Decimal::new(30000, 2),
            created_at: Utc::now(),
        });
        let method = store.get_or_create_method(
            "budget_reallocation",
            "rebalances channel budgets",
            crate::data_models::entities::MethodType::Proactive,
            60,
        );

        let proposal_id = new_id();
        store.insert_proposal(OptimizationProposal {
            id: proposal_id.clone(),
            campaign_id: "c1".to_string(),
            method_id: method.id.clone(),
            status: ProposalStatus::Executed,
            confidence: 0.9,
            priority: 5,
            action_type: "budget_reallocation".to_string(),
            action_payload: serde_json::json!({ "new_allocations": { "meta": 100.0 } }),
            reasoning: "test".to_string(),
            trigger_data: serde_json::json!({}),
            guardrail_checks: serde_json::json!({}),
            execution_result: None,
            approved_by: Some("engine".to_string()),
            approved_at: Some(Utc::now() - Duration::hours(26)),
            executed_at: Some(Utc::now() - Duration::hours(25)),
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now() - Duration::hours(48),
        });

        let verifier = OutcomeVerifier::new(&store);
        let result = verifier.verify_proposal(&proposal_id, 24);

        assert!(result.success);
        assert_eq!(result.accuracy_score, Some(1.0));

        let updated_method = store.get_method(&method.id).expect("method exists");
        assert_eq!(updated_method.stats.total_executions, 1);
        assert_eq!(updated_method.stats.successful_executions, 1);
        assert_eq!(updated_method.stats.avg_accuracy, 1.0);
    }

    // --- Universal invariants ---

    #[test]
    fn inv_every_persisted_proposal_has_only_passing_guardrail_checks() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        store.insert_snapshot(snapshot("c1", "meta", 3000.0, 60));
        store.insert_snapshot(snapshot("c1", "google", 2000.0, 133));
        seed_cpa_spike_trend(&store, "c1", "meta", 25.0, 50.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        engine.run("c1");

        for proposal in store.list_proposals_by_campaign("c1") {
            let checks = proposal.guardrail_checks["checks"].as_array().expect("checks array");
            assert!(checks.iter().all(|c| c["passed"].as_bool().unwrap_or(false)));
        }
    }

    #[test]
    fn inv_auto_approved_proposals_always_meet_the_threshold() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        for _ in 0..5 {
            store.insert_snapshot(snapshot("c1", "meta", 1000.0, 150));
        }
        for _ in 0..5 {
            store.insert_snapshot(snapshot("c1", "google", 1000.0, 50));
        }
        seed_stable_cpa_trend(&store, "c1", "meta", 1000.0 / 150.0);

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        engine.run("c1");

        for proposal in store.list_proposals_by_campaign("c1") {
            if proposal.status == ProposalStatus::AutoApproved {
                assert!(proposal.confidence >= settings.auto_approve_threshold);
            }
        }
    }

    #[tokio::test]
    async fn inv_running_a_monitor_cycle_twice_with_no_new_data_creates_no_new_proposals() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        store.insert_snapshot(snapshot("c1", "meta", 3000.0, 60));
        store.insert_snapshot(snapshot("c1", "google", 2000.0, 133));
        seed_cpa_spike_trend(&store, "c1", "meta", 25.0, 50.0);

        let monitor = OptimizationMonitor::new(true, OptimizerSettings::default());
        monitor.run_cycle(&store, "c1").await;
        let after_first = store.list_proposals_by_campaign("c1").len();

        monitor.run_cycle(&store, "c1").await;
        let after_second = store.list_proposals_by_campaign("c1").len();

        assert_eq!(after_first, after_second, "cooldown/rate-limit guardrails must block a repeat cycle");
    }

    // --- Idempotence laws ---

    #[tokio::test]
    async fn idempotence_execute_proposal_twice_returns_the_same_execution_id() {
        let store = OptimizerStore::new().without_audit_trail();
        let proposal_id = new_id();
        store.insert_proposal(OptimizationProposal {
            id: proposal_id.clone(),
            campaign_id: "c1".to_string(),
            method_id: "m1".to_string(),
            status: ProposalStatus::AutoApproved,
            confidence: 0.9,
            priority: 5,
            action_type: "creative_refresh".to_string(),
            action_payload: serde_json::json!({ "channels": ["meta"] }),
            reasoning: "test".to_string(),
            trigger_data: serde_json::json!({}),
            guardrail_checks: serde_json::json!({}),
            execution_result: None,
            approved_by: Some("engine".to_string()),
            approved_at: Some(Utc::now()),
            executed_at: None,
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now(),
        });

        let executor = ActionExecutor::new(true);
        let first = executor.execute_proposal(&store, &proposal_id, false).await;
        let second = executor.execute_proposal(&store, &proposal_id, false).await;

        assert_eq!(first.execution_id, second.execution_id);
        let execution_id = first.execution_id.expect("execution recorded");
        assert_eq!(store.list_actions_by_execution(&execution_id).len(), 1);
    }

    #[test]
    fn idempotence_verify_proposal_twice_returns_the_same_learning_id() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        let proposal_id = new_id();
        store.insert_proposal(OptimizationProposal {
            id: proposal_id.clone(),
            campaign_id: "c1".to_string(),
            method_id: "m1".to_string(),
            status: ProposalStatus::Executed,
            confidence: 0.9,
            priority: 5,
            action_type: "creative_refresh".to_string(),
            action_payload: serde_json::json!({}),
            reasoning: "test".to_string(),
            trigger_data: serde_json::json!({}),
            guardrail_checks: serde_json::json!({}),
            execution_result: None,
            approved_by: Some("engine".to_string()),
            approved_at: Some(Utc::now() - Duration::hours(26)),
            executed_at: Some(Utc::now() - Duration::hours(25)),
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now() - Duration::hours(48),
        });

        let verifier = OutcomeVerifier::new(&store);
        let first = verifier.verify_proposal(&proposal_id, 24);
        let second = verifier.verify_proposal(&proposal_id, 24);

        assert_eq!(first.learning_id, second.learning_id);
        assert_eq!(
            second.details.get("idempotent").and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    // --- Boundary behaviors ---

    #[test]
    fn zero_snapshots_fails_preconditions_with_a_descriptive_error() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        let result = engine.run("c1");

        assert!(!result.success);
        assert!(result.errors.iter().any(|e| e.contains("snapshots")));
    }

    #[test]
    fn single_channel_never_triggers_budget_reallocation_preconditions() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_campaign(campaign("c1"));
        store.insert_snapshot(snapshot("c1", "meta", 1000.0, 50));

        let registry = build_default_registry();
        let settings = OptimizerSettings::default();
        let engine = DecisionEngine::new(&store, &registry, &settings);
        engine.run("c1");

        let proposals = store.list_proposals_by_campaign("c1");
        assert!(proposals.iter().all(|p| p.action_payload.get("top_tier").is_none()));
    }

    #[test]
    fn verification_within_window_returns_pending_with_no_learning_row() {
        let store = OptimizerStore::new().without_audit_trail();
        let proposal_id = new_id();
        store.insert_proposal(OptimizationProposal {
            id: proposal_id.clone(),
            campaign_id: "c1".to_string(),
            method_id: "m1".to_string(),
            status: ProposalStatus::Executed,
            confidence: 0.9,
            priority: 5,
            action_type: "budget_reallocation".to_string(),
            action_payload: serde_json::json!({}),
            reasoning: "test".to_string(),
            trigger_data: serde_json::json!({}),
            guardrail_checks: serde_json::json!({}),
            execution_result: None,
            approved_by: Some("engine".to_string()),
            approved_at: Some(Utc::now()),
            executed_at: Some(Utc::now()),
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now(),
        });

        let verifier = OutcomeVerifier::new(&store);
        let result = verifier.verify_proposal(&proposal_id, 24);

        assert_eq!(result.error.as_deref(), Some("pending"));
        assert!(store.list_learnings_by_proposal(&proposal_id).is_empty());
    }
}
