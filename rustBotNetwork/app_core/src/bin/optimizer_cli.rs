// src/bin/optimizer_cli.rs
//
// Runnable surface for the optimization core, standing in for the HTTP
// layer the core itself is deliberately silent on. Each invocation seeds a
// fresh in-process store from a JSON campaign file, runs the requested
// action, and prints a JSON report to stdout.

use std::fs;
use std::path::PathBuf;

use campaign_optimizer_core::config::OptimizerSettings;
use campaign_optimizer_core::data_models::entities::{Campaign, ChannelSnapshot};
use campaign_optimizer_core::monitor::OptimizationMonitor;
use campaign_optimizer_core::store::OptimizerStore;
use campaign_optimizer_core::utils::ids::new_id;
use campaign_optimizer_core::utils::logger::init_logger;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Campaign input file commands
    Campaign {
        #[clap(subcommand)]
        command: CampaignCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignCommands {
    /// Parses a campaign input file and reports whether it is well-formed
    Validate {
        #[clap(short, long)]
        input: PathBuf,
    },
    /// Seeds an in-process store from the input file and runs one full
    /// observe/decide/act/verify cycle against it
    Run {
        #[clap(short, long)]
        input: PathBuf,
        /// Append monitor-run audit records to this JSONL file
        #[clap(long)]
        audit_log: Option<PathBuf>,
        /// Force dry-run platform execution even if the input requests live calls
        #[clap(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Deserialize)]
struct CampaignInput {
    id: Option<String>,
    name: String,
    objective: String,
    target_cac: Option<Decimal>,
    snapshots: Vec<SnapshotInput>,
}

#[derive(Debug, Deserialize)]
struct SnapshotInput {
    channel: String,
    spend: Decimal,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    revenue: Decimal,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = init_logger();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Campaign { command } => match command {
            CampaignCommands::Validate { input } => validate_campaign(input)?,
            CampaignCommands::Run { input, audit_log, dry_run } => {
                run_campaign(input, audit_log.as_deref(), *dry_run).await?
            }
        },
    }

    Ok(())
}

fn load_campaign_input(path: &PathBuf) -> Result<CampaignInput, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let input: CampaignInput = serde_json::from_str(&raw)?;
    if input.snapshots.is_empty() {
        return Err("campaign input must include at least one snapshot".into());
    }
    Ok(input)
}

fn validate_campaign(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load_campaign_input(input)?;
    println!(
        "Campaign '{}' is VALID: {} snapshot(s) across {} channel(s)",
        parsed.name,
        parsed.snapshots.len(),
        parsed
            .snapshots
            .iter()
            .map(|s| s.channel.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len(),
    );
    Ok(())
}

async fn run_campaign(
    input: &PathBuf,
    audit_log: Option<&std::path::Path>,
    force_dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load_campaign_input(input)?;
    let campaign_id = parsed.id.clone().unwrap_or_else(new_id);

    let mut store = OptimizerStore::new();
    store = match audit_log {
        Some(path) => store.with_audit_path(path.to_path_buf()),
        None => store.without_audit_trail(),
    };

    store.insert_campaign(Campaign {
        id: campaign_id.clone(),
        name: parsed.name.clone(),
        objective: parsed.objective.clone(),
        target_cac: parsed.target_cac,
        window_start: None,
        window_end: None,
    });

    let now = Utc::now();
    for snapshot in parsed.snapshots {
        store.insert_snapshot(ChannelSnapshot {
            id: new_id(),
            campaign_id: campaign_id.clone(),
            channel: snapshot.channel,
            window_start: snapshot.window_start.unwrap_or(now - chrono::Duration::days(1)),
            window_end: snapshot.window_end.unwrap_or(now),
            spend: snapshot.spend,
            impressions: snapshot.impressions,
            clicks: snapshot.clicks,
            conversions: snapshot.conversions,
            revenue: snapshot.revenue,
            created_at: now,
        });
    }

    let settings = OptimizerSettings::from_env()?;
    let monitor = OptimizationMonitor::new(force_dry_run || settings.use_dry_run_execution, settings);
    let result = monitor.run_cycle(&store, &campaign_id).await;

    let proposals = store.list_proposals_by_campaign(&campaign_id);
    let report = serde_json::json!({
        "campaign_id": campaign_id,
        "monitor_run_id": result.monitor_run_id,
        "success": result.success,
        "errors": result.errors,
        "engine": result.engine_result.map(|er| serde_json::json!({
            "success": er.success,
            "proposals_created": er.proposals_created,
            "proposals_auto_approved": er.proposals_auto_approved,
            "proposals_queued": er.proposals_queued,
            "guardrail_rejections": er.guardrail_rejections,
            "errors": er.errors,
        })),
        "proposals": proposals,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
