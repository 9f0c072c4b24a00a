use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

use crate::data_models::entities::{ChannelSnapshot, MetricName, MetricUnit, RawMetric};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;

/// Pure projection from `ChannelSnapshot` rows to `RawMetric` rows. No
/// aggregation, no KPI math — one row per snapshot per dimension, zero
/// values preserved.
pub struct MetricsCollector<'a> {
    store: &'a OptimizerStore,
}

impl<'a> MetricsCollector<'a> {
    pub fn new(store: &'a OptimizerStore) -> Self {
        Self { store }
    }

    /// Emits five `RawMetric` rows per matching snapshot and persists them.
    /// Idempotent only if callers dedupe; repeated calls over the same
    /// window intentionally produce duplicates, since the raw table is
    /// append-only and timestamped.
    pub fn collect(
        &self,
        campaign_id: &str,
        window_start: Option<DateTime<Utc>>,
        window_end: Option<DateTime<Utc>>,
    ) -> Vec<RawMetric> {
        let snapshots: Vec<ChannelSnapshot> = self
            .store
            .list_snapshots_by_campaign(campaign_id)
            .into_iter()
            .filter(|s| matches_window(s, window_start, window_end))
            .collect();

        let now = Utc::now();
        let mut metrics = Vec::with_capacity(snapshots.len() * 5);

        for snapshot in &snapshots {
            metrics.push(self.emit(
                campaign_id,
                snapshot,
                MetricName::Spend,
                snapshot.spend.to_f64().unwrap_or(0.0),
                MetricUnit::Currency,
                now,
            ));
            metrics.push(self.emit(
                campaign_id,
                snapshot,
                MetricName::Impressions,
                snapshot.impressions as f64,
                MetricUnit::Count,
                now,
            ));
            metrics.push(self.emit(
                campaign_id,
                snapshot,
                MetricName::Clicks,
                snapshot.clicks as f64,
                MetricUnit::Count,
                now,
            ));
            metrics.push(self.emit(
                campaign_id,
                snapshot,
                MetricName::Conversions,
                snapshot.conversions as f64,
                MetricUnit::Count,
                now,
            ));
            metrics.push(self.emit(
                campaign_id,
                snapshot,
                MetricName::Revenue,
                snapshot.revenue.to_f64().unwrap_or(0.0),
                MetricUnit::Currency,
                now,
            ));
        }

        for metric in &metrics {
            self.store.insert_raw_metric(metric.clone());
        }
        metrics
    }

    fn emit(
        &self,
        campaign_id: &str,
        snapshot: &ChannelSnapshot,
        metric_name: MetricName,
        metric_value: f64,
        metric_unit: MetricUnit,
        now: DateTime<Utc>,
    ) -> RawMetric {
        RawMetric {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: snapshot.channel.clone(),
            metric_name,
            metric_value,
            metric_unit,
            source: "snapshot".to_string(),
            collected_at: now,
            window_start: Some(snapshot.window_start),
            window_end: Some(snapshot.window_end),
        }
    }
}

fn matches_window(
    snapshot: &ChannelSnapshot,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
) -> bool {
    if let Some(start) = window_start {
        if snapshot.window_end < start {
            return false;
        }
    }
    if let Some(end) = window_end {
        if snapshot.window_start > end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn sample_snapshot(campaign_id: &str, channel: &str) -> ChannelSnapshot {
        ChannelSnapshot {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel: channel.to_string(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            spend: Decimal::new(10000, 2),
            impressions: 1000,
            clicks: 50,
            conversions: 5,
            revenue: Decimal::new(30000, 2),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn collect_emits_five_rows_per_snapshot_including_zeros() {
        let store = OptimizerStore::new().without_audit_trail();
        let mut snapshot = sample_snapshot("c1", "meta");
        snapshot.conversions = 0;
        store.insert_snapshot(snapshot);

        let collector = MetricsCollector::new(&store);
        let metrics = collector.collect("c1", None, None);
        assert_eq!(metrics.len(), 5);
        let conversions = metrics
            .iter()
            .find(|m| m.metric_name == MetricName::Conversions)
            .expect("conversions row present");
        assert_eq!(conversions.metric_value, 0.0);
    }

    #[test]
    fn collect_is_pure_projection_with_no_aggregation() {
        let store = OptimizerStore::new().without_audit_trail();
        store.insert_snapshot(sample_snapshot("c1", "meta"));
        store.insert_snapshot(sample_snapshot("c1", "google"));

        let collector = MetricsCollector::new(&store);
        let metrics = collector.collect("c1", None, None);
        assert_eq!(metrics.len(), 10);
    }
}
