use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::data_models::entities::{DerivedKpi, KpiName, MetricName, RawMetric};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelTotals {
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub revenue: f64,
}

impl ChannelTotals {
    fn add(&mut self, metric: &RawMetric) {
        match metric.metric_name {
            MetricName::Spend => self.spend += metric.metric_value,
            MetricName::Impressions => self.impressions += metric.metric_value,
            MetricName::Clicks => self.clicks += metric.metric_value,
            MetricName::Conversions => self.conversions += metric.metric_value,
            MetricName::Revenue => self.revenue += metric.metric_value,
        }
    }

    /// The six KPI definitions, keyed by name. A KPI is present only if its
    /// denominator is non-zero — the safe-division rule.
    pub fn kpis(&self) -> HashMap<KpiName, f64> {
        let mut out = HashMap::new();
        if self.impressions != 0.0 {
            out.insert(KpiName::Ctr, self.clicks / self.impressions);
            out.insert(KpiName::Cpm, self.spend * 1000.0 / self.impressions);
        }
        if self.clicks != 0.0 {
            out.insert(KpiName::Cvr, self.conversions / self.clicks);
            out.insert(KpiName::Cpc, self.spend / self.clicks);
        }
        if self.conversions != 0.0 {
            out.insert(KpiName::Cpa, self.spend / self.conversions);
        }
        if self.spend != 0.0 {
            out.insert(KpiName::Roas, self.revenue / self.spend);
        }
        out
    }
}

/// Aggregates `RawMetric` rows by channel (and campaign-wide) and computes
/// the six KPI definitions under the safe-division rule: a zero denominator
/// omits the row entirely rather than writing 0 or null.
pub struct KpiCalculator<'a> {
    store: &'a OptimizerStore,
}

impl<'a> KpiCalculator<'a> {
    pub fn new(store: &'a OptimizerStore) -> Self {
        Self { store }
    }

    pub fn compute(
        &self,
        campaign_id: &str,
        raw_metrics: Option<Vec<RawMetric>>,
        window_start: Option<DateTime<Utc>>,
        window_end: Option<DateTime<Utc>>,
    ) -> Vec<DerivedKpi> {
        let metrics = raw_metrics.unwrap_or_else(|| {
            self.store
                .list_raw_metrics_by_campaign(campaign_id)
                .into_iter()
                .filter(|m| matches_window(m, window_start, window_end))
                .collect()
        });

        let mut by_channel: HashMap<String, ChannelTotals> = HashMap::new();
        let mut campaign_totals = ChannelTotals::default();
        for metric in &metrics {
            by_channel.entry(metric.channel.clone()).or_default().add(metric);
            campaign_totals.add(metric);
        }

        let now = Utc::now();
        let mut rows = Vec::new();

        for (channel, totals) in &by_channel {
            for (kpi_name, value) in totals.kpis() {
                rows.push(self.make_row(
                    campaign_id,
                    Some(channel.clone()),
                    kpi_name,
                    round_significant(value, 6),
                    window_start,
                    window_end,
                    now,
                ));
            }
        }

        for (kpi_name, value) in campaign_totals.kpis() {
            rows.push(self.make_row(
                campaign_id,
                None,
                kpi_name,
                round_significant(value, 6),
                window_start,
                window_end,
                now,
            ));
        }

        for row in &rows {
            self.store.insert_derived_kpi(row.clone());
        }
        rows
    }

    #[allow(clippy::too_many_arguments)]
    fn make_row(
        &self,
        campaign_id: &str,
        channel: Option<String>,
        kpi_name: KpiName,
        kpi_value: f64,
        window_start: Option<DateTime<Utc>>,
        window_end: Option<DateTime<Utc>>,
        computed_at: DateTime<Utc>,
    ) -> DerivedKpi {
        DerivedKpi {
            id: new_id(),
            campaign_id: campaign_id.to_string(),
            channel,
            kpi_name,
            kpi_value,
            window_start,
            window_end,
            input_metrics: serde_json::json!({}),
            computed_at,
        }
    }
}

fn matches_window(
    metric: &RawMetric,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
) -> bool {
    if let (Some(start), Some(metric_end)) = (window_start, metric.window_end) {
        if metric_end < start {
            return false;
        }
    }
    if let (Some(end), Some(metric_start)) = (window_end, metric.window_start) {
        if metric_start > end {
            return false;
        }
    }
    true
}

/// Rounds `value` to `digits` significant digits. Used for persisted KPI
/// ratios; monetary arithmetic stays in fixed-precision decimal upstream.
pub fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits - 1 - magnitude);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(channel: &str, name: MetricName, value: f64) -> RawMetric {
        RawMetric {
            id: new_id(),
            campaign_id: "c1".to_string(),
            channel: channel.to_string(),
            metric_name: name,
            metric_value: value,
            metric_unit: crate::data_models::entities::MetricUnit::Count,
            source: "snapshot".to_string(),
            collected_at: Utc::now(),
            window_start: None,
            window_end: None,
        }
    }

    #[test]
    fn zero_denominator_omits_kpi_row() {
        let store = OptimizerStore::new().without_audit_trail();
        let metrics = vec![
            metric("meta", MetricName::Spend, 100.0),
            metric("meta", MetricName::Impressions, 0.0),
            metric("meta", MetricName::Clicks, 0.0),
            metric("meta", MetricName::Conversions, 0.0),
            metric("meta", MetricName::Revenue, 0.0),
        ];
        let calc = KpiCalculator::new(&store);
        let rows = calc.compute("c1", Some(metrics), None, None);
        assert!(rows.iter().all(|r| r.kpi_name != KpiName::Ctr));
        assert!(rows.iter().all(|r| r.kpi_name != KpiName::Cpc));
    }

    #[test]
    fn computes_roas_for_channel_and_campaign() {
        let store = OptimizerStore::new().without_audit_trail();
        let metrics = vec![
            metric("meta", MetricName::Spend, 100.0),
            metric("meta", MetricName::Revenue, 300.0),
        ];
        let calc = KpiCalculator::new(&store);
        let rows = calc.compute("c1", Some(metrics), None, None);
        let channel_roas = rows
            .iter()
            .find(|r| r.kpi_name == KpiName::Roas && r.channel.as_deref() == Some("meta"))
            .expect("channel roas present");
        assert_eq!(channel_roas.kpi_value, 3.0);
        let campaign_roas = rows
            .iter()
            .find(|r| r.kpi_name == KpiName::Roas && r.channel.is_none())
            .expect("campaign roas present");
        assert_eq!(campaign_roas.kpi_value, 3.0);
    }

    #[test]
    fn round_significant_keeps_six_digits() {
        let rounded = round_significant(1.0 / 3.0, 6);
        assert_eq!(rounded, 0.333333);
    }
}
