use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::data_models::entities::{DerivedKpi, KpiName, TrendDirection, TrendIndicator};
use crate::store::OptimizerStore;
use crate::utils::ids::new_id;

const STABLE_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TrendKey {
    channel: Option<String>,
    kpi_name: KpiName,
}

/// Compares averaged DerivedKPI values over two adjacent windows of
/// `period_days` each and records the raw signed direction of change.
/// Metric semantics (is an increase good or bad) are left to consumer
/// methods.
pub struct TrendAnalyzer<'a> {
    store: &'a OptimizerStore,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(store: &'a OptimizerStore) -> Self {
        Self { store }
    }

    pub fn analyze(&self, campaign_id: &str, period_days: i64) -> Vec<TrendIndicator> {
        let now = Utc::now();
        let current_start = now - Duration::days(period_days);
        let previous_start = now - Duration::days(2 * period_days);
        let previous_end = current_start;

        let rows = self.store.list_derived_kpis_by_campaign(campaign_id);

        let current = average_bucket(&rows, current_start, now);
        let previous = average_bucket(&rows, previous_start, previous_end);

        let mut indicators = Vec::new();
        for (key, current_value) in &current {
            let Some(previous_value) = previous.get(key) else {
                continue;
            };
            if *previous_value == 0.0 {
                continue;
            }

            let change = (current_value - previous_value) / previous_value.abs();
            let direction = if change > STABLE_THRESHOLD {
                TrendDirection::Improving
            } else if change < -STABLE_THRESHOLD {
                TrendDirection::Declining
            } else {
                TrendDirection::Stable
            };
            let magnitude = change.abs();
            let confidence = (0.5 + magnitude).min(0.9);

            indicators.push(TrendIndicator {
                id: new_id(),
                campaign_id: campaign_id.to_string(),
                channel: key.channel.clone(),
                kpi_name: key.kpi_name,
                direction,
                magnitude,
                period_days,
                current_value: *current_value,
                previous_value: *previous_value,
                confidence,
                computed_at: now,
            });
        }

        for indicator in &indicators {
            self.store.insert_trend_indicator(indicator.clone());
        }
        indicators
    }
}

fn average_bucket(
    rows: &[DerivedKpi],
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
) -> HashMap<TrendKey, f64> {
    let mut sums: HashMap<TrendKey, (f64, usize)> = HashMap::new();
    for row in rows {
        let within = match (row.window_start, row.window_end) {
            (Some(ws), Some(we)) => ws >= start && we <= end,
            _ => false,
        };
        if !within {
            continue;
        }
        let key = TrendKey {
            channel: row.channel.clone(),
            kpi_name: row.kpi_name,
        };
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += row.kpi_value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}
