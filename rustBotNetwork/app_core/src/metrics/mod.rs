pub mod collector;
pub mod kpi;
pub mod trend;

pub use collector::MetricsCollector;
pub use kpi::KpiCalculator;
pub use trend::TrendAnalyzer;
