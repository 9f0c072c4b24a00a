use crate::errors::OptimizerError;

/// Runtime-tunable knobs for the optimization loop, loaded from environment
/// variables with documented defaults. Grounded on the typed
/// configuration-with-validation pattern in `analytics_config.rs`, adapted to
/// read flat env vars (via `dotenv`) instead of a structured connector config.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub auto_approve_threshold: f64,
    pub max_proposals_per_hour: u32,
    pub max_budget_change_pct: f64,
    pub min_channel_floor_pct: f64,
    pub default_cooldown_minutes: i64,
    pub verification_delay_hours: i64,
    pub use_dry_run_execution: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.85,
            max_proposals_per_hour: 3,
            max_budget_change_pct: 0.20,
            min_channel_floor_pct: 0.05,
            default_cooldown_minutes: 60,
            verification_delay_hours: 24,
            use_dry_run_execution: true,
        }
    }
}

impl OptimizerSettings {
    /// Loads settings from the process environment, falling back to
    /// documented defaults for any variable that is absent. A present but
    /// malformed variable is a hard `Validation` error rather than a silent
    /// fallback, matching the teacher's distinction between "unset" and
    /// "set wrong".
    pub fn from_env() -> Result<Self, OptimizerError> {
        let _ = dotenv::dotenv();
        let defaults = Self::default();

        Ok(Self {
            auto_approve_threshold: parse_env_f64(
                "OPTIMIZATION_AUTO_APPROVE_THRESHOLD",
                defaults.auto_approve_threshold,
            )?,
            max_proposals_per_hour: parse_env_u32(
                "OPTIMIZATION_MAX_PROPOSALS_PER_HOUR",
                defaults.max_proposals_per_hour,
            )?,
            max_budget_change_pct: parse_env_f64(
                "OPTIMIZATION_MAX_BUDGET_CHANGE_PCT",
                defaults.max_budget_change_pct,
            )?,
            min_channel_floor_pct: parse_env_f64(
                "OPTIMIZATION_MIN_CHANNEL_FLOOR_PCT",
                defaults.min_channel_floor_pct,
            )?,
            default_cooldown_minutes: parse_env_i64(
                "OPTIMIZATION_DEFAULT_COOLDOWN_MINUTES",
                defaults.default_cooldown_minutes,
            )?,
            verification_delay_hours: parse_env_i64(
                "OPTIMIZATION_VERIFICATION_DELAY_HOURS",
                defaults.verification_delay_hours,
            )?,
            use_dry_run_execution: parse_env_bool(
                "USE_DRY_RUN_EXECUTION",
                defaults.use_dry_run_execution,
            )?,
        })
    }
}

fn parse_env_f64(name: &str, default: f64) -> Result<f64, OptimizerError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<f64>().map_err(|_| {
            OptimizerError::validation(format!("{} must be a decimal number, got '{}'", name, raw))
        }),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, OptimizerError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<u32>().map_err(|_| {
            OptimizerError::validation(format!(
                "{} must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, OptimizerError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<i64>().map_err(|_| {
            OptimizerError::validation(format!("{} must be an integer, got '{}'", name, raw))
        }),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, OptimizerError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(OptimizerError::validation(format!(
                "{} must be a boolean, got '{}'",
                name, raw
            ))),
        },
    }
}

/// Snapshot-and-restore guard for env-var-driven tests, grounded on the
/// teacher's test-isolation idiom for env-dependent configuration.
#[cfg(test)]
pub struct TestEnvGuard {
    name: &'static str,
    previous: Option<String>,
}

#[cfg(test)]
impl TestEnvGuard {
    pub fn set(name: &'static str, value: &str) -> Self {
        let previous = std::env::var(name).ok();
        std::env::set_var(name, value);
        Self { name, previous }
    }
}

#[cfg(test)]
impl Drop for TestEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => std::env::set_var(self.name, value),
            None => std::env::remove_var(self.name),
        }
    }
}
