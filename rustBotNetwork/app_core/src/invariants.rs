use crate::errors::OptimizerError;

/// Shared invariant checks used by multiple components.
///
/// Helpers must not perform I/O or mutate external state.
pub fn ensure_non_empty_trimmed(value: &str, field: &str) -> Result<(), OptimizerError> {
    if value.trim().is_empty() {
        return Err(OptimizerError::validation(format!(
            "'{}' cannot be empty",
            field
        )));
    }
    Ok(())
}

pub fn ensure_unit_interval(value: f64, name: &str) -> Result<(), OptimizerError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(OptimizerError::validation(format!(
            "'{}' must be in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

pub fn ensure_range_i32(value: i32, min: i32, max: i32, name: &str) -> Result<(), OptimizerError> {
    if value < min || value > max {
        return Err(OptimizerError::validation(format!(
            "'{}' must be in range {}..={}",
            name, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Naming scheme: inv_global_<domain>_<nnn>_<behavior>
    #[test]
    fn inv_global_core_001_rejects_empty_trimmed_string() {
        let err = ensure_non_empty_trimmed("   ", "campaign_id").expect_err("must fail");
        assert!(err.message.contains("campaign_id"));
    }

    #[test]
    fn inv_global_core_002_validates_unit_interval() {
        assert!(ensure_unit_interval(0.5, "confidence").is_ok());
        assert!(ensure_unit_interval(1.1, "confidence").is_err());
        assert!(ensure_unit_interval(-0.1, "confidence").is_err());
    }

    #[test]
    fn inv_global_core_003_validates_priority_range() {
        assert!(ensure_range_i32(5, 1, 10, "priority").is_ok());
        assert!(ensure_range_i32(11, 1, 10, "priority").is_err());
    }
}
