use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::SolverError;

/// Two-sided Student-t critical value for `confidence_level` with `degrees_of_freedom`.
///
/// Returns the `1 - (1 - confidence_level) / 2` quantile of a standard t distribution,
/// i.e. the multiplier applied to a standard error to get a symmetric interval.
pub fn t_critical(confidence_level: f64, degrees_of_freedom: usize) -> Result<f64, SolverError> {
    if degrees_of_freedom == 0 {
        return Err(SolverError::InvalidDegreesOfFreedom { degrees_of_freedom });
    }

    let dist = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64).map_err(|_| {
        SolverError::InvalidDegreesOfFreedom { degrees_of_freedom }
    })?;

    let quantile = 1.0 - (1.0 - confidence_level) / 2.0;
    let t = dist.inverse_cdf(quantile);
    if !t.is_finite() {
        return Err(SolverError::NonFinite);
    }
    Ok(t)
}
