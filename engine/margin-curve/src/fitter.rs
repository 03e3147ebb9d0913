use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::FitterConfig;
use crate::elasticity::{average_elasticity, elasticity_observations, partition_by_category};
use crate::error::{CategoryFitError, FitError, SolverError};
use crate::models::{
    ConfidenceInterval, CurveFit, ElasticityObservation, FitReport, TransactionRecord,
};
use crate::solver::{fit_power_law, PowerLawFit, SolverOptions};
use crate::stats::t_critical;
use crate::MIN_FIT_ROWS;

/// Turns transaction history into one power-law price curve per category
pub struct CurveFitter {
    config: FitterConfig,
}

impl CurveFitter {
    /// Create a new curve fitter
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Fit every category found in `records`.
    ///
    /// Categories that cannot be fitted are listed in [`FitReport::skipped`] with the
    /// reason; only structurally invalid input fails the whole call.
    pub fn fit(&self, records: &[TransactionRecord]) -> Result<FitReport, FitError> {
        if records.is_empty() {
            return Err(FitError::EmptyInput);
        }
        let confidence = self.config.confidence_level;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(FitError::InvalidConfidence(confidence));
        }
        for (index, record) in records.iter().enumerate() {
            record.validate().map_err(|reason| FitError::InvalidRecord { index, reason })?;
        }

        let categories: BTreeSet<&str> = records.iter().map(|r| r.category.as_str()).collect();
        info!(
            "Fitting margin curves for {} records across {} categories",
            records.len(),
            categories.len()
        );

        let by_category = partition_by_category(elasticity_observations(records));

        let outcomes: Vec<(String, Result<CurveFit, CategoryFitError>)> = if self.config.parallel {
            by_category
                .par_iter()
                .map(|(category, obs)| (category.clone(), self.fit_category(category, obs)))
                .collect()
        } else {
            by_category
                .iter()
                .map(|(category, obs)| (category.clone(), self.fit_category(category, obs)))
                .collect()
        };

        let mut report = FitReport::default();
        for (category, outcome) in outcomes {
            match outcome {
                Ok(fit) => {
                    report.fits.insert(category, fit);
                }
                Err(e) => {
                    warn!("Skipping category {}: {}", category, e);
                    report.skipped.insert(category, e);
                }
            }
        }

        // Categories whose every pair was filtered out never reach the solver
        for category in categories {
            if !by_category.contains_key(category) {
                let e = CategoryFitError::InsufficientData { rows: 0, required: self.min_rows() };
                warn!("Skipping category {}: {}", category, e);
                report.skipped.insert(category.to_string(), e);
            }
        }

        info!(
            "Margin curve fit complete: {} fitted, {} skipped",
            report.fits.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Fit one category from its surviving elasticity rows
    pub fn fit_category(
        &self,
        category: &str,
        observations: &[ElasticityObservation],
    ) -> Result<CurveFit, CategoryFitError> {
        let rows = observations.len();
        let required = self.min_rows();
        if rows < required {
            return Err(CategoryFitError::InsufficientData { rows, required });
        }

        let costs: Vec<f64> = observations.iter().map(|o| o.cost_per_unit).collect();
        let prices: Vec<f64> = observations.iter().map(|o| o.sell_price_per_unit).collect();

        let options = SolverOptions {
            max_iterations: self.config.max_iterations,
            ..SolverOptions::default()
        };
        let fit = fit_power_law(&costs, &prices, &options)?;
        if !(fit.a > 0.0) {
            return Err(SolverError::NonPositiveCoefficient { value: fit.a }.into());
        }

        let t = t_critical(self.config.confidence_level, PowerLawFit::degrees_of_freedom(rows))?;
        let (se_a, se_b) = fit.standard_errors();

        let curve = CurveFit {
            category: category.to_string(),
            curve_a: fit.a,
            curve_b: fit.b,
            ci_a: ConfidenceInterval::around(fit.a, se_a * t),
            ci_b: ConfidenceInterval::around(fit.b, se_b * t),
            average_elasticity: average_elasticity(observations).unwrap_or_default(),
            observations: rows,
            confidence_level: self.config.confidence_level,
        };

        debug!(
            "Fitted {}: a={:.4} b={:.4} over {} rows in {} iterations (ssr {:.4})",
            category, curve.curve_a, curve.curve_b, rows, fit.iterations, fit.residual_sum_of_squares
        );
        Ok(curve)
    }

    fn min_rows(&self) -> usize {
        self.config.min_rows.max(MIN_FIT_ROWS)
    }
}

impl Default for CurveFitter {
    fn default() -> Self {
        Self::new(FitterConfig::default())
    }
}

/// Fit with default settings at the given confidence level
pub fn fit(records: &[TransactionRecord], confidence_level: f64) -> Result<FitReport, FitError> {
    let config = FitterConfig { confidence_level, ..FitterConfig::default() };
    CurveFitter::new(config).fit(records)
}
