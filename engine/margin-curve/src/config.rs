use serde::{Deserialize, Serialize};

use crate::error::MarginCurveError;
use crate::models::MarginBounds;
use crate::{DEFAULT_CONFIDENCE_LEVEL, DEFAULT_MAX_ITERATIONS, MIN_FIT_ROWS};

/// Configuration for the Margin Curve Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginCurveConfig {
    /// Curve fitting parameters
    pub fitter: FitterConfig,

    /// Margin band applied to price suggestions
    pub margins: MarginBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitterConfig {
    /// Two-sided confidence level for parameter intervals (e.g., 0.95)
    pub confidence_level: f64,

    /// Solver evaluation cap per category
    pub max_iterations: usize,

    /// Minimum usable rows per category (never below 3)
    pub min_rows: usize,

    /// Fit categories on the rayon pool
    pub parallel: bool,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            min_rows: MIN_FIT_ROWS,
            parallel: true,
        }
    }
}

impl Default for MarginCurveConfig {
    fn default() -> Self {
        Self { fitter: FitterConfig::default(), margins: MarginBounds::default() }
    }
}

impl MarginCurveConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, MarginCurveError> {
        let mut config = Self::default();

        if let Ok(confidence) = std::env::var("MARGIN_CURVE_CONFIDENCE") {
            config.fitter.confidence_level = parse_var("MARGIN_CURVE_CONFIDENCE", &confidence)?;
        }

        if let Ok(max_iterations) = std::env::var("MARGIN_CURVE_MAX_ITERATIONS") {
            config.fitter.max_iterations =
                parse_var("MARGIN_CURVE_MAX_ITERATIONS", &max_iterations)?;
        }

        if let Ok(min_rows) = std::env::var("MARGIN_CURVE_MIN_ROWS") {
            config.fitter.min_rows = parse_var("MARGIN_CURVE_MIN_ROWS", &min_rows)?;
        }

        if let Ok(parallel) = std::env::var("MARGIN_CURVE_PARALLEL") {
            config.fitter.parallel = parse_var("MARGIN_CURVE_PARALLEL", &parallel)?;
        }

        if let Ok(min_margin) = std::env::var("MARGIN_MIN") {
            config.margins.min_margin = parse_var("MARGIN_MIN", &min_margin)?;
        }

        if let Ok(max_margin) = std::env::var("MARGIN_MAX") {
            config.margins.max_margin = parse_var("MARGIN_MAX", &max_margin)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the algorithms cannot run with
    pub fn validate(&self) -> Result<(), MarginCurveError> {
        let confidence = self.fitter.confidence_level;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(MarginCurveError::Configuration(format!(
                "confidence_level {} must lie strictly between 0 and 1",
                confidence
            )));
        }
        if self.fitter.max_iterations == 0 {
            return Err(MarginCurveError::Configuration("max_iterations must be > 0".to_string()));
        }
        if self.fitter.min_rows < MIN_FIT_ROWS {
            return Err(MarginCurveError::Configuration(format!(
                "min_rows {} is below the minimum of {}",
                self.fitter.min_rows, MIN_FIT_ROWS
            )));
        }
        self.margins.validate()?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, MarginCurveError> {
    value
        .trim()
        .parse()
        .map_err(|_| MarginCurveError::Configuration(format!("{}={:?} is not valid", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MarginCurveConfig::default();
        assert_eq!(config.fitter.confidence_level, 0.95);
        assert_eq!(config.fitter.max_iterations, 10_000);
        assert_eq!(config.fitter.min_rows, 3);
        assert!(config.fitter.parallel);
        assert_eq!(config.margins, MarginBounds { min_margin: 0.06, max_margin: 0.20 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = MarginCurveConfig::default();
        config.fitter.confidence_level = 1.5;
        assert!(config.validate().is_err());

        let mut config = MarginCurveConfig::default();
        config.fitter.min_rows = 2;
        assert!(config.validate().is_err());

        let mut config = MarginCurveConfig::default();
        config.margins = MarginBounds { min_margin: 0.3, max_margin: 0.2 };
        assert!(matches!(config.validate(), Err(MarginCurveError::Evaluation(_))));
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<f64>("MARGIN_MIN", " 0.1 ").unwrap(), 0.1);
        assert!(parse_var::<bool>("MARGIN_CURVE_PARALLEL", "true").unwrap());
        assert!(parse_var::<usize>("MARGIN_CURVE_MIN_ROWS", "three").is_err());
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let json = r#"{
            "fitter": {"confidence_level": 0.9, "max_iterations": 500, "min_rows": 4, "parallel": false},
            "margins": {"min_margin": 0.05, "max_margin": 0.3}
        }"#;
        let config: MarginCurveConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.fitter.max_iterations, 500);
        assert!(!config.fitter.parallel);
        assert!(config.validate().is_ok());
    }
}
