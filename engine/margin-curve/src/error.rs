//! Error types for the Margin Curve Engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Margin Curve Engine operations
pub type Result<T> = std::result::Result<T, MarginCurveError>;

/// Top-level error for callers that drive both halves of the engine
#[derive(Error, Debug)]
pub enum MarginCurveError {
    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Whole-call failures of the curve fitter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("No transaction records supplied")]
    EmptyInput,

    #[error("Confidence level {0} must lie strictly between 0 and 1")]
    InvalidConfidence(f64),

    #[error("Record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

/// Per-category failure; the category is skipped and fitting continues
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryFitError {
    #[error("Insufficient data: {rows} usable rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("Curve fit diverged: {reason}")]
    FitDivergence { reason: SolverError },
}

/// Numeric failures of the power-law solver
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SolverError {
    #[error("no convergence after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("non-finite residuals or parameters")]
    NonFinite,

    #[error("singular covariance matrix")]
    SingularCovariance,

    #[error("non-positive coefficient a = {value}")]
    NonPositiveCoefficient { value: f64 },

    #[error("invalid degrees of freedom: {degrees_of_freedom}")]
    InvalidDegreesOfFreedom { degrees_of_freedom: usize },
}

/// Failures of a single price evaluation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationError {
    #[error("Invalid cost {cost}: must be finite and positive")]
    InvalidCost { cost: f64 },

    #[error("Invalid margin bounds [{min_margin}, {max_margin}]: {reason}")]
    InvalidBounds { min_margin: f64, max_margin: f64, reason: String },

    #[error("Unknown category: {category}")]
    UnknownCategory { category: String },

    #[error("Curve for {category} has non-finite parameters")]
    InvalidCurve { category: String },
}

impl From<SolverError> for CategoryFitError {
    fn from(reason: SolverError) -> Self {
        CategoryFitError::FitDivergence { reason }
    }
}
