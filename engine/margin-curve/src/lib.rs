//! Margin Curve Engine
//!
//! Fits one power-law price curve (`price = a * cost^b`) per product category from
//! historical transactions, and turns a fitted curve into a clamped price suggestion
//! for a given cost, confidence-interval strategy and margin band.
//!
//! Both halves are pure: the fitter takes records and returns a [`FitReport`], the
//! evaluator takes a [`CurveFit`] (or a [`CurveSnapshot`]) plus explicit
//! [`MarginBounds`] and returns prices. Storage and serving live outside this crate.

pub mod config;
pub mod elasticity;
pub mod error;
pub mod evaluator;
pub mod fitter;
pub mod models;
pub mod solver;
pub mod stats;


pub use config::{FitterConfig, MarginCurveConfig};
pub use error::{
    CategoryFitError, EvaluationError, FitError, MarginCurveError, Result, SolverError,
};
pub use evaluator::{evaluate, evaluate_many, select_parameters, suggest};
pub use fitter::{fit, CurveFitter};
pub use models::*;

/// Default confidence level for parameter intervals
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Default solver iteration cap
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Minimum surviving rows a category needs before it is fitted
pub const MIN_FIT_ROWS: usize = 3;

/// Default lower gross-margin bound
pub const DEFAULT_MIN_MARGIN: f64 = 0.06;

/// Default upper gross-margin bound
pub const DEFAULT_MAX_MARGIN: f64 = 0.20;
