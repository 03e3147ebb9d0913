use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::{CategoryFitError, EvaluationError};
use crate::{DEFAULT_MAX_MARGIN, DEFAULT_MIN_MARGIN};

/// One historical sale of an item, as supplied by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub category: String,
    pub item_code: String,
    pub date: NaiveDate,
    #[serde(alias = "qty")]
    pub quantity: u64,
    #[serde(alias = "cogs")]
    pub cost_per_unit: f64,
    #[serde(alias = "sell_price")]
    pub sell_price_per_unit: f64,
    /// Carried through from uploads, never used by the algorithms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

impl TransactionRecord {
    pub fn new(
        category: impl Into<String>,
        item_code: impl Into<String>,
        date: NaiveDate,
        quantity: u64,
        cost_per_unit: f64,
        sell_price_per_unit: f64,
    ) -> Self {
        Self {
            category: category.into(),
            item_code: item_code.into(),
            date,
            quantity,
            cost_per_unit,
            sell_price_per_unit,
            country_code: None,
        }
    }

    /// Check the per-unit prices are usable for a power-law fit
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.cost_per_unit.is_finite() || self.cost_per_unit <= 0.0 {
            return Err(format!("cost_per_unit {} must be finite and positive", self.cost_per_unit));
        }
        if !self.sell_price_per_unit.is_finite() || self.sell_price_per_unit <= 0.0 {
            return Err(format!(
                "sell_price_per_unit {} must be finite and positive",
                self.sell_price_per_unit
            ));
        }
        Ok(())
    }
}

/// Period-over-period demand response between two consecutive sales of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityObservation {
    pub category: String,
    pub item_code: String,
    /// Date of the later record of the pair
    pub date: NaiveDate,
    pub pct_change_qty: f64,
    pub pct_change_price: f64,
    pub elasticity: f64,
    /// Cost of the later record; this row feeds the curve fit
    pub cost_per_unit: f64,
    pub sell_price_per_unit: f64,
}

/// Two-sided interval around a fitted parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Symmetric interval `estimate ± half_width`
    pub fn around(estimate: f64, half_width: f64) -> Self {
        Self { lower: estimate - half_width, upper: estimate + half_width }
    }

    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Fitted price curve for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub category: String,
    /// Power-law coefficient `a`, always > 0 for fits produced by the fitter
    pub curve_a: f64,
    /// Power-law exponent `b`
    pub curve_b: f64,
    pub ci_a: ConfidenceInterval,
    pub ci_b: ConfidenceInterval,
    pub average_elasticity: f64,
    /// Rows the fit was computed from
    #[serde(default)]
    pub observations: usize,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_confidence_level() -> f64 {
    crate::DEFAULT_CONFIDENCE_LEVEL
}

impl CurveFit {
    /// Create a curve from known parameters (e.g. loaded from storage)
    pub fn new(
        category: impl Into<String>,
        curve_a: f64,
        curve_b: f64,
        ci_a: ConfidenceInterval,
        ci_b: ConfidenceInterval,
        average_elasticity: f64,
    ) -> Self {
        Self {
            category: category.into(),
            curve_a,
            curve_b,
            ci_a,
            ci_b,
            average_elasticity,
            observations: 0,
            confidence_level: crate::DEFAULT_CONFIDENCE_LEVEL,
        }
    }

    /// Raw curve value `a * cost^b`
    pub fn price_at(&self, cost: f64) -> f64 {
        self.curve_a * cost.powf(self.curve_b)
    }
}

/// Gross-margin band a suggested price must stay within
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginBounds {
    pub min_margin: f64,
    pub max_margin: f64,
}

impl Default for MarginBounds {
    fn default() -> Self {
        Self { min_margin: DEFAULT_MIN_MARGIN, max_margin: DEFAULT_MAX_MARGIN }
    }
}

impl MarginBounds {
    /// Create validated bounds
    pub fn new(min_margin: f64, max_margin: f64) -> std::result::Result<Self, EvaluationError> {
        let bounds = Self { min_margin, max_margin };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Reject bands that would divide by zero or invert the floor and ceiling
    pub fn validate(&self) -> std::result::Result<(), EvaluationError> {
        let reason = if !self.min_margin.is_finite() || !self.max_margin.is_finite() {
            Some("margins must be finite")
        } else if self.min_margin < 0.0 {
            Some("min_margin must be >= 0")
        } else if self.min_margin >= 1.0 {
            Some("min_margin must be < 1")
        } else if self.max_margin >= 1.0 {
            Some("max_margin must be < 1")
        } else if self.min_margin >= self.max_margin {
            Some("min_margin must be < max_margin")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(EvaluationError::InvalidBounds {
                min_margin: self.min_margin,
                max_margin: self.max_margin,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Lowest allowed price: the one that yields exactly `min_margin`
    pub fn price_floor(&self, cost: f64) -> f64 {
        cost / (1.0 - self.min_margin)
    }

    /// Highest allowed price: the one that yields exactly `max_margin`
    pub fn price_ceiling(&self, cost: f64) -> f64 {
        cost / (1.0 - self.max_margin)
    }
}

/// Which end of the parameter confidence intervals to price with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ConfidenceStrategy {
    #[default]
    Default,
    Conservative,
    Aggressive,
    Average,
}

impl ConfidenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceStrategy::Default => "default",
            ConfidenceStrategy::Conservative => "conservative",
            ConfidenceStrategy::Aggressive => "aggressive",
            ConfidenceStrategy::Average => "average",
        }
    }

    /// Parse a strategy name; anything unrecognized means `Default`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "conservative" => ConfidenceStrategy::Conservative,
            "aggressive" => ConfidenceStrategy::Aggressive,
            "average" => ConfidenceStrategy::Average,
            "default" => ConfidenceStrategy::Default,
            other => {
                tracing::debug!("Unrecognized strategy {:?}, falling back to default", other);
                ConfidenceStrategy::Default
            }
        }
    }
}

impl FromStr for ConfidenceStrategy {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ConfidenceStrategy {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for ConfidenceStrategy {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for ConfidenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price-suggestion request from the serving layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    #[serde(alias = "cogs")]
    pub cost: f64,
    #[serde(default)]
    pub strategy: ConfidenceStrategy,
}

impl PriceRequest {
    pub fn new(category: impl Into<String>, cost: f64, strategy: ConfidenceStrategy) -> Self {
        Self { category: category.into(), item_code: None, cost, strategy }
    }

    pub fn with_item_code(mut self, item_code: impl Into<String>) -> Self {
        self.item_code = Some(item_code.into());
        self
    }
}

/// Which margin clamp, if any, replaced the raw curve price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clamp {
    None,
    Floor,
    Ceiling,
}

/// Suggested price together with how it was derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSuggestion {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    pub strategy: ConfidenceStrategy,
    pub cost: f64,
    pub raw_price: f64,
    pub price_floor: f64,
    pub price_ceiling: f64,
    pub suggested_price: f64,
    pub clamp: Clamp,
    /// `(suggested_price - cost) / suggested_price`
    pub gross_margin: f64,
}

/// Immutable category -> curve lookup handed to the evaluator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurveSnapshot {
    curves: BTreeMap<String, CurveFit>,
}

impl CurveSnapshot {
    pub fn new(curves: BTreeMap<String, CurveFit>) -> Self {
        Self { curves }
    }

    pub fn get(&self, category: &str) -> Option<&CurveFit> {
        self.curves.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.curves.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

impl FromIterator<CurveFit> for CurveSnapshot {
    fn from_iter<I: IntoIterator<Item = CurveFit>>(iter: I) -> Self {
        Self { curves: iter.into_iter().map(|c| (c.category.clone(), c)).collect() }
    }
}

/// Outcome of one fitting run: fitted curves plus the categories that were skipped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub fits: BTreeMap<String, CurveFit>,
    #[serde(default)]
    pub skipped: BTreeMap<String, CategoryFitError>,
}

impl FitReport {
    /// True when every category produced a curve
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Freeze the fitted curves into an evaluator lookup
    pub fn snapshot(&self) -> CurveSnapshot {
        CurveSnapshot::new(self.fits.clone())
    }
}

impl From<FitReport> for CurveSnapshot {
    fn from(report: FitReport) -> Self {
        CurveSnapshot::new(report.fits)
    }
}
