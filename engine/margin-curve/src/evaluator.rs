//! Price suggestion from a fitted curve
//!
//! `price = A * cost^B`, where `(A, B)` come from the curve or its confidence
//! intervals depending on the strategy, clamped to the price band implied by the
//! gross-margin bounds: `[cost / (1 - min_margin), cost / (1 - max_margin)]`.

use rayon::prelude::*;
use tracing::debug;

use crate::error::EvaluationError;
use crate::models::{
    Clamp, ConfidenceStrategy, CurveFit, CurveSnapshot, MarginBounds, PriceRequest,
    PriceSuggestion,
};

/// Curve parameters `(A, B)` to price with under `strategy`
pub fn select_parameters(curve: &CurveFit, strategy: ConfidenceStrategy) -> (f64, f64) {
    match strategy {
        ConfidenceStrategy::Conservative => (curve.ci_a.lower, curve.ci_b.upper),
        ConfidenceStrategy::Aggressive => (curve.ci_a.upper, curve.ci_b.lower),
        ConfidenceStrategy::Average => (curve.ci_a.midpoint(), curve.ci_b.midpoint()),
        ConfidenceStrategy::Default => (curve.curve_a, curve.curve_b),
    }
}

/// Suggested price for `cost`, clamped to the margin band
pub fn evaluate(
    cost: f64,
    curve: &CurveFit,
    strategy: ConfidenceStrategy,
    bounds: &MarginBounds,
) -> Result<f64, EvaluationError> {
    price(cost, curve, strategy, bounds).map(|(_, suggested, _)| suggested)
}

/// Suggested price together with the raw curve value, the band and the margin it yields
pub fn suggest(
    request: &PriceRequest,
    curve: &CurveFit,
    bounds: &MarginBounds,
) -> Result<PriceSuggestion, EvaluationError> {
    let (raw_price, suggested_price, clamp) = price(request.cost, curve, request.strategy, bounds)?;

    Ok(PriceSuggestion {
        category: request.category.clone(),
        item_code: request.item_code.clone(),
        strategy: request.strategy,
        cost: request.cost,
        raw_price,
        price_floor: bounds.price_floor(request.cost),
        price_ceiling: bounds.price_ceiling(request.cost),
        suggested_price,
        clamp,
        gross_margin: (suggested_price - request.cost) / suggested_price,
    })
}

/// Evaluate a batch against one curve snapshot.
///
/// Results come back in request order. A failing request (unknown category, bad
/// cost) yields an error in its own slot and never affects its siblings.
pub fn evaluate_many(
    requests: &[PriceRequest],
    curves: &CurveSnapshot,
    bounds: &MarginBounds,
) -> Vec<Result<PriceSuggestion, EvaluationError>> {
    requests
        .par_iter()
        .map(|request| {
            let result = curves
                .get(&request.category)
                .ok_or_else(|| EvaluationError::UnknownCategory {
                    category: request.category.clone(),
                })
                .and_then(|curve| suggest(request, curve, bounds));

            if let Err(e) = &result {
                debug!("Price request for {} failed: {}", request.category, e);
            }
            result
        })
        .collect()
}

/// `(raw, clamped, clamp)` for one cost
fn price(
    cost: f64,
    curve: &CurveFit,
    strategy: ConfidenceStrategy,
    bounds: &MarginBounds,
) -> Result<(f64, f64, Clamp), EvaluationError> {
    if !cost.is_finite() || cost <= 0.0 {
        return Err(EvaluationError::InvalidCost { cost });
    }
    bounds.validate()?;

    let (a, b) = select_parameters(curve, strategy);
    if !a.is_finite() || !b.is_finite() {
        return Err(EvaluationError::InvalidCurve { category: curve.category.clone() });
    }

    let raw_price = a * cost.powf(b);
    let price_floor = bounds.price_floor(cost);
    let price_ceiling = bounds.price_ceiling(cost);

    let (suggested, clamp) = if raw_price < price_floor {
        (price_floor, Clamp::Floor)
    } else if raw_price > price_ceiling {
        (price_ceiling, Clamp::Ceiling)
    } else {
        (raw_price, Clamp::None)
    };

    Ok((raw_price, suggested, clamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfidenceInterval;

    fn reference_curve() -> CurveFit {
        CurveFit::new(
            "Snacks",
            2.0,
            0.5,
            ConfidenceInterval::new(1.5, 2.5),
            ConfidenceInterval::new(0.4, 0.6),
            -1.2,
        )
    }

    #[test]
    fn test_strategy_table() {
        let curve = reference_curve();
        assert_eq!(select_parameters(&curve, ConfidenceStrategy::Conservative), (1.5, 0.6));
        assert_eq!(select_parameters(&curve, ConfidenceStrategy::Aggressive), (2.5, 0.4));
        assert_eq!(select_parameters(&curve, ConfidenceStrategy::Average), (2.0, 0.5));
        assert_eq!(select_parameters(&curve, ConfidenceStrategy::Default), (2.0, 0.5));
        assert_eq!(select_parameters(&curve, "whatever".into()), (2.0, 0.5));
    }

    #[test]
    fn test_strategies_at_reference_point() {
        let bounds = MarginBounds::default();
        let curve = reference_curve();
        let request = |s: &str| PriceRequest::new("Snacks", 100.0, s.into());
        let raw = |s: &str| suggest(&request(s), &curve, &bounds).unwrap().raw_price;

        assert!((raw("conservative") - 1.5 * 100f64.powf(0.6)).abs() < 1e-9);
        assert!((raw("aggressive") - 2.5 * 100f64.powf(0.4)).abs() < 1e-9);
        assert!((raw("average") - 20.0).abs() < 1e-9);
        assert!((raw("default") - 20.0).abs() < 1e-9);
        assert_eq!(raw("yolo"), raw("default"));

        // Every strategy lands under cost here, so the floor wins
        for s in ["conservative", "aggressive", "average", "default"] {
            let suggestion = suggest(&request(s), &curve, &bounds).unwrap();
            assert_eq!(suggestion.clamp, Clamp::Floor);
            assert_eq!(suggestion.suggested_price, suggestion.price_floor);
        }
    }

    #[test]
    fn test_reference_band_clamps_to_floor() {
        // 2 * 100^0.5 = 20, far under the floor of 100 / 0.94
        let bounds = MarginBounds::default();
        let price = evaluate(100.0, &reference_curve(), ConfidenceStrategy::Default, &bounds).unwrap();
        assert!((price - 100.0 / 0.94).abs() < 1e-9);
    }

    #[test]
    fn test_end_to_end_ceiling() {
        let ci = ConfidenceInterval::new(0.0, 0.0);
        let curve = CurveFit::new("Drinks", 5.0, 0.8, ci, ci, 0.0);
        let request = PriceRequest::new("Drinks", 10.0, ConfidenceStrategy::Default);

        let suggestion = suggest(&request, &curve, &MarginBounds::default()).unwrap();
        assert!((suggestion.raw_price - 31.548).abs() < 1e-2);
        assert!((suggestion.price_floor - 10.638).abs() < 1e-3);
        assert!((suggestion.price_ceiling - 12.5).abs() < 1e-12);
        assert_eq!(suggestion.suggested_price, suggestion.price_ceiling);
        assert_eq!(suggestion.clamp, Clamp::Ceiling);
        assert!((suggestion.gross_margin - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_inside_band_is_unclamped() {
        let ci = ConfidenceInterval::new(0.0, 0.0);
        // 1.15 * 10 = 11.5 lies in [10.64, 12.5]
        let curve = CurveFit::new("Dairy", 1.15, 1.0, ci, ci, 0.0);
        let request = PriceRequest::new("Dairy", 10.0, ConfidenceStrategy::Default);
        let suggestion = suggest(&request, &curve, &MarginBounds::default()).unwrap();
        assert_eq!(suggestion.clamp, Clamp::None);
        assert!((suggestion.suggested_price - 11.5).abs() < 1e-12);
    }

    #[test]
    fn test_input_validation() {
        let curve = reference_curve();
        let bounds = MarginBounds::default();
        let s = ConfidenceStrategy::Default;

        assert_eq!(evaluate(0.0, &curve, s, &bounds), Err(EvaluationError::InvalidCost { cost: 0.0 }));
        assert!(matches!(
            evaluate(-5.0, &curve, s, &bounds),
            Err(EvaluationError::InvalidCost { .. })
        ));

        for (min_margin, max_margin) in [(0.2, 0.06), (0.1, 0.1), (0.1, 1.0), (1.0, 1.2)] {
            let bad = MarginBounds { min_margin, max_margin };
            assert!(matches!(
                evaluate(10.0, &curve, s, &bad),
                Err(EvaluationError::InvalidBounds { .. })
            ));
        }
    }

    #[test]
    fn test_non_finite_curve_rejected() {
        let mut curve = reference_curve();
        curve.curve_a = f64::NAN;
        assert!(matches!(
            evaluate(10.0, &curve, ConfidenceStrategy::Default, &MarginBounds::default()),
            Err(EvaluationError::InvalidCurve { .. })
        ));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let ci = ConfidenceInterval::new(0.0, 0.0);
        let curves: CurveSnapshot = vec![
            CurveFit::new("Snacks", 1.2, 1.0, ci, ci, 0.0),
            CurveFit::new("Drinks", 5.0, 0.8, ci, ci, 0.0),
        ]
        .into_iter()
        .collect();

        let requests = vec![
            PriceRequest::new("Snacks", 10.0, ConfidenceStrategy::Default).with_item_code("S-1"),
            PriceRequest::new("Frozen", 10.0, ConfidenceStrategy::Default),
            PriceRequest::new("Drinks", 10.0, ConfidenceStrategy::Default),
        ];

        let results = evaluate_many(&requests, &curves, &MarginBounds::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().item_code.as_deref(), Some("S-1"));
        assert!((results[0].as_ref().unwrap().suggested_price - 12.0).abs() < 1e-12);
        assert_eq!(
            results[1],
            Err(EvaluationError::UnknownCategory { category: "Frozen".to_string() })
        );
        assert_eq!(results[2].as_ref().unwrap().suggested_price, 12.5);
    }
}
