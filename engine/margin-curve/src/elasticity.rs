//! Period-over-period price elasticity of demand
//!
//! Records are grouped by `(item_code, category)` and ordered by date; every
//! consecutive pair inside a group yields at most one observation. Pairs whose
//! price did not move, or whose previous period was zero, have no defined
//! elasticity and are dropped rather than zero-filled.

use std::collections::BTreeMap;

use crate::models::{ElasticityObservation, TransactionRecord};

/// Relative change from `previous` to `current`; non-finite when `previous` is zero
pub fn pct_change(previous: f64, current: f64) -> f64 {
    (current - previous) / previous
}

/// Derive every valid elasticity observation from a batch of records
pub fn elasticity_observations(records: &[TransactionRecord]) -> Vec<ElasticityObservation> {
    let mut ordered: Vec<&TransactionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        (a.item_code.as_str(), a.category.as_str(), a.date).cmp(&(
            b.item_code.as_str(),
            b.category.as_str(),
            b.date,
        ))
    });

    ordered
        .windows(2)
        .filter(|pair| same_series(pair[0], pair[1]))
        .filter_map(|pair| observe(pair[0], pair[1]))
        .collect()
}

/// Group observations by category, across all items of that category
pub fn partition_by_category(
    observations: Vec<ElasticityObservation>,
) -> BTreeMap<String, Vec<ElasticityObservation>> {
    let mut by_category: BTreeMap<String, Vec<ElasticityObservation>> = BTreeMap::new();
    for observation in observations {
        by_category.entry(observation.category.clone()).or_default().push(observation);
    }
    by_category
}

/// Arithmetic mean elasticity; `None` for an empty slice
pub fn average_elasticity(observations: &[ElasticityObservation]) -> Option<f64> {
    if observations.is_empty() {
        return None;
    }
    let sum: f64 = observations.iter().map(|o| o.elasticity).sum();
    Some(sum / observations.len() as f64)
}

fn same_series(a: &TransactionRecord, b: &TransactionRecord) -> bool {
    a.item_code == b.item_code && a.category == b.category
}

fn observe(
    previous: &TransactionRecord,
    current: &TransactionRecord,
) -> Option<ElasticityObservation> {
    let pct_change_qty = pct_change(previous.quantity as f64, current.quantity as f64);
    let pct_change_price = pct_change(previous.sell_price_per_unit, current.sell_price_per_unit);

    if !pct_change_qty.is_finite() || !pct_change_price.is_finite() || pct_change_price == 0.0 {
        return None;
    }

    let elasticity = pct_change_qty / pct_change_price;
    if !elasticity.is_finite() {
        return None;
    }

    Some(ElasticityObservation {
        category: current.category.clone(),
        item_code: current.item_code.clone(),
        date: current.date,
        pct_change_qty,
        pct_change_price,
        elasticity,
        cost_per_unit: current.cost_per_unit,
        sell_price_per_unit: current.sell_price_per_unit,
    })
}
