//! Left join of aggregated stats onto the product catalog.

use std::collections::HashMap;

use crate::models::{MergedRow, Product, QueryItemStats};

/// Attach catalog products to stats rows by `item_id`.
///
/// Every stats row is kept, in input order; rows whose item is no longer in
/// the catalog carry `product: None`. Products without stats never appear.
pub fn merge(stats: &[QueryItemStats], catalog: &[Product]) -> Vec<MergedRow> {
    let by_id: HashMap<&str, &Product> = catalog
        .iter()
        .map(|p| (p.item_id.as_str(), p))
        .collect();

    stats
        .iter()
        .map(|s| MergedRow {
            stats: s.clone(),
            product: by_id.get(s.item_id.as_str()).map(|p| (*p).clone()),
        })
        .collect()
}
