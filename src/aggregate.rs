//! Interaction-log aggregation.
//!
//! Turns raw search-log events into one [`QueryItemStats`] row per distinct
//! `(query, item_id)` pair. Queries are grouped on their raw text here;
//! normalization happens later, when modifier keys are built.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

use crate::models::{Action, InteractionEvent, Product, QueryItemStats, REVENUE_WINDOWS};

#[derive(Default)]
struct Tally {
    purchases: u64,
    add_to_cart: u64,
    clicks: u64,
    // Purchases with days_ago <= 1, 3, 5. Windows are cumulative.
    window_purchases: [u64; 3],
}

/// Build the `item_id -> cost` lookup used by [`aggregate`].
pub fn product_costs(catalog: &[Product]) -> HashMap<String, Decimal> {
    catalog
        .iter()
        .map(|p| (p.item_id.clone(), p.cost))
        .collect()
}

/// Aggregate events per `(query, item_id)`.
///
/// Revenue for each window is `purchases_in_window × cost`, rounded half-up
/// to cents. Items without a cost entry contribute zero revenue. Output is
/// sorted by `(query, item_id)`.
pub fn aggregate(
    events: &[InteractionEvent],
    product_costs: &HashMap<String, Decimal>,
) -> Vec<QueryItemStats> {
    let mut groups: HashMap<(&str, &str), Tally> = HashMap::new();

    for event in events {
        let tally = groups
            .entry((event.query.as_str(), event.item_id.as_str()))
            .or_default();
        match event.action {
            Action::Click => tally.clicks += 1,
            Action::AddToCart => tally.add_to_cart += 1,
            Action::Purchased => {
                tally.purchases += 1;
                for (slot, window) in REVENUE_WINDOWS.iter().enumerate() {
                    if event.days_ago <= *window {
                        tally.window_purchases[slot] += 1;
                    }
                }
            }
        }
    }

    let mut stats: Vec<QueryItemStats> = groups
        .into_iter()
        .map(|((query, item_id), tally)| {
            let cost = product_costs.get(item_id).copied().unwrap_or(Decimal::ZERO);
            let [one, three, five] = tally.window_purchases;
            QueryItemStats {
                query: query.to_string(),
                item_id: item_id.to_string(),
                total_purchases: tally.purchases,
                add_to_cart_count: tally.add_to_cart,
                total_click_count: tally.clicks,
                one_day_revenue: round_cents(Decimal::from(one) * cost),
                three_day_revenue: round_cents(Decimal::from(three) * cost),
                five_day_revenue: round_cents(Decimal::from(five) * cost),
            }
        })
        .collect();

    stats.sort_by(|a, b| (&a.query, &a.item_id).cmp(&(&b.query, &b.item_id)));
    stats
}

/// Round half-up to two decimal places. Inputs are non-negative.
pub(crate) fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
