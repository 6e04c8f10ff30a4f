//! Per-item score-modifier documents.
//!
//! Each product gets an exact-match booster keyed by its own normalized name,
//! plus three sparse revenue-modifier maps (1/3/5-day) keyed by the
//! normalized text of every query that produced revenue for it. At search
//! time the index adds `<field>.<normalize(query)>` values into the score.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::models::{
    AugmentedProduct, ModifierDocument, ModifierMap, Product, QueryItemStats, REVENUE_WINDOWS,
};
use crate::normalize::normalize;

/// Weight stored under a product's own normalized name.
pub const EXACT_MATCH_WEIGHT: u32 = 1000;

/// Two distinct raw queries that normalized to the same key for one item
/// and window. The later query's value replaced the earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCollision {
    pub item_id: String,
    pub window: u32,
    pub key: String,
    pub previous_query: String,
    pub query: String,
    pub previous_value: Decimal,
    pub value: Decimal,
}

/// Build modifier documents for every product in the catalog.
pub fn build_modifiers(
    catalog: &[Product],
    stats: &[QueryItemStats],
) -> BTreeMap<String, ModifierDocument> {
    build_modifiers_with_report(catalog, stats).0
}

/// Like [`build_modifiers`], also returning every key collision observed.
///
/// Stats rows are applied in input order, so the last row for a colliding
/// key wins.
pub fn build_modifiers_with_report(
    catalog: &[Product],
    stats: &[QueryItemStats],
) -> (BTreeMap<String, ModifierDocument>, Vec<KeyCollision>) {
    let mut stats_by_item: HashMap<&str, Vec<&QueryItemStats>> = HashMap::new();
    for row in stats {
        stats_by_item
            .entry(row.item_id.as_str())
            .or_default()
            .push(row);
    }

    let mut documents = BTreeMap::new();
    let mut collisions = Vec::new();

    for product in catalog {
        let mut doc = base_document(product);

        // (window, key) -> raw query that last wrote it
        let mut writers: HashMap<(u32, String), &str> = HashMap::new();

        for row in stats_by_item
            .get(product.item_id.as_str())
            .into_iter()
            .flatten()
        {
            let key = normalize(&row.query);
            for window in REVENUE_WINDOWS {
                let revenue = row.revenue(window);
                let Some(map) = doc.window_mut(window) else {
                    continue;
                };
                let Some(previous_value) = map.insert(key.clone(), revenue) else {
                    if revenue > Decimal::ZERO {
                        writers.insert((window, key.clone()), row.query.as_str());
                    }
                    continue;
                };

                let previous_query = writers
                    .insert((window, key.clone()), row.query.as_str())
                    .unwrap_or_default();
                if previous_query != row.query {
                    warn!(
                        item_id = %product.item_id,
                        window,
                        key = %key,
                        previous_query,
                        query = %row.query,
                        "modifier key collision; keeping later value"
                    );
                    collisions.push(KeyCollision {
                        item_id: product.item_id.clone(),
                        window,
                        key: key.clone(),
                        previous_query: previous_query.to_string(),
                        query: row.query.clone(),
                        previous_value,
                        value: revenue,
                    });
                }
            }
        }

        documents.insert(product.item_id.clone(), doc);
    }

    (documents, collisions)
}

/// Booster for the product's own name and empty revenue maps.
fn base_document(product: &Product) -> ModifierDocument {
    ModifierDocument {
        exact_match_boosters: BTreeMap::from([(
            normalize(&product.product_name),
            EXACT_MATCH_WEIGHT,
        )]),
        one_day_revenue_modifiers: ModifierMap::new(),
        three_day_revenue_modifiers: ModifierMap::new(),
        five_day_revenue_modifiers: ModifierMap::new(),
    }
}

/// Pair each catalog product with its modifier document, in catalog order.
pub fn augment(
    catalog: Vec<Product>,
    mut modifiers: BTreeMap<String, ModifierDocument>,
) -> Vec<AugmentedProduct> {
    catalog
        .into_iter()
        .map(|product| {
            let modifiers = modifiers
                .remove(&product.item_id)
                .unwrap_or_else(|| base_document(&product));
            AugmentedProduct { product, modifiers }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(item_id: &str, name: &str) -> Product {
        Product {
            item_id: item_id.into(),
            product_name: name.into(),
            cost: Decimal::new(5, 0),
            in_stock: true,
            image_url: format!("http://img/{}.png", item_id),
            extra: Vec::new(),
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn stats(query: &str, item_id: &str, one: &str, three: &str, five: &str) -> QueryItemStats {
        QueryItemStats {
            query: query.into(),
            item_id: item_id.into(),
            total_purchases: 0,
            add_to_cart_count: 0,
            total_click_count: 0,
            one_day_revenue: dec(one),
            three_day_revenue: dec(three),
            five_day_revenue: dec(five),
        }
    }

    #[test]
    fn product_without_stats_gets_only_booster() {
        let docs = build_modifiers(&[product("A1", "Green Candy Dress")], &[]);
        let doc = &docs["A1"];

        assert_eq!(
            doc.exact_match_boosters,
            BTreeMap::from([("green_candy_dress".to_string(), 1000)])
        );
        assert!(doc.one_day_revenue_modifiers.is_empty());
        assert!(doc.three_day_revenue_modifiers.is_empty());
        assert!(doc.five_day_revenue_modifiers.is_empty());

        let json = serde_json::to_value(doc).unwrap();
        assert_eq!(json["five_day_revenue_modifiers"], serde_json::json!({}));
    }

    #[test]
    fn zero_revenue_windows_are_omitted() {
        let docs = build_modifiers(
            &[product("A1", "dress")],
            &[stats("Red Dress", "A1", "0.0", "0.0", "12.5")],
        );
        let doc = &docs["A1"];
        assert!(doc.one_day_revenue_modifiers.get("red_dress").is_none());
        assert!(doc.three_day_revenue_modifiers.get("red_dress").is_none());
        assert_eq!(doc.five_day_revenue_modifiers.get("red_dress"), Some(dec("12.5")));
    }

    #[test]
    fn stats_for_other_items_ignored() {
        let docs = build_modifiers(
            &[product("A1", "dress"), product("B2", "hat")],
            &[stats("hat", "B2", "3.0", "3.0", "3.0")],
        );
        assert!(docs["A1"].five_day_revenue_modifiers.is_empty());
        assert_eq!(docs["B2"].one_day_revenue_modifiers.get("hat"), Some(dec("3.0")));
    }

    #[test]
    fn normalized_collision_is_last_write_wins() {
        let (docs, collisions) = build_modifiers_with_report(
            &[product("A1", "dress")],
            &[
                stats("Red Dress", "A1", "5.0", "0.0", "0.0"),
                stats("red-dress", "A1", "7.0", "0.0", "0.0"),
            ],
        );

        assert_eq!(docs["A1"].one_day_revenue_modifiers.get("red_dress"), Some(dec("7.0")));
        assert_eq!(collisions.len(), 1);
        let c = &collisions[0];
        assert_eq!(c.window, 1);
        assert_eq!(c.key, "red_dress");
        assert_eq!(c.previous_query, "Red Dress");
        assert_eq!(c.query, "red-dress");
        assert_eq!(c.previous_value, dec("5"));
        assert_eq!(c.value, dec("7"));
    }

    #[test]
    fn zero_does_not_overwrite_or_collide() {
        let (docs, collisions) = build_modifiers_with_report(
            &[product("A1", "dress")],
            &[
                stats("Red Dress", "A1", "5.0", "5.0", "5.0"),
                stats("red-dress", "A1", "0.0", "0.0", "0.0"),
            ],
        );
        assert_eq!(docs["A1"].one_day_revenue_modifiers.get("red_dress"), Some(dec("5.0")));
        assert!(collisions.is_empty());
    }

    #[test]
    fn augment_keeps_catalog_order() {
        let catalog = vec![product("B2", "hat"), product("A1", "dress")];
        let docs = build_modifiers(&catalog, &[]);
        let augmented = augment(catalog, docs);
        let ids: Vec<&str> = augmented
            .iter()
            .map(|a| a.product.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B2", "A1"]);
        assert!(augmented[0].modifiers.exact_match_boosters.contains_key("hat"));
    }

    fn arb_stats() -> impl Strategy<Value = QueryItemStats> {
        (
            prop::sample::select(vec!["red dress", "Red Dress", "red-dress", "hat", "Hat!", ""]),
            prop::sample::select(vec!["A1", "B2", "GONE"]),
            prop::collection::vec(0i64..5_000, 3),
        )
            .prop_map(|(query, item_id, cents)| QueryItemStats {
                query: query.into(),
                item_id: item_id.into(),
                total_purchases: 0,
                add_to_cart_count: 0,
                total_click_count: 0,
                one_day_revenue: Decimal::new(cents[0], 2),
                three_day_revenue: Decimal::new(cents[1], 2),
                five_day_revenue: Decimal::new(cents[2], 2),
            })
    }

    proptest! {
        #[test]
        fn revenue_maps_hold_only_positive_values(rows in prop::collection::vec(arb_stats(), 0..40)) {
            let catalog = vec![product("A1", "red dress"), product("B2", "wool hat")];
            let docs = build_modifiers(&catalog, &rows);

            prop_assert_eq!(docs.len(), catalog.len());
            for doc in docs.values() {
                prop_assert_eq!(doc.exact_match_boosters.len(), 1);
                for window in REVENUE_WINDOWS {
                    for (_, value) in doc.window(window).unwrap().iter() {
                        prop_assert!(value > Decimal::ZERO);
                    }
                }
            }
        }

        #[test]
        fn last_positive_row_wins(rows in prop::collection::vec(arb_stats(), 0..40)) {
            let catalog = vec![product("A1", "red dress")];
            let docs = build_modifiers(&catalog, &rows);
            let doc = &docs["A1"];

            for window in REVENUE_WINDOWS {
                let mut expected: BTreeMap<String, Decimal> = BTreeMap::new();
                for row in rows.iter().filter(|r| r.item_id == "A1") {
                    if row.revenue(window) > Decimal::ZERO {
                        expected.insert(normalize(&row.query), row.revenue(window));
                    }
                }
                let actual: BTreeMap<String, Decimal> = doc
                    .window(window)
                    .unwrap()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
