//! Core data models used throughout the signal pipeline.
//!
//! These types represent the raw interaction events and catalog rows that
//! enter the pipeline, and the per-(query, item) statistics and per-item
//! modifier documents that leave it.

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lookback windows, in days, over which purchase revenue is summed.
pub const REVENUE_WINDOWS: [u32; 3] = [1, 3, 5];

/// Top-level keys every serialized [`AugmentedProduct`] writes itself.
/// Extra catalog columns may not reuse them.
pub const DOCUMENT_FIELDS: [&str; 9] = [
    "_id",
    "product_name",
    "cost",
    "in_stock",
    "image_url",
    "exact_match_boosters",
    "one_day_revenue_modifiers",
    "three_day_revenue_modifiers",
    "five_day_revenue_modifiers",
];

/// Kind of interaction recorded in the search log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Click,
    AddToCart,
    Purchased,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::AddToCart => "add_to_cart",
            Action::Purchased => "purchased",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(Action::Click),
            "add_to_cart" => Ok(Action::AddToCart),
            "purchased" => Ok(Action::Purchased),
            other => Err(format!(
                "unrecognized action '{}'. Must be click, add_to_cart, or purchased",
                other
            )),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed interaction from the search log.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub query: String,
    pub item_id: String,
    pub action: Action,
    pub days_ago: u32,
}

/// A catalog row.
///
/// `extra` keeps any display columns beyond the ones the pipeline reads,
/// in the order they appeared in the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub item_id: String,
    pub product_name: String,
    pub cost: Decimal,
    pub in_stock: bool,
    pub image_url: String,
    pub extra: Vec<(String, String)>,
}

/// Aggregated interaction statistics for one (query, item) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryItemStats {
    pub query: String,
    pub item_id: String,
    pub total_purchases: u64,
    pub add_to_cart_count: u64,
    pub total_click_count: u64,
    pub one_day_revenue: Decimal,
    pub three_day_revenue: Decimal,
    pub five_day_revenue: Decimal,
}

impl QueryItemStats {
    /// Revenue for one of the [`REVENUE_WINDOWS`].
    pub fn revenue(&self, window: u32) -> Decimal {
        match window {
            1 => self.one_day_revenue,
            3 => self.three_day_revenue,
            5 => self.five_day_revenue,
            _ => Decimal::ZERO,
        }
    }
}

/// A stats row left-joined with its catalog product, if one still exists.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub stats: QueryItemStats,
    pub product: Option<Product>,
}

/// Sparse mapping of normalized key to a strictly positive score value.
///
/// An absent key means zero. Zero and negative values are never stored, so
/// a serialized document only carries the entries that actually move a
/// score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifierMap(BTreeMap<String, Decimal>);

impl ModifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, returning the previous value.
    ///
    /// Non-positive values are dropped and leave the map untouched.
    pub fn insert(&mut self, key: String, value: Decimal) -> Option<Decimal> {
        if value > Decimal::ZERO {
            self.0.insert(key, value)
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Serialize for ModifierMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Score-modifier fields attached to one product before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifierDocument {
    pub exact_match_boosters: BTreeMap<String, u32>,
    pub one_day_revenue_modifiers: ModifierMap,
    pub three_day_revenue_modifiers: ModifierMap,
    pub five_day_revenue_modifiers: ModifierMap,
}

impl ModifierDocument {
    /// Mutable access to the modifier map for one of the [`REVENUE_WINDOWS`].
    pub fn window_mut(&mut self, window: u32) -> Option<&mut ModifierMap> {
        match window {
            1 => Some(&mut self.one_day_revenue_modifiers),
            3 => Some(&mut self.three_day_revenue_modifiers),
            5 => Some(&mut self.five_day_revenue_modifiers),
            _ => None,
        }
    }

    pub fn window(&self, window: u32) -> Option<&ModifierMap> {
        match window {
            1 => Some(&self.one_day_revenue_modifiers),
            3 => Some(&self.three_day_revenue_modifiers),
            5 => Some(&self.five_day_revenue_modifiers),
            _ => None,
        }
    }
}

/// A product with its modifier fields, in the flat shape the index ingests.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedProduct {
    pub product: Product,
    pub modifiers: ModifierDocument,
}

impl Serialize for AugmentedProduct {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let p = &self.product;
        let m = &self.modifiers;
        let mut map = serializer.serialize_map(Some(DOCUMENT_FIELDS.len() + p.extra.len()))?;
        map.serialize_entry("_id", &p.item_id)?;
        map.serialize_entry("product_name", &p.product_name)?;
        map.serialize_entry("cost", &p.cost)?;
        map.serialize_entry("in_stock", &p.in_stock)?;
        map.serialize_entry("image_url", &p.image_url)?;
        for (k, v) in &p.extra {
            map.serialize_entry(k, v)?;
        }
        map.serialize_entry("exact_match_boosters", &m.exact_match_boosters)?;
        map.serialize_entry("one_day_revenue_modifiers", &m.one_day_revenue_modifiers)?;
        map.serialize_entry("three_day_revenue_modifiers", &m.three_day_revenue_modifiers)?;
        map.serialize_entry("five_day_revenue_modifiers", &m.five_day_revenue_modifiers)?;
        map.end()
    }
}
