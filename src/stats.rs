//! Dataset statistics and health overview.
//!
//! Provides a quick summary of the derived signal tables: how many pairs
//! were aggregated, how much revenue each window carries, how many stats
//! rows lost their catalog product, and how many modifier keys collided.
//! Used by `signals stats` to give confidence that a pipeline run produced
//! sensible data before it is uploaded.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

use crate::config::Config;
use crate::display::{format_amount, format_count};
use crate::index::{MarqoIndex, SearchIndex};
use crate::merge::merge;
use crate::modifiers::build_modifiers_with_report;
use crate::models::QueryItemStats;
use crate::tables;

/// Per-query revenue breakdown.
struct QueryStats {
    query: String,
    items: usize,
    purchases: u64,
    five_day_revenue: Decimal,
}

const TOP_QUERIES: usize = 10;

/// Run the stats command: read the derived tables and print a summary.
pub async fn run_stats(config: &Config, remote: bool) -> Result<()> {
    let data = &config.data;
    let products = tables::read_products(&data.product_data)
        .with_context(|| "Failed to load product data")?;
    let stats = tables::read_stats(&data.historical_data)
        .with_context(|| "Failed to load historical data (run `signals historical` first)")?;

    let in_stock = products.iter().filter(|p| p.in_stock).count();
    let distinct_queries: HashSet<&str> = stats.iter().map(|s| s.query.as_str()).collect();
    let distinct_items: HashSet<&str> = stats.iter().map(|s| s.item_id.as_str()).collect();
    let unmatched = merge(&stats, &products)
        .iter()
        .filter(|r| r.product.is_none())
        .count();
    let (_, collisions) = build_modifiers_with_report(&products, &stats);

    println!("Search Signals — Dataset Stats");
    println!("==============================");
    println!();
    println!(
        "  Products:        {} ({} in stock)",
        format_count(products.len()),
        format_count(in_stock)
    );
    println!("  Query/item rows: {}", format_count(stats.len()));
    println!("  Queries:         {}", format_count(distinct_queries.len()));
    println!("  Items:           {}", format_count(distinct_items.len()));
    println!(
        "  Purchases:       {}",
        stats.iter().map(|s| s.total_purchases).sum::<u64>()
    );
    println!(
        "  Add to cart:     {}",
        stats.iter().map(|s| s.add_to_cart_count).sum::<u64>()
    );
    println!(
        "  Clicks:          {}",
        stats.iter().map(|s| s.total_click_count).sum::<u64>()
    );
    println!();
    println!("  Revenue 1d:      {}", format_amount(sum(&stats, |s| s.one_day_revenue)));
    println!("  Revenue 3d:      {}", format_amount(sum(&stats, |s| s.three_day_revenue)));
    println!("  Revenue 5d:      {}", format_amount(sum(&stats, |s| s.five_day_revenue)));
    println!();
    println!("  Rows without catalog product: {}", unmatched);
    println!("  Modifier key collisions:      {}", collisions.len());

    let top = top_queries(&stats);
    if !top.is_empty() {
        println!();
        println!("  Top queries by 5-day revenue:");
        println!(
            "  {:<32} {:>6} {:>10} {:>12}",
            "QUERY", "ITEMS", "PURCHASES", "REVENUE 5D"
        );
        println!("  {}", "-".repeat(64));
        for q in &top {
            println!(
                "  {:<32} {:>6} {:>10} {:>12}",
                truncate(&q.query, 32),
                q.items,
                q.purchases,
                format_amount(q.five_day_revenue)
            );
        }
    }

    if remote {
        let index = MarqoIndex::from_config(&config.index)?;
        let index_stats = index.stats().await?;
        println!();
        println!("  Index:           {}", index.name());
        match index_stats.get("numberOfDocuments") {
            Some(n) => println!("  Documents:       {}", n),
            None => println!("  Response:        {}", index_stats),
        }
    }

    println!();
    Ok(())
}

fn sum(stats: &[QueryItemStats], f: impl Fn(&QueryItemStats) -> Decimal) -> Decimal {
    stats.iter().map(f).sum()
}

fn top_queries(stats: &[QueryItemStats]) -> Vec<QueryStats> {
    let mut by_query: BTreeMap<&str, QueryStats> = BTreeMap::new();
    for s in stats {
        let entry = by_query.entry(s.query.as_str()).or_insert_with(|| QueryStats {
            query: s.query.clone(),
            items: 0,
            purchases: 0,
            five_day_revenue: Decimal::ZERO,
        });
        entry.items += 1;
        entry.purchases += s.total_purchases;
        entry.five_day_revenue += s.five_day_revenue;
    }

    let mut queries: Vec<QueryStats> = by_query
        .into_values()
        .filter(|q| q.five_day_revenue > Decimal::ZERO)
        .collect();
    queries.sort_by(|a, b| b.five_day_revenue.cmp(&a.five_day_revenue));
    queries.truncate(TOP_QUERIES);
    queries
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(query: &str, item_id: &str, purchases: u64, five: i64) -> QueryItemStats {
        QueryItemStats {
            query: query.into(),
            item_id: item_id.into(),
            total_purchases: purchases,
            add_to_cart_count: 0,
            total_click_count: 0,
            one_day_revenue: Decimal::ZERO,
            three_day_revenue: Decimal::ZERO,
            five_day_revenue: Decimal::new(five, 0),
        }
    }

    #[test]
    fn top_queries_sorted_and_zero_dropped() {
        let stats = vec![
            row("hat", "B1", 1, 5),
            row("dress", "A1", 2, 20),
            row("dress", "A2", 1, 10),
            row("socks", "C1", 0, 0),
        ];
        let top = top_queries(&stats);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].query, "dress");
        assert_eq!(top[0].items, 2);
        assert_eq!(top[0].purchases, 3);
        assert_eq!(top[0].five_day_revenue, Decimal::new(30, 0));
        assert_eq!(top[1].query, "hat");
    }

    #[test]
    fn truncate_long_query() {
        assert_eq!(truncate("short", 32), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
