//! Batch pipeline orchestration.
//!
//! Coordinates the three derivation stages: search log → historical stats
//! → merged table, and historical stats → complete modifier documents. Each
//! stage reads its complete inputs into memory, computes its output, and
//! writes it only after the whole computation succeeded. Any fatal error
//! aborts the stage with no output file written.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::info;

use crate::aggregate::{aggregate, product_costs};
use crate::config::Config;
use crate::merge::merge;
use crate::modifiers::{augment, build_modifiers_with_report};
use crate::tables;

/// Aggregate the search log into the historical stats table.
pub fn run_historical(config: &Config) -> Result<()> {
    let start = Instant::now();
    let data = &config.data;

    let events = tables::read_events(&data.search_log)
        .with_context(|| "Failed to load search log")?;
    let products = tables::read_products(&data.product_data)
        .with_context(|| "Failed to load product data")?;

    let stats = aggregate(&events, &product_costs(&products));
    tables::write_stats(&data.historical_data, &stats)?;
    info!(
        events = events.len(),
        pairs = stats.len(),
        path = %data.historical_data.display(),
        "historical data written"
    );

    println!("historical");
    println!("  events read: {}", events.len());
    println!("  products read: {}", products.len());
    println!("  query/item pairs: {}", stats.len());
    println!("  wrote: {}", data.historical_data.display());
    println!("  elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("ok");
    Ok(())
}

/// Left-join the historical stats table onto the catalog.
pub fn run_merge(config: &Config) -> Result<()> {
    let start = Instant::now();
    let data = &config.data;

    let stats = tables::read_stats(&data.historical_data)
        .with_context(|| "Failed to load historical data (run `signals historical` first)")?;
    let products = tables::read_products(&data.product_data)
        .with_context(|| "Failed to load product data")?;

    let rows = merge(&stats, &products);
    let unmatched = rows.iter().filter(|r| r.product.is_none()).count();
    tables::write_merged(&data.merged_data, &rows)?;
    info!(
        rows = rows.len(),
        unmatched,
        path = %data.merged_data.display(),
        "merged data written"
    );

    println!("merge");
    println!("  stats rows: {}", stats.len());
    println!("  rows without catalog product: {}", unmatched);
    println!("  wrote: {}", data.merged_data.display());
    println!("  elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("ok");
    Ok(())
}

/// Build modifier documents and write the complete product JSON.
pub fn run_modifiers(config: &Config) -> Result<()> {
    let start = Instant::now();
    let data = &config.data;

    let stats = tables::read_stats(&data.historical_data)
        .with_context(|| "Failed to load historical data (run `signals historical` first)")?;
    let products = tables::read_products(&data.product_data)
        .with_context(|| "Failed to load product data")?;
    let product_count = products.len();

    let (modifiers, collisions) = build_modifiers_with_report(&products, &stats);
    let revenue_entries: usize = modifiers
        .values()
        .map(|d| {
            d.one_day_revenue_modifiers.len()
                + d.three_day_revenue_modifiers.len()
                + d.five_day_revenue_modifiers.len()
        })
        .sum();
    let documents = augment(products, modifiers);
    tables::write_documents(&data.complete_data, &documents)?;
    info!(
        documents = documents.len(),
        revenue_entries,
        collisions = collisions.len(),
        path = %data.complete_data.display(),
        "complete data written"
    );

    println!("modifiers");
    println!("  products: {}", product_count);
    println!("  stats rows: {}", stats.len());
    println!("  revenue modifier entries: {}", revenue_entries);
    println!("  key collisions: {}", collisions.len());
    println!("  wrote: {}", data.complete_data.display());
    println!("  elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("ok");
    Ok(())
}

/// Run every stage in order.
pub fn run_all(config: &Config) -> Result<()> {
    run_historical(config)?;
    run_merge(config)?;
    run_modifiers(config)
}
