//! Tabular inputs and outputs of the pipeline.
//!
//! Inputs are CSV files with a header row. Every parse failure is fatal and
//! names the offending data row (1-based, header excluded), because silently
//! skipping a row would skew the aggregates. Outputs are written to a temp
//! file in the destination directory and renamed into place only once fully
//! written, so a failed run never leaves a truncated table behind.

use csv::StringRecord;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::aggregate::round_cents;
use crate::error::{PipelineError, Result};
use crate::models::{
    Action, AugmentedProduct, InteractionEvent, MergedRow, Product, QueryItemStats, DOCUMENT_FIELDS,
};

const ID_COLUMNS: &[&str] = &["_id", "item_id"];

const STATS_HEADER: [&str; 8] = [
    "query",
    "item_id",
    "total_purchases",
    "add_to_cart_count",
    "total_click_count",
    "one_day_revenue",
    "three_day_revenue",
    "five_day_revenue",
];

const PRODUCT_COLUMNS: [&str; 4] = ["product_name", "cost", "in_stock", "image_url"];

/// Header lookup for one input file.
struct Columns<'a> {
    path: &'a Path,
    headers: StringRecord,
}

impl<'a> Columns<'a> {
    fn require(&self, names: &[&str]) -> Result<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h.trim() == *name))
            .ok_or_else(|| PipelineError::MissingColumn {
                path: self.path.to_path_buf(),
                column: names.join("' or '"),
            })
    }
}

fn open(path: &Path) -> Result<(csv::Reader<std::fs::File>, StringRecord)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| PipelineError::csv(path, e))?
        .clone();
    Ok((reader, headers))
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or("").trim()
}

/// Read the raw search log.
///
/// Columns: `query`, `_id` (or `item_id`), `action`, `days_ago_action_performed`.
pub fn read_events(path: &Path) -> Result<Vec<InteractionEvent>> {
    let (mut reader, headers) = open(path)?;
    let cols = Columns { path, headers };
    let query_idx = cols.require(&["query"])?;
    let id_idx = cols.require(ID_COLUMNS)?;
    let action_idx = cols.require(&["action"])?;
    let days_idx = cols.require(&["days_ago_action_performed", "days_ago"])?;

    let mut events = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| PipelineError::csv(path, e))?;

        let item_id = field(&record, id_idx);
        if item_id.is_empty() {
            return Err(PipelineError::malformed(path, row, "empty item id"));
        }
        let action = field(&record, action_idx)
            .parse::<Action>()
            .map_err(|reason| PipelineError::malformed(path, row, reason))?;
        let days_ago = parse_days_ago(field(&record, days_idx))
            .map_err(|reason| PipelineError::malformed(path, row, reason))?;

        events.push(InteractionEvent {
            // Raw query text is the grouping key, so it is kept untrimmed.
            query: record.get(query_idx).unwrap_or("").to_string(),
            item_id: item_id.to_string(),
            action,
            days_ago,
        });
    }
    Ok(events)
}

fn parse_days_ago(raw: &str) -> std::result::Result<u32, String> {
    let value: i64 = raw
        .parse()
        .map_err(|_| format!("days_ago_action_performed '{}' is not an integer", raw))?;
    if value < 0 {
        return Err(format!("days_ago_action_performed {} is negative", value));
    }
    u32::try_from(value).map_err(|_| format!("days_ago_action_performed {} is out of range", value))
}

/// Read the product catalog.
///
/// Columns: `_id` (or `item_id`), `product_name`, `cost`, `in_stock`,
/// `image_url`. Any other columns are kept, in order, as display fields;
/// they must not repeat each other or a generated document field.
pub fn read_products(path: &Path) -> Result<Vec<Product>> {
    let (mut reader, headers) = open(path)?;
    let cols = Columns { path, headers };
    let id_idx = cols.require(ID_COLUMNS)?;
    let name_idx = cols.require(&["product_name"])?;
    let cost_idx = cols.require(&["cost"])?;
    let stock_idx = cols.require(&["in_stock"])?;
    let image_idx = cols.require(&["image_url"])?;
    let known = [id_idx, name_idx, cost_idx, stock_idx, image_idx];
    let extra_cols: Vec<(usize, String)> = cols
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| !known.contains(idx))
        .map(|(idx, name)| (idx, name.trim().to_string()))
        .collect();
    for (n, (_, name)) in extra_cols.iter().enumerate() {
        let repeated = extra_cols[..n].iter().any(|(_, earlier)| earlier == name);
        if repeated || DOCUMENT_FIELDS.contains(&name.as_str()) {
            return Err(PipelineError::ConflictingColumn {
                path: path.to_path_buf(),
                column: name.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    let mut products = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| PipelineError::csv(path, e))?;

        let item_id = field(&record, id_idx).to_string();
        if item_id.is_empty() {
            return Err(PipelineError::malformed(path, row, "empty item id"));
        }
        if !seen.insert(item_id.clone()) {
            return Err(PipelineError::DuplicateProduct {
                path: path.to_path_buf(),
                row,
                item_id,
            });
        }

        let cost = parse_amount("cost", field(&record, cost_idx))
            .map_err(|reason| PipelineError::malformed(path, row, reason))?;
        let in_stock = parse_in_stock(field(&record, stock_idx))
            .map_err(|reason| PipelineError::malformed(path, row, reason))?;

        products.push(Product {
            item_id,
            product_name: record.get(name_idx).unwrap_or("").to_string(),
            cost,
            in_stock,
            image_url: field(&record, image_idx).to_string(),
            extra: extra_cols
                .iter()
                .map(|(idx, name)| (name.clone(), record.get(*idx).unwrap_or("").to_string()))
                .collect(),
        });
    }
    Ok(products)
}

fn parse_amount(column: &str, raw: &str) -> std::result::Result<Decimal, String> {
    let value: Decimal = raw
        .parse()
        .map_err(|_| format!("{} '{}' is not a number", column, raw))?;
    if value < Decimal::ZERO {
        return Err(format!("{} {} must be a non-negative number", column, raw));
    }
    Ok(value)
}

fn parse_in_stock(raw: &str) -> std::result::Result<bool, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else {
        Err(format!("in_stock '{}' must be true or false", raw))
    }
}

fn parse_count(column: &str, raw: &str) -> std::result::Result<u64, String> {
    raw.parse()
        .map_err(|_| format!("{} '{}' is not a non-negative integer", column, raw))
}

/// Read a historical stats table written by [`write_stats`].
pub fn read_stats(path: &Path) -> Result<Vec<QueryItemStats>> {
    let (mut reader, headers) = open(path)?;
    let cols = Columns { path, headers };
    let query_idx = cols.require(&["query"])?;
    let id_idx = cols.require(ID_COLUMNS)?;
    let mut idx = [0usize; 6];
    for (slot, name) in STATS_HEADER[2..].iter().enumerate() {
        idx[slot] = cols.require(&[name])?;
    }

    let mut stats = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| PipelineError::csv(path, e))?;
        let bad = |reason: String| PipelineError::malformed(path, row, reason);

        stats.push(QueryItemStats {
            query: record.get(query_idx).unwrap_or("").to_string(),
            item_id: field(&record, id_idx).to_string(),
            total_purchases: parse_count(STATS_HEADER[2], field(&record, idx[0])).map_err(bad)?,
            add_to_cart_count: parse_count(STATS_HEADER[3], field(&record, idx[1])).map_err(bad)?,
            total_click_count: parse_count(STATS_HEADER[4], field(&record, idx[2])).map_err(bad)?,
            one_day_revenue: parse_amount(STATS_HEADER[5], field(&record, idx[3])).map_err(bad)?,
            three_day_revenue: parse_amount(STATS_HEADER[6], field(&record, idx[4]))
                .map_err(bad)?,
            five_day_revenue: parse_amount(STATS_HEADER[7], field(&record, idx[5])).map_err(bad)?,
        });
    }
    Ok(stats)
}

fn stats_fields(s: &QueryItemStats) -> [String; 8] {
    [
        s.query.clone(),
        s.item_id.clone(),
        s.total_purchases.to_string(),
        s.add_to_cart_count.to_string(),
        s.total_click_count.to_string(),
        format!("{:.2}", round_cents(s.one_day_revenue)),
        format!("{:.2}", round_cents(s.three_day_revenue)),
        format!("{:.2}", round_cents(s.five_day_revenue)),
    ]
}

/// Write the historical stats table.
pub fn write_stats(path: &Path, stats: &[QueryItemStats]) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(STATS_HEADER)
            .map_err(|e| PipelineError::csv(path, e))?;
        for s in stats {
            writer
                .write_record(stats_fields(s))
                .map_err(|e| PipelineError::csv(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))
    })
}

/// Write the merged table: stats columns, then product columns.
///
/// Product columns are empty for stats rows whose item left the catalog.
pub fn write_merged(path: &Path, rows: &[MergedRow]) -> Result<()> {
    let mut extra_names: Vec<&str> = Vec::new();
    for product in rows.iter().filter_map(|r| r.product.as_ref()) {
        for (name, _) in &product.extra {
            if !extra_names.contains(&name.as_str()) {
                extra_names.push(name);
            }
        }
    }

    write_atomic(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        let header: Vec<&str> = STATS_HEADER
            .iter()
            .chain(PRODUCT_COLUMNS.iter())
            .copied()
            .chain(extra_names.iter().copied())
            .collect();
        writer
            .write_record(&header)
            .map_err(|e| PipelineError::csv(path, e))?;

        for row in rows {
            let mut record: Vec<String> = stats_fields(&row.stats).to_vec();
            match &row.product {
                Some(p) => {
                    record.push(p.product_name.clone());
                    record.push(p.cost.to_string());
                    record.push(p.in_stock.to_string());
                    record.push(p.image_url.clone());
                    for name in &extra_names {
                        let value = p
                            .extra
                            .iter()
                            .find(|(k, _)| k == name)
                            .map(|(_, v)| v.clone())
                            .unwrap_or_default();
                        record.push(value);
                    }
                }
                None => {
                    record.extend(std::iter::repeat(String::new()).take(header.len() - 8));
                }
            }
            writer
                .write_record(&record)
                .map_err(|e| PipelineError::csv(path, e))?;
        }
        writer.flush().map_err(|e| PipelineError::io(path, e))
    })
}

/// Write augmented product documents as a pretty-printed JSON array.
pub fn write_documents(path: &Path, documents: &[AugmentedProduct]) -> Result<()> {
    write_atomic(path, |file| {
        serde_json::to_writer_pretty(&mut *file, documents)?;
        writeln!(file).map_err(|e| PipelineError::io(path, e))
    })
}

/// Read a documents file produced by [`write_documents`].
pub fn read_documents(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| PipelineError::io(parent, e))?;
    write(&mut tmp)?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}
