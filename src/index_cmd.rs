use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::index::{self, IndexSettings, MarqoIndex, MultimodalField, SearchIndex};
use crate::progress::ProgressMode;
use crate::tables;

fn connect(config: &Config) -> Result<MarqoIndex> {
    MarqoIndex::from_config(&config.index)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    if !value.is_null() {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

pub async fn run_create(config: &Config) -> Result<()> {
    let index = connect(config)?;
    let settings = IndexSettings::from_config(&config.index);
    let response = index.create(&settings).await?;
    println!("index create {}", index.name());
    println!("  model: {}", settings.model);
    println!("  treat urls as images: {}", settings.treat_urls_as_images);
    print_json(&response)?;
    println!("ok");
    Ok(())
}

pub async fn run_delete(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to delete index '{}' without --yes",
            config.index.name
        );
    }
    let index = connect(config)?;
    index.delete().await?;
    println!("index delete {}", index.name());
    println!("ok");
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = connect(config)?;
    print_json(&index.stats().await?)
}

/// Upload the complete documents file written by `signals modifiers`.
pub async fn run_upload(
    config: &Config,
    batch_size_override: Option<usize>,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let batch_size = batch_size_override.unwrap_or(config.index.batch_size);
    if batch_size == 0 {
        bail!("--batch-size must be > 0");
    }

    let index = connect(config)?;
    let reporter = progress.reporter(index.name());

    let mut documents = tables::read_documents(&config.data.complete_data)
        .with_context(|| "Failed to load complete data (run `signals modifiers` first)")?;
    if let Some(lim) = limit {
        documents.truncate(lim);
    }

    let field = MultimodalField::from_config(&config.index);
    let start = std::time::Instant::now();
    let summary =
        index::upload_documents(&index, &documents, &field, batch_size, reporter.as_ref()).await?;

    println!("index upload {}", index.name());
    println!("  documents: {}", summary.documents);
    println!("  batches: {}", summary.batches);
    println!("  failed items: {}", summary.failed);
    println!("  elapsed: {:.2}s", start.elapsed().as_secs_f64());
    println!("ok");
    Ok(())
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let index = connect(config)?;
    print_json(&index.get_document(id).await?)
}

pub async fn run_delete_documents(config: &Config, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        bail!("No document ids given");
    }
    let index = connect(config)?;
    let response = index.delete_documents(ids).await?;
    println!("index delete-docs {}", index.name());
    println!("  requested: {}", ids.len());
    print_json(&response)?;
    println!("ok");
    Ok(())
}

pub async fn run_empty(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to delete every document in '{}' without --yes",
            config.index.name
        );
    }
    let index = connect(config)?;
    let deleted = index::empty_index(&index).await?;
    println!("index empty {}", index.name());
    println!("  deleted: {}", deleted);
    println!("ok");
    Ok(())
}
