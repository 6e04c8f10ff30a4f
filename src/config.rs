use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Locations of the input tables and derived outputs.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub search_log: PathBuf,
    pub product_data: PathBuf,
    #[serde(default = "default_historical_data")]
    pub historical_data: PathBuf,
    #[serde(default = "default_merged_data")]
    pub merged_data: PathBuf,
    #[serde(default = "default_complete_data")]
    pub complete_data: PathBuf,
}

fn default_historical_data() -> PathBuf {
    PathBuf::from("data/historical_data.csv")
}
fn default_merged_data() -> PathBuf {
    PathBuf::from("data/merged_data.csv")
}
fn default_complete_data() -> PathBuf {
    PathBuf::from("data/complete_data.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    /// Name of the environment variable holding the API key. Unset means
    /// the endpoint needs no authentication (e.g. a local container).
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub treat_urls_as_images: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_multimodal_field")]
    pub multimodal_field: String,
    #[serde(default = "default_multimodal_weights")]
    pub multimodal_weights: BTreeMap<String, f64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            name: default_index_name(),
            api_key_env: None,
            model: default_model(),
            treat_urls_as_images: true,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            multimodal_field: default_multimodal_field(),
            multimodal_weights: default_multimodal_weights(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8882".to_string()
}
fn default_index_name() -> String {
    "fashion-search".to_string()
}
fn default_model() -> String {
    "ViT-B/32".to_string()
}
fn default_true() -> bool {
    true
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_multimodal_field() -> String {
    "image_title_multimodal".to_string()
}
fn default_multimodal_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("product_name".to_string(), 0.1),
        ("image_url".to_string(), 0.9),
    ])
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_lexical_attributes")]
    pub lexical_attributes: Vec<String>,
    #[serde(default = "default_attributes_to_retrieve")]
    pub attributes_to_retrieve: Vec<String>,
    /// Hits kept after collapsing image variants of the same item.
    #[serde(default = "default_unique_results")]
    pub unique_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            alpha: default_alpha(),
            rrf_k: default_rrf_k(),
            filter: default_filter(),
            lexical_attributes: default_lexical_attributes(),
            attributes_to_retrieve: default_attributes_to_retrieve(),
            unique_results: default_unique_results(),
        }
    }
}

fn default_limit() -> usize {
    50
}
fn default_alpha() -> f64 {
    0.5
}
fn default_rrf_k() -> u32 {
    60
}
fn default_filter() -> String {
    "in_stock:(true)".to_string()
}
fn default_lexical_attributes() -> Vec<String> {
    vec!["product_name".to_string()]
}
fn default_attributes_to_retrieve() -> Vec<String> {
    vec![
        "product_name".to_string(),
        "image_url".to_string(),
        "cost".to_string(),
    ]
}
fn default_unique_results() -> usize {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;

    // Relative data paths resolve against the config file's directory
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolve_paths(base))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate index
    if config.index.batch_size == 0 {
        bail!("index.batch_size must be > 0");
    }
    if config.index.name.trim().is_empty() {
        bail!("index.name must not be empty");
    }
    if !config.index.endpoint.starts_with("http://") && !config.index.endpoint.starts_with("https://")
    {
        bail!(
            "index.endpoint must be an http(s) URL, got '{}'",
            config.index.endpoint
        );
    }
    if config.index.multimodal_weights.is_empty() {
        bail!("index.multimodal_weights must name at least one field");
    }

    // Validate search
    if config.search.limit < 1 {
        bail!("search.limit must be >= 1");
    }
    if config.search.unique_results < 1 {
        bail!("search.unique_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.search.alpha) {
        bail!("search.alpha must be in [0.0, 1.0]");
    }

    Ok(config)
}

impl Config {
    fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.search_log);
        resolve(&mut self.data.product_data);
        resolve(&mut self.data.historical_data);
        resolve(&mut self.data.merged_data);
        resolve(&mut self.data.complete_data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[data]
search_log = "data/search_log.csv"
product_data = "data/product_data.csv"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.index.endpoint, "http://localhost:8882");
        assert_eq!(config.index.batch_size, 64);
        assert_eq!(config.index.multimodal_weights["image_url"], 0.9);
        assert_eq!(config.search.limit, 50);
        assert_eq!(config.search.filter, "in_stock:(true)");
        assert_eq!(
            config.data.complete_data,
            PathBuf::from("data/complete_data.json")
        );
    }

    #[test]
    fn rejects_alpha_out_of_range() {
        let content = format!("{MINIMAL}\n[search]\nalpha = 1.5\n");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let content = format!("{MINIMAL}\n[index]\nbatch_size = 0\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let content = format!("{MINIMAL}\n[index]\nendpoint = \"localhost:8882\"\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = parse_config(MINIMAL)
            .unwrap()
            .resolve_paths(Path::new("/srv/shop"));
        assert_eq!(
            config.data.search_log,
            PathBuf::from("/srv/shop/data/search_log.csv")
        );
    }
}
