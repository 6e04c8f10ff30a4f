//! Query recipes against the hosted index.
//!
//! Four progressively richer ways to rank the same query:
//!
//! | Recipe | What it adds |
//! |--------|--------------|
//! | `basic` | tensor search with the stock filter |
//! | `hybrid` | lexical + tensor fusion (RRF) over `product_name` |
//! | `exact-boost` | `exact_match_boosters.<key>` added to both channels |
//! | `revenue-boost` | windowed revenue and per-query revenue modifiers on top |
//!
//! `<key>` is [`normalize`] of the query, the same function that keyed the
//! modifier documents at build time.

use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::index::{MarqoIndex, SearchIndex};
use crate::modifiers::EXACT_MATCH_WEIGHT;
use crate::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRecipe {
    Basic,
    Hybrid,
    ExactBoost,
    RevenueBoost,
}

impl SearchRecipe {
    pub const ALL: [SearchRecipe; 4] = [
        SearchRecipe::Basic,
        SearchRecipe::Hybrid,
        SearchRecipe::ExactBoost,
        SearchRecipe::RevenueBoost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchRecipe::Basic => "basic",
            SearchRecipe::Hybrid => "hybrid",
            SearchRecipe::ExactBoost => "exact-boost",
            SearchRecipe::RevenueBoost => "revenue-boost",
        }
    }
}

impl FromStr for SearchRecipe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchRecipe::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown recipe '{}'. Use basic, hybrid, exact-boost, or revenue-boost.",
                    s
                )
            })
    }
}

impl fmt::Display for SearchRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(field, tensor weight, lexical weight)` revenue terms. Fields with a
/// trailing `.` are per-query modifier maps and get the normalized key
/// appended. Tensor scores live on a much smaller scale than lexical ones,
/// hence the separate weights.
const REVENUE_TERMS: [(&str, f64, f64); 6] = [
    ("one_day_revenue", 0.000002, 0.002),
    ("three_day_revenue", 6.6e-7, 0.0006),
    ("five_day_revenue", 4e-7, 0.0004),
    ("one_day_revenue_modifiers.", 0.000005, 1.0),
    ("three_day_revenue_modifiers.", 0.00000166666, 1.0 / 3.0),
    ("five_day_revenue_modifiers.", 0.000001, 0.2),
];

fn score_term(field_name: String, weight: f64) -> Value {
    json!({ "field_name": field_name, "weight": weight })
}

/// Build the `add_to_score` lists for the tensor and lexical channels.
fn score_modifiers(recipe: SearchRecipe, key: &str) -> (Vec<Value>, Vec<Value>) {
    let booster = format!("exact_match_boosters.{}", key);
    let mut tensor = vec![score_term(booster.clone(), EXACT_MATCH_WEIGHT as f64)];
    let mut lexical = vec![score_term(booster, EXACT_MATCH_WEIGHT as f64)];

    if recipe == SearchRecipe::RevenueBoost {
        for (field, tensor_weight, lexical_weight) in REVENUE_TERMS {
            let name = if field.ends_with('.') {
                format!("{}{}", field, key)
            } else {
                field.to_string()
            };
            tensor.push(score_term(name.clone(), tensor_weight));
            lexical.push(score_term(name, lexical_weight));
        }
    }
    (tensor, lexical)
}

/// Build the search request body for `query` under `recipe`.
pub fn build_search_request(query: &str, recipe: SearchRecipe, config: &Config) -> Value {
    let search = &config.search;
    if recipe == SearchRecipe::Basic {
        return json!({
            "q": query,
            "limit": search.limit,
            "filter": search.filter,
        });
    }

    let mut hybrid = json!({
        "alpha": search.alpha,
        "rrfK": search.rrf_k,
        "searchableAttributesLexical": search.lexical_attributes,
    });
    if matches!(recipe, SearchRecipe::ExactBoost | SearchRecipe::RevenueBoost) {
        let (tensor, lexical) = score_modifiers(recipe, &normalize(query));
        hybrid["scoreModifiersTensor"] = json!({ "add_to_score": tensor });
        hybrid["scoreModifiersLexical"] = json!({ "add_to_score": lexical });
    }

    json!({
        "q": query,
        "searchMethod": "HYBRID",
        "limit": search.limit,
        "attributesToRetrieve": search.attributes_to_retrieve,
        "hybridParameters": hybrid,
        "showHighlights": false,
        "filter": search.filter,
    })
}

/// Keep the first hit per item, up to `max` hits.
///
/// Image variants of one item share the id prefix before the first `_`
/// (`71246356_0`, `71246356_1`, ...).
pub fn unique_hits(hits: &[Value], max: usize) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for hit in hits {
        if kept.len() == max {
            break;
        }
        let id = hit.get("_id").and_then(|v| v.as_str()).unwrap_or_default();
        let item = id.split('_').next().unwrap_or(id);
        if seen.insert(item.to_string()) {
            kept.push(hit.clone());
        }
    }
    kept
}

/// Capitalize each whitespace-separated word: first char upper, rest lower.
pub fn capitalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Run a recipe against the configured index and print the results.
pub async fn run_search(
    config: &Config,
    query: &str,
    recipe: SearchRecipe,
    limit: Option<usize>,
    as_json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if limit == Some(0) {
        bail!("--limit must be >= 1");
    }

    let index = MarqoIndex::from_config(&config.index)?;
    let request = build_search_request(query, recipe, config);
    let response = index.search(&request).await?;

    let hits = response
        .get("hits")
        .and_then(|h| h.as_array())
        .cloned()
        .unwrap_or_default();
    let shown = unique_hits(&hits, limit.unwrap_or(config.search.unique_results));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{} results for \"{}\" ({})", shown.len(), query, recipe);
    println!();
    for (i, hit) in shown.iter().enumerate() {
        let name = hit
            .get("product_name")
            .and_then(|v| v.as_str())
            .map(capitalize_title)
            .unwrap_or_else(|| "No Name".to_string());
        let price = match hit.get("cost") {
            Some(Value::Number(n)) => format!("£{}", n),
            Some(Value::String(s)) => format!("£{}", s),
            _ => "N/A".to_string(),
        };
        let score = hit.get("_score").and_then(|v| v.as_f64()).unwrap_or(0.0);
        println!("{:>3}. {:<48} {:>10}  score={:.4}", i + 1, name, price, score);
        if let Some(url) = hit.get("image_url").and_then(|v| v.as_str()) {
            println!("     {}", url);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn config() -> Config {
        parse_config("[data]\nsearch_log = \"a.csv\"\nproduct_data = \"b.csv\"\n").unwrap()
    }

    fn field_names(terms: &Value) -> Vec<String> {
        terms["add_to_score"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["field_name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn basic_request() {
        let req = build_search_request("green dress", SearchRecipe::Basic, &config());
        assert_eq!(
            req,
            json!({"q": "green dress", "limit": 50, "filter": "in_stock:(true)"})
        );
    }

    #[test]
    fn hybrid_request_has_no_modifiers() {
        let req = build_search_request("green dress", SearchRecipe::Hybrid, &config());
        assert_eq!(req["searchMethod"], "HYBRID");
        assert_eq!(req["showHighlights"], false);
        assert_eq!(req["hybridParameters"]["rrfK"], 60);
        assert_eq!(
            req["hybridParameters"]["searchableAttributesLexical"],
            json!(["product_name"])
        );
        assert!(req["hybridParameters"].get("scoreModifiersTensor").is_none());
    }

    #[test]
    fn exact_boost_uses_normalized_query_key() {
        let req = build_search_request("Green Candy Dress!", SearchRecipe::ExactBoost, &config());
        let tensor = &req["hybridParameters"]["scoreModifiersTensor"];
        assert_eq!(
            field_names(tensor),
            vec!["exact_match_boosters.green_candy_dress_"]
        );
        assert_eq!(tensor["add_to_score"][0]["weight"], 1000.0);
    }

    #[test]
    fn revenue_boost_adds_window_terms() {
        let req = build_search_request("red dress", SearchRecipe::RevenueBoost, &config());
        let lexical = &req["hybridParameters"]["scoreModifiersLexical"];
        assert_eq!(
            field_names(lexical),
            vec![
                "exact_match_boosters.red_dress",
                "one_day_revenue",
                "three_day_revenue",
                "five_day_revenue",
                "one_day_revenue_modifiers.red_dress",
                "three_day_revenue_modifiers.red_dress",
                "five_day_revenue_modifiers.red_dress",
            ]
        );
        assert_eq!(lexical["add_to_score"][4]["weight"], 1.0);
        let tensor = &req["hybridParameters"]["scoreModifiersTensor"];
        assert_eq!(tensor["add_to_score"][6]["weight"], 0.000001);
    }

    #[test]
    fn recipe_names_round_trip_through_parse() {
        for recipe in SearchRecipe::ALL {
            assert_eq!(recipe.as_str().parse::<SearchRecipe>(), Ok(recipe));
        }
        assert!("fancy".parse::<SearchRecipe>().is_err());
    }

    #[test]
    fn unique_hits_collapses_variants() {
        let hits: Vec<Value> = ["71_0", "71_1", "72_0", "73_2", "72_5"]
            .iter()
            .map(|id| json!({"_id": id}))
            .collect();
        let kept = unique_hits(&hits, 20);
        let ids: Vec<&str> = kept.iter().map(|h| h["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["71_0", "72_0", "73_2"]);
        assert_eq!(unique_hits(&hits, 2).len(), 2);
    }

    #[test]
    fn capitalize() {
        assert_eq!(capitalize_title("green CANDY  dress"), "Green Candy Dress");
        assert_eq!(capitalize_title(""), "");
    }
}
