//! # Search Signals
//!
//! Ranking-signal pipeline and query recipes for a hosted multimodal
//! (text + image) product search index.
//!
//! Search Signals turns raw interaction logs (clicks, cart adds, purchases)
//! into per-(query, item) revenue statistics, folds them into sparse
//! score-modifier fields on each product document, uploads the documents to
//! the hosted index, and queries it through progressively richer ranking
//! recipes.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ search log │──▶│ aggregate  │──▶│ modifiers  │──▶│ hosted index │
//! │  products  │   │ (q, item)  │   │ per item   │   │ upload/query │
//! └────────────┘   └─────┬──────┘   └────────────┘   └──────────────┘
//!                        ▼
//!                  ┌────────────┐
//!                  │   merge    │
//!                  │ (left join)│
//!                  └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! signals pipeline                     # historical → merged → complete data
//! signals index create
//! signals index upload
//! signals search "green dress" --recipe revenue-boost
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Modifier key normalization |
//! | [`aggregate`] | Search-log aggregation |
//! | [`merge`] | Stats/catalog left join |
//! | [`modifiers`] | Per-item score-modifier documents |
//! | [`tables`] | CSV/JSON inputs and outputs |
//! | [`pipeline`] | Batch stage orchestration |
//! | [`index`] | Hosted index client |
//! | [`recipes`] | Search request recipes |
//! | [`stats`] | Dataset summary |
//! | [`progress`] | Upload progress reporters |
//! | [`display`] | Number formatting |

pub mod aggregate;
pub mod config;
pub mod display;
pub mod error;
pub mod index;
pub mod index_cmd;
pub mod merge;
pub mod models;
pub mod modifiers;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod recipes;
pub mod stats;
pub mod tables;
