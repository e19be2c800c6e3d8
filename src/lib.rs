//! # gedload - conflict-event CSV ingestion and query core
//!
//! gedload turns heterogeneous, often malformed CSV exports of armed-conflict
//! events (UCDP-GED style column set) into a clean, typed, immutable in-memory
//! table, plus the filter and aggregation queries a dashboard layer needs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │  CSV File  │──▶│   Parser   │──▶│  Schema   │──▶│  Coercer   │──▶│ Validator │
//! │ (utf8/lat1)│   │ (raw rows) │   │ (realign) │   │ (typed)    │   │ (admit)   │
//! └────────────┘   └────────────┘   └───────────┘   └────────────┘   └─────┬─────┘
//!                                                                          ▼
//!                                                  filter / aggregate ◀─ Table
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gedload::{load_file, LoadOptions, Filter, GroupKey, Reducer, KeyOrder, aggregate};
//!
//! let table = load_file("conflicts.csv".as_ref(), &LoadOptions::default())?;
//! let view = table.filter(&Filter::new().regions(["Pernambuco"]));
//! for (month, events) in aggregate(&view, GroupKey::Month, Reducer::Count, KeyOrder::FirstSeen) {
//!     println!("{month}\t{events}");
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - fatal error hierarchy
//! - [`models`] - domain models (Record, Table, rejected-rows diagnostic)
//! - [`parser`] - decoding, dialect detection, row tokenization
//! - [`schema`] - header validation and column-shift repair
//! - [`coerce`] - typed field coercion with per-field fallback
//! - [`validation`] - the admission gate
//! - [`query`] - filter views and aggregation
//! - [`pipeline`] - load orchestration and options
//! - [`cache`] - table cache with single-flight builds

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;
pub mod schema;

// Coercion & validation
pub mod coerce;
pub mod validation;

// Queries
pub mod query;

// Orchestration
pub mod pipeline;

// Caching
pub mod cache;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{LoadError, LoadResult, ReadError, SchemaError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    LoadInfo, MonthBucket, Record, RejectReason, RejectedRow, Table, TableSummary,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{detect_delimiter, detect_encoding, Delimiter, TextEncoding};
pub use schema::Schema;

// =============================================================================
// Re-exports - Coercion
// =============================================================================

pub use coerce::{CoercionStats, DateOrder, DecimalSeparator, EstimatePolicy};

// =============================================================================
// Re-exports - Queries
// =============================================================================

pub use query::{aggregate, Filter, GroupKey, GroupValue, KeyOrder, Reducer, TableView};

// =============================================================================
// Re-exports - Pipeline & Cache
// =============================================================================

pub use cache::TableCache;
pub use pipeline::{load_bytes, load_file, LoadOptions, DEFAULT_DROPPABLE_COLUMN};
