//! High-level load pipeline: bytes in, immutable [`Table`] out.
//!
//! Runs the stages strictly in sequence — read, normalize, coerce, validate —
//! and either returns a complete table or a single fatal [`LoadError`].
//! Partial tables are never published: row- and field-level problems
//! accumulate into the table's diagnostics instead of aborting the load.
//!
//! # Example
//!
//! ```rust,ignore
//! use gedload::{load_file, LoadOptions};
//!
//! let table = load_file("brazil_conflicts_dataset.csv".as_ref(), &LoadOptions::default())?;
//! println!("{} events, {} rejected", table.len(), table.rejected().len());
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coerce::{
    self, Coercer, DateOrder, DecimalSeparator, EstimatePolicy, COL_DATE,
};
use crate::error::{LoadResult, ReadError, SchemaError};
use crate::models::{LoadInfo, RejectReason, RejectedRow, Table};
use crate::parser::{self, Delimiter, RowEvent, TextEncoding};
use crate::schema::Schema;
use crate::validation;

/// The column whose delimiter the known-broken exports drop when empty.
pub const DEFAULT_DROPPABLE_COLUMN: &str = "where_coordinates";

// =============================================================================
// Options
// =============================================================================

/// Configuration for one load.
///
/// Everything is explicit: the pipeline never auto-detects a dialect or an
/// encoding on its own. Callers who want detection run the one-shot helpers
/// in [`crate::parser`] first and feed the result in here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadOptions {
    pub delimiter: Delimiter,
    pub decimal_separator: DecimalSeparator,
    pub encoding: TextEncoding,
    /// Resolve day/month-ambiguous dates as day-first.
    pub day_first: bool,
    /// Column whose dropped delimiter the shift repair compensates for.
    pub droppable_column: Option<String>,
    /// Reject records without a region.
    pub require_region: bool,
    /// Policy for a declared-but-unparseable fatality estimate.
    pub estimate_policy: EstimatePolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            decimal_separator: DecimalSeparator::Dot,
            encoding: TextEncoding::Utf8,
            day_first: false,
            droppable_column: Some(DEFAULT_DROPPABLE_COLUMN.to_string()),
            require_region: false,
            estimate_policy: EstimatePolicy::Absent,
        }
    }
}

impl LoadOptions {
    fn configured_date_order(&self) -> DateOrder {
        if self.day_first {
            DateOrder::DayFirst
        } else {
            DateOrder::MonthFirst
        }
    }
}

// =============================================================================
// Load
// =============================================================================

/// Load a conflict-event CSV file into a table.
pub fn load_file(path: &Path, options: &LoadOptions) -> LoadResult<Table> {
    info!(path = %path.display(), "loading file");
    let bytes = std::fs::read(path).map_err(ReadError::from)?;
    load_bytes(&bytes, options)
}

/// Load conflict-event CSV bytes into a table.
///
/// Stages run strictly in sequence; no stage sees rows past the end of the
/// previous stage's output. Returns a complete table or the first fatal
/// error, never both.
pub fn load_bytes(bytes: &[u8], options: &LoadOptions) -> LoadResult<Table> {
    let content = parser::decode(bytes, options.encoding)?;
    let mut events = parser::read_rows(&content, options.delimiter);

    // Header first. A missing or unparseable header is fatal.
    let header = match events.next() {
        None => return Err(SchemaError::EmptyInput.into()),
        Some(RowEvent::Malformed { message, .. }) => {
            return Err(SchemaError::Header(message).into())
        }
        Some(RowEvent::Row(row)) => row,
    };
    let schema = Schema::from_header(&header, options.droppable_column.as_deref())?;
    debug!(columns = schema.len(), "schema built");

    // Tokenize and realign the body.
    let mut rejected: Vec<RejectedRow> = Vec::new();
    let mut aligned = Vec::new();
    for event in events {
        match event {
            RowEvent::Row(row) => match schema.align(row) {
                Ok(row) => aligned.push(row),
                Err(reject) => rejected.push(reject),
            },
            RowEvent::Malformed { line, raw, message } => {
                debug!(line, %message, "malformed line skipped");
                rejected.push(RejectedRow {
                    line,
                    reason: RejectReason::MalformedLine,
                    raw,
                });
            }
        }
    }
    let rows_seen = aligned.len() + rejected.len();
    info!(rows_seen, "body read");

    // Resolve the date order once for the whole column, then coerce.
    let configured = options.configured_date_order();
    let date_order = match schema.index_of(COL_DATE) {
        Some(idx) => coerce::resolve_date_order(
            aligned
                .iter()
                .filter_map(|row| row.fields.get(idx))
                .map(String::as_str),
            configured,
        ),
        None => configured,
    };
    if date_order != configured {
        info!(%date_order, "date order fallback engaged for this column");
    }

    let mut coercer = Coercer::new(
        &schema,
        options.decimal_separator,
        date_order,
        options.estimate_policy,
    );
    let candidates: Vec<_> = aligned.into_iter().map(|row| coercer.coerce(row)).collect();
    let stats = coercer.into_stats();
    if stats.total() > 0 {
        debug!(
            dates = stats.dates_failed,
            coordinates = stats.coordinates_failed,
            estimates = stats.estimates_failed,
            years = stats.years_failed,
            "field values degraded to absent"
        );
    }

    // Admission gate.
    let (records, invalid) = validation::partition(candidates, options.require_region);
    rejected.extend(invalid);

    if !rejected.is_empty() {
        let mut by_reason: HashMap<&'static str, usize> = HashMap::new();
        for row in &rejected {
            *by_reason.entry(row.reason.as_str()).or_default() += 1;
        }
        for (reason, count) in by_reason {
            warn!(reason, count, "rows rejected");
        }
    }
    info!(admitted = records.len(), rejected = rejected.len(), "load complete");

    let load_info = LoadInfo {
        encoding: options.encoding,
        delimiter: options.delimiter,
        decimal_separator: options.decimal_separator,
        date_order,
        headers: schema.columns().to_vec(),
        rows_seen,
    };
    Ok(Table::new(records, rejected, load_info, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use chrono::NaiveDate;
    use std::io::Write;

    fn load(csv: &str, options: &LoadOptions) -> Table {
        load_bytes(csv.as_bytes(), options).unwrap()
    }

    #[test]
    fn test_well_formed_row_round_trip() {
        let table = load(
            "date_start,latitude,longitude,best_est\n2021-05-03,-8.05,-34.9,3\n",
            &LoadOptions::default(),
        );

        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.event_date, NaiveDate::from_ymd_opt(2021, 5, 3).unwrap());
        assert_eq!(record.latitude, -8.05);
        assert_eq!(record.longitude, -34.9);
        assert_eq!(record.best_estimate, Some(3.0));
        assert_eq!(record.source_line, 2);
    }

    #[test]
    fn test_accounting_invariant() {
        // 6 body rows: 2 good, 1 malformed, 1 short by two, 1 missing date,
        // 1 unparseable latitude.
        let csv = "\
date_start,latitude,longitude
2021-05-03,-8.05,-34.9
\"broken,-8.0,-34.0
2021-05-04
,-8.05,-34.9
2021-05-05,N/A,-34.9
2021-05-06,-8.1,-34.8
";
        let table = load(csv, &LoadOptions { droppable_column: None, ..Default::default() });

        assert_eq!(table.len() + table.rejected().len(), table.info().rows_seen);
        assert_eq!(table.info().rows_seen, 6);
        assert_eq!(table.len(), 2);

        let reasons: Vec<_> = table.rejected().iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::MalformedLine,
                RejectReason::FieldCountMismatch,
                RejectReason::MissingDate,
                RejectReason::MissingCoordinates,
            ]
        );
    }

    #[test]
    fn test_rejected_rows_carry_raw_content() {
        let csv = "date_start,latitude,longitude\n2021-05-05,N/A,-34.9\n";
        let table = load(csv, &LoadOptions::default());
        assert_eq!(table.rejected()[0].raw, "2021-05-05,N/A,-34.9");
        assert_eq!(table.rejected()[0].line, 2);
    }

    #[test]
    fn test_semicolon_comma_decimal_dialect() {
        let options = LoadOptions {
            delimiter: Delimiter::Semicolon,
            decimal_separator: DecimalSeparator::Comma,
            ..Default::default()
        };
        let table = load(
            "date_start;latitude;longitude;best_est\n2021-05-03;-8,05;-34,9;3\n",
            &options,
        );

        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].latitude, -8.05);
        assert_eq!(table.records()[0].longitude, -34.9);
    }

    #[test]
    fn test_column_shift_repair_end_to_end() {
        // `where_coordinates` at position 4 of 6; the short row lost its
        // delimiter there.
        let csv = "\
date_start,latitude,longitude,where_coordinates,adm_1,best_est
2021-05-03,-8.05,-34.9,point,Pernambuco,3
2021-05-04,-8.10,-34.8,Bahia,2
";
        let table = load(csv, &LoadOptions::default());

        assert_eq!(table.len(), 2);
        let repaired = &table.records()[1];
        assert_eq!(repaired.region.as_deref(), Some("Bahia"));
        assert_eq!(repaired.best_estimate, Some(2.0));
    }

    #[test]
    fn test_date_fallback_selects_alternate_order() {
        // Day-first parses none of these; month-first parses all.
        let csv = "\
date_start,latitude,longitude
01/31/2021,-8.05,-34.9
02/28/2021,-8.05,-34.9
";
        let options = LoadOptions { day_first: true, ..Default::default() };
        let table = load(csv, &options);

        assert_eq!(table.info().date_order, DateOrder::MonthFirst);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.records()[0].event_date,
            NaiveDate::from_ymd_opt(2021, 1, 31).unwrap()
        );
    }

    #[test]
    fn test_require_region() {
        let csv = "date_start,latitude,longitude,adm_1\n2021-05-03,-8.05,-34.9,\n";
        let lax = load(csv, &LoadOptions::default());
        assert_eq!(lax.len(), 1);

        let strict = load(csv, &LoadOptions { require_region: true, ..Default::default() });
        assert_eq!(strict.len(), 0);
        assert_eq!(strict.rejected()[0].reason, RejectReason::MissingRegion);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let err = load_bytes(b"", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Schema(SchemaError::EmptyInput)));
    }

    #[test]
    fn test_duplicate_header_is_fatal() {
        let err = load_bytes(
            b"date_start,latitude, latitude\n",
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Schema(SchemaError::DuplicateColumn(name)) if name == "latitude"
        ));
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        let err = load_bytes(b"date_start\n\xff\xfe\n", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Read(ReadError::Decode { .. })));
    }

    #[test]
    fn test_header_only_gives_empty_table() {
        let table = load("date_start,latitude,longitude\n", &LoadOptions::default());
        assert!(table.is_empty());
        assert_eq!(table.info().rows_seen, 0);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "date_start,latitude,longitude\n2021-05-03,-8.05,-34.9\n").unwrap();

        let table = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_file_is_fatal_read_error() {
        let err = load_file(Path::new("/definitely/not/here.csv"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Read(ReadError::Io(_))));
    }
}
