//! Domain models for the gedload ingestion pipeline.
//!
//! This module contains the core data structures shared across stages:
//!
//! - [`Record`] - one admitted, normalized conflict-event observation
//! - [`MonthBucket`] - a date truncated to year-month granularity
//! - [`RejectReason`] / [`RejectedRow`] - the rejected-rows diagnostic
//! - [`LoadInfo`] - resolved conventions and row accounting for one load
//! - [`Table`] - the immutable collection of admitted records
//! - [`TableSummary`] - the headline numbers over a table or view

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::coerce::{CoercionStats, DateOrder, DecimalSeparator};
use crate::parser::{Delimiter, TextEncoding};

// =============================================================================
// Record
// =============================================================================

/// One normalized conflict-event observation.
///
/// Date and coordinates are non-optional by construction: a `Record` only
/// exists once the admission gate has verified them. Everything else stays
/// optional, and consumers must handle absence explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Event start date.
    pub event_date: NaiveDate,
    /// Latitude, in [-90, 90].
    pub latitude: f64,
    /// Longitude, in [-180, 180].
    pub longitude: f64,
    /// Estimated fatality count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_estimate: Option<f64>,
    /// Administrative unit (state).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Violence-type category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violence_type: Option<String>,
    /// Ordinal year used for filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// 1-based line number in the source file, for diagnostics.
    pub source_line: u64,
}

impl Record {
    /// The event date truncated to month granularity.
    pub fn month_bucket(&self) -> MonthBucket {
        MonthBucket::from_date(self.event_date)
    }
}

// =============================================================================
// Month Bucket
// =============================================================================

/// A date truncated to year-month granularity, used as a grouping key.
///
/// Ordering is chronological.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
}

impl MonthBucket {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl std::fmt::Display for MonthBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Rejected Rows
// =============================================================================

/// Why a body row did not make it into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The line could not be tokenized (broken quoting).
    MalformedLine,
    /// Field count differs from the header in a non-repairable way.
    FieldCountMismatch,
    /// Required event date absent after coercion.
    MissingDate,
    /// Required latitude/longitude absent after coercion.
    MissingCoordinates,
    /// Region absent while the configuration requires it.
    MissingRegion,
}

impl RejectReason {
    /// Stable snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedLine => "malformed_line",
            RejectReason::FieldCountMismatch => "field_count_mismatch",
            RejectReason::MissingDate => "missing_date",
            RejectReason::MissingCoordinates => "missing_coordinates",
            RejectReason::MissingRegion => "missing_region",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rejected body row: where it was, why, and what it said.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    /// 1-based line number in the source file.
    pub line: u64,
    pub reason: RejectReason,
    /// Original line text.
    pub raw: String,
}

// =============================================================================
// Load Info
// =============================================================================

/// Resolved conventions and row accounting for one load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadInfo {
    pub encoding: TextEncoding,
    pub delimiter: Delimiter,
    pub decimal_separator: DecimalSeparator,
    /// Date order actually used, after the one-shot fallback resolution.
    pub date_order: DateOrder,
    /// Trimmed header names, in order.
    pub headers: Vec<String>,
    /// Body rows seen (admitted + rejected).
    pub rows_seen: usize,
}

// =============================================================================
// Table
// =============================================================================

/// The immutable, validated collection of admitted records for one load.
///
/// Filtering and aggregation produce derived views; nothing mutates a built
/// table. The accounting invariant holds by construction:
/// `records.len() + rejected.len() == info.rows_seen`.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    records: Vec<Record>,
    rejected: Vec<RejectedRow>,
    info: LoadInfo,
    stats: CoercionStats,
}

impl Table {
    /// Assemble a table. Rejected rows are ordered by source line so
    /// diagnostics read in file order regardless of which stage rejected.
    pub(crate) fn new(
        records: Vec<Record>,
        mut rejected: Vec<RejectedRow>,
        info: LoadInfo,
        stats: CoercionStats,
    ) -> Self {
        rejected.sort_by_key(|r| r.line);
        Self {
            records,
            rejected,
            info,
            stats,
        }
    }

    /// Admitted records, in source order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Rejected-rows diagnostic, in source order.
    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn info(&self) -> &LoadInfo {
        &self.info
    }

    pub fn stats(&self) -> &CoercionStats {
        &self.stats
    }

    /// Number of admitted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Headline numbers over the whole table.
    pub fn summary(&self) -> TableSummary {
        TableSummary::compute(self.records.iter())
    }
}

// =============================================================================
// Table Summary
// =============================================================================

/// The headline numbers every dashboard variant recomputed: event count,
/// total fatalities, distinct regions, covered date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub events: usize,
    /// Sum of the fatality estimates that are present.
    pub total_fatalities: f64,
    /// Number of distinct regions among records that carry one.
    pub regions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<NaiveDate>,
}

impl TableSummary {
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: Iterator<Item = &'a Record>,
    {
        let mut events = 0;
        let mut total_fatalities = 0.0;
        let mut regions = std::collections::HashSet::new();
        let mut first_date: Option<NaiveDate> = None;
        let mut last_date: Option<NaiveDate> = None;

        for record in records {
            events += 1;
            if let Some(est) = record.best_estimate {
                total_fatalities += est;
            }
            if let Some(ref region) = record.region {
                regions.insert(region.as_str());
            }
            first_date = Some(first_date.map_or(record.event_date, |d| d.min(record.event_date)));
            last_date = Some(last_date.map_or(record.event_date, |d| d.max(record.event_date)));
        }

        Self {
            events,
            total_fatalities,
            regions: regions.len(),
            first_date,
            last_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: (i32, u32, u32), region: Option<&str>, est: Option<f64>) -> Record {
        Record {
            event_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            latitude: -8.05,
            longitude: -34.9,
            best_estimate: est,
            region: region.map(String::from),
            violence_type: None,
            year: Some(date.0),
            source_line: 2,
        }
    }

    #[test]
    fn test_month_bucket_ordering_and_display() {
        let a = MonthBucket { year: 2020, month: 12 };
        let b = MonthBucket { year: 2021, month: 1 };
        assert!(a < b);
        assert_eq!(b.to_string(), "2021-01");
    }

    #[test]
    fn test_month_bucket_from_record() {
        let r = record((2021, 5, 3), None, None);
        assert_eq!(r.month_bucket(), MonthBucket { year: 2021, month: 5 });
    }

    #[test]
    fn test_reject_reason_wire_names() {
        assert_eq!(RejectReason::MalformedLine.as_str(), "malformed_line");
        assert_eq!(RejectReason::FieldCountMismatch.as_str(), "field_count_mismatch");
        assert_eq!(RejectReason::MissingCoordinates.as_str(), "missing_coordinates");

        let json = serde_json::to_string(&RejectReason::MissingDate).unwrap();
        assert_eq!(json, "\"missing_date\"");
    }

    #[test]
    fn test_rejected_rows_sorted_by_line() {
        let info = LoadInfo {
            encoding: TextEncoding::Utf8,
            delimiter: Delimiter::Comma,
            decimal_separator: DecimalSeparator::Dot,
            date_order: DateOrder::DayFirst,
            headers: vec!["date_start".into()],
            rows_seen: 3,
        };
        let rejected = vec![
            RejectedRow { line: 9, reason: RejectReason::MissingDate, raw: "x".into() },
            RejectedRow { line: 4, reason: RejectReason::MalformedLine, raw: "y".into() },
            RejectedRow { line: 7, reason: RejectReason::FieldCountMismatch, raw: "z".into() },
        ];
        let table = Table::new(vec![], rejected, info, CoercionStats::default());
        let lines: Vec<u64> = table.rejected().iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![4, 7, 9]);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            record((2021, 5, 3), Some("Pernambuco"), Some(3.0)),
            record((2020, 1, 15), Some("Bahia"), None),
            record((2021, 7, 1), Some("Pernambuco"), Some(2.0)),
        ];
        let summary = TableSummary::compute(records.iter());

        assert_eq!(summary.events, 3);
        assert_eq!(summary.total_fatalities, 5.0);
        assert_eq!(summary.regions, 2);
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2020, 1, 15));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2021, 7, 1));
    }

    #[test]
    fn test_summary_empty() {
        let records: Vec<Record> = vec![];
        let summary = TableSummary::compute(records.iter());
        assert_eq!(summary.events, 0);
        assert_eq!(summary.total_fatalities, 0.0);
        assert_eq!(summary.first_date, None);
    }

    #[test]
    fn test_record_serialization_omits_absent_fields() {
        let r = record((2021, 5, 3), None, None);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("event_date"));
        assert!(!json.contains("best_estimate"));
        assert!(!json.contains("region"));
    }
}
