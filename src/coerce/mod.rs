//! Field coercer: string fields to typed values, with per-field fallback.
//!
//! Maps an aligned row, under the schema, into a [`Candidate`] whose fields
//! are all optional. Coercion never fails: every unparseable value degrades
//! to absent (or to zero, where the field's configured policy says so) and
//! is counted in [`CoercionStats`]. Whether a candidate is good enough to
//! enter the table is the validator's decision, not this module's.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::parser::RawRow;
use crate::schema::Schema;

/// Well-known source columns for the conflict-event export.
pub const COL_DATE: &str = "date_start";
pub const COL_LATITUDE: &str = "latitude";
pub const COL_LONGITUDE: &str = "longitude";
pub const COL_ESTIMATE: &str = "best_est";
pub const COL_REGION: &str = "adm_1";
pub const COL_VIOLENCE: &str = "type_of_violence";
pub const COL_YEAR: &str = "year";

/// How many non-empty date values the day-first fallback samples.
const DATE_SAMPLE_SIZE: usize = 200;

// =============================================================================
// Conventions
// =============================================================================

/// Decimal separator convention for numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalSeparator {
    #[default]
    Dot,
    Comma,
}

impl DecimalSeparator {
    pub fn as_char(&self) -> char {
        match self {
            DecimalSeparator::Dot => '.',
            DecimalSeparator::Comma => ',',
        }
    }
}

/// Resolution of the day/month ambiguity in slash- and dash-separated dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    pub fn flipped(&self) -> Self {
        match self {
            DateOrder::DayFirst => DateOrder::MonthFirst,
            DateOrder::MonthFirst => DateOrder::DayFirst,
        }
    }
}

impl std::fmt::Display for DateOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateOrder::DayFirst => f.write_str("day-first"),
            DateOrder::MonthFirst => f.write_str("month-first"),
        }
    }
}

/// Policy for an unparseable declared fatality estimate.
///
/// The source variants disagree on this, so it is explicit configuration:
/// `Absent` drops the value, `Zero` reads "declared but unparseable" as a
/// count of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatePolicy {
    #[default]
    Absent,
    Zero,
}

// =============================================================================
// Coercion output
// =============================================================================

/// Counters for field-level degradations during one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoercionStats {
    /// Date fields that did not parse under the resolved order.
    pub dates_failed: usize,
    /// Latitude/longitude fields that did not parse or were out of range.
    pub coordinates_failed: usize,
    /// Fatality estimates that did not parse (counted under either policy).
    pub estimates_failed: usize,
    /// Year fields that did not parse.
    pub years_failed: usize,
}

impl CoercionStats {
    pub fn total(&self) -> usize {
        self.dates_failed + self.coordinates_failed + self.estimates_failed + self.years_failed
    }
}

/// A coerced but not yet admitted row. Every field is optional; the
/// validator decides admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub event_date: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub best_estimate: Option<f64>,
    pub region: Option<String>,
    pub violence_type: Option<String>,
    pub year: Option<i32>,
    pub source_line: u64,
    /// Original line text, carried for the rejected-rows diagnostic.
    pub raw: String,
}

// =============================================================================
// Coercer
// =============================================================================

/// Row-to-candidate coercer for one load.
///
/// Holds the schema's column positions and the resolved conventions, and
/// accumulates [`CoercionStats`] across rows.
pub struct Coercer {
    date_idx: Option<usize>,
    lat_idx: Option<usize>,
    lon_idx: Option<usize>,
    est_idx: Option<usize>,
    region_idx: Option<usize>,
    violence_idx: Option<usize>,
    year_idx: Option<usize>,
    decimal: DecimalSeparator,
    date_order: DateOrder,
    estimate_policy: EstimatePolicy,
    stats: CoercionStats,
}

impl Coercer {
    pub fn new(
        schema: &Schema,
        decimal: DecimalSeparator,
        date_order: DateOrder,
        estimate_policy: EstimatePolicy,
    ) -> Self {
        Self {
            date_idx: schema.index_of(COL_DATE),
            lat_idx: schema.index_of(COL_LATITUDE),
            lon_idx: schema.index_of(COL_LONGITUDE),
            est_idx: schema.index_of(COL_ESTIMATE),
            region_idx: schema.index_of(COL_REGION),
            violence_idx: schema.index_of(COL_VIOLENCE),
            year_idx: schema.index_of(COL_YEAR),
            decimal,
            date_order,
            estimate_policy,
            stats: CoercionStats::default(),
        }
    }

    /// The date order in effect (after any fallback resolution).
    pub fn date_order(&self) -> DateOrder {
        self.date_order
    }

    /// Coerce one aligned row. Never fails; failures become absent fields.
    pub fn coerce(&mut self, row: RawRow) -> Candidate {
        let field = |idx: Option<usize>| idx.and_then(|i| row.fields.get(i)).map(String::as_str);

        let event_date = match field(self.date_idx) {
            Some(s) if !s.trim().is_empty() => {
                let parsed = parse_date(s, self.date_order);
                if parsed.is_none() {
                    self.stats.dates_failed += 1;
                }
                parsed
            }
            _ => None,
        };

        let latitude = self.coerce_coordinate(field(self.lat_idx), 90.0);
        let longitude = self.coerce_coordinate(field(self.lon_idx), 180.0);

        let best_estimate = match field(self.est_idx) {
            Some(s) if !s.trim().is_empty() => match parse_number(s, self.decimal) {
                Some(v) => Some(v),
                None => {
                    self.stats.estimates_failed += 1;
                    match self.estimate_policy {
                        EstimatePolicy::Absent => None,
                        EstimatePolicy::Zero => Some(0.0),
                    }
                }
            },
            _ => None,
        };

        let year = match field(self.year_idx) {
            Some(s) if !s.trim().is_empty() => match s.trim().parse::<i32>() {
                Ok(y) => Some(y),
                Err(_) => {
                    self.stats.years_failed += 1;
                    None
                }
            },
            _ => None,
        };

        let region = field(self.region_idx).and_then(non_empty);
        let violence_type = field(self.violence_idx).and_then(non_empty);

        Candidate {
            event_date,
            latitude,
            longitude,
            best_estimate,
            region,
            violence_type,
            year,
            source_line: row.line,
            raw: row.raw,
        }
    }

    /// Parse a coordinate; values outside `[-limit, limit]` are absent too.
    fn coerce_coordinate(&mut self, value: Option<&str>, limit: f64) -> Option<f64> {
        let s = value?;
        if s.trim().is_empty() {
            return None;
        }
        match parse_number(s, self.decimal) {
            Some(v) if v.abs() <= limit => Some(v),
            _ => {
                self.stats.coordinates_failed += 1;
                None
            }
        }
    }

    pub fn into_stats(self) -> CoercionStats {
        self.stats
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Scalar parsers
// =============================================================================

/// Parse a date under the given day/month order.
///
/// ISO forms (`2021-05-03`, `2021/05/03`, with or without a time-of-day
/// suffix) are unambiguous and parse under either order. Slash, dash, and
/// dot forms with a trailing year follow the order.
pub fn parse_date(s: &str, order: DateOrder) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    let ambiguous: [&str; 3] = match order {
        DateOrder::DayFirst => ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"],
        DateOrder::MonthFirst => ["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y"],
    };
    for fmt in ambiguous {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    None
}

/// Resolve the date order for a whole column.
///
/// Samples up to [`DATE_SAMPLE_SIZE`] non-empty values. If the configured
/// order parses none of them, the opposite order is tried exactly once and
/// whichever interpretation parsed more non-null values wins.
pub fn resolve_date_order<'a, I>(samples: I, configured: DateOrder) -> DateOrder
where
    I: IntoIterator<Item = &'a str>,
{
    let sample: Vec<&str> = samples
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(DATE_SAMPLE_SIZE)
        .collect();

    if sample.is_empty() {
        return configured;
    }

    let primary = sample
        .iter()
        .filter(|s| parse_date(s, configured).is_some())
        .count();
    if primary > 0 {
        return configured;
    }

    let alternate = sample
        .iter()
        .filter(|s| parse_date(s, configured.flipped()).is_some())
        .count();
    if alternate > primary {
        configured.flipped()
    } else {
        configured
    }
}

/// Parse a float under the given decimal separator convention.
///
/// Leading/trailing whitespace is stripped. Under the comma convention the
/// comma is mapped to a dot before parsing; a value carrying the wrong
/// separator for the configured convention does not parse.
pub fn parse_number(s: &str, decimal: DecimalSeparator) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match decimal {
        DecimalSeparator::Dot => s.parse().ok(),
        DecimalSeparator::Comma => {
            if s.contains('.') {
                return None;
            }
            s.replace(',', ".").parse().ok()
        }
    }
}
