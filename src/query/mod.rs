//! Filtering and aggregation over a built table.
//!
//! Both are pure: a [`TableView`] borrows records from its table and
//! re-filtering or aggregating never touches the base data. Filter criteria
//! combine via logical AND. Aggregation orders month keys chronologically
//! and categorical keys by first appearance unless a stable key sort is
//! explicitly requested.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{MonthBucket, Record, Table, TableSummary};

// =============================================================================
// Filter
// =============================================================================

/// AND-composed filter criteria over record fields.
///
/// An unset criterion matches everything. Records whose field is absent
/// never match a set criterion; absence is not treated as a wildcard.
///
/// # Example
/// ```ignore
/// let filter = Filter::new()
///     .regions(["Pernambuco", "Bahia"])
///     .year(2021);
/// let view = table.filter(&filter);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    regions: Option<HashSet<String>>,
    year: Option<i32>,
    violence_types: Option<HashSet<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep records whose region is one of the given values.
    pub fn regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    /// Keep records from the given year.
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Keep records whose violence type is one of the given values.
    pub fn violence_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.violence_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// True when every set criterion matches.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ref regions) = self.regions {
            match record.region {
                Some(ref r) if regions.contains(r) => {}
                _ => return false,
            }
        }
        if let Some(year) = self.year {
            if record.year != Some(year) {
                return false;
            }
        }
        if let Some(ref types) = self.violence_types {
            match record.violence_type {
                Some(ref t) if types.contains(t) => {}
                _ => return false,
            }
        }
        true
    }
}

// =============================================================================
// Table View
// =============================================================================

/// A borrowed, re-filterable selection of a table's records.
///
/// Views are cheap; they hold references into the immutable table.
#[derive(Debug, Clone)]
pub struct TableView<'a> {
    records: Vec<&'a Record>,
}

impl<'a> TableView<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.records.iter().copied()
    }

    /// Narrow the view further; composes by AND with previous filters.
    pub fn filter(&self, filter: &Filter) -> TableView<'a> {
        TableView {
            records: self
                .records
                .iter()
                .copied()
                .filter(|r| filter.matches(r))
                .collect(),
        }
    }

    /// Narrow with an arbitrary predicate, for criteria the caller resolved
    /// elsewhere.
    pub fn filter_with<P>(&self, predicate: P) -> TableView<'a>
    where
        P: Fn(&Record) -> bool,
    {
        TableView {
            records: self
                .records
                .iter()
                .copied()
                .filter(|r| predicate(r))
                .collect(),
        }
    }

    /// Headline numbers over the view.
    pub fn summary(&self) -> TableSummary {
        TableSummary::compute(self.records.iter().copied())
    }
}

impl Table {
    /// A view over every admitted record.
    pub fn view(&self) -> TableView<'_> {
        TableView {
            records: self.records().iter().collect(),
        }
    }

    /// Filtered view; pure, the table itself is untouched.
    pub fn filter(&self, filter: &Filter) -> TableView<'_> {
        self.view().filter(filter)
    }

    /// Predicate-filtered view.
    pub fn filter_with<P>(&self, predicate: P) -> TableView<'_>
    where
        P: Fn(&Record) -> bool,
    {
        self.view().filter_with(predicate)
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Grouping dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Month,
    Region,
    ViolenceType,
    Year,
}

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Number of records in the group.
    Count,
    /// Sum of the fatality estimates present in the group.
    FatalitySum,
}

/// Ordering of categorical group keys in the result.
///
/// Month keys are always chronological regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    #[default]
    FirstSeen,
    Sorted,
}

/// A group key value in an aggregation result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum GroupValue {
    Month(MonthBucket),
    Year(i32),
    Text(String),
}

impl std::fmt::Display for GroupValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupValue::Month(m) => write!(f, "{}", m),
            GroupValue::Year(y) => write!(f, "{}", y),
            GroupValue::Text(t) => f.write_str(t),
        }
    }
}

/// Group the view's records by a dimension and reduce each group.
///
/// Records whose grouping dimension is absent are omitted; absence is never
/// silently bucketed under a default. An empty view yields an empty vector.
pub fn aggregate(
    view: &TableView<'_>,
    key: GroupKey,
    reducer: Reducer,
    order: KeyOrder,
) -> Vec<(GroupValue, f64)> {
    match key {
        GroupKey::Month => {
            // BTreeMap keeps month buckets chronological.
            let mut groups: BTreeMap<MonthBucket, f64> = BTreeMap::new();
            for record in view.iter() {
                *groups.entry(record.month_bucket()).or_default() +=
                    contribution(record, reducer);
            }
            groups
                .into_iter()
                .map(|(k, v)| (GroupValue::Month(k), v))
                .collect()
        }
        GroupKey::Year => categorical(view, reducer, order, |r| r.year.map(GroupValue::Year)),
        GroupKey::Region => categorical(view, reducer, order, |r| {
            r.region.clone().map(GroupValue::Text)
        }),
        GroupKey::ViolenceType => categorical(view, reducer, order, |r| {
            r.violence_type.clone().map(GroupValue::Text)
        }),
    }
}

fn contribution(record: &Record, reducer: Reducer) -> f64 {
    match reducer {
        Reducer::Count => 1.0,
        Reducer::FatalitySum => record.best_estimate.unwrap_or(0.0),
    }
}

/// Accumulate categorical groups, preserving first-seen key order; a stable
/// sort by key is applied only on request.
fn categorical<F>(
    view: &TableView<'_>,
    reducer: Reducer,
    order: KeyOrder,
    key_of: F,
) -> Vec<(GroupValue, f64)>
where
    F: Fn(&Record) -> Option<GroupValue>,
{
    let mut totals: HashMap<GroupValue, f64> = HashMap::new();
    let mut seen: Vec<GroupValue> = Vec::new();

    for record in view.iter() {
        let Some(key) = key_of(record) else { continue };
        if !totals.contains_key(&key) {
            seen.push(key.clone());
        }
        *totals.entry(key).or_default() += contribution(record, reducer);
    }

    if order == KeyOrder::Sorted {
        seen.sort();
    }

    seen.into_iter()
        .map(|key| {
            let value = totals[&key];
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{CoercionStats, DateOrder, DecimalSeparator};
    use crate::models::{LoadInfo, RejectedRow, Table};
    use crate::parser::{Delimiter, TextEncoding};
    use chrono::NaiveDate;

    fn record(
        date: (i32, u32, u32),
        region: Option<&str>,
        violence: Option<&str>,
        est: Option<f64>,
    ) -> Record {
        Record {
            event_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            latitude: -8.0,
            longitude: -35.0,
            best_estimate: est,
            region: region.map(String::from),
            violence_type: violence.map(String::from),
            year: Some(date.0),
            source_line: 2,
        }
    }

    fn table(records: Vec<Record>) -> Table {
        let rows_seen = records.len();
        Table::new(
            records,
            Vec::<RejectedRow>::new(),
            LoadInfo {
                encoding: TextEncoding::Utf8,
                delimiter: Delimiter::Comma,
                decimal_separator: DecimalSeparator::Dot,
                date_order: DateOrder::DayFirst,
                headers: vec![],
                rows_seen,
            },
            CoercionStats::default(),
        )
    }

    #[test]
    fn test_filter_criteria_combine_with_and() {
        let t = table(vec![
            record((2021, 5, 3), Some("Pernambuco"), Some("1"), None),
            record((2021, 6, 1), Some("Bahia"), Some("1"), None),
            record((2020, 5, 3), Some("Pernambuco"), Some("2"), None),
        ]);

        let filter = Filter::new().regions(["Pernambuco"]).year(2021);
        let view = t.filter(&filter);
        assert_eq!(view.len(), 1);

        // Composing a further filter narrows, never widens.
        let narrowed = view.filter(&Filter::new().violence_types(["2"]));
        assert!(narrowed.is_empty());
    }

    #[test]
    fn test_absent_field_never_matches_set_criterion() {
        let t = table(vec![record((2021, 5, 3), None, None, None)]);
        assert!(t.filter(&Filter::new().regions(["Pernambuco"])).is_empty());
    }

    #[test]
    fn test_filter_is_pure() {
        let t = table(vec![
            record((2021, 5, 3), Some("Pernambuco"), None, None),
            record((2021, 6, 1), Some("Bahia"), None, None),
        ]);
        let _ = t.filter(&Filter::new().regions(["Bahia"]));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_filter_with_closure() {
        let t = table(vec![
            record((2021, 5, 3), None, None, Some(10.0)),
            record((2021, 6, 1), None, None, Some(1.0)),
        ]);
        let view = t.filter_with(|r| r.best_estimate.unwrap_or(0.0) > 5.0);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_aggregate_by_month_is_chronological() {
        let t = table(vec![
            record((2021, 6, 1), None, None, None),
            record((2020, 12, 5), None, None, None),
            record((2021, 6, 20), None, None, None),
            record((2021, 1, 2), None, None, None),
        ]);

        let rows = aggregate(&t.view(), GroupKey::Month, Reducer::Count, KeyOrder::FirstSeen);
        let keys: Vec<String> = rows.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["2020-12", "2021-01", "2021-06"]);
        assert_eq!(rows[2].1, 2.0);
    }

    #[test]
    fn test_aggregate_fatality_sum_skips_absent() {
        let t = table(vec![
            record((2021, 5, 3), Some("Pernambuco"), None, Some(3.0)),
            record((2021, 5, 9), Some("Pernambuco"), None, None),
            record((2021, 5, 9), Some("Bahia"), None, Some(2.0)),
        ]);

        let rows = aggregate(&t.view(), GroupKey::Region, Reducer::FatalitySum, KeyOrder::FirstSeen);
        assert_eq!(rows[0], (GroupValue::Text("Pernambuco".into()), 3.0));
        assert_eq!(rows[1], (GroupValue::Text("Bahia".into()), 2.0));
    }

    #[test]
    fn test_categorical_first_seen_vs_sorted() {
        let t = table(vec![
            record((2021, 5, 3), Some("Rio Grande do Sul"), None, None),
            record((2021, 5, 4), Some("Bahia"), None, None),
            record((2021, 5, 5), Some("Rio Grande do Sul"), None, None),
        ]);

        let first_seen =
            aggregate(&t.view(), GroupKey::Region, Reducer::Count, KeyOrder::FirstSeen);
        let keys: Vec<String> = first_seen.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["Rio Grande do Sul", "Bahia"]);

        let sorted = aggregate(&t.view(), GroupKey::Region, Reducer::Count, KeyOrder::Sorted);
        let keys: Vec<String> = sorted.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["Bahia", "Rio Grande do Sul"]);
    }

    #[test]
    fn test_absent_dimension_rows_omitted() {
        let t = table(vec![
            record((2021, 5, 3), Some("Bahia"), None, None),
            record((2021, 5, 4), None, None, None),
        ]);
        let rows = aggregate(&t.view(), GroupKey::Region, Reducer::Count, KeyOrder::FirstSeen);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 1.0);
    }

    #[test]
    fn test_empty_table_aggregates_to_empty() {
        let t = table(vec![]);
        let rows = aggregate(&t.view(), GroupKey::Month, Reducer::Count, KeyOrder::FirstSeen);
        assert!(rows.is_empty());
    }
}
