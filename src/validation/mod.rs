//! Record validator: the admission gate between candidates and the table.
//!
//! The required-field rule is the sole gate: a candidate is admitted only if
//! its event date and both coordinates survived coercion (plus region, when
//! the configuration requires one). Everything else stays optional. Checks
//! run in a fixed order (date, coordinates, region) so a row missing several
//! required fields always reports the same reason.

use crate::coerce::Candidate;
use crate::models::{Record, RejectReason, RejectedRow};

/// Admit one candidate, or reject it with a reason.
pub fn admit(candidate: Candidate, require_region: bool) -> Result<Record, RejectedRow> {
    let reject = |reason: RejectReason, candidate: &Candidate| RejectedRow {
        line: candidate.source_line,
        reason,
        raw: candidate.raw.clone(),
    };

    let Some(event_date) = candidate.event_date else {
        return Err(reject(RejectReason::MissingDate, &candidate));
    };
    let (Some(latitude), Some(longitude)) = (candidate.latitude, candidate.longitude) else {
        return Err(reject(RejectReason::MissingCoordinates, &candidate));
    };
    if require_region && candidate.region.is_none() {
        return Err(reject(RejectReason::MissingRegion, &candidate));
    }

    Ok(Record {
        event_date,
        latitude,
        longitude,
        best_estimate: candidate.best_estimate,
        region: candidate.region,
        violence_type: candidate.violence_type,
        year: candidate.year,
        source_line: candidate.source_line,
    })
}

/// Partition candidates into admitted records and rejected rows.
pub fn partition<I>(candidates: I, require_region: bool) -> (Vec<Record>, Vec<RejectedRow>)
where
    I: IntoIterator<Item = Candidate>,
{
    let mut admitted = Vec::new();
    let mut rejected = Vec::new();

    for candidate in candidates {
        match admit(candidate, require_region) {
            Ok(record) => admitted.push(record),
            Err(row) => rejected.push(row),
        }
    }

    (admitted, rejected)
}
