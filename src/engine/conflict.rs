use chrono::Datelike;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.start().year() < MIN_VALID_YEAR || range.end().year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("date out of valid range"));
    }
    if range.nights() > MAX_RANGE_NIGHTS {
        return Err(EngineError::LimitExceeded("range too wide"));
    }
    Ok(())
}

/// Collect EVERY occupied entry overlapping `range` — callers report the
/// full conflict list, not just the first hit. `excluding` drops one
/// booking id from the occupied set (re-validating an existing pending
/// booking, e.g. during payment confirmation).
pub(crate) fn conflicts_in(
    item: &ItemState,
    range: &DateRange,
    excluding: Option<Ulid>,
) -> Vec<ConflictingEntry> {
    item.overlapping(range)
        .filter(|e| e.occupies())
        .filter(|e| Some(e.id) != excluding)
        .map(|e| ConflictingEntry {
            id: e.id,
            range: e.range,
            source: match &e.kind {
                EntryKind::Blocked { .. } => ConflictSource::BlockedPeriod,
                EntryKind::Booking(_) => ConflictSource::Booking,
            },
        })
        .collect()
}

pub(crate) fn check_no_conflict(
    item: &ItemState,
    range: &DateRange,
    excluding: Option<Ulid>,
) -> Result<(), EngineError> {
    let conflicts = conflicts_in(item, range, excluding);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict { conflicts })
    }
}
