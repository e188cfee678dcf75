use chrono::NaiveDate;

use crate::model::{DateRange, ItemState};

// ── Availability Algorithm ────────────────────────────────────────

/// Merged occupied ranges for an item within a window: blocked periods
/// plus bookings in an occupying status, clamped to the window, sorted
/// by start and merged. Both outward views (the range list and the
/// day list) are derived from this one computation so they can never
/// disagree.
pub fn occupied_in(item: &ItemState, window: &DateRange) -> Vec<DateRange> {
    let mut occupied: Vec<DateRange> = item
        .overlapping(window)
        .filter(|e| e.occupies())
        .filter_map(|e| e.range.intersect(window))
        .collect();
    occupied.sort_by_key(|r| r.start());
    merge_overlapping(&occupied)
}

/// Free ranges within the window: the complement of the occupied set.
pub fn free_in(item: &ItemState, window: &DateRange) -> Vec<DateRange> {
    let occupied = occupied_in(item, window);
    subtract_ranges(&[*window], &occupied)
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
/// Adjacent occupied ranges leave no gap, so they merge too.
pub fn merge_overlapping(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start() <= last.end()
        {
            *last = DateRange::unchecked(last.start(), last.end().max(range.end()));
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Subtract `to_remove` (sorted, disjoint) from `base` (sorted, disjoint),
/// walking each base range and emitting the gaps that survive.
pub fn subtract_ranges(base: &[DateRange], to_remove: &[DateRange]) -> Vec<DateRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start();
        let current_end = b.end();

        while ri < to_remove.len() && to_remove[ri].end() <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start() < current_end {
            let r = &to_remove[j];
            if r.start() > current_start {
                result.push(DateRange::unchecked(current_start, r.start()));
            }
            current_start = current_start.max(r.end());
            j += 1;
        }

        if current_start < current_end {
            result.push(DateRange::unchecked(current_start, current_end));
        }
    }

    result
}

/// Flatten ranges into the individual days they cover — the
/// `unavailableDates` view consumed by simple client pickers.
pub fn expand_days(ranges: &[DateRange]) -> Vec<NaiveDate> {
    ranges.iter().flat_map(|r| r.days()).collect()
}
