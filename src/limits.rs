//! Hard caps on input sizes. Exceeding any of these is a
//! `LimitExceeded` rejection, never a silent truncation.

/// Longest bookable or blockable range, in nights.
pub const MAX_RANGE_NIGHTS: i64 = 730;

/// Widest availability query window, in days.
pub const MAX_WINDOW_DAYS: i64 = 1830;

/// Calendar entries (bookings + blocked periods, history included) per item.
pub const MAX_ENTRIES_PER_ITEM: usize = 10_000;

/// Blocked-period reason text.
pub const MAX_REASON_LEN: usize = 512;

/// Payment intent reference.
pub const MAX_REFERENCE_LEN: usize = 256;

/// Dates outside this window are rejected as implausible input.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2200;
