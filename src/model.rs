use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ItemId = Ulid;
pub type BookingId = Ulid;
pub type BlockId = Ulid;
pub type UserId = Ulid;

/// Rejected range construction: `end <= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl std::fmt::Display for RangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid date range [{}, {}): end must be after start",
            self.start, self.end
        )
    }
}

impl std::error::Error for RangeError {}

/// Half-open calendar-date range `[start, end)`.
///
/// All comparisons are by calendar day; a booking ending on day N and
/// another starting on day N do not overlap (checkout/checkin on the
/// same day). A single-day range has `end == start + 1 day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting inverted or zero-length input.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(RangeError { start, end })
        }
    }

    /// Internal constructor for ranges already known to be well-formed
    /// (clamping, subtraction, merging).
    pub(crate) fn unchecked(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar nights: `end - start` in days.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// The single overlap rule: `a.start < b.end && b.start < a.end`.
    /// Adjacent ranges (one's end equals the other's start) do not overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True iff `start <= day < end`.
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// Intersection with `other`, or `None` when they don't overlap.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        if self.overlaps(other) {
            Some(DateRange::unchecked(
                self.start.max(other.start),
                self.end.min(other.end),
            ))
        } else {
            None
        }
    }

    /// Iterate every day in the range.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Booking state machine.
///
/// `Pending → Confirmed → Active → Completed`, with `Cancelled` terminal
/// from `Pending` or `Confirmed`. A booking's range is immutable; date
/// changes go through cancel + re-book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Whether a booking in this status occupies its date range.
    /// Cancelled and completed bookings do not block future availability.
    pub fn occupies(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Active)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingState {
    pub renter_id: UserId,
    pub status: BookingStatus,
    /// Daily rate × nights, computed once at creation.
    pub amount: Decimal,
    /// Set once a payment intent exists for this booking.
    pub payment_reference: Option<String>,
}

/// What an entry on an item's calendar represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Owner-imposed blackout period.
    Blocked { reason: Option<String> },
    /// Renter booking in some lifecycle status.
    Booking(BookingState),
}

/// A single entry on an item's calendar — blocked periods and bookings
/// are both just entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Ulid,
    pub range: DateRange,
    pub kind: EntryKind,
}

impl Entry {
    /// Whether this entry currently occupies its range.
    pub fn occupies(&self) -> bool {
        match &self.kind {
            EntryKind::Blocked { .. } => true,
            EntryKind::Booking(b) => b.status.occupies(),
        }
    }

    pub fn booking(&self) -> Option<&BookingState> {
        match &self.kind {
            EntryKind::Booking(b) => Some(b),
            EntryKind::Blocked { .. } => None,
        }
    }

    pub fn booking_mut(&mut self) -> Option<&mut BookingState> {
        match &mut self.kind {
            EntryKind::Booking(b) => Some(b),
            EntryKind::Blocked { .. } => None,
        }
    }
}

/// Per-item calendar: every blocked period and every booking (all
/// statuses — cancelled and completed bookings stay as history), sorted
/// by `range.start`.
#[derive(Debug, Clone)]
pub struct ItemState {
    pub id: ItemId,
    pub entries: Vec<Entry>,
}

impl ItemState {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            entries: Vec::new(),
        }
    }

    /// Insert entry maintaining sort order by range.start.
    pub fn insert_entry(&mut self, entry: Entry) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.range.start(), |e| e.range.start())
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    /// Remove entry by id. Only blocked periods are ever removed;
    /// bookings change status in place.
    pub fn remove_entry(&mut self, id: Ulid) -> Option<Entry> {
        if let Some(pos) = self.entries.iter().position(|e| e.id == id) {
            Some(self.entries.remove(pos))
        } else {
            None
        }
    }

    pub fn entry(&self, id: Ulid) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: Ulid) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Return only entries whose range overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Entry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .entries
            .partition_point(|e| e.range.start() < query.end());
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.range.end() > query.start())
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingRequested {
        id: BookingId,
        item_id: ItemId,
        renter_id: UserId,
        range: DateRange,
        amount: Decimal,
    },
    /// Payment intent created for a pending booking.
    IntentRecorded {
        id: BookingId,
        item_id: ItemId,
        reference: String,
    },
    BookingConfirmed {
        id: BookingId,
        item_id: ItemId,
        /// None for the owner-approval path, where no intent exists.
        reference: Option<String>,
    },
    BookingCancelled {
        id: BookingId,
        item_id: ItemId,
    },
    BookingActivated {
        id: BookingId,
        item_id: ItemId,
    },
    BookingCompleted {
        id: BookingId,
        item_id: ItemId,
    },
    PeriodBlocked {
        id: BlockId,
        item_id: ItemId,
        range: DateRange,
        reason: Option<String>,
    },
    PeriodUnblocked {
        id: BlockId,
        item_id: ItemId,
    },
}

impl Event {
    /// The item the event belongs to.
    pub fn item_id(&self) -> ItemId {
        match self {
            Event::BookingRequested { item_id, .. }
            | Event::IntentRecorded { item_id, .. }
            | Event::BookingConfirmed { item_id, .. }
            | Event::BookingCancelled { item_id, .. }
            | Event::BookingActivated { item_id, .. }
            | Event::BookingCompleted { item_id, .. }
            | Event::PeriodBlocked { item_id, .. }
            | Event::PeriodUnblocked { item_id, .. } => *item_id,
        }
    }
}

// ── Decision & result types ──────────────────────────────────────

/// Where a conflicting range comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSource {
    BlockedPeriod,
    Booking,
}

/// One occupied range that collides with a requested range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingEntry {
    pub id: Ulid,
    pub range: DateRange,
    pub source: ConflictSource,
}

/// Outcome of an availability check. On rejection the FULL list of
/// conflicting ranges is returned, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Available,
    Conflict { conflicts: Vec<ConflictingEntry> },
}

/// What a renter gets back from a successful booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingQuote {
    pub booking_id: BookingId,
    pub amount: Decimal,
    pub currency: String,
    /// Present when the item confirms via payment; absent for
    /// owner-approval items.
    pub payment_reference: Option<String>,
}

/// Outcome of a payment confirmation or webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Confirmed,
    /// Redelivered confirmation for an already-confirmed booking; no-op.
    AlreadyConfirmed,
    /// The defensive re-check found the range taken (or the booking was
    /// cancelled while payment was in flight). The booking is CANCELLED
    /// and the held money must be refunded by the payment collaborator.
    RefundRequired { conflicts: Vec<ConflictingEntry> },
    /// Payment failed; the pending booking was cancelled.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: BookingId,
    pub item_id: ItemId,
    pub renter_id: UserId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: BookingStatus,
    pub amount: Decimal,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPeriodInfo {
    pub id: BlockId,
    pub item_id: ItemId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reason: Option<String>,
}
