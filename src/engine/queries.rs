use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::availability::{expand_days, free_in, occupied_in};
use super::conflict::{conflicts_in, validate_range};
use super::{Engine, EngineError};

impl Engine {
    fn query_window(from: NaiveDate, to: NaiveDate) -> Result<DateRange, EngineError> {
        let window = DateRange::new(from, to)?;
        if window.nights() > MAX_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        Ok(window)
    }

    /// Merged occupied ranges (blocked periods + live bookings) within
    /// the window, sorted by start. Unknown items have empty calendars.
    pub async fn occupied_ranges(
        &self,
        item_id: ItemId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateRange>, EngineError> {
        let window = Self::query_window(from, to)?;
        let state = match self.get_item_state(&item_id) {
            Some(s) => s,
            None => return Ok(vec![]),
        };
        let guard = state.read().await;
        Ok(occupied_in(&guard, &window))
    }

    /// Day-granular unavailability for simple client pickers. Derived
    /// from the same occupied-range computation as `occupied_ranges`,
    /// never computed independently, so the two views cannot drift.
    pub async fn unavailable_dates(
        &self,
        item_id: ItemId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let occupied = self.occupied_ranges(item_id, from, to).await?;
        Ok(expand_days(&occupied))
    }

    /// Free ranges within the window — the complement of the occupied set.
    pub async fn free_ranges(
        &self,
        item_id: ItemId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateRange>, EngineError> {
        let window = Self::query_window(from, to)?;
        let state = match self.get_item_state(&item_id) {
            Some(s) => s,
            None => return Ok(vec![window]),
        };
        let guard = state.read().await;
        Ok(free_in(&guard, &window))
    }

    /// Pre-submit availability check. A pure read over a possibly-stale
    /// snapshot: the authoritative decision is re-made under the item's
    /// write lock at booking/blocking time.
    pub async fn check_availability(
        &self,
        item_id: ItemId,
        range: DateRange,
        excluding_booking: Option<BookingId>,
    ) -> Result<Decision, EngineError> {
        validate_range(&range)?;
        self.catalog
            .get_item(item_id)
            .await
            .ok_or(EngineError::ItemNotFound(item_id))?;
        let state = match self.get_item_state(&item_id) {
            Some(s) => s,
            None => return Ok(Decision::Available),
        };
        let guard = state.read().await;
        let conflicts = conflicts_in(&guard, &range, excluding_booking);
        if conflicts.is_empty() {
            Ok(Decision::Available)
        } else {
            Ok(Decision::Conflict { conflicts })
        }
    }

    /// Every booking on the item, history included.
    pub async fn get_bookings(&self, item_id: ItemId) -> Result<Vec<BookingInfo>, EngineError> {
        let state = match self.get_item_state(&item_id) {
            Some(s) => s,
            None => return Ok(vec![]),
        };
        let guard = state.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| {
                e.booking().map(|b| BookingInfo {
                    id: e.id,
                    item_id,
                    renter_id: b.renter_id,
                    start: e.range.start(),
                    end: e.range.end(),
                    status: b.status,
                    amount: b.amount,
                    payment_reference: b.payment_reference.clone(),
                })
            })
            .collect())
    }

    pub async fn get_blocked_periods(
        &self,
        item_id: ItemId,
    ) -> Result<Vec<BlockedPeriodInfo>, EngineError> {
        let state = match self.get_item_state(&item_id) {
            Some(s) => s,
            None => return Ok(vec![]),
        };
        let guard = state.read().await;
        Ok(guard
            .entries
            .iter()
            .filter_map(|e| match &e.kind {
                EntryKind::Blocked { reason } => Some(BlockedPeriodInfo {
                    id: e.id,
                    item_id,
                    start: e.range.start(),
                    end: e.range.end(),
                    reason: reason.clone(),
                }),
                EntryKind::Booking(_) => None,
            })
            .collect())
    }

    /// Single-booking lookup by id.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<BookingInfo, EngineError> {
        let item_id = self
            .item_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let guard = state.read().await;
        let entry = guard.entry(booking_id).ok_or(EngineError::NotFound(booking_id))?;
        let b = entry.booking().ok_or(EngineError::NotFound(booking_id))?;
        Ok(BookingInfo {
            id: entry.id,
            item_id,
            renter_id: b.renter_id,
            start: entry.range.start(),
            end: entry.range.end(),
            status: b.status,
            amount: b.amount,
            payment_reference: b.payment_reference.clone(),
        })
    }
}
