use chrono::NaiveDate;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::catalog::{ApprovalMode, ItemMeta};
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, conflicts_in, validate_range};
use super::{Engine, EngineError};

/// A time-driven transition the sweep found due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTransition {
    /// PENDING/CONFIRMED → ACTIVE: the start date has been reached.
    Activate,
    /// ACTIVE → COMPLETED: the end date has passed.
    Complete,
}

impl Engine {
    async fn item_meta(&self, item_id: ItemId) -> Result<ItemMeta, EngineError> {
        self.catalog
            .get_item(item_id)
            .await
            .ok_or(EngineError::ItemNotFound(item_id))
    }

    /// Renter requests a booking. Inserts a PENDING booking under the
    /// item's write lock (check + commit are one atomic unit, so two
    /// concurrent requests for overlapping ranges cannot both pass), then
    /// creates a payment intent for payment-confirmed items.
    pub async fn create_booking(
        &self,
        item_id: ItemId,
        renter_id: UserId,
        range: DateRange,
    ) -> Result<BookingQuote, EngineError> {
        validate_range(&range)?;
        let meta = self.item_meta(item_id).await?;
        if !meta.active {
            return Err(EngineError::ItemInactive(item_id));
        }
        if renter_id == meta.owner_id {
            return Err(EngineError::SelfBooking {
                item_id,
                owner_id: meta.owner_id,
            });
        }

        // End is exclusive, so nights = end - start with no off-by-one on
        // single-day bookings. Computed once; the payment collaborator
        // never recomputes it.
        let amount = meta.daily_rate * Decimal::from(range.nights());
        let id = Ulid::new();

        let state = self.item_state(item_id);
        {
            let mut guard = state.write().await;
            if guard.entries.len() >= MAX_ENTRIES_PER_ITEM {
                return Err(EngineError::LimitExceeded("too many calendar entries on item"));
            }
            if let Err(e) = check_no_conflict(&guard, &range, None) {
                metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
                return Err(e);
            }
            let event = Event::BookingRequested {
                id,
                item_id,
                renter_id,
                range,
                amount,
            };
            self.persist_and_apply(item_id, &mut guard, &event).await?;
        } // release the lock before talking to the payment processor

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);

        let payment_reference = match meta.approval {
            ApprovalMode::Manual => None,
            ApprovalMode::Automatic => {
                match self.gateway.create_intent(amount, &meta.currency, id).await {
                    Ok(reference) if reference.len() <= MAX_REFERENCE_LEN => {
                        let mut guard = state.write().await;
                        let event = Event::IntentRecorded {
                            id,
                            item_id,
                            reference: reference.clone(),
                        };
                        self.persist_and_apply(item_id, &mut guard, &event).await?;
                        Some(reference)
                    }
                    Ok(_) => {
                        self.cancel_unpaid(id, item_id, &state).await?;
                        return Err(EngineError::Gateway("intent reference too long".into()));
                    }
                    Err(e) => {
                        // Without an intent the booking can never confirm;
                        // release the range instead of squatting on it.
                        self.cancel_unpaid(id, item_id, &state).await?;
                        return Err(EngineError::Gateway(e.0));
                    }
                }
            }
        };

        Ok(BookingQuote {
            booking_id: id,
            amount,
            currency: meta.currency,
            payment_reference,
        })
    }

    async fn cancel_unpaid(
        &self,
        id: BookingId,
        item_id: ItemId,
        state: &super::SharedItemState,
    ) -> Result<(), EngineError> {
        let mut guard = state.write().await;
        let event = Event::BookingCancelled { id, item_id };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        Ok(())
    }

    /// Payment succeeded for a pending booking. Verifies the intent
    /// reference, re-checks availability excluding this booking (the
    /// defensive re-check against anything that landed since the booking
    /// was created), and confirms. Idempotent: redelivering the same
    /// confirmation is a no-op.
    pub async fn confirm_payment(
        &self,
        booking_id: BookingId,
        reference: &str,
    ) -> Result<PaymentOutcome, EngineError> {
        if reference.len() > MAX_REFERENCE_LEN {
            return Err(EngineError::LimitExceeded("payment reference too long"));
        }
        let item_id = self
            .item_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let meta = self.item_meta(item_id).await?;
        if meta.approval != ApprovalMode::Automatic {
            return Err(EngineError::ApprovalMismatch(
                "item confirms via owner approval, not payment",
            ));
        }

        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let mut guard = state.write().await;

        let (range, status, stored_ref) = {
            let entry = guard.entry(booking_id).ok_or(EngineError::NotFound(booking_id))?;
            let b = entry.booking().ok_or(EngineError::NotFound(booking_id))?;
            (entry.range, b.status, b.payment_reference.clone())
        };

        match status {
            BookingStatus::Pending => {
                if stored_ref.as_deref() != Some(reference) {
                    return Err(EngineError::PaymentMismatch {
                        reference: reference.to_string(),
                    });
                }
                let conflicts = conflicts_in(&guard, &range, Some(booking_id));
                if !conflicts.is_empty() {
                    // The range was taken while payment was in flight.
                    // Cancel rather than silently confirm; money is held,
                    // so the caller must refund.
                    let event = Event::BookingCancelled { id: booking_id, item_id };
                    self.persist_and_apply(item_id, &mut guard, &event).await?;
                    metrics::counter!(observability::REFUNDS_REQUIRED_TOTAL).increment(1);
                    metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
                    return Ok(PaymentOutcome::RefundRequired { conflicts });
                }
                let event = Event::BookingConfirmed {
                    id: booking_id,
                    item_id,
                    reference: Some(reference.to_string()),
                };
                self.persist_and_apply(item_id, &mut guard, &event).await?;
                metrics::counter!(observability::PAYMENTS_CONFIRMED_TOTAL).increment(1);
                Ok(PaymentOutcome::Confirmed)
            }
            BookingStatus::Confirmed | BookingStatus::Active | BookingStatus::Completed => {
                if stored_ref.as_deref() == Some(reference) {
                    Ok(PaymentOutcome::AlreadyConfirmed)
                } else {
                    Err(EngineError::PaymentMismatch {
                        reference: reference.to_string(),
                    })
                }
            }
            BookingStatus::Cancelled => {
                // Cancelled while payment was in flight — the held money
                // must go back.
                metrics::counter!(observability::REFUNDS_REQUIRED_TOTAL).increment(1);
                Ok(PaymentOutcome::RefundRequired { conflicts: Vec::new() })
            }
        }
    }

    /// Inbound webhook from the payment collaborator. Resolves the intent
    /// reference to its booking and applies the result. Redeliveries are
    /// absorbed by `confirm_payment`'s idempotency.
    pub async fn on_payment_result(
        &self,
        reference: &str,
        succeeded: bool,
    ) -> Result<PaymentOutcome, EngineError> {
        let booking_id = self
            .intent_to_booking
            .get(reference)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::PaymentMismatch {
                reference: reference.to_string(),
            })?;

        if succeeded {
            return self.confirm_payment(booking_id, reference).await;
        }

        let (item_id, mut guard) = self.resolve_entity_write(&booking_id).await?;
        let status = guard
            .entry(booking_id)
            .and_then(Entry::booking)
            .map(|b| b.status)
            .ok_or(EngineError::NotFound(booking_id))?;
        match status {
            BookingStatus::Pending => {
                let event = Event::BookingCancelled { id: booking_id, item_id };
                self.persist_and_apply(item_id, &mut guard, &event).await?;
                metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
                Ok(PaymentOutcome::Abandoned)
            }
            BookingStatus::Cancelled => Ok(PaymentOutcome::Abandoned),
            _ => Err(EngineError::PaymentMismatch {
                reference: reference.to_string(),
            }),
        }
    }

    /// Renter or owner cancels. Legal from PENDING or CONFIRMED; the
    /// range is released as soon as the transition commits. Cancelling an
    /// already-cancelled booking is a no-op.
    pub async fn cancel_booking(&self, booking_id: BookingId, actor: UserId) -> Result<(), EngineError> {
        let item_id = self
            .item_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let meta = self.item_meta(item_id).await?;

        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let mut guard = state.write().await;

        let (status, renter_id) = {
            let entry = guard.entry(booking_id).ok_or(EngineError::NotFound(booking_id))?;
            let b = entry.booking().ok_or(EngineError::NotFound(booking_id))?;
            (b.status, b.renter_id)
        };

        if actor != renter_id && actor != meta.owner_id {
            return Err(EngineError::Unauthorized { user_id: actor });
        }

        match status {
            BookingStatus::Pending | BookingStatus::Confirmed => {
                let event = Event::BookingCancelled { id: booking_id, item_id };
                self.persist_and_apply(item_id, &mut guard, &event).await?;
                metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
                Ok(())
            }
            BookingStatus::Cancelled => Ok(()),
            from => Err(EngineError::InvalidTransition { booking_id, from }),
        }
    }

    /// Owner accepts or declines a pending booking on a manual-approval
    /// item. Independent of payment; mutually exclusive with the
    /// payment-driven path per item configuration.
    pub async fn owner_respond(
        &self,
        booking_id: BookingId,
        actor: UserId,
        accept: bool,
    ) -> Result<(), EngineError> {
        let item_id = self
            .item_for_entity(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let meta = self.item_meta(item_id).await?;
        if meta.approval != ApprovalMode::Manual {
            return Err(EngineError::ApprovalMismatch(
                "item confirms via payment, not owner approval",
            ));
        }
        if actor != meta.owner_id {
            return Err(EngineError::Unauthorized { user_id: actor });
        }

        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let mut guard = state.write().await;

        let status = guard
            .entry(booking_id)
            .and_then(Entry::booking)
            .map(|b| b.status)
            .ok_or(EngineError::NotFound(booking_id))?;
        if status != BookingStatus::Pending {
            return Err(EngineError::InvalidTransition {
                booking_id,
                from: status,
            });
        }

        let event = if accept {
            Event::BookingConfirmed {
                id: booking_id,
                item_id,
                reference: None,
            }
        } else {
            Event::BookingCancelled { id: booking_id, item_id }
        };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        if !accept {
            metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        }
        Ok(())
    }

    /// Owner blacks out a date range. Checked against the same occupied
    /// set as bookings: a blocked period may cover a cancelled or
    /// completed booking's old dates, but never a live one — a renter's
    /// reservation is never silently overridden.
    pub async fn block_dates(
        &self,
        item_id: ItemId,
        actor: UserId,
        range: DateRange,
        reason: Option<String>,
    ) -> Result<BlockId, EngineError> {
        validate_range(&range)?;
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("reason too long"));
        }
        let meta = self.item_meta(item_id).await?;
        if !meta.active {
            return Err(EngineError::ItemInactive(item_id));
        }
        if actor != meta.owner_id {
            return Err(EngineError::Unauthorized { user_id: actor });
        }

        let state = self.item_state(item_id);
        let mut guard = state.write().await;
        if guard.entries.len() >= MAX_ENTRIES_PER_ITEM {
            return Err(EngineError::LimitExceeded("too many calendar entries on item"));
        }
        if let Err(e) = check_no_conflict(&guard, &range, None) {
            metrics::counter!(observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::PeriodBlocked {
            id,
            item_id,
            range,
            reason,
        };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        Ok(id)
    }

    /// Owner removes a blackout period. Unconditional: removing a
    /// restriction cannot create a conflict, so no availability recheck.
    pub async fn unblock_dates(&self, block_id: BlockId, actor: UserId) -> Result<(), EngineError> {
        let item_id = self
            .item_for_entity(&block_id)
            .ok_or(EngineError::NotFound(block_id))?;
        let meta = self.item_meta(item_id).await?;
        if actor != meta.owner_id {
            return Err(EngineError::Unauthorized { user_id: actor });
        }

        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let mut guard = state.write().await;

        match guard.entry(block_id) {
            Some(e) if matches!(e.kind, EntryKind::Blocked { .. }) => {}
            _ => return Err(EngineError::NotFound(block_id)),
        }

        let event = Event::PeriodUnblocked { id: block_id, item_id };
        self.persist_and_apply(item_id, &mut guard, &event).await
    }

    // ── Time-driven sweep ────────────────────────────────────

    /// Scan all items for bookings whose dates make a transition due.
    pub fn collect_due_transitions(&self, today: NaiveDate) -> Vec<(BookingId, ItemId, DueTransition)> {
        let mut due = Vec::new();
        for entry in self.state.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                for e in &guard.entries {
                    if let EntryKind::Booking(b) = &e.kind {
                        match b.status {
                            BookingStatus::Pending | BookingStatus::Confirmed
                                if e.range.start() <= today =>
                            {
                                due.push((e.id, guard.id, DueTransition::Activate));
                            }
                            BookingStatus::Active if e.range.end() <= today => {
                                due.push((e.id, guard.id, DueTransition::Complete));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        due
    }

    /// Advance every due booking. Idempotent and infallible by design:
    /// each transition re-checks status under the write lock and skips
    /// entries already advanced or cancelled in the meantime. Returns the
    /// number of transitions applied. Loops so a booking whose whole
    /// range is already in the past moves PENDING → ACTIVE → COMPLETED
    /// in one sweep.
    pub async fn advance_bookings(&self, today: NaiveDate) -> usize {
        let mut applied = 0;
        loop {
            let due = self.collect_due_transitions(today);
            if due.is_empty() {
                break;
            }
            let before = applied;
            for (booking_id, item_id, transition) in due {
                match self.apply_due(booking_id, item_id, transition, today).await {
                    Ok(true) => applied += 1,
                    Ok(false) => {} // already advanced — that's fine
                    Err(e) => tracing::debug!("sweep skip {booking_id}: {e}"),
                }
            }
            if applied == before {
                break; // nothing moved this round; avoid spinning on errors
            }
        }
        if applied > 0 {
            metrics::counter!(observability::SWEEP_TRANSITIONS_TOTAL).increment(applied as u64);
        }
        applied
    }

    async fn apply_due(
        &self,
        booking_id: BookingId,
        item_id: ItemId,
        transition: DueTransition,
        today: NaiveDate,
    ) -> Result<bool, EngineError> {
        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let mut guard = state.write().await;

        let (status, range) = match guard.entry(booking_id).and_then(|e| e.booking().map(|b| (b.status, e.range))) {
            Some(v) => v,
            None => return Ok(false),
        };

        let event = match (transition, status) {
            (DueTransition::Activate, BookingStatus::Pending | BookingStatus::Confirmed)
                if range.start() <= today =>
            {
                Event::BookingActivated { id: booking_id, item_id }
            }
            (DueTransition::Complete, BookingStatus::Active) if range.end() <= today => {
                Event::BookingCompleted { id: booking_id, item_id }
            }
            _ => return Ok(false),
        };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        Ok(true)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Booking history survives: each
    /// booking is re-emitted as its request plus its final status.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let item_ids: Vec<ItemId> = self.state.iter().map(|e| *e.key()).collect();
        for item_id in item_ids {
            let state = match self.get_item_state(&item_id) {
                Some(s) => s,
                None => continue,
            };
            let guard = state.read().await;
            for e in &guard.entries {
                match &e.kind {
                    EntryKind::Blocked { reason } => events.push(Event::PeriodBlocked {
                        id: e.id,
                        item_id: guard.id,
                        range: e.range,
                        reason: reason.clone(),
                    }),
                    EntryKind::Booking(b) => {
                        events.push(Event::BookingRequested {
                            id: e.id,
                            item_id: guard.id,
                            renter_id: b.renter_id,
                            range: e.range,
                            amount: b.amount,
                        });
                        if let Some(reference) = &b.payment_reference {
                            events.push(Event::IntentRecorded {
                                id: e.id,
                                item_id: guard.id,
                                reference: reference.clone(),
                            });
                        }
                        match b.status {
                            BookingStatus::Pending => {}
                            BookingStatus::Confirmed => events.push(Event::BookingConfirmed {
                                id: e.id,
                                item_id: guard.id,
                                reference: None,
                            }),
                            BookingStatus::Active => events.push(Event::BookingActivated {
                                id: e.id,
                                item_id: guard.id,
                            }),
                            BookingStatus::Completed => events.push(Event::BookingCompleted {
                                id: e.id,
                                item_id: guard.id,
                            }),
                            BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                                id: e.id,
                                item_id: guard.id,
                            }),
                        }
                    }
                }
            }
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(super::WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(super::WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
