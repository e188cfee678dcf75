use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task advancing time-driven booking transitions:
/// PENDING/CONFIRMED → ACTIVE once the start date is reached, ACTIVE →
/// COMPLETED once the end date has passed. Transitions are day-granular,
/// so an hourly tick is plenty; the sweep is idempotent either way.
pub async fn run_sweep(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        let advanced = engine.advance_bookings(today).await;
        if advanced > 0 {
            info!("sweep advanced {advanced} booking transition(s)");
        }
    }
}

/// Background task compacting the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::{Days, NaiveDate};
    use rust_decimal_macros::dec;
    use ulid::Ulid;

    use crate::catalog::{ApprovalMode, ItemCatalog, ItemMeta, StaticCatalog};
    use crate::engine::Engine;
    use crate::model::{BookingStatus, DateRange};
    use crate::notify::NotifyHub;
    use crate::payment::DisabledGateway;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bookable_test_sweep");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn manual_item(catalog: &StaticCatalog, owner_id: Ulid) -> Ulid {
        let item_id = Ulid::new();
        catalog.insert(
            item_id,
            ItemMeta {
                owner_id,
                daily_rate: dec!(25),
                currency: "EUR".into(),
                active: true,
                approval: ApprovalMode::Manual,
            },
        );
        item_id
    }

    #[tokio::test]
    async fn sweep_activates_and_completes() {
        let path = test_wal_path("sweep_advance.wal");
        let catalog = Arc::new(StaticCatalog::new());
        let engine = Engine::new(
            path,
            Arc::new(NotifyHub::new()),
            catalog.clone() as Arc<dyn ItemCatalog>,
            Arc::new(DisabledGateway),
        )
        .unwrap();

        let owner = Ulid::new();
        let item_id = manual_item(&catalog, owner);

        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let range = DateRange::new(
            today.checked_sub_days(Days::new(1)).unwrap(),
            today.checked_add_days(Days::new(2)).unwrap(),
        )
        .unwrap();

        let quote = engine
            .create_booking(item_id, Ulid::new(), range)
            .await
            .unwrap();

        // Start date reached: PENDING → ACTIVE
        assert_eq!(engine.advance_bookings(today).await, 1);
        let info = engine.get_booking(quote.booking_id).await.unwrap();
        assert_eq!(info.status, BookingStatus::Active);

        // Re-running the sweep on an already-ACTIVE booking is a no-op
        assert_eq!(engine.advance_bookings(today).await, 0);

        // End date passed: ACTIVE → COMPLETED
        let later = today.checked_add_days(Days::new(5)).unwrap();
        assert_eq!(engine.advance_bookings(later).await, 1);
        let info = engine.get_booking(quote.booking_id).await.unwrap();
        assert_eq!(info.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn sweep_walks_fully_past_booking_to_completed() {
        let path = test_wal_path("sweep_past.wal");
        let catalog = Arc::new(StaticCatalog::new());
        let engine = Engine::new(
            path,
            Arc::new(NotifyHub::new()),
            catalog.clone() as Arc<dyn ItemCatalog>,
            Arc::new(DisabledGateway),
        )
        .unwrap();

        let item_id = manual_item(&catalog, Ulid::new());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
        )
        .unwrap();
        let quote = engine
            .create_booking(item_id, Ulid::new(), range)
            .await
            .unwrap();

        // Whole range already behind us — one sweep does both hops.
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(engine.advance_bookings(today).await, 2);
        let info = engine.get_booking(quote.booking_id).await.unwrap();
        assert_eq!(info.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn sweep_leaves_future_and_cancelled_alone() {
        let path = test_wal_path("sweep_untouched.wal");
        let catalog = Arc::new(StaticCatalog::new());
        let engine = Engine::new(
            path,
            Arc::new(NotifyHub::new()),
            catalog.clone() as Arc<dyn ItemCatalog>,
            Arc::new(DisabledGateway),
        )
        .unwrap();

        let item_id = manual_item(&catalog, Ulid::new());
        let renter = Ulid::new();

        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let future = DateRange::new(
            today.checked_add_days(Days::new(10)).unwrap(),
            today.checked_add_days(Days::new(12)).unwrap(),
        )
        .unwrap();
        let past = DateRange::new(
            today.checked_sub_days(Days::new(10)).unwrap(),
            today.checked_sub_days(Days::new(8)).unwrap(),
        )
        .unwrap();

        let upcoming = engine.create_booking(item_id, renter, future).await.unwrap();
        let cancelled = engine.create_booking(item_id, renter, past).await.unwrap();
        engine
            .cancel_booking(cancelled.booking_id, renter)
            .await
            .unwrap();

        assert_eq!(engine.advance_bookings(today).await, 0);
        let info = engine.get_booking(upcoming.booking_id).await.unwrap();
        assert_eq!(info.status, BookingStatus::Pending);
        let info = engine.get_booking(cancelled.booking_id).await.unwrap();
        assert_eq!(info.status, BookingStatus::Cancelled);
    }
}
