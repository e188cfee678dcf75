use ulid::Ulid;

use crate::model::{BookingStatus, ConflictingEntry, RangeError};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed range: inverted or zero-length.
    Validation(RangeError),
    /// Owners cannot book their own item.
    SelfBooking { item_id: Ulid, owner_id: Ulid },
    /// The requested range collides with occupied ranges. Carries the
    /// full list so the caller can explain which sub-ranges are taken.
    Conflict { conflicts: Vec<ConflictingEntry> },
    /// Actor is neither the renter nor the item owner.
    Unauthorized { user_id: Ulid },
    ItemNotFound(Ulid),
    ItemInactive(Ulid),
    /// Unknown booking or blocked-period id.
    NotFound(Ulid),
    /// Confirmation references an unknown or non-matching payment intent.
    PaymentMismatch { reference: String },
    /// The transition is not legal from the booking's current status.
    InvalidTransition { booking_id: Ulid, from: BookingStatus },
    /// The confirmation path used does not match the item's approval policy.
    ApprovalMismatch(&'static str),
    /// The external payment processor failed.
    Gateway(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl From<RangeError> for EngineError {
    fn from(e: RangeError) -> Self {
        EngineError::Validation(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "{e}"),
            EngineError::SelfBooking { item_id, .. } => {
                write!(f, "owner cannot book their own item {item_id}")
            }
            EngineError::Conflict { conflicts } => {
                write!(f, "dates conflict with {} occupied range(s):", conflicts.len())?;
                for c in conflicts {
                    write!(f, " {} {}", c.id, c.range)?;
                }
                Ok(())
            }
            EngineError::Unauthorized { user_id } => {
                write!(f, "user {user_id} is not allowed to perform this action")
            }
            EngineError::ItemNotFound(id) => write!(f, "item not found: {id}"),
            EngineError::ItemInactive(id) => write!(f, "item is deactivated: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::PaymentMismatch { reference } => {
                write!(f, "payment confirmation references unknown or expired intent: {reference}")
            }
            EngineError::InvalidTransition { booking_id, from } => {
                write!(f, "booking {booking_id} cannot transition from {from}")
            }
            EngineError::ApprovalMismatch(msg) => write!(f, "approval mismatch: {msg}"),
            EngineError::Gateway(e) => write!(f, "payment gateway error: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
