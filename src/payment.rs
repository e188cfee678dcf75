use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::model::BookingId;

/// Failure reported by the external payment processor.
#[derive(Debug)]
pub struct GatewayError(pub String);

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "payment gateway error: {}", self.0)
    }
}

impl std::error::Error for GatewayError {}

/// Boundary with the payment processor collaborator.
///
/// The engine computes the amount exactly once (daily rate × nights) and
/// passes it out here; the processor never recomputes it. Results come
/// back through `Engine::on_payment_result` keyed by the returned
/// reference.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent and return the processor's reference.
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
        booking_id: BookingId,
    ) -> Result<String, GatewayError>;
}

/// Gateway for deployments where every item uses owner approval and no
/// money moves through this subsystem.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_intent(
        &self,
        _amount: Decimal,
        _currency: &str,
        _booking_id: BookingId,
    ) -> Result<String, GatewayError> {
        Err(GatewayError("payments are disabled".into()))
    }
}
