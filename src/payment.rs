use std::str::FromStr;

use async_trait::async_trait;
use tracing::info;
use ulid::Ulid;

use crate::error::BookingError;
use crate::model::BookingId;

/// A payment attempt opened with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Provider id of the intent, stored on the booking.
    pub reference: String,
    /// Handed to the paying client to complete the payment.
    pub client_secret: String,
}

/// Payment provider. Outcomes come back later through
/// `BookingService::on_payment_succeeded` / `on_payment_failed`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `amount_minor` is in the currency's minor unit (cents).
    async fn create_intent(
        &self,
        booking_id: BookingId,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, BookingError>;
}

/// Issues intent references locally without contacting a provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGateway;

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_intent(
        &self,
        booking_id: BookingId,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, BookingError> {
        if amount_minor <= 0 {
            return Err(BookingError::Payment(format!(
                "amount must be positive, got {amount_minor}"
            )));
        }
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(BookingError::Payment(format!("unsupported currency {currency:?}")));
        }
        let reference = format!("pi_{}", Ulid::new());
        let client_secret = format!("{reference}_secret_{}", Ulid::new());
        info!(
            booking = %booking_id,
            amount_minor,
            currency = %currency.to_ascii_lowercase(),
            reference = %reference,
            "payment intent created"
        );
        Ok(PaymentIntent {
            reference,
            client_secret,
        })
    }
}

/// What a failed-payment callback does to a PENDING booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentFailurePolicy {
    /// Record the failure and let the 15-minute payment timeout cancel the booking.
    #[default]
    AwaitTimeout,
    /// Cancel the booking as soon as the failure arrives.
    CancelImmediately,
}

impl FromStr for PaymentFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await-timeout" => Ok(PaymentFailurePolicy::AwaitTimeout),
            "cancel" => Ok(PaymentFailurePolicy::CancelImmediately),
            other => Err(format!(
                "unknown payment failure policy {other:?} (expected await-timeout or cancel)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_gateway_issues_distinct_references() {
        let gw = LocalGateway;
        let a = gw.create_intent(Ulid::new(), 2_200, "usd").await.unwrap();
        let b = gw.create_intent(Ulid::new(), 2_200, "USD").await.unwrap();
        assert!(a.reference.starts_with("pi_"));
        assert!(a.client_secret.starts_with(&a.reference));
        assert_ne!(a.reference, b.reference);
    }

    #[tokio::test]
    async fn local_gateway_rejects_bad_input() {
        let gw = LocalGateway;
        assert!(matches!(
            gw.create_intent(Ulid::new(), 0, "usd").await,
            Err(BookingError::Payment(_))
        ));
        assert!(matches!(
            gw.create_intent(Ulid::new(), 100, "dollars").await,
            Err(BookingError::Payment(_))
        ));
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!(
            "await-timeout".parse::<PaymentFailurePolicy>().unwrap(),
            PaymentFailurePolicy::AwaitTimeout
        );
        assert_eq!(
            " Cancel ".parse::<PaymentFailurePolicy>().unwrap(),
            PaymentFailurePolicy::CancelImmediately
        );
        assert!("drop".parse::<PaymentFailurePolicy>().is_err());
        assert_eq!(PaymentFailurePolicy::default(), PaymentFailurePolicy::AwaitTimeout);
    }
}
