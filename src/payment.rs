use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ApiError;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Unpaid,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub booking_id: Uuid,
    pub room_id: Uuid,
    pub reference: String,
    pub room_name: String,
    pub amount: Decimal,
    pub customer_email: String,
    pub customer_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// External checkout collaborator. Creating a session never mutates the
/// booking; reconciliation applies the reported outcome through the state
/// machine.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(&self, req: &CreateSessionRequest) -> Result<CheckoutSession, ApiError>;
    async fn session_status(&self, session_id: &str) -> Result<PaymentOutcome, ApiError>;
}

/// Checkout amounts are charged in the currency's minor unit.
pub fn amount_in_cents(amount: Decimal) -> Result<i64, ApiError> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::Payment("Amount must be positive".to_string()));
    }
    if amount > Decimal::from(1_000_000) {
        return Err(ApiError::Payment("Amount too large".to_string()));
    }
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ApiError::Payment("Amount out of range".to_string()))
}

// ---------------------------------------------------------------------------
// Stripe Checkout over REST
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomerList {
    data: Vec<StripeCustomer>,
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

pub struct StripeCheckoutProvider {
    client: reqwest::Client,
    secret_key: String,
    public_base_url: String,
    currency: String,
}

impl StripeCheckoutProvider {
    pub fn new(secret_key: String, public_base_url: String, currency: String, timeout_secs: u64) -> Self {
        // A bounded timeout: an expired call is an unknown outcome, never a
        // confirmation
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client should build");
        Self { client, secret_key, public_base_url, currency }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Payment(format!("Unexpected payment processor response: {}", e)))
        } else {
            let message = match response.json::<StripeErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("payment processor returned {}", status),
            };
            Err(ApiError::Payment(message))
        }
    }

    async fn find_or_create_customer(&self, email: &str, name: &str) -> Result<String, ApiError> {
        let existing = self
            .client
            .get(format!("{}/customers", STRIPE_API_BASE))
            .bearer_auth(&self.secret_key)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(unreachable_processor)?;
        let existing: StripeCustomerList = self.parse_response(existing).await?;

        if let Some(customer) = existing.data.into_iter().next() {
            log::info!("Existing payment customer found: {}", customer.id);
            return Ok(customer.id);
        }

        let created = self
            .client
            .post(format!("{}/customers", STRIPE_API_BASE))
            .bearer_auth(&self.secret_key)
            .form(&[("email", email), ("name", name)])
            .send()
            .await
            .map_err(unreachable_processor)?;
        let created: StripeCustomer = self.parse_response(created).await?;
        log::info!("New payment customer created: {}", created.id);
        Ok(created.id)
    }
}

fn unreachable_processor(e: reqwest::Error) -> ApiError {
    ApiError::Payment(format!("Payment processor unreachable: {}", e))
}

#[async_trait]
impl PaymentProvider for StripeCheckoutProvider {
    async fn create_session(&self, req: &CreateSessionRequest) -> Result<CheckoutSession, ApiError> {
        let customer_id = self.find_or_create_customer(&req.customer_email, &req.customer_name).await?;
        let cents = amount_in_cents(req.amount)?;

        let product_name = format!("Hotel Booking - {}", req.room_name);
        let product_description = format!(
            "Booking Reference: {}\nCheck-in: {}\nCheck-out: {}",
            req.reference, req.check_in, req.check_out
        );
        let success_url = format!(
            "{}/booking-success?session_id={{CHECKOUT_SESSION_ID}}&booking_id={}",
            self.public_base_url, req.booking_id
        );
        let cancel_url = format!("{}/booking?roomId={}", self.public_base_url, req.room_id);

        let params = [
            ("customer", customer_id),
            ("mode", "payment".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            ("line_items[0][price_data][unit_amount]", cents.to_string()),
            ("line_items[0][price_data][product_data][name]", product_name),
            ("line_items[0][price_data][product_data][description]", product_description),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[booking_id]", req.booking_id.to_string()),
            ("metadata[booking_reference]", req.reference.clone()),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(unreachable_processor)?;
        let session: StripeSession = self.parse_response(response).await?;

        let url = session
            .url
            .ok_or_else(|| ApiError::Payment("No payment URL received from processor".to_string()))?;

        log::info!("Checkout session created: {}", session.id);
        Ok(CheckoutSession { session_id: session.id, url })
    }

    async fn session_status(&self, session_id: &str) -> Result<PaymentOutcome, ApiError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(unreachable_processor)?;
        let session: StripeSession = self.parse_response(response).await?;

        match session.payment_status.as_deref() {
            Some("paid") => Ok(PaymentOutcome::Paid),
            _ => Ok(PaymentOutcome::Unpaid),
        }
    }
}

// ---------------------------------------------------------------------------
// Demo provider
// ---------------------------------------------------------------------------

/// Stand-in processor for demo deployments: sessions are synthesized
/// locally and always report paid, so the reconcile path exercises the same
/// state-machine rules as the hosted checkout.
pub struct DemoPaymentProvider {
    public_base_url: String,
}

impl DemoPaymentProvider {
    pub fn new(public_base_url: String) -> Self {
        Self { public_base_url }
    }
}

#[async_trait]
impl PaymentProvider for DemoPaymentProvider {
    async fn create_session(&self, req: &CreateSessionRequest) -> Result<CheckoutSession, ApiError> {
        amount_in_cents(req.amount)?;
        let session_id = format!("demo_{}", Uuid::new_v4().simple());
        let url = format!(
            "{}/booking-success?session_id={}&booking_id={}",
            self.public_base_url, session_id, req.booking_id
        );
        Ok(CheckoutSession { session_id, url })
    }

    async fn session_status(&self, session_id: &str) -> Result<PaymentOutcome, ApiError> {
        if session_id.starts_with("demo_") {
            Ok(PaymentOutcome::Paid)
        } else {
            Ok(PaymentOutcome::Unpaid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> CreateSessionRequest {
        CreateSessionRequest {
            booking_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            reference: "BK240701ABCDEF".to_string(),
            room_name: "Deluxe King".to_string(),
            amount: dec!(300.00),
            customer_email: "guest@example.com".to_string(),
            customer_name: "Guest".to_string(),
            check_in: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
        }
    }

    #[test]
    fn amounts_convert_to_minor_units() {
        assert_eq!(amount_in_cents(dec!(300.00)).unwrap(), 30000);
        assert_eq!(amount_in_cents(dec!(79.50)).unwrap(), 7950);
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert!(amount_in_cents(Decimal::ZERO).is_err());
        assert!(amount_in_cents(dec!(-10.00)).is_err());
    }

    #[tokio::test]
    async fn demo_sessions_report_paid() {
        let provider = DemoPaymentProvider::new("http://localhost:3000".to_string());
        let session = provider.create_session(&request()).await.unwrap();
        assert!(session.session_id.starts_with("demo_"));
        assert!(session.url.contains(&session.session_id));
        assert_eq!(provider.session_status(&session.session_id).await.unwrap(), PaymentOutcome::Paid);
    }

    #[tokio::test]
    async fn unknown_sessions_stay_unpaid() {
        let provider = DemoPaymentProvider::new("http://localhost:3000".to_string());
        assert_eq!(provider.session_status("cs_test_123").await.unwrap(), PaymentOutcome::Unpaid);
    }
}
