use serde_json::json;
use std::time::Duration;

use crate::queue::{BookingEmailMessage, EmailKind};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Delivers booking emails through a Resend-compatible REST endpoint.
/// Without an API key configured the client runs in log-only mode, which is
/// what demo deployments and tests use.
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

impl EmailClient {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client should build");
        Self { client, api_key, from }
    }

    pub async fn send_booking_email(&self, message: &BookingEmailMessage) -> Result<()> {
        let subject = render_subject(message);
        let html = render_html(message);

        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                log::info!(
                    "Email delivery disabled; would send '{}' to {}",
                    subject,
                    message.to
                );
                return Ok(());
            }
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": [message.to.as_str()],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email service returned {}: {}", status, body).into());
        }

        log::info!("Sent {} email to {} for booking {}", message.kind.as_str(), message.to, message.booking_reference);
        Ok(())
    }
}

fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%a, %b %-d, %Y").to_string()
}

pub fn render_subject(message: &BookingEmailMessage) -> String {
    match message.kind {
        EmailKind::Confirmation => format!("Booking Confirmation - {}", message.booking_reference),
        EmailKind::Cancellation => format!("Booking Cancellation - {}", message.booking_reference),
    }
}

pub fn render_html(message: &BookingEmailMessage) -> String {
    let detail_rows = format!(
        "<tr><td><strong>Booking Reference:</strong></td><td>{}</td></tr>\
         <tr><td><strong>Room:</strong></td><td>{}</td></tr>\
         <tr><td><strong>Check-in:</strong></td><td>{}</td></tr>\
         <tr><td><strong>Check-out:</strong></td><td>{}</td></tr>",
        message.booking_reference,
        message.room_name,
        format_date(message.check_in),
        format_date(message.check_out),
    );

    match message.kind {
        EmailKind::Confirmation => format!(
            "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h1>Booking Confirmed</h1>\
             <p>Dear {name},</p>\
             <p>Thank you for choosing our hotel! Your reservation has been confirmed.</p>\
             <table>{rows}\
             <tr><td><strong>Guests:</strong></td><td>{guests}</td></tr>\
             <tr><td><strong>Total Amount:</strong></td><td><strong>${total}</strong></td></tr>\
             </table>\
             <p>Check-in time is 2:00 PM and check-out time is 11:00 AM.<br>\
             If you need to modify or cancel your reservation, please use your booking reference.</p>\
             <p>We look forward to welcoming you!<br><br><strong>City Business Hotel</strong></p>\
             </div>",
            name = message.customer_name,
            rows = detail_rows,
            guests = message.guests,
            total = message.total_price,
        ),
        EmailKind::Cancellation => format!(
            "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h1>Booking Cancelled</h1>\
             <p>Dear {name},</p>\
             <p>Your reservation has been successfully cancelled as requested.</p>\
             <table>{rows}</table>\
             <p>If you cancelled by mistake or would like to make a new reservation, please visit our website.</p>\
             <p>We hope to serve you in the future.<br><br><strong>City Business Hotel</strong></p>\
             </div>",
            name = message.customer_name,
            rows = detail_rows,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn message(kind: EmailKind) -> BookingEmailMessage {
        BookingEmailMessage {
            to: "guest@example.com".to_string(),
            customer_name: "Jordan Lee".to_string(),
            booking_reference: "BK240701X7KQ2M".to_string(),
            room_name: "Deluxe King".to_string(),
            check_in: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            guests: 2,
            total_price: dec!(300.00),
            kind,
        }
    }

    #[test]
    fn confirmation_subject_and_body() {
        let m = message(EmailKind::Confirmation);
        assert_eq!(render_subject(&m), "Booking Confirmation - BK240701X7KQ2M");
        let html = render_html(&m);
        assert!(html.contains("Booking Confirmed"));
        assert!(html.contains("Deluxe King"));
        assert!(html.contains("$300.00"));
        assert!(html.contains("Jordan Lee"));
    }

    #[test]
    fn cancellation_body_omits_payment_details() {
        let m = message(EmailKind::Cancellation);
        assert_eq!(render_subject(&m), "Booking Cancellation - BK240701X7KQ2M");
        let html = render_html(&m);
        assert!(html.contains("Booking Cancelled"));
        assert!(!html.contains("Total Amount"));
    }
}
