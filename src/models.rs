use serde::{Deserialize, Serialize};
use crate::schema::{bookings, reviews, rooms};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::{deserialize::{self, FromSql}, pg::{Pg, PgValue}, serialize::{self, Output, ToSql}, sql_types::Text, Insertable, Selectable};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::RoomType)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Standard,
    Deluxe,
    Suite,
    Executive,
}

impl ToSql<crate::schema::sql_types::RoomType, Pg> for RoomType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            RoomType::Standard => "standard",
            RoomType::Deluxe => "deluxe",
            RoomType::Suite => "suite",
            RoomType::Executive => "executive",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::RoomType, Pg> for RoomType {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "standard" => Ok(RoomType::Standard),
            "deluxe" => Ok(RoomType::Deluxe),
            "suite" => Ok(RoomType::Suite),
            "executive" => Ok(RoomType::Executive),
            s => Err(format!("Unrecognized room type: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::BookingStatus)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// Whether a booking in this status still occupies its calendar slot.
    pub fn holds_slot(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition(self, to: BookingStatus) -> bool {
        match (self, to) {
            (BookingStatus::Pending, BookingStatus::Confirmed) => true,
            (BookingStatus::Pending, BookingStatus::Cancelled) => true,
            (BookingStatus::Confirmed, BookingStatus::Cancelled) => true,
            (BookingStatus::Confirmed, BookingStatus::Completed) => true,
            _ => false,
        }
    }
}

impl ToSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            s => Err(format!("Unrecognized booking status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::PaymentStatus)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl ToSql<crate::schema::sql_types::PaymentStatus, Pg> for PaymentStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::PaymentStatus, Pg> for PaymentStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            s => Err(format!("Unrecognized payment status: {}", s).into()),
        }
    }
}

/// Half-open interval overlap: [a_in, a_out) intersects [b_in, b_out).
/// Back-to-back stays (one checks out the day the other checks in) do not
/// overlap.
pub fn ranges_overlap(a_in: NaiveDate, a_out: NaiveDate, b_in: NaiveDate, b_out: NaiveDate) -> bool {
    a_in < b_out && a_out > b_in
}

/// Number of nights in a stay. A same-day check-in/check-out (or an
/// inverted range) is not a valid stay.
pub fn stay_nights(check_in: NaiveDate, check_out: NaiveDate) -> Option<i64> {
    let nights = (check_out - check_in).num_days();
    if nights > 0 { Some(nights) } else { None }
}

pub fn stay_total(price_per_night: Decimal, nights: i64) -> Decimal {
    price_per_night * Decimal::from(nights)
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = rooms)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub room_type: RoomType,
    pub description: String,
    pub price_per_night: Decimal,
    pub capacity: i32,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub is_available: bool,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = rooms)]
pub struct NewRoom {
    pub name: String,
    pub room_type: RoomType,
    pub description: String,
    pub price_per_night: Decimal,
    pub capacity: i32,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomForm {
    pub name: String,
    pub room_type: RoomType,
    pub description: String,
    pub price_per_night: Decimal,
    pub capacity: i32,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: Uuid,
    pub booking_reference: String,
    pub room_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_session_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
}

impl Booking {
    /// Status as seen by callers: a confirmed stay whose check-out date has
    /// passed reads as completed without a stored transition.
    pub fn effective_status(&self, today: NaiveDate) -> BookingStatus {
        if self.status == BookingStatus::Confirmed && self.check_out <= today {
            BookingStatus::Completed
        } else {
            self.status
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub booking_reference: String,
    pub room_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[diesel(table_name = reviews)]
pub struct Review {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub photos: Vec<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reviews)]
pub struct NewReview {
    pub room_id: Uuid,
    pub booking_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub photos: Vec<String>,
}

// Request/Response models for API
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub room_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingLookupRequest {
    pub reference: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct BookingLookupResponse {
    pub booking: Booking,
    pub room_name: String,
    pub effective_status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub room_id: Option<Uuid>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub booking_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub success: bool,
    pub payment_status: PaymentStatus,
    pub booking: Booking,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub reference: String,
    pub email: String,
    pub rating: i32,
    pub comment: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoomListQuery {
    #[serde(default)]
    pub include_unavailable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn overlap_is_half_open() {
        // [10, 14) vs [12, 16) overlap
        assert!(ranges_overlap(d(2024, 6, 10), d(2024, 6, 14), d(2024, 6, 12), d(2024, 6, 16)));
        // containment
        assert!(ranges_overlap(d(2024, 6, 10), d(2024, 6, 20), d(2024, 6, 12), d(2024, 6, 14)));
        // disjoint
        assert!(!ranges_overlap(d(2024, 6, 1), d(2024, 6, 5), d(2024, 6, 10), d(2024, 6, 14)));
    }

    #[test]
    fn back_to_back_stays_do_not_overlap() {
        // One guest checks out the morning the next checks in.
        assert!(!ranges_overlap(d(2024, 6, 5), d(2024, 6, 10), d(2024, 6, 10), d(2024, 6, 14)));
        assert!(!ranges_overlap(d(2024, 6, 10), d(2024, 6, 14), d(2024, 6, 5), d(2024, 6, 10)));
    }

    #[test]
    fn nights_rejects_same_day_and_inverted_ranges() {
        assert_eq!(stay_nights(d(2024, 7, 1), d(2024, 7, 4)), Some(3));
        assert_eq!(stay_nights(d(2024, 7, 1), d(2024, 7, 1)), None);
        assert_eq!(stay_nights(d(2024, 7, 4), d(2024, 7, 1)), None);
    }

    #[test]
    fn total_price_is_nights_times_rate() {
        let rate = dec!(100.00);
        let nights = stay_nights(d(2024, 7, 1), d(2024, 7, 4)).unwrap();
        assert_eq!(stay_total(rate, nights), dec!(300.00));
    }

    #[test]
    fn legal_transitions_only() {
        use BookingStatus::*;
        assert!(Pending.can_transition(Confirmed));
        assert!(Pending.can_transition(Cancelled));
        assert!(Confirmed.can_transition(Cancelled));
        assert!(Confirmed.can_transition(Completed));

        assert!(!Pending.can_transition(Completed));
        assert!(!Pending.can_transition(Pending));
        assert!(!Confirmed.can_transition(Confirmed));
        assert!(!Confirmed.can_transition(Pending));
        assert!(!Cancelled.can_transition(Pending));
        assert!(!Cancelled.can_transition(Confirmed));
        assert!(!Completed.can_transition(Cancelled));
        assert!(!Completed.can_transition(Confirmed));
    }

    #[test]
    fn slot_holding_statuses() {
        use BookingStatus::*;
        assert!(Pending.holds_slot());
        assert!(Confirmed.holds_slot());
        assert!(!Cancelled.holds_slot());
        assert!(!Completed.holds_slot());
    }

    fn booking_with(status: BookingStatus, check_out: NaiveDate) -> Booking {
        Booking {
            id: Uuid::nil(),
            booking_reference: "BK240701ABCDEF".to_string(),
            room_id: Uuid::nil(),
            customer_id: None,
            customer_name: "Guest".to_string(),
            customer_email: "guest@example.com".to_string(),
            customer_phone: None,
            check_in: check_out - chrono::Duration::days(2),
            check_out,
            guests: 1,
            total_price: Decimal::ZERO,
            status,
            payment_status: PaymentStatus::Pending,
            payment_session_id: None,
            created_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn confirmed_booking_reads_completed_after_checkout() {
        let b = booking_with(BookingStatus::Confirmed, d(2024, 7, 4));
        assert_eq!(b.effective_status(d(2024, 7, 3)), BookingStatus::Confirmed);
        assert_eq!(b.effective_status(d(2024, 7, 4)), BookingStatus::Completed);
        assert_eq!(b.effective_status(d(2024, 8, 1)), BookingStatus::Completed);
    }

    #[test]
    fn derived_completion_does_not_touch_other_statuses() {
        let b = booking_with(BookingStatus::Pending, d(2024, 7, 4));
        assert_eq!(b.effective_status(d(2024, 8, 1)), BookingStatus::Pending);
        let b = booking_with(BookingStatus::Cancelled, d(2024, 7, 4));
        assert_eq!(b.effective_status(d(2024, 8, 1)), BookingStatus::Cancelled);
    }
}
