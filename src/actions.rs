use diesel::prelude::*;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{self, Booking, BookingStatus, NewBooking, NewReview, NewRoom, PaymentStatus, Review, Room};
use crate::reference::generate_reference;
use crate::schema::{bookings, reviews, rooms};

/// How many fresh references we try before giving up on a colliding insert.
const MAX_REFERENCE_ATTEMPTS: usize = 5;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

fn validate_room_form(form: &models::RoomForm) -> Result<(), ApiError> {
    if form.capacity < 1 {
        return Err(ApiError::Validation("Capacity must be at least 1".to_string()));
    }
    if form.price_per_night.is_sign_negative() {
        return Err(ApiError::Validation("Price per night cannot be negative".to_string()));
    }
    Ok(())
}

fn room_record(form: &models::RoomForm) -> NewRoom {
    NewRoom {
        name: form.name.trim().to_string(),
        room_type: form.room_type,
        description: form.description.clone(),
        price_per_night: form.price_per_night,
        capacity: form.capacity,
        amenities: form.amenities.clone(),
        images: form.images.clone(),
        is_available: form.is_available,
    }
}

pub fn create_room(conn: &mut PgConnection, form: &models::RoomForm) -> Result<Room, ApiError> {
    validate_room_form(form)?;
    let room = diesel::insert_into(rooms::table)
        .values(room_record(form))
        .get_result::<Room>(conn)?;
    Ok(room)
}

pub fn update_room(conn: &mut PgConnection, room_id: Uuid, form: &models::RoomForm) -> Result<Room, ApiError> {
    validate_room_form(form)?;
    let room = diesel::update(rooms::table.find(room_id))
        .set(room_record(form))
        .get_result::<Room>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;
    Ok(room)
}

pub fn delete_room(conn: &mut PgConnection, room_id: Uuid) -> Result<(), ApiError> {
    let deleted = diesel::delete(rooms::table.find(room_id)).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }
    Ok(())
}

pub fn get_room(conn: &mut PgConnection, room_id: Uuid) -> Result<Room, ApiError> {
    let room = rooms::table
        .find(room_id)
        .first::<Room>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;
    Ok(room)
}

pub fn list_rooms(conn: &mut PgConnection, include_unavailable: bool) -> Result<Vec<Room>, ApiError> {
    let mut query = rooms::table.order(rooms::name.asc()).into_boxed();
    if !include_unavailable {
        query = query.filter(rooms::is_available.eq(true));
    }
    Ok(query.load::<Room>(conn)?)
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// Can the room be booked for [check_in, check_out)? Only pending and
/// confirmed bookings hold a calendar slot; back-to-back stays are fine.
/// `exclude_booking` lets a reschedule skip the booking being moved.
///
/// This answer is advisory: the exclusion constraint on `bookings` is the
/// authoritative guard, and `create_booking` re-checks under a row lock.
pub fn check_room_availability(
    conn: &mut PgConnection,
    room_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    exclude_booking: Option<Uuid>,
) -> Result<bool, ApiError> {
    if models::stay_nights(check_in, check_out).is_none() {
        return Err(ApiError::Validation("Check-out date must be after check-in date".to_string()));
    }

    let mut query = bookings::table
        .filter(bookings::room_id.eq(room_id))
        .filter(bookings::status.eq_any(vec![BookingStatus::Pending, BookingStatus::Confirmed]))
        .select((bookings::id, bookings::check_in, bookings::check_out))
        .into_boxed();

    if let Some(excluded) = exclude_booking {
        query = query.filter(bookings::id.ne(excluded));
    }

    let held_slots: Vec<(Uuid, NaiveDate, NaiveDate)> = query.load(conn)?;

    let conflict = held_slots
        .iter()
        .any(|(_, held_in, held_out)| models::ranges_overlap(*held_in, *held_out, check_in, check_out));

    Ok(!conflict)
}

// ---------------------------------------------------------------------------
// Booking lifecycle
// ---------------------------------------------------------------------------

/// Atomic creation: lock the room row, validate, re-check availability and
/// insert inside one transaction. Reference collisions roll back to a
/// savepoint and retry with a fresh code.
pub fn create_booking(conn: &mut PgConnection, req: &models::CreateBookingRequest) -> Result<Booking, ApiError> {
    conn.transaction(|conn| {
        // Lock the room row so concurrent attempts on the same room serialize
        let room: Room = rooms::table
            .find(req.room_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;

        if !room.is_available {
            return Err(ApiError::Validation("This room is not open for booking".to_string()));
        }

        let nights = models::stay_nights(req.check_in, req.check_out)
            .ok_or_else(|| ApiError::Validation("Check-out date must be after check-in date".to_string()))?;

        if req.guests < 1 {
            return Err(ApiError::Validation("At least 1 guest is required".to_string()));
        }
        if req.guests > room.capacity {
            return Err(ApiError::Validation(format!(
                "This room can accommodate maximum {} guests",
                room.capacity
            )));
        }

        let available = check_room_availability(conn, req.room_id, req.check_in, req.check_out, None)?;
        if !available {
            return Err(ApiError::Conflict(
                "This room is not available for the selected dates".to_string(),
            ));
        }

        let total_price = models::stay_total(room.price_per_night, nights);

        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let new_booking = NewBooking {
                booking_reference: generate_reference(req.check_in),
                room_id: req.room_id,
                customer_id: req.customer_id,
                customer_name: req.customer_name.trim().to_string(),
                customer_email: req.customer_email.trim().to_string(),
                customer_phone: req.customer_phone.clone(),
                check_in: req.check_in,
                check_out: req.check_out,
                guests: req.guests,
                total_price,
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
            };

            // Savepoint per attempt so a reference collision can be retried
            // without aborting the outer transaction
            let inserted = conn.transaction(|conn| {
                diesel::insert_into(bookings::table)
                    .values(&new_booking)
                    .get_result::<Booking>(conn)
            });

            match inserted {
                Ok(booking) => return Ok(booking),
                Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    ref info,
                )) if info.constraint_name() == Some("bookings_booking_reference_key") => {
                    log::warn!("Booking reference collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::Conflict(
            "Could not allocate a unique booking reference, please retry".to_string(),
        ))
    })
}

pub fn get_booking_with_room(conn: &mut PgConnection, booking_id: Uuid) -> Result<(Booking, Room), ApiError> {
    let row: Option<(Booking, Room)> = bookings::table
        .inner_join(rooms::table)
        .filter(bookings::id.eq(booking_id))
        .select((bookings::all_columns, rooms::all_columns))
        .first(conn)
        .optional()?;
    row.ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))
}

/// Guest lookup by reference + email. A mismatch on either field reports
/// the same generic not-found so callers cannot probe which one was wrong.
pub fn lookup_booking(conn: &mut PgConnection, reference: &str, email: &str) -> Result<(Booking, String), ApiError> {
    let needle = reference.trim().to_uppercase();

    let row: Option<(Booking, String)> = bookings::table
        .inner_join(rooms::table)
        .filter(bookings::booking_reference.eq(&needle))
        .select((bookings::all_columns, rooms::name))
        .first(conn)
        .optional()?;

    let (booking, room_name) = row.ok_or_else(ApiError::not_found)?;

    if !booking.customer_email.eq_ignore_ascii_case(email.trim()) {
        return Err(ApiError::not_found());
    }

    Ok((booking, room_name))
}

/// Guest cancellation, authorized by the reference + email pair. Only
/// bookings that still hold a slot and have not reached check-in can be
/// cancelled by the customer.
pub fn cancel_booking_by_reference(
    conn: &mut PgConnection,
    reference: &str,
    email: &str,
    today: NaiveDate,
) -> Result<(Booking, String), ApiError> {
    conn.transaction(|conn| {
        let (found, room_name) = lookup_booking(conn, reference, email)?;

        let booking: Booking = bookings::table.find(found.id).for_update().first(conn)?;

        match booking.effective_status(today) {
            BookingStatus::Cancelled => {
                return Err(ApiError::Conflict("Booking is already cancelled".to_string()))
            }
            BookingStatus::Completed => {
                return Err(ApiError::Conflict("A completed stay cannot be cancelled".to_string()))
            }
            _ => {}
        }

        if booking.check_in <= today {
            return Err(ApiError::Conflict(
                "Bookings can no longer be cancelled on or after the check-in date".to_string(),
            ));
        }

        let updated = diesel::update(bookings::table.find(booking.id))
            .set((
                bookings::status.eq(BookingStatus::Cancelled),
                bookings::cancelled_at.eq(Some(Utc::now().naive_utc())),
            ))
            .get_result::<Booking>(conn)?;

        Ok((updated, room_name))
    })
}

/// Admin transition, validated against the state machine. Cancelling a
/// confirmed stay whose check-out already passed is rejected the same way a
/// stored `completed` would be.
pub fn update_booking_status(
    conn: &mut PgConnection,
    booking_id: Uuid,
    to: BookingStatus,
    today: NaiveDate,
) -> Result<(Booking, String), ApiError> {
    conn.transaction(|conn| {
        let (found, room_name) = get_booking_with_room(conn, booking_id)
            .map(|(b, r)| (b, r.name))?;

        let booking: Booking = bookings::table.find(found.id).for_update().first(conn)?;

        if !booking.status.can_transition(to) {
            return Err(ApiError::Conflict(format!(
                "Cannot change a {} booking to {}",
                booking.status.as_str(),
                to.as_str()
            )));
        }

        if to == BookingStatus::Cancelled && booking.effective_status(today) == BookingStatus::Completed {
            return Err(ApiError::Conflict("A completed stay cannot be cancelled".to_string()));
        }

        if to == BookingStatus::Completed && today < booking.check_out {
            return Err(ApiError::Conflict("Stay has not ended yet".to_string()));
        }

        let updated = if to == BookingStatus::Cancelled {
            diesel::update(bookings::table.find(booking.id))
                .set((
                    bookings::status.eq(to),
                    bookings::cancelled_at.eq(Some(Utc::now().naive_utc())),
                ))
                .get_result::<Booking>(conn)?
        } else {
            diesel::update(bookings::table.find(booking.id))
                .set(bookings::status.eq(to))
                .get_result::<Booking>(conn)?
        };

        Ok((updated, room_name))
    })
}

/// Move a booking to a new room and/or date range (admin calendar drag).
/// Re-checks capacity and availability against the target, excluding the
/// booking itself, and reprices the stay at the target room's rate.
pub fn reschedule_booking(
    conn: &mut PgConnection,
    booking_id: Uuid,
    req: &models::RescheduleRequest,
) -> Result<Booking, ApiError> {
    conn.transaction(|conn| {
        let booking: Booking = bookings::table
            .find(booking_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        if !booking.status.holds_slot() {
            return Err(ApiError::Conflict(
                "Only pending or confirmed bookings can be rescheduled".to_string(),
            ));
        }

        let target_room_id = req.room_id.unwrap_or(booking.room_id);
        let room: Room = rooms::table
            .find(target_room_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;

        let nights = models::stay_nights(req.check_in, req.check_out)
            .ok_or_else(|| ApiError::Validation("Check-out date must be after check-in date".to_string()))?;

        if booking.guests > room.capacity {
            return Err(ApiError::Validation(format!(
                "This room can accommodate maximum {} guests",
                room.capacity
            )));
        }

        let available =
            check_room_availability(conn, target_room_id, req.check_in, req.check_out, Some(booking.id))?;
        if !available {
            return Err(ApiError::Conflict(
                "This room is not available for the selected dates".to_string(),
            ));
        }

        let total_price = models::stay_total(room.price_per_night, nights);

        let updated = diesel::update(bookings::table.find(booking.id))
            .set((
                bookings::room_id.eq(target_room_id),
                bookings::check_in.eq(req.check_in),
                bookings::check_out.eq(req.check_out),
                bookings::total_price.eq(total_price),
            ))
            .get_result::<Booking>(conn)?;

        Ok(updated)
    })
}

pub fn list_bookings(
    conn: &mut PgConnection,
    q: &models::BookingListQuery,
) -> Result<Vec<(Booking, String)>, ApiError> {
    let mut query = bookings::table
        .inner_join(rooms::table)
        .select((bookings::all_columns, rooms::name))
        .into_boxed();

    if let Some(status) = q.status {
        query = query.filter(bookings::status.eq(status));
    }
    // Calendar window: any booking whose stay touches [from, to]
    if let Some(from) = q.from {
        query = query.filter(bookings::check_out.ge(from));
    }
    if let Some(to) = q.to {
        query = query.filter(bookings::check_in.le(to));
    }

    Ok(query.order(bookings::check_in.asc()).load(conn)?)
}

// ---------------------------------------------------------------------------
// Payment reconciliation
// ---------------------------------------------------------------------------

/// Apply a successful payment to the booking. Returns the booking and
/// whether this call performed the pending -> confirmed/paid transition;
/// reconciling an already-paid booking is a no-op so notifications cannot
/// be duplicated.
pub fn mark_booking_paid(conn: &mut PgConnection, booking_id: Uuid) -> Result<(Booking, bool), ApiError> {
    conn.transaction(|conn| {
        let booking: Booking = bookings::table
            .find(booking_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        match (booking.status, booking.payment_status) {
            (BookingStatus::Confirmed, PaymentStatus::Paid)
            | (BookingStatus::Completed, PaymentStatus::Paid) => Ok((booking, false)),
            (BookingStatus::Pending, _) => {
                let updated = diesel::update(bookings::table.find(booking.id))
                    .set((
                        bookings::status.eq(BookingStatus::Confirmed),
                        bookings::payment_status.eq(PaymentStatus::Paid),
                    ))
                    .get_result::<Booking>(conn)?;
                Ok((updated, true))
            }
            // Admin confirmed ahead of the processor; record the payment.
            (BookingStatus::Confirmed, PaymentStatus::Pending) => {
                let updated = diesel::update(bookings::table.find(booking.id))
                    .set(bookings::payment_status.eq(PaymentStatus::Paid))
                    .get_result::<Booking>(conn)?;
                Ok((updated, true))
            }
            (BookingStatus::Cancelled, _) => Err(ApiError::Conflict(
                "Booking was cancelled before payment completed".to_string(),
            )),
            (BookingStatus::Completed, PaymentStatus::Pending) => Err(ApiError::Conflict(
                "Stay is already completed".to_string(),
            )),
        }
    })
}

/// Store the checkout session created for a pending booking so a later
/// reconcile can be correlated against it.
pub fn set_payment_session(conn: &mut PgConnection, booking_id: Uuid, session_id: &str) -> Result<(), ApiError> {
    let updated = diesel::update(
        bookings::table
            .filter(bookings::id.eq(booking_id))
            .filter(bookings::status.eq(BookingStatus::Pending)),
    )
    .set(bookings::payment_session_id.eq(Some(session_id)))
    .execute(conn)?;

    if updated == 0 {
        return Err(ApiError::Conflict("Booking is not awaiting payment".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

pub fn create_review(
    conn: &mut PgConnection,
    req: &models::CreateReviewRequest,
    today: NaiveDate,
) -> Result<Review, ApiError> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::Validation("Rating must be between 1 and 5".to_string()));
    }
    if req.photos.len() > 5 {
        return Err(ApiError::Validation("You can only attach up to 5 photos".to_string()));
    }

    let (booking, _room_name) = lookup_booking(conn, &req.reference, &req.email)?;

    if booking.effective_status(today) != BookingStatus::Completed {
        return Err(ApiError::Conflict("Reviews can only be left after check-out".to_string()));
    }

    let existing: Option<Uuid> = reviews::table
        .filter(reviews::booking_id.eq(booking.id))
        .select(reviews::id)
        .first(conn)
        .optional()?;
    if existing.is_some() {
        return Err(ApiError::Conflict("A review already exists for this booking".to_string()));
    }

    let review = diesel::insert_into(reviews::table)
        .values(NewReview {
            room_id: booking.room_id,
            booking_id: booking.id,
            rating: req.rating,
            comment: req.comment.clone(),
            photos: req.photos.clone(),
        })
        .get_result::<Review>(conn)?;

    Ok(review)
}

pub fn list_reviews_for_room(conn: &mut PgConnection, room_id: Uuid) -> Result<Vec<Review>, ApiError> {
    let room = get_room(conn, room_id)?;
    Ok(reviews::table
        .filter(reviews::room_id.eq(room.id))
        .order(reviews::created_at.desc())
        .load::<Review>(conn)?)
}
