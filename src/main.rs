#[macro_use]
extern crate diesel;

use actix_web::{delete, get, middleware, patch, post, put, web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use diesel::{prelude::*, r2d2};
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

mod actions;
mod config;
mod error;
mod mailer;
mod models;
mod payment;
mod queue;
mod reference;
mod schema;

use crate::error::{api_error, ApiError, Res};
use crate::payment::PaymentProvider;
use crate::queue::{BookingEmailMessage, EmailKind, NotificationQueueService};

type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;

fn validate_contact(name: &str, email: &str, phone: Option<&str>) -> Result<(), ApiError> {
    let name_re = Regex::new(r"^[\p{L}\s'\-]+$").unwrap();
    let email_re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    let phone_re = Regex::new(r"^\+?[0-9][0-9 \-]{6,18}$").unwrap();

    let name = name.trim();
    let name_len = name.chars().count();
    if name_len < 2 || name_len > 100 {
        return Err(ApiError::Validation("Name must be between 2 and 100 characters".to_string()));
    }
    if name_re.captures(name).is_none() {
        return Err(ApiError::Validation(
            "Name must contain only letters, spaces, hyphens or apostrophes".to_string(),
        ));
    }

    let email = email.trim();
    if email.len() > 255 || email_re.captures(email).is_none() {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }

    if let Some(phone) = phone {
        if !phone.trim().is_empty() && phone_re.captures(phone.trim()).is_none() {
            return Err(ApiError::Validation("Invalid phone number".to_string()));
        }
    }

    Ok(())
}

fn queue_booking_email(
    queue_service: web::Data<NotificationQueueService>,
    booking: &models::Booking,
    room_name: &str,
    kind: EmailKind,
) {
    let message = BookingEmailMessage::from_booking(booking, room_name, kind);

    // Best-effort side effect; the mutation already committed
    tokio::spawn(async move {
        if let Err(e) = queue_service.publish_booking_email(&message).await {
            log::error!("Failed to queue {} email for booking {}: {:?}", message.kind.as_str(), message.booking_reference, e);
        }
    });
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

#[post("/rooms")]
async fn add_room(pool: web::Data<DbPool>, form: web::Json<models::RoomForm>) -> actix_web::Result<impl Responder> {
    let re = Regex::new(r"^[\p{L}\p{N} \-&']+$").unwrap();

    if re.captures(form.name.trim()).is_none() {
        return Ok(HttpResponse::BadRequest().json(Res {
            message: "Room name should contain only letters, numbers and spaces".to_string(),
        }));
    }

    let room = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_room(&mut conn, &form)
    })
    .await?
    .map_err(|e| api_error("Failed to create room", e))?;

    Ok(HttpResponse::Created().json(room))
}

#[get("/rooms")]
async fn list_rooms(
    pool: web::Data<DbPool>,
    query: web::Query<models::RoomListQuery>,
) -> actix_web::Result<impl Responder> {
    let rooms = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_rooms(&mut conn, query.include_unavailable)
    })
    .await?
    .map_err(|e| api_error("Failed to list rooms", e))?;

    Ok(HttpResponse::Ok().json(rooms))
}

#[get("/rooms/{id}")]
async fn get_room(pool: web::Data<DbPool>, path: web::Path<Uuid>) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    let room = web::block(move || {
        let mut conn = pool.get()?;
        actions::get_room(&mut conn, room_id)
    })
    .await?
    .map_err(|e| api_error("Failed to get room", e))?;

    Ok(HttpResponse::Ok().json(room))
}

#[put("/rooms/{id}")]
async fn update_room(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    form: web::Json<models::RoomForm>,
) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    let room = web::block(move || {
        let mut conn = pool.get()?;
        actions::update_room(&mut conn, room_id, &form)
    })
    .await?
    .map_err(|e| api_error("Failed to update room", e))?;

    Ok(HttpResponse::Ok().json(room))
}

#[delete("/rooms/{id}")]
async fn delete_room(pool: web::Data<DbPool>, path: web::Path<Uuid>) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    web::block(move || {
        let mut conn = pool.get()?;
        actions::delete_room(&mut conn, room_id)
    })
    .await?
    .map_err(|e| api_error("Failed to delete room", e))?;

    Ok(HttpResponse::Ok().json(models::ApiResponse {
        message: "Room deleted successfully".to_string(),
    }))
}

#[get("/rooms/{id}/availability")]
async fn room_availability(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    query: web::Query<models::AvailabilityQuery>,
) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    let available = web::block(move || {
        let mut conn = pool.get()?;
        // The room must exist for the answer to mean anything
        actions::get_room(&mut conn, room_id)?;
        actions::check_room_availability(&mut conn, room_id, query.check_in, query.check_out, None)
    })
    .await?
    .map_err(|e| api_error("Failed to check availability", e))?;

    Ok(HttpResponse::Ok().json(models::AvailabilityResponse { available }))
}

#[get("/rooms/{id}/reviews")]
async fn room_reviews(pool: web::Data<DbPool>, path: web::Path<Uuid>) -> actix_web::Result<impl Responder> {
    let room_id = path.into_inner();

    let reviews = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_reviews_for_room(&mut conn, room_id)
    })
    .await?
    .map_err(|e| api_error("Failed to list reviews", e))?;

    Ok(HttpResponse::Ok().json(reviews))
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

#[post("/bookings")]
async fn create_booking(
    pool: web::Data<DbPool>,
    form: web::Json<models::CreateBookingRequest>,
) -> actix_web::Result<impl Responder> {
    if let Err(e) = validate_contact(&form.customer_name, &form.customer_email, form.customer_phone.as_deref()) {
        return Ok(e.to_response());
    }

    let booking = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_booking(&mut conn, &form)
    })
    .await?
    .map_err(|e| api_error("Failed to create booking", e))?;

    Ok(HttpResponse::Created().json(booking))
}

#[post("/bookings/lookup")]
async fn lookup_booking(
    pool: web::Data<DbPool>,
    form: web::Json<models::BookingLookupRequest>,
) -> actix_web::Result<impl Responder> {
    let today = Utc::now().date_naive();

    let response = web::block(move || {
        let mut conn = pool.get()?;
        let (booking, room_name) = actions::lookup_booking(&mut conn, &form.reference, &form.email)?;
        let effective_status = booking.effective_status(today);
        Ok(models::BookingLookupResponse { booking, room_name, effective_status })
    })
    .await?
    .map_err(|e| api_error("Failed to look up booking", e))?;

    Ok(HttpResponse::Ok().json(response))
}

#[post("/bookings/cancel")]
async fn cancel_booking(
    pool: web::Data<DbPool>,
    queue_service: web::Data<NotificationQueueService>,
    form: web::Json<models::BookingLookupRequest>,
) -> actix_web::Result<impl Responder> {
    let today = Utc::now().date_naive();

    let (booking, room_name) = web::block(move || {
        let mut conn = pool.get()?;
        actions::cancel_booking_by_reference(&mut conn, &form.reference, &form.email, today)
    })
    .await?
    .map_err(|e| api_error("Failed to cancel booking", e))?;

    queue_booking_email(queue_service, &booking, &room_name, EmailKind::Cancellation);

    Ok(HttpResponse::Ok().json(models::ApiResponse {
        message: "Booking cancelled successfully".to_string(),
    }))
}

#[get("/bookings")]
async fn list_bookings(
    pool: web::Data<DbPool>,
    query: web::Query<models::BookingListQuery>,
) -> actix_web::Result<impl Responder> {
    let today = Utc::now().date_naive();

    let result = web::block(move || {
        let mut conn = pool.get()?;
        let rows = actions::list_bookings(&mut conn, &query)?;

        let bookings: Vec<serde_json::Value> = rows
            .into_iter()
            .map(|(booking, room_name)| {
                let effective_status = booking.effective_status(today);
                serde_json::json!({
                    "booking": booking,
                    "room_name": room_name,
                    "effective_status": effective_status,
                })
            })
            .collect();

        Ok(bookings)
    })
    .await?
    .map_err(|e| api_error("Failed to list bookings", e))?;

    Ok(HttpResponse::Ok().json(result))
}

#[patch("/bookings/{id}/status")]
async fn update_booking_status(
    pool: web::Data<DbPool>,
    queue_service: web::Data<NotificationQueueService>,
    path: web::Path<Uuid>,
    form: web::Json<models::UpdateStatusRequest>,
) -> actix_web::Result<impl Responder> {
    let booking_id = path.into_inner();
    let to = form.status;
    let today = Utc::now().date_naive();

    let (booking, room_name) = web::block(move || {
        let mut conn = pool.get()?;
        actions::update_booking_status(&mut conn, booking_id, to, today)
    })
    .await?
    .map_err(|e| api_error("Failed to update booking status", e))?;

    if booking.status == models::BookingStatus::Cancelled {
        queue_booking_email(queue_service, &booking, &room_name, EmailKind::Cancellation);
    }

    Ok(HttpResponse::Ok().json(booking))
}

#[patch("/bookings/{id}/reschedule")]
async fn reschedule_booking(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
    form: web::Json<models::RescheduleRequest>,
) -> actix_web::Result<impl Responder> {
    let booking_id = path.into_inner();

    let booking = web::block(move || {
        let mut conn = pool.get()?;
        actions::reschedule_booking(&mut conn, booking_id, &form)
    })
    .await?
    .map_err(|e| api_error("Failed to reschedule booking", e))?;

    Ok(HttpResponse::Ok().json(booking))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[post("/payments/checkout")]
async fn create_checkout(
    pool: web::Data<DbPool>,
    provider: web::Data<dyn PaymentProvider>,
    form: web::Json<models::CheckoutRequest>,
) -> actix_web::Result<impl Responder> {
    let booking_id = form.booking_id;

    let (booking, room) = web::block({
        let pool = pool.clone();
        move || {
            let mut conn = pool.get()?;
            let (booking, room) = actions::get_booking_with_room(&mut conn, booking_id)?;

            if booking.status != models::BookingStatus::Pending
                || booking.payment_status != models::PaymentStatus::Pending
            {
                return Err(ApiError::Conflict("Booking is not awaiting payment".to_string()));
            }

            Ok((booking, room))
        }
    })
    .await?
    .map_err(|e| api_error("Failed to prepare checkout", e))?;

    let request = payment::CreateSessionRequest {
        booking_id: booking.id,
        room_id: room.id,
        reference: booking.booking_reference.clone(),
        room_name: room.name.clone(),
        amount: booking.total_price,
        customer_email: booking.customer_email.clone(),
        customer_name: booking.customer_name.clone(),
        check_in: booking.check_in,
        check_out: booking.check_out,
    };

    let session = provider
        .create_session(&request)
        .await
        .map_err(|e| api_error("Failed to create payment session", e))?;

    let session_id = session.session_id.clone();
    web::block(move || {
        let mut conn = pool.get()?;
        actions::set_payment_session(&mut conn, booking_id, &session_id)
    })
    .await?
    .map_err(|e| api_error("Failed to store payment session", e))?;

    Ok(HttpResponse::Ok().json(models::CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

#[post("/payments/reconcile")]
async fn reconcile_payment(
    pool: web::Data<DbPool>,
    queue_service: web::Data<NotificationQueueService>,
    provider: web::Data<dyn PaymentProvider>,
    form: web::Json<models::ReconcileRequest>,
) -> actix_web::Result<impl Responder> {
    let booking_id = form.booking_id;
    let session_id = form.session_id.clone();

    let (booking, room_name) = web::block({
        let pool = pool.clone();
        move || {
            let mut conn = pool.get()?;
            let (booking, room) = actions::get_booking_with_room(&mut conn, booking_id)?;
            Ok((booking, room.name))
        }
    })
    .await?
    .map_err(|e| api_error("Failed to reconcile payment", e))?;

    if booking.payment_session_id.as_deref() != Some(form.session_id.as_str()) {
        return Err(api_error(
            "Failed to reconcile payment",
            ApiError::Conflict("Unknown payment session for this booking".to_string()),
        ));
    }

    // Reconciling an already-paid booking is a no-op; do not re-query the
    // processor or re-send the notification
    if booking.payment_status == models::PaymentStatus::Paid {
        return Ok(HttpResponse::Ok().json(models::ReconcileResponse {
            success: true,
            payment_status: booking.payment_status,
            booking,
        }));
    }

    let outcome = provider
        .session_status(&session_id)
        .await
        .map_err(|e| api_error("Failed to verify payment session", e))?;

    match outcome {
        payment::PaymentOutcome::Paid => {
            let (updated, transitioned) = web::block(move || {
                let mut conn = pool.get()?;
                actions::mark_booking_paid(&mut conn, booking_id)
            })
            .await?
            .map_err(|e| api_error("Failed to confirm paid booking", e))?;

            if transitioned {
                queue_booking_email(queue_service, &updated, &room_name, EmailKind::Confirmation);
            }

            Ok(HttpResponse::Ok().json(models::ReconcileResponse {
                success: true,
                payment_status: updated.payment_status,
                booking: updated,
            }))
        }
        payment::PaymentOutcome::Unpaid => Ok(HttpResponse::Ok().json(models::ReconcileResponse {
            success: false,
            payment_status: booking.payment_status,
            booking,
        })),
    }
}

#[post("/payments/demo-complete")]
async fn demo_complete_payment(
    pool: web::Data<DbPool>,
    queue_service: web::Data<NotificationQueueService>,
    form: web::Json<models::CheckoutRequest>,
) -> actix_web::Result<impl Responder> {
    let booking_id = form.booking_id;

    // Simulated processor round-trip before the outcome lands
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    let (booking, transitioned, room_name) = web::block(move || {
        let mut conn = pool.get()?;
        let (_, room) = actions::get_booking_with_room(&mut conn, booking_id)?;
        let (booking, transitioned) = actions::mark_booking_paid(&mut conn, booking_id)?;
        Ok((booking, transitioned, room.name))
    })
    .await?
    .map_err(|e| api_error("Failed to complete demo payment", e))?;

    if transitioned {
        queue_booking_email(queue_service, &booking, &room_name, EmailKind::Confirmation);
    }

    Ok(HttpResponse::Ok().json(models::ReconcileResponse {
        success: true,
        payment_status: booking.payment_status,
        booking,
    }))
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

#[post("/reviews")]
async fn add_review(
    pool: web::Data<DbPool>,
    form: web::Json<models::CreateReviewRequest>,
) -> actix_web::Result<impl Responder> {
    let today = Utc::now().date_naive();

    let review = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_review(&mut conn, &form, today)
    })
    .await?
    .map_err(|e| api_error("Failed to create review", e))?;

    Ok(HttpResponse::Created().json(review))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::Config::from_env();

    // initialize DB pool outside of `HttpServer::new` so that it is shared across all workers
    let pool = initialize_db_pool(&config);

    // Initialize the notification queue service
    let mut queue_service = NotificationQueueService::new(&config);
    queue_service.initialize().await.unwrap();

    // Add a small delay to ensure RabbitMQ setup is complete
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;

    // Start the background email consumer
    let consumer_service = queue_service.clone();
    tokio::spawn(async move {
        if let Err(e) = consumer_service.start_consuming_booking_emails().await {
            log::error!("Error starting booking email consumer: {:?}", e);
        }
    });

    let queue_service = web::Data::new(queue_service);

    let provider: Arc<dyn PaymentProvider> = match config.payment_provider {
        config::PaymentProviderKind::Stripe => Arc::new(payment::StripeCheckoutProvider::new(
            config.stripe_secret_key.clone().expect("checked at config load"),
            config.public_base_url.clone(),
            config.currency.clone(),
            config.payment_timeout_secs,
        )),
        config::PaymentProviderKind::Demo => {
            Arc::new(payment::DemoPaymentProvider::new(config.public_base_url.clone()))
        }
    };
    let provider: web::Data<dyn PaymentProvider> = web::Data::from(provider);

    log::info!("starting HTTP server at http://{}:{}", config.bind_host, config.bind_port);

    let bind_addr = (config.bind_host.clone(), config.bind_port);

    HttpServer::new(move || {
        App::new()
            // add DB pool handle to app data; enables use of `web::Data<DbPool>` extractor
            .app_data(web::Data::new(pool.clone()))
            .app_data(queue_service.clone())
            .app_data(provider.clone())
            .wrap(middleware::Logger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let detail = err.to_string();
                let response = match err {
                    actix_web::error::JsonPayloadError::ContentType => {
                        HttpResponse::UnsupportedMediaType().body("Unsupported Media Type")
                    }
                    actix_web::error::JsonPayloadError::Deserialize(ref err) => {
                        HttpResponse::BadRequest().json(Res { message: err.to_string() })
                    }
                    _ => HttpResponse::BadRequest().json(Res { message: detail }),
                };
                actix_web::error::InternalError::from_response(err, response).into()
            }))
            .service(add_room)
            .service(list_rooms)
            .service(room_availability)
            .service(room_reviews)
            .service(get_room)
            .service(update_room)
            .service(delete_room)
            .service(create_booking)
            .service(lookup_booking)
            .service(cancel_booking)
            .service(list_bookings)
            .service(update_booking_status)
            .service(reschedule_booking)
            .service(create_checkout)
            .service(reconcile_payment)
            .service(demo_complete_payment)
            .service(add_review)
    })
    .bind(bind_addr)?
    .run()
    .await
}

fn initialize_db_pool(config: &config::Config) -> DbPool {
    let manager = r2d2::ConnectionManager::<PgConnection>::new(&config.database_url);
    r2d2::Pool::builder()
        .build(manager)
        .expect("DATABASE_URL should be a valid Postgres connection string")
}
