use actix_web::{error, HttpResponse};
use thiserror::Error;

#[derive(Debug, serde::Serialize)]
pub struct Res {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input rejected before any write; message names the field.
    #[error("{0}")]
    Validation(String),
    /// The requested write lost to existing state (overlapping booking,
    /// illegal status transition, duplicate review).
    #[error("{0}")]
    Conflict(String),
    /// Missing record, or a guest reference/email pair that does not match.
    /// The message stays generic so callers cannot probe which field was
    /// wrong.
    #[error("{0}")]
    NotFound(String),
    /// External payment processor failure or unknown outcome; the booking
    /// stays pending and the caller retries.
    #[error("{0}")]
    Payment(String),
    #[error("database error: {0}")]
    Database(diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl ApiError {
    pub fn not_found() -> Self {
        ApiError::NotFound(
            "No booking found with the provided details. Please check your booking reference and email address.".to_string(),
        )
    }

    pub fn to_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(m) => HttpResponse::BadRequest().json(Res { message: m.clone() }),
            ApiError::Conflict(m) => HttpResponse::Conflict().json(Res { message: m.clone() }),
            ApiError::NotFound(m) => HttpResponse::NotFound().json(Res { message: m.clone() }),
            ApiError::Payment(m) => HttpResponse::BadGateway().json(Res { message: m.clone() }),
            ApiError::Database(_) | ApiError::Pool(_) => HttpResponse::InternalServerError()
                .json(Res { message: "internal error".to_string() }),
        }
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match e {
            Error::NotFound => ApiError::NotFound("not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::ExclusionViolation, _) => ApiError::Conflict(
                "This room is no longer available for the selected dates".to_string(),
            ),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
                ApiError::Conflict(info.message().to_string())
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                ApiError::Conflict("record is still referenced by existing bookings".to_string())
            }
            other => ApiError::Database(other),
        }
    }
}

/// Handler glue: log with context, keep the error as the cause, answer
/// with the taxonomy-mapped JSON response.
pub fn api_error(context: &str, e: ApiError) -> actix_web::Error {
    log::error!("{}: {:?}", context, e);
    let response = e.to_response();
    error::InternalError::from_response(e, response).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_mismatch_is_generic() {
        // The same wording regardless of which half of the pair was wrong.
        let e = ApiError::not_found();
        match e {
            ApiError::NotFound(m) => {
                assert!(m.contains("booking reference and email"));
                assert!(!m.contains("password"));
            }
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn exclusion_violation_maps_to_conflict() {
        let e: ApiError = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ExclusionViolation,
            Box::new("conflicting key value violates exclusion constraint".to_string()),
        )
        .into();
        assert!(matches!(e, ApiError::Conflict(_)));
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let e: ApiError = diesel::result::Error::NotFound.into();
        assert!(matches!(e, ApiError::NotFound(_)));
    }
}
