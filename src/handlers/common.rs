use crate::errors::{ApiError, ServiceError};
use crate::models::parse_enum;
use crate::ApiResponse;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use std::str::FromStr;
use validator::Validate;

/// JSON body that is validated before the handler runs.
///
/// Malformed JSON and failed validation both surface as 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Success envelope with no payload, for deletions.
pub fn deleted_response(message: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(message))
}

/// Parses an optional query-string status, treating blank as absent.
pub fn parse_optional<T: FromStr>(field: &str, raw: Option<&str>) -> Result<Option<T>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_enum(field, raw).map(Some),
        None => Ok(None),
    }
}
