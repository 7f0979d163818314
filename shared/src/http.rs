use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::PortalError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn error_response(
    status: StatusCode,
    error: &str,
    message: &str,
) -> Result<Response<Body>, Error> {
    let error = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
    };
    json_response(status, &error)
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET,POST,OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type,Authorization,X-User-Email,X-User-Name",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "NotFound", "Not found")
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "MethodNotAllowed",
        "Method not allowed",
    )
}

/// Render an operation result, mapping errors to their JSON error response
pub fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, PortalError>,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json_response(status, &value),
        Err(e) => {
            tracing::warn!("Request failed ({}): {}", e.kind(), e);
            e.into_response()
        }
    }
}

/// Parse a JSON request body, reporting malformed input as a validation error
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, PortalError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::error!("Failed to parse request body: {}", e);
        PortalError::validation(format!("Invalid request body: {}", e))
    })
}
