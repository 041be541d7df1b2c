//! Admin token guard
//!
//! Maintenance endpoints accept only `Authorization: Bearer
//! <ADMIN_API_TOKEN>`. With no token configured they are disabled outright
//! rather than left open.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse};
use ring::constant_time;

use crate::config_utils;

fn rejected(status: actix_web::http::StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

/// Gate a handler on the admin token. Returns the ready-made error
/// response on rejection so handlers can `return` it directly.
pub fn require_admin(req: &HttpRequest) -> Result<(), HttpResponse> {
    let expected = match config_utils::get_admin_api_token() {
        Some(token) => token,
        None => {
            return Err(rejected(
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "maintenance endpoints are disabled (no admin token configured)",
            ));
        }
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let presented = match presented {
        Some(token) => token,
        None => {
            return Err(rejected(
                actix_web::http::StatusCode::UNAUTHORIZED,
                "missing admin token",
            ));
        }
    };

    if constant_time::verify_slices_are_equal(presented.as_bytes(), expected.as_bytes()).is_err() {
        tracing::warn!(path = %req.path(), "Rejected request with invalid admin token");
        return Err(rejected(
            actix_web::http::StatusCode::UNAUTHORIZED,
            "invalid admin token",
        ));
    }

    Ok(())
}
