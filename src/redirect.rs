//! Redirect response helpers.

use http::StatusCode;
use http::header::LOCATION;

use crate::body::GatewayBody;
use crate::types::Response;

/// 308 Permanent Redirect, used for the HTTP → HTTPS upgrade.
pub fn permanent(location: impl Into<String>) -> Response {
    let location: String = location.into();
    hyper::Response::builder()
        .status(StatusCode::PERMANENT_REDIRECT)
        .header(LOCATION, location)
        .body(GatewayBody::empty())
        .expect("static redirect response")
}
