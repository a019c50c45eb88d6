//! Correlation id middleware.
//!
//! Every request gets a correlation identifier: taken from a known header
//! when it passes validation, freshly generated otherwise. The request
//! always proceeds. The id is stored in request extensions for handlers
//! and echoed on the response so callers can link logs across services.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use agentry_core::correlation::{CorrelationId, ACCEPTED_HEADERS, CORRELATION_HEADER};

pub async fn propagate(mut request: Request, next: Next) -> Response {
    let supplied = ACCEPTED_HEADERS
        .iter()
        .find_map(|name| request.headers().get(*name))
        .and_then(|value| value.to_str().ok());
    let correlation = CorrelationId::accept_or_generate(supplied);

    request.extensions_mut().insert(correlation.clone());

    let mut response = next.run(request).await;
    // Accepted ids are ASCII-restricted, so this conversion cannot fail.
    if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
