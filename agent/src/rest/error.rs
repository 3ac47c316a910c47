//! The single table mapping probe error kinds to HTTP statuses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::errors::ProbeError;

pub fn status_for(error: &ProbeError) -> StatusCode {
    match error {
        ProbeError::InvalidProbeId { .. } => StatusCode::NOT_FOUND,
        // Caller-usage error: the request is well-formed but not legal in
        // the service's current state.
        ProbeError::WrongState { .. } => StatusCode::BAD_REQUEST,
        ProbeError::Busy { .. } => StatusCode::LOCKED,
        ProbeError::IllegalTransition { .. }
        | ProbeError::Inconsistent { .. }
        | ProbeError::InvalidConfig(_)
        | ProbeError::SampleSize { .. }
        | ProbeError::WorkerSpawn(_)
        | ProbeError::RingFault(_)
        | ProbeError::Framing(_)
        | ProbeError::Driver(_)
        | ProbeError::Module(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: &ProbeError) -> Response {
    (status_for(error), error.to_string()).into_response()
}

pub fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

pub fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}
