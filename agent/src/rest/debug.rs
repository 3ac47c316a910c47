//! Internal plain-text resources for bring-up: what the firmware reports
//! and what the probe service is doing right now.

use crate::rest::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt::Write;
use std::sync::Arc;

pub async fn internal_modules(State(state): State<AppState>) -> Response {
    let modules = Arc::clone(&state.modules);
    let result = tokio::task::spawn_blocking(move || modules.get_module_entries()).await;
    match result.expect("get_module_entries never panics") {
        Ok(entries) => {
            let mut out = String::new();
            let _ = writeln!(out, "{} module entries", entries.len());
            for entry in entries {
                let _ = writeln!(
                    out,
                    "{:5}  {:8}  uuid {}  instances {}",
                    entry.module_id,
                    entry.name_str(),
                    hex(&entry.uuid),
                    entry.instance_max_count,
                );
            }
            out.into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn internal_probes(State(state): State<AppState>) -> Response {
    let service = &state.service;
    let mut out = String::new();
    let _ = writeln!(out, "state: {} (cached)", service.cached_state().name());
    let _ = writeln!(out, "dropped packets: {}", service.dropped_packet_count());
    for (index, endpoint) in service.endpoints().iter().enumerate() {
        let _ = writeln!(
            out,
            "endpoint {index}: {} point {} purpose {}",
            if endpoint.enabled { "enabled" } else { "disabled" },
            endpoint.point,
            endpoint.purpose.name(),
        );
    }
    out.into_response()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
