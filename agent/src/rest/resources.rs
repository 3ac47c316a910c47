//! Probe resource handlers: control parameters and the two streaming
//! directions.
//!
//! Streaming bridges: the core blocks on its queues, axum bodies are
//! async. Extraction runs a `spawn_blocking` pump that forwards queue
//! chunks into a bounded channel wrapped as the response body; the client
//! disconnecting closes the channel, which ends the pump and releases the
//! exclusive lease. Injection reads body frames asynchronously and hands
//! them to a `spawn_blocking` writer that may block on the bounded queue.

use crate::probe::ProbeId;
use crate::rest::error::{bad_request, error_response, not_found};
use crate::rest::{params, AppState};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use log::{debug, warn};
use shared::constants::SUBSYSTEM_NAME;
use shared::wire::ifdk::{IfdkStreamHeader, IFDK_HEADER_BYTES};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CONTENT_TYPE_XML: &str = "text/xml";
const CONTENT_TYPE_IFDK: &str = "application/vnd.ifdk-file";

fn service_instance(kind: &str) -> bool {
    kind == format!("{SUBSYSTEM_NAME}.probe")
}

fn endpoint_instance(kind: &str) -> bool {
    kind == format!("{SUBSYSTEM_NAME}.probe.endpoint")
}

fn parse_probe_id(id: &str) -> Option<ProbeId> {
    id.parse::<u32>().ok().map(ProbeId)
}

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, CONTENT_TYPE_XML)], body).into_response()
}

pub async fn get_control_parameters(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    if service_instance(&kind) {
        if id != "0" {
            return not_found();
        }
        let service = Arc::clone(&state.service);
        let result = tokio::task::spawn_blocking(move || service.get_state()).await;
        match result.expect("get_state never panics") {
            Ok(current) => xml_response(params::format_service_state(current)),
            Err(e) => error_response(&e),
        }
    } else if endpoint_instance(&kind) {
        let Some(probe) = parse_probe_id(&id) else {
            return not_found();
        };
        let service = Arc::clone(&state.service);
        let result = tokio::task::spawn_blocking(move || service.get_endpoint(probe)).await;
        match result.expect("get_endpoint never panics") {
            Ok(config) => xml_response(params::format_endpoint(&config)),
            Err(e) => error_response(&e),
        }
    } else {
        not_found()
    }
}

pub async fn put_control_parameters(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    body: String,
) -> Response {
    if service_instance(&kind) {
        if id != "0" {
            return not_found();
        }
        let target = match params::parse_service_state(&body) {
            Ok(target) => target,
            Err(message) => return bad_request(message),
        };
        let service = Arc::clone(&state.service);
        let result = tokio::task::spawn_blocking(move || service.set_state(target)).await;
        match result.expect("set_state never panics") {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => error_response(&e),
        }
    } else if endpoint_instance(&kind) {
        let Some(probe) = parse_probe_id(&id) else {
            return not_found();
        };
        let config = match params::parse_endpoint(&body) {
            Ok(config) => config,
            Err(message) => return bad_request(message),
        };
        let service = Arc::clone(&state.service);
        let result =
            tokio::task::spawn_blocking(move || service.set_endpoint(probe, config)).await;
        match result.expect("set_endpoint never panics") {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        not_found()
    }
}

/// GET streaming: acquire the exclusive extraction stream and pump it to
/// the client until the session closes the queue or the client leaves.
pub async fn get_streaming(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    if !endpoint_instance(&kind) {
        return not_found();
    }
    let Some(probe) = parse_probe_id(&id) else {
        return not_found();
    };

    let stream = match state.service.acquire_extract_stream(probe) {
        Ok(stream) => stream,
        Err(e) => return error_response(&e),
    };

    let (tx, rx) = mpsc::channel::<Result<Vec<u8>, std::io::Error>>(8);
    tokio::task::spawn_blocking(move || {
        if tx
            .blocking_send(Ok(IfdkStreamHeader::probe().to_bytes()))
            .is_err()
        {
            return;
        }
        while let Some(chunk) = stream.read_chunk() {
            if tx.blocking_send(Ok(chunk)).is_err() {
                // Client went away; dropping `stream` releases the lease.
                debug!("Extraction client of probe {probe} disconnected");
                return;
            }
        }
        debug!("Extraction stream of probe {probe} drained");
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_IFDK)
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .expect("static response parts")
}

/// PUT streaming: consume the client body into the exclusive injection
/// stream. 200 on clean EOF, 500 when the session tore the queue down
/// before the client finished.
pub async fn put_streaming(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    body: Body,
) -> Response {
    if !endpoint_instance(&kind) {
        return not_found();
    }
    let Some(probe) = parse_probe_id(&id) else {
        return not_found();
    };

    let stream = match state.service.acquire_inject_stream(probe) {
        Ok(stream) => stream,
        Err(e) => return error_response(&e),
    };

    let (tx, rx) = mpsc::channel::<Vec<u8>>(8);
    let writer = tokio::task::spawn_blocking(move || {
        let mut rx = rx;
        while let Some(chunk) = rx.blocking_recv() {
            if !stream.write_bytes(&chunk) {
                return false;
            }
        }
        true
    });

    let mut body_stream = body.into_data_stream();
    let mut stream_header = Vec::with_capacity(IFDK_HEADER_BYTES);
    let mut client_error = None;
    while let Some(frame) = body_stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Injection client of probe {probe} aborted: {e}");
                client_error = Some(format!("client aborted: {e}"));
                break;
            }
        };
        let mut data = &frame[..];

        // The stream starts with the fixed IFDK header; consume and check
        // it before any byte reaches the queue.
        if stream_header.len() < IFDK_HEADER_BYTES {
            let take = data.len().min(IFDK_HEADER_BYTES - stream_header.len());
            stream_header.extend_from_slice(&data[..take]);
            data = &data[take..];
            if stream_header.len() == IFDK_HEADER_BYTES {
                if let Err(e) = IfdkStreamHeader::from_bytes(&stream_header) {
                    return bad_request(format!("bad stream header: {e}"));
                }
            }
        }
        if data.is_empty() {
            continue;
        }
        if tx.send(data.to_vec()).await.is_err() {
            break; // writer stopped: queue closed underneath
        }
    }
    drop(tx);

    let completed = writer.await.expect("injection writer never panics");
    if let Some(message) = client_error {
        return (StatusCode::INTERNAL_SERVER_ERROR, message).into_response();
    }
    if stream_header.len() < IFDK_HEADER_BYTES {
        return bad_request("stream ended inside the IFDK header".into());
    }
    if !completed {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "injection stream closed before the client finished".to_string(),
        )
            .into_response();
    }
    StatusCode::OK.into_response()
}
