//! Router assembly and the serving loop.

use crate::rest::{debug, resources, AppState};
use axum::routing::get;
use axum::Router;
use log::info;
use std::net::{Ipv4Addr, SocketAddr};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/instance/{kind}/{id}/control_parameters",
            get(resources::get_control_parameters).put(resources::put_control_parameters),
        )
        .route(
            "/instance/{kind}/{id}/streaming",
            get(resources::get_streaming).put(resources::put_streaming),
        )
        .route("/internal/modules", get(debug::internal_modules))
        .route("/internal/probes", get(debug::internal_probes))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("REST server listening on {address}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
}
