//! HTTP façade. The REST layer is glue: it coerces path segments, codes
//! the small control-parameter XML documents, maps error kinds to status
//! codes through one table and bridges the blocking streaming core to
//! axum's async bodies.

mod debug;
mod error;
mod params;
mod resources;
mod server;

use crate::modules::ModuleHandler;
use crate::probe::service::ProbeService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProbeService>,
    pub modules: Arc<ModuleHandler>,
}

pub use server::{router, serve};
