//! HTTP front door for the admission controller.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{create_router, AppState, HealthResponse, HitResponse, InitRequest, InitResponse};
