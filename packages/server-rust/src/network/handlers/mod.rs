//! HTTP handler definitions for the domain directory server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod directory;
pub mod health;

pub use directory::{child_handler, list_handler, perform_handler, status_for};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::render::ContentNegotiator;
use crate::service::DomainDirectory;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The directory resource every route under `directory_path` serves.
    pub directory: Arc<DomainDirectory>,
    /// Picks structured or HTML responses per request.
    pub negotiator: Arc<dyn ContentNegotiator>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, directory path).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
