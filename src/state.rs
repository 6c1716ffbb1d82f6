//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::pipeline::Orchestrator;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Registered MySQL environments with their live pools
    pub connections: ConnectionManager,

    /// Pipeline orchestrator
    pub orchestrator: Orchestrator,

    /// Loaded settings (sandbox defaults come from here)
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            connections: ConnectionManager::new(),
            orchestrator: Orchestrator::new(),
            settings,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
