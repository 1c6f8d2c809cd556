//! Application state
//!
//! Holds the shared configuration and the live-view server handle passed
//! to every HTTP handler.

use std::sync::Arc;

use crate::liveview::LvServer;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Probe the resolution enumeration and select the largest choice
    pub max_resolution: bool,
    /// Run without a camera attached
    pub dummy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(42839),
            max_resolution: false,
            dummy: false,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Live-view server
    pub lv: Arc<LvServer>,
}
