//! Application state for Axum handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::error::Result;
use crate::service::{IdentifierService, LogicService};
use crate::storage::DynStorage;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Storage backend.
    pub storage: Arc<DynStorage>,
    /// Identifier generation service.
    pub identifier_service: Arc<IdentifierService>,
    /// Logic administration service.
    pub logic_service: Arc<LogicService>,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence configuration is invalid.
    pub fn new(
        config: Arc<AppConfig>,
        storage: Arc<DynStorage>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let identifier_service = Arc::new(IdentifierService::new(
            Arc::clone(&storage),
            &config.sequence,
        )?);

        let logic_service = Arc::new(LogicService::new(Arc::clone(&storage)));

        Ok(Self {
            config,
            storage,
            identifier_service,
            logic_service,
            metrics,
        })
    }
}
