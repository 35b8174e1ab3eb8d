use std::sync::Arc;

use events::EventBus;
use orchestrator::{Capabilities, PlanService};

use crate::config::ServiceConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: PlanService,
    pub event_bus: EventBus,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// HTTP capabilities for every configured endpoint.
    pub fn new(config: ServiceConfig) -> Self {
        let capabilities = Capabilities::from_endpoints(&config.endpoints, reqwest::Client::new());
        Self::with_capabilities(config, capabilities)
    }

    pub fn with_capabilities(config: ServiceConfig, capabilities: Capabilities) -> Self {
        let event_bus = EventBus::new();
        let service = PlanService::new(capabilities, config.pipeline.clone())
            .with_event_bus(event_bus.clone());

        tracing::info!(
            sources = config.endpoints.sources.len(),
            max_retries = config.pipeline.max_retries,
            "Plan service ready"
        );

        Self {
            service,
            event_bus,
            config: Arc::new(config),
        }
    }
}
