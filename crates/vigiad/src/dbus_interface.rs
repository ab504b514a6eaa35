use std::sync::Arc;
use vigia_core::Orchestrator;
use vigia_hw::ActuatorGateway;
use vigia_store::AccessStore;
use zbus::interface;

/// D-Bus interface for the Vigía access control daemon.
///
/// Bus name: org.vigia.Access1
/// Object path: /org/vigia/Access1
pub struct AccessService {
    pub orchestrator: Arc<Orchestrator>,
    pub store: AccessStore,
    pub gateway: Arc<ActuatorGateway>,
}

#[interface(name = "org.vigia.Access1")]
impl AccessService {
    /// Validate one captured frame from a device origin. Returns the
    /// decision as JSON; infrastructure faults map to a D-Bus error.
    async fn validate(&self, frame: Vec<u8>, origin: String) -> zbus::fdo::Result<String> {
        tracing::debug!(origin = %origin, bytes = frame.len(), "validate requested");

        let decision = self
            .orchestrator
            .validate(&frame, &origin)
            .await
            .map_err(|e| {
                tracing::error!(origin = %origin, error = %e, "validation failed");
                zbus::fdo::Error::Failed(e.to_string())
            })?;

        serde_json::to_string(&decision).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Daemon status: controller availability, tracker occupancy, and
    /// today's audit counters.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let summary = self
            .store
            .daily_summary()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        let controllers: Vec<_> = self
            .gateway
            .status()
            .into_iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "device": c.device,
                    "connected": c.connected,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "tracked_keys": self.orchestrator.tracker().tracked_keys(),
            "controllers": controllers,
            "today": summary,
        })
        .to_string())
    }
}
