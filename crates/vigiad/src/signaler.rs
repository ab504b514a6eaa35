//! Bridges the engine's abstract door signals onto the serial gateway.

use async_trait::async_trait;
use std::sync::Arc;
use vigia_core::{BoxError, DoorId, DoorSignal, DoorSignaler};
use vigia_hw::{ActuatorGateway, DoorCommand};

pub struct GatewaySignaler {
    gateway: Arc<ActuatorGateway>,
}

impl GatewaySignaler {
    pub fn new(gateway: Arc<ActuatorGateway>) -> Self {
        Self { gateway }
    }
}

fn command_for(signal: DoorSignal) -> DoorCommand {
    match signal {
        DoorSignal::Green => DoorCommand::Green,
        DoorSignal::Red => DoorCommand::Red,
        DoorSignal::Blink => DoorCommand::Blink,
        DoorSignal::Alert => DoorCommand::Alert,
    }
}

#[async_trait]
impl DoorSignaler for GatewaySignaler {
    async fn signal(&self, door: DoorId, signal: DoorSignal) -> Result<(), BoxError> {
        let gateway = Arc::clone(&self.gateway);
        let command = command_for(signal);
        // Serial writes (and any reconnect they trigger) block; keep them
        // off the async runtime.
        tokio::task::spawn_blocking(move || gateway.send(door, command))
            .await
            .map_err(|e| Box::new(e) as BoxError)?
            .map_err(|e| Box::new(e) as BoxError)
    }
}
