//! vigia-hw — Hardware abstraction for the door actuator link.
//!
//! Provides serial connections to the door controllers, the static
//! door-to-controller partition, and ASCII command framing.

pub mod config;
pub mod gateway;
pub mod serial;

pub use config::{ControllerConfig, GatewayConfig};
pub use gateway::{ActuatorGateway, ControllerStatus, DoorCommand, GatewayError};
pub use serial::{LinkError, SerialLink};
