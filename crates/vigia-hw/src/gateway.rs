//! Door actuator gateway: logical door to controller channel to framed
//! command.
//!
//! Commands are best-effort. A controller that cannot be reached is marked
//! down and retried with backoff on later sends; callers log the failure
//! and move on. The gateway never blocks an access decision on hardware.

use crate::config::{ControllerConfig, GatewayConfig};
use crate::serial::{LinkError, SerialLink};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Command vocabulary understood by the controller firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    /// Grant: open the door.
    Green,
    /// Deny.
    Red,
    /// Retry / ambiguous capture.
    Blink,
    /// Escalation.
    Alert,
}

impl DoorCommand {
    /// Wire word as the firmware expects it. The vocabulary is Spanish for
    /// historical reasons; it is part of the device protocol, not a
    /// presentation concern.
    pub fn wire_word(self) -> &'static str {
        match self {
            DoorCommand::Green => "verde",
            DoorCommand::Red => "rojo",
            DoorCommand::Blink => "parpadear",
            DoorCommand::Alert => "alerta",
        }
    }

    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "verde" => Some(DoorCommand::Green),
            "rojo" => Some(DoorCommand::Red),
            "parpadear" => Some(DoorCommand::Blink),
            "alerta" => Some(DoorCommand::Alert),
            _ => None,
        }
    }

    /// Frame the command for one door: `"<word><door>\n"` in ASCII.
    pub fn frame(self, door: u8) -> String {
        format!("{}{}\n", self.wire_word(), door)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("door {0} is outside every configured partition")]
    UnknownDoor(u8),
    #[error("unknown door command {0:?}")]
    UnknownCommand(String),
    #[error("controller {0} unavailable")]
    ControllerUnavailable(u8),
    #[error("write to controller {id} failed: {source}")]
    WriteFailed {
        id: u8,
        #[source]
        source: LinkError,
    },
}

/// Retry schedule for a downed controller: wait, then double up to a cap.
struct Backoff {
    delay: Duration,
    retry_at: Instant,
}

impl Backoff {
    fn new(now: Instant) -> Self {
        Self {
            delay: INITIAL_RETRY_DELAY,
            retry_at: now + INITIAL_RETRY_DELAY,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        now >= self.retry_at
    }

    fn extend(&mut self, now: Instant) {
        self.delay = (self.delay * 2).min(MAX_RETRY_DELAY);
        self.retry_at = now + self.delay;
    }
}

enum LinkState {
    Up(SerialLink),
    Down(Backoff),
}

struct Controller {
    cfg: ControllerConfig,
    state: Mutex<LinkState>,
}

/// Snapshot of one controller's availability, for status reporting.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub id: u8,
    pub device: String,
    pub connected: bool,
}

/// Holds one persistent link per configured controller.
pub struct ActuatorGateway {
    baud: u32,
    controllers: Vec<Controller>,
}

impl ActuatorGateway {
    /// Open every configured controller once. A controller that fails to
    /// open starts down and is retried on demand; hardware faults never
    /// fail startup.
    pub fn open(config: GatewayConfig) -> Self {
        let baud = config.baud;
        let controllers = config
            .controllers
            .into_iter()
            .map(|cfg| {
                let state = match SerialLink::open(&cfg.device, baud) {
                    Ok(link) => {
                        tracing::info!(
                            controller = cfg.id,
                            device = %cfg.device,
                            doors = ?cfg.doors,
                            "controller connected"
                        );
                        LinkState::Up(link)
                    }
                    Err(e) => {
                        tracing::warn!(
                            controller = cfg.id,
                            device = %cfg.device,
                            error = %e,
                            "controller offline at startup"
                        );
                        LinkState::Down(Backoff::new(Instant::now()))
                    }
                };
                Controller {
                    cfg,
                    state: Mutex::new(state),
                }
            })
            .collect();

        Self { baud, controllers }
    }

    /// Send one command to the controller owning the door.
    ///
    /// Writes to one controller are serialized by its lock; the lock also
    /// covers reconnect attempts, so command bytes never interleave.
    pub fn send(&self, door: u8, command: DoorCommand) -> Result<(), GatewayError> {
        let Some(controller) = self
            .controllers
            .iter()
            .find(|c| c.cfg.doors.contains(&door))
        else {
            tracing::warn!(door, "door outside every configured partition");
            return Err(GatewayError::UnknownDoor(door));
        };

        let id = controller.cfg.id;
        let frame = command.frame(door);
        let mut state = controller.state.lock();

        if let LinkState::Down(backoff) = &mut *state {
            if !backoff.ready(Instant::now()) {
                return Err(GatewayError::ControllerUnavailable(id));
            }
            match SerialLink::open(&controller.cfg.device, self.baud) {
                Ok(link) => {
                    tracing::info!(controller = id, "controller reconnected");
                    *state = LinkState::Up(link);
                }
                Err(e) => {
                    tracing::warn!(controller = id, error = %e, "reconnect failed");
                    backoff.extend(Instant::now());
                    return Err(GatewayError::ControllerUnavailable(id));
                }
            }
        }

        let LinkState::Up(link) = &mut *state else {
            return Err(GatewayError::ControllerUnavailable(id));
        };
        match link.send(frame.as_bytes()) {
            Ok(()) => {
                tracing::debug!(controller = id, command = frame.trim_end(), "command sent");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    controller = id,
                    error = %source,
                    "write failed; marking controller down"
                );
                *state = LinkState::Down(Backoff::new(Instant::now()));
                Err(GatewayError::WriteFailed { id, source })
            }
        }
    }

    /// Parse-and-send path for operator tooling. Rejects unknown words
    /// before any controller is touched.
    pub fn send_word(&self, door: u8, word: &str) -> Result<(), GatewayError> {
        let command = DoorCommand::parse(word)
            .ok_or_else(|| GatewayError::UnknownCommand(word.to_string()))?;
        self.send(door, command)
    }

    /// Availability snapshot of every controller.
    pub fn status(&self) -> Vec<ControllerStatus> {
        self.controllers
            .iter()
            .map(|c| ControllerStatus {
                id: c.cfg.id,
                device: c.cfg.device.clone(),
                connected: matches!(&*c.state.lock(), LinkState::Up(_)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_gateway() -> ActuatorGateway {
        // Device nodes that cannot exist, so every controller starts down.
        ActuatorGateway::open(GatewayConfig {
            baud: 9600,
            controllers: vec![
                ControllerConfig {
                    id: 1,
                    device: "/dev/vigia-test-a".to_string(),
                    doors: vec![4, 5, 6],
                },
                ControllerConfig {
                    id: 2,
                    device: "/dev/vigia-test-b".to_string(),
                    doors: vec![7, 8, 9],
                },
            ],
        })
    }

    #[test]
    fn test_command_framing() {
        assert_eq!(DoorCommand::Green.frame(4), "verde4\n");
        assert_eq!(DoorCommand::Red.frame(5), "rojo5\n");
        assert_eq!(DoorCommand::Blink.frame(6), "parpadear6\n");
        assert_eq!(DoorCommand::Alert.frame(9), "alerta9\n");
    }

    #[test]
    fn test_command_words_roundtrip() {
        for command in [
            DoorCommand::Green,
            DoorCommand::Red,
            DoorCommand::Blink,
            DoorCommand::Alert,
        ] {
            assert_eq!(DoorCommand::parse(command.wire_word()), Some(command));
        }
        assert_eq!(DoorCommand::parse("morado"), None);
    }

    #[test]
    fn test_out_of_partition_door_rejected() {
        let gateway = offline_gateway();
        assert!(matches!(
            gateway.send(3, DoorCommand::Green),
            Err(GatewayError::UnknownDoor(3))
        ));
        assert!(matches!(
            gateway.send(10, DoorCommand::Red),
            Err(GatewayError::UnknownDoor(10))
        ));
    }

    #[test]
    fn test_unknown_word_rejected_before_transmission() {
        let gateway = offline_gateway();
        assert!(matches!(
            gateway.send_word(4, "morado"),
            Err(GatewayError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_downed_controller_is_a_quiet_failure() {
        let gateway = offline_gateway();
        assert!(matches!(
            gateway.send(4, DoorCommand::Green),
            Err(GatewayError::ControllerUnavailable(1))
        ));
        assert!(matches!(
            gateway.send(7, DoorCommand::Green),
            Err(GatewayError::ControllerUnavailable(2))
        ));

        let status = gateway.status();
        assert!(status.iter().all(|c| !c.connected));
    }

    #[test]
    fn test_backoff_schedule_doubles_to_cap() {
        let t0 = Instant::now();
        let mut backoff = Backoff::new(t0);

        assert!(!backoff.ready(t0));
        assert!(backoff.ready(t0 + INITIAL_RETRY_DELAY));

        backoff.extend(t0);
        assert_eq!(backoff.delay, INITIAL_RETRY_DELAY * 2);
        assert!(!backoff.ready(t0 + INITIAL_RETRY_DELAY * 2 - Duration::from_millis(1)));
        assert!(backoff.ready(t0 + INITIAL_RETRY_DELAY * 2));

        for _ in 0..10 {
            backoff.extend(t0);
        }
        assert_eq!(backoff.delay, MAX_RETRY_DELAY);
    }
}
