//! Actuator layout configuration.
//!
//! The door space is statically partitioned across controllers; each
//! controller owns a serial device node and a fixed set of doors. The
//! layout is loaded from a TOML file, with a compiled-in default matching
//! the reference installation (two controllers, doors 4–6 and 7–9).

use serde::Deserialize;

fn default_baud() -> u32 {
    9600
}

/// One controller: a serial device and the doors wired to it.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub id: u8,
    pub device: String,
    pub doors: Vec<u8>,
}

/// Full actuator layout.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            controllers: vec![
                ControllerConfig {
                    id: 1,
                    device: "/dev/ttyUSB0".to_string(),
                    doors: vec![4, 5, 6],
                },
                ControllerConfig {
                    id: 2,
                    device: "/dev/ttyUSB1".to_string(),
                    doors: vec![7, 8, 9],
                },
            ],
        }
    }
}

impl GatewayConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_partition() {
        let config = GatewayConfig::default();
        assert_eq!(config.baud, 9600);
        assert_eq!(config.controllers.len(), 2);
        assert_eq!(config.controllers[0].doors, vec![4, 5, 6]);
        assert_eq!(config.controllers[1].doors, vec![7, 8, 9]);
    }

    #[test]
    fn test_parse_toml_layout() {
        let config = GatewayConfig::from_toml(
            r#"
            baud = 19200

            [[controllers]]
            id = 1
            device = "/dev/ttyACM0"
            doors = [4, 5]

            [[controllers]]
            id = 2
            device = "/dev/ttyACM1"
            doors = [6]
            "#,
        )
        .unwrap();

        assert_eq!(config.baud, 19200);
        assert_eq!(config.controllers[0].device, "/dev/ttyACM0");
        assert_eq!(config.controllers[1].doors, vec![6]);
    }

    #[test]
    fn test_baud_defaults_when_missing() {
        let config = GatewayConfig::from_toml(
            r#"
            [[controllers]]
            id = 1
            device = "/dev/ttyUSB0"
            doors = [4]
            "#,
        )
        .unwrap();
        assert_eq!(config.baud, 9600);
    }
}
