//! `[live]` section configuration.
//!
//! ```toml
//! [live]
//! enable = true
//! interface = "127.0.0.1"
//! port = 35729                # Tries the next ports when taken
//! ```

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Live status channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Serve the WebSocket status channel.
    pub enable: bool,

    /// Network interface to bind.
    pub interface: IpAddr,

    /// First port to try.
    pub port: u16,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enable: true,
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 35729,
        }
    }
}
