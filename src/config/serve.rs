//! `[serve]` section: the live preview server.

use super::{ConfigError, defaults};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Preview server settings.
///
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # default 127.0.0.1
/// port = 3000            # default 5277
/// port_retries = 5       # next ports tried while the port is taken
/// watch = false          # serve the first build only
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: IpAddr,

    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Ports tried in total, starting at `port`.
    #[serde(default = "defaults::serve::port_retries")]
    #[educe(Default = defaults::serve::port_retries())]
    pub port_retries: u16,

    /// Rebuild affected outputs when sources change.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,
}

impl ServeConfig {
    pub const fn address(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Serve("port must be set, 0 picks no fixed address".into()));
        }
        if self.port_retries == 0 {
            return Err(ConfigError::Serve("port_retries must be at least 1".into()));
        }
        if self.port.checked_add(self.port_retries - 1).is_none() {
            return Err(ConfigError::Serve(format!(
                "port {} with {} retries runs past 65535",
                self.port, self.port_retries
            )));
        }
        Ok(())
    }
}
