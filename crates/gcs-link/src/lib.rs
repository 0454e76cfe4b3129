pub mod aggregate;
pub mod commands;
pub mod connection;
pub mod detector;
pub mod heartbeat;
pub mod modes;
pub mod router;
pub mod session;
pub mod store;
pub mod takeoff;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use gcs_proto::telemetry::{Diagnostic, TelemetryState};
pub use session::{Session, TelemetryRepository};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// FCU endpoint. Defaults target a local SITL instance.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// MAVLink ids we announce (GCS side)
    #[serde(default = "default_gcs_system_id")]
    pub gcs_system_id: u8,
    #[serde(default = "default_gcs_component_id")]
    pub gcs_component_id: u8,

    /// Target altitude used by the takeoff-to-hover procedure.
    #[serde(default = "default_takeoff_alt_m")]
    pub takeoff_alt_m: f32,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5762
}
fn default_gcs_system_id() -> u8 {
    200
}
fn default_gcs_component_id() -> u8 {
    1
}
fn default_takeoff_alt_m() -> f32 {
    10.0
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            gcs_system_id: default_gcs_system_id(),
            gcs_component_id: default_gcs_component_id(),
            takeoff_alt_m: default_takeoff_alt_m(),
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.host.trim().is_empty(), "link.host missing");
        anyhow::ensure!(self.port > 0, "link.port invalid");
        anyhow::ensure!(self.gcs_system_id > 0, "link.gcs_system_id must be non-zero");
        anyhow::ensure!(
            self.takeoff_alt_m.is_finite() && self.takeoff_alt_m > 0.0,
            "link.takeoff_alt_m must be a positive altitude"
        );
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("tcpout:{}:{}", self.host, self.port)
    }
}
