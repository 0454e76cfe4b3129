use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Snapshot of vehicle state as last reported by the FCU.
///
/// Replaced wholesale on every update. Optional fields stay `None` until a
/// message carrying them arrives with a value other than the protocol's
/// "unknown" sentinel. Fields come from different messages and may have
/// been refreshed at different times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub connected: bool,
    pub fcu_detected: bool,

    // Vehicle status
    pub mode: Option<String>,
    pub armed: bool,
    pub armable: bool,

    // Altitude (m)
    pub altitude_msl: Option<f32>,
    pub altitude_relative: Option<f32>,

    // Speeds (m/s); zero readings are reported as None
    pub airspeed: Option<f32>,
    pub groundspeed: Option<f32>,

    // Battery
    pub voltage: Option<f32>,
    pub battery_percent: Option<i32>,
    pub current_a: Option<f32>,

    // GNSS
    pub sats: Option<i32>,
    pub hdop: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Last observed failure. Overwritten by each new failure, never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Running count of recorded failures, starting at 1.
    pub seq: u64,
    pub cause: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}
