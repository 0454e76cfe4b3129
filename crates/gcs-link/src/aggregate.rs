//! Per-message mapping of FCU telemetry into [`TelemetryState`].
//!
//! Each rule runs as its own consumer of the frame router and merges only the
//! fields its message carries. Raw sentinel values ("unknown" on the wire)
//! become `None`:
//!
//! | message             | field            | sentinel      |
//! |---------------------|------------------|---------------|
//! | VFR_HUD             | airspeed, groundspeed | `<= 0`   |
//! | GLOBAL_POSITION_INT | lat, lon         | `i32::MIN`    |
//! | BATTERY_STATUS      | current_battery  | `-1`          |
//! | SYS_STATUS          | voltage_battery  | `0xFFFF`      |
//! | SYS_STATUS          | battery_remaining| `-1`          |
//! | GPS_RAW_INT         | satellites_visible | `0xFF`      |
//! | GPS_RAW_INT         | eph              | `0xFFFF`      |

use std::sync::Arc;

use gcs_proto::telemetry::TelemetryState;
use mavlink::common::{
    MavMessage, MavModeFlag, BATTERY_STATUS_DATA, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA,
    HEARTBEAT_DATA, SYS_STATUS_DATA, VFR_HUD_DATA,
};

use crate::modes::mode_label;
use crate::router::{Frame, FrameSubscription};
use crate::store::StateStore;

/// MAV_SYS_STATUS_PREARM_CHECK sensor bit.
const PREARM_CHECK: u32 = 0x1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    VfrHud,
    GlobalPosition,
    Battery,
    SysStatus,
    GpsRaw,
    Heartbeat,
}

impl Rule {
    pub const ALL: [Rule; 6] = [
        Rule::VfrHud,
        Rule::GlobalPosition,
        Rule::Battery,
        Rule::SysStatus,
        Rule::GpsRaw,
        Rule::Heartbeat,
    ];

    pub fn accepts(self, msg: &MavMessage) -> bool {
        matches!(
            (self, msg),
            (Rule::VfrHud, MavMessage::VFR_HUD(_))
                | (Rule::GlobalPosition, MavMessage::GLOBAL_POSITION_INT(_))
                | (Rule::Battery, MavMessage::BATTERY_STATUS(_))
                | (Rule::SysStatus, MavMessage::SYS_STATUS(_))
                | (Rule::GpsRaw, MavMessage::GPS_RAW_INT(_))
                | (Rule::Heartbeat, MavMessage::HEARTBEAT(_))
        )
    }
}

/// Merge the fields carried by `msg` into `st`. Other messages are ignored.
pub fn apply(st: &mut TelemetryState, msg: &MavMessage) {
    match msg {
        MavMessage::VFR_HUD(m) => apply_vfr_hud(st, m),
        MavMessage::GLOBAL_POSITION_INT(m) => apply_global_position(st, m),
        MavMessage::BATTERY_STATUS(m) => apply_battery(st, m),
        MavMessage::SYS_STATUS(m) => apply_sys_status(st, m),
        MavMessage::GPS_RAW_INT(m) => apply_gps_raw(st, m),
        MavMessage::HEARTBEAT(m) => apply_heartbeat(st, m),
        _ => {}
    }
}

fn apply_vfr_hud(st: &mut TelemetryState, hud: &VFR_HUD_DATA) {
    st.altitude_msl = Some(hud.alt);
    st.airspeed = Some(hud.airspeed).filter(|v| *v > 0.0);
    st.groundspeed = Some(hud.groundspeed).filter(|v| *v > 0.0);
}

fn apply_global_position(st: &mut TelemetryState, gp: &GLOBAL_POSITION_INT_DATA) {
    st.altitude_msl = Some(gp.alt as f32 / 1000.0);
    st.altitude_relative = Some(gp.relative_alt as f32 / 1000.0);
    st.latitude = degrees_e7(gp.lat);
    st.longitude = degrees_e7(gp.lon);
}

fn degrees_e7(raw: i32) -> Option<f64> {
    (raw != i32::MIN).then(|| raw as f64 / 1e7)
}

fn apply_battery(st: &mut TelemetryState, b: &BATTERY_STATUS_DATA) {
    // centiamps
    st.current_a = (b.current_battery != -1).then(|| b.current_battery as f32 / 100.0);
}

fn apply_sys_status(st: &mut TelemetryState, s: &SYS_STATUS_DATA) {
    // millivolts
    st.voltage = (s.voltage_battery != u16::MAX).then(|| s.voltage_battery as f32 / 1000.0);
    st.battery_percent = (s.battery_remaining != -1).then(|| s.battery_remaining as i32);

    if s.onboard_control_sensors_present.bits() & PREARM_CHECK != 0 {
        st.armable = s.onboard_control_sensors_health.bits() & PREARM_CHECK != 0;
    }
}

fn apply_gps_raw(st: &mut TelemetryState, gps: &GPS_RAW_INT_DATA) {
    st.sats = (gps.satellites_visible != u8::MAX).then(|| gps.satellites_visible as i32);
    // cm-scaled HDOP
    st.hdop = (gps.eph != u16::MAX).then(|| gps.eph as f32 / 100.0);
}

fn apply_heartbeat(st: &mut TelemetryState, hb: &HEARTBEAT_DATA) {
    st.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
    st.mode = Some(mode_label(hb.custom_mode));
}

/// Runs one rule against the frame stream, gated on the latched FCU.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<StateStore>,
}

impl Aggregator {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Returns true if the frame was merged.
    pub fn on_frame(&self, rule: Rule, frame: &Frame) -> bool {
        if !rule.accepts(&frame.msg) || !self.store.is_from_fcu(&frame.header) {
            return false;
        }
        self.store.merge(|st| apply(st, &frame.msg));
        true
    }

    pub async fn run(self, rule: Rule, mut frames: FrameSubscription) {
        while let Some(frame) = frames.next().await {
            self.on_frame(rule, &frame);
        }
    }
}
