use std::sync::Arc;

use mavlink::common::{MavMessage, MavType};
use tracing::info;

use crate::commands::CommandIssuer;
use crate::router::{Frame, FrameSubscription};
use crate::store::{RemoteIdentity, StateStore};

/// Stream rates requested from the FCU once it is detected:
/// (message id, name, Hz).
pub const TELEMETRY_RATES: [(u32, &str, f32); 5] = [
    (1, "SYS_STATUS", 1.0),
    (24, "GPS_RAW_INT", 1.0),
    (33, "GLOBAL_POSITION_INT", 5.0),
    (74, "VFR_HUD", 5.0),
    (147, "BATTERY_STATUS", 1.0),
];

/// Heartbeat from anything that is not a ground station.
pub fn is_vehicle_heartbeat(frame: &Frame) -> bool {
    matches!(&frame.msg, MavMessage::HEARTBEAT(hb) if hb.mavtype != MavType::MAV_TYPE_GCS)
}

/// Latches the first vehicle heartbeat of a session as the FCU and configures
/// its telemetry streams.
pub struct FcuDetector {
    store: Arc<StateStore>,
    commands: CommandIssuer,
}

impl FcuDetector {
    pub fn new(store: Arc<StateStore>, commands: CommandIssuer) -> Self {
        Self { store, commands }
    }

    /// Returns true if this frame caused the latch.
    pub async fn on_frame(&self, frame: &Frame) -> bool {
        if !is_vehicle_heartbeat(frame) {
            return false;
        }
        let id = RemoteIdentity::of(&frame.header);
        if !self.store.latch_identity(id) {
            return false;
        }
        info!("FCU detected sysId={} compId={}", id.system_id, id.component_id);

        for (msg_id, name, hz) in TELEMETRY_RATES {
            info!("FC: requesting {} at {} Hz", name, hz);
            self.commands.set_message_rate(msg_id, hz).await;
        }
        true
    }

    pub async fn run(self, mut frames: FrameSubscription) {
        while let Some(frame) = frames.next().await {
            self.on_frame(&frame).await;
        }
    }
}
