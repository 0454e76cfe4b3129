use std::sync::Arc;
use std::time::Duration;

use mavlink::common::{MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};

use crate::store::StateStore;
use crate::transport::Transport;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Our own announcement: ground station, no autopilot, no mode flags.
pub fn self_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

pub struct HeartbeatEmitter {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
}

impl HeartbeatEmitter {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<StateStore>) -> Self {
        Self { transport, store }
    }

    /// One period: send if connected. Returns true if a heartbeat went out.
    pub async fn tick(&self) -> bool {
        if !self.store.is_connected() {
            return false;
        }
        match self.transport.send(self_heartbeat()).await {
            Ok(()) => true,
            Err(e) => {
                self.store.record_failure("send heartbeat", &e);
                false
            }
        }
    }

    /// Never returns; failures do not stop the loop.
    pub async fn run(self) {
        loop {
            self.tick().await;
            tokio::time::sleep(HEARTBEAT_PERIOD).await;
        }
    }
}
