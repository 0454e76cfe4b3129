use std::sync::Arc;

use mavlink::common::{MavCmd, MavMessage, COMMAND_LONG_DATA};
use tracing::info;

use crate::modes::FlightMode;
use crate::store::StateStore;
use crate::transport::Transport;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, DO_SET_MODE param1.
const CUSTOM_MODE_ENABLED: f32 = 1.0;

/// Fire-and-forget command sender. Nothing waits for COMMAND_ACK and nothing
/// is retried; a failed send only lands in the diagnostic slot.
#[derive(Clone)]
pub struct CommandIssuer {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
}

impl CommandIssuer {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<StateStore>) -> Self {
        Self { transport, store }
    }

    pub async fn arm(&self) {
        info!("FC: sending ARM");
        let params = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        self.send_command("arm", MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, params).await;
    }

    pub async fn disarm(&self) {
        info!("FC: sending DISARM");
        self.send_command("disarm", MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7]).await;
    }

    pub async fn change_mode(&self, mode: FlightMode) {
        info!("FC: sending mode change to {}", mode);
        let params = [CUSTOM_MODE_ENABLED, mode.number() as f32, 0.0, 0.0, 0.0, 0.0, 0.0];
        self.send_command("change mode", MavCmd::MAV_CMD_DO_SET_MODE, params).await;
    }

    pub async fn takeoff(&self, target_alt_m: f32) {
        info!("FC: sending TAKEOFF to {:.1} m", target_alt_m);
        let params = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, target_alt_m];
        self.send_command("takeoff", MavCmd::MAV_CMD_NAV_TAKEOFF, params).await;
    }

    pub async fn land(&self) {
        info!("FC: sending LAND");
        self.send_command("land", MavCmd::MAV_CMD_NAV_LAND, [0.0; 7]).await;
    }

    /// Ask the FCU to stream `message_id` at `hz` (0 or less stops it).
    pub async fn set_message_rate(&self, message_id: u32, hz: f32) {
        let params = [message_id as f32, interval_us(hz), 0.0, 0.0, 0.0, 0.0, 0.0];
        self.send_command("set message interval", MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, params)
            .await;
    }

    fn command(&self, command: MavCmd, p: [f32; 7]) -> COMMAND_LONG_DATA {
        let (target_system, target_component) = self
            .store
            .identity()
            .map(|id| (id.system_id, id.component_id))
            .unwrap_or((0, 0));
        COMMAND_LONG_DATA {
            target_system,
            target_component,
            command,
            confirmation: 0,
            param1: p[0],
            param2: p[1],
            param3: p[2],
            param4: p[3],
            param5: p[4],
            param6: p[5],
            param7: p[6],
        }
    }

    async fn send_command(&self, what: &str, command: MavCmd, params: [f32; 7]) {
        let cmd = self.command(command, params);
        if let Err(e) = self.transport.send(MavMessage::COMMAND_LONG(cmd)).await {
            self.store.record_failure(&format!("send {}", what), &e);
        }
    }
}

/// SET_MESSAGE_INTERVAL param2: microseconds between messages, 0 to stop.
pub fn interval_us(hz: f32) -> f32 {
    if hz <= 0.0 {
        0.0
    } else {
        1_000_000.0 / hz
    }
}
