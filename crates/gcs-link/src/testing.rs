//! Scripted transport and message builders for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavType, BATTERY_STATUS_DATA, COMMAND_LONG_DATA,
    GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA, SYS_STATUS_DATA, VFR_HUD_DATA,
};
use mavlink::MavHeader;
use tokio::sync::watch;

use crate::router::{Frame, FrameRouter};
use crate::transport::{LinkError, StreamState, Transport};

pub(crate) struct MockTransport {
    router: FrameRouter,
    state: watch::Sender<StreamState>,
    fail_connects: AtomicUsize,
    connect_attempts: AtomicUsize,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<MavMessage>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StreamState::Inactive);
        Self {
            router: FrameRouter::new(),
            state,
            fail_connects: AtomicUsize::new(0),
            connect_attempts: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// The next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Simulate the peer going away.
    pub fn drop_link(&self) {
        self.state.send_replace(StreamState::Inactive);
    }

    pub fn inject(&self, frame: Frame) {
        self.router.publish(frame);
    }

    pub fn sent(&self) -> Vec<MavMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_commands(&self) -> Vec<COMMAND_LONG_DATA> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                MavMessage::COMMAND_LONG(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn sent_heartbeats(&self) -> usize {
        self.sent().iter().filter(|m| matches!(m, MavMessage::HEARTBEAT(_))).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), LinkError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_connects.store(pending - 1, Ordering::SeqCst);
            return Err(LinkError::Connect {
                addr: "mock".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.state.send_replace(StreamState::Active);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.send_replace(StreamState::Inactive);
    }

    fn stream_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn frames(&self) -> &FrameRouter {
        &self.router
    }

    async fn send(&self, msg: MavMessage) -> Result<(), LinkError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Send { msg: "mock", reason: "broken pipe".into() });
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

pub(crate) fn frame(system_id: u8, component_id: u8, msg: MavMessage) -> Frame {
    Frame::new(MavHeader { system_id, component_id, sequence: 0 }, msg)
}

pub(crate) fn fcu_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        ..Default::default()
    })
}

pub(crate) fn gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        ..Default::default()
    })
}

pub(crate) fn vfr_hud(airspeed: f32, groundspeed: f32, alt: f32) -> MavMessage {
    MavMessage::VFR_HUD(VFR_HUD_DATA { airspeed, groundspeed, alt, ..Default::default() })
}

pub(crate) fn global_position(lat: i32, lon: i32, alt_mm: i32, relative_alt_mm: i32) -> MavMessage {
    MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        lat,
        lon,
        alt: alt_mm,
        relative_alt: relative_alt_mm,
        ..Default::default()
    })
}

pub(crate) fn battery_status(current_battery: i16) -> MavMessage {
    MavMessage::BATTERY_STATUS(BATTERY_STATUS_DATA { current_battery, ..Default::default() })
}

pub(crate) fn sys_status(voltage_battery: u16, battery_remaining: i8) -> MavMessage {
    MavMessage::SYS_STATUS(SYS_STATUS_DATA {
        voltage_battery,
        battery_remaining,
        ..Default::default()
    })
}

pub(crate) fn gps_raw(satellites_visible: u8, eph: u16) -> MavMessage {
    MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA { satellites_visible, eph, ..Default::default() })
}
