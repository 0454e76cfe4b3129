use mavlink::{common::MavMessage, MavHeader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Decoded MAVLink message plus the sender's header.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MavHeader,
    pub msg: MavMessage,
}

impl Frame {
    pub fn new(header: MavHeader, msg: MavMessage) -> Self {
        Self { header, msg }
    }

    pub fn name(&self) -> &'static str {
        message_name(&self.msg)
    }
}

const ROUTER_CAPACITY: usize = 256;

/// Fans the single inbound frame sequence out to every subscriber.
///
/// No replay: a subscriber only sees frames published after it subscribed.
#[derive(Debug, Clone)]
pub struct FrameRouter {
    tx: broadcast::Sender<Frame>,
}

impl Default for FrameRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRouter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ROUTER_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> FrameSubscription {
        FrameSubscription { rx: self.tx.subscribe() }
    }

    /// Returns the number of subscribers that will see the frame.
    pub fn publish(&self, frame: Frame) -> usize {
        // Err only means nobody is listening yet.
        self.tx.send(frame).unwrap_or(0)
    }
}

pub struct FrameSubscription {
    rx: broadcast::Receiver<Frame>,
}

impl FrameSubscription {
    /// Next frame in arrival order, or `None` once the router is gone.
    /// A consumer that falls behind skips the frames it missed.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("frame consumer lagged, skipped {} frames", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Raw-frame logging consumer.
pub async fn log_frames(mut frames: FrameSubscription) {
    while let Some(f) = frames.next().await {
        debug!(
            "frame: {} (sysId={}, compId={})",
            f.name(),
            f.header.system_id,
            f.header.component_id
        );
    }
}

pub fn message_name(msg: &MavMessage) -> &'static str {
    match msg {
        MavMessage::HEARTBEAT(_) => "HEARTBEAT",
        MavMessage::VFR_HUD(_) => "VFR_HUD",
        MavMessage::GLOBAL_POSITION_INT(_) => "GLOBAL_POSITION_INT",
        MavMessage::BATTERY_STATUS(_) => "BATTERY_STATUS",
        MavMessage::SYS_STATUS(_) => "SYS_STATUS",
        MavMessage::GPS_RAW_INT(_) => "GPS_RAW_INT",
        MavMessage::COMMAND_LONG(_) => "COMMAND_LONG",
        MavMessage::COMMAND_ACK(_) => "COMMAND_ACK",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fcu_heartbeat, frame};

    #[tokio::test]
    async fn every_subscriber_sees_every_frame() {
        let router = FrameRouter::new();
        let mut a = router.subscribe();
        let mut b = router.subscribe();

        assert_eq!(router.publish(frame(1, 1, fcu_heartbeat())), 2);

        assert_eq!(a.next().await.unwrap().name(), "HEARTBEAT");
        assert_eq!(b.next().await.unwrap().name(), "HEARTBEAT");
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_frames() {
        let router = FrameRouter::new();
        let mut early = router.subscribe();

        router.publish(frame(1, 1, fcu_heartbeat()));
        let mut late = router.subscribe();
        router.publish(frame(7, 1, fcu_heartbeat()));

        assert_eq!(early.next().await.unwrap().header.system_id, 1);
        assert_eq!(early.next().await.unwrap().header.system_id, 7);
        // the first heartbeat is gone for the late subscriber
        assert_eq!(late.next().await.unwrap().header.system_id, 7);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let router = FrameRouter::new();
        assert_eq!(router.publish(frame(1, 1, fcu_heartbeat())), 0);
    }

    #[tokio::test]
    async fn subscription_ends_when_router_dropped() {
        let router = FrameRouter::new();
        let mut sub = router.subscribe();
        drop(router);
        assert!(sub.next().await.is_none());
    }
}
