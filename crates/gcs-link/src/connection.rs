use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::store::StateStore;
use crate::transport::{StreamState, Transport};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the transport lifecycle: connects, watches the stream state and
/// reconnects forever at a fixed interval.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    store: Arc<StateStore>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<StateStore>) -> Self {
        Self { transport, store }
    }

    /// Retry until the transport connects. Every failure is recorded.
    pub async fn connect(&self) {
        loop {
            match self.transport.connect().await {
                Ok(()) => return,
                Err(e) => self.store.record_failure("connect", &e),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Initial connect, then follow the stream state for the life of the
    /// session.
    pub async fn run(self) {
        let mut stream = self.transport.stream_state();
        let mut phase = LinkPhase::Disconnected;
        self.reconnect(&mut phase).await;

        loop {
            let st = *stream.borrow_and_update();
            match st {
                StreamState::Active => {
                    if self.store.set_connected(true) {
                        info!("connection active");
                    }
                }
                StreamState::Inactive if phase == LinkPhase::Connected => {
                    info!("connection inactive, reconnecting");
                    phase = LinkPhase::Disconnected;
                    self.store.reset_link();
                    self.reconnect(&mut phase).await;
                    continue;
                }
                StreamState::Inactive => {}
            }
            if stream.changed().await.is_err() {
                break;
            }
        }
    }

    async fn reconnect(&self, phase: &mut LinkPhase) {
        *phase = LinkPhase::Connecting;
        debug!("link connecting");
        self.connect().await;
        *phase = LinkPhase::Connected;
        debug!("link connected");
    }
}
