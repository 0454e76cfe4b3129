use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mavlink::{
    common::MavMessage, error::MessageReadError, MavConnection, MavHeader, MavlinkVersion,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::router::{message_name, Frame, FrameRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Active,
    Inactive,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("connect {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not connected")]
    NotConnected,
    #[error("send {msg}: {reason}")]
    Send { msg: &'static str, reason: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte stream plus MAVLink codec. Inbound frames are published into
/// [`Transport::frames`]; outbound messages get our header stamped on them.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), LinkError>;
    async fn disconnect(&self);
    fn stream_state(&self) -> watch::Receiver<StreamState>;
    fn frames(&self) -> &FrameRouter;
    async fn send(&self, msg: MavMessage) -> Result<(), LinkError>;
}

type SharedConn = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// MAVLink v2 over a TCP client connection.
pub struct MavTcpTransport {
    host: String,
    port: u16,
    address: String,
    system_id: u8,
    component_id: u8,
    conn: Mutex<Option<SharedConn>>,
    // bumped on every connect/disconnect so stale reader threads go quiet
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<StreamState>>,
    router: FrameRouter,
}

impl MavTcpTransport {
    pub fn new(host: impl Into<String>, port: u16, system_id: u8, component_id: u8) -> Self {
        let host = host.into();
        let (state, _) = watch::channel(StreamState::Inactive);
        Self {
            address: format!("tcpout:{}:{}", host, port),
            host,
            port,
            system_id,
            component_id,
            conn: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            router: FrameRouter::new(),
        }
    }

    /// mavlink's tcpout panics on a failed lookup, so resolve here first.
    async fn resolve(&self) -> Result<std::net::SocketAddr, LinkError> {
        let connect_err =
            |source: std::io::Error| LinkError::Connect { addr: self.address.clone(), source };
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| {
                connect_err(std::io::Error::new(ErrorKind::NotFound, "host resolved to no address"))
            })
    }

    fn current(&self) -> Option<SharedConn> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn spawn_reader(&self, conn: SharedConn, generation: u64) -> Result<(), LinkError> {
        let router = self.router.clone();
        let state = self.state.clone();
        let live = self.generation.clone();

        // mavlink recv blocks; keep it off the async runtime.
        std::thread::Builder::new()
            .name("mav-rx".to_string())
            .spawn(move || loop {
                match conn.recv() {
                    Ok((hdr, msg)) => {
                        if live.load(Ordering::Acquire) != generation {
                            break;
                        }
                        router.publish(Frame::new(hdr, msg));
                    }
                    Err(MessageReadError::Parse(e)) => {
                        debug!("mavlink parse error skipped: {:?}", e);
                    }
                    // tcpout reads time out every 100 ms; a quiet peer is not a dead one
                    Err(MessageReadError::Io(e))
                        if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                    {
                        if live.load(Ordering::Acquire) != generation {
                            break;
                        }
                    }
                    Err(MessageReadError::Io(e)) => {
                        if live.load(Ordering::Acquire) == generation {
                            warn!("mavlink read failed: {}", e);
                            state.send_replace(StreamState::Inactive);
                        }
                        break;
                    }
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl Transport for MavTcpTransport {
    async fn connect(&self) -> Result<(), LinkError> {
        let peer = self.resolve().await?;
        let addr = format!("tcpout:{}", peer);
        let opened = tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&addr))
            .await
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        let mut conn = opened.map_err(|source| LinkError::Connect {
            addr: self.address.clone(),
            source,
        })?;
        conn.set_protocol_version(MavlinkVersion::V2);
        let conn: SharedConn = Arc::from(conn);

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.conn.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn.clone());
        // Active before the reader starts, so an immediate EOF still lands as Inactive
        self.state.send_replace(StreamState::Active);
        if let Err(e) = self.spawn_reader(conn, generation) {
            self.disconnect().await;
            return Err(e);
        }

        info!("mavlink connected {} ({})", self.address, peer);
        Ok(())
    }

    async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        // The reader thread holds the last reference and exits at its next
        // read timeout.
        let had = self.conn.lock().unwrap_or_else(|e| e.into_inner()).take().is_some();
        if had {
            info!("mavlink disconnected {}", self.address);
        }
        self.state.send_replace(StreamState::Inactive);
    }

    fn stream_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn frames(&self) -> &FrameRouter {
        &self.router
    }

    async fn send(&self, msg: MavMessage) -> Result<(), LinkError> {
        let conn = self.current().ok_or(LinkError::NotConnected)?;
        // the connection stamps its own sequence number
        let hdr = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: 0,
        };
        let name = message_name(&msg);
        tokio::task::spawn_blocking(move || conn.send(&hdr, &msg))
            .await
            .map_err(|e| LinkError::Send { msg: name, reason: e.to_string() })?
            .map_err(|e| LinkError::Send { msg: name, reason: format!("{:?}", e) })?;
        Ok(())
    }
}
