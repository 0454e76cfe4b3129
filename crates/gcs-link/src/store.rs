use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use gcs_proto::telemetry::{Diagnostic, TelemetryState};
use mavlink::MavHeader;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::warn;

/// System/component id pair of the detected FCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

impl RemoteIdentity {
    pub fn of(hdr: &MavHeader) -> Self {
        Self { system_id: hdr.system_id, component_id: hdr.component_id }
    }

    pub fn matches(&self, hdr: &MavHeader) -> bool {
        self.system_id == hdr.system_id && self.component_id == hdr.component_id
    }
}

/// Published telemetry snapshot plus the FCU identity and the last-failure slot.
///
/// Every write goes through the watch sender, so concurrent merges are
/// serialized and the last write wins for the fields it touches.
/// `fcu_detected` is only ever changed while holding the identity lock, which
/// keeps it in step with [`RemoteIdentity`].
pub struct StateStore {
    state: watch::Sender<TelemetryState>,
    identity: Mutex<Option<RemoteIdentity>>,
    diag: watch::Sender<Option<Diagnostic>>,
    failures: AtomicU64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TelemetryState::default());
        let (diag, _) = watch::channel(None);
        Self { state, identity: Mutex::new(None), diag, failures: AtomicU64::new(0) }
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> TelemetryState {
        self.state.borrow().clone()
    }

    pub fn diagnostics(&self) -> watch::Receiver<Option<Diagnostic>> {
        self.diag.subscribe()
    }

    pub fn last_failure(&self) -> Option<Diagnostic> {
        self.diag.borrow().clone()
    }

    /// Overwrite the diagnostic slot with `what: err`.
    pub fn record_failure(&self, what: &str, err: &dyn Display) {
        let seq = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        let cause = format!("{}: {:#}", what, err);
        warn!("{}", cause);
        self.diag.send_replace(Some(Diagnostic {
            seq,
            cause,
            at: OffsetDateTime::now_utc(),
        }));
    }

    /// Read-modify-write of the current snapshot.
    pub fn merge(&self, f: impl FnOnce(&mut TelemetryState)) {
        self.state.send_modify(f);
    }

    /// Returns true if the flag actually changed.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.state.send_if_modified(|st| {
            if st.connected == connected {
                return false;
            }
            st.connected = connected;
            true
        })
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn identity(&self) -> Option<RemoteIdentity> {
        *self.identity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Latch `id` as the FCU unless one is already latched. Returns true only
    /// for the call that performed the latch.
    pub fn latch_identity(&self, id: RemoteIdentity) -> bool {
        let mut slot = self.identity.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(id);
        self.state.send_modify(|st| st.fcu_detected = true);
        true
    }

    /// True when an FCU is latched and `hdr` comes from exactly that system
    /// and component.
    pub fn is_from_fcu(&self, hdr: &MavHeader) -> bool {
        self.identity().map(|id| id.matches(hdr)).unwrap_or(false)
    }

    /// Connection lost: drop the FCU identity and the link flags. Telemetry
    /// fields are kept as last reported.
    pub fn reset_link(&self) {
        let mut slot = self.identity.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
        self.state.send_modify(|st| {
            st.connected = false;
            st.fcu_detected = false;
        });
    }
}
