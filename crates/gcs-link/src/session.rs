use std::sync::Arc;
use std::time::Duration;

use gcs_proto::telemetry::{Diagnostic, TelemetryState};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use crate::aggregate::{Aggregator, Rule};
use crate::commands::CommandIssuer;
use crate::connection::ConnectionManager;
use crate::detector::FcuDetector;
use crate::heartbeat::HeartbeatEmitter;
use crate::router::log_frames;
use crate::store::{RemoteIdentity, StateStore};
use crate::takeoff::{TakeoffOutcome, TakeoffProcedure};
use crate::transport::{MavTcpTransport, Transport};
use crate::LinkConfig;

/// Entry point: owns the configuration and the transport, hands out sessions.
pub struct TelemetryRepository {
    config: LinkConfig,
    transport: Arc<dyn Transport>,
}

impl TelemetryRepository {
    pub fn new(config: LinkConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// MAVLink over TCP to `config.host:config.port`.
    pub fn tcp(config: LinkConfig) -> Self {
        let transport = MavTcpTransport::new(
            config.host.clone(),
            config.port,
            config.gcs_system_id,
            config.gcs_component_id,
        );
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Spawn every session task. Must be called inside a Tokio runtime.
    ///
    /// All frame consumers subscribe before the connection task is spawned,
    /// so none of them can miss the first frame of the session.
    pub fn start(&self) -> Session {
        let store = Arc::new(StateStore::new());
        let (stop, shutdown) = watch::channel(false);
        let commands = CommandIssuer::new(self.transport.clone(), store.clone());

        let router = self.transport.frames();
        let log_sub = router.subscribe();
        let detector_sub = router.subscribe();
        let rule_subs: Vec<_> = Rule::ALL.into_iter().map(|r| (r, router.subscribe())).collect();

        let mut tasks = JoinSet::new();
        tasks.spawn(log_frames(log_sub));
        tasks.spawn(FcuDetector::new(store.clone(), commands.clone()).run(detector_sub));
        let aggregator = Aggregator::new(store.clone());
        for (rule, sub) in rule_subs {
            tasks.spawn(aggregator.clone().run(rule, sub));
        }
        tasks.spawn(HeartbeatEmitter::new(self.transport.clone(), store.clone()).run());
        tasks.spawn(ConnectionManager::new(self.transport.clone(), store.clone()).run());

        info!("session started for {}:{}", self.config.host, self.config.port);

        let takeoff = TakeoffProcedure::new(store.clone(), commands.clone(), shutdown);
        Session {
            store,
            commands,
            takeoff,
            takeoff_alt_m: self.config.takeoff_alt_m,
            transport: self.transport.clone(),
            tasks,
            stop,
        }
    }
}

/// A running session. Dropping it aborts all tasks; [`Session::stop`] also
/// releases the transport and resets the link state.
pub struct Session {
    store: Arc<StateStore>,
    commands: CommandIssuer,
    takeoff: TakeoffProcedure,
    takeoff_alt_m: f32,
    transport: Arc<dyn Transport>,
    tasks: JoinSet<()>,
    stop: watch::Sender<bool>,
}

impl Session {
    pub fn state(&self) -> watch::Receiver<TelemetryState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> TelemetryState {
        self.store.snapshot()
    }

    pub fn diagnostics(&self) -> watch::Receiver<Option<Diagnostic>> {
        self.store.diagnostics()
    }

    pub fn last_failure(&self) -> Option<Diagnostic> {
        self.store.last_failure()
    }

    pub fn fcu(&self) -> Option<RemoteIdentity> {
        self.store.identity()
    }

    pub fn commands(&self) -> &CommandIssuer {
        &self.commands
    }

    pub fn takeoff_procedure(&self) -> TakeoffProcedure {
        self.takeoff.clone()
    }

    /// Takeoff to the configured altitude, land once it is reached.
    pub async fn takeoff_and_land(&self) -> TakeoffOutcome {
        self.takeoff.run(self.takeoff_alt_m).await
    }

    /// Wait until an FCU has been detected. False on timeout.
    pub async fn wait_for_fcu(&self, timeout: Duration) -> bool {
        let mut state = self.store.subscribe();
        tokio::time::timeout(timeout, state.wait_for(|st| st.fcu_detected))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Cancel every task, disconnect and reset the link state.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        self.tasks.shutdown().await;
        self.transport.disconnect().await;
        self.store.reset_link();
        info!("session stopped");
    }
}
