use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::CommandIssuer;
use crate::store::StateStore;

/// Fraction of the target altitude that counts as "reached".
pub const REACHED_FRACTION: f32 = 0.95;
pub const TAKEOFF_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoffOutcome {
    /// Hover altitude reached; LAND was sent.
    Reached,
    /// Altitude not reached in time; nothing else was sent.
    TimedOut,
    /// Session shut down while waiting.
    Cancelled,
}

/// Takeoff, wait for the relative altitude to come up, then land.
#[derive(Clone)]
pub struct TakeoffProcedure {
    store: Arc<StateStore>,
    commands: CommandIssuer,
    shutdown: watch::Receiver<bool>,
}

impl TakeoffProcedure {
    pub fn new(store: Arc<StateStore>, commands: CommandIssuer, shutdown: watch::Receiver<bool>) -> Self {
        Self { store, commands, shutdown }
    }

    pub async fn run(&self, target_alt_m: f32) -> TakeoffOutcome {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return TakeoffOutcome::Cancelled;
        }

        self.commands.takeoff(target_alt_m).await;

        let threshold = target_alt_m * REACHED_FRACTION;
        let mut state = self.store.subscribe();

        // Woken by state changes, not polled.
        let reached = async {
            state
                .wait_for(|st| st.altitude_relative.map_or(false, |alt| alt >= threshold))
                .await
                .is_ok()
        };

        let outcome = tokio::select! {
            ok = reached => if ok { TakeoffOutcome::Reached } else { TakeoffOutcome::Cancelled },
            _ = tokio::time::sleep(TAKEOFF_TIMEOUT) => TakeoffOutcome::TimedOut,
            _ = shutdown.wait_for(|stop| *stop) => TakeoffOutcome::Cancelled,
        };

        match outcome {
            TakeoffOutcome::Reached => {
                info!("takeoff: reached {:.1} m, landing", threshold);
                self.commands.land().await;
            }
            TakeoffOutcome::TimedOut => {
                warn!("takeoff: {:.1} m not reached within {:?}", threshold, TAKEOFF_TIMEOUT);
            }
            TakeoffOutcome::Cancelled => info!("takeoff: cancelled"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use mavlink::common::MavCmd;
    use tokio::time::Instant;

    struct Rig {
        transport: Arc<MockTransport>,
        store: Arc<StateStore>,
        stop: watch::Sender<bool>,
        procedure: TakeoffProcedure,
    }

    fn rig() -> Rig {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(StateStore::new());
        let (stop, shutdown) = watch::channel(false);
        let commands = CommandIssuer::new(transport.clone(), store.clone());
        let procedure = TakeoffProcedure::new(store.clone(), commands, shutdown);
        store.merge(|st| st.armed = true);
        Rig { transport, store, stop, procedure }
    }

    fn count(t: &MockTransport, cmd: MavCmd) -> usize {
        t.sent_commands().iter().filter(|c| c.command == cmd).count()
    }

    /// Feed relative altitudes, one every `step`.
    fn feed(store: Arc<StateStore>, alts: Vec<f32>, step: Duration) {
        tokio::spawn(async move {
            for alt in alts {
                tokio::time::sleep(step).await;
                store.merge(|st| st.altitude_relative = Some(alt));
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_hover_altitude_lands_once() {
        let r = rig();
        feed(
            r.store.clone(),
            vec![0.5, 2.0, 4.0, 6.0, 8.0, 9.0, 9.3, 9.6, 9.8, 10.0],
            Duration::from_millis(500),
        );

        let start = Instant::now();
        let outcome = r.procedure.run(10.0).await;

        assert_eq!(outcome, TakeoffOutcome::Reached);
        assert!(start.elapsed() <= Duration::from_secs(5));
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_TAKEOFF), 1);
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_LAND), 1);

        let cmds = r.transport.sent_commands();
        assert_eq!(cmds[0].command, MavCmd::MAV_CMD_NAV_TAKEOFF);
        assert_eq!(cmds[0].param7, 10.0);
        assert_eq!(cmds.last().unwrap().command, MavCmd::MAV_CMD_NAV_LAND);
    }

    #[tokio::test(start_paused = true)]
    async fn exact_threshold_counts_as_reached() {
        let r = rig();
        feed(r.store.clone(), vec![9.5], Duration::from_secs(1));
        assert_eq!(r.procedure.run(10.0).await, TakeoffOutcome::Reached);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_climb_times_out_without_landing() {
        let r = rig();
        feed(r.store.clone(), vec![3.0, 6.0, 8.5, 9.0, 9.0, 9.0], Duration::from_secs(1));

        let start = Instant::now();
        let outcome = r.procedure.run(10.0).await;

        assert_eq!(outcome, TakeoffOutcome::TimedOut);
        assert!(start.elapsed() >= TAKEOFF_TIMEOUT);
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_TAKEOFF), 1);
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_LAND), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_altitude_at_all_times_out() {
        let r = rig();
        assert_eq!(r.procedure.run(10.0).await, TakeoffOutcome::TimedOut);
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_LAND), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_the_wait() {
        let r = rig();
        let stop = r.stop;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = stop.send(true);
        });

        let start = Instant::now();
        assert_eq!(r.procedure.run(10.0).await, TakeoffOutcome::Cancelled);
        assert!(start.elapsed() < TAKEOFF_TIMEOUT);
        assert_eq!(count(&r.transport, MavCmd::MAV_CMD_NAV_LAND), 0);
    }

    #[tokio::test]
    async fn already_shut_down_sends_nothing() {
        let r = rig();
        r.stop.send(true).unwrap();
        assert_eq!(r.procedure.run(10.0).await, TakeoffOutcome::Cancelled);
        assert!(r.transport.sent().is_empty());
    }
}
