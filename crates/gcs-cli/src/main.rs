use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use gcs_link::modes::FlightMode;
use gcs_link::takeoff::TakeoffOutcome;
use gcs_link::{LinkConfig, Session, TelemetryRepository};

use std::time::Duration;

/// How long one-shot commands wait for the FCU heartbeat.
const FCU_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "gcs", version, about = "MAVLink telemetry and command client")]
struct Cli {
    /// TOML config with a [link] table; SITL defaults when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Stream telemetry snapshots as JSON lines until Ctrl-C.
    Run,
    Arm,
    Disarm,
    /// Change flight mode (e.g. GUIDED, LOITER, RTL, or its number).
    Mode { mode: String },
    /// Take off, wait for hover altitude, then land.
    Takeoff {
        /// Override link.takeoff_alt_m.
        #[arg(long)]
        alt: Option<f32>,
    },
    Land,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Config {
    #[serde(default)]
    link: LinkConfig,
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()) };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg.link),
        Command::Run => run(cfg.link).await,
        cmd => one_shot(cfg.link, cmd).await,
    }
}

fn doctor(link: &LinkConfig) -> Result<()> {
    info!("doctor: starting");
    link.validate()?;
    info!("doctor: link {} as {}/{}", link.address(), link.gcs_system_id, link.gcs_component_id);
    info!("doctor: OK");
    Ok(())
}

async fn run(link: LinkConfig) -> Result<()> {
    link.validate()?;
    let repo = TelemetryRepository::tcp(link);
    let session = repo.start();
    let mut state = session.state();
    let mut diag = session.diagnostics();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() { break; }
                let st = state.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&st)?);
            }
            changed = diag.changed() => {
                if changed.is_err() { break; }
                let last = diag.borrow_and_update().clone();
                if let Some(d) = last {
                    eprintln!("last failure #{} at {}: {}", d.seq, d.at, d.cause);
                }
            }
            _ = &mut interrupted => {
                info!("run: interrupted");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}

async fn one_shot(link: LinkConfig, cmd: Command) -> Result<()> {
    link.validate()?;
    let takeoff_alt = link.takeoff_alt_m;
    let repo = TelemetryRepository::tcp(link);
    let session = repo.start();

    let result = issue(&session, cmd, takeoff_alt).await;
    session.stop().await;
    result
}

async fn issue(session: &Session, cmd: Command, takeoff_alt: f32) -> Result<()> {
    if !session.wait_for_fcu(FCU_WAIT).await {
        let why = session.last_failure().map(|d| d.cause).unwrap_or_else(|| "no heartbeat".into());
        anyhow::bail!("no FCU detected within {:?} ({})", FCU_WAIT, why);
    }
    let before = session.last_failure().map(|d| d.seq);
    let cmds = session.commands();

    match cmd {
        Command::Arm => {
            if !session.snapshot().armable {
                warn!("FCU does not report pre-arm checks passing; sending ARM anyway");
            }
            cmds.arm().await
        }
        Command::Disarm => cmds.disarm().await,
        Command::Mode { mode } => {
            let mode: FlightMode = mode.parse().context("mode")?;
            cmds.change_mode(mode).await
        }
        Command::Land => cmds.land().await,
        Command::Takeoff { alt } => {
            let outcome = match alt {
                Some(alt) => {
                    anyhow::ensure!(alt.is_finite() && alt > 0.0, "takeoff altitude must be positive");
                    session.takeoff_procedure().run(alt).await
                }
                None => session.takeoff_and_land().await,
            };
            let alt = alt.unwrap_or(takeoff_alt);
            match outcome {
                TakeoffOutcome::Reached => println!("takeoff: reached {:.1} m, LAND sent", alt),
                TakeoffOutcome::TimedOut => anyhow::bail!("takeoff: timed out before {:.1} m", alt),
                TakeoffOutcome::Cancelled => anyhow::bail!("takeoff: cancelled"),
            }
        }
        Command::Doctor | Command::Run => anyhow::bail!("not a vehicle command"),
    }

    if let Some(d) = session.last_failure().filter(|d| Some(d.seq) != before) {
        anyhow::bail!("command not sent: {}", d.cause);
    }
    Ok(())
}
