//! Command handlers for the nearcast CLI

use std::time::Duration;

use nearcast_core::RadioNotification;
use nearcast_runtime::{DiscoveryService, RadioDriver};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;
use crate::simulate::{self, SimulationPlan};

/// What a radio command asks the service to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPlan {
    pub identity: Option<String>,
    pub discover: bool,
    pub duration: Option<Duration>,
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let duration = cli.duration.map(Duration::from_secs);
        match cli.command {
            Commands::Advertise { identity } => {
                let identity = config.resolve_identity(identity.as_deref())?;
                let plan = RadioPlan {
                    identity: Some(identity),
                    discover: false,
                    duration,
                };
                Self::handle_radio_command(&config, plan).await
            }
            Commands::Discover => {
                let plan = RadioPlan {
                    identity: None,
                    discover: true,
                    duration,
                };
                Self::handle_radio_command(&config, plan).await
            }
            Commands::Run { identity } => {
                let identity = config.resolve_identity(identity.as_deref())?;
                let plan = RadioPlan {
                    identity: Some(identity),
                    discover: true,
                    duration,
                };
                Self::handle_radio_command(&config, plan).await
            }
            Commands::Simulate {
                peers,
                flaky,
                garbled,
            } => {
                let plan = SimulationPlan {
                    peers,
                    flaky,
                    garbled,
                    duration: duration.unwrap_or(Duration::from_secs(
                        config.simulation.default_duration_secs,
                    )),
                };
                Self::handle_simulate_command(&config, plan).await
            }
        }
    }

    #[cfg(feature = "platform")]
    async fn handle_radio_command(config: &AppConfig, plan: RadioPlan) -> Result<()> {
        Self::run_radio(config, nearcast_ble::PlatformRadio::new(), plan).await
    }

    #[cfg(not(feature = "platform"))]
    async fn handle_radio_command(_config: &AppConfig, _plan: RadioPlan) -> Result<()> {
        Err(crate::error::CliError::FeatureNotAvailable(
            "Bluetooth radio support; rebuild with `--features platform` or use `simulate`"
                .to_string(),
        ))
    }

    /// Drive one discovery service until Ctrl-C or the requested duration
    #[cfg_attr(not(feature = "platform"), allow(dead_code))]
    async fn run_radio<D: RadioDriver + 'static>(
        config: &AppConfig,
        driver: D,
        plan: RadioPlan,
    ) -> Result<()> {
        let (handle, task) = DiscoveryService::spawn(config.discovery.clone(), driver)?;
        let mut notifications = handle.subscribe();

        if let Some(identity) = plan.identity {
            info!("Advertising '{}' on {}", identity, config.discovery.service_id);
            handle.start_advertising(identity)?;
        }
        if plan.discover {
            info!("Discovering peers on {}", config.discovery.service_id);
            handle.start_discovering(|identity| {
                info!("Discovered {}", identity);
                println!("{identity}");
            })?;
        }

        let stop = wait_for_stop(plan.duration);
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                notification = notifications.recv() => match notification {
                    Ok(RadioNotification::RadioAvailable) => info!("Bluetooth radio available"),
                    Ok(RadioNotification::RadioUnavailable) => warn!("Bluetooth radio unavailable"),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} radio notifications", missed),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        let snapshot = handle.snapshot().await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);

        handle.shutdown().await?;
        if let Err(e) = task.await {
            warn!("Discovery service task failed: {}", e);
        }
        Ok(())
    }

    async fn handle_simulate_command(config: &AppConfig, plan: SimulationPlan) -> Result<()> {
        let report = simulate::run(config, &plan).await?;
        let expected = plan.expected();

        for (observer, seen) in &report.sightings {
            let seen: Vec<&str> = seen.iter().map(String::as_str).collect();
            println!("{observer}: {}", seen.join(", "));
        }
        if report.covers(&expected) {
            info!("All reachable devices discovered each other");
        } else {
            warn!("Simulation ended before every reachable device was discovered");
        }
        Ok(())
    }
}

async fn wait_for_stop(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use clap::Parser;

    #[cfg(not(feature = "platform"))]
    #[tokio::test]
    async fn test_radio_commands_need_platform_feature() {
        let cli = Cli::parse_from(["nearcast", "discover", "--duration", "1"]);
        let err = CommandDispatcher::execute(cli, AppConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::FeatureNotAvailable(_)));
    }

    #[tokio::test]
    async fn test_advertise_without_identity_fails() {
        let cli = Cli::parse_from(["nearcast", "advertise"]);
        let err = CommandDispatcher::execute(cli, AppConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn test_simulate_command_completes() {
        let cli = Cli::parse_from(["nearcast", "simulate", "alice", "bob", "--duration", "5"]);
        let mut config = AppConfig::default();
        config.simulation.pulse_interval_ms = 20;
        CommandDispatcher::execute(cli, config).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_radio_with_simulated_driver() {
        let air = nearcast_runtime::SimulatedAir::new();
        let radio = air.device("alice").await;
        let plan = RadioPlan {
            identity: Some("alice".to_string()),
            discover: true,
            duration: Some(Duration::from_millis(100)),
        };
        CommandDispatcher::run_radio(&AppConfig::default(), radio, plan)
            .await
            .unwrap();
        assert_eq!(air.open_links("alice").await, 0);
    }
}
