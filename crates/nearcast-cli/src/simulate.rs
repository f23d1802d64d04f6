//! Named devices discovering each other over the in-memory radio

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use nearcast_runtime::{DiscoveryHandle, DiscoveryService, SimulatedAir};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Which devices take part and how they misbehave
#[derive(Debug, Clone, Default)]
pub struct SimulationPlan {
    pub peers: Vec<String>,
    /// Refuse every incoming connection
    pub flaky: Vec<String>,
    /// Serve an identity that is not valid UTF-8
    pub garbled: Vec<String>,
    pub duration: Duration,
}

impl SimulationPlan {
    fn validate(&self) -> Result<()> {
        let unique: BTreeSet<&String> = self.peers.iter().collect();
        if unique.len() != self.peers.len() {
            return Err(CliError::Config("device names must be unique".to_string()));
        }
        if let Some(unknown) = self
            .flaky
            .iter()
            .chain(&self.garbled)
            .find(|name| !unique.contains(name))
        {
            return Err(CliError::Config(format!("unknown device '{unknown}'")));
        }
        Ok(())
    }

    fn is_reachable(&self, name: &str) -> bool {
        !self.flaky.iter().any(|n| n == name) && !self.garbled.iter().any(|n| n == name)
    }

    /// Sightings a complete run produces
    pub fn expected(&self) -> SimulationReport {
        let mut report = SimulationReport::default();
        for observer in &self.peers {
            let seen = self
                .peers
                .iter()
                .filter(|peer| *peer != observer && self.is_reachable(peer))
                .cloned()
                .collect();
            report.sightings.insert(observer.clone(), seen);
        }
        report
    }
}

/// Identities each device reported, keyed by observer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub sightings: BTreeMap<String, BTreeSet<String>>,
}

impl SimulationReport {
    fn record(&mut self, observer: String, identity: String) -> bool {
        self.sightings.entry(observer).or_default().insert(identity)
    }

    /// True when every expected sighting is present
    pub fn covers(&self, expected: &SimulationReport) -> bool {
        expected.sightings.iter().all(|(observer, wanted)| {
            wanted.is_empty()
                || self
                    .sightings
                    .get(observer)
                    .is_some_and(|seen| wanted.is_subset(seen))
        })
    }
}

struct Device {
    handle: DiscoveryHandle,
    task: JoinHandle<()>,
}

/// Run the plan until every reachable device was seen or time runs out
pub async fn run(config: &AppConfig, plan: &SimulationPlan) -> Result<SimulationReport> {
    plan.validate()?;
    let air = SimulatedAir::new();
    let (results_tx, mut results) = mpsc::unbounded_channel::<(String, String)>();
    let mut devices = Vec::with_capacity(plan.peers.len());

    for name in &plan.peers {
        let radio = air.device(name.as_str()).await;
        let (handle, task) = DiscoveryService::spawn(config.discovery.clone(), radio)?;
        if plan.flaky.contains(name) {
            air.set_connect_failures(name, true).await?;
        }
        if plan.garbled.contains(name) {
            air.set_corrupt_payload(name, true).await?;
        }

        handle.start_advertising(name.as_str())?;
        let observer = name.clone();
        let tx = results_tx.clone();
        handle.start_discovering(move |identity| {
            let _ = tx.send((observer.clone(), identity));
        })?;
        devices.push(Device { handle, task });
    }
    drop(results_tx);
    info!("Simulating {} devices", devices.len());

    let pulse = {
        let air = air.clone();
        let interval = config.simulation.pulse_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                air.pulse().await;
            }
        })
    };

    let expected = plan.expected();
    let deadline = Instant::now() + plan.duration;
    let mut report = SimulationReport::default();
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                debug!("Simulation time elapsed");
                break;
            }
            result = results.recv() => {
                let Some((observer, identity)) = result else {
                    break;
                };
                if report.record(observer.clone(), identity.clone()) {
                    info!("{} discovered {}", observer, identity);
                }
                if report.covers(&expected) {
                    debug!("Every reachable device was discovered");
                    break;
                }
            }
        }
    }

    pulse.abort();
    for device in devices {
        if let Err(e) = device.handle.shutdown().await {
            warn!("Device did not shut down cleanly: {}", e);
        }
        if let Err(e) = device.task.await {
            warn!("Device task failed: {}", e);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearcast_core::ServiceId;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.discovery = config
            .discovery
            .with_tick_interval(Duration::from_millis(20))
            .with_cycle_timeout(Some(Duration::from_millis(500)));
        config.discovery.service_id = ServiceId::from_short(0xFEED);
        config.simulation.pulse_interval_ms = 20;
        config
    }

    fn plan(peers: &[&str]) -> SimulationPlan {
        SimulationPlan {
            peers: peers.iter().map(|p| p.to_string()).collect(),
            duration: Duration::from_secs(5),
            ..SimulationPlan::default()
        }
    }

    #[test]
    fn test_expected_excludes_unreachable_devices() {
        let mut plan = plan(&["alice", "bob", "carol"]);
        plan.flaky.push("carol".to_string());

        let expected = plan.expected();
        assert_eq!(
            expected.sightings["alice"],
            BTreeSet::from(["bob".to_string()])
        );
        assert_eq!(
            expected.sightings["carol"],
            BTreeSet::from(["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn test_observer_expecting_nobody_is_covered() {
        let mut plan = plan(&["alice", "bob"]);
        plan.garbled.push("bob".to_string());
        let expected = plan.expected();
        assert!(expected.sightings["alice"].is_empty());

        let mut report = SimulationReport::default();
        assert!(!report.covers(&expected));
        report.record("bob".to_string(), "alice".to_string());
        assert!(report.covers(&expected));
    }

    #[test]
    fn test_plan_rejects_unknown_and_duplicate_names() {
        let mut bad = plan(&["alice", "bob"]);
        bad.garbled.push("mallory".to_string());
        assert!(matches!(bad.validate(), Err(CliError::Config(_))));

        assert!(plan(&["alice", "alice"]).validate().is_err());
        assert!(plan(&["alice", "bob"]).validate().is_ok());
    }

    #[tokio::test]
    async fn test_three_devices_discover_each_other() {
        let plan = plan(&["alice", "bob", "carol"]);
        let report = run(&config(), &plan).await.unwrap();
        assert!(report.covers(&plan.expected()));
    }

    #[tokio::test]
    async fn test_garbled_device_is_never_reported() {
        let mut plan = plan(&["alice", "bob"]);
        plan.garbled.push("bob".to_string());
        plan.duration = Duration::from_millis(500);

        let report = run(&config(), &plan).await.unwrap();
        assert!(report
            .sightings
            .get("alice")
            .map_or(true, |seen| !seen.contains("bob")));
        assert!(report.covers(&plan.expected()));
    }
}
