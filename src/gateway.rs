//! Command side of the platform: radio, scans and network configuration.

use crate::error::{WifiError, WifiResult};
use crate::platform::{NetworkConfiguration, NetworkId, ScanObservation, Security, WifiPlatform};
use crate::ssid::{normalize_ssid, quote_ssid, ssids_equal};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Wraps the platform commands the connection flow issues.
#[derive(Debug)]
pub struct NetworkAccessGateway<P> {
    platform: Arc<P>,
}

impl<P> Clone for NetworkAccessGateway<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
        }
    }
}

impl<P: WifiPlatform> NetworkAccessGateway<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Register an open configuration for `ssid` at the highest priority and
    /// ask the platform to connect with it.
    ///
    /// If the platform refuses the new configuration, an existing entry with
    /// the same normalized name is reused.
    pub fn connect_to_network(&self, ssid: &str) -> WifiResult<()> {
        let config = self.open_configuration(ssid)?;
        debug!(ssid, priority = config.priority, "adding network configuration");

        let id = match self.platform.add_network(&config)? {
            Some(id) => id,
            None => {
                let existing = self.existing_network_id(ssid)?;
                debug!(ssid, id = ?existing, "looked up existing configuration");
                existing.ok_or_else(|| {
                    error!(ssid, "couldn't add network");
                    WifiError::NetworkNotConfigured {
                        ssid: ssid.to_string(),
                    }
                })?
            }
        };

        if self.platform.enable_network(&id)? {
            info!(ssid, %id, "enabled network");
            Ok(())
        } else {
            Err(WifiError::EnableRejected {
                ssid: ssid.to_string(),
            })
        }
    }

    /// Pick the first candidate in scan results ordered by descending signal.
    ///
    /// The whole list is sorted before filtering; the sort is stable, so
    /// equal signals keep scan order.
    pub fn find_available_network(
        &self,
        candidates: &[String],
        mut observations: Vec<ScanObservation>,
    ) -> Option<String> {
        info!(count = observations.len(), "scan results available");
        observations.sort_by_key(|observation| Reverse(observation.signal));

        observations
            .into_iter()
            .find(|observation| {
                candidates
                    .iter()
                    .any(|candidate| ssids_equal(candidate, &observation.ssid))
            })
            .map(|observation| normalize_ssid(&observation.ssid).to_string())
    }

    /// Whether the platform's active network is `ssid`.
    pub fn has_active_network(&self, ssid: &str) -> bool {
        match self.platform.active_network_name() {
            Ok(Some(active)) => ssids_equal(&active, ssid),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to query active network");
                false
            }
        }
    }

    pub fn enable_radio(&self) {
        if let Err(e) = self.platform.set_radio_enabled(true) {
            warn!(error = %e, "failed to enable radio");
        }
    }

    pub fn start_scan(&self) {
        if let Err(e) = self.platform.start_scan() {
            warn!(error = %e, "failed to start scan");
        }
    }

    pub fn disconnect(&self) {
        if let Err(e) = self.platform.disconnect() {
            warn!(error = %e, "failed to disconnect");
        }
    }

    fn open_configuration(&self, ssid: &str) -> WifiResult<NetworkConfiguration> {
        let priority = self
            .platform
            .configured_networks()?
            .iter()
            .map(|network| network.priority.saturating_add(1))
            .max()
            .unwrap_or(0)
            .max(0);

        Ok(NetworkConfiguration {
            ssid: quote_ssid(ssid),
            priority,
            security: Security::Open,
        })
    }

    fn existing_network_id(&self, ssid: &str) -> WifiResult<Option<NetworkId>> {
        Ok(self
            .platform
            .configured_networks()?
            .into_iter()
            .find(|network| ssids_equal(&network.ssid, ssid))
            .map(|network| network.id))
    }
}
