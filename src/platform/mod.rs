//! Platform seam.
//!
//! Everything the connection logic needs from the operating system goes
//! through [`WifiPlatform`]. Commands are synchronous and best-effort;
//! outcomes arrive later as [`PlatformEvent`]s on the channel the backend
//! was created with.

#[cfg(test)]
pub(crate) mod fake;
#[cfg(windows)]
mod wlan;

#[cfg(windows)]
pub use wlan::WlanPlatform;

use crate::error::WifiResult;
use std::fmt;
use strum::{Display, EnumIter};

/// Opaque platform handle for a network that traffic can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkHandle(pub u64);

/// Identifier of an entry in the platform's network configuration store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkId(pub String);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Features that vary between platforms, resolved once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub supports_process_binding: bool,
}

/// One scan result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanObservation {
    pub ssid: String,
    /// Higher is stronger; the unit is platform-defined
    pub signal: i32,
}

impl ScanObservation {
    pub fn new(ssid: impl Into<String>, signal: i32) -> Self {
        Self {
            ssid: ssid.into(),
            signal,
        }
    }
}

/// An entry already present in the platform's configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredNetwork {
    pub id: NetworkId,
    pub ssid: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
}

/// A configuration to register with the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfiguration {
    /// Quoted form of the network name
    pub ssid: String,
    pub priority: i32,
    pub security: Security,
}

/// Categories of platform notifications, one listener slot each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
    RadioState,
    NetworkState,
    ScanResults,
    NetworkAvailable,
}

impl EventCategory {
    #[cfg_attr(not(any(windows, test)), allow(dead_code))]
    pub(crate) fn bit(self) -> u8 {
        match self {
            EventCategory::RadioState => 1,
            EventCategory::NetworkState => 1 << 1,
            EventCategory::ScanResults => 1 << 2,
            EventCategory::NetworkAvailable => 1 << 3,
        }
    }
}

/// Notifications emitted by a platform backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    RadioStateChanged {
        enabled: bool,
        /// Set when the event reports the state at registration time
        /// rather than an actual change
        initial: bool,
    },
    NetworkStateChanged {
        connected: bool,
    },
    ScanResultsAvailable {
        observations: Vec<ScanObservation>,
    },
    NetworkBecameAvailable {
        network: NetworkHandle,
        ssid: String,
    },
}

impl PlatformEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            PlatformEvent::RadioStateChanged { .. } => EventCategory::RadioState,
            PlatformEvent::NetworkStateChanged { .. } => EventCategory::NetworkState,
            PlatformEvent::ScanResultsAvailable { .. } => EventCategory::ScanResults,
            PlatformEvent::NetworkBecameAvailable { .. } => EventCategory::NetworkAvailable,
        }
    }
}

/// Radio, configuration store and connectivity operations of the host.
///
/// Implementations push notifications for watched categories into the
/// event channel they were built with. Watching [`EventCategory::RadioState`]
/// must emit the current radio state as an `initial` event.
pub trait WifiPlatform: Send + Sync + 'static {
    fn capabilities(&self) -> PlatformCapabilities;

    fn set_radio_enabled(&self, enabled: bool) -> WifiResult<()>;

    fn start_scan(&self) -> WifiResult<()>;

    fn disconnect(&self) -> WifiResult<()>;

    fn configured_networks(&self) -> WifiResult<Vec<ConfiguredNetwork>>;

    /// Register a configuration. `Ok(None)` means the platform did not hand
    /// back a usable identifier.
    fn add_network(&self, config: &NetworkConfiguration) -> WifiResult<Option<NetworkId>>;

    /// Ask the platform to connect using the given configuration
    fn enable_network(&self, id: &NetworkId) -> WifiResult<bool>;

    /// Name of the active Wi-Fi network, if the active network is Wi-Fi
    fn active_network_name(&self) -> WifiResult<Option<String>>;

    fn watch(&self, category: EventCategory) -> WifiResult<()>;

    fn unwatch(&self, category: EventCategory) -> WifiResult<()>;

    /// Pin process traffic to `network`, or clear the pin with `None`
    fn bind_process_to_network(&self, network: Option<NetworkHandle>) -> WifiResult<()>;

    fn bound_network(&self) -> WifiResult<Option<NetworkHandle>>;

    /// Ask the platform to re-validate connectivity of `network`
    fn report_network_connectivity(&self, network: NetworkHandle) -> WifiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn category_bits_are_distinct() {
        let mask = EventCategory::iter().fold(0u8, |mask, category| {
            assert_eq!(mask & category.bit(), 0, "{category} overlaps");
            mask | category.bit()
        });
        assert_eq!(mask, 0b1111);
    }

    #[test]
    fn events_know_their_category() {
        let event = PlatformEvent::NetworkBecameAvailable {
            network: NetworkHandle(7),
            ssid: "Home".into(),
        };
        assert_eq!(event.category(), EventCategory::NetworkAvailable);
        assert_eq!(event.category().to_string(), "network_available");
    }
}
