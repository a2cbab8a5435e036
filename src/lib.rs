//! Connect to the best of several candidate Wi-Fi networks.
//!
//! The flow is event driven: a [`ConnectionOrchestrator`] subscribes to
//! platform notifications through an [`EventBroadcastBridge`], issues
//! commands through a [`NetworkAccessGateway`], and reports the outcome of
//! each attempt to a [`ConnectionListener`].
//!
//! Platform access sits behind [`WifiPlatform`]. On Windows,
//! `platform::WlanPlatform` drives the native WLAN API.

pub mod bridge;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod platform;
pub mod ssid;

// Re-export public API
pub use bridge::{
    EventBroadcastBridge, NetworkStateListener, RadioStateListener, ScanResultsListener,
    Subscription,
};
pub use config::ConnectorConfig;
pub use error::{ConnectError, WifiError, WifiResult};
pub use gateway::NetworkAccessGateway;
pub use orchestrator::{
    AdvancedConnectionState, AdvancedStateObserver, ConnectionListener, ConnectionOrchestrator,
};
pub use platform::{
    ConfiguredNetwork, EventCategory, NetworkConfiguration, NetworkHandle, NetworkId,
    PlatformCapabilities, PlatformEvent, ScanObservation, Security, WifiPlatform,
};
pub use ssid::{normalize_ssid, ssids_equal};
