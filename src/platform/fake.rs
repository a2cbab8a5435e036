//! Recording platform used by unit tests.

use super::{
    ConfiguredNetwork, EventCategory, NetworkConfiguration, NetworkHandle, NetworkId,
    PlatformCapabilities, WifiPlatform,
};
use crate::error::{WifiError, WifiResult};
use std::sync::{Mutex, MutexGuard};

/// Commands observed by [`FakePlatform`], in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetRadio(bool),
    StartScan,
    Disconnect,
    AddNetwork(NetworkConfiguration),
    EnableNetwork(NetworkId),
    Watch(EventCategory),
    Unwatch(EventCategory),
    Bind(Option<NetworkHandle>),
    ReportConnectivity(NetworkHandle),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub capabilities: PlatformCapabilities,
    pub active_ssid: Option<String>,
    pub configured: Vec<ConfiguredNetwork>,
    /// When false, `add_network` hands back no identifier
    pub accept_new_networks: bool,
    pub enable_succeeds: bool,
    pub bound: Option<NetworkHandle>,
    pub commands: Vec<Command>,
}

#[derive(Debug)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                accept_new_networks: true,
                enable_succeeds: true,
                ..FakeState::default()
            }),
        }
    }
}

impl FakePlatform {
    pub fn with_binding() -> Self {
        let platform = Self::default();
        platform.state().capabilities.supports_process_binding = true;
        platform
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_active(&self, ssid: Option<&str>) {
        self.state().active_ssid = ssid.map(str::to_owned);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state().commands.clone()
    }

    pub fn count(&self, wanted: &Command) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|command| *command == wanted)
            .count()
    }

    fn record(&self, command: Command) {
        self.state().commands.push(command);
    }
}

impl WifiPlatform for FakePlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.state().capabilities
    }

    fn set_radio_enabled(&self, enabled: bool) -> WifiResult<()> {
        self.record(Command::SetRadio(enabled));
        Ok(())
    }

    fn start_scan(&self) -> WifiResult<()> {
        self.record(Command::StartScan);
        Ok(())
    }

    fn disconnect(&self) -> WifiResult<()> {
        self.record(Command::Disconnect);
        self.state().active_ssid = None;
        Ok(())
    }

    fn configured_networks(&self) -> WifiResult<Vec<ConfiguredNetwork>> {
        Ok(self.state().configured.clone())
    }

    fn add_network(&self, config: &NetworkConfiguration) -> WifiResult<Option<NetworkId>> {
        self.record(Command::AddNetwork(config.clone()));
        let mut state = self.state();
        if !state.accept_new_networks {
            return Ok(None);
        }
        let id = NetworkId(format!("net-{}", state.configured.len()));
        state.configured.push(ConfiguredNetwork {
            id: id.clone(),
            ssid: config.ssid.clone(),
            priority: config.priority,
        });
        Ok(Some(id))
    }

    fn enable_network(&self, id: &NetworkId) -> WifiResult<bool> {
        self.record(Command::EnableNetwork(id.clone()));
        Ok(self.state().enable_succeeds)
    }

    fn active_network_name(&self) -> WifiResult<Option<String>> {
        Ok(self.state().active_ssid.clone())
    }

    fn watch(&self, category: EventCategory) -> WifiResult<()> {
        self.record(Command::Watch(category));
        Ok(())
    }

    fn unwatch(&self, category: EventCategory) -> WifiResult<()> {
        self.record(Command::Unwatch(category));
        Ok(())
    }

    fn bind_process_to_network(&self, network: Option<NetworkHandle>) -> WifiResult<()> {
        self.record(Command::Bind(network));
        let mut state = self.state();
        if !state.capabilities.supports_process_binding {
            return Err(WifiError::Unsupported("process network binding"));
        }
        state.bound = network;
        Ok(())
    }

    fn bound_network(&self) -> WifiResult<Option<NetworkHandle>> {
        Ok(self.state().bound)
    }

    fn report_network_connectivity(&self, network: NetworkHandle) -> WifiResult<()> {
        self.record(Command::ReportConnectivity(network));
        Ok(())
    }
}
