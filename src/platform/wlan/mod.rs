//! Windows backend over the native WLAN API.

mod handle;
mod listener;
mod profile;

use crate::error::{WifiError, WifiResult};
use crate::platform::{
    ConfiguredNetwork, EventCategory, NetworkConfiguration, NetworkHandle, NetworkId,
    PlatformCapabilities, PlatformEvent, ScanObservation, WifiPlatform,
};
use crate::ssid::normalize_ssid;
use handle::{WlanInterface, wide};
use listener::{NotificationContext, WifiListener, radio_on, start_wifi_listener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};
use windows::{
    Win32::{Foundation::ERROR_SUCCESS, NetworkManagement::WiFi::*},
    core::PCWSTR,
};

/// [`WifiPlatform`] backed by the first WLAN interface of the machine.
///
/// Process-level network binding has no WLAN API counterpart, so
/// [`PlatformCapabilities::supports_process_binding`] is always false here.
#[derive(Debug)]
pub struct WlanPlatform {
    _listener: WifiListener,
    context: NotificationContext,
}

impl WlanPlatform {
    /// Open the backend together with the receiving end of its event channel
    pub fn open() -> WifiResult<(Self, UnboundedReceiver<PlatformEvent>)> {
        let (sender, events) = unbounded_channel();
        let context = NotificationContext {
            interface: Arc::new(WlanInterface::open()?),
            sender,
            watched: Arc::new(AtomicU8::new(0)),
        };
        let listener = start_wifi_listener(context.clone())?;
        debug!(interface = ?context.interface.guid(), "opened WLAN interface");
        Ok((
            Self {
                _listener: listener,
                context,
            },
            events,
        ))
    }

    fn interface(&self) -> &WlanInterface {
        &self.context.interface
    }

    /// Whether any PHY of the interface has both radio switches on
    fn radio_enabled(&self) -> WifiResult<bool> {
        self.interface()
            .query(wlan_intf_opcode_radio_state, |data| {
                // SAFETY: the radio-state opcode yields a WLAN_RADIO_STATE.
                let state = unsafe { &*(data as *const WLAN_RADIO_STATE) };
                let phys = (state.dwNumberOfPhys as usize).min(state.PhyRadioState.len());
                state.PhyRadioState[..phys].iter().any(radio_on)
            })
            .map_err(|code| WifiError::RadioStateFailed { code })
    }
}

impl WifiPlatform for WlanPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::default()
    }

    fn set_radio_enabled(&self, enabled: bool) -> WifiResult<()> {
        let interface = self.interface();
        let state = WLAN_PHY_RADIO_STATE {
            dwPhyIndex: 0,
            dot11SoftwareRadioState: if enabled {
                dot11_radio_state_on
            } else {
                dot11_radio_state_off
            },
            dot11HardwareRadioState: dot11_radio_state_on,
        };

        let result = unsafe {
            WlanSetInterface(
                interface.handle(),
                interface.guid(),
                wlan_intf_opcode_radio_state,
                std::mem::size_of::<WLAN_PHY_RADIO_STATE>() as u32,
                &state as *const WLAN_PHY_RADIO_STATE as *const std::ffi::c_void,
                None,
            )
        };
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::RadioStateFailed { code: result });
        }
        debug!(enabled, "radio state requested");
        Ok(())
    }

    fn start_scan(&self) -> WifiResult<()> {
        let interface = self.interface();
        let result =
            unsafe { WlanScan(interface.handle(), interface.guid(), None, None, None) };
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::ScanFailed { code: result });
        }
        Ok(())
    }

    fn disconnect(&self) -> WifiResult<()> {
        let interface = self.interface();
        let result = unsafe { WlanDisconnect(interface.handle(), interface.guid(), None) };
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::DisconnectFailed { code: result });
        }
        Ok(())
    }

    fn configured_networks(&self) -> WifiResult<Vec<ConfiguredNetwork>> {
        let names = profile::profile_names(self.interface())?;

        // The profile list is ordered by preference; turn position into a
        // priority where larger wins.
        let count = names.len() as i32;
        Ok(names
            .into_iter()
            .enumerate()
            .map(|(index, name)| ConfiguredNetwork {
                id: NetworkId(name.clone()),
                ssid: name,
                priority: count - index as i32,
            })
            .collect())
    }

    fn add_network(&self, config: &NetworkConfiguration) -> WifiResult<Option<NetworkId>> {
        let interface = self.interface();
        let name = normalize_ssid(&config.ssid);

        if let Err(e) = profile::set_profile(interface, &profile::open_profile_xml(name)) {
            warn!(ssid = name, error = %e, "failed to add profile");
            return Ok(None);
        }
        // Any priority above the existing ones means first in the list.
        if let Err(e) = profile::move_to_front(interface, name) {
            warn!(ssid = name, error = %e, "failed to move profile to the front");
        }
        Ok(Some(NetworkId(name.to_string())))
    }

    fn enable_network(&self, id: &NetworkId) -> WifiResult<bool> {
        let interface = self.interface();
        let profile_name = wide(&id.0);

        let connection_params = WLAN_CONNECTION_PARAMETERS {
            wlanConnectionMode: wlan_connection_mode_profile,
            strProfile: PCWSTR(profile_name.as_ptr()),
            pDot11Ssid: std::ptr::null_mut(),
            pDesiredBssidList: std::ptr::null_mut(),
            dot11BssType: dot11_BSS_type_infrastructure,
            dwFlags: 0,
        };

        let result = unsafe {
            WlanConnect(
                interface.handle(),
                interface.guid(),
                &connection_params,
                None,
            )
        };
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::ConnectionFailed { code: result });
        }
        Ok(true)
    }

    fn active_network_name(&self) -> WifiResult<Option<String>> {
        // Querying the current connection fails while disconnected.
        let active = self
            .interface()
            .query(wlan_intf_opcode_current_connection, |data| {
                // SAFETY: the current-connection opcode yields
                // WLAN_CONNECTION_ATTRIBUTES.
                let attributes = unsafe { &*(data as *const WLAN_CONNECTION_ATTRIBUTES) };
                (attributes.isState == wlan_interface_state_connected).then(|| {
                    let ssid = &attributes.wlanAssociationAttributes.dot11Ssid;
                    String::from_utf8_lossy(&ssid.ucSSID[..ssid.uSSIDLength as usize])
                        .into_owned()
                })
            })
            .ok()
            .flatten();
        Ok(active)
    }

    fn watch(&self, category: EventCategory) -> WifiResult<()> {
        if category == EventCategory::NetworkAvailable {
            return Err(WifiError::Unsupported("network availability callbacks"));
        }
        self.context
            .watched
            .fetch_or(category.bit(), Ordering::AcqRel);

        if category == EventCategory::RadioState {
            let enabled = self.radio_enabled()?;
            self.context.forward(PlatformEvent::RadioStateChanged {
                enabled,
                initial: true,
            });
        }
        Ok(())
    }

    fn unwatch(&self, category: EventCategory) -> WifiResult<()> {
        self.context
            .watched
            .fetch_and(!category.bit(), Ordering::AcqRel);
        Ok(())
    }

    fn bind_process_to_network(&self, _network: Option<NetworkHandle>) -> WifiResult<()> {
        Err(WifiError::Unsupported("process network binding"))
    }

    fn bound_network(&self) -> WifiResult<Option<NetworkHandle>> {
        Ok(None)
    }

    fn report_network_connectivity(&self, _network: NetworkHandle) -> WifiResult<()> {
        Err(WifiError::Unsupported("connectivity reports"))
    }
}

/// Networks from the interface's most recent scan
fn scan_observations(interface: &WlanInterface) -> WifiResult<Vec<ScanObservation>> {
    unsafe {
        let mut available_network_list: *mut WLAN_AVAILABLE_NETWORK_LIST = std::ptr::null_mut();
        let result = WlanGetAvailableNetworkList(
            interface.handle(),
            interface.guid(),
            0,
            None,
            &mut available_network_list,
        );
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::NetworkListFailed { code: result });
        }

        let items = std::slice::from_raw_parts(
            (*available_network_list).Network.as_ptr(),
            (*available_network_list).dwNumberOfItems as usize,
        );
        let observations = items
            .iter()
            .filter(|item| item.dot11Ssid.uSSIDLength > 0)
            .map(|item| {
                let ssid_bytes = &item.dot11Ssid.ucSSID[..item.dot11Ssid.uSSIDLength as usize];
                ScanObservation::new(
                    String::from_utf8_lossy(ssid_bytes),
                    item.wlanSignalQuality as i32,
                )
            })
            .collect();

        WlanFreeMemory(available_network_list as *mut _);
        Ok(observations)
    }
}
