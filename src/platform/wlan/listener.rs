use super::handle::WlanInterface;
use super::scan_observations;
use crate::error::{WifiError, WifiResult, wlan_reason_to_string};
use crate::platform::PlatformEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use windows::Win32::{Foundation::ERROR_SUCCESS, NetworkManagement::WiFi::*};

/// Where the callback forwards events, and which categories it forwards
#[derive(Debug, Clone)]
pub struct NotificationContext {
    pub interface: Arc<WlanInterface>,
    pub sender: UnboundedSender<PlatformEvent>,
    pub watched: Arc<AtomicU8>,
}

impl NotificationContext {
    pub fn forward(&self, event: PlatformEvent) {
        let category = event.category();
        if self.watched.load(Ordering::Acquire) & category.bit() == 0 {
            debug!(%category, "dropping notification for unwatched category");
            return;
        }
        let _ = self.sender.send(event);
    }
}

/// ACM and MSM notification registration, undone on drop
#[derive(Debug)]
pub struct WifiListener {
    interface: Arc<WlanInterface>,
    context: *mut std::ffi::c_void,
}

unsafe impl Send for WifiListener {}
unsafe impl Sync for WifiListener {}

impl Drop for WifiListener {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanRegisterNotification(
                self.interface.handle(),
                WLAN_NOTIFICATION_SOURCE_NONE,
                true,
                None,
                None,
                None,
                None,
            );
            let _ = Box::from_raw(self.context as *mut NotificationContext);
        }
    }
}

unsafe extern "system" fn notification_callback(
    data: *mut L2_NOTIFICATION_DATA,
    context: *mut std::ffi::c_void,
) {
    if data.is_null() || context.is_null() {
        return;
    }

    // SAFETY: both pointers were checked above; context is the boxed
    // NotificationContext owned by the WifiListener.
    let (data, context) = unsafe { (&*data, &*(context as *const NotificationContext)) };

    if data.NotificationSource == WLAN_NOTIFICATION_SOURCE_MSM {
        if data.NotificationCode == wlan_notification_msm_radio_state_change.0 as u32
            && data.dwDataSize >= std::mem::size_of::<WLAN_PHY_RADIO_STATE>() as u32
        {
            // SAFETY: pData is a WLAN_PHY_RADIO_STATE for this code and the
            // size was checked.
            let radio = unsafe { &*(data.pData as *const WLAN_PHY_RADIO_STATE) };
            context.forward(PlatformEvent::RadioStateChanged {
                enabled: radio_on(radio),
                initial: false,
            });
        }
        return;
    }

    if data.NotificationSource != WLAN_NOTIFICATION_SOURCE_ACM {
        return;
    }

    let code = data.NotificationCode;
    if code == wlan_notification_acm_scan_complete.0 as u32
        || code == wlan_notification_acm_scan_fail.0 as u32
    {
        // Querying from inside the callback would block the notification
        // thread, so the list is read elsewhere.
        let context = context.clone();
        std::thread::spawn(move || match scan_observations(&context.interface) {
            Ok(observations) => {
                context.forward(PlatformEvent::ScanResultsAvailable { observations });
            }
            Err(e) => warn!(error = %e, "failed to read scan results"),
        });
    } else if code == wlan_notification_acm_connection_complete.0 as u32
        || code == wlan_notification_acm_connection_attempt_fail.0 as u32
    {
        if data.dwDataSize < std::mem::size_of::<WLAN_CONNECTION_NOTIFICATION_DATA>() as u32 {
            return;
        }
        // SAFETY: pData is a WLAN_CONNECTION_NOTIFICATION_DATA for these
        // codes and the size was checked.
        let conn_data = unsafe { &*(data.pData as *const WLAN_CONNECTION_NOTIFICATION_DATA) };
        let connected = conn_data.wlanReasonCode == 0;
        if !connected {
            warn!(
                reason = %wlan_reason_to_string(conn_data.wlanReasonCode),
                "connection attempt failed"
            );
        }
        context.forward(PlatformEvent::NetworkStateChanged { connected });
    } else if code == wlan_notification_acm_disconnected.0 as u32 {
        context.forward(PlatformEvent::NetworkStateChanged { connected: false });
    }
}

pub fn radio_on(radio: &WLAN_PHY_RADIO_STATE) -> bool {
    radio.dot11SoftwareRadioState == dot11_radio_state_on
        && radio.dot11HardwareRadioState == dot11_radio_state_on
}

/// Register for connection, scan and radio notifications
pub fn start_wifi_listener(context: NotificationContext) -> WifiResult<WifiListener> {
    let interface = Arc::clone(&context.interface);
    let context = Box::into_raw(Box::new(context));

    unsafe {
        let result = WlanRegisterNotification(
            interface.handle(),
            WLAN_NOTIFICATION_SOURCES(
                WLAN_NOTIFICATION_SOURCE_ACM.0 | WLAN_NOTIFICATION_SOURCE_MSM.0,
            ),
            false,
            Some(notification_callback),
            Some(context as *mut std::ffi::c_void),
            None,
            None,
        );

        if result != ERROR_SUCCESS.0 {
            let _ = Box::from_raw(context);
            return Err(WifiError::NotificationRegistrationFailed { code: result });
        }
    }

    Ok(WifiListener {
        interface,
        context: context as *mut std::ffi::c_void,
    })
}
