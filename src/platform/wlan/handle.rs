use crate::error::{WifiError, WifiResult};
use std::ffi::c_void;
use windows::{
    Win32::{
        Foundation::{ERROR_SUCCESS, HANDLE},
        NetworkManagement::WiFi::*,
    },
    core::GUID,
};

/// WLAN client session bound to the first wireless interface.
///
/// Opened once per backend and shared with the notification callback; the
/// WLAN service accepts calls on one client handle from any thread.
#[derive(Debug)]
pub struct WlanInterface {
    handle: HANDLE,
    guid: GUID,
}

unsafe impl Send for WlanInterface {}
unsafe impl Sync for WlanInterface {}

impl WlanInterface {
    pub fn open() -> WifiResult<Self> {
        let mut negotiated_version = 0;
        let mut handle = HANDLE::default();
        let result = unsafe { WlanOpenHandle(2, None, &mut negotiated_version, &mut handle) };
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::HandleOpenFailed { code: result });
        }

        // Closed by Drop if no interface can be resolved.
        let mut interface = Self {
            handle,
            guid: GUID::zeroed(),
        };
        interface.guid = interface.first_interface()?;
        Ok(interface)
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }

    pub fn guid(&self) -> &GUID {
        &self.guid
    }

    /// Run `read` over the buffer `WlanQueryInterface` returns for `opcode`,
    /// freeing it afterwards. Errors carry the raw WLAN status code.
    pub fn query<R>(
        &self,
        opcode: WLAN_INTF_OPCODE,
        read: impl FnOnce(*const c_void) -> R,
    ) -> Result<R, u32> {
        let mut data_size = 0;
        let mut data_ptr: *mut c_void = std::ptr::null_mut();
        let mut opcode_value_type = wlan_opcode_value_type_invalid;

        let result = unsafe {
            WlanQueryInterface(
                self.handle,
                &self.guid,
                opcode,
                None,
                &mut data_size,
                &mut data_ptr,
                Some(&mut opcode_value_type),
            )
        };
        if result != ERROR_SUCCESS.0 || data_ptr.is_null() {
            return Err(result);
        }

        let value = read(data_ptr);
        unsafe { WlanFreeMemory(data_ptr) };
        Ok(value)
    }

    fn first_interface(&self) -> WifiResult<GUID> {
        unsafe {
            let mut interface_list: *mut WLAN_INTERFACE_INFO_LIST = std::ptr::null_mut();
            let result = WlanEnumInterfaces(self.handle, None, &mut interface_list);
            if result != ERROR_SUCCESS.0 {
                return Err(WifiError::InterfaceEnumFailed { code: result });
            }

            let first = ((*interface_list).dwNumberOfItems > 0)
                .then(|| (*interface_list).InterfaceInfo[0].InterfaceGuid);
            WlanFreeMemory(interface_list as *mut _);
            first.ok_or(WifiError::NoInterface)
        }
    }
}

impl Drop for WlanInterface {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanCloseHandle(self.handle, None);
        }
    }
}

/// Null-terminated UTF-16 copy of `value` for PCWSTR arguments
pub fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}
