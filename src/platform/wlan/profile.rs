use super::handle::{WlanInterface, wide};
use crate::error::{WifiError, WifiResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;
use windows::{
    Win32::{Foundation::ERROR_SUCCESS, NetworkManagement::WiFi::*},
    core::PCWSTR,
};

/// Profile document for an unsecured network named `ssid`
pub fn open_profile_xml(ssid: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)));

    let mut wlan_profile = BytesStart::new("WLANProfile");
    wlan_profile.push_attribute((
        "xmlns",
        "http://www.microsoft.com/networking/WLAN/profile/v1",
    ));
    let _ = writer.write_event(Event::Start(wlan_profile));

    write_element(&mut writer, "name", ssid);

    let _ = writer.write_event(Event::Start(BytesStart::new("SSIDConfig")));
    let _ = writer.write_event(Event::Start(BytesStart::new("SSID")));
    write_element(&mut writer, "name", ssid);
    let _ = writer.write_event(Event::End(BytesEnd::new("SSID")));
    let _ = writer.write_event(Event::End(BytesEnd::new("SSIDConfig")));

    write_element(&mut writer, "connectionType", "ESS");
    write_element(&mut writer, "connectionMode", "manual");

    let _ = writer.write_event(Event::Start(BytesStart::new("MSM")));
    let _ = writer.write_event(Event::Start(BytesStart::new("security")));
    let _ = writer.write_event(Event::Start(BytesStart::new("authEncryption")));
    write_element(&mut writer, "authentication", "open");
    write_element(&mut writer, "encryption", "none");
    write_element(&mut writer, "useOneX", "false");
    let _ = writer.write_event(Event::End(BytesEnd::new("authEncryption")));
    let _ = writer.write_event(Event::End(BytesEnd::new("security")));
    let _ = writer.write_event(Event::End(BytesEnd::new("MSM")));

    let _ = writer.write_event(Event::End(BytesEnd::new("WLANProfile")));

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    let _ = writer.write_event(Event::Text(BytesText::new(value)));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

/// Saved profile names, most preferred first
pub fn profile_names(interface: &WlanInterface) -> WifiResult<Vec<String>> {
    let mut profiles = Vec::new();

    unsafe {
        let mut profile_list: *mut WLAN_PROFILE_INFO_LIST = std::ptr::null_mut();
        let result = WlanGetProfileList(
            interface.handle(),
            interface.guid(),
            None,
            &mut profile_list,
        );
        if result != ERROR_SUCCESS.0 {
            return Err(WifiError::ProfileListFailed { code: result });
        }

        let items = std::slice::from_raw_parts(
            (*profile_list).ProfileInfo.as_ptr(),
            (*profile_list).dwNumberOfItems as usize,
        );
        for item in items {
            let name = String::from_utf16_lossy(&item.strProfileName);
            let name = name.trim_matches(char::from(0)).to_string();
            if !name.is_empty() {
                profiles.push(name);
            }
        }
        WlanFreeMemory(profile_list as *mut _);
    }

    Ok(profiles)
}

/// Add or overwrite a profile
pub fn set_profile(interface: &WlanInterface, xml: &str) -> WifiResult<()> {
    let xml_wide = wide(xml);
    let mut reason_code = 0;
    let result = unsafe {
        WlanSetProfile(
            interface.handle(),
            interface.guid(),
            0,
            PCWSTR(xml_wide.as_ptr()),
            None,
            true,
            None,
            &mut reason_code,
        )
    };

    if result != ERROR_SUCCESS.0 {
        return Err(WifiError::ProfileAddFailed {
            code: result,
            reason: reason_code,
        });
    }
    Ok(())
}

/// Move a profile to the top of the preference list
pub fn move_to_front(interface: &WlanInterface, name: &str) -> WifiResult<()> {
    let name_wide = wide(name);
    let result = unsafe {
        WlanSetProfilePosition(
            interface.handle(),
            interface.guid(),
            PCWSTR(name_wide.as_ptr()),
            0,
            None,
        )
    };

    if result != ERROR_SUCCESS.0 {
        return Err(WifiError::ProfilePositionFailed { code: result });
    }
    Ok(())
}
