/// Typed errors for wifi-connect
use std::time::Duration;
use thiserror::Error;

/// Result type alias for platform and gateway operations
pub type WifiResult<T> = Result<T, WifiError>;

/// Errors raised by platform commands
#[derive(Error, Debug)]
pub enum WifiError {
    #[error("Failed to open WLAN handle (code: {code})")]
    HandleOpenFailed { code: u32 },

    #[error("Failed to enumerate interfaces (code: {code})")]
    InterfaceEnumFailed { code: u32 },

    #[error("No WiFi interface found")]
    NoInterface,

    #[error("Failed to get available networks (code: {code})")]
    NetworkListFailed { code: u32 },

    #[error("Failed to register notification (code: {code})")]
    NotificationRegistrationFailed { code: u32 },

    #[error("Failed to scan networks (code: {code})")]
    ScanFailed { code: u32 },

    #[error("Failed to connect (code: {code})")]
    ConnectionFailed { code: u32 },

    #[error("Failed to add profile (code: {code}, reason: {reason})")]
    ProfileAddFailed { code: u32, reason: u32 },

    #[error("Failed to list profiles (code: {code})")]
    ProfileListFailed { code: u32 },

    #[error("Failed to reorder profile (code: {code})")]
    ProfilePositionFailed { code: u32 },

    #[error("Failed to disconnect (code: {code})")]
    DisconnectFailed { code: u32 },

    #[error("Failed to query or set radio state (code: {code})")]
    RadioStateFailed { code: u32 },

    #[error("No configuration could be added or found for {ssid}")]
    NetworkNotConfigured { ssid: String },

    #[error("Platform refused to enable network {ssid}")]
    EnableRejected { ssid: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("A tokio runtime is required to drive connection attempts")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Terminal failure of one connection attempt.
///
/// The `Display` form is the short reason handed to
/// [`ConnectionListener::on_connection_error`](crate::ConnectionListener::on_connection_error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no candidate networks were supplied")]
    NoCandidates,

    #[error("no candidate network observed in scan results")]
    NoCandidateObserved,

    #[error("could not enable network {ssid}")]
    NetworkConfigurationFailed { ssid: String },

    #[error("connection attempt timed out after {}s", after.as_secs())]
    TimedOut { after: Duration },

    #[error("superseded by a newer connection attempt")]
    Superseded,
}

/// Convert a WLAN reason code to a human-readable string
pub fn wlan_reason_to_string(code: u32) -> String {
    match code {
        0 => "Success".to_string(),
        1 => "Unknown Failure".to_string(),
        0x00010001 => "Network Not Compatible".to_string(),
        0x00010002 => "Profile Not Compatible".to_string(),
        0x00028002 => "Association Failed".to_string(),
        0x00028003 => "Association Timeout".to_string(),
        0x00028008 => "Roaming Failure".to_string(),
        0x0002800B => "Driver Disconnected".to_string(),
        0x0002800C => "Driver Operation Failure".to_string(),
        0x00038002 => "Connection Failed (Network Not Available)".to_string(),
        0x00038003 => "Profile Not Found".to_string(),
        0x00038006 => "Profile Invalid".to_string(),
        _ => format!("Unknown Error (Code: {code}, 0x{code:X})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_reasons_are_readable() {
        assert_eq!(
            ConnectError::NoCandidateObserved.to_string(),
            "no candidate network observed in scan results"
        );
        assert_eq!(
            ConnectError::NetworkConfigurationFailed {
                ssid: "Home".into()
            }
            .to_string(),
            "could not enable network Home"
        );
        assert_eq!(
            ConnectError::TimedOut {
                after: Duration::from_secs(60)
            }
            .to_string(),
            "connection attempt timed out after 60s"
        );
    }

    #[test]
    fn unknown_reason_codes_include_hex() {
        assert_eq!(
            wlan_reason_to_string(0x1234),
            "Unknown Error (Code: 4660, 0x1234)"
        );
        assert_eq!(wlan_reason_to_string(0x00038003), "Profile Not Found");
    }
}
