/// Centralized configuration for wifi-connect
use std::time::Duration;

// Timing
pub const SCAN_DELAY_MS: u64 = 2000;
pub const CONNECTION_TIMEOUT_SECS: u64 = 60;

/// Settings for a [`ConnectionOrchestrator`](crate::ConnectionOrchestrator).
///
/// Applies to every attempt the orchestrator runs. Binding additionally
/// requires the platform to report support for per-process binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Pin process traffic to the selected network once it becomes available
    pub bind_to_network: bool,
    /// Delay between the radio reporting enabled and the scan request
    pub scan_delay: Duration,
    /// Upper bound for one attempt; `None` waits forever
    pub attempt_timeout: Option<Duration>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            bind_to_network: false,
            scan_delay: Duration::from_millis(SCAN_DELAY_MS),
            attempt_timeout: Some(Duration::from_secs(CONNECTION_TIMEOUT_SECS)),
        }
    }
}

impl ConnectorConfig {
    pub fn with_binding(mut self, bind_to_network: bool) -> Self {
        self.bind_to_network = bind_to_network;
        self
    }

    pub fn with_scan_delay(mut self, scan_delay: Duration) -> Self {
        self.scan_delay = scan_delay;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}
