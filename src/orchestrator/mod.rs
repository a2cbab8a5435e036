//! Connection orchestration.
//!
//! A [`ConnectionOrchestrator`] turns "connect to one of these networks" into
//! the sequence radio check, scan, selection, connect, optional binding and
//! confirmation. Each call to [`connect`](ConnectionOrchestrator::connect)
//! runs as its own attempt; a newer call supersedes the one in flight.

mod attempt;

use self::attempt::Attempt;
use crate::bridge::{EventBroadcastBridge, ScanResultsListener, Subscription};
use crate::config::ConnectorConfig;
use crate::error::{ConnectError, WifiResult};
use crate::gateway::NetworkAccessGateway;
use crate::platform::{NetworkHandle, PlatformCapabilities, PlatformEvent, WifiPlatform};
use crate::ssid::ssids_equal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum::Display;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Milestones of a connection attempt, reported for diagnostics only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvancedConnectionState {
    Idle,
    WifiDisabled,
    WifiEnabled,
    ScanResultsAvailable,
    NetworkConnected,
    NetworkBound,
    Established,
    Error,
}

impl AdvancedConnectionState {
    /// Whether the attempt has reported its outcome
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::Error)
    }
}

/// Receives the outcome of one attempt. Exactly one method is called.
pub trait ConnectionListener: Send {
    fn on_connection_established(&self);

    fn on_connection_error(&self, error: ConnectError);
}

/// Observes every state an attempt passes through
pub trait AdvancedStateObserver: Send + Sync {
    fn on_state_changed(&self, state: AdvancedConnectionState);
}

impl<F> AdvancedStateObserver for F
where
    F: Fn(AdvancedConnectionState) + Send + Sync,
{
    fn on_state_changed(&self, state: AdvancedConnectionState) {
        self(state)
    }
}

struct OneshotListener(Mutex<Option<oneshot::Sender<Result<(), ConnectError>>>>);

impl OneshotListener {
    fn complete(&self, outcome: Result<(), ConnectError>) {
        if let Some(tx) = lock(&self.0).take() {
            let _ = tx.send(outcome);
        }
    }
}

impl ConnectionListener for OneshotListener {
    fn on_connection_established(&self) {
        self.complete(Ok(()));
    }

    fn on_connection_error(&self, error: ConnectError) {
        self.complete(Err(error));
    }
}

/// State shared by the orchestrator and its attempts
struct Shared<P: WifiPlatform> {
    gateway: NetworkAccessGateway<P>,
    bridge: Arc<EventBroadcastBridge<P>>,
    config: ConnectorConfig,
    capabilities: PlatformCapabilities,
    observer: Mutex<Option<Arc<dyn AdvancedStateObserver>>>,
    runtime: Handle,
}

impl<P: WifiPlatform> Shared<P> {
    fn binds_to_network(&self) -> bool {
        self.config.bind_to_network && self.capabilities.supports_process_binding
    }

    fn notify(&self, state: AdvancedConnectionState) {
        let observer = lock(&self.observer).clone();
        if let Some(observer) = observer {
            observer.on_state_changed(state);
        }
    }
}

/// Connects to the strongest available network out of a candidate list.
pub struct ConnectionOrchestrator<P: WifiPlatform> {
    shared: Arc<Shared<P>>,
    current: Mutex<Option<Arc<Attempt<P>>>>,
    next_attempt: AtomicU64,
    events: JoinHandle<()>,
}

impl<P: WifiPlatform> ConnectionOrchestrator<P> {
    /// Build an orchestrator over `platform`, draining `events` on the
    /// current tokio runtime.
    pub fn new(
        platform: P,
        events: UnboundedReceiver<PlatformEvent>,
        config: ConnectorConfig,
    ) -> WifiResult<Self> {
        let runtime = Handle::try_current()?;
        let platform = Arc::new(platform);
        let capabilities = platform.capabilities();
        if config.bind_to_network && !capabilities.supports_process_binding {
            info!("platform cannot bind process traffic to a network, binding disabled");
        }

        let bridge = Arc::new(EventBroadcastBridge::new(Arc::clone(&platform)));
        let events = runtime.spawn(Arc::clone(&bridge).run(events));

        Ok(Self {
            shared: Arc::new(Shared {
                gateway: NetworkAccessGateway::new(platform),
                bridge,
                config,
                capabilities,
                observer: Mutex::new(None),
                runtime,
            }),
            current: Mutex::new(None),
            next_attempt: AtomicU64::new(1),
            events,
        })
    }

    pub fn platform(&self) -> &Arc<P> {
        self.shared.gateway.platform()
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.shared.capabilities
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    /// Connect to whichever of `candidates` has the strongest signal.
    ///
    /// Returns immediately; `listener` is told the outcome exactly once.
    /// Candidate order carries no priority and names are de-duplicated after
    /// quote normalization.
    pub fn connect<I, S, L>(&self, candidates: I, listener: L)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        L: ConnectionListener + 'static,
    {
        let mut unique: Vec<String> = Vec::new();
        for candidate in candidates.into_iter().map(Into::into) {
            if !unique.iter().any(|seen| ssids_equal(seen, &candidate)) {
                unique.push(candidate);
            }
        }

        let id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let attempt = Attempt::new(id, unique, Box::new(listener), Arc::clone(&self.shared));
        let previous = self.current().replace(Arc::clone(&attempt));
        if let Some(previous) = previous {
            debug!(attempt = id, "superseding in-flight connection attempt");
            previous.supersede();
        }
        attempt.start();
    }

    /// Single-network form of [`connect`](Self::connect).
    pub fn connect_to_ssid<L>(&self, ssid: &str, listener: L)
    where
        L: ConnectionListener + 'static,
    {
        self.connect([ssid], listener);
    }

    /// Run an attempt and wait for its outcome.
    ///
    /// Resolves to [`ConnectError::Superseded`] if the attempt is dropped
    /// without reporting, e.g. when the orchestrator itself is dropped.
    pub async fn connect_and_wait<I, S>(&self, candidates: I) -> Result<(), ConnectError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = oneshot::channel();
        self.connect(candidates, OneshotListener(Mutex::new(Some(tx))));
        rx.await.unwrap_or(Err(ConnectError::Superseded))
    }

    /// Last state reached by the most recent attempt
    pub fn current_state(&self) -> AdvancedConnectionState {
        self.current()
            .as_ref()
            .map_or(AdvancedConnectionState::Idle, |attempt| attempt.state())
    }

    pub fn is_connected_to(&self, ssid: &str) -> bool {
        self.shared.gateway.has_active_network(ssid)
    }

    /// Network the process is currently bound to, if any
    pub fn bound_network(&self) -> WifiResult<Option<NetworkHandle>> {
        if !self.shared.capabilities.supports_process_binding {
            return Ok(None);
        }
        self.shared.gateway.platform().bound_network()
    }

    /// Ask the platform to re-validate the bound network's connectivity.
    pub fn check_bound_network_connectivity(&self) {
        let network = match self.bound_network() {
            Ok(Some(network)) => network,
            Ok(None) => {
                debug!("no bound network to check");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to query bound network");
                return;
            }
        };
        if let Err(e) = self
            .shared
            .gateway
            .platform()
            .report_network_connectivity(network)
        {
            warn!(error = %e, "failed to report network connectivity");
        }
    }

    /// Cancel a pending bind and let the platform route traffic again
    pub fn clear_network_binding(&self) {
        if self.shared.capabilities.supports_process_binding {
            self.shared.bridge.clear_network_binding();
        }
    }

    /// Scan and deliver results to `listener`, outside any attempt.
    ///
    /// Takes over the scan-results slot, so an attempt waiting for scan
    /// results will not receive them. Release the returned subscription
    /// through [`stop_scan_listener`](Self::stop_scan_listener).
    pub fn scan_for_networks(&self, listener: Arc<dyn ScanResultsListener>) -> Subscription {
        let subscription = self.shared.bridge.subscribe_scan_results(listener);
        self.shared.gateway.start_scan();
        subscription
    }

    pub fn stop_scan_listener(&self, subscription: Subscription) -> bool {
        self.shared.bridge.unsubscribe(subscription)
    }

    pub fn disconnect(&self) {
        self.shared.gateway.disconnect();
    }

    pub fn set_advanced_state_observer<O>(&self, observer: O)
    where
        O: AdvancedStateObserver + 'static,
    {
        *lock(&self.shared.observer) = Some(Arc::new(observer));
    }

    pub fn clear_advanced_state_observer(&self) {
        *lock(&self.shared.observer) = None;
    }

    fn current(&self) -> MutexGuard<'_, Option<Arc<Attempt<P>>>> {
        lock(&self.current)
    }
}

impl<P: WifiPlatform> Drop for ConnectionOrchestrator<P> {
    fn drop(&mut self) {
        self.events.abort();
        let current = self.current().take();
        if let Some(attempt) = current {
            attempt.abandon();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
