use super::{AdvancedConnectionState, ConnectionListener, Shared};
use crate::bridge::{NetworkStateListener, RadioStateListener, ScanResultsListener, Subscription};
use crate::error::ConnectError;
use crate::platform::{ScanObservation, WifiPlatform};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct AttemptSubscriptions {
    radio: Option<Subscription>,
    scan: Option<Subscription>,
    network: Option<Subscription>,
    binding: Option<Subscription>,
}

/// State of one `connect` call, from radio check to terminal outcome.
///
/// Registered with the bridge as the radio, scan and network listener. Every
/// handler is a no-op once the listener has been notified.
pub(super) struct Attempt<P: WifiPlatform> {
    id: u64,
    candidates: Vec<String>,
    listener: Mutex<Option<Box<dyn ConnectionListener>>>,
    selected: OnceLock<String>,
    scan_claimed: AtomicBool,
    state: Mutex<AdvancedConnectionState>,
    // Lock order: subscriptions before the bridge's slot table.
    subscriptions: Mutex<AttemptSubscriptions>,
    cancel: CancellationToken,
    shared: Arc<Shared<P>>,
    this: Weak<Self>,
}

impl<P: WifiPlatform> Attempt<P> {
    pub(super) fn new(
        id: u64,
        candidates: Vec<String>,
        listener: Box<dyn ConnectionListener>,
        shared: Arc<Shared<P>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            candidates,
            listener: Mutex::new(Some(listener)),
            selected: OnceLock::new(),
            scan_claimed: AtomicBool::new(false),
            state: Mutex::new(AdvancedConnectionState::Idle),
            subscriptions: Mutex::new(AttemptSubscriptions::default()),
            cancel: CancellationToken::new(),
            shared,
            this: this.clone(),
        })
    }

    pub(super) fn state(&self) -> AdvancedConnectionState {
        *lock(&self.state)
    }

    pub(super) fn start(&self) {
        if self.candidates.is_empty() {
            self.finish(Err(ConnectError::NoCandidates));
            return;
        }
        info!(attempt = self.id, candidates = ?self.candidates, "starting connection attempt");
        self.schedule_timeout();

        let Some(this) = self.this.upgrade() else {
            return;
        };
        let mut subscriptions = self.subscriptions();
        if self.is_finished() {
            return;
        }
        subscriptions.radio = Some(self.shared.bridge.subscribe_radio_state(this));
    }

    /// End this attempt because a newer one replaced it. A binding kept
    /// after success is cancelled as well.
    pub(super) fn supersede(&self) {
        self.finish(Err(ConnectError::Superseded));
        self.release(false);
    }

    /// Drop the attempt without notifying its listener.
    pub(super) fn abandon(&self) {
        if lock(&self.listener).take().is_some() {
            debug!(attempt = self.id, "abandoning connection attempt");
        }
        self.release(false);
    }

    fn is_finished(&self) -> bool {
        lock(&self.listener).is_none()
    }

    fn subscriptions(&self) -> MutexGuard<'_, AttemptSubscriptions> {
        lock(&self.subscriptions)
    }

    fn advance(&self, state: AdvancedConnectionState) {
        {
            let mut current = lock(&self.state);
            if current.is_terminal() {
                debug!(attempt = self.id, %state, "attempt already ended, ignoring state");
                return;
            }
            *current = state;
        }
        debug!(attempt = self.id, %state, "connection state changed");
        self.shared.notify(state);
    }

    fn schedule_scan(&self) {
        let gateway = self.shared.gateway.clone();
        let delay = self.shared.config.scan_delay;
        let cancel = self.cancel.clone();
        let attempt = self.id;

        self.shared.runtime.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => debug!(attempt, "scheduled scan cancelled"),
                () = tokio::time::sleep(delay) => {
                    debug!(attempt, "starting scan");
                    gateway.start_scan();
                }
            }
        });
    }

    fn schedule_timeout(&self) {
        let Some(after) = self.shared.config.attempt_timeout else {
            return;
        };
        let this = self.this.clone();
        let cancel = self.cancel.clone();

        self.shared.runtime.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    if let Some(attempt) = this.upgrade() {
                        warn!(attempt = attempt.id, "connection attempt timed out");
                        attempt.finish(Err(ConnectError::TimedOut { after }));
                    }
                }
            }
        });
    }

    fn on_network_selected(&self, ssid: &str) {
        info!(attempt = self.id, ssid, "candidate network is available");

        if self.shared.gateway.has_active_network(ssid) {
            debug!(attempt = self.id, ssid, "already connected to network");
            self.finish(Ok(()));
            return;
        }

        {
            let Some(this) = self.this.upgrade() else {
                return;
            };
            let mut subscriptions = self.subscriptions();
            if self.is_finished() {
                return;
            }
            // Registered ahead of the connect request so an early
            // availability notification is not missed.
            if self.shared.binds_to_network() {
                subscriptions.binding =
                    Some(self.shared.bridge.bind_when_available(ssid, this.clone()));
            }
            subscriptions.network = Some(self.shared.bridge.subscribe_network_state(this));
        }

        if let Err(e) = self.shared.gateway.connect_to_network(ssid) {
            warn!(attempt = self.id, ssid, error = %e, "error while enabling network");
            self.finish(Err(ConnectError::NetworkConfigurationFailed {
                ssid: ssid.to_string(),
            }));
        }
    }

    fn release_network_state(&self) {
        let network = self.subscriptions().network.take();
        if let Some(subscription) = network {
            self.shared.bridge.unsubscribe(subscription);
        }
    }

    /// Report the terminal outcome. Only the first call has any effect.
    fn finish(&self, outcome: Result<(), ConnectError>) {
        let Some(listener) = lock(&self.listener).take() else {
            return;
        };
        self.release(outcome.is_ok());

        match outcome {
            Ok(()) => {
                self.advance(AdvancedConnectionState::Established);
                info!(attempt = self.id, ssid = ?self.selected.get(), "connection established");
                listener.on_connection_established();
            }
            Err(e) => {
                self.advance(AdvancedConnectionState::Error);
                info!(attempt = self.id, reason = %e, "connection attempt failed");
                listener.on_connection_error(e);
            }
        }
    }

    /// Cancel timers and release subscriptions. A pending binding survives
    /// success so the process still gets pinned once the network shows up;
    /// it stays owned by the attempt until superseded or abandoned.
    fn release(&self, keep_binding: bool) {
        self.cancel.cancel();
        let released = {
            let mut subscriptions = self.subscriptions();
            let binding = if keep_binding {
                subscriptions.binding.take()
            } else {
                None
            };
            let kept = AttemptSubscriptions {
                binding,
                ..AttemptSubscriptions::default()
            };
            std::mem::replace(&mut *subscriptions, kept)
        };

        for subscription in [
            released.radio,
            released.scan,
            released.network,
            released.binding,
        ]
        .into_iter()
        .flatten()
        {
            self.shared.bridge.unsubscribe(subscription);
        }
    }
}

impl<P: WifiPlatform> RadioStateListener for Attempt<P> {
    fn on_radio_enabled(&self, initial: bool) {
        if self.is_finished() {
            return;
        }
        let radio = self.subscriptions().radio.take();
        let Some(radio) = radio else {
            debug!(attempt = self.id, "radio already handled for this attempt");
            return;
        };
        self.shared.bridge.unsubscribe(radio);
        self.advance(AdvancedConnectionState::WifiEnabled);

        {
            let Some(this) = self.this.upgrade() else {
                return;
            };
            let mut subscriptions = self.subscriptions();
            if self.is_finished() {
                return;
            }
            debug!(attempt = self.id, initial, "radio is enabled, scheduling scan");
            subscriptions.scan = Some(self.shared.bridge.subscribe_scan_results(this));
        }
        self.schedule_scan();
    }

    fn on_radio_disabled(&self, initial: bool) {
        if self.is_finished() {
            return;
        }
        self.advance(AdvancedConnectionState::WifiDisabled);
        debug!(attempt = self.id, initial, "radio is disabled, enabling");
        self.shared.gateway.enable_radio();
    }
}

impl<P: WifiPlatform> ScanResultsListener for Attempt<P> {
    fn on_scan_results(&self, observations: Vec<ScanObservation>) {
        if self.is_finished() {
            return;
        }
        let found = self
            .shared
            .gateway
            .find_available_network(&self.candidates, observations);

        if self
            .scan_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(attempt = self.id, "dropping duplicate scan results");
            return;
        }
        self.advance(AdvancedConnectionState::ScanResultsAvailable);
        let scan = self.subscriptions().scan.take();
        if let Some(scan) = scan {
            self.shared.bridge.unsubscribe(scan);
        }

        match found {
            Some(ssid) => {
                let ssid = self.selected.get_or_init(|| ssid);
                self.on_network_selected(ssid);
            }
            None => self.finish(Err(ConnectError::NoCandidateObserved)),
        }
    }
}

impl<P: WifiPlatform> NetworkStateListener for Attempt<P> {
    fn on_network_connected(&self) {
        if self.is_finished() {
            return;
        }
        self.advance(AdvancedConnectionState::NetworkConnected);
        self.release_network_state();

        let Some(selected) = self.selected.get() else {
            return;
        };
        if self.shared.gateway.has_active_network(selected) {
            self.finish(Ok(()));
        } else {
            warn!(
                attempt = self.id,
                ssid = %selected,
                "connected, but not to the selected network"
            );
        }
    }

    fn on_network_bound(&self) {
        // The bridge released the one-shot registration before calling us.
        self.subscriptions().binding = None;
        if self.is_finished() {
            return;
        }
        self.advance(AdvancedConnectionState::NetworkBound);
        self.release_network_state();
        self.finish(Ok(()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::orchestrator::ConnectionOrchestrator;
    use crate::platform::PlatformEvent;
    use crate::platform::fake::FakePlatform;
    use pretty_assertions::assert_eq;

    struct Ignore;

    impl ConnectionListener for Ignore {
        fn on_connection_established(&self) {}

        fn on_connection_error(&self, _error: ConnectError) {}
    }

    #[tokio::test]
    async fn no_state_is_recorded_after_the_outcome() {
        let platform = FakePlatform::default();
        platform.set_active(Some("Home"));
        let (_events, rx) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator =
            ConnectionOrchestrator::new(platform, rx, ConnectorConfig::default()).unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        orchestrator.set_advanced_state_observer(move |state: AdvancedConnectionState| {
            sink.lock().unwrap().push(state);
        });

        orchestrator.connect(["Home"], Ignore);
        orchestrator
            .shared
            .bridge
            .dispatch(PlatformEvent::RadioStateChanged {
                enabled: true,
                initial: true,
            });
        let attempt = orchestrator.current().clone().unwrap();
        attempt.on_scan_results(vec![ScanObservation::new("Home", -50)]);
        assert_eq!(attempt.state(), AdvancedConnectionState::Established);

        attempt.advance(AdvancedConnectionState::ScanResultsAvailable);
        attempt.on_scan_results(vec![ScanObservation::new("Home", -50)]);

        assert_eq!(attempt.state(), AdvancedConnectionState::Established);
        assert_eq!(orchestrator.current_state(), AdvancedConnectionState::Established);
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                AdvancedConnectionState::WifiEnabled,
                AdvancedConnectionState::ScanResultsAvailable,
                AdvancedConnectionState::Established,
            ]
        );
    }
}
