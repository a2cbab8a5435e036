//! Fan-out of platform notifications to typed listeners.
//!
//! Each [`EventCategory`] has a single listener slot. Registering replaces
//! the previous occupant, and releasing is keyed by the [`Subscription`]
//! returned at registration so a stale handle can never tear down a newer
//! registration.

use crate::platform::{
    EventCategory, NetworkHandle, PlatformEvent, ScanObservation, WifiPlatform,
};
use crate::ssid::ssids_equal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

/// Receives radio on/off notifications
pub trait RadioStateListener: Send + Sync {
    fn on_radio_enabled(&self, initial: bool);

    fn on_radio_disabled(&self, initial: bool);
}

/// Receives connection progress notifications
pub trait NetworkStateListener: Send + Sync {
    fn on_network_connected(&self);

    /// Process traffic has been bound to the awaited network
    fn on_network_bound(&self);
}

/// Receives scan results
pub trait ScanResultsListener: Send + Sync {
    fn on_scan_results(&self, observations: Vec<ScanObservation>);
}

impl<F> ScanResultsListener for F
where
    F: Fn(Vec<ScanObservation>) + Send + Sync,
{
    fn on_scan_results(&self, observations: Vec<ScanObservation>) {
        self(observations)
    }
}

/// Handle for one registration, used to release it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    category: EventCategory,
    id: u64,
}

impl Subscription {
    pub fn category(&self) -> EventCategory {
        self.category
    }
}

struct Slot<L> {
    id: u64,
    listener: L,
}

struct PendingBinding {
    ssid: String,
    listener: Arc<dyn NetworkStateListener>,
}

#[derive(Default)]
struct Slots {
    radio: Option<Slot<Arc<dyn RadioStateListener>>>,
    network: Option<Slot<Arc<dyn NetworkStateListener>>>,
    scan: Option<Slot<Arc<dyn ScanResultsListener>>>,
    available: Option<Slot<PendingBinding>>,
}

impl Slots {
    fn occupant_id(&self, category: EventCategory) -> Option<u64> {
        match category {
            EventCategory::RadioState => self.radio.as_ref().map(|slot| slot.id),
            EventCategory::NetworkState => self.network.as_ref().map(|slot| slot.id),
            EventCategory::ScanResults => self.scan.as_ref().map(|slot| slot.id),
            EventCategory::NetworkAvailable => self.available.as_ref().map(|slot| slot.id),
        }
    }

    fn clear(&mut self, category: EventCategory) {
        match category {
            EventCategory::RadioState => self.radio = None,
            EventCategory::NetworkState => self.network = None,
            EventCategory::ScanResults => self.scan = None,
            EventCategory::NetworkAvailable => self.available = None,
        }
    }
}

/// Routes [`PlatformEvent`]s to at most one listener per category.
///
/// `watch`/`unwatch` are issued while the slot table is locked, so platform
/// registration always mirrors slot occupancy. Backends must report events
/// through their channel rather than calling [`dispatch`](Self::dispatch)
/// from inside those commands.
pub struct EventBroadcastBridge<P> {
    platform: Arc<P>,
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

impl<P: WifiPlatform> EventBroadcastBridge<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            slots: Mutex::new(Slots::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Drain a backend's event channel until every sender is gone.
    pub async fn run(self: Arc<Self>, mut events: UnboundedReceiver<PlatformEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        debug!("platform event channel closed");
    }

    pub fn subscribe_radio_state(&self, listener: Arc<dyn RadioStateListener>) -> Subscription {
        self.register(EventCategory::RadioState, |slots, id| {
            slots.radio.replace(Slot { id, listener }).is_some()
        })
    }

    pub fn subscribe_network_state(
        &self,
        listener: Arc<dyn NetworkStateListener>,
    ) -> Subscription {
        self.register(EventCategory::NetworkState, |slots, id| {
            slots.network.replace(Slot { id, listener }).is_some()
        })
    }

    pub fn subscribe_scan_results(&self, listener: Arc<dyn ScanResultsListener>) -> Subscription {
        self.register(EventCategory::ScanResults, |slots, id| {
            slots.scan.replace(Slot { id, listener }).is_some()
        })
    }

    /// Bind process traffic to `ssid` as soon as the platform reports it
    /// available, then notify `listener` and release the registration.
    pub fn bind_when_available(
        &self,
        ssid: &str,
        listener: Arc<dyn NetworkStateListener>,
    ) -> Subscription {
        info!(ssid, "will bind process to network once it is available");
        let binding = PendingBinding {
            ssid: ssid.to_string(),
            listener,
        };
        self.register(EventCategory::NetworkAvailable, |slots, id| {
            slots
                .available
                .replace(Slot {
                    id,
                    listener: binding,
                })
                .is_some()
        })
    }

    /// Release a registration. Returns false when the handle no longer owns
    /// its slot, which makes repeated or late calls harmless.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let category = subscription.category;
        let mut slots = self.slots();
        if slots.occupant_id(category) != Some(subscription.id) {
            trace!(%category, "ignoring release of stale subscription");
            return false;
        }
        slots.clear(category);
        self.unwatch(category);
        debug!(%category, "un-registered listener");
        true
    }

    /// Cancel any pending bind-on-available request and clear the process
    /// binding if one is in place.
    pub fn clear_network_binding(&self) {
        {
            let mut slots = self.slots();
            if slots.available.take().is_some() {
                self.unwatch(EventCategory::NetworkAvailable);
                debug!("cancelled pending network binding");
            }
        }

        match self.platform.bound_network() {
            Ok(Some(_)) => match self.platform.bind_process_to_network(None) {
                Ok(()) => info!("cleared network binding"),
                Err(e) => warn!(error = %e, "failed to clear network binding"),
            },
            Ok(None) => debug!("not bound to any network, nothing to clear"),
            Err(e) => warn!(error = %e, "failed to query bound network"),
        }
    }

    /// Deliver one platform event to the listener registered for its category.
    pub fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::RadioStateChanged { enabled, initial } => {
                let listener = self.slots().radio.as_ref().map(|slot| slot.listener.clone());
                let Some(listener) = listener else {
                    warn!(enabled, "radio state changed with no listener registered");
                    return;
                };
                if enabled {
                    listener.on_radio_enabled(initial);
                } else {
                    listener.on_radio_disabled(initial);
                }
            }
            PlatformEvent::NetworkStateChanged { connected } => {
                let listener = self
                    .slots()
                    .network
                    .as_ref()
                    .map(|slot| slot.listener.clone());
                let Some(listener) = listener else {
                    warn!(connected, "network state changed with no listener registered");
                    return;
                };
                if connected {
                    listener.on_network_connected();
                }
            }
            PlatformEvent::ScanResultsAvailable { observations } => {
                let listener = self.slots().scan.as_ref().map(|slot| slot.listener.clone());
                let Some(listener) = listener else {
                    warn!(
                        count = observations.len(),
                        "scan results available with no listener registered"
                    );
                    return;
                };
                listener.on_scan_results(observations);
            }
            PlatformEvent::NetworkBecameAvailable { network, ssid } => {
                self.on_network_available(network, &ssid);
            }
        }
    }

    fn on_network_available(&self, network: NetworkHandle, ssid: &str) {
        let binding = {
            let mut slots = self.slots();
            let awaiting = slots.available.as_ref().map(|slot| slot.listener.ssid.clone());
            match awaiting {
                Some(awaiting) if ssids_equal(&awaiting, ssid) => {
                    let binding = slots.available.take().map(|slot| slot.listener);
                    self.unwatch(EventCategory::NetworkAvailable);
                    binding
                }
                Some(awaiting) => {
                    debug!(ssid, %awaiting, "ignoring unrelated network");
                    None
                }
                None => {
                    trace!(ssid, "network available with no binding pending");
                    None
                }
            }
        };
        let Some(binding) = binding else {
            return;
        };

        if let Err(e) = self.platform.bind_process_to_network(Some(network)) {
            error!(ssid, error = %e, "failed to bind process to network");
            return;
        }
        info!(ssid, "bound process to network");
        binding.listener.on_network_bound();
    }

    fn register(
        &self,
        category: EventCategory,
        install: impl FnOnce(&mut Slots, u64) -> bool,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots();
        let replaced = install(&mut *slots, id);

        if replaced {
            debug!(%category, "replaced existing listener");
        } else if let Err(e) = self.platform.watch(category) {
            warn!(%category, error = %e, "failed to register for platform events");
        } else {
            debug!(%category, "registered listener");
        }
        Subscription { category, id }
    }

    fn unwatch(&self, category: EventCategory) {
        if let Err(e) = self.platform.unwatch(category) {
            warn!(%category, error = %e, "failed to un-register for platform events");
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{Command, FakePlatform};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        enabled: AtomicUsize,
        disabled: AtomicUsize,
        connected: AtomicUsize,
        bound: AtomicUsize,
    }

    impl RadioStateListener for Recorder {
        fn on_radio_enabled(&self, _initial: bool) {
            self.enabled.fetch_add(1, Ordering::SeqCst);
        }

        fn on_radio_disabled(&self, _initial: bool) {
            self.disabled.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl NetworkStateListener for Recorder {
        fn on_network_connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_network_bound(&self) {
            self.bound.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bridge(platform: FakePlatform) -> (Arc<FakePlatform>, EventBroadcastBridge<FakePlatform>) {
        let platform = Arc::new(platform);
        (Arc::clone(&platform), EventBroadcastBridge::new(platform))
    }

    fn radio(enabled: bool) -> PlatformEvent {
        PlatformEvent::RadioStateChanged {
            enabled,
            initial: false,
        }
    }

    #[test]
    fn routes_events_to_registered_listener() {
        let (_, bridge) = bridge(FakePlatform::default());
        let recorder = Arc::new(Recorder::default());
        bridge.subscribe_radio_state(recorder.clone());
        bridge.subscribe_network_state(recorder.clone());

        bridge.dispatch(radio(false));
        bridge.dispatch(radio(true));
        bridge.dispatch(PlatformEvent::NetworkStateChanged { connected: false });
        bridge.dispatch(PlatformEvent::NetworkStateChanged { connected: true });

        assert_eq!(recorder.disabled.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.enabled.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_without_listener_are_dropped() {
        let (_, bridge) = bridge(FakePlatform::default());
        bridge.dispatch(radio(true));
        bridge.dispatch(PlatformEvent::ScanResultsAvailable {
            observations: vec![ScanObservation::new("Home", -50)],
        });
    }

    #[test]
    fn newest_registration_wins() {
        let (platform, bridge) = bridge(FakePlatform::default());
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        let stale = bridge.subscribe_radio_state(first.clone());
        let current = bridge.subscribe_radio_state(second.clone());
        bridge.dispatch(radio(true));

        assert_eq!(first.enabled.load(Ordering::SeqCst), 0);
        assert_eq!(second.enabled.load(Ordering::SeqCst), 1);
        assert_eq!(platform.count(&Command::Watch(EventCategory::RadioState)), 1);

        assert!(!bridge.unsubscribe(stale));
        bridge.dispatch(radio(true));
        assert_eq!(second.enabled.load(Ordering::SeqCst), 2);

        assert!(bridge.unsubscribe(current));
        assert!(!bridge.unsubscribe(current));
        assert_eq!(platform.count(&Command::Unwatch(EventCategory::RadioState)), 1);
    }

    #[test]
    fn scan_results_reach_closure_listeners() {
        let (_, bridge) = bridge(FakePlatform::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.subscribe_scan_results(Arc::new(move |observations: Vec<ScanObservation>| {
            sink.lock().unwrap().extend(observations);
        }));

        bridge.dispatch(PlatformEvent::ScanResultsAvailable {
            observations: vec![ScanObservation::new("Home", -50)],
        });

        assert_eq!(*seen.lock().unwrap(), vec![ScanObservation::new("Home", -50)]);
    }

    #[test]
    fn binding_is_one_shot_and_matches_normalized_names() {
        let (platform, bridge) = bridge(FakePlatform::with_binding());
        let recorder = Arc::new(Recorder::default());
        let subscription = bridge.bind_when_available("Home", recorder.clone());

        bridge.dispatch(PlatformEvent::NetworkBecameAvailable {
            network: NetworkHandle(1),
            ssid: "\"Cafe\"".into(),
        });
        assert_eq!(recorder.bound.load(Ordering::SeqCst), 0);

        bridge.dispatch(PlatformEvent::NetworkBecameAvailable {
            network: NetworkHandle(2),
            ssid: "\"Home\"".into(),
        });
        bridge.dispatch(PlatformEvent::NetworkBecameAvailable {
            network: NetworkHandle(3),
            ssid: "Home".into(),
        });

        assert_eq!(recorder.bound.load(Ordering::SeqCst), 1);
        assert_eq!(platform.state().bound, Some(NetworkHandle(2)));
        assert!(!bridge.unsubscribe(subscription));
        assert_eq!(
            platform.commands(),
            vec![
                Command::Watch(EventCategory::NetworkAvailable),
                Command::Unwatch(EventCategory::NetworkAvailable),
                Command::Bind(Some(NetworkHandle(2))),
            ]
        );
    }

    #[test]
    fn failed_binding_does_not_notify() {
        let (_, bridge) = bridge(FakePlatform::default());
        let recorder = Arc::new(Recorder::default());
        bridge.bind_when_available("Home", recorder.clone());

        bridge.dispatch(PlatformEvent::NetworkBecameAvailable {
            network: NetworkHandle(2),
            ssid: "Home".into(),
        });

        assert_eq!(recorder.bound.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clearing_binding_cancels_pending_request_and_unbinds() {
        let (platform, bridge) = bridge(FakePlatform::with_binding());
        platform.state().bound = Some(NetworkHandle(9));
        bridge.bind_when_available("Home", Arc::new(Recorder::default()));

        bridge.clear_network_binding();

        assert_eq!(platform.state().bound, None);
        assert_eq!(
            platform.commands(),
            vec![
                Command::Watch(EventCategory::NetworkAvailable),
                Command::Unwatch(EventCategory::NetworkAvailable),
                Command::Bind(None),
            ]
        );
    }

    #[test]
    fn clearing_without_binding_is_a_no_op() {
        let (platform, bridge) = bridge(FakePlatform::with_binding());
        bridge.clear_network_binding();
        assert_eq!(platform.commands(), Vec::new());
    }

    #[tokio::test]
    async fn run_drains_channel_until_closed() {
        let (_, bridge) = bridge(FakePlatform::default());
        let bridge = Arc::new(bridge);
        let recorder = Arc::new(Recorder::default());
        bridge.subscribe_radio_state(recorder.clone());

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(radio(false)).unwrap();
        tx.send(radio(true)).unwrap();
        drop(tx);
        Arc::clone(&bridge).run(rx).await;

        assert_eq!(recorder.disabled.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.enabled.load(Ordering::SeqCst), 1);
    }
}
