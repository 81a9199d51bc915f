//! Per-characteristic routing of hardware events to waiting callers.
//!
//! A [`Multiplexer`] owns three waiter collections for one characteristic:
//!
//! - **Pending reads**: one-shot, FIFO. Only the first read queued while none
//!   are pending issues a hardware read; every queued read is resolved by the
//!   next value update, whichever request caused it.
//! - **Pending writes**: one-shot, FIFO, only for acknowledged writes.
//! - **Subscriptions**: multi-shot, keyed by [`SubscriptionId`]. Notifications
//!   are enabled on the 0→1 transition and disabled on 1→0.

use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::sync::Arc;

use corecube_metrics::{metric_defs, CubeLabels};
use corecube_protocol::ProtocolError;
use tracing::{debug, trace};

use crate::central::{Central, PeripheralId, WriteType};
use crate::characteristic::CharacteristicId;
use crate::error::{CubeError, CubeResult, HardwareError};
use crate::family::*;

/// One-shot callback resolved by the next value update.
pub type ReadCallback<T> = Box<dyn FnOnce(CubeResult<T>) + Send>;
/// Callback invoked for every value update until unsubscribed.
pub type NotifyCallback<T> = Box<dyn FnMut(CubeResult<T>) + Send>;
/// One-shot callback resolved by the next write completion.
pub type WriteCallback = Box<dyn FnOnce(CubeResult<()>) + Send>;

/// Identifies a notification subscription within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(NonZeroU64);

impl SubscriptionId {
    /// Numeric value, starting at 1.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Allocates subscription ids for one session.
#[derive(Debug)]
pub(crate) struct SubscriptionSeed {
    next: NonZeroU64,
}

impl SubscriptionSeed {
    pub(crate) fn new() -> Self {
        SubscriptionSeed {
            next: NonZeroU64::MIN,
        }
    }

    pub(crate) fn next_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// The session's handle on the BLE stack.
pub(crate) struct Link {
    pub(crate) central: Arc<dyn Central>,
    pub(crate) peripheral: PeripheralId,
    pub(crate) labels: CubeLabels,
}

impl Link {
    pub(crate) fn new(central: Arc<dyn Central>, peripheral: PeripheralId) -> Self {
        Link {
            central,
            peripheral,
            labels: CubeLabels::new(peripheral.to_string()),
        }
    }

    fn labels(&self, id: CharacteristicId) -> Vec<(&'static str, String)> {
        self.labels.clone().with_characteristic(id.name()).to_labels()
    }
}

// ============================================================================
// Multiplexer
// ============================================================================

/// Waiters of one characteristic.
pub struct Multiplexer<F: Family> {
    supported: bool,
    reads: VecDeque<ReadCallback<F::Response>>,
    writes: VecDeque<WriteCallback>,
    subscribers: BTreeMap<SubscriptionId, NotifyCallback<F::Response>>,
    _family: PhantomData<fn() -> F>,
}

impl<F: Family> Multiplexer<F> {
    pub(crate) fn new() -> Self {
        Multiplexer {
            supported: false,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            subscribers: BTreeMap::new(),
            _family: PhantomData,
        }
    }

    /// Whether discovery found this characteristic.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Number of reads waiting for a value.
    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    /// Number of acknowledged writes waiting for completion.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn ensure_supported(&self) -> CubeResult<()> {
        if self.supported {
            Ok(())
        } else {
            Err(CubeError::CharacteristicNotSupported(F::CHARACTERISTIC))
        }
    }

    pub(crate) fn read(
        &mut self,
        link: &Link,
        callback: ReadCallback<F::Response>,
    ) -> CubeResult<()> {
        self.ensure_supported()?;
        let id = F::CHARACTERISTIC;

        if self.reads.is_empty() {
            trace!("Cube[{}]: Reading {}", link.peripheral, id);
            link.central.read_value(link.peripheral, id.uuid());
            metrics::counter!(metric_defs::GATT_READS_ISSUED.name, &link.labels(id)).increment(1);
        } else {
            trace!(
                "Cube[{}]: Joining pending {} read ({} queued)",
                link.peripheral,
                id,
                self.reads.len()
            );
            metrics::counter!(metric_defs::GATT_READS_COALESCED.name, &link.labels(id))
                .increment(1);
        }

        self.reads.push_back(callback);
        Ok(())
    }

    pub(crate) fn subscribe(
        &mut self,
        link: &Link,
        seed: &mut SubscriptionSeed,
        callback: NotifyCallback<F::Response>,
    ) -> CubeResult<SubscriptionId> {
        self.ensure_supported()?;
        let id = F::CHARACTERISTIC;
        let subscription = seed.next_id();
        let was_empty = self.subscribers.is_empty();
        self.subscribers.insert(subscription, callback);

        debug!(
            "Cube[{}]: Subscribed #{} to {}",
            link.peripheral,
            subscription.get(),
            id
        );
        if was_empty {
            self.toggle_notify(link, true);
        }
        self.record_subscribers(link);
        Ok(subscription)
    }

    fn toggle_notify(&self, link: &Link, enabled: bool) {
        let id = F::CHARACTERISTIC;
        trace!("Cube[{}]: Set notify {} = {}", link.peripheral, id, enabled);
        link.central.set_notify(link.peripheral, id.uuid(), enabled);
        let labels = link
            .labels
            .clone()
            .with_characteristic(id.name())
            .with(&[("enabled", enabled.to_string())]);
        metrics::counter!(metric_defs::GATT_NOTIFY_TOGGLES.name, &labels).increment(1);
    }

    fn record_subscribers(&self, link: &Link) {
        metrics::gauge!(
            metric_defs::GATT_ACTIVE_SUBSCRIPTIONS.name,
            &link.labels(F::CHARACTERISTIC)
        )
        .set(self.subscribers.len() as f64);
    }

    fn decode(&self, link: &Link, value: Option<&[u8]>) -> CubeResult<F::Response> {
        let decoded = match value {
            Some(bytes) => F::decode(bytes),
            None => Err(ProtocolError::EmptyPayload),
        };
        decoded.map_err(|err| {
            trace!(
                "Cube[{}]: Undecodable {} value: {}",
                link.peripheral,
                F::CHARACTERISTIC,
                err
            );
            metrics::counter!(
                metric_defs::GATT_DECODE_FAILURES.name,
                &link.labels(F::CHARACTERISTIC)
            )
            .increment(1);
            CubeError::DecodeFailure(err)
        })
    }
}

// ============================================================================
// Type-erased Event Routing
// ============================================================================

/// The family-independent half of a multiplexer, used to route hardware
/// events by characteristic id.
pub(crate) trait EventSink {
    fn is_supported(&self) -> bool;

    fn set_supported(&mut self, supported: bool);

    fn write(
        &mut self,
        link: &Link,
        data: &[u8],
        callback: Option<WriteCallback>,
    ) -> CubeResult<()>;

    /// Removes a subscription. Returns false if it was not registered here.
    fn unsubscribe(&mut self, link: &Link, subscription: SubscriptionId) -> bool;

    /// Returns an error no waiter took, for the unhandled-error channel.
    fn on_value_updated(
        &mut self,
        link: &Link,
        value: Option<&[u8]>,
        error: Option<HardwareError>,
    ) -> Option<CubeError>;

    fn on_write_completed(&mut self, link: &Link, error: Option<HardwareError>)
        -> Option<CubeError>;

    fn on_notify_state_changed(
        &mut self,
        link: &Link,
        enabled: bool,
        error: Option<HardwareError>,
    ) -> Option<CubeError>;

    /// Fails every waiter once with `error` and forgets them.
    fn teardown(&mut self, link: &Link, error: &CubeError);
}

impl<F: Family> EventSink for Multiplexer<F> {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn set_supported(&mut self, supported: bool) {
        self.supported = supported;
    }

    fn write(
        &mut self,
        link: &Link,
        data: &[u8],
        callback: Option<WriteCallback>,
    ) -> CubeResult<()> {
        self.ensure_supported()?;
        let id = F::CHARACTERISTIC;
        let (write_type, response) = match callback {
            Some(_) => (WriteType::WithResponse, "with"),
            None => (WriteType::WithoutResponse, "without"),
        };

        trace!(
            "Cube[{}]: Writing {} bytes to {} ({:?})",
            link.peripheral,
            data.len(),
            id,
            write_type
        );
        link.central.write_value(link.peripheral, id.uuid(), data, write_type);
        let labels = link
            .labels
            .clone()
            .with_characteristic(id.name())
            .with(&[("response", response.to_string())]);
        metrics::counter!(metric_defs::GATT_WRITES_ISSUED.name, &labels).increment(1);

        if let Some(callback) = callback {
            self.writes.push_back(callback);
        }
        Ok(())
    }

    fn unsubscribe(&mut self, link: &Link, subscription: SubscriptionId) -> bool {
        if self.subscribers.remove(&subscription).is_none() {
            return false;
        }

        debug!(
            "Cube[{}]: Unsubscribed #{} from {}",
            link.peripheral,
            subscription.get(),
            F::CHARACTERISTIC
        );
        if self.subscribers.is_empty() {
            self.toggle_notify(link, false);
        }
        self.record_subscribers(link);
        true
    }

    fn on_value_updated(
        &mut self,
        link: &Link,
        value: Option<&[u8]>,
        error: Option<HardwareError>,
    ) -> Option<CubeError> {
        let result = match error {
            Some(err) => Err(CubeError::Hardware(err)),
            None => self.decode(link, value),
        };

        if self.reads.is_empty() && self.subscribers.is_empty() {
            return match result {
                Err(err @ CubeError::Hardware(_)) => Some(err),
                _ => {
                    trace!(
                        "Cube[{}]: {} update with no waiters",
                        link.peripheral,
                        F::CHARACTERISTIC
                    );
                    None
                }
            };
        }

        for callback in self.reads.drain(..) {
            callback(result.clone());
        }

        if !self.subscribers.is_empty() {
            for callback in self.subscribers.values_mut() {
                callback(result.clone());
            }
            metrics::counter!(
                metric_defs::GATT_NOTIFICATIONS_DELIVERED.name,
                &link.labels(F::CHARACTERISTIC)
            )
            .increment(self.subscribers.len() as u64);
        }
        None
    }

    fn on_write_completed(
        &mut self,
        link: &Link,
        error: Option<HardwareError>,
    ) -> Option<CubeError> {
        let result = match error {
            Some(err) => Err(CubeError::Hardware(err)),
            None => Ok(()),
        };

        if self.writes.is_empty() {
            trace!(
                "Cube[{}]: {} write completed with no waiters",
                link.peripheral,
                F::CHARACTERISTIC
            );
            return result.err();
        }

        for callback in self.writes.drain(..) {
            callback(result.clone());
        }
        None
    }

    fn on_notify_state_changed(
        &mut self,
        link: &Link,
        enabled: bool,
        error: Option<HardwareError>,
    ) -> Option<CubeError> {
        let Some(err) = error else {
            trace!(
                "Cube[{}]: Notify {} now {}",
                link.peripheral,
                F::CHARACTERISTIC,
                enabled
            );
            return None;
        };

        let err = CubeError::Hardware(err);
        if self.subscribers.is_empty() {
            return Some(err);
        }
        for callback in self.subscribers.values_mut() {
            callback(Err(err.clone()));
        }
        None
    }

    fn teardown(&mut self, link: &Link, error: &CubeError) {
        let waiters = self.reads.len() + self.writes.len() + self.subscribers.len();
        if waiters > 0 {
            debug!(
                "Cube[{}]: Failing {} waiter(s) on {}: {}",
                link.peripheral,
                waiters,
                F::CHARACTERISTIC,
                error
            );
        }

        for callback in self.reads.drain(..) {
            callback(Err(error.clone()));
        }
        for callback in self.writes.drain(..) {
            callback(Err(error.clone()));
        }
        let had_subscribers = !self.subscribers.is_empty();
        for (_, mut callback) in std::mem::take(&mut self.subscribers) {
            callback(Err(error.clone()));
        }
        if had_subscribers {
            self.record_subscribers(link);
        }
        self.supported = false;
    }
}

// ============================================================================
// Characteristic Set
// ============================================================================

/// The multiplexers of one session, one per characteristic.
pub struct CharacteristicSet {
    pub(crate) location: Multiplexer<Location>,
    pub(crate) motor: Multiplexer<Motor>,
    pub(crate) light: Multiplexer<Light>,
    pub(crate) sound: Multiplexer<Sound>,
    pub(crate) sensor: Multiplexer<Sensor>,
    pub(crate) button: Multiplexer<Button>,
    pub(crate) battery: Multiplexer<Battery>,
    pub(crate) configuration: Multiplexer<Configuration>,
}

impl CharacteristicSet {
    pub(crate) fn new() -> Self {
        CharacteristicSet {
            location: Multiplexer::new(),
            motor: Multiplexer::new(),
            light: Multiplexer::new(),
            sound: Multiplexer::new(),
            sensor: Multiplexer::new(),
            button: Multiplexer::new(),
            battery: Multiplexer::new(),
            configuration: Multiplexer::new(),
        }
    }

    /// The multiplexer of family `F`.
    pub fn get<F: Family>(&self) -> &Multiplexer<F> {
        F::slot(self)
    }

    pub(crate) fn get_mut<F: Family>(&mut self) -> &mut Multiplexer<F> {
        F::slot_mut(self)
    }

    pub(crate) fn route_mut(&mut self, id: CharacteristicId) -> &mut dyn EventSink {
        match id {
            CharacteristicId::Id => &mut self.location,
            CharacteristicId::Motor => &mut self.motor,
            CharacteristicId::Light => &mut self.light,
            CharacteristicId::Sound => &mut self.sound,
            CharacteristicId::Sensor => &mut self.sensor,
            CharacteristicId::Button => &mut self.button,
            CharacteristicId::Battery => &mut self.battery,
            CharacteristicId::Configuration => &mut self.configuration,
        }
    }

    fn route(&self, id: CharacteristicId) -> &dyn EventSink {
        match id {
            CharacteristicId::Id => &self.location,
            CharacteristicId::Motor => &self.motor,
            CharacteristicId::Light => &self.light,
            CharacteristicId::Sound => &self.sound,
            CharacteristicId::Sensor => &self.sensor,
            CharacteristicId::Button => &self.button,
            CharacteristicId::Battery => &self.battery,
            CharacteristicId::Configuration => &self.configuration,
        }
    }

    /// Whether discovery found `id`.
    pub fn is_supported(&self, id: CharacteristicId) -> bool {
        self.route(id).is_supported()
    }

    pub(crate) fn unsubscribe(&mut self, link: &Link, subscription: SubscriptionId) -> bool {
        CharacteristicId::ALL
            .into_iter()
            .any(|id| self.route_mut(id).unsubscribe(link, subscription))
    }

    pub(crate) fn teardown(&mut self, link: &Link, error: &CubeError) {
        for id in CharacteristicId::ALL {
            self.route_mut(id).teardown(link, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::{ChannelCentral, PlatformCommand};
    use corecube_protocol::BatteryResponse;
    use crossbeam_channel::Receiver;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn setup() -> (Link, Receiver<PlatformCommand>) {
        let (central, rx) = ChannelCentral::new();
        let link = Link::new(Arc::new(central), PeripheralId(Uuid::from_u128(0xC0BE)));
        (link, rx)
    }

    fn supported<F: Family>() -> Multiplexer<F> {
        let mut mux = Multiplexer::<F>::new();
        mux.set_supported(true);
        mux
    }

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn recorder<T: Send + 'static>(log: &Log<T>) -> impl FnOnce(T) + Send + 'static {
        let log = log.clone();
        move |value| log.lock().unwrap().push(value)
    }

    #[test]
    fn test_subscription_seed_starts_at_one() {
        let mut seed = SubscriptionSeed::new();
        assert_eq!(seed.next_id().get(), 1);
        assert_eq!(seed.next_id().get(), 2);
    }

    #[test]
    fn test_coalesced_reads_fifo() {
        let (link, rx) = setup();
        let mut mux = supported::<Battery>();
        let order: Log<(usize, u8)> = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            mux.read(
                &link,
                Box::new(move |result: CubeResult<BatteryResponse>| {
                    order.lock().unwrap().push((n, result.unwrap().capacity));
                }),
            )
            .unwrap();
        }

        let reads = rx
            .try_iter()
            .filter(|cmd| matches!(cmd, PlatformCommand::ReadValue { .. }))
            .count();
        assert_eq!(reads, 1);

        assert!(mux.on_value_updated(&link, Some(&[40]), None).is_none());
        assert_eq!(*order.lock().unwrap(), vec![(0, 40), (1, 40), (2, 40)]);
        assert_eq!(mux.pending_reads(), 0);

        // A later update finds no waiters.
        assert!(mux.on_value_updated(&link, Some(&[41]), None).is_none());
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_unsupported_rejects_synchronously() {
        let (link, rx) = setup();
        let mut mux = Multiplexer::<Light>::new();
        let err = mux.write(&link, &[0x01], None).unwrap_err();
        assert_eq!(err, CubeError::CharacteristicNotSupported(CharacteristicId::Light));
        assert!(rx.try_recv().is_err());
        assert_eq!(mux.pending_writes(), 0);
    }

    #[test]
    fn test_write_waiters() {
        let (link, rx) = setup();
        let mut mux = supported::<Configuration>();
        let results: Log<CubeResult<()>> = Arc::new(Mutex::new(Vec::new()));

        mux.write(&link, &[0x01, 0x00], Some(Box::new(recorder(&results))))
            .unwrap();
        mux.write(&link, &[0x05, 0x00, 10], None).unwrap();
        assert_eq!(mux.pending_writes(), 1);

        let commands: Vec<_> = rx.try_iter().collect();
        assert!(matches!(
            commands[0],
            PlatformCommand::WriteValue {
                write_type: WriteType::WithResponse,
                ..
            }
        ));
        assert!(matches!(
            commands[1],
            PlatformCommand::WriteValue {
                write_type: WriteType::WithoutResponse,
                ..
            }
        ));

        assert!(mux.on_write_completed(&link, None).is_none());
        assert_eq!(*results.lock().unwrap(), vec![Ok(())]);
    }

    #[test]
    fn test_write_error_without_waiter_is_unhandled() {
        let (link, _rx) = setup();
        let mut mux = supported::<Motor>();
        let err = mux.on_write_completed(&link, Some(HardwareError::new("busy")));
        assert_eq!(err, Some(CubeError::Hardware(HardwareError::new("busy"))));
        assert!(mux.on_write_completed(&link, None).is_none());
    }

    #[test]
    fn test_value_error_without_waiters_is_unhandled() {
        let (link, _rx) = setup();
        let mut mux = supported::<Sensor>();
        let err = mux.on_value_updated(&link, None, Some(HardwareError::new("gatt 0x05")));
        assert!(matches!(err, Some(CubeError::Hardware(_))));
        // Undecodable bytes without waiters are dropped.
        assert!(mux.on_value_updated(&link, Some(&[0x7F]), None).is_none());
    }

    #[test]
    fn test_notify_toggled_on_transitions_only() {
        let (link, rx) = setup();
        let mut seed = SubscriptionSeed::new();
        let mut mux = supported::<Button>();

        let a = mux.subscribe(&link, &mut seed, Box::new(|_| {})).unwrap();
        let b = mux.subscribe(&link, &mut seed, Box::new(|_| {})).unwrap();
        mux.read(&link, Box::new(|_| {})).unwrap();
        assert!(mux.unsubscribe(&link, a));
        assert!(!mux.unsubscribe(&link, a));
        assert!(mux.unsubscribe(&link, b));

        let toggles: Vec<bool> = rx
            .try_iter()
            .filter_map(|cmd| match cmd {
                PlatformCommand::SetNotify { enabled, .. } => Some(enabled),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }

    #[test]
    fn test_reads_then_subscribers_receive_same_value() {
        let (link, _rx) = setup();
        let mut seed = SubscriptionSeed::new();
        let mut mux = supported::<Battery>();
        let log: Log<&'static str> = Arc::new(Mutex::new(Vec::new()));

        let sub_log = log.clone();
        mux.subscribe(
            &link,
            &mut seed,
            Box::new(move |result| {
                assert_eq!(result, Ok(BatteryResponse { capacity: 9 }));
                sub_log.lock().unwrap().push("subscriber");
            }),
        )
        .unwrap();
        let read_log = log.clone();
        mux.read(
            &link,
            Box::new(move |result| {
                assert_eq!(result, Ok(BatteryResponse { capacity: 9 }));
                read_log.lock().unwrap().push("read");
            }),
        )
        .unwrap();

        mux.on_value_updated(&link, Some(&[9]), None);
        assert_eq!(*log.lock().unwrap(), vec!["read", "subscriber"]);
    }

    #[test]
    fn test_decode_failure_delivered_to_waiters() {
        let (link, _rx) = setup();
        let mut mux = supported::<Motor>();
        let results: Log<CubeResult<corecube_protocol::MotorResponse>> =
            Arc::new(Mutex::new(Vec::new()));
        mux.read(&link, Box::new(recorder(&results))).unwrap();

        mux.on_value_updated(&link, Some(&[0x83]), None);
        assert!(matches!(
            results.lock().unwrap()[0],
            Err(CubeError::DecodeFailure(ProtocolError::FrameTooShort { .. }))
        ));
    }

    #[test]
    fn test_notify_state_error_routing() {
        let (link, _rx) = setup();
        let mut seed = SubscriptionSeed::new();
        let mut mux = supported::<Location>();

        let err = mux.on_notify_state_changed(&link, true, Some(HardwareError::new("denied")));
        assert!(err.is_some());

        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        mux.subscribe(
            &link,
            &mut seed,
            Box::new(move |result| {
                assert!(result.is_err());
                *counter.lock().unwrap() += 1;
            }),
        )
        .unwrap();
        let err = mux.on_notify_state_changed(&link, true, Some(HardwareError::new("denied")));
        assert!(err.is_none());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_teardown_fails_everything_once() {
        let (link, _rx) = setup();
        let mut seed = SubscriptionSeed::new();
        let mut mux = supported::<Battery>();
        let count = Arc::new(Mutex::new(0));

        for _ in 0..2 {
            let count = count.clone();
            mux.read(
                &link,
                Box::new(move |result| {
                    assert_eq!(result, Err(CubeError::Disconnected));
                    *count.lock().unwrap() += 1;
                }),
            )
            .unwrap();
        }
        let sub_count = count.clone();
        mux.subscribe(
            &link,
            &mut seed,
            Box::new(move |_| *sub_count.lock().unwrap() += 1),
        )
        .unwrap();

        mux.teardown(&link, &CubeError::Disconnected);
        assert_eq!(*count.lock().unwrap(), 3);
        assert_eq!(mux.subscriber_count(), 0);
        assert!(!mux.is_supported());

        mux.on_value_updated(&link, Some(&[1]), None);
        assert_eq!(*count.lock().unwrap(), 3);
    }
}
