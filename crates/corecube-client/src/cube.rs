//! Device session: one per discovered cube.
//!
//! Owns the cube's [`CharacteristicSet`] and the connection state machine:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──connected──▶ Discovering ──ready──▶ Ready
//!  ▲                   │ timeout / failed          │ missing service    │ disconnect()
//!  │                   ▼                           ▼                    ▼
//!  └───────────────── Idle ◀───────────────────── Idle ◀──────── Disconnecting
//! ```
//!
//! Every transition is driven by [`BleEvent`](crate::BleEvent)s delivered on
//! one thread, so a timeout racing a hardware connect is settled by which of
//! the two events arrives first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use corecube_metrics::metric_defs;
use crossbeam_channel::Sender;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::central::{Central, PeripheralId, TimerId, TimerOwner};
use crate::characteristic::{CharacteristicId, SERVICE};
use crate::error::{CubeError, CubeResult, HardwareError};
use crate::manager::CubeEvent;
use crate::multiplexer::{CharacteristicSet, Link, SubscriptionSeed};

/// Callback resolved when a connect attempt finishes.
pub type ConnectCallback = Box<dyn FnOnce(CubeResult<PeripheralId>) + Send>;

// ============================================================================
// Connection State
// ============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect` may be called.
    Idle,
    /// Waiting for the hardware connect, with a timeout running.
    Connecting,
    /// Connected, discovering the service and its characteristics.
    Discovering,
    /// Usable.
    Ready,
    /// `disconnect` was called on a ready cube.
    Disconnecting,
    /// Released by the registry. Terminal.
    Disconnected,
}

struct PendingConnect {
    callback: ConnectCallback,
    /// Armed only while in `Connecting`.
    timer: Option<TimerId>,
    started: Instant,
}

// ============================================================================
// Cube
// ============================================================================

/// A session with one cube.
pub struct Cube {
    pub(crate) link: Link,
    name: Option<String>,
    state: ConnectionState,
    pub(crate) characteristics: CharacteristicSet,
    pub(crate) subscriptions: SubscriptionSeed,
    pending: Option<PendingConnect>,
    timer_generation: u64,
    events: Sender<CubeEvent>,
}

impl Cube {
    pub(crate) fn new(
        central: Arc<dyn Central>,
        peripheral: PeripheralId,
        name: Option<String>,
        events: Sender<CubeEvent>,
    ) -> Self {
        Cube {
            link: Link::new(central, peripheral),
            name,
            state: ConnectionState::Idle,
            characteristics: CharacteristicSet::new(),
            subscriptions: SubscriptionSeed::new(),
            pending: None,
            timer_generation: 0,
            events,
        }
    }

    /// Platform identifier of the cube.
    pub fn peripheral(&self) -> PeripheralId {
        self.link.peripheral
    }

    /// Identifier as a string.
    pub fn identifier(&self) -> String {
        self.link.peripheral.to_string()
    }

    /// Advertised name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        if name.is_some() {
            self.name = name;
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the cube is ready for feature operations.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// The cube's multiplexers.
    pub fn characteristics(&self) -> &CharacteristicSet {
        &self.characteristics
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(
                "Cube[{}]: {:?} -> {:?}",
                self.link.peripheral, self.state, state
            );
            self.state = state;
        }
    }

    // ========================================================================
    // Connect / Disconnect
    // ========================================================================

    /// Start connecting. `callback` fires once with the outcome.
    ///
    /// Rejected with [`CubeError::AlreadyConnecting`] unless the session is
    /// idle; the callback is then dropped without being called.
    pub fn connect(
        &mut self,
        timeout: Duration,
        callback: impl FnOnce(CubeResult<PeripheralId>) + Send + 'static,
    ) -> CubeResult<()> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Disconnected => return Err(CubeError::SessionClosed),
            _ => return Err(CubeError::AlreadyConnecting),
        }

        self.timer_generation += 1;
        let timer = TimerId {
            owner: TimerOwner::Connect(self.link.peripheral),
            generation: self.timer_generation,
        };

        info!(
            "Cube[{}]: Connecting (timeout {:.1}s)",
            self.link.peripheral,
            timeout.as_secs_f64()
        );
        self.set_state(ConnectionState::Connecting);
        self.pending = Some(PendingConnect {
            callback: Box::new(callback),
            timer: Some(timer),
            started: Instant::now(),
        });
        metrics::counter!(
            metric_defs::SESSION_CONNECT_ATTEMPTS.name,
            &self.link.labels.to_labels()
        )
        .increment(1);

        self.link.central.schedule_timer(timer, timeout);
        self.link.central.connect(self.link.peripheral);
        Ok(())
    }

    /// Disconnect, or abandon a connect in progress.
    ///
    /// A pending connect resolves with [`CubeError::DisconnectedWhileConnecting`].
    /// A ready cube moves to `Disconnecting` until the hardware confirms.
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Discovering => {
                debug!("Cube[{}]: Disconnect while connecting", self.link.peripheral);
                self.link.central.cancel_connection(self.link.peripheral);
                self.set_state(ConnectionState::Idle);
                self.finish_connect(Err(CubeError::DisconnectedWhileConnecting));
            }
            ConnectionState::Ready => {
                info!("Cube[{}]: Disconnecting", self.link.peripheral);
                self.set_state(ConnectionState::Disconnecting);
                self.link.central.cancel_connection(self.link.peripheral);
            }
            ConnectionState::Idle
            | ConnectionState::Disconnecting
            | ConnectionState::Disconnected => {
                trace!(
                    "Cube[{}]: Disconnect ignored in {:?}",
                    self.link.peripheral,
                    self.state
                );
            }
        }
    }

    /// Resolve the pending connect, cancelling its timer if still armed.
    fn finish_connect(&mut self, result: CubeResult<PeripheralId>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if let Some(timer) = pending.timer {
            self.link.central.cancel_timer(timer);
        }

        let labels = self.link.labels.to_labels();
        match &result {
            Ok(_) => {
                metrics::counter!(metric_defs::SESSION_CONNECT_SUCCESSES.name, &labels)
                    .increment(1);
                metrics::histogram!(metric_defs::SESSION_CONNECT_DURATION.name, &labels)
                    .record(pending.started.elapsed().as_secs_f64());
            }
            Err(CubeError::ConnectionTimeout) => {
                metrics::counter!(metric_defs::SESSION_CONNECT_TIMEOUTS.name, &labels)
                    .increment(1);
            }
            Err(_) => {
                metrics::counter!(metric_defs::SESSION_CONNECT_FAILURES.name, &labels)
                    .increment(1);
            }
        }

        (pending.callback)(result);
    }

    /// Release the session for good, failing anything still waiting.
    pub(crate) fn close(&mut self) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Discovering => {
                self.link.central.cancel_connection(self.link.peripheral);
                self.finish_connect(Err(CubeError::DisconnectedWhileConnecting));
            }
            ConnectionState::Ready | ConnectionState::Disconnecting => {
                self.link.central.cancel_connection(self.link.peripheral);
                self.characteristics.teardown(&self.link, &CubeError::Disconnected);
            }
            ConnectionState::Idle | ConnectionState::Disconnected => {}
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ========================================================================
    // Hardware Events
    // ========================================================================

    pub(crate) fn on_timer(&mut self, timer: TimerId) {
        let armed = self.pending.as_ref().and_then(|p| p.timer) == Some(timer);
        if self.state != ConnectionState::Connecting || !armed {
            trace!(
                "Cube[{}]: Stale timer {:?} ignored",
                self.link.peripheral,
                timer
            );
            return;
        }

        warn!("Cube[{}]: Connection timed out", self.link.peripheral);
        if let Some(pending) = self.pending.as_mut() {
            pending.timer = None;
        }
        self.link.central.cancel_connection(self.link.peripheral);
        self.set_state(ConnectionState::Idle);
        self.finish_connect(Err(CubeError::ConnectionTimeout));
    }

    pub(crate) fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            trace!(
                "Cube[{}]: Connected event ignored in {:?}",
                self.link.peripheral,
                self.state
            );
            return;
        }

        if let Some(timer) = self.pending.as_mut().and_then(|p| p.timer.take()) {
            self.link.central.cancel_timer(timer);
        }
        self.set_state(ConnectionState::Discovering);
        self.link
            .central.discover_services(self.link.peripheral, &[SERVICE]);
    }

    pub(crate) fn on_connect_failed(&mut self, error: Option<HardwareError>) {
        if self.state != ConnectionState::Connecting {
            trace!(
                "Cube[{}]: Connect failure ignored in {:?}",
                self.link.peripheral,
                self.state
            );
            return;
        }

        let error = error.map_or(CubeError::ConnectionFailedNoReason, CubeError::Hardware);
        warn!("Cube[{}]: Connect failed: {}", self.link.peripheral, error);
        self.set_state(ConnectionState::Idle);
        self.finish_connect(Err(error));
    }

    pub(crate) fn on_services_discovered(
        &mut self,
        services: &[Uuid],
        error: Option<HardwareError>,
    ) {
        if self.state != ConnectionState::Discovering {
            return;
        }
        if let Some(error) = error {
            warn!(
                "Cube[{}]: Service discovery failed: {}",
                self.link.peripheral, error
            );
            self.fail_discovery();
            return;
        }
        if !services.contains(&SERVICE) {
            warn!("Cube[{}]: Cube service not found", self.link.peripheral);
            self.fail_discovery();
            return;
        }

        self.link.central.discover_characteristics(
            self.link.peripheral,
            SERVICE,
            &CharacteristicId::all_uuids(),
        );
    }

    pub(crate) fn on_characteristics_discovered(
        &mut self,
        service: Uuid,
        characteristics: &[Uuid],
        error: Option<HardwareError>,
    ) {
        if self.state != ConnectionState::Discovering || service != SERVICE {
            return;
        }
        if let Some(error) = error {
            warn!(
                "Cube[{}]: Characteristic discovery failed: {}",
                self.link.peripheral, error
            );
            self.fail_discovery();
            return;
        }

        let found: Vec<CharacteristicId> = characteristics
            .iter()
            .filter_map(|uuid| CharacteristicId::from_uuid(*uuid))
            .collect();
        if found.is_empty() {
            warn!("Cube[{}]: No known characteristics", self.link.peripheral);
            self.fail_discovery();
            return;
        }

        for id in CharacteristicId::ALL {
            self.characteristics
                .route_mut(id)
                .set_supported(found.contains(&id));
        }
        info!(
            "Cube[{}]: Ready ({} characteristics)",
            self.link.peripheral,
            found.len()
        );
        self.set_state(ConnectionState::Ready);
        let peripheral = self.link.peripheral;
        self.finish_connect(Ok(peripheral));
    }

    fn fail_discovery(&mut self) {
        self.link.central.cancel_connection(self.link.peripheral);
        self.set_state(ConnectionState::Idle);
        self.finish_connect(Err(CubeError::RequiredServiceNotFound));
    }

    pub(crate) fn on_disconnected(&mut self, error: Option<HardwareError>) {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Discovering => {
                warn!(
                    "Cube[{}]: Link lost while connecting",
                    self.link.peripheral
                );
                self.set_state(ConnectionState::Idle);
                self.finish_connect(Err(CubeError::DisconnectedWhileConnecting));
            }
            ConnectionState::Disconnecting => {
                self.characteristics.teardown(&self.link, &CubeError::Disconnected);
                self.set_state(ConnectionState::Idle);
                info!("Cube[{}]: Disconnected", self.link.peripheral);
                self.emit(CubeEvent::Disconnected {
                    peripheral: self.link.peripheral,
                });
            }
            ConnectionState::Ready => {
                self.characteristics.teardown(&self.link, &CubeError::Disconnected);
                self.set_state(ConnectionState::Idle);
                metrics::counter!(
                    metric_defs::SESSION_DISCONNECTS.name,
                    &self.link.labels.to_labels()
                )
                .increment(1);
                self.report_unhandled(error.map_or(CubeError::Disconnected, CubeError::Hardware));
                self.emit(CubeEvent::Disconnected {
                    peripheral: self.link.peripheral,
                });
            }
            ConnectionState::Idle | ConnectionState::Disconnected => {
                trace!(
                    "Cube[{}]: Disconnect event ignored in {:?}",
                    self.link.peripheral,
                    self.state
                );
            }
        }
    }

    fn accepts_traffic(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Ready | ConnectionState::Disconnecting
        )
    }

    pub(crate) fn on_value_updated(
        &mut self,
        characteristic: Uuid,
        value: Option<&[u8]>,
        error: Option<HardwareError>,
    ) {
        let Some(id) = self.traffic_target(characteristic) else {
            return;
        };
        if let Some(err) = self
            .characteristics
            .route_mut(id)
            .on_value_updated(&self.link, value, error)
        {
            self.report_unhandled(err);
        }
    }

    pub(crate) fn on_write_completed(
        &mut self,
        characteristic: Uuid,
        error: Option<HardwareError>,
    ) {
        let Some(id) = self.traffic_target(characteristic) else {
            return;
        };
        if let Some(err) = self
            .characteristics
            .route_mut(id)
            .on_write_completed(&self.link, error)
        {
            self.report_unhandled(err);
        }
    }

    pub(crate) fn on_notify_state_changed(
        &mut self,
        characteristic: Uuid,
        enabled: bool,
        error: Option<HardwareError>,
    ) {
        let Some(id) = self.traffic_target(characteristic) else {
            return;
        };
        if let Some(err) = self
            .characteristics
            .route_mut(id)
            .on_notify_state_changed(&self.link, enabled, error)
        {
            self.report_unhandled(err);
        }
    }

    fn traffic_target(&self, characteristic: Uuid) -> Option<CharacteristicId> {
        if !self.accepts_traffic() {
            trace!(
                "Cube[{}]: Characteristic event ignored in {:?}",
                self.link.peripheral,
                self.state
            );
            return None;
        }
        let id = CharacteristicId::from_uuid(characteristic);
        if id.is_none() {
            trace!(
                "Cube[{}]: Event for unknown characteristic {}",
                self.link.peripheral,
                characteristic
            );
        }
        id
    }

    // ========================================================================
    // Delegate Channel
    // ========================================================================

    fn report_unhandled(&self, error: CubeError) {
        warn!("Cube[{}]: Unhandled error: {}", self.link.peripheral, error);
        metrics::counter!(
            metric_defs::SESSION_UNHANDLED_ERRORS.name,
            &self.link.labels.to_labels()
        )
        .increment(1);
        self.emit(CubeEvent::UnhandledError {
            peripheral: self.link.peripheral,
            error,
        });
    }

    fn emit(&self, event: CubeEvent) {
        if self.events.send(event).is_err() {
            trace!("Cube[{}]: No event listener", self.link.peripheral);
        }
    }
}

impl std::fmt::Debug for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cube")
            .field("peripheral", &self.link.peripheral)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
