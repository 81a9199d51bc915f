//! Device registry and scanner.
//!
//! [`CubeManager`] owns one [`Cube`] session per discovered peripheral,
//! gates scanning on the radio power state, and routes every [`BleEvent`]
//! to the session it concerns. Sessions reach the BLE stack only through the
//! shared [`Central`]; nothing points back at the manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corecube_metrics::metric_defs;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::central::{BleEvent, Central, PeripheralId, RadioState, TimerId, TimerOwner};
use crate::characteristic::SERVICE;
use crate::config::ClientConfig;
use crate::cube::{ConnectionState, Cube};
use crate::error::{CubeError, CubeResult, HardwareError};

/// Callback resolved by [`CubeManager::wait_for_cube`].
pub type ScanCallback = Box<dyn FnOnce(CubeResult<PeripheralId>) + Send>;

/// Notifications from the registry and its sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum CubeEvent {
    /// A cube was discovered for the first time since the scan started.
    CubeFound {
        peripheral: PeripheralId,
        name: Option<String>,
    },
    /// A hardware error no pending operation could take.
    UnhandledError {
        peripheral: PeripheralId,
        error: CubeError,
    },
    /// A ready cube lost its link or finished disconnecting.
    Disconnected { peripheral: PeripheralId },
}

/// Registry of discovered cubes.
pub struct CubeManager {
    central: Arc<dyn Central>,
    config: ClientConfig,
    cubes: HashMap<PeripheralId, Cube>,
    /// Discovery order.
    found: Vec<PeripheralId>,
    radio: RadioState,
    scan_requested: bool,
    scanning: bool,
    scan_waiters: Vec<ScanCallback>,
    scan_timer: Option<TimerId>,
    scan_generation: u64,
    event_tx: Sender<CubeEvent>,
    event_rx: Receiver<CubeEvent>,
}

impl CubeManager {
    /// Create a registry on top of a BLE stack.
    pub fn new(central: Arc<dyn Central>, config: ClientConfig) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        CubeManager {
            central,
            config,
            cubes: HashMap::new(),
            found: Vec::new(),
            radio: RadioState::Unknown,
            scan_requested: false,
            scanning: false,
            scan_waiters: Vec::new(),
            scan_timer: None,
            scan_generation: 0,
            event_tx,
            event_rx,
        }
    }

    /// Receiver for [`CubeEvent`]s. Every clone competes for the same events.
    pub fn events(&self) -> Receiver<CubeEvent> {
        self.event_rx.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio
    }

    /// Whether a hardware scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn cube(&self, peripheral: PeripheralId) -> Option<&Cube> {
        self.cubes.get(&peripheral)
    }

    pub fn cube_mut(&mut self, peripheral: PeripheralId) -> Option<&mut Cube> {
        self.cubes.get_mut(&peripheral)
    }

    /// Discovered cubes, in discovery order.
    pub fn found_cubes(&self) -> impl Iterator<Item = &Cube> {
        self.found.iter().filter_map(|id| self.cubes.get(id))
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Request scanning. Takes effect once the radio is powered on.
    pub fn start_scan(&mut self) {
        self.scan_requested = true;
        self.update_scan_state();
    }

    /// Withdraw the scan request.
    pub fn stop_scan(&mut self) {
        self.scan_requested = false;
        self.update_scan_state();
    }

    /// Bring the hardware scan in line with the request and radio state.
    fn update_scan_state(&mut self) {
        let wanted = self.scan_requested && self.radio == RadioState::PoweredOn;
        if wanted && !self.scanning {
            self.reset_found();
            info!("CubeManager: Scanning");
            self.central.scan_for_peripherals(SERVICE);
            self.scanning = true;
        } else if !wanted && self.scanning {
            info!("CubeManager: Scan stopped");
            if self.radio == RadioState::PoweredOn {
                self.central.stop_scan();
            }
            self.scanning = false;
        }
    }

    /// Forget cubes that are neither connected nor connecting.
    fn reset_found(&mut self) {
        let cubes = &mut self.cubes;
        self.found.retain(|id| {
            let keep = cubes
                .get(id)
                .is_some_and(|cube| cube.state() != ConnectionState::Idle);
            if !keep {
                if let Some(mut cube) = cubes.remove(id) {
                    cube.close();
                }
            }
            keep
        });
    }

    /// Scan until a cube is found, then resolve `callback` with it and stop
    /// the scan.
    ///
    /// `timeout` overrides the configured scan timeout; with neither set the
    /// wait is unbounded. A timeout resolves with [`CubeError::ScanTimeout`]
    /// and also stops the scan.
    pub fn wait_for_cube(
        &mut self,
        timeout: Option<Duration>,
        callback: impl FnOnce(CubeResult<PeripheralId>) + Send + 'static,
    ) {
        self.scan_waiters.push(Box::new(callback));

        if self.scan_timer.is_none() {
            if let Some(timeout) = timeout.or_else(|| self.config.scan_timeout()) {
                self.scan_generation += 1;
                let timer = TimerId {
                    owner: TimerOwner::Scan,
                    generation: self.scan_generation,
                };
                self.central.schedule_timer(timer, timeout);
                self.scan_timer = Some(timer);
            }
        }
        self.start_scan();
    }

    fn resolve_scan_waiters(&mut self, result: CubeResult<PeripheralId>) {
        if let Some(timer) = self.scan_timer.take() {
            self.central.cancel_timer(timer);
        }
        for callback in self.scan_waiters.drain(..) {
            callback(result.clone());
        }
    }

    fn on_scan_timer(&mut self, timer: TimerId) {
        if self.scan_timer != Some(timer) {
            trace!("CubeManager: Stale scan timer ignored");
            return;
        }
        self.scan_timer = None;

        warn!("CubeManager: Scan timed out");
        metrics::counter!(metric_defs::SCAN_TIMEOUTS.name).increment(1);
        self.resolve_scan_waiters(Err(CubeError::ScanTimeout));
        self.stop_scan();
    }

    // ========================================================================
    // Connection Brokering
    // ========================================================================

    /// Connect to a discovered cube with the configured timeout.
    pub fn connect(
        &mut self,
        peripheral: PeripheralId,
        callback: impl FnOnce(CubeResult<PeripheralId>) + Send + 'static,
    ) -> CubeResult<()> {
        let timeout = self.config.connection_timeout();
        self.connect_with_timeout(peripheral, timeout, callback)
    }

    pub fn connect_with_timeout(
        &mut self,
        peripheral: PeripheralId,
        timeout: Duration,
        callback: impl FnOnce(CubeResult<PeripheralId>) + Send + 'static,
    ) -> CubeResult<()> {
        self.cubes
            .get_mut(&peripheral)
            .ok_or(CubeError::UnknownCube(peripheral))?
            .connect(timeout, callback)
    }

    pub fn disconnect(&mut self, peripheral: PeripheralId) -> CubeResult<()> {
        self.cubes
            .get_mut(&peripheral)
            .ok_or(CubeError::UnknownCube(peripheral))?
            .disconnect();
        Ok(())
    }

    /// Drop a cube from the registry, failing anything still pending on it.
    pub fn remove_cube(&mut self, peripheral: PeripheralId) -> Option<Cube> {
        self.found.retain(|id| *id != peripheral);
        let mut cube = self.cubes.remove(&peripheral)?;
        cube.close();
        Some(cube)
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    /// Process one event from the BLE stack.
    pub fn handle_event(&mut self, event: BleEvent) {
        match event {
            BleEvent::RadioStateChanged(state) => self.on_radio_state(state),

            BleEvent::PeripheralDiscovered {
                peripheral,
                name,
                services,
            } => {
                if !services.is_empty() && !services.contains(&SERVICE) {
                    trace!("CubeManager: Ignoring non-cube {}", peripheral);
                    return;
                }
                self.on_discovered(peripheral, name);
            }

            BleEvent::Connected { peripheral } => {
                self.with_cube(peripheral, |cube| cube.on_connected());
            }

            BleEvent::ConnectFailed { peripheral, error } => {
                self.with_cube(peripheral, |cube| cube.on_connect_failed(error));
            }

            BleEvent::Disconnected { peripheral, error } => {
                self.with_cube(peripheral, |cube| cube.on_disconnected(error));
            }

            BleEvent::ServicesDiscovered {
                peripheral,
                services,
                error,
            } => {
                self.with_cube(peripheral, |cube| {
                    cube.on_services_discovered(&services, error)
                });
            }

            BleEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                characteristics,
                error,
            } => {
                self.with_cube(peripheral, |cube| {
                    cube.on_characteristics_discovered(service, &characteristics, error)
                });
            }

            BleEvent::ValueUpdated {
                peripheral,
                characteristic,
                value,
                error,
            } => {
                self.with_cube(peripheral, |cube| {
                    cube.on_value_updated(characteristic, value.as_deref(), error)
                });
            }

            BleEvent::WriteCompleted {
                peripheral,
                characteristic,
                error,
            } => {
                self.with_cube(peripheral, |cube| {
                    cube.on_write_completed(characteristic, error)
                });
            }

            BleEvent::NotifyStateChanged {
                peripheral,
                characteristic,
                enabled,
                error,
            } => {
                self.with_cube(peripheral, |cube| {
                    cube.on_notify_state_changed(characteristic, enabled, error)
                });
            }

            BleEvent::TimerFired(timer) => match timer.owner {
                TimerOwner::Scan => self.on_scan_timer(timer),
                TimerOwner::Connect(peripheral) => {
                    self.with_cube(peripheral, |cube| cube.on_timer(timer));
                }
            },
        }
    }

    /// Handle events until every sender of `rx` is dropped.
    pub fn run(&mut self, rx: &Receiver<BleEvent>) {
        while let Ok(event) = rx.recv() {
            self.handle_event(event);
        }
        debug!("CubeManager: Event channel closed");
    }

    /// Handle every event already queued on `rx`. Returns how many ran.
    pub fn process_pending(&mut self, rx: &Receiver<BleEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn with_cube(&mut self, peripheral: PeripheralId, f: impl FnOnce(&mut Cube)) {
        match self.cubes.get_mut(&peripheral) {
            Some(cube) => f(cube),
            None => trace!("CubeManager: Event for unknown peripheral {}", peripheral),
        }
    }

    fn on_radio_state(&mut self, state: RadioState) {
        if state == self.radio {
            return;
        }
        info!("CubeManager: Radio {:?} -> {:?}", self.radio, state);
        self.radio = state;

        if state != RadioState::PoweredOn {
            // The stack has already stopped scanning.
            self.scanning = false;
            if !self.config.auto_restart_scan {
                self.scan_requested = false;
            }
            for cube in self.cubes.values_mut() {
                if cube.state() != ConnectionState::Idle {
                    cube.on_disconnected(Some(HardwareError::new("radio powered off")));
                }
            }
        }
        self.update_scan_state();
    }

    fn on_discovered(&mut self, peripheral: PeripheralId, name: Option<String>) {
        if let Some(cube) = self.cubes.get_mut(&peripheral) {
            cube.set_name(name);
            return;
        }

        info!(
            "CubeManager: Found cube {} ({})",
            peripheral,
            name.as_deref().unwrap_or("unnamed")
        );
        let cube = Cube::new(
            self.central.clone(),
            peripheral,
            name.clone(),
            self.event_tx.clone(),
        );
        self.cubes.insert(peripheral, cube);
        self.found.push(peripheral);
        metrics::counter!(metric_defs::SCAN_CUBES_DISCOVERED.name).increment(1);

        if self.event_tx.send(CubeEvent::CubeFound { peripheral, name }).is_err() {
            trace!("CubeManager: No event listener");
        }
        if !self.scan_waiters.is_empty() {
            self.resolve_scan_waiters(Ok(peripheral));
            self.stop_scan();
        }
    }
}
