//! Boundary to the platform BLE stack.
//!
//! The client never talks to a radio directly. Hardware requests go out
//! through a [`Central`], and everything the stack reports comes back as a
//! [`BleEvent`] fed to [`CubeManager::handle_event`](crate::CubeManager::handle_event)
//! on one thread. Timers are part of the same boundary so that a timeout and
//! a hardware event are always ordered on that thread.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;
use uuid::Uuid;

use crate::error::HardwareError;

// ============================================================================
// Identifiers
// ============================================================================

/// Platform identifier of a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(pub Uuid);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Who a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    /// The registry's scan timeout.
    Scan,
    /// A session's connection timeout.
    Connect(PeripheralId),
}

/// Timer handle. The generation distinguishes successive timers of one owner,
/// so a late expiry of a cancelled timer is recognized and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub owner: TimerOwner,
    pub generation: u64,
}

/// Whether a write asks the peripheral for an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// Power state of the host radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioState {
    #[default]
    Unknown,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

// ============================================================================
// Central
// ============================================================================

/// Requests the client makes of the BLE stack.
///
/// All methods are fire-and-forget; outcomes arrive later as [`BleEvent`]s.
pub trait Central: Send + Sync {
    fn scan_for_peripherals(&self, service: Uuid);
    fn stop_scan(&self);
    fn connect(&self, peripheral: PeripheralId);
    fn cancel_connection(&self, peripheral: PeripheralId);
    fn discover_services(&self, peripheral: PeripheralId, services: &[Uuid]);
    fn discover_characteristics(
        &self,
        peripheral: PeripheralId,
        service: Uuid,
        characteristics: &[Uuid],
    );
    fn read_value(&self, peripheral: PeripheralId, characteristic: Uuid);
    fn write_value(
        &self,
        peripheral: PeripheralId,
        characteristic: Uuid,
        data: &[u8],
        write_type: WriteType,
    );
    fn set_notify(&self, peripheral: PeripheralId, characteristic: Uuid, enabled: bool);

    /// Deliver `BleEvent::TimerFired(timer)` after `after` elapses.
    fn schedule_timer(&self, timer: TimerId, after: Duration);
    /// Best effort; a timer that already fired is still delivered.
    fn cancel_timer(&self, timer: TimerId);
}

/// Everything the BLE stack reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum BleEvent {
    RadioStateChanged(RadioState),
    PeripheralDiscovered {
        peripheral: PeripheralId,
        name: Option<String>,
        services: Vec<Uuid>,
    },
    Connected {
        peripheral: PeripheralId,
    },
    ConnectFailed {
        peripheral: PeripheralId,
        error: Option<HardwareError>,
    },
    Disconnected {
        peripheral: PeripheralId,
        error: Option<HardwareError>,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        services: Vec<Uuid>,
        error: Option<HardwareError>,
    },
    CharacteristicsDiscovered {
        peripheral: PeripheralId,
        service: Uuid,
        characteristics: Vec<Uuid>,
        error: Option<HardwareError>,
    },
    ValueUpdated {
        peripheral: PeripheralId,
        characteristic: Uuid,
        value: Option<Vec<u8>>,
        error: Option<HardwareError>,
    },
    WriteCompleted {
        peripheral: PeripheralId,
        characteristic: Uuid,
        error: Option<HardwareError>,
    },
    NotifyStateChanged {
        peripheral: PeripheralId,
        characteristic: Uuid,
        enabled: bool,
        error: Option<HardwareError>,
    },
    TimerFired(TimerId),
}

// ============================================================================
// Channel Central
// ============================================================================

/// A [`Central`] request, as sent by [`ChannelCentral`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCommand {
    ScanForPeripherals {
        service: Uuid,
    },
    StopScan,
    Connect {
        peripheral: PeripheralId,
    },
    CancelConnection {
        peripheral: PeripheralId,
    },
    DiscoverServices {
        peripheral: PeripheralId,
        services: Vec<Uuid>,
    },
    DiscoverCharacteristics {
        peripheral: PeripheralId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    ReadValue {
        peripheral: PeripheralId,
        characteristic: Uuid,
    },
    WriteValue {
        peripheral: PeripheralId,
        characteristic: Uuid,
        data: Vec<u8>,
        write_type: WriteType,
    },
    SetNotify {
        peripheral: PeripheralId,
        characteristic: Uuid,
        enabled: bool,
    },
    ScheduleTimer {
        timer: TimerId,
        after: Duration,
    },
    CancelTimer {
        timer: TimerId,
    },
}

/// Forwards every request to a channel, for a BLE stack running on its own
/// thread (or a test) to execute.
#[derive(Debug, Clone)]
pub struct ChannelCentral {
    cmd_tx: Sender<PlatformCommand>,
}

impl ChannelCentral {
    /// Create a central and the receiver its commands arrive on.
    pub fn new() -> (Self, Receiver<PlatformCommand>) {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        (ChannelCentral { cmd_tx }, cmd_rx)
    }

    fn send(&self, cmd: PlatformCommand) {
        if let Err(err) = self.cmd_tx.send(cmd) {
            trace!("ChannelCentral: receiver gone, dropping {:?}", err.into_inner());
        }
    }
}

impl Central for ChannelCentral {
    fn scan_for_peripherals(&self, service: Uuid) {
        self.send(PlatformCommand::ScanForPeripherals { service });
    }

    fn stop_scan(&self) {
        self.send(PlatformCommand::StopScan);
    }

    fn connect(&self, peripheral: PeripheralId) {
        self.send(PlatformCommand::Connect { peripheral });
    }

    fn cancel_connection(&self, peripheral: PeripheralId) {
        self.send(PlatformCommand::CancelConnection { peripheral });
    }

    fn discover_services(&self, peripheral: PeripheralId, services: &[Uuid]) {
        self.send(PlatformCommand::DiscoverServices {
            peripheral,
            services: services.to_vec(),
        });
    }

    fn discover_characteristics(
        &self,
        peripheral: PeripheralId,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        self.send(PlatformCommand::DiscoverCharacteristics {
            peripheral,
            service,
            characteristics: characteristics.to_vec(),
        });
    }

    fn read_value(&self, peripheral: PeripheralId, characteristic: Uuid) {
        self.send(PlatformCommand::ReadValue {
            peripheral,
            characteristic,
        });
    }

    fn write_value(
        &self,
        peripheral: PeripheralId,
        characteristic: Uuid,
        data: &[u8],
        write_type: WriteType,
    ) {
        self.send(PlatformCommand::WriteValue {
            peripheral,
            characteristic,
            data: data.to_vec(),
            write_type,
        });
    }

    fn set_notify(&self, peripheral: PeripheralId, characteristic: Uuid, enabled: bool) {
        self.send(PlatformCommand::SetNotify {
            peripheral,
            characteristic,
            enabled,
        });
    }

    fn schedule_timer(&self, timer: TimerId, after: Duration) {
        self.send(PlatformCommand::ScheduleTimer { timer, after });
    }

    fn cancel_timer(&self, timer: TimerId) {
        self.send(PlatformCommand::CancelTimer { timer });
    }
}
