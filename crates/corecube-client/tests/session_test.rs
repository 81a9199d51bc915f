//! Session integration tests.
//!
//! These drive a `CubeManager` through a `ChannelCentral`, playing the part of
//! the BLE stack: every request the client makes is read back from the
//! command channel, and every hardware outcome is injected as a `BleEvent`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use corecube_client::family::{Battery, Light, Location};
use corecube_client::protocol::{LightRequest, LightUnit, PositionId};
use corecube_client::{
    BleEvent, ChannelCentral, CharacteristicId, ClientConfig, ConnectionState, CubeError,
    CubeEvent, CubeManager, CubeResult, HardwareError, PeripheralId, PlatformCommand, RadioState,
    SubscriptionId, TimerId, WriteType, SERVICE,
};
use crossbeam_channel::Receiver;
use uuid::Uuid;

// ============================================================================
// Harness
// ============================================================================

type Log<T> = Arc<Mutex<Vec<T>>>;

fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

fn push<T: Send + 'static>(log: &Log<T>) -> impl FnOnce(T) + Send + 'static {
    let log = log.clone();
    move |value| log.lock().unwrap().push(value)
}

struct Harness {
    manager: CubeManager,
    commands: Receiver<PlatformCommand>,
    events: Receiver<CubeEvent>,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (central, commands) = ChannelCentral::new();
        let manager = CubeManager::new(Arc::new(central), ClientConfig::default());
        let events = manager.events();
        Harness {
            manager,
            commands,
            events,
        }
    }

    fn drain(&self) -> Vec<PlatformCommand> {
        self.commands.try_iter().collect()
    }

    fn discover(&mut self) -> PeripheralId {
        let peripheral = PeripheralId(Uuid::from_u128(0x10C0));
        self.manager.handle_event(BleEvent::RadioStateChanged(RadioState::PoweredOn));
        self.manager.handle_event(BleEvent::PeripheralDiscovered {
            peripheral,
            name: Some("toio Core Cube".into()),
            services: vec![SERVICE],
        });
        self.drain();
        let _: Vec<_> = self.events.try_iter().collect();
        peripheral
    }

    fn connect_timer(&self) -> TimerId {
        self.drain()
            .into_iter()
            .find_map(|cmd| match cmd {
                PlatformCommand::ScheduleTimer { timer, .. } => Some(timer),
                _ => None,
            })
            .unwrap()
    }

    /// Connect up to service discovery. Returns the connect outcome log.
    fn discovering(&mut self) -> (PeripheralId, Log<CubeResult<PeripheralId>>) {
        let peripheral = self.discover();
        let result = log();
        self.manager.connect(peripheral, push(&result)).unwrap();
        self.manager.handle_event(BleEvent::Connected { peripheral });
        self.drain();
        assert_eq!(
            self.manager.cube(peripheral).unwrap().state(),
            ConnectionState::Discovering
        );
        (peripheral, result)
    }

    /// Run a full connect, exposing `characteristics`.
    fn ready(&mut self, characteristics: &[CharacteristicId]) -> PeripheralId {
        let peripheral = self.discover();
        let result = log();
        self.manager.connect(peripheral, push(&result)).unwrap();
        self.manager.handle_event(BleEvent::Connected { peripheral });
        self.manager.handle_event(BleEvent::ServicesDiscovered {
            peripheral,
            services: vec![SERVICE],
            error: None,
        });
        self.manager.handle_event(BleEvent::CharacteristicsDiscovered {
            peripheral,
            service: SERVICE,
            characteristics: characteristics.iter().map(|id| id.uuid()).collect(),
            error: None,
        });
        assert_eq!(*result.lock().unwrap(), vec![Ok(peripheral)]);
        self.drain();
        peripheral
    }

    fn value(&mut self, peripheral: PeripheralId, id: CharacteristicId, bytes: &[u8]) {
        self.manager.handle_event(BleEvent::ValueUpdated {
            peripheral,
            characteristic: id.uuid(),
            value: Some(bytes.to_vec()),
            error: None,
        });
    }
}

fn count(commands: &[PlatformCommand], pred: impl Fn(&PlatformCommand) -> bool) -> usize {
    commands.iter().filter(|cmd| pred(cmd)).count()
}

// ============================================================================
// Connection
// ============================================================================

#[test]
fn test_connect_discovers_then_ready() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();

    h.manager.connect(peripheral, push(&result)).unwrap();
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Connecting
    );
    let commands = h.drain();
    assert!(commands.contains(&PlatformCommand::Connect { peripheral }));
    assert!(commands.contains(&PlatformCommand::ScheduleTimer {
        timer: TimerId {
            owner: corecube_client::TimerOwner::Connect(peripheral),
            generation: 1,
        },
        after: Duration::from_secs(5),
    }));

    h.manager.handle_event(BleEvent::Connected { peripheral });
    let commands = h.drain();
    assert!(commands.contains(&PlatformCommand::DiscoverServices {
        peripheral,
        services: vec![SERVICE],
    }));
    assert_eq!(
        count(&commands, |c| matches!(c, PlatformCommand::CancelTimer { .. })),
        1
    );

    h.manager.handle_event(BleEvent::ServicesDiscovered {
        peripheral,
        services: vec![SERVICE],
        error: None,
    });
    assert!(h.drain().contains(&PlatformCommand::DiscoverCharacteristics {
        peripheral,
        service: SERVICE,
        characteristics: CharacteristicId::all_uuids(),
    }));

    h.manager.handle_event(BleEvent::CharacteristicsDiscovered {
        peripheral,
        service: SERVICE,
        characteristics: vec![CharacteristicId::Battery.uuid(), CharacteristicId::Id.uuid()],
        error: None,
    });

    assert_eq!(*result.lock().unwrap(), vec![Ok(peripheral)]);
    let cube = h.manager.cube(peripheral).unwrap();
    assert!(cube.is_ready());
    assert!(cube.characteristics().is_supported(CharacteristicId::Battery));
    assert!(!cube.characteristics().is_supported(CharacteristicId::Light));
}

#[test]
fn test_connect_timeout_cancels_once() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();

    h.manager
        .connect_with_timeout(peripheral, Duration::from_secs(5), push(&result))
        .unwrap();
    let timer = h.connect_timer();
    h.manager.handle_event(BleEvent::TimerFired(timer));

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::ConnectionTimeout)]
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );

    // A late connect and a duplicate expiry change nothing.
    h.manager.handle_event(BleEvent::Connected { peripheral });
    h.manager.handle_event(BleEvent::TimerFired(timer));
    let commands = h.drain();
    assert_eq!(
        count(&commands, |c| matches!(c, PlatformCommand::CancelConnection { .. })),
        1
    );
    assert_eq!(
        count(&commands, |c| matches!(c, PlatformCommand::DiscoverServices { .. })),
        0
    );
    assert_eq!(result.lock().unwrap().len(), 1);
}

#[test]
fn test_timer_after_connect_is_ignored() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();
    h.manager.connect(peripheral, push(&result)).unwrap();
    let timer = h.connect_timer();

    h.manager.handle_event(BleEvent::Connected { peripheral });
    h.manager.handle_event(BleEvent::TimerFired(timer));

    assert!(result.lock().unwrap().is_empty());
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Discovering
    );
}

#[test]
fn test_connect_twice_is_rejected() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    h.manager.connect(peripheral, |_| {}).unwrap();

    let second = log::<CubeResult<PeripheralId>>();
    let err = h.manager.connect(peripheral, push(&second)).unwrap_err();
    assert_eq!(err, CubeError::AlreadyConnecting);
    assert!(second.lock().unwrap().is_empty());
}

#[test]
fn test_connect_failure_without_reason() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();
    h.manager.connect(peripheral, push(&result)).unwrap();

    h.manager.handle_event(BleEvent::ConnectFailed {
        peripheral,
        error: None,
    });

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::ConnectionFailedNoReason)]
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
}

#[test]
fn test_missing_service_fails_discovery() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();
    h.manager.connect(peripheral, push(&result)).unwrap();
    h.manager.handle_event(BleEvent::Connected { peripheral });
    h.drain();

    h.manager.handle_event(BleEvent::ServicesDiscovered {
        peripheral,
        services: vec![Uuid::from_u128(0x180F)],
        error: None,
    });

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::RequiredServiceNotFound)]
    );
    assert!(h
        .drain()
        .contains(&PlatformCommand::CancelConnection { peripheral }));
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
}

#[test]
fn test_service_discovery_error_fails_connect() {
    let mut h = Harness::new();
    let (peripheral, result) = h.discovering();

    h.manager.handle_event(BleEvent::ServicesDiscovered {
        peripheral,
        services: vec![SERVICE],
        error: Some(HardwareError::new("gatt 0x85")),
    });

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::RequiredServiceNotFound)]
    );
    let commands = h.drain();
    assert_eq!(
        count(&commands, |c| matches!(c, PlatformCommand::CancelConnection { .. })),
        1
    );
    assert_eq!(
        count(&commands, |c| matches!(c, PlatformCommand::DiscoverCharacteristics { .. })),
        0
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
}

#[test]
fn test_characteristic_discovery_error_fails_connect() {
    let mut h = Harness::new();
    let (peripheral, result) = h.discovering();
    h.manager.handle_event(BleEvent::ServicesDiscovered {
        peripheral,
        services: vec![SERVICE],
        error: None,
    });
    h.drain();

    h.manager.handle_event(BleEvent::CharacteristicsDiscovered {
        peripheral,
        service: SERVICE,
        characteristics: CharacteristicId::all_uuids(),
        error: Some(HardwareError::new("gatt 0x85")),
    });

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::RequiredServiceNotFound)]
    );
    assert_eq!(
        count(&h.drain(), |c| matches!(c, PlatformCommand::CancelConnection { .. })),
        1
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
}

#[test]
fn test_disconnect_while_discovering() {
    let mut h = Harness::new();
    let (peripheral, result) = h.discovering();

    h.manager.disconnect(peripheral).unwrap();

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::DisconnectedWhileConnecting)]
    );
    assert_eq!(
        h.drain(),
        vec![PlatformCommand::CancelConnection { peripheral }]
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );

    // Discovery finishing late changes nothing.
    h.manager.handle_event(BleEvent::ServicesDiscovered {
        peripheral,
        services: vec![SERVICE],
        error: None,
    });
    assert!(h.drain().is_empty());
    assert_eq!(result.lock().unwrap().len(), 1);
}

#[test]
fn test_link_loss_while_discovering() {
    let mut h = Harness::new();
    let (peripheral, result) = h.discovering();

    h.manager.handle_event(BleEvent::Disconnected {
        peripheral,
        error: Some(HardwareError::new("supervision timeout")),
    });

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::DisconnectedWhileConnecting)]
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
    // The pending connect took the error; nothing is reported as unhandled.
    assert_eq!(h.events.try_iter().count(), 0);
}

#[test]
fn test_disconnect_while_connecting() {
    let mut h = Harness::new();
    let peripheral = h.discover();
    let result = log();
    h.manager.connect(peripheral, push(&result)).unwrap();

    h.manager.disconnect(peripheral).unwrap();

    assert_eq!(
        *result.lock().unwrap(),
        vec![Err(CubeError::DisconnectedWhileConnecting)]
    );
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
}

#[test]
fn test_requested_disconnect_is_quiet() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);

    h.manager.disconnect(peripheral).unwrap();
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Disconnecting
    );
    assert!(h
        .drain()
        .contains(&PlatformCommand::CancelConnection { peripheral }));

    h.manager.handle_event(BleEvent::Disconnected {
        peripheral,
        error: None,
    });
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
    let events: Vec<_> = h.events.try_iter().collect();
    assert_eq!(events, vec![CubeEvent::Disconnected { peripheral }]);
}

// ============================================================================
// Characteristic Traffic
// ============================================================================

#[test]
fn test_battery_read() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let capacity = log();
    let sink = capacity.clone();

    h.manager
        .cube_mut(peripheral)
        .unwrap()
        .read_battery(move |result| sink.lock().unwrap().push(result.unwrap().capacity))
        .unwrap();
    assert_eq!(
        h.drain(),
        vec![PlatformCommand::ReadValue {
            peripheral,
            characteristic: CharacteristicId::Battery.uuid(),
        }]
    );

    h.value(peripheral, CharacteristicId::Battery, &[62]);
    assert_eq!(*capacity.lock().unwrap(), vec![62]);
}

#[test]
fn test_concurrent_reads_share_one_request() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let order = log();

    let cube = h.manager.cube_mut(peripheral).unwrap();
    for n in 0..4 {
        let order = order.clone();
        cube.read::<Battery>(move |result| {
            order.lock().unwrap().push((n, result.map(|r| r.capacity)));
        })
        .unwrap();
    }
    assert_eq!(
        count(&h.drain(), |c| matches!(c, PlatformCommand::ReadValue { .. })),
        1
    );

    h.value(peripheral, CharacteristicId::Battery, &[80]);
    h.value(peripheral, CharacteristicId::Battery, &[79]);

    assert_eq!(
        *order.lock().unwrap(),
        vec![(0, Ok(80)), (1, Ok(80)), (2, Ok(80)), (3, Ok(80))]
    );
}

#[test]
fn test_read_as_wrong_variant() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let result = log();

    h.manager
        .cube_mut(peripheral)
        .unwrap()
        .read_as::<Location, PositionId>(push(&result))
        .unwrap();
    h.value(peripheral, CharacteristicId::Id, &[0x03]);

    let result = result.lock().unwrap();
    assert!(matches!(
        result.as_slice(),
        [Err(CubeError::ResultTypeMismatch { .. })]
    ));
}

#[test]
fn test_value_error_reaches_reads_and_subscribers_once() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let seen = log();

    let cube = h.manager.cube_mut(peripheral).unwrap();
    for name in ["read-1", "read-2"] {
        let seen = seen.clone();
        cube.read_battery(move |r| seen.lock().unwrap().push((name, r.map(|b| b.capacity))))
            .unwrap();
    }
    {
        let seen = seen.clone();
        cube.subscribe_battery(move |r| {
            seen.lock().unwrap().push(("subscriber", r.map(|b| b.capacity)))
        })
        .unwrap();
    }

    h.manager.handle_event(BleEvent::ValueUpdated {
        peripheral,
        characteristic: CharacteristicId::Battery.uuid(),
        value: None,
        error: Some(HardwareError::new("gatt 0x05")),
    });

    let error: CubeResult<u8> = Err(CubeError::Hardware(HardwareError::new("gatt 0x05")));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("read-1", error.clone()),
            ("read-2", error.clone()),
            ("subscriber", error),
        ]
    );
    assert_eq!(h.events.try_iter().count(), 0);

    // The reads are gone; the subscriber stays.
    h.value(peripheral, CharacteristicId::Battery, &[33]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3], ("subscriber", Ok(33)));
}

#[test]
fn test_write_error_drains_pending_writes_in_order() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let done = log();

    let cube = h.manager.cube_mut(peripheral).unwrap();
    for n in 0..3 {
        let done = done.clone();
        let callback = Box::new(move |r: CubeResult<()>| done.lock().unwrap().push((n, r)));
        cube.write::<Light>(&[0x01], Some(callback)).unwrap();
    }
    assert_eq!(
        count(&h.drain(), |c| matches!(
            c,
            PlatformCommand::WriteValue {
                write_type: WriteType::WithResponse,
                ..
            }
        )),
        3
    );

    h.manager.handle_event(BleEvent::WriteCompleted {
        peripheral,
        characteristic: CharacteristicId::Light.uuid(),
        error: Some(HardwareError::new("gatt 0x03")),
    });

    let error: CubeResult<()> = Err(CubeError::Hardware(HardwareError::new("gatt 0x03")));
    assert_eq!(
        *done.lock().unwrap(),
        vec![(0, error.clone()), (1, error.clone()), (2, error)]
    );
    assert_eq!(
        h.manager
            .cube(peripheral)
            .unwrap()
            .characteristics()
            .get::<Light>()
            .pending_writes(),
        0
    );
    assert_eq!(h.events.try_iter().count(), 0);
}

#[test]
fn test_notify_toggles_follow_subscribers() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let seen = log();

    let cube = h.manager.cube_mut(peripheral).unwrap();
    let first = {
        let seen = seen.clone();
        cube.subscribe_battery(move |r| seen.lock().unwrap().push(("first", r)))
            .unwrap()
    };
    let second = {
        let seen = seen.clone();
        cube.subscribe_battery(move |r| seen.lock().unwrap().push(("second", r)))
            .unwrap()
    };
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);

    let enable = PlatformCommand::SetNotify {
        peripheral,
        characteristic: CharacteristicId::Battery.uuid(),
        enabled: true,
    };
    let disable = PlatformCommand::SetNotify {
        peripheral,
        characteristic: CharacteristicId::Battery.uuid(),
        enabled: false,
    };
    assert_eq!(h.drain(), vec![enable]);

    h.value(peripheral, CharacteristicId::Battery, &[55]);
    assert_eq!(seen.lock().unwrap().len(), 2);

    let unsubscribe = |h: &mut Harness, id: SubscriptionId| {
        let removed = h.manager.cube_mut(peripheral).unwrap().unsubscribe(id);
        (removed, h.drain())
    };
    assert_eq!(unsubscribe(&mut h, first), (true, vec![]));
    assert_eq!(unsubscribe(&mut h, second), (true, vec![disable]));

    // Already gone: a no-op.
    assert_eq!(unsubscribe(&mut h, second), (false, vec![]));
}

#[test]
fn test_unsupported_characteristic_fails_fast() {
    let mut h = Harness::new();
    let without_light: Vec<_> = CharacteristicId::ALL
        .into_iter()
        .filter(|id| *id != CharacteristicId::Light)
        .collect();
    let peripheral = h.ready(&without_light);
    let called = log::<CubeResult<()>>();

    let request = LightRequest::On(LightUnit {
        duration_secs: 1.0,
        red: 1.0,
        green: 0.0,
        blue: 0.0,
    });
    let err = h
        .manager
        .cube_mut(peripheral)
        .unwrap()
        .light(&request, Some(Box::new(push(&called))))
        .unwrap_err();

    assert_eq!(
        err,
        CubeError::CharacteristicNotSupported(CharacteristicId::Light)
    );
    assert!(called.lock().unwrap().is_empty());
    assert!(h.drain().is_empty());
}

#[test]
fn test_link_loss_fails_everything_once() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let reads = log();
    let writes = log::<CubeResult<()>>();

    let cube = h.manager.cube_mut(peripheral).unwrap();
    cube.read::<Battery>(push(&reads)).unwrap();
    cube.read::<Battery>(push(&reads)).unwrap();
    cube.write::<Light>(&[0x01], Some(Box::new(push(&writes))))
        .unwrap();

    h.manager.handle_event(BleEvent::Disconnected {
        peripheral,
        error: None,
    });

    assert_eq!(
        *reads.lock().unwrap(),
        vec![Err(CubeError::Disconnected), Err(CubeError::Disconnected)]
    );
    assert_eq!(*writes.lock().unwrap(), vec![Err(CubeError::Disconnected)]);
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );

    let events: Vec<_> = h.events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            CubeEvent::UnhandledError {
                peripheral,
                error: CubeError::Disconnected,
            },
            CubeEvent::Disconnected { peripheral },
        ]
    );

    // Stale traffic after teardown reaches nobody.
    h.value(peripheral, CharacteristicId::Battery, &[10]);
    h.manager.handle_event(BleEvent::WriteCompleted {
        peripheral,
        characteristic: CharacteristicId::Light.uuid(),
        error: None,
    });
    assert_eq!(reads.lock().unwrap().len(), 2);
    assert_eq!(writes.lock().unwrap().len(), 1);
}

#[test]
fn test_write_error_without_waiter_is_unhandled() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);

    h.manager.handle_event(BleEvent::WriteCompleted {
        peripheral,
        characteristic: CharacteristicId::Motor.uuid(),
        error: Some(HardwareError::new("gatt 0x0e")),
    });

    let events: Vec<_> = h.events.try_iter().collect();
    assert!(matches!(
        events.as_slice(),
        [CubeEvent::UnhandledError {
            error: CubeError::Hardware(_),
            ..
        }]
    ));
}

#[test]
fn test_radio_power_loss_drops_ready_cube() {
    let mut h = Harness::new();
    let peripheral = h.ready(&CharacteristicId::ALL);
    let reads = log();
    h.manager
        .cube_mut(peripheral)
        .unwrap()
        .read_battery(push(&reads))
        .unwrap();

    h.manager.handle_event(BleEvent::RadioStateChanged(RadioState::PoweredOff));

    assert_eq!(*reads.lock().unwrap(), vec![Err(CubeError::Disconnected)]);
    assert_eq!(
        h.manager.cube(peripheral).unwrap().state(),
        ConnectionState::Idle
    );
    assert!(h
        .events
        .try_iter()
        .any(|event| event == CubeEvent::Disconnected { peripheral }));
}
