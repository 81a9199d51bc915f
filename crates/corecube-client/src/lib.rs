//! Core Cube Client
//!
//! Host-side client for Core Cube robots. A [`CubeManager`] scans for cubes
//! and keeps one [`Cube`] session per peripheral it finds. Each session runs
//! the connect state machine and multiplexes the cube's characteristics:
//! concurrent reads of one characteristic share a single hardware read,
//! writes complete in FIFO order, and subscriptions keep notifications
//! enabled while at least one subscriber remains.
//!
//! The client does not drive a radio itself. It issues requests through a
//! [`Central`] and is fed every outcome as a [`BleEvent`] on a single
//! thread; [`ChannelCentral`] forwards the requests to a channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use corecube_client::{ChannelCentral, ClientConfig, CubeManager};
//!
//! let (central, commands) = ChannelCentral::new();
//! let mut manager = CubeManager::new(Arc::new(central), ClientConfig::default());
//! manager.wait_for_cube(None, move |found| {
//!     if let Ok(peripheral) = found {
//!         found_tx.send(peripheral).ok();
//!     }
//! });
//!
//! // Elsewhere: execute `commands` against the platform stack and feed its
//! // events back in.
//! manager.run(&ble_events);
//! ```

mod central;
mod characteristic;
mod config;
mod cube;
mod error;
pub mod family;
mod features;
mod manager;
mod multiplexer;

pub use central::{
    BleEvent, Central, ChannelCentral, PeripheralId, PlatformCommand, RadioState, TimerId,
    TimerOwner, WriteType,
};
pub use characteristic::{CharacteristicId, SERVICE};
pub use config::{ClientConfig, ConfigError};
pub use cube::{ConnectCallback, ConnectionState, Cube};
pub use error::{CubeError, CubeResult, HardwareError};
pub use manager::{CubeEvent, CubeManager, ScanCallback};
pub use multiplexer::{
    CharacteristicSet, Multiplexer, NotifyCallback, ReadCallback, SubscriptionId, WriteCallback,
};

pub use corecube_protocol as protocol;
