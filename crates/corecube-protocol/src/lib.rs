//! Core Cube BLE Protocol
//!
//! This crate provides types and utilities for encoding requests to, and
//! decoding responses from, a Core Cube robot over its GATT profile. The cube
//! exposes one service with eight characteristics; each characteristic carries
//! its own small message family.
//!
//! # Protocol Overview
//!
//! - **Requests** (host → cube): written to a characteristic, built with the
//!   `*Request` enums and their `encode()` methods
//! - **Responses** (cube → host): read or notified, decoded with the
//!   `*Response::decode()` functions
//!
//! Every payload starts with a tag byte (except battery, which is a single
//! capacity byte). Multi-byte integers are little-endian, durations are
//! hundredths of a second, and colors and volumes are scaled to 0-255.
//!
//! # Example
//!
//! ```rust,ignore
//! use corecube_protocol::{MotorRequest, BatteryResponse};
//!
//! // Build a request
//! let payload = MotorRequest::Activate { left: 50, right: 50 }.encode();
//!
//! // Parse a notification
//! let battery = BatteryResponse::decode(&received_bytes)?;
//! ```

mod commands;
mod constants;
mod error;
mod responses;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::ProtocolError;
pub use responses::*;
pub use types::*;
