//! Responses read or notified by the cube.
//!
//! Every readable characteristic decodes into a closed enum dispatched on the
//! leading tag byte. Decoding is total: truncated payloads and unknown tags
//! come back as [`ProtocolError`] values.

use bytes::Buf;

use crate::constants::*;
use crate::error::*;
use crate::types::*;

/// Reads the leading tag byte of a payload.
fn tag_of(frame: &[u8]) -> Result<u8, ProtocolError> {
    frame.first().copied().ok_or(ProtocolError::EmptyPayload)
}

fn unknown(family: MessageFamily, tag: u8) -> ProtocolError {
    log::trace!("unknown {} tag 0x{:02X}", family, tag);
    ProtocolError::UnknownTag { family, tag }
}

// ============================================================================
// Location
// ============================================================================

/// Responses from the ID reader characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationResponse {
    /// The cube is on a position ID mat.
    PositionId(PositionId),
    /// The cube is on a standard ID card.
    StandardId(StandardId),
    /// The cube left the position ID mat.
    PositionIdMissed,
    /// The cube left the standard ID card.
    StandardIdMissed,
}

impl LocationResponse {
    /// Decode a location payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        match tag_of(frame)? {
            LOCATION_POSITION_ID => {
                require_len(frame, 13)?;
                let mut buf = &frame[1..13];
                Ok(LocationResponse::PositionId(PositionId {
                    cube_x: buf.get_u16_le(),
                    cube_y: buf.get_u16_le(),
                    cube_rotation: buf.get_u16_le(),
                    sensor_x: buf.get_u16_le(),
                    sensor_y: buf.get_u16_le(),
                    sensor_rotation: buf.get_u16_le(),
                }))
            }

            LOCATION_STANDARD_ID => {
                require_len(frame, 7)?;
                let mut buf = &frame[1..7];
                Ok(LocationResponse::StandardId(StandardId {
                    value: buf.get_u32_le(),
                    rotation: buf.get_u16_le(),
                }))
            }

            LOCATION_POSITION_ID_MISSED => Ok(LocationResponse::PositionIdMissed),
            LOCATION_STANDARD_ID_MISSED => Ok(LocationResponse::StandardIdMissed),

            tag => Err(unknown(MessageFamily::Location, tag)),
        }
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            LocationResponse::PositionId(_) => "PositionId",
            LocationResponse::StandardId(_) => "StandardId",
            LocationResponse::PositionIdMissed => "PositionIdMissed",
            LocationResponse::StandardIdMissed => "StandardIdMissed",
        }
    }
}

// ============================================================================
// Sensor
// ============================================================================

/// Responses from the sensor characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorResponse {
    /// Motion sensor reading.
    Motion(MotionSensor),
    /// Magnetic sensor reading.
    Magnetic(MagneticSensor),
}

impl SensorResponse {
    /// Decode a sensor payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        match tag_of(frame)? {
            SENSOR_MOTION => {
                require_len(frame, 6)?;
                Ok(SensorResponse::Motion(MotionSensor {
                    is_level: frame[1] != 0,
                    collision: frame[2] != 0,
                    double_tap: frame[3] != 0,
                    orientation: Orientation::from(frame[4]),
                    shake: frame[5],
                }))
            }

            SENSOR_MAGNETIC => {
                require_len(frame, 2)?;
                Ok(SensorResponse::Magnetic(MagneticSensor {
                    position: MagnetPosition::from(frame[1]),
                }))
            }

            tag => Err(unknown(MessageFamily::Sensor, tag)),
        }
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            SensorResponse::Motion(_) => "Motion",
            SensorResponse::Magnetic(_) => "Magnetic",
        }
    }
}

// ============================================================================
// Button
// ============================================================================

/// Responses from the button characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonResponse {
    /// State of the function button.
    Function {
        /// The button is held down.
        pushed: bool,
    },
}

impl ButtonResponse {
    /// Decode a button payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        match tag_of(frame)? {
            BUTTON_FUNCTION => {
                require_len(frame, 2)?;
                Ok(ButtonResponse::Function {
                    pushed: frame[1] != 0,
                })
            }
            tag => Err(unknown(MessageFamily::Button, tag)),
        }
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        "Function"
    }
}

// ============================================================================
// Battery
// ============================================================================

/// Battery level response. The payload has no tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryResponse {
    /// Remaining capacity in percent.
    pub capacity: u8,
}

impl BatteryResponse {
    /// Decode a battery payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let capacity = tag_of(frame)?;
        Ok(BatteryResponse { capacity })
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        "Capacity"
    }
}

// ============================================================================
// Motor
// ============================================================================

/// Responses from the motor characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorResponse {
    /// A single-destination move finished.
    DestinationResult(DestinationResult),
    /// A multi-destination move finished.
    MultipleDestinationResult(DestinationResult),
    /// Current wheel speeds.
    Velocities(MotorVelocities),
}

impl MotorResponse {
    /// Decode a motor payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        match tag_of(frame)? {
            MOTOR_RESP_DESTINATION_RESULT => {
                require_len(frame, 3)?;
                Ok(MotorResponse::DestinationResult(destination_result(frame)))
            }

            MOTOR_RESP_MULTIPLE_DESTINATION_RESULT => {
                require_len(frame, 3)?;
                Ok(MotorResponse::MultipleDestinationResult(
                    destination_result(frame),
                ))
            }

            MOTOR_RESP_VELOCITIES => {
                require_len(frame, 3)?;
                Ok(MotorResponse::Velocities(MotorVelocities {
                    left: frame[1],
                    right: frame[2],
                }))
            }

            tag => Err(unknown(MessageFamily::Motor, tag)),
        }
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            MotorResponse::DestinationResult(_) => "DestinationResult",
            MotorResponse::MultipleDestinationResult(_) => "MultipleDestinationResult",
            MotorResponse::Velocities(_) => "Velocities",
        }
    }
}

fn destination_result(frame: &[u8]) -> DestinationResult {
    DestinationResult {
        id: frame[1],
        status: DestinationStatus::from(frame[2]),
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Responses from the configuration characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationResponse {
    /// BLE protocol version string, e.g. `"2.1.0"`.
    ProtocolVersion(String),
    IdNotifyFrequency(ConfigAck),
    IdMissedThreshold(ConfigAck),
    MagneticAvailability(ConfigAck),
    MotorVelocityAvailability(ConfigAck),
}

impl ConfigurationResponse {
    /// Decode a configuration payload.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let tag = tag_of(frame)?;
        match tag {
            CONFIG_RESP_PROTOCOL_VERSION => {
                require_len(frame, 2)?;
                let version = std::str::from_utf8(&frame[2..])
                    .map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(ConfigurationResponse::ProtocolVersion(version.to_string()))
            }

            CONFIG_RESP_ID_NOTIFY_FREQUENCY => {
                Ok(ConfigurationResponse::IdNotifyFrequency(config_ack(frame)?))
            }

            CONFIG_RESP_ID_MISSED_THRESHOLD => {
                Ok(ConfigurationResponse::IdMissedThreshold(config_ack(frame)?))
            }

            CONFIG_RESP_MAGNETIC_AVAILABILITY => Ok(
                ConfigurationResponse::MagneticAvailability(config_ack(frame)?),
            ),

            CONFIG_RESP_MOTOR_VELOCITY_AVAILABILITY => Ok(
                ConfigurationResponse::MotorVelocityAvailability(config_ack(frame)?),
            ),

            tag => Err(unknown(MessageFamily::Configuration, tag)),
        }
    }

    /// Name of the decoded variant.
    pub fn variant_name(&self) -> &'static str {
        match self {
            ConfigurationResponse::ProtocolVersion(_) => "ProtocolVersion",
            ConfigurationResponse::IdNotifyFrequency(_) => "IdNotifyFrequency",
            ConfigurationResponse::IdMissedThreshold(_) => "IdMissedThreshold",
            ConfigurationResponse::MagneticAvailability(_) => "MagneticAvailability",
            ConfigurationResponse::MotorVelocityAvailability(_) => "MotorVelocityAvailability",
        }
    }
}

fn config_ack(frame: &[u8]) -> Result<ConfigAck, ProtocolError> {
    require_len(frame, 3)?;
    Ok(ConfigAck {
        succeeded: frame[2] == CONFIG_STATUS_OK,
    })
}

// ============================================================================
// Typed Variant Extraction
// ============================================================================

/// Implements `TryFrom<Response>` for the payload of one response variant.
macro_rules! variant_payload {
    ($response:ident :: $variant:ident => $payload:ty) => {
        impl TryFrom<$response> for $payload {
            type Error = ProtocolError;

            fn try_from(response: $response) -> Result<Self, Self::Error> {
                match response {
                    $response::$variant(inner) => Ok(inner),
                    other => Err(ProtocolError::UnexpectedVariant {
                        expected: stringify!($variant),
                        actual: other.variant_name(),
                    }),
                }
            }
        }
    };
}

variant_payload!(LocationResponse::PositionId => PositionId);
variant_payload!(LocationResponse::StandardId => StandardId);
variant_payload!(SensorResponse::Motion => MotionSensor);
variant_payload!(SensorResponse::Magnetic => MagneticSensor);
variant_payload!(MotorResponse::Velocities => MotorVelocities);

impl TryFrom<MotorResponse> for DestinationResult {
    type Error = ProtocolError;

    /// Accepts both single and multiple destination results.
    fn try_from(response: MotorResponse) -> Result<Self, Self::Error> {
        match response {
            MotorResponse::DestinationResult(result)
            | MotorResponse::MultipleDestinationResult(result) => Ok(result),
            other => Err(ProtocolError::UnexpectedVariant {
                expected: "DestinationResult",
                actual: other.variant_name(),
            }),
        }
    }
}
