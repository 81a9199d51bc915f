//! Protocol constants
//!
//! UUIDs of the cube's GATT profile and the tag bytes that prefix every
//! payload. All multi-byte fields on the wire are little-endian.

// ============================================================================
// GATT Profile
// ============================================================================

/// The single primary service every cube advertises.
pub const SERVICE_UUID: u128 = 0x10B2_0100_5B3B_4571_9508_CF3E_FCD7_BBAE;

/// ID reader: position on a mat or standard card (read, notify).
pub const CHR_ID_UUID: u128 = 0x10B2_0101_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Motor control (write without response, read, notify).
pub const CHR_MOTOR_UUID: u128 = 0x10B2_0102_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Indicator light (write).
pub const CHR_LIGHT_UUID: u128 = 0x10B2_0103_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Sound (write).
pub const CHR_SOUND_UUID: u128 = 0x10B2_0104_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Motion and magnetic sensors (write, read, notify).
pub const CHR_SENSOR_UUID: u128 = 0x10B2_0106_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Function button (read, notify).
pub const CHR_BUTTON_UUID: u128 = 0x10B2_0107_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Battery level (read, notify).
pub const CHR_BATTERY_UUID: u128 = 0x10B2_0108_5B3B_4571_9508_CF3E_FCD7_BBAE;
/// Configuration (write, read, notify).
pub const CHR_CONFIGURATION_UUID: u128 = 0x10B2_01FF_5B3B_4571_9508_CF3E_FCD7_BBAE;

// ============================================================================
// Location (ID reader) Tags
// ============================================================================

/// Cube is on a position ID mat.
pub const LOCATION_POSITION_ID: u8 = 0x01;
/// Cube is on a standard ID card.
pub const LOCATION_STANDARD_ID: u8 = 0x02;
/// Cube left the position ID mat.
pub const LOCATION_POSITION_ID_MISSED: u8 = 0x03;
/// Cube left the standard ID card.
pub const LOCATION_STANDARD_ID_MISSED: u8 = 0x04;

// ============================================================================
// Sensor Tags
// ============================================================================

/// Motion sensor reading.
pub const SENSOR_MOTION: u8 = 0x01;
/// Magnetic sensor reading.
pub const SENSOR_MAGNETIC: u8 = 0x02;
/// Request a motion sensor reading.
pub const SENSOR_REQUEST_MOTION: u8 = 0x81;
/// Request a magnetic sensor reading.
pub const SENSOR_REQUEST_MAGNETIC: u8 = 0x82;

// ============================================================================
// Button Tags
// ============================================================================

/// Function button state.
pub const BUTTON_FUNCTION: u8 = 0x01;

// ============================================================================
// Motor Tags
// ============================================================================

/// Drive both motors.
pub const MOTOR_CMD_ACTIVATE: u8 = 0x01;
/// Drive both motors for a bounded time.
pub const MOTOR_CMD_ACTIVATE_WITH_DURATION: u8 = 0x02;
/// Move to a single destination on the mat.
pub const MOTOR_CMD_MOVE_TO_DESTINATION: u8 = 0x03;
/// Move through several destinations on the mat.
pub const MOTOR_CMD_MOVE_TO_MULTIPLE_DESTINATIONS: u8 = 0x04;
/// Accelerate to a target velocity.
pub const MOTOR_CMD_MOVE_WITH_ACCELERATION: u8 = 0x05;

/// Result of a single-destination move.
pub const MOTOR_RESP_DESTINATION_RESULT: u8 = 0x83;
/// Result of a multi-destination move.
pub const MOTOR_RESP_MULTIPLE_DESTINATION_RESULT: u8 = 0x84;
/// Current motor velocities.
pub const MOTOR_RESP_VELOCITIES: u8 = 0xE0;

/// Motor selector for the left wheel.
pub const MOTOR_LEFT: u8 = 0x01;
/// Motor selector for the right wheel.
pub const MOTOR_RIGHT: u8 = 0x02;

/// Direction byte: forward (or clockwise).
pub const DIRECTION_FORWARD: u8 = 1;
/// Direction byte: backward (or counter-clockwise).
pub const DIRECTION_BACKWARD: u8 = 2;

// ============================================================================
// Light Tags
// ============================================================================

/// Turn every light off.
pub const LIGHT_CMD_ALL_OFF: u8 = 0x01;
/// Turn the light on once.
pub const LIGHT_CMD_ON: u8 = 0x03;
/// Play a sequence of light operations.
pub const LIGHT_CMD_SEQUENCE: u8 = 0x04;

/// Number of lights addressed by a single light unit.
pub const LIGHT_COUNT: u8 = 1;
/// Light identifier of the indicator.
pub const LIGHT_ID_INDICATOR: u8 = 1;

// ============================================================================
// Sound Tags
// ============================================================================

/// Stop playback.
pub const SOUND_CMD_STOP: u8 = 0x01;
/// Play a built-in sound effect.
pub const SOUND_CMD_EFFECT: u8 = 0x02;
/// Play a sequence of MIDI notes.
pub const SOUND_CMD_NOTES: u8 = 0x03;

/// MIDI note value that means "rest".
pub const SOUND_NOTE_MUTE: u8 = 128;

// ============================================================================
// Configuration Tags
// ============================================================================

/// Request the BLE protocol version.
pub const CONFIG_CMD_PROTOCOL_VERSION: u8 = 0x01;
/// Set the horizontal detection threshold.
pub const CONFIG_CMD_LEVEL_THRESHOLD: u8 = 0x05;
/// Set the collision detection threshold.
pub const CONFIG_CMD_COLLISION_THRESHOLD: u8 = 0x06;
/// Set the double-tap detection interval.
pub const CONFIG_CMD_DOUBLE_TAP_INTERVAL: u8 = 0x17;
/// Set the ID notification frequency.
pub const CONFIG_CMD_ID_NOTIFY_FREQUENCY: u8 = 0x18;
/// Set the ID missed notification threshold.
pub const CONFIG_CMD_ID_MISSED_THRESHOLD: u8 = 0x19;
/// Enable or disable the magnetic sensor.
pub const CONFIG_CMD_MAGNETIC_AVAILABILITY: u8 = 0x1B;
/// Enable or disable motor velocity notifications.
pub const CONFIG_CMD_MOTOR_VELOCITY_AVAILABILITY: u8 = 0x1C;

/// Protocol version response.
pub const CONFIG_RESP_PROTOCOL_VERSION: u8 = 0x81;
/// Acknowledgement of the ID notification frequency setting.
pub const CONFIG_RESP_ID_NOTIFY_FREQUENCY: u8 = 0x98;
/// Acknowledgement of the ID missed threshold setting.
pub const CONFIG_RESP_ID_MISSED_THRESHOLD: u8 = 0x99;
/// Acknowledgement of the magnetic sensor setting.
pub const CONFIG_RESP_MAGNETIC_AVAILABILITY: u8 = 0x9B;
/// Acknowledgement of the motor velocity setting.
pub const CONFIG_RESP_MOTOR_VELOCITY_AVAILABILITY: u8 = 0x9C;

/// Reserved byte that follows every configuration tag.
pub const CONFIG_RESERVED: u8 = 0x00;
/// Status byte reported by a successful configuration acknowledgement.
pub const CONFIG_STATUS_OK: u8 = 0x00;

// ============================================================================
// Quantization
// ============================================================================

/// Bit offset of the 3-bit rotation type inside a packed rotation word.
pub const ROTATION_TYPE_SHIFT: u16 = 13;
/// Mask of the 13-bit rotation magnitude inside a packed rotation word.
pub const ROTATION_MAGNITUDE_MASK: u16 = 0x1FFF;
/// Mask of the rotation type inside a packed rotation word.
pub const ROTATION_TYPE_MASK: u16 = 0xE000;
