//! Requests that can be written to the cube.
//!
//! Each family has its own request enum with an `encode()` producing the
//! exact payload for its characteristic.

use bytes::BufMut;

use crate::constants::*;
use crate::types::*;

// ============================================================================
// Sensor
// ============================================================================

/// Requests written to the sensor characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRequest {
    /// Ask for a motion sensor notification.
    Motion,
    /// Ask for a magnetic sensor notification.
    Magnetic,
}

impl SensorRequest {
    /// Encode the request to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SensorRequest::Motion => vec![SENSOR_REQUEST_MOTION],
            SensorRequest::Magnetic => vec![SENSOR_REQUEST_MAGNETIC],
        }
    }
}

// ============================================================================
// Motor
// ============================================================================

/// A single waypoint of a destination move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationUnit {
    /// Target X on the mat.
    pub x: u16,
    /// Target Y on the mat.
    pub y: u16,
    /// Final rotation in degrees. Negative values turn the other way.
    pub rotation: i32,
    /// How `rotation` is interpreted.
    pub rotation_type: FinalRotation,
}

impl DestinationUnit {
    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_u16_le(self.x);
        buf.put_u16_le(self.y);
        buf.put_u16_le(pack_rotation(self.rotation_type, self.rotation));
    }
}

/// Parameters shared by single and multiple destination moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DestinationMove {
    /// Request id echoed back in the result.
    pub id: u8,
    /// Timeout in seconds (0 lets the cube pick its default of 10s).
    pub timeout_secs: f64,
    pub curve: DestinationCurve,
    pub max_velocity: u8,
    pub easing: DestinationEasing,
}

impl DestinationMove {
    fn put_header(&self, tag: u8, buf: &mut Vec<u8>) {
        buf.put_u8(tag);
        buf.put_u8(self.id);
        buf.put_u8(duration_to_whole_secs(self.timeout_secs));
        buf.put_u8(self.curve.code());
        buf.put_u8(self.max_velocity);
        buf.put_u8(self.easing.code());
        buf.put_u8(0x00);
    }
}

/// Parameters of an acceleration move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationMove {
    /// Target velocity. Negative moves backward.
    pub velocity: i16,
    /// Velocity increment per 100 ms (0 = immediate).
    pub acceleration: u8,
    /// Angular velocity in degrees per second. Negative turns counter-clockwise.
    pub angular_velocity: i32,
    pub priority: AccelerationPriority,
    /// Duration in seconds (0 = until the next command).
    pub duration_secs: f64,
}

/// Requests written to the motor characteristic.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorRequest {
    /// Drive both wheels until told otherwise.
    Activate {
        left: i16,
        right: i16,
    },
    /// Drive both wheels for a bounded time.
    ActivateWithDuration {
        left: i16,
        right: i16,
        duration_secs: f64,
    },
    /// Move to one destination on the mat.
    MoveToDestination {
        params: DestinationMove,
        destination: DestinationUnit,
    },
    /// Move through several destinations on the mat.
    MoveToMultipleDestinations {
        params: DestinationMove,
        write_mode: WriteMode,
        destinations: Vec<DestinationUnit>,
    },
    /// Accelerate towards a velocity.
    MoveWithAcceleration(AccelerationMove),
}

impl MotorRequest {
    /// Encode the request to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);

        match self {
            MotorRequest::Activate { left, right } => {
                buf.put_u8(MOTOR_CMD_ACTIVATE);
                put_wheels(&mut buf, *left, *right);
            }

            MotorRequest::ActivateWithDuration {
                left,
                right,
                duration_secs,
            } => {
                buf.put_u8(MOTOR_CMD_ACTIVATE_WITH_DURATION);
                put_wheels(&mut buf, *left, *right);
                buf.put_u8(duration_to_centis(*duration_secs));
            }

            MotorRequest::MoveToDestination {
                params,
                destination,
            } => {
                params.put_header(MOTOR_CMD_MOVE_TO_DESTINATION, &mut buf);
                destination.put(&mut buf);
            }

            MotorRequest::MoveToMultipleDestinations {
                params,
                write_mode,
                destinations,
            } => {
                params.put_header(MOTOR_CMD_MOVE_TO_MULTIPLE_DESTINATIONS, &mut buf);
                buf.put_u8(write_mode.code());
                for unit in destinations.iter().take(u8::MAX as usize) {
                    unit.put(&mut buf);
                }
            }

            MotorRequest::MoveWithAcceleration(accel) => {
                buf.put_u8(MOTOR_CMD_MOVE_WITH_ACCELERATION);
                buf.put_u8(accel.velocity.unsigned_abs().min(u8::MAX as u16) as u8);
                buf.put_u8(accel.acceleration);
                buf.put_u16_le(accel.angular_velocity.unsigned_abs().min(u16::MAX as u32) as u16);
                buf.put_u8(if accel.angular_velocity >= 0 { 0 } else { 1 });
                buf.put_u8(if accel.velocity >= 0 { 0 } else { 1 });
                buf.put_u8(accel.priority.code());
                buf.put_u8(duration_to_centis(accel.duration_secs));
            }
        }

        buf
    }
}

fn put_wheels(buf: &mut Vec<u8>, left: i16, right: i16) {
    let (left_dir, left_speed) = split_velocity(left);
    let (right_dir, right_speed) = split_velocity(right);
    buf.put_u8(MOTOR_LEFT);
    buf.put_u8(left_dir);
    buf.put_u8(left_speed);
    buf.put_u8(MOTOR_RIGHT);
    buf.put_u8(right_dir);
    buf.put_u8(right_speed);
}

// ============================================================================
// Light
// ============================================================================

/// One step of a light operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightUnit {
    /// How long the light stays on, in seconds (0 = until changed).
    pub duration_secs: f64,
    /// Red intensity, 0.0 to 1.0.
    pub red: f64,
    /// Green intensity, 0.0 to 1.0.
    pub green: f64,
    /// Blue intensity, 0.0 to 1.0.
    pub blue: f64,
}

impl LightUnit {
    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_u8(duration_to_centis(self.duration_secs));
        buf.put_u8(LIGHT_COUNT);
        buf.put_u8(LIGHT_ID_INDICATOR);
        buf.put_u8(unit_to_byte(self.red));
        buf.put_u8(unit_to_byte(self.green));
        buf.put_u8(unit_to_byte(self.blue));
    }
}

/// Requests written to the light characteristic.
#[derive(Debug, Clone, PartialEq)]
pub enum LightRequest {
    /// Turn the light on once.
    On(LightUnit),
    /// Play a sequence of light steps.
    Sequence {
        /// Number of repetitions (0 = forever).
        repeats: u8,
        units: Vec<LightUnit>,
    },
    /// Turn all lights off.
    AllOff,
}

impl LightRequest {
    /// Encode the request to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);

        match self {
            LightRequest::On(unit) => {
                buf.put_u8(LIGHT_CMD_ON);
                unit.put(&mut buf);
            }

            LightRequest::Sequence { repeats, units } => {
                let count = units.len().min(u8::MAX as usize);
                buf.put_u8(LIGHT_CMD_SEQUENCE);
                buf.put_u8(*repeats);
                buf.put_u8(count as u8);
                for unit in &units[..count] {
                    unit.put(&mut buf);
                }
            }

            LightRequest::AllOff => buf.put_u8(LIGHT_CMD_ALL_OFF),
        }

        buf
    }
}

// ============================================================================
// Sound
// ============================================================================

/// One note of a sound sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteUnit {
    /// Note length in seconds.
    pub duration_secs: f64,
    /// MIDI note number (0-127, 57 = A4). 128 is a rest.
    pub note: u8,
    /// Volume, 0.0 to 1.0.
    pub volume: f64,
}

impl NoteUnit {
    /// A silent note of the given length.
    pub fn rest(duration_secs: f64) -> Self {
        NoteUnit {
            duration_secs,
            note: SOUND_NOTE_MUTE,
            volume: 0.0,
        }
    }

    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_u8(duration_to_centis(self.duration_secs));
        buf.put_u8(self.note);
        buf.put_u8(unit_to_byte(self.volume));
    }
}

/// Requests written to the sound characteristic.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundRequest {
    /// Play a built-in effect.
    Effect {
        effect: SoundEffect,
        /// Volume, 0.0 to 1.0.
        volume: f64,
    },
    /// Play a note sequence.
    Notes {
        /// Number of repetitions (0 = forever).
        repeats: u8,
        notes: Vec<NoteUnit>,
    },
    /// Stop playback.
    Stop,
}

impl SoundRequest {
    /// Encode the request to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);

        match self {
            SoundRequest::Effect { effect, volume } => {
                buf.put_u8(SOUND_CMD_EFFECT);
                buf.put_u8(effect.code());
                buf.put_u8(unit_to_byte(*volume));
            }

            SoundRequest::Notes { repeats, notes } => {
                let count = notes.len().min(u8::MAX as usize);
                buf.put_u8(SOUND_CMD_NOTES);
                buf.put_u8(*repeats);
                buf.put_u8(count as u8);
                for note in &notes[..count] {
                    note.put(&mut buf);
                }
            }

            SoundRequest::Stop => buf.put_u8(SOUND_CMD_STOP),
        }

        buf
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Requests written to the configuration characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigurationRequest {
    /// Ask for the BLE protocol version.
    ProtocolVersion,
    /// Horizontal detection threshold in degrees (1-45).
    LevelThreshold(u8),
    /// Collision detection threshold (1-10).
    CollisionThreshold(u8),
    /// Double-tap detection interval (0-7).
    DoubleTapInterval(u8),
    /// How often the ID reader notifies.
    IdNotifyFrequency {
        /// Minimum interval in seconds.
        interval_secs: f64,
        condition: IdNotifyCondition,
    },
    /// Delay before an "ID missed" notification, in seconds.
    IdMissedThreshold(f64),
    /// Enable or disable the magnetic sensor.
    MagneticAvailability(bool),
    /// Enable or disable motor velocity notifications.
    MotorVelocityAvailability(bool),
}

impl ConfigurationRequest {
    /// Encode the request to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);

        match self {
            ConfigurationRequest::ProtocolVersion => {
                buf.put_u8(CONFIG_CMD_PROTOCOL_VERSION);
                buf.put_u8(CONFIG_RESERVED);
            }

            ConfigurationRequest::LevelThreshold(degrees) => {
                put_config(&mut buf, CONFIG_CMD_LEVEL_THRESHOLD, *degrees);
            }

            ConfigurationRequest::CollisionThreshold(level) => {
                put_config(&mut buf, CONFIG_CMD_COLLISION_THRESHOLD, *level);
            }

            ConfigurationRequest::DoubleTapInterval(interval) => {
                put_config(&mut buf, CONFIG_CMD_DOUBLE_TAP_INTERVAL, *interval);
            }

            ConfigurationRequest::IdNotifyFrequency {
                interval_secs,
                condition,
            } => {
                put_config(
                    &mut buf,
                    CONFIG_CMD_ID_NOTIFY_FREQUENCY,
                    duration_to_centis(*interval_secs),
                );
                buf.put_u8(condition.code());
            }

            ConfigurationRequest::IdMissedThreshold(secs) => {
                put_config(
                    &mut buf,
                    CONFIG_CMD_ID_MISSED_THRESHOLD,
                    duration_to_centis(*secs),
                );
            }

            ConfigurationRequest::MagneticAvailability(enabled) => {
                put_config(&mut buf, CONFIG_CMD_MAGNETIC_AVAILABILITY, *enabled as u8);
            }

            ConfigurationRequest::MotorVelocityAvailability(enabled) => {
                put_config(
                    &mut buf,
                    CONFIG_CMD_MOTOR_VELOCITY_AVAILABILITY,
                    *enabled as u8,
                );
            }
        }

        buf
    }
}

fn put_config(buf: &mut Vec<u8>, tag: u8, value: u8) {
    buf.put_u8(tag);
    buf.put_u8(CONFIG_RESERVED);
    buf.put_u8(value);
}
