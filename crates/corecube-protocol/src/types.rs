//! Common types used in the protocol.

use std::fmt;

use crate::constants::*;

// ============================================================================
// Message Families
// ============================================================================

/// The characteristic a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageFamily {
    /// ID reader (position mat and standard cards).
    Location,
    /// Motion and magnetic sensors.
    Sensor,
    /// Function button.
    Button,
    /// Battery level.
    Battery,
    /// Motor control.
    Motor,
    /// Indicator light.
    Light,
    /// Sound.
    Sound,
    /// Configuration.
    Configuration,
}

impl fmt::Display for MessageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageFamily::Location => "location",
            MessageFamily::Sensor => "sensor",
            MessageFamily::Button => "button",
            MessageFamily::Battery => "battery",
            MessageFamily::Motor => "motor",
            MessageFamily::Light => "light",
            MessageFamily::Sound => "sound",
            MessageFamily::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Quantization Helpers
// ============================================================================

/// Converts seconds to hundredths of a second, rounded and clamped to a byte.
pub fn duration_to_centis(seconds: f64) -> u8 {
    clamp_to_u8((seconds * 100.0).round())
}

/// Maps a unit interval value (0.0 to 1.0) onto 0..=255, rounding to nearest.
pub fn unit_to_byte(value: f64) -> u8 {
    clamp_to_u8((value * 255.0).round())
}

/// Converts seconds to whole seconds, truncated and clamped to a byte.
pub fn duration_to_whole_secs(seconds: f64) -> u8 {
    clamp_to_u8(seconds.floor())
}

/// Splits a signed motor speed into a direction byte and a magnitude byte.
///
/// Non-negative speeds are forward (`1`), negative speeds backward (`2`).
pub fn split_velocity(speed: i16) -> (u8, u8) {
    let direction = if speed >= 0 {
        DIRECTION_FORWARD
    } else {
        DIRECTION_BACKWARD
    };
    (direction, speed.unsigned_abs().min(u8::MAX as u16) as u8)
}

/// Packs a final rotation as `(type << 13) | (|degrees| & 0x1FFF)`.
///
/// A negative rotation swaps the clockwise and counter-clockwise variants
/// before packing, since only the magnitude reaches the wire.
pub fn pack_rotation(kind: FinalRotation, degrees: i32) -> u16 {
    let kind = if degrees < 0 { kind.mirrored() } else { kind };
    let tag = ((kind.code() as u16) << ROTATION_TYPE_SHIFT) & ROTATION_TYPE_MASK;
    let magnitude = (degrees.unsigned_abs() & ROTATION_MAGNITUDE_MASK as u32) as u16;
    tag | magnitude
}

fn clamp_to_u8(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, u8::MAX as f64) as u8
}

// ============================================================================
// Sensor Enums
// ============================================================================

/// Which face of the cube points up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Top face up (normal resting position).
    Top,
    /// Bottom face up.
    Bottom,
    /// Back face up.
    Back,
    /// Front face up.
    Front,
    /// Right face up.
    Right,
    /// Left face up.
    Left,
    /// Value not defined by the protocol.
    Unknown(u8),
}

impl From<u8> for Orientation {
    fn from(code: u8) -> Self {
        match code {
            1 => Orientation::Top,
            2 => Orientation::Bottom,
            3 => Orientation::Back,
            4 => Orientation::Front,
            5 => Orientation::Right,
            6 => Orientation::Left,
            other => Orientation::Unknown(other),
        }
    }
}

/// Placement of a magnet relative to the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnetPosition {
    /// No magnet detected.
    None,
    /// North pole at the center.
    CenterNorth,
    /// North pole at the right.
    RightNorth,
    /// North pole at the left.
    LeftNorth,
    /// South pole at the center.
    CenterSouth,
    /// South pole at the right.
    RightSouth,
    /// South pole at the left.
    LeftSouth,
    /// Value not defined by the protocol.
    Unknown(u8),
}

impl From<u8> for MagnetPosition {
    fn from(code: u8) -> Self {
        match code {
            0 => MagnetPosition::None,
            1 => MagnetPosition::CenterNorth,
            2 => MagnetPosition::RightNorth,
            3 => MagnetPosition::LeftNorth,
            4 => MagnetPosition::CenterSouth,
            5 => MagnetPosition::RightSouth,
            6 => MagnetPosition::LeftSouth,
            other => MagnetPosition::Unknown(other),
        }
    }
}

// ============================================================================
// Motor Enums
// ============================================================================

/// Outcome of a destination move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    /// Destination reached.
    Succeeded,
    /// Move did not complete in time.
    Timeout,
    /// The cube lost track of the mat.
    IdMissed,
    /// The cube was already at the destination.
    AlreadyAtDestination,
    /// The motors were switched off.
    TurnedOff,
    /// Superseded by another motor command.
    CanceledByOther,
    /// Maximum velocity was too low to move.
    TooSlow,
    /// Request was rejected (e.g. queue full in append mode).
    Rejected,
    /// Value not defined by the protocol.
    Unknown(u8),
}

impl From<u8> for DestinationStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => DestinationStatus::Succeeded,
            1 => DestinationStatus::Timeout,
            2 => DestinationStatus::IdMissed,
            3 => DestinationStatus::AlreadyAtDestination,
            4 => DestinationStatus::TurnedOff,
            5 => DestinationStatus::CanceledByOther,
            6 => DestinationStatus::TooSlow,
            7 => DestinationStatus::Rejected,
            other => DestinationStatus::Unknown(other),
        }
    }
}

/// Path shape used when moving to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationCurve {
    /// Rotate while moving.
    #[default]
    WithRotating,
    /// Rotate while moving, never reversing.
    WithRotatingOnlyForward,
    /// Rotate in place first, then move straight.
    MoveAfterRotate,
}

impl DestinationCurve {
    /// Wire code of the curve.
    pub fn code(self) -> u8 {
        match self {
            DestinationCurve::WithRotating => 0,
            DestinationCurve::WithRotatingOnlyForward => 1,
            DestinationCurve::MoveAfterRotate => 2,
        }
    }
}

/// Speed profile used when moving to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationEasing {
    /// Constant speed.
    #[default]
    Linear,
    /// Accelerate gradually.
    EaseIn,
    /// Decelerate gradually.
    EaseOut,
    /// Accelerate then decelerate.
    EaseInOut,
}

impl DestinationEasing {
    /// Wire code of the easing.
    pub fn code(self) -> u8 {
        match self {
            DestinationEasing::Linear => 0,
            DestinationEasing::EaseIn => 1,
            DestinationEasing::EaseOut => 2,
            DestinationEasing::EaseInOut => 3,
        }
    }
}

/// How the cube should be oriented on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalRotation {
    /// Absolute angle, shortest direction.
    AbsoluteAny,
    /// Absolute angle, clockwise.
    AbsoluteClockwise,
    /// Absolute angle, counter-clockwise.
    AbsoluteCounterClockwise,
    /// Relative angle, clockwise.
    RelativeClockwise,
    /// Relative angle, counter-clockwise.
    RelativeCounterClockwise,
    /// Do not rotate on arrival.
    #[default]
    None,
    /// Restore the rotation held when the move started.
    KeepStarting,
}

impl FinalRotation {
    /// Wire code of the rotation type (3 bits).
    pub fn code(self) -> u8 {
        match self {
            FinalRotation::AbsoluteAny => 0,
            FinalRotation::AbsoluteClockwise => 1,
            FinalRotation::AbsoluteCounterClockwise => 2,
            FinalRotation::RelativeClockwise => 3,
            FinalRotation::RelativeCounterClockwise => 4,
            FinalRotation::None => 5,
            FinalRotation::KeepStarting => 6,
        }
    }

    /// The same rotation type turning the other way.
    pub fn mirrored(self) -> Self {
        match self {
            FinalRotation::AbsoluteClockwise => FinalRotation::AbsoluteCounterClockwise,
            FinalRotation::AbsoluteCounterClockwise => FinalRotation::AbsoluteClockwise,
            FinalRotation::RelativeClockwise => FinalRotation::RelativeCounterClockwise,
            FinalRotation::RelativeCounterClockwise => FinalRotation::RelativeClockwise,
            other => other,
        }
    }
}

/// Whether a multi-destination move replaces or extends the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the running move.
    #[default]
    Overwrite,
    /// Queue after the running move.
    Append,
}

impl WriteMode {
    /// Wire code of the write mode.
    pub fn code(self) -> u8 {
        match self {
            WriteMode::Overwrite => 0,
            WriteMode::Append => 1,
        }
    }
}

/// Which target an acceleration move prioritizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelerationPriority {
    /// Keep translational velocity.
    #[default]
    Velocity,
    /// Keep angular velocity.
    AngularVelocity,
}

impl AccelerationPriority {
    /// Wire code of the priority.
    pub fn code(self) -> u8 {
        match self {
            AccelerationPriority::Velocity => 0,
            AccelerationPriority::AngularVelocity => 1,
        }
    }
}

// ============================================================================
// Sound and Configuration Enums
// ============================================================================

/// Built-in sound effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    Enter,
    Selected,
    Cancel,
    Cursor,
    MatIn,
    MatOut,
    Get1,
    Get2,
    Get3,
    Effect1,
    Effect2,
}

impl SoundEffect {
    /// Wire code of the effect.
    pub fn code(self) -> u8 {
        match self {
            SoundEffect::Enter => 0,
            SoundEffect::Selected => 1,
            SoundEffect::Cancel => 2,
            SoundEffect::Cursor => 3,
            SoundEffect::MatIn => 4,
            SoundEffect::MatOut => 5,
            SoundEffect::Get1 => 6,
            SoundEffect::Get2 => 7,
            SoundEffect::Get3 => 8,
            SoundEffect::Effect1 => 9,
            SoundEffect::Effect2 => 10,
        }
    }
}

/// When the ID reader sends notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdNotifyCondition {
    /// Notify every interval.
    #[default]
    Always,
    /// Notify only when the reading changed.
    OnChanged,
    /// Notify on change, but at least every 300 ms.
    AtLeast300ms,
}

impl IdNotifyCondition {
    /// Wire code of the condition.
    pub fn code(self) -> u8 {
        match self {
            IdNotifyCondition::Always => 0,
            IdNotifyCondition::OnChanged => 1,
            IdNotifyCondition::AtLeast300ms => 2,
        }
    }
}

// ============================================================================
// Decoded Data
// ============================================================================

/// Position reported while on an ID mat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionId {
    /// X of the cube center.
    pub cube_x: u16,
    /// Y of the cube center.
    pub cube_y: u16,
    /// Rotation of the cube in degrees.
    pub cube_rotation: u16,
    /// X of the ID sensor.
    pub sensor_x: u16,
    /// Y of the ID sensor.
    pub sensor_y: u16,
    /// Rotation of the ID sensor in degrees.
    pub sensor_rotation: u16,
}

/// Value read from a standard ID card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardId {
    /// Card value.
    pub value: u32,
    /// Rotation of the cube in degrees.
    pub rotation: u16,
}

/// Motion sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSensor {
    /// Cube is level.
    pub is_level: bool,
    /// A collision was detected.
    pub collision: bool,
    /// A double tap was detected.
    pub double_tap: bool,
    /// Current posture.
    pub orientation: Orientation,
    /// Shake strength (0 = not shaking).
    pub shake: u8,
}

/// Magnetic sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagneticSensor {
    /// Where the magnet is.
    pub position: MagnetPosition,
}

/// Result of a destination move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationResult {
    /// Request id echoed back by the cube.
    pub id: u8,
    /// How the move ended.
    pub status: DestinationStatus,
}

/// Measured wheel speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorVelocities {
    pub left: u8,
    pub right: u8,
}

/// Acknowledgement of a configuration write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigAck {
    /// The cube accepted the setting.
    pub succeeded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_centis_rounds_and_clamps() {
        assert_eq!(duration_to_centis(0.0), 0);
        assert_eq!(duration_to_centis(0.126), 13);
        assert_eq!(duration_to_centis(1.5), 150);
        assert_eq!(duration_to_centis(2.55), 255);
        assert_eq!(duration_to_centis(10.0), 255);
        assert_eq!(duration_to_centis(-1.0), 0);
        assert_eq!(duration_to_centis(f64::NAN), 0);
    }

    #[test]
    fn test_unit_to_byte() {
        assert_eq!(unit_to_byte(0.0), 0);
        assert_eq!(unit_to_byte(0.5), 128);
        assert_eq!(unit_to_byte(1.0), 255);
        assert_eq!(unit_to_byte(1.2), 255);
    }

    #[test]
    fn test_split_velocity() {
        assert_eq!(split_velocity(50), (1, 50));
        assert_eq!(split_velocity(0), (1, 0));
        assert_eq!(split_velocity(-30), (2, 30));
        assert_eq!(split_velocity(i16::MIN), (2, 255));
    }

    #[test]
    fn test_pack_rotation_positive() {
        let packed = pack_rotation(FinalRotation::AbsoluteClockwise, 90);
        assert_eq!(packed, (1 << 13) | 90);
    }

    #[test]
    fn test_pack_rotation_negative_mirrors_direction() {
        let packed = pack_rotation(FinalRotation::RelativeClockwise, -45);
        assert_eq!(packed >> 13, FinalRotation::RelativeCounterClockwise.code() as u16);
        assert_eq!(packed & 0x1FFF, 45);

        // Direction-free types are left alone.
        let packed = pack_rotation(FinalRotation::AbsoluteAny, -10);
        assert_eq!(packed, 10);
    }

    #[test]
    fn test_pack_rotation_masks_magnitude() {
        let packed = pack_rotation(FinalRotation::None, 0x2001);
        assert_eq!(packed, (5 << 13) | 1);
    }

    #[test]
    fn test_enum_unknown_fallback() {
        assert_eq!(Orientation::from(4), Orientation::Front);
        assert_eq!(Orientation::from(9), Orientation::Unknown(9));
        assert_eq!(MagnetPosition::from(0), MagnetPosition::None);
        assert_eq!(MagnetPosition::from(7), MagnetPosition::Unknown(7));
        assert_eq!(DestinationStatus::from(7), DestinationStatus::Rejected);
        assert_eq!(DestinationStatus::from(0xFF), DestinationStatus::Unknown(0xFF));
    }
}
