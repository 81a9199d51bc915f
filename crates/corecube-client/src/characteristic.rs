//! The cube's GATT profile.

use std::fmt;

use corecube_protocol::*;
use uuid::Uuid;

/// UUID of the cube service.
pub const SERVICE: Uuid = Uuid::from_u128(SERVICE_UUID);

/// One of the eight characteristics of the cube service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicId {
    /// ID reader (position mat and standard cards).
    Id,
    Motor,
    Light,
    Sound,
    Sensor,
    Button,
    Battery,
    Configuration,
}

impl CharacteristicId {
    /// Every characteristic in profile order.
    pub const ALL: [CharacteristicId; 8] = [
        CharacteristicId::Id,
        CharacteristicId::Motor,
        CharacteristicId::Light,
        CharacteristicId::Sound,
        CharacteristicId::Sensor,
        CharacteristicId::Button,
        CharacteristicId::Battery,
        CharacteristicId::Configuration,
    ];

    /// GATT UUID of the characteristic.
    pub const fn uuid(self) -> Uuid {
        let raw = match self {
            CharacteristicId::Id => CHR_ID_UUID,
            CharacteristicId::Motor => CHR_MOTOR_UUID,
            CharacteristicId::Light => CHR_LIGHT_UUID,
            CharacteristicId::Sound => CHR_SOUND_UUID,
            CharacteristicId::Sensor => CHR_SENSOR_UUID,
            CharacteristicId::Button => CHR_BUTTON_UUID,
            CharacteristicId::Battery => CHR_BATTERY_UUID,
            CharacteristicId::Configuration => CHR_CONFIGURATION_UUID,
        };
        Uuid::from_u128(raw)
    }

    /// Looks a characteristic up by UUID.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == uuid)
    }

    /// UUIDs of every characteristic, for discovery filters.
    pub fn all_uuids() -> Vec<Uuid> {
        Self::ALL.iter().map(|id| id.uuid()).collect()
    }

    /// Message family carried by the characteristic.
    pub const fn family(self) -> MessageFamily {
        match self {
            CharacteristicId::Id => MessageFamily::Location,
            CharacteristicId::Motor => MessageFamily::Motor,
            CharacteristicId::Light => MessageFamily::Light,
            CharacteristicId::Sound => MessageFamily::Sound,
            CharacteristicId::Sensor => MessageFamily::Sensor,
            CharacteristicId::Button => MessageFamily::Button,
            CharacteristicId::Battery => MessageFamily::Battery,
            CharacteristicId::Configuration => MessageFamily::Configuration,
        }
    }

    /// Short lowercase name, used in logs and metric labels.
    pub const fn name(self) -> &'static str {
        match self {
            CharacteristicId::Id => "id",
            CharacteristicId::Motor => "motor",
            CharacteristicId::Light => "light",
            CharacteristicId::Sound => "sound",
            CharacteristicId::Sensor => "sensor",
            CharacteristicId::Button => "button",
            CharacteristicId::Battery => "battery",
            CharacteristicId::Configuration => "configuration",
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
