//! Static mapping from characteristics to their message families.
//!
//! Each characteristic gets a marker type implementing [`Family`], which fixes
//! the decoded response type and selects the characteristic's multiplexer.
//! Waiters are therefore typed at the point they are registered and never
//! need to be downcast.

use std::convert::Infallible;

use corecube_protocol::*;

use crate::characteristic::CharacteristicId;
use crate::multiplexer::{CharacteristicSet, Multiplexer};

mod sealed {
    pub trait Sealed {}
}

/// A characteristic's message family.
pub trait Family: sealed::Sealed + Sized + Send + 'static {
    /// The characteristic carrying this family.
    const CHARACTERISTIC: CharacteristicId;

    /// Decoded response type.
    type Response: Clone + Send + 'static;

    /// Decode a raw value of this characteristic.
    fn decode(bytes: &[u8]) -> Result<Self::Response, ProtocolError>;

    #[doc(hidden)]
    fn slot(set: &CharacteristicSet) -> &Multiplexer<Self>;

    #[doc(hidden)]
    fn slot_mut(set: &mut CharacteristicSet) -> &mut Multiplexer<Self>;
}

/// Families whose characteristic can be read and subscribed to.
pub trait Readable: Family {}

macro_rules! family {
    ($(#[$meta:meta])* $name:ident, $chr:ident, $field:ident, $response:ty, readable) => {
        family!($(#[$meta])* $name, $chr, $field, $response, <$response>::decode);
        impl Readable for $name {}
    };
    ($(#[$meta:meta])* $name:ident, $chr:ident, $field:ident, $response:ty, $decode:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Family for $name {
            const CHARACTERISTIC: CharacteristicId = CharacteristicId::$chr;
            type Response = $response;

            fn decode(bytes: &[u8]) -> Result<Self::Response, ProtocolError> {
                ($decode)(bytes)
            }

            fn slot(set: &CharacteristicSet) -> &Multiplexer<Self> {
                &set.$field
            }

            fn slot_mut(set: &mut CharacteristicSet) -> &mut Multiplexer<Self> {
                &mut set.$field
            }
        }
    };
}

family!(
    /// Position mat and standard card readings from the ID characteristic.
    Location, Id, location, LocationResponse, readable
);
family!(
    /// Motion and magnetic sensor readings.
    Sensor, Sensor, sensor, SensorResponse, readable
);
family!(Button, Button, button, ButtonResponse, readable);
family!(Battery, Battery, battery, BatteryResponse, readable);
family!(
    /// Motor results and velocities.
    Motor, Motor, motor, MotorResponse, readable
);
family!(Configuration, Configuration, configuration, ConfigurationResponse, readable);
family!(
    /// Write-only indicator light.
    Light,
    Light,
    light,
    Infallible,
    |_: &[u8]| Err(ProtocolError::NotReadable(MessageFamily::Light))
);
family!(
    /// Write-only sound.
    Sound,
    Sound,
    sound,
    Infallible,
    |_: &[u8]| Err(ProtocolError::NotReadable(MessageFamily::Sound))
);
