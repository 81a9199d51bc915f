//! Typed per-feature operations on a [`Cube`].
//!
//! Reads and subscriptions resolve with the family's decoded response.
//! Writes with a callback are acknowledged; writes without one are
//! fire-and-forget. Motor commands are always fire-and-forget.

use corecube_protocol::*;

use crate::cube::Cube;
use crate::error::{CubeError, CubeResult};
use crate::family::{self, Family, Readable};
use crate::multiplexer::{EventSink, SubscriptionId, WriteCallback};

impl Cube {
    // ========================================================================
    // Generic Access
    // ========================================================================

    /// Read family `F`. Resolves with the next value update of the
    /// characteristic, which a concurrent read may have triggered.
    pub fn read<F: Readable>(
        &mut self,
        callback: impl FnOnce(CubeResult<F::Response>) + Send + 'static,
    ) -> CubeResult<()> {
        self.characteristics
            .get_mut::<F>()
            .read(&self.link, Box::new(callback))
    }

    /// Read family `F` and extract one variant, resolving with
    /// [`CubeError::ResultTypeMismatch`] when another variant arrives.
    pub fn read_as<F, V>(
        &mut self,
        callback: impl FnOnce(CubeResult<V>) + Send + 'static,
    ) -> CubeResult<()>
    where
        F: Readable,
        V: TryFrom<F::Response, Error = ProtocolError>,
    {
        self.read::<F>(move |result| {
            callback(result.and_then(|response| V::try_from(response).map_err(CubeError::from)))
        })
    }

    /// Subscribe to notifications of family `F`.
    pub fn subscribe<F: Readable>(
        &mut self,
        callback: impl FnMut(CubeResult<F::Response>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.characteristics.get_mut::<F>().subscribe(
            &self.link,
            &mut self.subscriptions,
            Box::new(callback),
        )
    }

    /// Cancel a subscription. Unknown ids are ignored; returns whether one
    /// was removed.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.characteristics.unsubscribe(&self.link, subscription)
    }

    /// Write raw bytes to the characteristic of family `F`.
    pub fn write<F: Family>(
        &mut self,
        payload: &[u8],
        callback: Option<WriteCallback>,
    ) -> CubeResult<()> {
        self.characteristics
            .get_mut::<F>()
            .write(&self.link, payload, callback)
    }

    // ========================================================================
    // Location
    // ========================================================================

    pub fn read_location(
        &mut self,
        callback: impl FnOnce(CubeResult<LocationResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Location>(callback)
    }

    pub fn subscribe_location(
        &mut self,
        callback: impl FnMut(CubeResult<LocationResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Location>(callback)
    }

    // ========================================================================
    // Sensor
    // ========================================================================

    pub fn read_sensor(
        &mut self,
        callback: impl FnOnce(CubeResult<SensorResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Sensor>(callback)
    }

    pub fn subscribe_sensor(
        &mut self,
        callback: impl FnMut(CubeResult<SensorResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Sensor>(callback)
    }

    /// Ask the cube to notify its motion sensor state.
    pub fn request_motion(&mut self, callback: Option<WriteCallback>) -> CubeResult<()> {
        self.write::<family::Sensor>(&SensorRequest::Motion.encode(), callback)
    }

    /// Ask the cube to notify its magnetic sensor state.
    pub fn request_magnetic(&mut self, callback: Option<WriteCallback>) -> CubeResult<()> {
        self.write::<family::Sensor>(&SensorRequest::Magnetic.encode(), callback)
    }

    // ========================================================================
    // Button
    // ========================================================================

    pub fn read_button(
        &mut self,
        callback: impl FnOnce(CubeResult<ButtonResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Button>(callback)
    }

    pub fn subscribe_button(
        &mut self,
        callback: impl FnMut(CubeResult<ButtonResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Button>(callback)
    }

    // ========================================================================
    // Battery
    // ========================================================================

    pub fn read_battery(
        &mut self,
        callback: impl FnOnce(CubeResult<BatteryResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Battery>(callback)
    }

    pub fn subscribe_battery(
        &mut self,
        callback: impl FnMut(CubeResult<BatteryResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Battery>(callback)
    }

    // ========================================================================
    // Motor
    // ========================================================================

    pub fn read_motor(
        &mut self,
        callback: impl FnOnce(CubeResult<MotorResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Motor>(callback)
    }

    /// Subscribe to destination results and, once enabled, velocities.
    pub fn subscribe_motor(
        &mut self,
        callback: impl FnMut(CubeResult<MotorResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Motor>(callback)
    }

    /// Send a motor command. Results of destination moves arrive as
    /// notifications on the motor characteristic.
    pub fn drive(&mut self, request: &MotorRequest) -> CubeResult<()> {
        self.write::<family::Motor>(&request.encode(), None)
    }

    /// Run both wheels at signed speeds until told otherwise.
    pub fn activate_motors(&mut self, left: i16, right: i16) -> CubeResult<()> {
        self.drive(&MotorRequest::Activate { left, right })
    }

    pub fn stop_motors(&mut self) -> CubeResult<()> {
        self.activate_motors(0, 0)
    }

    // ========================================================================
    // Light
    // ========================================================================

    pub fn light(
        &mut self,
        request: &LightRequest,
        callback: Option<WriteCallback>,
    ) -> CubeResult<()> {
        self.write::<family::Light>(&request.encode(), callback)
    }

    pub fn light_off(&mut self, callback: Option<WriteCallback>) -> CubeResult<()> {
        self.light(&LightRequest::AllOff, callback)
    }

    // ========================================================================
    // Sound
    // ========================================================================

    pub fn sound(
        &mut self,
        request: &SoundRequest,
        callback: Option<WriteCallback>,
    ) -> CubeResult<()> {
        self.write::<family::Sound>(&request.encode(), callback)
    }

    pub fn stop_sound(&mut self, callback: Option<WriteCallback>) -> CubeResult<()> {
        self.sound(&SoundRequest::Stop, callback)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn read_configuration(
        &mut self,
        callback: impl FnOnce(CubeResult<ConfigurationResponse>) + Send + 'static,
    ) -> CubeResult<()> {
        self.read::<family::Configuration>(callback)
    }

    /// Subscribe to configuration responses (protocol version and
    /// acknowledgements of ID, magnetic and velocity settings).
    pub fn subscribe_configuration(
        &mut self,
        callback: impl FnMut(CubeResult<ConfigurationResponse>) + Send + 'static,
    ) -> CubeResult<SubscriptionId> {
        self.subscribe::<family::Configuration>(callback)
    }

    pub fn configure(
        &mut self,
        request: &ConfigurationRequest,
        callback: Option<WriteCallback>,
    ) -> CubeResult<()> {
        self.write::<family::Configuration>(&request.encode(), callback)
    }
}
