//! Actuator primitives consumed by the roof and curtain controllers
//!
//! Implementations deliver callbacks on their own thread (an interrupt
//! handler or a polling thread), never from inside a call made by the
//! controller, so controllers may hold their device lock while commanding
//! the hardware.

use std::sync::Arc;
use std::time::Duration;

/// Event handler attached to an input or encoder
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// On/off output line (relay, motor enable, power switch)
pub trait DigitalOutput: Send + Sync {
    fn on(&self);
    fn off(&self);
    fn value(&self) -> bool;
}

/// Digital input with edge detection (limit switch)
pub trait DigitalInput: Send + Sync {
    fn is_active(&self) -> bool;

    /// Block until the input is active.
    ///
    /// Returns `false` when `timeout` elapsed first.
    fn wait_for_active(&self, timeout: Option<Duration>) -> bool;

    /// Replace the handler fired on every inactive -> active transition
    fn on_activated(&self, callback: Option<Callback>);
}

/// Quadrature encoder with a signed step counter
pub trait RotaryEncoder: Send + Sync {
    fn steps(&self) -> i64;

    /// Overwrite the counter without firing the rotation handler
    fn set_steps(&self, steps: i64);

    /// Replace the handler fired on every counted step
    fn on_rotated(&self, callback: Option<Callback>);
}

/// Motor drive direction, `value()` of the motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorDirection {
    Backward,
    Stopped,
    Forward,
}

impl MotorDirection {
    /// Signed representation (-1, 0, 1)
    pub fn as_i8(&self) -> i8 {
        match self {
            MotorDirection::Backward => -1,
            MotorDirection::Stopped => 0,
            MotorDirection::Forward => 1,
        }
    }

    pub fn from_i8(value: i8) -> Self {
        match value.signum() {
            -1 => MotorDirection::Backward,
            1 => MotorDirection::Forward,
            _ => MotorDirection::Stopped,
        }
    }
}

/// Bidirectional DC motor with a separate enable line
pub trait Motor: Send + Sync {
    fn forward(&self);
    fn backward(&self);
    fn stop(&self);
    fn value(&self) -> MotorDirection;
    fn enable_line(&self) -> &dyn DigitalOutput;
}
