//! Simulated actuators
//!
//! In-memory implementations of the actuator primitives, plus rigs that
//! wire them together the way the physical roof and curtains behave. Used
//! when `server.gpio_mock` is set and by the controller tests.

use crate::curtain::CurtainHardware;
use crate::hardware::{Callback, DigitalInput, DigitalOutput, Motor, MotorDirection, RotaryEncoder};
use crate::roof::RoofHardware;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicI8, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

type OutputHook = Arc<dyn Fn(bool) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Primitives
// ============================================================================

/// Output line held in memory, optionally notifying a hook on every change
pub struct SimOutput {
    value: AtomicBool,
    hook: Mutex<Option<OutputHook>>,
}

impl SimOutput {
    pub fn new(initial: bool) -> Self {
        Self {
            value: AtomicBool::new(initial),
            hook: Mutex::new(None),
        }
    }

    /// Install a hook called with the new value whenever the output changes
    pub fn set_hook(&self, hook: Option<OutputHook>) {
        *lock(&self.hook) = hook;
    }

    fn set(&self, value: bool) {
        let previous = self.value.swap(value, Ordering::SeqCst);
        if previous != value {
            let hook = lock(&self.hook).clone();
            if let Some(hook) = hook {
                hook(value);
            }
        }
    }
}

impl DigitalOutput for SimOutput {
    fn on(&self) {
        self.set(true);
    }

    fn off(&self) {
        self.set(false);
    }

    fn value(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }
}

/// Input line whose level is driven by the simulation
pub struct SimInput {
    active: Mutex<bool>,
    changed: Condvar,
    callback: Mutex<Option<Callback>>,
}

impl SimInput {
    pub fn new(active: bool) -> Self {
        Self {
            active: Mutex::new(active),
            changed: Condvar::new(),
            callback: Mutex::new(None),
        }
    }

    /// Drive the input level, firing the activation handler on a rising edge
    pub fn set_active(&self, active: bool) {
        let rising = {
            let mut current = lock(&self.active);
            let rising = !*current && active;
            *current = active;
            self.changed.notify_all();
            rising
        };

        if rising {
            let callback = lock(&self.callback).clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

impl DigitalInput for SimInput {
    fn is_active(&self) -> bool {
        *lock(&self.active)
    }

    fn wait_for_active(&self, timeout: Option<Duration>) -> bool {
        let guard = lock(&self.active);
        match timeout {
            Some(timeout) => {
                let (guard, _) = self
                    .changed
                    .wait_timeout_while(guard, timeout, |active| !*active)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
            None => {
                let guard = self
                    .changed
                    .wait_while(guard, |active| !*active)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
        }
    }

    fn on_activated(&self, callback: Option<Callback>) {
        *lock(&self.callback) = callback;
    }
}

/// Step counter turned by the simulation
pub struct SimEncoder {
    steps: AtomicI64,
    callback: Mutex<Option<Callback>>,
}

impl SimEncoder {
    pub fn new(steps: i64) -> Self {
        Self {
            steps: AtomicI64::new(steps),
            callback: Mutex::new(None),
        }
    }

    /// Count `delta` steps and fire the rotation handler
    pub fn rotate(&self, delta: i64) {
        self.steps.fetch_add(delta, Ordering::SeqCst);
        let callback = lock(&self.callback).clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl RotaryEncoder for SimEncoder {
    fn steps(&self) -> i64 {
        self.steps.load(Ordering::SeqCst)
    }

    fn set_steps(&self, steps: i64) {
        self.steps.store(steps, Ordering::SeqCst);
    }

    fn on_rotated(&self, callback: Option<Callback>) {
        *lock(&self.callback) = callback;
    }
}

/// Motor that only records its commanded direction
pub struct SimMotor {
    direction: AtomicI8,
    enable: SimOutput,
}

impl SimMotor {
    pub fn new() -> Self {
        Self {
            direction: AtomicI8::new(0),
            enable: SimOutput::new(false),
        }
    }
}

impl Default for SimMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl Motor for SimMotor {
    fn forward(&self) {
        self.direction.store(1, Ordering::SeqCst);
    }

    fn backward(&self) {
        self.direction.store(-1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.direction.store(0, Ordering::SeqCst);
    }

    fn value(&self) -> MotorDirection {
        MotorDirection::from_i8(self.direction.load(Ordering::SeqCst))
    }

    fn enable_line(&self) -> &dyn DigitalOutput {
        &self.enable
    }
}

// ============================================================================
// Curtain rig
// ============================================================================

/// Simulated curtain: limit switches follow the encoder position.
///
/// The closed switch is active at or below step 0, the open switch at or
/// above `max_step`. The rig starts fully closed.
pub struct SimCurtainRig {
    pub motor: Arc<SimMotor>,
    pub encoder: Arc<SimEncoder>,
    pub open_switch: Arc<SimInput>,
    pub closed_switch: Arc<SimInput>,
    max_step: i64,
}

impl SimCurtainRig {
    /// Rig without a drive thread; the caller turns the encoder with `step`
    pub fn new(max_step: i64) -> Self {
        Self {
            motor: Arc::new(SimMotor::new()),
            encoder: Arc::new(SimEncoder::new(0)),
            open_switch: Arc::new(SimInput::new(false)),
            closed_switch: Arc::new(SimInput::new(true)),
            max_step,
        }
    }

    /// Rig whose powered motor turns the encoder one step per `step_period`
    pub fn motorized(max_step: i64, step_period: Duration) -> Self {
        let rig = Self::new(max_step);

        let motor: Weak<SimMotor> = Arc::downgrade(&rig.motor);
        let encoder = rig.encoder.clone();
        let open_switch = rig.open_switch.clone();
        let closed_switch = rig.closed_switch.clone();

        thread::spawn(move || loop {
            thread::sleep(step_period);
            let Some(motor) = motor.upgrade() else {
                break;
            };
            if !motor.enable_line().value() {
                continue;
            }
            let delta = motor.value().as_i8() as i64;
            if delta != 0 {
                advance(&encoder, &open_switch, &closed_switch, max_step, delta);
            }
        });

        rig
    }

    /// Turn the encoder by `delta` steps and update the limit switches
    pub fn step(&self, delta: i64) {
        advance(
            &self.encoder,
            &self.open_switch,
            &self.closed_switch,
            self.max_step,
            delta,
        );
    }

    /// Place the curtain at `steps` without firing the rotation handler.
    ///
    /// The switches are updated first so a limit handler cannot overwrite
    /// the placed count.
    pub fn place_at(&self, steps: i64) {
        self.closed_switch.set_active(steps <= 0);
        self.open_switch.set_active(steps >= self.max_step);
        self.encoder.set_steps(steps);
    }

    pub fn hardware(&self) -> CurtainHardware {
        CurtainHardware {
            motor: self.motor.clone(),
            encoder: self.encoder.clone(),
            open_switch: self.open_switch.clone(),
            closed_switch: self.closed_switch.clone(),
        }
    }
}

fn advance(
    encoder: &SimEncoder,
    open_switch: &SimInput,
    closed_switch: &SimInput,
    max_step: i64,
    delta: i64,
) {
    encoder.rotate(delta);
    let steps = encoder.steps();
    closed_switch.set_active(steps <= 0);
    open_switch.set_active(steps >= max_step);
}

// ============================================================================
// Roof rig
// ============================================================================

/// Simulated roof: switching the motor releases both limit switches and the
/// target switch activates after `travel_time`. Starts closed.
pub struct SimRoofRig {
    pub motor: Arc<SimOutput>,
    pub open_switch: Arc<SimInput>,
    pub closed_switch: Arc<SimInput>,
}

impl SimRoofRig {
    pub fn new(travel_time: Duration) -> Self {
        let motor = Arc::new(SimOutput::new(false));
        let open_switch = Arc::new(SimInput::new(false));
        let closed_switch = Arc::new(SimInput::new(true));

        // Bumped on every motor change so a stale travel never lands
        let generation = Arc::new(AtomicU64::new(0));
        let hook_open = open_switch.clone();
        let hook_closed = closed_switch.clone();
        motor.set_hook(Some(Arc::new(move |on: bool| {
            let travel = generation.fetch_add(1, Ordering::SeqCst) + 1;
            hook_open.set_active(false);
            hook_closed.set_active(false);

            let generation = generation.clone();
            let target = if on {
                hook_open.clone()
            } else {
                hook_closed.clone()
            };
            thread::spawn(move || {
                thread::sleep(travel_time);
                if generation.load(Ordering::SeqCst) == travel {
                    target.set_active(true);
                }
            });
        })));

        Self {
            motor,
            open_switch,
            closed_switch,
        }
    }

    pub fn hardware(&self) -> RoofHardware {
        RoofHardware {
            motor: self.motor.clone(),
            open_switch: self.open_switch.clone(),
            closed_switch: self.closed_switch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_input_fires_on_rising_edge_only() {
        let input = SimInput::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        input.on_activated(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        input.set_active(true);
        input.set_active(true);
        input.set_active(false);
        input.set_active(true);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_for_active_times_out() {
        let input = SimInput::new(false);
        let start = Instant::now();
        assert!(!input.wait_for_active(Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_for_active_wakes_on_change() {
        let input = Arc::new(SimInput::new(false));
        let driver = input.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            driver.set_active(true);
        });
        assert!(input.wait_for_active(Some(Duration::from_secs(5))));
        handle.join().unwrap();
    }

    #[test]
    fn test_encoder_set_steps_is_silent() {
        let encoder = SimEncoder::new(0);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        encoder.on_rotated(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        encoder.set_steps(40);
        encoder.rotate(-1);
        assert_eq!(encoder.steps(), 39);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_curtain_rig_switches_follow_position() {
        let rig = SimCurtainRig::new(10);
        assert!(rig.closed_switch.is_active());

        rig.step(1);
        assert!(!rig.closed_switch.is_active());
        assert!(!rig.open_switch.is_active());

        rig.place_at(10);
        assert!(rig.open_switch.is_active());
    }

    #[test]
    fn test_motorized_rig_needs_enable_line() {
        let rig = SimCurtainRig::motorized(100, Duration::from_millis(1));
        rig.motor.forward();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rig.encoder.steps(), 0);

        rig.motor.enable_line().on();
        thread::sleep(Duration::from_millis(30));
        rig.motor.stop();
        assert!(rig.encoder.steps() > 0);
    }

    #[test]
    fn test_roof_rig_travels_to_open() {
        let rig = SimRoofRig::new(Duration::from_millis(10));
        rig.motor.on();
        assert!(!rig.closed_switch.is_active());
        assert!(rig.open_switch.wait_for_active(Some(Duration::from_secs(5))));
    }
}
