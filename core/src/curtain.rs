//! Curtain controller
//!
//! One motorized curtain: a bidirectional motor with an enable line, a
//! quadrature encoder counting the curtain travel, and two limit switches at
//! the fully closed and fully open positions.
//!
//! Motion is started by [`Curtain::move_to`] and stopped exclusively by the
//! encoder tick handler once the target is reached (or a safety bound is
//! crossed), or by a limit switch activation which also recalibrates the
//! step counter.

use crate::error::{DomeError, DomeResult};
use crate::hardware::{DigitalInput, DigitalOutput, Motor, MotorDirection, RotaryEncoder};
use crate::types::{CurtainOrientation, CurtainStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Step bounds of a curtain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimits {
    /// Step count of the fully open curtain
    pub max_step: i64,
    /// Forced stop threshold above `max_step`
    pub security_step: i64,
    /// Forced stop threshold below the closed position
    pub sub_min_step: i64,
}

impl StepLimits {
    pub const MIN_STEP: i64 = 0;
    pub const SUB_MIN_STEP: i64 = -5;

    pub fn new(max_step: i64, security_step: i64) -> Self {
        Self {
            max_step,
            security_step,
            sub_min_step: Self::SUB_MIN_STEP,
        }
    }
}

/// Actuators wired to one curtain
#[derive(Clone)]
pub struct CurtainHardware {
    pub motor: Arc<dyn Motor>,
    pub encoder: Arc<dyn RotaryEncoder>,
    pub open_switch: Arc<dyn DigitalInput>,
    pub closed_switch: Arc<dyn DigitalInput>,
}

#[derive(Debug, Default)]
struct MotionState {
    target: Option<i64>,
    to_disable: bool,
    resetting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitSide {
    Open,
    Closed,
}

struct CurtainShared {
    orientation: CurtainOrientation,
    hardware: CurtainHardware,
    limits: StepLimits,
    switch_timeout: Duration,
    motion: Mutex<MotionState>,
}

/// Controller for a single curtain.
///
/// The enable line starts off, so a fresh curtain resting on its closed
/// switch reports [`CurtainStatus::Disabled`].
pub struct Curtain {
    shared: Arc<CurtainShared>,
}

impl Curtain {
    pub fn new(
        orientation: CurtainOrientation,
        hardware: CurtainHardware,
        limits: StepLimits,
        switch_timeout: Duration,
    ) -> Self {
        hardware.motor.enable_line().off();

        let shared = Arc::new(CurtainShared {
            orientation,
            hardware,
            limits,
            switch_timeout,
            motion: Mutex::new(MotionState::default()),
        });
        attach_callbacks(&shared);

        Self { shared }
    }

    pub fn orientation(&self) -> CurtainOrientation {
        self.shared.orientation
    }

    /// Current encoder position
    pub fn steps(&self) -> i64 {
        self.shared.hardware.encoder.steps()
    }

    /// Step the curtain is currently driven to, if any
    pub fn target(&self) -> Option<i64> {
        self.shared.lock().target
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.hardware.motor.enable_line().value()
    }

    /// Whether a disable sequence is waiting for the curtain to reach step 0
    pub fn is_disable_pending(&self) -> bool {
        self.shared.lock().to_disable
    }

    /// Derive the status from the motor, encoder and limit switches
    pub fn status(&self) -> CurtainStatus {
        let motion = self.shared.lock();
        self.shared.status_locked(&motion)
    }

    /// Drive the curtain towards `target_step`, clamped to `[0, max_step]`.
    ///
    /// Ignored while the curtain is disabled, moving or in danger.
    pub fn move_to(&self, target_step: i64) {
        let mut motion = self.shared.lock();
        self.shared.move_locked(&mut motion, target_step);
    }

    pub fn open_up(&self) {
        self.move_to(self.shared.limits.max_step);
    }

    pub fn bring_down(&self) {
        self.move_to(StepLimits::MIN_STEP);
    }

    /// Bring the curtain down and cut the enable line once it is closed.
    ///
    /// Ignored while moving. A curtain in danger keeps its enable line so
    /// that [`Curtain::manual_reset`] can still drive it.
    pub fn disable(&self) {
        let shared = &self.shared;
        let hw = &shared.hardware;
        let mut motion = shared.lock();
        if hw.motor.value() != MotorDirection::Stopped || motion.resetting {
            debug!(curtain = %shared.orientation, "disable ignored while moving");
            return;
        }
        if shared.status_locked(&motion) == CurtainStatus::Danger {
            warn!(curtain = %shared.orientation, steps = hw.encoder.steps(), "disable refused, manual reset required");
            return;
        }

        motion.to_disable = true;
        shared.move_locked(&mut motion, StepLimits::MIN_STEP);

        if hw.motor.value() == MotorDirection::Stopped {
            motion.to_disable = false;
            if hw.encoder.steps() == StepLimits::MIN_STEP {
                hw.motor.enable_line().off();
                info!(curtain = %shared.orientation, "curtain disabled");
            }
        }
    }

    /// Power the motor; does not move the curtain. Cancels a pending
    /// disable.
    pub fn enable(&self) {
        let mut motion = self.shared.lock();
        motion.to_disable = false;
        self.shared.hardware.motor.enable_line().on();
        info!(curtain = %self.shared.orientation, "curtain enabled");
    }

    /// Stop the motor and drop the current target
    pub fn stop(&self) {
        let mut motion = self.shared.lock();
        self.shared.halt(&mut motion);
    }

    /// Recalibrate the step counter against the nearer limit switch.
    ///
    /// Only runs from STOPPED or DANGER with the enable line on; otherwise it
    /// returns `Ok(false)` without moving. Blocks until the switch activates
    /// or the configured switch timeout elapses, in which case the motor is
    /// stopped and [`DomeError::LimitSwitchTimeout`] is returned.
    pub fn manual_reset(&self) -> DomeResult<bool> {
        let shared = &self.shared;
        let hw = &shared.hardware;
        let max_step = shared.limits.max_step;

        let side = {
            let mut motion = shared.lock();
            let status = shared.status_locked(&motion);
            if !hw.motor.enable_line().value()
                || motion.resetting
                || !matches!(status, CurtainStatus::Stopped | CurtainStatus::Danger)
            {
                info!(curtain = %shared.orientation, ?status, "manual reset not permitted");
                return Ok(false);
            }

            detach_callbacks(hw);
            motion.resetting = true;
            motion.target = None;

            let steps = hw.encoder.steps();
            let side = if steps.abs() <= (max_step - steps).abs() {
                LimitSide::Closed
            } else {
                LimitSide::Open
            };
            let bound = match side {
                LimitSide::Closed => StepLimits::MIN_STEP,
                LimitSide::Open => max_step,
            };
            if steps > bound {
                hw.motor.backward();
            } else {
                hw.motor.forward();
            }
            info!(curtain = %shared.orientation, steps, ?side, "manual reset started");
            side
        };

        // The device lock is released while waiting so late callbacks cannot
        // stall the drive; `resetting` keeps them inert.
        let switch = match side {
            LimitSide::Open => &hw.open_switch,
            LimitSide::Closed => &hw.closed_switch,
        };
        let reached = switch.wait_for_active(Some(shared.switch_timeout));

        let mut motion = shared.lock();
        hw.motor.stop();
        motion.resetting = false;
        if reached {
            hw.encoder.set_steps(match side {
                LimitSide::Open => max_step,
                LimitSide::Closed => StepLimits::MIN_STEP,
            });
        }
        drop(motion);
        attach_callbacks(shared);

        if reached {
            info!(curtain = %shared.orientation, steps = hw.encoder.steps(), "manual reset completed");
            Ok(true)
        } else {
            warn!(curtain = %shared.orientation, ?side, "manual reset timed out");
            Err(DomeError::limit_switch_timeout(
                format!("curtain {}", shared.orientation),
                match side {
                    LimitSide::Open => "open",
                    LimitSide::Closed => "closed",
                },
                shared.switch_timeout,
            ))
        }
    }
}

impl CurtainShared {
    fn lock(&self) -> MutexGuard<'_, MotionState> {
        self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_locked(&self, motion: &MotionState) -> CurtainStatus {
        let hw = &self.hardware;
        let max_step = self.limits.max_step;
        let steps = hw.encoder.steps();
        let direction = hw.motor.value();
        let open = hw.open_switch.is_active();
        let closed = hw.closed_switch.is_active();

        if steps > max_step
            || steps < StepLimits::MIN_STEP
            || (steps == max_step && !open && direction == MotorDirection::Forward)
            || (steps == StepLimits::MIN_STEP && !closed && direction == MotorDirection::Backward)
        {
            return CurtainStatus::Danger;
        }

        match direction {
            MotorDirection::Forward => CurtainStatus::Opening,
            MotorDirection::Backward if motion.to_disable => CurtainStatus::Disabling,
            MotorDirection::Backward => CurtainStatus::Closing,
            MotorDirection::Stopped => match (open, closed) {
                (_, true) if !hw.motor.enable_line().value() => CurtainStatus::Disabled,
                (true, false) => CurtainStatus::Opened,
                (false, true) => CurtainStatus::Closed,
                (false, false) => CurtainStatus::Stopped,
                (true, true) => CurtainStatus::Error,
            },
        }
    }

    fn move_locked(&self, motion: &mut MotionState, target_step: i64) {
        let hw = &self.hardware;
        if !hw.motor.enable_line().value() || motion.resetting {
            return;
        }

        let status = self.status_locked(motion);
        if status.is_moving()
            || status == CurtainStatus::Danger
            || hw.motor.value() != MotorDirection::Stopped
        {
            debug!(curtain = %self.orientation, ?status, "move ignored");
            return;
        }

        let target = target_step.clamp(StepLimits::MIN_STEP, self.limits.max_step);
        let steps = hw.encoder.steps();
        if steps < target {
            motion.target = Some(target);
            hw.motor.forward();
        } else if steps > target {
            motion.target = Some(target);
            hw.motor.backward();
        } else {
            motion.target = None;
            return;
        }
        debug!(curtain = %self.orientation, steps, target, "curtain moving");
    }

    fn halt(&self, motion: &mut MotionState) {
        let hw = &self.hardware;
        hw.motor.stop();
        motion.target = None;
        if motion.to_disable {
            hw.motor.enable_line().off();
            motion.to_disable = false;
            info!(curtain = %self.orientation, "curtain disabled");
        }
    }

    /// Encoder tick handler
    fn check_and_stop(&self) {
        let mut motion = self.lock();
        if motion.resetting {
            return;
        }

        let hw = &self.hardware;
        let steps = hw.encoder.steps();
        let enabled = hw.motor.enable_line().value();
        let must_stop = motion.target.map_or(true, |target| target == steps)
            || steps >= self.limits.security_step
            || steps <= self.limits.sub_min_step
            || !enabled;

        if must_stop {
            if steps >= self.limits.security_step || steps <= self.limits.sub_min_step {
                warn!(curtain = %self.orientation, steps, "curtain beyond safety bounds");
            }
            self.halt(&mut motion);
        }
    }

    /// Limit switch activation handler
    fn limit_reached(&self, side: LimitSide) {
        let mut motion = self.lock();
        if motion.resetting {
            return;
        }

        let hw = &self.hardware;
        hw.motor.stop();
        motion.target = None;
        let (steps, finish_disable) = match side {
            LimitSide::Open => (self.limits.max_step, false),
            LimitSide::Closed => (StepLimits::MIN_STEP, motion.to_disable),
        };
        hw.encoder.set_steps(steps);
        if finish_disable {
            hw.motor.enable_line().off();
            motion.to_disable = false;
        }
        debug!(curtain = %self.orientation, ?side, steps, "limit switch reached");
    }
}

fn attach_callbacks(shared: &Arc<CurtainShared>) {
    let hw = &shared.hardware;

    let weak: Weak<CurtainShared> = Arc::downgrade(shared);
    hw.encoder.on_rotated(Some(Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.check_and_stop();
        }
    })));

    let weak = Arc::downgrade(shared);
    hw.open_switch.on_activated(Some(Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.limit_reached(LimitSide::Open);
        }
    })));

    let weak = Arc::downgrade(shared);
    hw.closed_switch.on_activated(Some(Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            shared.limit_reached(LimitSide::Closed);
        }
    })));
}

fn detach_callbacks(hw: &CurtainHardware) {
    hw.encoder.on_rotated(None);
    hw.open_switch.on_activated(None);
    hw.closed_switch.on_activated(None);
}

impl Drop for Curtain {
    fn drop(&mut self) {
        detach_callbacks(&self.shared.hardware);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCurtainRig;
    use std::thread;
    use std::time::Instant;

    const MAX: i64 = 100;

    fn curtain(rig: &SimCurtainRig) -> Curtain {
        Curtain::new(
            CurtainOrientation::East,
            rig.hardware(),
            StepLimits::new(MAX, MAX + 5),
            Duration::from_millis(200),
        )
    }

    /// Tick the encoder until the motor stops, as the hardware would
    fn run_until_stopped(rig: &SimCurtainRig) {
        for _ in 0..(MAX * 3) {
            match rig.motor.value() {
                MotorDirection::Stopped => return,
                direction => rig.step(direction.as_i8() as i64),
            }
        }
        panic!("curtain never stopped");
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_starts_disabled() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        assert_eq!(curtain.status(), CurtainStatus::Disabled);
        assert!(!curtain.is_enabled());
    }

    #[test]
    fn test_enable_does_not_move() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        assert_eq!(curtain.status(), CurtainStatus::Closed);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
    }

    #[test]
    fn test_stopped_anywhere_within_travel() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        for steps in [0, 1, 37, MAX - 1, MAX] {
            rig.place_at(steps);
            rig.closed_switch.set_active(false);
            rig.open_switch.set_active(false);
            assert_eq!(curtain.status(), CurtainStatus::Stopped, "steps {steps}");
        }
    }

    #[test]
    fn test_danger_at_bounds_while_driving() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();

        rig.place_at(MAX - 1);
        rig.encoder.set_steps(MAX);
        rig.motor.forward();
        assert_eq!(curtain.status(), CurtainStatus::Danger);

        rig.motor.stop();
        rig.place_at(1);
        rig.encoder.set_steps(0);
        rig.motor.backward();
        assert_eq!(curtain.status(), CurtainStatus::Danger);
    }

    #[test]
    fn test_danger_outside_travel() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(MAX + 1);
        assert_eq!(curtain.status(), CurtainStatus::Danger);
        rig.place_at(-1);
        assert_eq!(curtain.status(), CurtainStatus::Danger);
    }

    #[test]
    fn test_move_ignored_when_disabled() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.move_to(50);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.target(), None);
    }

    #[test]
    fn test_move_reaches_target() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();

        curtain.move_to(40);
        assert_eq!(curtain.status(), CurtainStatus::Opening);
        assert_eq!(curtain.target(), Some(40));

        run_until_stopped(&rig);
        assert_eq!(curtain.steps(), 40);
        assert_eq!(curtain.target(), None);
        assert_eq!(curtain.status(), CurtainStatus::Stopped);

        curtain.move_to(10);
        assert_eq!(curtain.status(), CurtainStatus::Closing);
        run_until_stopped(&rig);
        assert_eq!(curtain.steps(), 10);
    }

    #[test]
    fn test_move_clamps_target() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.move_to(MAX * 2);
        assert_eq!(curtain.target(), Some(MAX));
        run_until_stopped(&rig);
        assert_eq!(curtain.steps(), MAX);
        assert_eq!(curtain.status(), CurtainStatus::Opened);
    }

    #[test]
    fn test_move_ignored_while_moving() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.move_to(60);
        curtain.move_to(20);
        assert_eq!(curtain.target(), Some(60));
        assert_eq!(rig.motor.value(), MotorDirection::Forward);
    }

    #[test]
    fn test_move_to_current_step_is_noop() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(30);
        curtain.move_to(30);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.target(), None);
    }

    #[test]
    fn test_stop_check_is_idempotent() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.move_to(5);
        run_until_stopped(&rig);

        let before = (curtain.steps(), curtain.target(), curtain.status());
        curtain.shared.check_and_stop();
        curtain.shared.check_and_stop();
        assert_eq!((curtain.steps(), curtain.target(), curtain.status()), before);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
    }

    #[test]
    fn test_security_step_forces_stop() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(MAX + 4);
        rig.motor.forward();
        curtain.shared.lock().target = Some(MAX + 10);
        rig.step(1);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.target(), None);
    }

    #[test]
    fn test_enable_line_off_stops_on_next_tick() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.move_to(50);
        rig.motor.enable_line().off();
        rig.step(1);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.target(), None);
    }

    #[test]
    fn test_limit_switch_recalibrates_counter() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(50);

        curtain.move_to(MAX);
        // Encoder drifted: the open switch fires before the count reaches max
        rig.encoder.set_steps(MAX - 3);
        rig.open_switch.set_active(true);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.steps(), MAX);
        assert_eq!(curtain.status(), CurtainStatus::Opened);
    }

    #[test]
    fn test_disable_from_open_position() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.open_up();
        run_until_stopped(&rig);

        curtain.disable();
        assert!(curtain.is_disable_pending());
        assert_eq!(curtain.status(), CurtainStatus::Disabling);

        run_until_stopped(&rig);
        assert!(!curtain.is_disable_pending());
        assert!(!curtain.is_enabled());
        assert_eq!(curtain.status(), CurtainStatus::Disabled);
    }

    #[test]
    fn test_disable_at_closed_position_is_immediate() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        curtain.disable();
        assert!(!curtain.is_disable_pending());
        assert_eq!(curtain.status(), CurtainStatus::Disabled);
    }

    #[test]
    fn test_disable_ignored_while_moving() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();

        curtain.move_to(60);
        curtain.disable();
        assert_eq!(curtain.status(), CurtainStatus::Opening);
        assert!(!curtain.is_disable_pending());

        run_until_stopped(&rig);
        curtain.move_to(20);
        curtain.disable();
        assert_eq!(curtain.status(), CurtainStatus::Closing);
        assert!(!curtain.is_disable_pending());
    }

    #[test]
    fn test_manual_reset_not_permitted_when_closed() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        assert!(!curtain.manual_reset().unwrap());
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
    }

    #[test]
    fn test_manual_reset_refused_when_disabled() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        rig.place_at(40);
        assert!(!curtain.manual_reset().unwrap());
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.steps(), 40);
    }

    #[test]
    fn test_disable_keeps_danger_curtain_powered() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(MAX + 3);
        assert_eq!(curtain.status(), CurtainStatus::Danger);

        curtain.disable();
        assert!(curtain.is_enabled());
        assert!(!curtain.is_disable_pending());
        assert_eq!(curtain.status(), CurtainStatus::Danger);
    }

    #[test]
    fn test_enable_cancels_pending_disable() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(30);

        curtain.disable();
        assert!(curtain.is_disable_pending());
        curtain.enable();
        assert!(!curtain.is_disable_pending());

        run_until_stopped(&rig);
        assert_eq!(curtain.steps(), 0);
        assert!(curtain.is_enabled());
        assert_eq!(curtain.status(), CurtainStatus::Closed);
    }

    /// Spawn a helper that turns the encoder by `delta` once the motor runs
    fn drive_once_running(rig: &Arc<SimCurtainRig>, delta: i64) -> thread::JoinHandle<()> {
        let rig = rig.clone();
        thread::spawn(move || {
            wait_until(|| rig.motor.value() != MotorDirection::Stopped);
            rig.step(delta);
        })
    }

    #[test]
    fn test_manual_reset_recovers_from_danger() {
        let rig = Arc::new(SimCurtainRig::new(MAX));
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(-3);
        // Counter says -3 but the curtain is really a few steps up
        rig.closed_switch.set_active(false);
        assert_eq!(curtain.status(), CurtainStatus::Danger);

        let helper = drive_once_running(&rig, 1);
        assert!(curtain.manual_reset().unwrap());
        helper.join().unwrap();

        assert_eq!(curtain.steps(), 0);
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.status(), CurtainStatus::Closed);
    }

    #[test]
    fn test_manual_reset_towards_open_switch() {
        let rig = Arc::new(SimCurtainRig::new(MAX));
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(MAX - 10);

        let helper = drive_once_running(&rig, 10);
        assert!(curtain.manual_reset().unwrap());
        helper.join().unwrap();

        assert_eq!(curtain.steps(), MAX);
        assert_eq!(curtain.status(), CurtainStatus::Opened);
    }

    #[test]
    fn test_manual_reset_timeout_stops_motor() {
        let rig = SimCurtainRig::new(MAX);
        let curtain = curtain(&rig);
        curtain.enable();
        rig.place_at(20);

        let err = curtain.manual_reset().unwrap_err();
        assert!(matches!(err, DomeError::LimitSwitchTimeout { .. }));
        assert_eq!(rig.motor.value(), MotorDirection::Stopped);
        assert_eq!(curtain.status(), CurtainStatus::Stopped);

        // Callbacks are back in place
        curtain.move_to(25);
        run_until_stopped(&rig);
        assert_eq!(curtain.steps(), 25);
    }
}
