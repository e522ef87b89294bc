//! Roof controller
//!
//! The roof motor is a single on/off output: on drives the roof open, off
//! lets it close. Two limit switches report the end positions and the status
//! is derived from them on every query.

use crate::error::{DomeError, DomeResult};
use crate::hardware::{DigitalInput, DigitalOutput};
use crate::types::RoofStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// Actuators wired to the roof
#[derive(Clone)]
pub struct RoofHardware {
    pub motor: Arc<dyn DigitalOutput>,
    pub open_switch: Arc<dyn DigitalInput>,
    pub closed_switch: Arc<dyn DigitalInput>,
}

pub struct Roof {
    hardware: RoofHardware,
    switch_timeout: Duration,
    // Serializes open/close so contradictory motor commands never overlap
    command: Mutex<()>,
}

impl Roof {
    pub fn new(hardware: RoofHardware, switch_timeout: Duration) -> Self {
        Self {
            hardware,
            switch_timeout,
            command: Mutex::new(()),
        }
    }

    pub fn status(&self) -> RoofStatus {
        let hw = &self.hardware;
        let closed = hw.closed_switch.is_active();
        let open = hw.open_switch.is_active();
        let motor_on = hw.motor.value();

        if closed && open {
            RoofStatus::Error
        } else if closed && !motor_on {
            RoofStatus::Closed
        } else if open && motor_on {
            RoofStatus::Opened
        } else if motor_on {
            RoofStatus::Opening
        } else {
            RoofStatus::Closing
        }
    }

    /// Switch the motor on and block until the open switch activates
    pub fn open(&self) -> DomeResult<RoofStatus> {
        let _command = self.command.lock().unwrap_or_else(PoisonError::into_inner);
        info!("opening roof");
        self.hardware.motor.on();
        self.wait_for(&self.hardware.open_switch, "open")?;
        info!("roof opened");
        Ok(self.status())
    }

    /// Switch the motor off and block until the closed switch activates
    pub fn close(&self) -> DomeResult<RoofStatus> {
        let _command = self.command.lock().unwrap_or_else(PoisonError::into_inner);
        info!("closing roof");
        self.hardware.motor.off();
        self.wait_for(&self.hardware.closed_switch, "closed")?;
        info!("roof closed");
        Ok(self.status())
    }

    fn wait_for(&self, switch: &Arc<dyn DigitalInput>, name: &str) -> DomeResult<()> {
        if switch.wait_for_active(Some(self.switch_timeout)) {
            return Ok(());
        }
        warn!(switch = name, timeout = ?self.switch_timeout, status = ?self.status(), "roof limit switch not reached");
        Err(DomeError::limit_switch_timeout("roof", name, self.switch_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimInput, SimOutput, SimRoofRig};

    fn static_roof(motor_on: bool, open: bool, closed: bool) -> Roof {
        Roof::new(
            RoofHardware {
                motor: Arc::new(SimOutput::new(motor_on)),
                open_switch: Arc::new(SimInput::new(open)),
                closed_switch: Arc::new(SimInput::new(closed)),
            },
            Duration::from_millis(20),
        )
    }

    #[test]
    fn test_status_truth_table() {
        assert_eq!(static_roof(false, false, true).status(), RoofStatus::Closed);
        assert_eq!(static_roof(true, true, false).status(), RoofStatus::Opened);
        assert_eq!(static_roof(true, false, false).status(), RoofStatus::Opening);
        assert_eq!(static_roof(false, false, false).status(), RoofStatus::Closing);
        // Open switch active but motor off: the roof is on its way down
        assert_eq!(static_roof(false, true, false).status(), RoofStatus::Closing);
    }

    #[test]
    fn test_contradictory_switches_report_error() {
        assert_eq!(static_roof(false, true, true).status(), RoofStatus::Error);
        assert_eq!(static_roof(true, true, true).status(), RoofStatus::Error);
    }

    #[test]
    fn test_open_and_close_cycle() {
        let rig = SimRoofRig::new(Duration::from_millis(10));
        let roof = Roof::new(rig.hardware(), Duration::from_secs(5));
        assert_eq!(roof.status(), RoofStatus::Closed);

        assert_eq!(roof.open().unwrap(), RoofStatus::Opened);
        assert_eq!(roof.close().unwrap(), RoofStatus::Closed);
    }

    #[test]
    fn test_open_when_already_open_returns_immediately() {
        let roof = static_roof(true, true, false);
        assert_eq!(roof.open().unwrap(), RoofStatus::Opened);
    }

    #[test]
    fn test_open_timeout_leaves_motor_on() {
        let roof = static_roof(false, false, true);
        let err = roof.open().unwrap_err();
        assert!(matches!(err, DomeError::LimitSwitchTimeout { .. }));
        assert!(roof.hardware.motor.value());
        assert_eq!(roof.status(), RoofStatus::Opening);
    }
}
