//! Power switches
//!
//! Relays feeding the telescope mount, the CCD camera, the flat-field panel
//! and the dome light.

use crate::hardware::DigitalOutput;
use crate::types::SwitchStatus;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A named relay
#[derive(Clone)]
pub struct PowerSwitch {
    name: &'static str,
    output: Arc<dyn DigitalOutput>,
}

impl PowerSwitch {
    pub fn new(name: &'static str, output: Arc<dyn DigitalOutput>) -> Self {
        Self { name, output }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn on(&self) {
        if !self.output.value() {
            info!(switch = self.name, "switch on");
        }
        self.output.on();
    }

    pub fn off(&self) {
        if self.output.value() {
            info!(switch = self.name, "switch off");
        }
        self.output.off();
    }

    pub fn status(&self) -> SwitchStatus {
        if self.output.value() {
            SwitchStatus::On
        } else {
            SwitchStatus::Off
        }
    }

    pub fn is_on(&self) -> bool {
        self.output.value()
    }
}

impl fmt::Debug for PowerSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerSwitch")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// The observatory relays
#[derive(Debug, Clone)]
pub struct PowerSwitches {
    pub telescope: PowerSwitch,
    pub ccd: PowerSwitch,
    pub flat_light: PowerSwitch,
    pub dome_light: PowerSwitch,
}

impl PowerSwitches {
    pub fn all(&self) -> [&PowerSwitch; 4] {
        [&self.telescope, &self.ccd, &self.flat_light, &self.dome_light]
    }
}
