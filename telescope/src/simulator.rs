//! Simulated mount
//!
//! Keeps the pointing in memory. Slews move linearly towards the target and
//! finish after a fixed number of position reads. A [`SimulatorControl`]
//! handle lets the caller cut the link or inject command failures.

use crate::driver::{MountGeometry, Reading, TelescopeDriver};
use crate::error::{TelescopeError, TelescopeResult};
use async_trait::async_trait;
use crac_core::{AltazCoords, TelescopeConfig, TelescopeSpeed};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy)]
struct Slew {
    from: AltazCoords,
    to: AltazCoords,
    done: u32,
    total: u32,
}

impl Slew {
    /// Advance one poll and return the intermediate position
    fn advance(&mut self) -> AltazCoords {
        self.done = (self.done + 1).min(self.total);
        let f = self.done as f64 / self.total as f64;
        AltazCoords::new(
            self.from.alt + (self.to.alt - self.from.alt) * f,
            self.from.az + (self.to.az - self.from.az) * f,
        )
    }

    fn finished(&self) -> bool {
        self.done >= self.total
    }
}

#[derive(Debug)]
struct MountState {
    position: AltazCoords,
    slew: Option<Slew>,
    tracking: bool,
    unreachable: bool,
    failing_commands: u32,
}

fn lock(state: &Mutex<MountState>) -> MutexGuard<'_, MountState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Out-of-band control over a [`SimulatedTelescope`]
#[derive(Clone)]
pub struct SimulatorControl {
    state: Arc<Mutex<MountState>>,
}

impl SimulatorControl {
    /// Make every connection attempt fail until cleared
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Fail the next `count` commands
    pub fn fail_commands(&self, count: u32) {
        lock(&self.state).failing_commands = count;
    }

    /// Point the mount somewhere, cancelling any slew
    pub fn set_position(&self, position: AltazCoords) {
        let mut state = lock(&self.state);
        state.position = position;
        state.slew = None;
    }

    pub fn position(&self) -> AltazCoords {
        lock(&self.state).position
    }

    pub fn is_tracking(&self) -> bool {
        lock(&self.state).tracking
    }
}

pub struct SimulatedTelescope {
    geometry: MountGeometry,
    tracking_off: bool,
    slew_polls: u32,
    state: Arc<Mutex<MountState>>,
    connected: bool,
}

impl SimulatedTelescope {
    /// New mount resting at the park position
    pub fn new(config: &TelescopeConfig, geometry: MountGeometry, slew_polls: u32) -> Self {
        let state = MountState {
            position: geometry.park,
            slew: None,
            tracking: false,
            unreachable: false,
            failing_commands: 0,
        };
        Self {
            geometry,
            tracking_off: config.tracking_off_capability,
            slew_polls: slew_polls.max(1),
            state: Arc::new(Mutex::new(state)),
            connected: false,
        }
    }

    pub fn control(&self) -> SimulatorControl {
        SimulatorControl {
            state: self.state.clone(),
        }
    }

    /// Lock the mount for a command, consuming one injected failure if armed
    fn command(&self) -> TelescopeResult<MutexGuard<'_, MountState>> {
        if !self.connected {
            return Err(TelescopeError::NotConnected);
        }
        let mut state = lock(&self.state);
        if state.failing_commands > 0 {
            state.failing_commands -= 1;
            return Err(TelescopeError::Protocol("simulated command failure".to_string()));
        }
        Ok(state)
    }

    fn slew_to(&self, target: AltazCoords, speed: TelescopeSpeed) -> TelescopeResult<()> {
        let slew_polls = self.slew_polls;
        let mut state = self.command()?;
        state.slew = Some(Slew {
            from: state.position,
            to: target,
            done: 0,
            total: slew_polls,
        });
        state.tracking = speed == TelescopeSpeed::Tracking;
        tracing::debug!("simulated slew to {:?}", target);
        Ok(())
    }
}

#[async_trait]
impl TelescopeDriver for SimulatedTelescope {
    fn name(&self) -> &str {
        "simulator"
    }

    fn tracking_off_capability(&self) -> bool {
        self.tracking_off
    }

    async fn connect(&mut self) -> TelescopeResult<()> {
        if lock(&self.state).unreachable {
            return Err(TelescopeError::ConnectionFailed {
                address: "simulator".to_string(),
                message: "mount unreachable".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> TelescopeResult<()> {
        self.connected = false;
        Ok(())
    }

    async fn sync(&mut self) -> TelescopeResult<()> {
        let park = self.geometry.park;
        let mut state = self.command()?;
        state.position = park;
        state.slew = None;
        state.tracking = true;
        Ok(())
    }

    async fn set_speed(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        let mut state = self.command()?;
        match speed {
            TelescopeSpeed::Tracking => state.tracking = true,
            TelescopeSpeed::NotTracking => state.tracking = false,
            TelescopeSpeed::Slewing | TelescopeSpeed::Error => {}
        }
        Ok(())
    }

    async fn park(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.park, speed)
    }

    async fn flat(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.flat, speed)
    }

    async fn retrieve(&mut self) -> TelescopeResult<Reading> {
        if !self.connected {
            return Err(TelescopeError::NotConnected);
        }

        let (aa, speed) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let slewing = match state.slew.as_mut() {
                Some(slew) => {
                    let position = slew.advance();
                    let finished = slew.finished();
                    state.position = position;
                    if finished {
                        state.slew = None;
                    }
                    !finished
                }
                None => false,
            };
            let speed = if slewing {
                TelescopeSpeed::Slewing
            } else if state.tracking {
                TelescopeSpeed::Tracking
            } else {
                TelescopeSpeed::NotTracking
            };
            (state.position, speed)
        };

        Ok(Reading {
            aa,
            eq: self.geometry.radec_now(aa),
            speed,
        })
    }
}
