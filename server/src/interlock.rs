//! Interlock coordinator
//!
//! Enforces the cross-device safety rules on every request:
//!
//! - the roof opens unconditionally but closes only over disabled curtains,
//!   a secure telescope and a powered mount
//! - curtains are enabled only under an open roof and disabled only at rest
//! - curtain targets follow the telescope altitude while the mount is not
//!   slewing
//!
//! Decisions read each device's own status in turn; no two device locks are
//! held together. A denied action is logged and answered with the current
//! status, never with an error.

use crate::context::AppContext;
use crac_core::{
    AltazCoords, Curtain, CurtainOrientation, CurtainStatus, CurtainsConfig, DomeResult,
    RoofStatus, TelescopeSpeed, TelescopeStatus,
};
use crac_telescope::{StatusClassifier, TelescopeSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtainsAction {
    Enable,
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelescopeAction {
    Sync,
    Park,
    Flat,
}

/// Steps each curtain should be driven to; `None` holds position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CurtainTargets {
    pub east: Option<i64>,
    pub west: Option<i64>,
}

impl CurtainTargets {
    fn both(step: i64) -> Self {
        Self {
            east: Some(step),
            west: Some(step),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurtainReport {
    pub orientation: CurtainOrientation,
    pub status: CurtainStatus,
    pub steps: i64,
}

impl CurtainReport {
    fn of(curtain: &Curtain) -> Self {
        Self {
            orientation: curtain.orientation(),
            status: curtain.status(),
            steps: curtain.steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurtainsReport {
    pub east: CurtainReport,
    pub west: CurtainReport,
    pub targets: CurtainTargets,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelescopeReport {
    pub status: TelescopeStatus,
    pub speed: TelescopeSpeed,
    pub aa: Option<AltazCoords>,
    pub synced: bool,
}

impl TelescopeReport {
    /// Answer given while the mount has no power
    fn unpowered() -> Self {
        Self {
            status: TelescopeStatus::Lost,
            speed: TelescopeSpeed::Error,
            aa: None,
            synced: false,
        }
    }
}

impl From<&TelescopeSnapshot> for TelescopeReport {
    fn from(snapshot: &TelescopeSnapshot) -> Self {
        Self {
            status: snapshot.status,
            speed: snapshot.speed,
            aa: snapshot.aa,
            synced: snapshot.synced,
        }
    }
}

/// Which curtains ran a manual reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CalibrationReport {
    pub east: bool,
    pub west: bool,
}

impl CalibrationReport {
    pub fn is_complete(&self) -> bool {
        self.east && self.west
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub roof: RoofStatus,
    pub telescope: TelescopeReport,
    pub curtains: CurtainsReport,
}

/// Curtain steps for the current telescope position.
///
/// Unsafe or unknown positions give no target. Below the shielding zone
/// both curtains close; above it on both sides, or outside the east/west
/// bands, both open fully. Inside a band the curtain on that side follows
/// the altitude along its park..max scale while the other opens fully.
pub fn curtain_targets(
    snapshot: &TelescopeSnapshot,
    curtains: &CurtainsConfig,
    classifier: &StatusClassifier,
) -> CurtainTargets {
    if snapshot.status.is_unsafe() {
        return CurtainTargets::default();
    }
    let Some(aa) = snapshot.aa else {
        return CurtainTargets::default();
    };

    let max_step = curtains.max_step;
    let is_above = aa.alt >= curtains.max_east && aa.alt >= curtains.max_west;

    if classifier.is_below_curtains_area(aa.alt) {
        CurtainTargets::both(0)
    } else if is_above || !snapshot.status.is_within_curtains_area() {
        CurtainTargets::both(max_step)
    } else if snapshot.status == TelescopeStatus::West {
        CurtainTargets {
            east: Some(max_step),
            west: Some(interpolate(
                aa.alt,
                curtains.park_west,
                curtains.max_west,
                max_step,
            )),
        }
    } else {
        CurtainTargets {
            east: Some(interpolate(
                aa.alt,
                curtains.park_east,
                curtains.max_east,
                max_step,
            )),
            west: Some(max_step),
        }
    }
}

/// Map `alt` from the `park..max` angle range onto `0..max_step`
pub fn interpolate(alt: f64, park: f64, max: f64, max_step: i64) -> i64 {
    let increment = (max - park) / max_step as f64;
    ((alt - park) / increment).round() as i64
}

pub fn roof_close_permitted(
    east: CurtainStatus,
    west: CurtainStatus,
    telescope: TelescopeStatus,
    telescope_powered: bool,
) -> bool {
    east == CurtainStatus::Disabled
        && west == CurtainStatus::Disabled
        && telescope.is_secure()
        && telescope_powered
}

pub fn curtains_enable_permitted(roof: RoofStatus) -> bool {
    roof == RoofStatus::Opened
}

/// Both curtains idle: neither moving nor out of range
pub fn curtains_disable_permitted(east: CurtainStatus, west: CurtainStatus) -> bool {
    [east, west]
        .iter()
        .all(|status| !status.is_moving() && *status != CurtainStatus::Danger)
}

#[derive(Clone)]
pub struct Interlock {
    ctx: Arc<AppContext>,
}

impl Interlock {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Open the roof, blocking until the open switch fires
    pub fn roof_open(&self) -> DomeResult<RoofStatus> {
        info!("Opening roof");
        self.ctx.roof.open()
    }

    /// Close the roof if the curtains and the telescope allow it, blocking
    /// until the closed switch fires. A denied close returns the current
    /// status.
    pub fn roof_close(&self) -> DomeResult<RoofStatus> {
        let ctx = &self.ctx;
        let east = ctx.curtain_east.status();
        let west = ctx.curtain_west.status();
        let telescope = ctx.telescope_handle().status();
        let powered = ctx.switches.telescope.is_on();

        if !roof_close_permitted(east, west, telescope, powered) {
            info!(
                ?east,
                ?west,
                ?telescope,
                powered,
                "Roof close denied"
            );
            return Ok(ctx.roof.status());
        }

        info!("Closing roof");
        ctx.roof.close()
    }

    pub fn roof_status(&self) -> RoofStatus {
        self.ctx.roof.status()
    }

    /// Apply an enable/disable request and move both curtains to the
    /// targets for the current telescope position
    pub fn curtains_cycle(&self, action: Option<CurtainsAction>) -> CurtainsReport {
        let ctx = &self.ctx;

        match action {
            Some(CurtainsAction::Disable) => {
                let east = ctx.curtain_east.status();
                let west = ctx.curtain_west.status();
                if curtains_disable_permitted(east, west) {
                    ctx.curtain_east.disable();
                    ctx.curtain_west.disable();
                } else {
                    info!(?east, ?west, "Curtains disable denied");
                }
            }
            Some(CurtainsAction::Enable) => {
                let roof = ctx.roof.status();
                if curtains_enable_permitted(roof) {
                    ctx.curtain_east.enable();
                    ctx.curtain_west.enable();
                } else {
                    info!(?roof, "Curtains enable denied");
                }
            }
            None => {}
        }

        let snapshot = ctx.telescope_handle().snapshot();
        let targets = if snapshot.speed.is_settled() {
            let classifier = StatusClassifier::new(&ctx.config.telescope, &ctx.config.azimuth);
            let targets = curtain_targets(&snapshot, &ctx.config.curtains, &classifier);
            debug!(?targets, status = ?snapshot.status, "curtain targets");
            if let Some(step) = targets.east {
                ctx.curtain_east.move_to(step);
            }
            if let Some(step) = targets.west {
                ctx.curtain_west.move_to(step);
            }
            targets
        } else {
            CurtainTargets::default()
        };

        let report = CurtainsReport {
            east: CurtainReport::of(&ctx.curtain_east),
            west: CurtainReport::of(&ctx.curtain_west),
            targets,
        };
        for curtain in [&report.east, &report.west] {
            if curtain.status == CurtainStatus::Danger {
                warn!(
                    curtain = %curtain.orientation,
                    steps = curtain.steps,
                    "Curtain out of range, manual reset required"
                );
            }
        }
        report
    }

    /// Apply a telescope request and the position-driven speed and light
    /// policies.
    ///
    /// Without mount power only SYNC is accepted; it powers the mount up
    /// and queues the sync.
    pub fn telescope_cycle(
        &self,
        action: Option<TelescopeAction>,
        autolight: bool,
    ) -> TelescopeReport {
        let ctx = &self.ctx;
        let switches = &ctx.switches;
        let telescope = ctx.telescope_handle();

        if !switches.telescope.is_on() {
            if action != Some(TelescopeAction::Sync) {
                if action.is_some() {
                    info!(?action, "Telescope action denied, mount power is off");
                }
                return TelescopeReport::unpowered();
            }
            switches.telescope.on();
        }

        match action {
            Some(TelescopeAction::Sync) => telescope.queue_sync(),
            Some(TelescopeAction::Park) => telescope.queue_park(TelescopeSpeed::NotTracking),
            Some(TelescopeAction::Flat) => telescope.queue_flat(TelescopeSpeed::NotTracking),
            None => {}
        }

        let snapshot = telescope.snapshot();
        let resting = snapshot.status == TelescopeStatus::Parked
            || (snapshot.status == TelescopeStatus::Flatter && !switches.flat_light.is_on());
        if resting
            && snapshot.speed == TelescopeSpeed::Tracking
            && telescope.tracking_off_capability()
        {
            debug!(status = ?snapshot.status, "stopping tracking at rest position");
            telescope.queue_set_speed(TelescopeSpeed::NotTracking);
        }

        if autolight {
            if snapshot.speed == TelescopeSpeed::Slewing {
                switches.dome_light.on();
            } else {
                switches.dome_light.off();
            }
        }

        TelescopeReport::from(&snapshot)
    }

    /// Recalibrate both curtains against their limit switches.
    ///
    /// The curtains are enabled first, which needs an open roof; under any
    /// other roof status nothing moves and the report says so. Blocks for up
    /// to the configured switch timeout per curtain. Both curtains are
    /// attempted; the first failure is returned.
    pub fn calibrate(&self) -> DomeResult<CalibrationReport> {
        let ctx = &self.ctx;
        let roof = ctx.roof.status();
        if !curtains_enable_permitted(roof) {
            warn!(?roof, "Curtain calibration denied");
            return Ok(CalibrationReport::default());
        }

        info!("Calibrating curtains");
        ctx.curtain_east.enable();
        ctx.curtain_west.enable();
        let east = ctx.curtain_east.manual_reset();
        let west = ctx.curtain_west.manual_reset();
        Ok(CalibrationReport {
            east: east?,
            west: west?,
        })
    }

    /// One periodic pass over telescope and curtains
    pub fn control_cycle(&self) -> CycleReport {
        let telescope = self.telescope_cycle(None, self.ctx.config.server.autolight);
        let curtains = self.curtains_cycle(None);
        CycleReport {
            roof: self.roof_status(),
            telescope,
            curtains,
        }
    }
}
