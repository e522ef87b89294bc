//! Telescope driver interface

use crate::error::TelescopeResult;
use async_trait::async_trait;
use chrono::Utc;
use crac_core::{
    AltazCoords, CoordinateTransform, EquatorialCoords, TelescopeConfig, TelescopeSpeed,
};
use std::sync::Arc;

/// One position/speed sample read from the mount
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub aa: AltazCoords,
    pub eq: EquatorialCoords,
    pub speed: TelescopeSpeed,
}

/// Reference positions and the sky transform shared by every backend
#[derive(Clone)]
pub struct MountGeometry {
    pub park: AltazCoords,
    pub flat: AltazCoords,
    pub transform: Arc<dyn CoordinateTransform>,
}

impl MountGeometry {
    pub fn new(config: &TelescopeConfig, transform: Arc<dyn CoordinateTransform>) -> Self {
        Self {
            park: config.park_position(),
            flat: config.flat_position(),
            transform,
        }
    }

    /// Equatorial target for a horizontal position right now, rounded for the mount
    pub fn target_now(&self, aa: AltazCoords) -> EquatorialCoords {
        self.transform.altaz_to_radec(aa, Utc::now()).rounded(2)
    }

    pub fn altaz_now(&self, eq: EquatorialCoords) -> AltazCoords {
        self.transform.radec_to_altaz(eq, Utc::now())
    }

    pub fn radec_now(&self, aa: AltazCoords) -> EquatorialCoords {
        self.transform.altaz_to_radec(aa, Utc::now())
    }
}

/// Mount backend driven by the telescope engine.
///
/// The engine opens a connection, issues at most one command, reads the
/// position and disconnects on every polling iteration.
#[async_trait]
pub trait TelescopeDriver: Send {
    fn name(&self) -> &str;

    /// Whether the mount can stop tracking without parking
    fn tracking_off_capability(&self) -> bool;

    async fn connect(&mut self) -> TelescopeResult<()>;

    async fn disconnect(&mut self) -> TelescopeResult<()>;

    /// Declare the current pointing to be the park position
    async fn sync(&mut self) -> TelescopeResult<()>;

    async fn set_speed(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()>;

    /// Slew to the park position
    async fn park(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()>;

    /// Slew to the flat-panel position
    async fn flat(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()>;

    async fn retrieve(&mut self) -> TelescopeResult<Reading>;
}
