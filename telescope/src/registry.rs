//! Driver registry
//!
//! Maps the configured [`TelescopeDriverKind`] to a backend constructor.

use crate::driver::{MountGeometry, TelescopeDriver};
use crate::indi::IndiTelescope;
use crate::simulator::SimulatedTelescope;
use crate::theskyx::TheSkyXTelescope;
use crac_core::{CoordinateTransform, ObservatoryConfig, TelescopeDriverKind};
use std::sync::Arc;

/// Builds a driver from the full configuration and the mount geometry
pub type DriverConstructor = fn(&ObservatoryConfig, MountGeometry) -> Box<dyn TelescopeDriver>;

fn indi(config: &ObservatoryConfig, geometry: MountGeometry) -> Box<dyn TelescopeDriver> {
    Box::new(IndiTelescope::new(&config.telescope, geometry))
}

fn theskyx(config: &ObservatoryConfig, geometry: MountGeometry) -> Box<dyn TelescopeDriver> {
    Box::new(TheSkyXTelescope::new(&config.telescope, geometry))
}

fn simulator(config: &ObservatoryConfig, geometry: MountGeometry) -> Box<dyn TelescopeDriver> {
    Box::new(SimulatedTelescope::new(
        &config.telescope,
        geometry,
        config.simulation.telescope_slew_polls,
    ))
}

pub fn constructor(kind: TelescopeDriverKind) -> DriverConstructor {
    match kind {
        TelescopeDriverKind::Indi => indi,
        TelescopeDriverKind::Theskyx => theskyx,
        TelescopeDriverKind::Simulator => simulator,
    }
}

/// Instantiate the driver selected in `config.telescope.driver`
pub fn create_driver(
    config: &ObservatoryConfig,
    transform: Arc<dyn CoordinateTransform>,
) -> Box<dyn TelescopeDriver> {
    let geometry = MountGeometry::new(&config.telescope, transform);
    tracing::info!("Using telescope driver {:?}", config.telescope.driver);
    constructor(config.telescope.driver)(config, geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crac_core::{SiderealTransform, Site};

    #[test]
    fn test_every_kind_resolves() {
        let transform: Arc<dyn CoordinateTransform> = Arc::new(SiderealTransform::new(
            Site::from(&crac_core::GeographyConfig::default()),
        ));
        for (kind, name) in [
            (TelescopeDriverKind::Indi, "indi"),
            (TelescopeDriverKind::Theskyx, "theskyx"),
            (TelescopeDriverKind::Simulator, "simulator"),
        ] {
            let mut config = ObservatoryConfig::default();
            config.telescope.driver = kind;
            let driver = create_driver(&config, transform.clone());
            assert_eq!(driver.name(), name);
        }
    }
}
